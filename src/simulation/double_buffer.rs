//! Index-based ping-pong storage.
//!
//! Both slots live inside the struct for its whole lifetime; `swap()` only
//! toggles which slot is the read side, so the two roles can never alias and
//! no grid data is ever copied.

/// Two same-shaped slots with one active read slot.
#[derive(Debug, Clone)]
pub struct DoubleBuffer<T> {
    slots: [T; 2],
    read_index: usize,
}

impl<T> DoubleBuffer<T> {
    /// Create from an explicit pair. `read` starts as the read slot.
    pub fn new(read: T, write: T) -> Self {
        Self {
            slots: [read, write],
            read_index: 0,
        }
    }

    /// Create both slots with a fallible constructor (slot index passed in).
    pub fn try_from_fn<E>(mut make: impl FnMut(usize) -> Result<T, E>) -> Result<Self, E> {
        let read = make(0)?;
        let write = make(1)?;
        Ok(Self::new(read, write))
    }

    /// The slot holding the current state.
    pub fn read(&self) -> &T {
        &self.slots[self.read_index]
    }

    pub fn read_mut(&mut self) -> &mut T {
        &mut self.slots[self.read_index]
    }

    /// The slot the next pass writes into.
    pub fn write(&self) -> &T {
        &self.slots[1 - self.read_index]
    }

    pub fn write_mut(&mut self) -> &mut T {
        &mut self.slots[1 - self.read_index]
    }

    /// Borrow the read slot and the write slot at the same time.
    pub fn read_write(&mut self) -> (&T, &mut T) {
        let (first, second) = self.slots.split_at_mut(1);
        if self.read_index == 0 {
            (&first[0], &mut second[0])
        } else {
            (&second[0], &mut first[0])
        }
    }

    /// Exchange the read and write roles. O(1), never touches slot contents.
    pub fn swap(&mut self) {
        self.read_index = 1 - self.read_index;
    }

    /// Index of the slot currently acting as read (0 or 1).
    pub fn read_index(&self) -> usize {
        self.read_index
    }

    /// Both slots, in storage order.
    pub fn slots(&self) -> &[T; 2] {
        &self.slots
    }

    pub fn slots_mut(&mut self) -> &mut [T; 2] {
        &mut self.slots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_read_and_write_are_distinct_slots() {
        let mut buffer = DoubleBuffer::new(vec![1.0f32], vec![2.0f32]);
        assert_eq!(buffer.read(), &vec![1.0]);
        assert_eq!(buffer.write(), &vec![2.0]);

        buffer.swap();
        assert_eq!(buffer.read(), &vec![2.0]);
        assert_eq!(buffer.write(), &vec![1.0]);
    }

    #[test]
    fn test_write_then_swap_is_visible_on_read() {
        let mut buffer = DoubleBuffer::new(vec![0u32; 4], vec![0u32; 4]);

        {
            let (read, write) = buffer.read_write();
            for (dst, src) in write.iter_mut().zip(read.iter()) {
                *dst = src + 7;
            }
        }
        assert_eq!(buffer.read(), &vec![0; 4]);

        buffer.swap();
        assert_eq!(buffer.read(), &vec![7; 4]);
    }

    #[test]
    fn test_swap_does_not_move_storage() {
        let mut buffer = DoubleBuffer::new(vec![1u8; 16], vec![2u8; 16]);
        let read_ptr = buffer.read().as_ptr();
        let write_ptr = buffer.write().as_ptr();

        buffer.swap();
        assert_eq!(buffer.read().as_ptr(), write_ptr);
        assert_eq!(buffer.write().as_ptr(), read_ptr);
    }

    #[test]
    fn test_try_from_fn_propagates_errors() {
        let result: Result<DoubleBuffer<u32>, &str> =
            DoubleBuffer::try_from_fn(|i| if i == 1 { Err("out of memory") } else { Ok(0) });
        assert_eq!(result.unwrap_err(), "out of memory");
    }

    proptest! {
        #[test]
        fn prop_even_swaps_restore_roles(a in any::<i32>(), b in any::<i32>(), swaps in 0usize..64) {
            let mut buffer = DoubleBuffer::new(a, b);
            for _ in 0..swaps {
                buffer.swap();
            }
            if swaps % 2 == 0 {
                prop_assert_eq!(*buffer.read(), a);
                prop_assert_eq!(*buffer.write(), b);
                prop_assert_eq!(buffer.read_index(), 0);
            } else {
                prop_assert_eq!(*buffer.read(), b);
                prop_assert_eq!(*buffer.write(), a);
                prop_assert_eq!(buffer.read_index(), 1);
            }
        }
    }
}
