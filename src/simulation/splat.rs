//! Forcing events and the hand-off queue between input and simulation.

use std::sync::{Arc, Mutex, MutexGuard};

use glam::Vec2;

/// One instantaneous force/dye injection derived from a pointer sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Splat {
    /// Normalized position, `(0, 0)` bottom-left to `(1, 1)` top-right
    pub position: Vec2,
    /// Velocity impulse in texels per tick
    pub velocity: Vec2,
    /// Screen-space radius (the kernel falloff uses `radius / 100`)
    pub radius: f32,
}

/// Pending splats accumulated between frames.
///
/// Cloning yields another handle to the same queue, so the input side and the
/// simulation side can live on different threads.
#[derive(Debug, Clone, Default)]
pub struct SplatQueue {
    pending: Arc<Mutex<Vec<Splat>>>,
}

impl SplatQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Splat>> {
        // Vec<Splat> has no invariant a panicking producer could break
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn push(&self, splat: Splat) {
        self.lock().push(splat);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Empty the queue, most recently pushed splat first.
    pub fn drain_lifo(&self) -> Vec<Splat> {
        let mut drained = std::mem::take(&mut *self.lock());
        drained.reverse();
        drained
    }

    /// Drop everything pending without applying it.
    pub fn clear(&self) {
        self.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn splat_at(x: f32) -> Splat {
        Splat {
            position: Vec2::new(x, 0.5),
            velocity: Vec2::ZERO,
            radius: 0.14,
        }
    }

    #[test]
    fn test_drain_is_lifo_and_empties_queue() {
        let queue = SplatQueue::new();
        queue.push(splat_at(0.1));
        queue.push(splat_at(0.2));
        queue.push(splat_at(0.3));
        assert_eq!(queue.len(), 3);

        let drained = queue.drain_lifo();
        let xs: Vec<f32> = drained.iter().map(|s| s.position.x).collect();
        assert_eq!(xs, vec![0.3, 0.2, 0.1]);
        assert!(queue.is_empty());
        assert!(queue.drain_lifo().is_empty());
    }

    #[test]
    fn test_clones_share_the_same_queue() {
        let producer = SplatQueue::new();
        let consumer = producer.clone();

        let handle = std::thread::spawn(move || {
            for i in 0..100 {
                producer.push(splat_at(i as f32 / 100.0));
            }
        });
        handle.join().unwrap();

        assert_eq!(consumer.drain_lifo().len(), 100);
    }
}
