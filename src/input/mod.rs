//! Input handling: pointer and touch motion turned into splats.

pub mod pointer;

pub use pointer::PointerInput;
