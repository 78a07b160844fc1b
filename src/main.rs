//! # Fluid Backdrop Demo Entry Point
//!
//! Opens a window and runs the fluid effect over the whole surface.
//! Move the mouse (or drag a finger) to stir the dye.
//!
//! Optional overrides are read from `fluid_backdrop.ron` in the working
//! directory. Set `RUST_LOG=debug` for lifecycle logging.

fn main() {
    if let Err(e) = fluid_backdrop::app::run() {
        log::error!("Event loop terminated: {}", e);
        std::process::exit(1);
    }
}
