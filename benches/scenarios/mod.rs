//! Real-world scenario benchmarks.
//!
//! A busy polyrhythm on the audio thread, and the control-thread tick that
//! feeds it.

mod renderer;
mod scheduler;

pub use renderer::bench_renderer;
pub use scheduler::bench_scheduler;
