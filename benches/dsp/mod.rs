//! Benchmarks for beat synthesis primitives.

mod envelope;
mod oscillator;
mod tone;

pub use envelope::bench_envelope;
pub use oscillator::bench_oscillator;
pub use tone::bench_tone;
