//! Shared tempo, in whole cycles per minute.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Cycles-per-minute shared by every track.
///
/// All constructors clamp into `[MIN, MAX]`, so a `Tempo` is always valid.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tempo(u32);

impl Tempo {
    pub const MIN: u32 = 1;
    pub const MAX: u32 = 240;
    pub const DEFAULT: Tempo = Tempo(30);

    /// Clamp any integer (user entry, decoded link) into the valid range.
    pub fn new(cycles_per_minute: i64) -> Self {
        Self(cycles_per_minute.clamp(Self::MIN as i64, Self::MAX as i64) as u32)
    }

    pub fn get(self) -> u32 {
        self.0
    }

    /// Length of one cycle in seconds: `60 / tempo`.
    pub fn cycle_duration(self) -> f64 {
        60.0 / self.0 as f64
    }

    /// Step up or down by `delta`, saturating at the range bounds.
    pub fn nudged(self, delta: i64) -> Self {
        Self::new(self.0 as i64 + delta)
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl std::fmt::Display for Tempo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_into_range() {
        assert_eq!(Tempo::new(0).get(), 1);
        assert_eq!(Tempo::new(-12).get(), 1);
        assert_eq!(Tempo::new(500).get(), 240);
        assert_eq!(Tempo::new(90).get(), 90);
    }

    #[test]
    fn cycle_duration_is_sixty_over_tempo() {
        for t in Tempo::MIN..=Tempo::MAX {
            let tempo = Tempo::new(t as i64);
            assert!((tempo.cycle_duration() - 60.0 / t as f64).abs() < 1e-12);
        }
    }

    #[test]
    fn nudge_saturates() {
        assert_eq!(Tempo::new(239).nudged(5).get(), 240);
        assert_eq!(Tempo::new(2).nudged(-5).get(), 1);
        assert_eq!(Tempo::DEFAULT.nudged(1).get(), 31);
    }
}
