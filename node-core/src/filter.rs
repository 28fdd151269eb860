//! Exponential smoothing applied to successive raw distance samples.
//!
//! The filter state survives across telemetry windows for the lifetime of the
//! node. Bypass mode shares the same code path and simply reports the input.

/// Whether readings are smoothed before transmission.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SmoothingMode {
    /// `smoothed = alpha * raw + (1 - alpha) * previous`.
    Exponential,
    /// Raw readings are forwarded unchanged.
    Bypass,
}

/// Initial value of the smoothed state.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FilterSeed {
    /// Start from zero; early outputs ramp up towards the true level.
    Zero,
    /// Adopt the first valid sample as the smoothed value.
    FirstSample,
}

/// Exponential moving average over distance samples.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SmoothingFilter {
    alpha: f32,
    mode: SmoothingMode,
    seed: FilterSeed,
    smoothed: f32,
    primed: bool,
}

impl SmoothingFilter {
    /// Creates a filter. `alpha` is expected in `(0, 1]`; see `NodeConfig::validate`.
    #[must_use]
    pub const fn new(alpha: f32, mode: SmoothingMode, seed: FilterSeed) -> Self {
        Self {
            alpha,
            mode,
            seed,
            smoothed: 0.0,
            primed: false,
        }
    }

    /// Filter that forwards every sample unchanged.
    #[must_use]
    pub const fn bypass() -> Self {
        Self::new(1.0, SmoothingMode::Bypass, FilterSeed::Zero)
    }

    /// Folds `raw` into the state and returns the new smoothed value.
    pub fn update(&mut self, raw: f32) -> f32 {
        let next = match self.mode {
            SmoothingMode::Bypass => raw,
            SmoothingMode::Exponential if !self.primed && self.seed == FilterSeed::FirstSample => {
                raw
            }
            SmoothingMode::Exponential => self.alpha * raw + (1.0 - self.alpha) * self.smoothed,
        };
        self.smoothed = next;
        self.primed = true;
        next
    }

    /// Last value produced by [`update`](Self::update), or the seed.
    pub const fn smoothed(&self) -> f32 {
        self.smoothed
    }

    /// Returns `true` once at least one sample has been folded in.
    pub const fn is_primed(&self) -> bool {
        self.primed
    }

    pub const fn mode(&self) -> SmoothingMode {
        self.mode
    }

    pub const fn alpha(&self) -> f32 {
        self.alpha
    }

    /// Drops accumulated history.
    pub fn reset(&mut self) {
        self.smoothed = 0.0;
        self.primed = false;
    }
}

/// Rounds a smoothed value to the integer distance put on the wire.
///
/// Halfway values round away from zero; negative and NaN inputs map to 0.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
#[must_use]
pub fn round_distance(value: f32) -> u16 {
    let rounded = libm::roundf(value);
    if rounded.is_nan() || rounded <= 0.0 {
        0
    } else if rounded >= f32::from(u16::MAX) {
        u16::MAX
    } else {
        rounded as u16
    }
}
