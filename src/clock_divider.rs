//! Converts a desired sample period into a sampling-unit clock divider.
//!
//! ```rust
//! use pio_scope::clock_divider::{ClockDivider, SamplePeriod};
//!
//! let divider = ClockDivider::from_period(125_000_000, SamplePeriod::Nanos(1_000));
//! assert!((divider.ratio() - 125.0).abs() < 1e-3);
//! ```

use crate::constants::{NEC_BURST_PERIOD_S, NEC_TICKS_PER_BURST};
use crate::error::{ConfigError, Result};

/// The wall-clock time between two samples.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SamplePeriod {
    /// Microseconds per sample.
    Micros(u32),
    /// Nanoseconds per sample.
    Nanos(u32),
}

impl SamplePeriod {
    /// A zero period is not realizable; it becomes one unit of the same scale.
    #[must_use]
    pub const fn clamped(self) -> Self {
        match self {
            Self::Micros(0) => Self::Micros(1),
            Self::Nanos(0) => Self::Nanos(1),
            other => other,
        }
    }

    /// The clamped period in seconds.
    #[must_use]
    pub fn as_secs_f64(self) -> f64 {
        match self.clamped() {
            Self::Micros(micros) => f64::from(micros) / 1e6,
            Self::Nanos(nanos) => f64::from(nanos) / 1e9,
        }
    }
}

/// `divider = base_clock_hz × period_seconds`, never below 1.0.
///
/// Fractional results are kept; the sampling unit accepts fractional dividers.
#[must_use]
#[expect(clippy::cast_possible_truncation, reason = "dividers fit comfortably in f32")]
pub fn calc_divider(base_clock_hz: u32, period: SamplePeriod) -> f32 {
    let ratio = f64::from(base_clock_hz) * period.as_secs_f64();
    ratio.max(f64::from(ClockDivider::MIN.0)) as f32
}

/// A sampling-unit clock division ratio.
///
/// The hardware stores it as 16.8 fixed point, so the usable range is `1.0..=65536.0`.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ClockDivider(f32);

impl ClockDivider {
    /// One sample per system clock tick.
    pub const MIN: Self = Self(1.0);
    /// Largest divider the 16-bit integer part can express.
    pub const MAX: Self = Self(65_536.0);

    /// Checks a raw ratio against the hardware range.
    ///
    /// # Errors
    /// Returns [`ConfigError::DividerOutOfRange`] for ratios below 1.0, above 65536.0, or NaN.
    pub fn new(ratio: f32) -> Result<Self> {
        if (Self::MIN.0..=Self::MAX.0).contains(&ratio) {
            Ok(Self(ratio))
        } else {
            Err(ConfigError::DividerOutOfRange.into())
        }
    }

    /// Divider for one sample every `period`, clamped at the low end.
    ///
    /// Periods too long for the hardware are kept as computed; [`SamplerConfig`]
    /// rejects them when the unit is configured.
    ///
    /// [`SamplerConfig`]: crate::sampler::SamplerConfig
    #[must_use]
    pub fn from_period(base_clock_hz: u32, period: SamplePeriod) -> Self {
        Self(calc_divider(base_clock_hz, period))
    }

    /// Divider that gives the NEC receive program 10 ticks per 562.5 µs burst.
    #[must_use]
    #[expect(clippy::cast_possible_truncation, reason = "dividers fit comfortably in f32")]
    pub fn nec(base_clock_hz: u32) -> Self {
        let tick_hz = NEC_TICKS_PER_BURST / NEC_BURST_PERIOD_S;
        Self((f64::from(base_clock_hz) / tick_hz).max(1.0) as f32)
    }

    /// The division ratio.
    #[must_use]
    pub const fn ratio(self) -> f32 {
        self.0
    }

    /// Whether the 16.8 fixed-point divider register can hold this ratio.
    #[must_use]
    pub fn is_realizable(self) -> bool {
        (Self::MIN.0..=Self::MAX.0).contains(&self.0)
    }

    /// Seconds between samples at `base_clock_hz`, for plotting a trace against time.
    #[must_use]
    pub fn sample_period_secs(self, base_clock_hz: u32) -> f64 {
        f64::from(self.0) / f64::from(base_clock_hz)
    }
}

impl Default for ClockDivider {
    fn default() -> Self {
        Self::MIN
    }
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
    use super::*;
    use crate::constants::DEFAULT_BASE_CLOCK_HZ;

    fn close(left: f32, right: f32) -> bool {
        (left - right).abs() < 1e-3
    }

    #[test]
    fn zero_period_is_clamped_to_one_unit() {
        assert_eq!(
            calc_divider(DEFAULT_BASE_CLOCK_HZ, SamplePeriod::Micros(0)),
            calc_divider(DEFAULT_BASE_CLOCK_HZ, SamplePeriod::Micros(1))
        );
        assert_eq!(
            calc_divider(DEFAULT_BASE_CLOCK_HZ, SamplePeriod::Nanos(0)),
            calc_divider(DEFAULT_BASE_CLOCK_HZ, SamplePeriod::Nanos(1))
        );
    }

    #[test]
    fn one_millisecond_follows_the_formula() {
        // 125 MHz × 1000 µs
        let divider = calc_divider(DEFAULT_BASE_CLOCK_HZ, SamplePeriod::Micros(1_000));
        assert!(close(divider, 125_000.0), "got {divider}");
    }

    #[test]
    fn nanosecond_periods_at_125_mhz() {
        // 8 ns is one clock tick, the minimum divider
        let fastest = calc_divider(DEFAULT_BASE_CLOCK_HZ, SamplePeriod::Nanos(8));
        assert!(close(fastest, 1.0), "got {fastest}");

        let one_us = calc_divider(DEFAULT_BASE_CLOCK_HZ, SamplePeriod::Nanos(1_000));
        assert!(close(one_us, 125.0), "got {one_us}");
    }

    #[test]
    fn sub_tick_periods_never_go_below_one() {
        // 1 ns at 125 MHz would be 0.125
        let divider = ClockDivider::from_period(DEFAULT_BASE_CLOCK_HZ, SamplePeriod::Nanos(1));
        assert_eq!(divider, ClockDivider::MIN);
    }

    #[test]
    fn new_rejects_unrealizable_ratios() {
        assert!(ClockDivider::new(0.5).is_err());
        assert!(ClockDivider::new(70_000.0).is_err());
        assert!(ClockDivider::new(f32::NAN).is_err());
        assert!(ClockDivider::new(2.5).is_ok());
    }

    #[test]
    fn long_periods_compute_but_are_not_realizable() {
        let divider =
            ClockDivider::from_period(DEFAULT_BASE_CLOCK_HZ, SamplePeriod::Micros(1_000));
        assert!(!divider.is_realizable());
        let divider = ClockDivider::from_period(DEFAULT_BASE_CLOCK_HZ, SamplePeriod::Micros(56));
        assert!(divider.is_realizable());
    }

    #[test]
    fn nec_divider_is_ten_ticks_per_burst() {
        // 125e6 / (10 / 562.5e-6) = 7031.25
        let divider = ClockDivider::nec(DEFAULT_BASE_CLOCK_HZ);
        assert!(close(divider.ratio(), 7_031.25), "got {}", divider.ratio());
    }

    #[test]
    fn sample_period_round_trips_through_the_divider() {
        let divider = ClockDivider::from_period(DEFAULT_BASE_CLOCK_HZ, SamplePeriod::Micros(56));
        let secs = divider.sample_period_secs(DEFAULT_BASE_CLOCK_HZ);
        assert!((secs - 56e-6).abs() < 1e-9, "got {secs}");
    }
}
