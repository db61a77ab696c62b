//! PIO logic-analyzer captures and NEC infrared decoding for the RP2040.
//!
//! The capture engine, bit-plane reconstruction, frame decoding, and notification
//! delivery are portable and run against any [`SamplingPlatform`]. The `rp` module
//! implements that platform on embassy-rp; with the `host` feature, `sim` provides a
//! simulated block for tests.
#![cfg_attr(target_os = "none", no_std)]
#![allow(async_fn_in_trait, reason = "Single-threaded embassy executor")]

#[macro_use]
mod logging;

pub mod bit_plane;
pub mod capture;
pub mod clock_divider;
mod constants;
pub mod decoder;
mod error;
pub mod nec;
pub mod notify;
pub mod pio_irqs;
pub mod program;
pub mod resources;
#[cfg(target_os = "none")]
pub mod rp;
pub mod sampler;
#[cfg(feature = "host")]
pub mod sim;

// Re-export commonly used items
pub use bit_plane::{BitPlanes, PinBits, interleave, reconstruct};
pub use capture::{Capture, CaptureConfig, CaptureSession, CaptureState};
pub use clock_divider::{ClockDivider, SamplePeriod, calc_divider};
pub use constants::*;
pub use decoder::DecoderSession;
pub use error::{ConfigError, Error, Result};
pub use nec::{NecEvent, NecFrame, RawFrame, RepeatTracker, decode, encode};
pub use notify::{Delivery, NecNotifier, NotificationBinding, PendingFrame, RxQueue};
pub use resources::{Claim, InterruptLine, Pool, Resource, SamplingResources};
pub use sampler::{
    InputPull, PinCount, Polarity, ProgramHandle, SamplerConfig, SamplingPlatform, SamplingUnit,
    ShiftDirection, Trigger,
};
