//! Triggered captures into a caller-owned word buffer.
//!
//! A capture session walks `Idle → Configuring → Armed → Transferring → Complete →
//! Released`. [`SamplingResources::configure_capture`] claims a lane and leaves the
//! unit free-running. [`SamplingResources::run_capture`] restarts it, claims a
//! transfer channel, injects the trigger wait, and blocks until the buffer is full.
//! It then returns every claim.
//!
//! `run_capture` blocks indefinitely until the trigger fires. Use
//! [`SamplingResources::run_capture_until`] or
//! [`SamplingResources::run_capture_with_timeout`] to bound the wait.

use core::future::{Future, pending};

use embassy_futures::select::{Either, select};
use embassy_time::{Duration, Timer};

use crate::bit_plane::{BitPlanes, reconstruct};
use crate::clock_divider::ClockDivider;
use crate::error::{ConfigError, Error, Result};
use crate::program::capture_program;
use crate::resources::SamplingResources;
use crate::sampler::{
    ConfiguredUnit, PinCount, SamplerConfig, SamplingPlatform, SamplingUnit, Trigger,
};

/// Where a capture session is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CaptureState {
    /// Nothing claimed.
    Idle,
    /// Lane and program claimed; the unit is free-running.
    Configuring,
    /// Unit restarted, transfer channel armed.
    Armed,
    /// Trigger wait injected and unit enabled.
    Transferring,
    /// Buffer full.
    Complete,
    /// Every claim returned.
    Released,
}

/// Everything one capture needs. Immutable once the capture starts.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CaptureConfig {
    /// First sampled GPIO.
    pub pin_base: u8,
    /// Adjacent GPIOs sampled from `pin_base`.
    pub pin_count: PinCount,
    /// Sampling-unit clock division.
    pub clock_divider: ClockDivider,
    /// Level that starts sampling.
    pub trigger: Trigger,
}

/// A claimed and configured capture unit.
pub struct CaptureSession<P: SamplingPlatform> {
    unit: Option<ConfiguredUnit<P>>,
    state: CaptureState,
}

impl<P: SamplingPlatform> CaptureSession<P> {
    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> CaptureState {
        self.state
    }

    /// The lane this session holds, until released.
    #[must_use]
    pub fn lane(&self) -> Option<usize> {
        self.unit.as_ref().map(ConfiguredUnit::lane)
    }

    /// The configuration applied to the unit, until released.
    #[must_use]
    pub fn config(&self) -> Option<&SamplerConfig> {
        self.unit.as_ref().map(ConfiguredUnit::config)
    }

    fn unit_mut(&mut self) -> Result<&mut ConfiguredUnit<P>> {
        self.unit
            .as_mut()
            .ok_or(Error::InvalidConfiguration(ConfigError::SessionReleased))
    }

    /// Pops one word the free-running unit has sampled, if any. Does not wait.
    ///
    /// # Errors
    /// Returns [`ConfigError::SessionReleased`] after the session was released.
    pub fn query_word(&mut self) -> Result<Option<u32>> {
        Ok(self.unit_mut()?.unit_mut().rx_pop())
    }

    /// Disables the unit, clears its queues, restarts it at the program start, and
    /// lets it free-run again.
    ///
    /// # Errors
    /// Returns [`ConfigError::SessionReleased`] after the session was released.
    pub fn restart(&mut self) -> Result<()> {
        self.unit_mut()?.restart_running();
        Ok(())
    }
}

/// A completed capture. The buffer belongs to the caller again.
#[derive(Clone, Copy, Debug)]
pub struct Capture<'b> {
    words: &'b [u32],
    pin_count: PinCount,
    clock_divider: ClockDivider,
    base_clock_hz: u32,
}

impl<'b> Capture<'b> {
    /// The raw interleaved words, earliest first.
    #[must_use]
    pub const fn words(&self) -> &'b [u32] {
        self.words
    }

    /// Pins sampled per word.
    #[must_use]
    pub const fn pin_count(&self) -> PinCount {
        self.pin_count
    }

    /// Per-pin sample sequences.
    #[must_use]
    pub const fn bit_planes(&self) -> BitPlanes<'b> {
        reconstruct(self.words, self.pin_count)
    }

    /// Wall time between two samples of the same pin.
    #[must_use]
    pub fn seconds_per_sample(&self) -> f64 {
        self.clock_divider.sample_period_secs(self.base_clock_hz)
    }
}

impl<P: SamplingPlatform, const LANES: usize, const CHANNELS: usize>
    SamplingResources<P, LANES, CHANNELS>
{
    /// Claims a lane and program space and configures `pin_count` adjacent inputs
    /// from `pin_base`. The unit starts free-running into its receive queue.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfiguration`] for an unsupported pin count, pins past
    /// the GPIO range, or an unrealizable divider, before anything is claimed.
    /// Returns [`Error::ResourceExhausted`] if no lane or program space is free.
    pub fn configure_capture(
        &mut self,
        pin_base: u8,
        pin_count: u8,
        clock_divider: ClockDivider,
    ) -> Result<CaptureSession<P>> {
        let pin_count = PinCount::try_from(pin_count)?;
        let config = SamplerConfig::capture(pin_base, pin_count, clock_divider)?;
        let unit = self.claim_unit(&capture_program(pin_count), config)?;
        log_info!(
            "capture: configured lane {} for {} pin(s) from GPIO {}",
            unit.lane(),
            pin_count.get(),
            pin_base
        );
        Ok(CaptureSession {
            unit: Some(unit),
            state: CaptureState::Configuring,
        })
    }

    /// Fills `buffer` with samples taken once `trigger` is met, then releases the
    /// session's claims.
    ///
    /// Blocks indefinitely until the trigger fires.
    ///
    /// # Errors
    /// See [`Self::run_capture_until`].
    pub async fn run_capture<'b>(
        &mut self,
        session: &mut CaptureSession<P>,
        buffer: &'b mut [u32],
        trigger: Trigger,
    ) -> Result<Capture<'b>> {
        self.run_capture_until(session, buffer, trigger, pending())
            .await
    }

    /// [`Self::run_capture`], abandoned if `timeout` passes before the buffer fills.
    ///
    /// # Errors
    /// See [`Self::run_capture_until`].
    pub async fn run_capture_with_timeout<'b>(
        &mut self,
        session: &mut CaptureSession<P>,
        buffer: &'b mut [u32],
        trigger: Trigger,
        timeout: Duration,
    ) -> Result<Capture<'b>> {
        self.run_capture_until(session, buffer, trigger, Timer::after(timeout))
            .await
    }

    /// [`Self::run_capture`], abandoned if `cancel` resolves first.
    ///
    /// Whatever the outcome, the session ends up [`CaptureState::Released`] with its
    /// lane, program space, and transfer channel back in their pools.
    ///
    /// # Errors
    /// - [`ConfigError::EmptyBuffer`] or [`ConfigError::SessionReleased`] before
    ///   anything changes.
    /// - [`Error::ResourceExhausted`] if no transfer channel is free.
    /// - [`Error::HardwareTimeout`] if `cancel` won. The buffer contents are undefined.
    pub async fn run_capture_until<'b>(
        &mut self,
        session: &mut CaptureSession<P>,
        buffer: &'b mut [u32],
        trigger: Trigger,
        cancel: impl Future<Output = ()>,
    ) -> Result<Capture<'b>> {
        if buffer.is_empty() {
            return Err(ConfigError::EmptyBuffer.into());
        }
        let Some(mut unit) = session.unit.take() else {
            return Err(ConfigError::SessionReleased.into());
        };
        let config = *unit.config();

        let origin = unit.origin();
        unit.unit_mut().restart(origin);
        let mut channel = match self.channels.claim() {
            Ok(channel) => channel,
            Err(err) => {
                session.state = CaptureState::Released;
                if self.release_unit(unit).is_err() {
                    log_warn!("capture: lane slot already filled while unwinding");
                }
                return Err(err);
            }
        };
        session.state = CaptureState::Armed;

        unit.unit_mut().inject_wait(trigger);
        session.state = CaptureState::Transferring;
        log_info!(
            "capture: lane {} waiting for GPIO {} == {}, {} words",
            unit.lane(),
            trigger.pin(),
            trigger.polarity().level(),
            buffer.len()
        );

        let completed = match select(unit.unit_mut().transfer(&mut channel, buffer), cancel).await
        {
            Either::First(()) => true,
            Either::Second(()) => {
                unit.unit_mut().set_enabled(false);
                false
            }
        };
        if completed {
            session.state = CaptureState::Complete;
        }

        let channel_released = self.channels.release(channel);
        let unit_released = self.release_unit(unit);
        session.state = CaptureState::Released;
        channel_released?;
        unit_released?;

        if !completed {
            log_warn!("capture: cancelled before the buffer filled");
            return Err(Error::HardwareTimeout);
        }
        log_info!("capture: complete");

        Ok(Capture {
            words: buffer,
            pin_count: config.in_pin_count(),
            clock_divider: config.clock_divider(),
            base_clock_hz: self.platform.base_clock_hz(),
        })
    }

    /// Configures and runs one capture described by `config`.
    ///
    /// Nothing stays claimed afterwards, whether or not the capture succeeded.
    ///
    /// # Errors
    /// Any error of [`Self::configure_capture`] or [`Self::run_capture`].
    pub async fn capture<'b>(
        &mut self,
        config: &CaptureConfig,
        buffer: &'b mut [u32],
    ) -> Result<Capture<'b>> {
        if buffer.is_empty() {
            return Err(ConfigError::EmptyBuffer.into());
        }
        let mut session =
            self.configure_capture(config.pin_base, config.pin_count.get(), config.clock_divider)?;
        let captured = self.run_capture(&mut session, buffer, config.trigger).await;
        // No-op unless `run_capture` bailed out before taking the unit.
        let released = self.release_capture(session);
        let capture = captured?;
        released?;
        Ok(capture)
    }

    /// Returns a session's claims without capturing. Released sessions are a no-op.
    ///
    /// # Errors
    /// Returns [`Error::ReleaseConflict`] if a slot was unexpectedly occupied.
    pub fn release_capture(&mut self, mut session: CaptureSession<P>) -> Result<()> {
        session.state = CaptureState::Released;
        match session.unit.take() {
            Some(unit) => self.release_unit(unit),
            None => Ok(()),
        }
    }
}
