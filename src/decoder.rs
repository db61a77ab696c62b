//! NEC decoder sessions: polled access to the receive queue and the interrupt
//! notification toggle.

use crate::error::{Error, Result};
use crate::nec::RawFrame;
use crate::notify::{NecNotifier, NotificationBinding, RxQueue};
use crate::program::nec_program;
use crate::resources::SamplingResources;
use crate::sampler::{ConfiguredUnit, SamplerConfig, SamplingPlatform, SamplingUnit};

/// A lane running the NEC receive program on one input pin.
pub struct DecoderSession<P: SamplingPlatform> {
    unit: ConfiguredUnit<P>,
    binding: Option<NotificationBinding>,
}

impl<P: SamplingPlatform> DecoderSession<P> {
    /// GPIO the receiver is wired to.
    #[must_use]
    pub const fn pin(&self) -> u8 {
        self.unit.config().in_pin_base()
    }

    /// Lane running the receive program.
    #[must_use]
    pub const fn lane(&self) -> usize {
        self.unit.lane()
    }

    /// The active notification binding, if notifications are on.
    #[must_use]
    pub const fn binding(&self) -> Option<&NotificationBinding> {
        self.binding.as_ref()
    }

    /// Pops one frame if the receive queue holds one. Does not wait.
    ///
    /// With notifications on, the handler and this poll race for words; each word
    /// reaches exactly one of them.
    pub fn poll_frame(&mut self) -> Option<RawFrame> {
        self.unit.unit_mut().rx_pop().map(RawFrame)
    }

    /// Waits for the next frame.
    pub async fn receive_frame(&mut self) -> RawFrame {
        RawFrame(self.unit.unit_mut().pull_when_ready().await)
    }
}

impl<P: SamplingPlatform> RxQueue for DecoderSession<P> {
    fn is_empty(&mut self) -> bool {
        self.unit.unit_mut().rx_is_empty()
    }

    fn pop(&mut self) -> Option<u32> {
        self.unit.unit_mut().rx_pop()
    }
}

impl<P: SamplingPlatform, const LANES: usize, const CHANNELS: usize>
    SamplingResources<P, LANES, CHANNELS>
{
    /// Starts the NEC receive program on `pin` with the pull-up enabled.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfiguration`] if `pin` is not a GPIO, or
    /// [`Error::ResourceExhausted`] if no lane or program space is free.
    pub fn init_decoder(&mut self, pin: u8) -> Result<DecoderSession<P>> {
        let config = SamplerConfig::nec(pin, self.platform.base_clock_hz())?;
        let unit = self.claim_unit(&nec_program(), config)?;
        log_info!("decoder: lane {} listening on GPIO {}", unit.lane(), pin);
        Ok(DecoderSession {
            unit,
            binding: None,
        })
    }

    /// Turns interrupt delivery for `session` on or off.
    ///
    /// Enabling claims an interrupt line, gates it on the lane's receive queue, and
    /// lets `notifier` consume words. Disabling reverses that; disabling when already
    /// off does nothing.
    ///
    /// # Errors
    /// - [`Error::NotificationAlreadyEnabled`] if enabled twice in a row.
    /// - [`Error::ResourceExhausted`] for [`InterruptLine`] when every line is bound.
    ///
    /// [`InterruptLine`]: crate::resources::Resource::InterruptLine
    pub fn set_notifications<const N: usize>(
        &mut self,
        session: &mut DecoderSession<P>,
        notifier: &NecNotifier<N>,
        enabled: bool,
    ) -> Result<()> {
        match (enabled, session.binding.take()) {
            (true, Some(binding)) => {
                session.binding = Some(binding);
                Err(Error::NotificationAlreadyEnabled)
            }
            (true, None) => {
                let line = self.interrupt_lines.claim()?;
                notifier.set_enabled(true);
                session.unit.unit_mut().set_rx_interrupt(*line, true);
                log_info!(
                    "decoder: lane {} notifies on interrupt line {}",
                    session.lane(),
                    line.id()
                );
                session.binding = Some(NotificationBinding {
                    line,
                    lane: session.lane(),
                });
                Ok(())
            }
            (false, Some(binding)) => {
                session.unit.unit_mut().set_rx_interrupt(*binding.line, false);
                notifier.set_enabled(false);
                log_info!("decoder: lane {} notifications off", binding.lane);
                self.interrupt_lines.release(binding.line)
            }
            (false, None) => Ok(()),
        }
    }

    /// Stops the decoder, unbinding notifications first.
    ///
    /// # Errors
    /// Returns [`Error::ReleaseConflict`] if a slot was unexpectedly occupied.
    pub fn release_decoder<const N: usize>(
        &mut self,
        mut session: DecoderSession<P>,
        notifier: &NecNotifier<N>,
    ) -> Result<()> {
        self.set_notifications(&mut session, notifier, false)?;
        let DecoderSession { unit, .. } = session;
        self.release_unit(unit)
    }
}
