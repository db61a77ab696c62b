//! Sampling unit configuration and the platform seam.
//!
//! A sampling unit (PIO state machine) is described once by an immutable
//! [`SamplerConfig`] and applied by a [`SamplingPlatform`]. The platform translates the
//! description into register writes; the core never issues the individual calls itself.

use crate::clock_divider::ClockDivider;
use crate::constants::{GPIO_COUNT, WORD_BITS};
use crate::error::{ConfigError, Error, Result};
use crate::program::Program;
use crate::resources::{Claim, InterruptLine, SamplingResources};

/// How many adjacent pins one capture samples. Must divide the 32-bit word evenly.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum PinCount {
    /// One pin, 32 samples per word.
    One = 1,
    /// Two pins, 16 samples per word.
    Two = 2,
    /// Four pins, 8 samples per word.
    Four = 4,
    /// Eight pins, 4 samples per word.
    Eight = 8,
    /// Sixteen pins, 2 samples per word.
    Sixteen = 16,
    /// Thirty-two pins, 1 sample per word.
    ThirtyTwo = 32,
}

impl PinCount {
    /// All supported counts, smallest first.
    pub const ALL: [Self; 6] = [
        Self::One,
        Self::Two,
        Self::Four,
        Self::Eight,
        Self::Sixteen,
        Self::ThirtyTwo,
    ];

    /// The number of pins.
    #[must_use]
    pub const fn get(self) -> u8 {
        self as u8
    }

    /// Samples of every pin merged into one word.
    #[must_use]
    pub const fn samples_per_word(self) -> u32 {
        WORD_BITS / self as u32
    }

    /// Bits shifted in before a word is pushed: the largest multiple of the pin count
    /// that fits in 32. Every supported count divides 32, so this is always 32.
    #[must_use]
    #[expect(clippy::cast_possible_truncation, reason = "at most 32")]
    pub const fn push_threshold(self) -> u8 {
        (self.samples_per_word() * self as u32) as u8
    }
}

impl TryFrom<u8> for PinCount {
    type Error = Error;

    fn try_from(count: u8) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|pin_count| pin_count.get() == count)
            .ok_or(Error::InvalidConfiguration(ConfigError::PinCount))
    }
}

/// Logic level a trigger waits for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Polarity {
    /// Wait until the pin reads 0.
    Low,
    /// Wait until the pin reads 1.
    High,
}

impl Polarity {
    /// The level as the `wait` instruction encodes it.
    #[must_use]
    pub const fn level(self) -> u8 {
        match self {
            Self::Low => 0,
            Self::High => 1,
        }
    }
}

impl From<bool> for Polarity {
    fn from(high: bool) -> Self {
        if high { Self::High } else { Self::Low }
    }
}

/// Wait for a pin to read a level before sampling starts.
///
/// Only [`Trigger::new`] builds one, so the pin is always a GPIO.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Trigger {
    pin: u8,
    polarity: Polarity,
}

impl Trigger {
    /// A validated trigger.
    ///
    /// # Errors
    /// Returns [`ConfigError::PinOutOfRange`] if `pin` is not a GPIO.
    pub fn new(pin: u8, polarity: Polarity) -> Result<Self> {
        if pin < GPIO_COUNT {
            Ok(Self { pin, polarity })
        } else {
            Err(ConfigError::PinOutOfRange(pin).into())
        }
    }

    /// GPIO number.
    #[must_use]
    pub const fn pin(self) -> u8 {
        self.pin
    }

    /// Level to wait for.
    #[must_use]
    pub const fn polarity(self) -> Polarity {
        self.polarity
    }
}

/// Pad pull resistor for unit-controlled inputs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InputPull {
    /// Pulls disabled; the capture reads the pin as driven.
    None,
    /// Pull-up; IR receiver modules idle high and pull low on carrier.
    Up,
}

/// Direction the input shift register moves. Only right shift is used: the earliest
/// sample ends up in the least significant bits of a full word.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ShiftDirection {
    /// New bits enter at bit 31 and move toward bit 0.
    Right,
}

/// Everything a platform needs to set up one sampling unit.
///
/// Built once, validated on construction, then read-only.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SamplerConfig {
    in_pin_base: u8,
    in_pin_count: PinCount,
    jmp_pin: Option<u8>,
    pull: InputPull,
    clock_divider: ClockDivider,
    shift: ShiftDirection,
    push_threshold: u8,
}

impl SamplerConfig {
    /// Capture: `pin_count` adjacent inputs from `pin_base`, pulls off, autopush at 32,
    /// receive FIFOs joined.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfiguration`] if the pins run past the 32-bit input
    /// window or the divider cannot be programmed.
    pub fn capture(pin_base: u8, pin_count: PinCount, clock_divider: ClockDivider) -> Result<Self> {
        Self::check_pins(pin_base, pin_count)?;
        Self::check_divider(clock_divider)?;
        Ok(Self {
            in_pin_base: pin_base,
            in_pin_count: pin_count,
            jmp_pin: None,
            pull: InputPull::None,
            clock_divider,
            shift: ShiftDirection::Right,
            push_threshold: pin_count.push_threshold(),
        })
    }

    /// NEC receive: one input that is also the jump pin, pull-up, 10 ticks per burst.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfiguration`] if `pin` is not a GPIO.
    pub fn nec(pin: u8, base_clock_hz: u32) -> Result<Self> {
        Self::check_pins(pin, PinCount::One)?;
        let clock_divider = ClockDivider::nec(base_clock_hz);
        Self::check_divider(clock_divider)?;
        Ok(Self {
            in_pin_base: pin,
            in_pin_count: PinCount::One,
            jmp_pin: Some(pin),
            pull: InputPull::Up,
            clock_divider,
            shift: ShiftDirection::Right,
            push_threshold: 32,
        })
    }

    fn check_pins(pin_base: u8, pin_count: PinCount) -> Result<()> {
        let end = u32::from(pin_base) + u32::from(pin_count.get());
        if pin_base >= GPIO_COUNT || end > WORD_BITS {
            return Err(ConfigError::PinOutOfRange(pin_base).into());
        }
        Ok(())
    }

    fn check_divider(clock_divider: ClockDivider) -> Result<()> {
        if clock_divider.is_realizable() {
            Ok(())
        } else {
            Err(ConfigError::DividerOutOfRange.into())
        }
    }

    /// First input pin.
    #[must_use]
    pub const fn in_pin_base(&self) -> u8 {
        self.in_pin_base
    }

    /// Number of adjacent input pins.
    #[must_use]
    pub const fn in_pin_count(&self) -> PinCount {
        self.in_pin_count
    }

    /// The pin `jmp pin` tests, if the program uses it.
    #[must_use]
    pub const fn jmp_pin(&self) -> Option<u8> {
        self.jmp_pin
    }

    /// Pull resistor setting for every input pin.
    #[must_use]
    pub const fn pull(&self) -> InputPull {
        self.pull
    }

    /// Clock division ratio.
    #[must_use]
    pub const fn clock_divider(&self) -> ClockDivider {
        self.clock_divider
    }

    /// Input shift direction.
    #[must_use]
    pub const fn shift(&self) -> ShiftDirection {
        self.shift
    }

    /// Autopush threshold in bits.
    #[must_use]
    pub const fn push_threshold(&self) -> u8 {
        self.push_threshold
    }

    /// GPIO numbers of every input pin, in order.
    pub fn in_pins(&self) -> impl Iterator<Item = u8> + use<> {
        let base = self.in_pin_base;
        (0..self.in_pin_count.get()).map(move |offset| base.wrapping_add(offset))
    }
}

/// A loaded program, as far as the core needs to know it.
pub trait ProgramHandle {
    /// Instruction memory address of the program's first instruction.
    fn origin(&self) -> u8;
}

/// One hardware sampling lane.
pub trait SamplingUnit {
    /// The bulk-transfer channel type this unit can drain into.
    type Channel;

    /// Disables the unit, clears both FIFOs, restarts its internal state, and jumps
    /// to `origin`. It stays disabled.
    fn restart(&mut self, origin: u8);

    /// Executes one `wait <polarity> gpio <pin>` ahead of the program. The unit stalls
    /// on it once enabled.
    fn inject_wait(&mut self, trigger: Trigger);

    /// Starts or stops the unit.
    fn set_enabled(&mut self, enabled: bool);

    /// Lets the capture program past its arm gate. Free-running units are released
    /// right after configuration.
    fn release_gate(&mut self);

    /// Whether the receive queue is empty.
    fn rx_is_empty(&mut self) -> bool;

    /// Pops one word from the receive queue, if any.
    fn rx_pop(&mut self) -> Option<u32>;

    /// Gates `line` on this unit's "receive queue not empty" condition.
    fn set_rx_interrupt(&mut self, line: InterruptLine, enabled: bool);

    /// Arms `channel` to move one word per data-ready request from the receive queue
    /// into successive `buffer` words, enables the unit, releases the arm gate, and
    /// resolves once `buffer` is full.
    ///
    /// Blocks indefinitely until the trigger fires. Dropping the future aborts the
    /// transfer.
    async fn transfer(&mut self, channel: &mut Self::Channel, buffer: &mut [u32]);

    /// Resolves with the next receive-queue word, sleeping on the receive interrupt.
    async fn pull_when_ready(&mut self) -> u32;
}

/// The hardware behind one sampling block: shared instruction memory, pins, clocks.
pub trait SamplingPlatform {
    /// Sampling lane type handed out by the lane pool.
    type Unit: SamplingUnit<Channel = Self::Channel>;
    /// Transfer channel type handed out by the channel pool.
    type Channel;
    /// A program resident in instruction memory.
    type Program: ProgramHandle;

    /// System clock feeding the sampling units.
    fn base_clock_hz(&self) -> u32;

    /// Places `program` in instruction memory.
    ///
    /// # Errors
    /// Returns [`Error::ResourceExhausted`] for [`ProgramSpace`] if it does not fit.
    ///
    /// [`ProgramSpace`]: crate::resources::Resource::ProgramSpace
    fn load_program(&mut self, program: &Program) -> Result<Self::Program>;

    /// Frees the instruction memory `program` occupies.
    fn unload_program(&mut self, program: Self::Program);

    /// Wires pins, sets pulls and pin directions, and applies `config` with `program`.
    /// The unit is left disabled.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfiguration`] if a pin is not available to this block.
    fn configure_unit(
        &mut self,
        unit: &mut Self::Unit,
        program: &Self::Program,
        config: &SamplerConfig,
    ) -> Result<()>;
}

/// A claimed, configured, running sampling unit and the program it executes.
pub struct ConfiguredUnit<P: SamplingPlatform> {
    lane: Claim<P::Unit>,
    program: P::Program,
    config: SamplerConfig,
}

impl<P: SamplingPlatform> ConfiguredUnit<P> {
    /// Index of the claimed lane.
    #[must_use]
    pub const fn lane(&self) -> usize {
        self.lane.index()
    }

    /// The configuration applied to the unit.
    #[must_use]
    pub const fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Origin of the loaded program.
    #[must_use]
    pub fn origin(&self) -> u8 {
        self.program.origin()
    }

    pub(crate) fn unit_mut(&mut self) -> &mut P::Unit {
        &mut self.lane
    }

    /// Disable, clear, restart, jump to the program start, and run again.
    pub(crate) fn restart_running(&mut self) {
        let origin = self.program.origin();
        self.lane.restart(origin);
        self.lane.set_enabled(true);
        self.lane.release_gate();
    }
}

impl<P: SamplingPlatform, const LANES: usize, const CHANNELS: usize>
    SamplingResources<P, LANES, CHANNELS>
{
    /// Claims program space and a lane, applies `config`, and starts the unit
    /// free-running. On any failure every partial claim is returned first.
    pub(crate) fn claim_unit(
        &mut self,
        program: &Program,
        config: SamplerConfig,
    ) -> Result<ConfiguredUnit<P>> {
        let loaded = self.platform.load_program(program)?;
        let mut lane = match self.lanes.claim() {
            Ok(lane) => lane,
            Err(err) => {
                self.platform.unload_program(loaded);
                return Err(err);
            }
        };

        if let Err(err) = self.platform.configure_unit(&mut lane, &loaded, &config) {
            self.platform.unload_program(loaded);
            if self.lanes.release(lane).is_err() {
                log_warn!("sampler: lane slot already filled while unwinding");
            }
            return Err(err);
        }

        lane.set_enabled(true);
        lane.release_gate();
        log_debug!(
            "sampler: lane {} runs {} pin(s) from GPIO {}",
            lane.index(),
            config.in_pin_count().get(),
            config.in_pin_base()
        );

        Ok(ConfiguredUnit {
            lane,
            program: loaded,
            config,
        })
    }

    /// Stops the unit and returns its lane and program space.
    pub(crate) fn release_unit(&mut self, unit: ConfiguredUnit<P>) -> Result<()> {
        let ConfiguredUnit {
            mut lane, program, ..
        } = unit;
        lane.set_enabled(false);
        log_debug!("sampler: lane {} released", lane.index());
        self.platform.unload_program(program);
        self.lanes.release(lane)
    }
}
