//! embassy-rp implementation of the sampling platform: PIO state machines, DMA
//! `dma_pull` transfers, and the interrupt-driven NEC notification line.

use core::cell::RefCell;

use embassy_executor::Spawner;
use embassy_rp::Peri;
use embassy_rp::dma::AnyChannel;
use embassy_rp::gpio::Pull;
use embassy_rp::pio::{
    Common, Config, Direction, FifoJoin, Instance, IrqFlags, LoadedProgram, Pin, Pio, PioPin,
    ShiftConfig, ShiftDirection as PioShiftDirection, StateMachine,
};
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use fixed::traits::ToFixed;
use static_cell::StaticCell;

use crate::constants::{ARM_GATE_IRQ, GPIO_COUNT, SAMPLING_LANE_COUNT};
use crate::error::{ConfigError, Error, Result};
use crate::nec::NecEvent;
use crate::notify::{NecNotifier, RxQueue};
use crate::pio_irqs::{NOTIFY_LINE, PioIrqMap};
use crate::program::{Program, jump_to, wait_for_trigger};
use crate::resources::{InterruptLine, Resource, SamplingResources};
use crate::sampler::{
    InputPull, ProgramHandle, SamplerConfig, SamplingPlatform, SamplingUnit, ShiftDirection,
    Trigger,
};

/// Sampling resources backed by one PIO block.
pub type RpResources<PIO, const CHANNELS: usize> =
    SamplingResources<RpPlatform<PIO>, SAMPLING_LANE_COUNT, CHANNELS>;

/// Shared PIO bus: the block's `Common` and its IRQ flags.
pub struct PioBus<'d, PIO: Instance> {
    common: Mutex<CriticalSectionRawMutex, RefCell<Common<'d, PIO>>>,
    irq_flags: Mutex<CriticalSectionRawMutex, IrqFlags<'d, PIO>>,
}

impl<'d, PIO: Instance> PioBus<'d, PIO> {
    /// Wraps the resources split off `Pio::new`.
    pub fn new(common: Common<'d, PIO>, irq_flags: IrqFlags<'d, PIO>) -> Self {
        Self {
            common: Mutex::new(RefCell::new(common)),
            irq_flags: Mutex::new(irq_flags),
        }
    }

    /// Access the common resource for loading programs and making pins.
    pub fn with_common<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut Common<'d, PIO>) -> R,
    {
        self.common.lock(|common_cell: &RefCell<Common<'d, PIO>>| {
            let mut common = common_cell.borrow_mut();
            f(&mut *common)
        })
    }

    fn set_irq_flag(&self, flag: u8) {
        self.irq_flags.lock(|flags| flags.set(usize::from(flag)));
    }

    fn clear_irq_flag(&self, flag: u8) {
        self.irq_flags.lock(|flags| flags.clear(usize::from(flag)));
    }
}

/// One of the block's four state machines.
pub enum Lane<'d, PIO: Instance> {
    /// State machine 0.
    Sm0(StateMachine<'d, PIO, 0>),
    /// State machine 1.
    Sm1(StateMachine<'d, PIO, 1>),
    /// State machine 2.
    Sm2(StateMachine<'d, PIO, 2>),
    /// State machine 3.
    Sm3(StateMachine<'d, PIO, 3>),
}

macro_rules! on_sm {
    ($lane:expr, $sm:ident => $body:expr) => {
        match $lane {
            Lane::Sm0($sm) => $body,
            Lane::Sm1($sm) => $body,
            Lane::Sm2($sm) => $body,
            Lane::Sm3($sm) => $body,
        }
    };
}

/// A state machine plus the bus it shares with its siblings.
pub struct RpUnit<PIO: Instance + 'static> {
    lane: Lane<'static, PIO>,
    bus: &'static PioBus<'static, PIO>,
    index: u8,
}

impl<PIO: Instance + 'static> RpUnit<PIO> {
    #[expect(unsafe_code, reason = "exec_instr is unsafe in embassy-rp")]
    fn exec(&mut self, instr: u16) {
        on_sm!(&mut self.lane, sm => {
            // SAFETY: only `jmp` and `wait` are executed; neither touches the
            // program counter of another state machine or shared memory.
            unsafe { sm.exec_instr(instr) };
        });
    }
}

impl<PIO: PioIrqMap> SamplingUnit for RpUnit<PIO> {
    type Channel = Peri<'static, AnyChannel>;

    fn restart(&mut self, origin: u8) {
        on_sm!(&mut self.lane, sm => {
            sm.set_enable(false);
            sm.clear_fifos();
            sm.restart();
        });
        self.bus.clear_irq_flag(ARM_GATE_IRQ + self.index);
        self.exec(jump_to(origin));
    }

    fn inject_wait(&mut self, trigger: Trigger) {
        self.exec(wait_for_trigger(trigger));
    }

    fn set_enabled(&mut self, enabled: bool) {
        on_sm!(&mut self.lane, sm => sm.set_enable(enabled));
    }

    fn release_gate(&mut self) {
        self.bus.set_irq_flag(ARM_GATE_IRQ + self.index);
    }

    fn rx_is_empty(&mut self) -> bool {
        on_sm!(&mut self.lane, sm => sm.rx().empty())
    }

    fn rx_pop(&mut self) -> Option<u32> {
        on_sm!(&mut self.lane, sm => sm.rx().try_pull())
    }

    fn set_rx_interrupt(&mut self, line: InterruptLine, enabled: bool) {
        let mask = 1_u32 << self.index;
        PIO::regs()
            .irqs(usize::from(line.id()))
            .inte()
            .modify(|inte| {
                if enabled {
                    inte.0 |= mask;
                } else {
                    inte.0 &= !mask;
                }
            });
    }

    async fn transfer(&mut self, channel: &mut Peri<'static, AnyChannel>, buffer: &mut [u32]) {
        let bus = self.bus;
        let gate = ARM_GATE_IRQ + self.index;
        on_sm!(&mut self.lane, sm => {
            sm.set_enable(true);
            let transfer = sm.rx().dma_pull(channel.reborrow(), buffer, false);
            bus.set_irq_flag(gate);
            transfer.await;
        });
    }

    async fn pull_when_ready(&mut self) -> u32 {
        on_sm!(&mut self.lane, sm => sm.rx().wait_pull().await)
    }
}

impl<PIO: Instance> ProgramHandle for LoadedProgram<'static, PIO> {
    fn origin(&self) -> u8 {
        self.origin
    }
}

/// The PIO block, its wired pins, and the system clock.
pub struct RpPlatform<PIO: Instance + 'static> {
    bus: &'static PioBus<'static, PIO>,
    pins: heapless::Vec<Pin<'static, PIO>, { GPIO_COUNT as usize }>,
}

impl<PIO: Instance + 'static> RpPlatform<PIO> {
    /// Hands a GPIO to this block so units can sample it.
    ///
    /// # Errors
    /// Returns [`ConfigError::PinUnavailable`] if every pin slot is taken.
    pub fn wire_pin(&mut self, pin: Peri<'static, impl PioPin>) -> Result<()> {
        let pin = self.bus.with_common(|common| common.make_pio_pin(pin));
        let number = pin.pin();
        self.pins
            .push(pin)
            .map_err(|_| ConfigError::PinUnavailable(number).into())
    }
}

impl<PIO: PioIrqMap> SamplingPlatform for RpPlatform<PIO> {
    type Unit = RpUnit<PIO>;
    type Channel = Peri<'static, AnyChannel>;
    type Program = LoadedProgram<'static, PIO>;

    fn base_clock_hz(&self) -> u32 {
        embassy_rp::clocks::clk_sys_freq()
    }

    fn load_program(&mut self, program: &Program) -> Result<Self::Program> {
        self.bus
            .with_common(|common| common.try_load_program(program))
            .map_err(|_| Error::ResourceExhausted(Resource::ProgramSpace))
    }

    #[expect(unsafe_code, reason = "free_instr is unsafe in embassy-rp")]
    fn unload_program(&mut self, program: Self::Program) {
        self.bus.with_common(|common| {
            // SAFETY: the lane running this program was disabled before the program
            // was handed back, and no other state machine executes it.
            unsafe { common.free_instr(program.used_memory) };
        });
    }

    fn configure_unit(
        &mut self,
        unit: &mut RpUnit<PIO>,
        program: &Self::Program,
        config: &SamplerConfig,
    ) -> Result<()> {
        let pull = match config.pull() {
            InputPull::None => Pull::None,
            InputPull::Up => Pull::Up,
        };
        let mut wired = 0_u32;
        for pin in &mut self.pins {
            if config.in_pins().any(|number| number == pin.pin()) {
                pin.set_pull(pull);
                wired |= 1 << pin.pin();
            }
        }
        if let Some(missing) = config.in_pins().find(|&number| wired & (1 << number) == 0) {
            return Err(ConfigError::PinUnavailable(missing).into());
        }

        let in_pins: heapless::Vec<&Pin<'static, PIO>, 32> = config
            .in_pins()
            .filter_map(|number| self.pins.iter().find(|pin| pin.pin() == number))
            .collect();

        let mut cfg = Config::default();
        cfg.use_program(program, &[]);
        cfg.set_in_pins(&in_pins);
        if let Some(jmp_pin) = config
            .jmp_pin()
            .and_then(|number| self.pins.iter().find(|pin| pin.pin() == number))
        {
            cfg.set_jmp_pin(jmp_pin);
        }

        let mut shift_in = ShiftConfig::default();
        shift_in.direction = match config.shift() {
            ShiftDirection::Right => PioShiftDirection::Right,
        };
        shift_in.auto_fill = true;
        shift_in.threshold = config.push_threshold();
        cfg.shift_in = shift_in;
        cfg.fifo_join = FifoJoin::RxOnly;
        cfg.clock_divider = config.clock_divider().ratio().to_fixed();

        on_sm!(&mut unit.lane, sm => {
            sm.set_enable(false);
            sm.set_config(&cfg);
            sm.set_pin_dirs(Direction::In, &in_pins);
        });
        Ok(())
    }
}

/// Splits `pio` into a sampling context with `channels` as transfer channels.
///
/// Interrupt line 0 stays with embassy-rp's driver; decoders notify on line 1.
pub fn rp_resources<PIO: PioIrqMap, const CHANNELS: usize>(
    pio: Peri<'static, PIO>,
    bus_cell: &'static StaticCell<PioBus<'static, PIO>>,
    channels: [Peri<'static, AnyChannel>; CHANNELS],
) -> RpResources<PIO, CHANNELS> {
    let Pio {
        common,
        irq_flags,
        sm0,
        sm1,
        sm2,
        sm3,
        ..
    } = Pio::new(pio, PIO::irqs());
    let bus: &'static PioBus<'static, PIO> = bus_cell.init(PioBus::new(common, irq_flags));
    PIO::unmask_notify_line();

    let units = [
        RpUnit { lane: Lane::Sm0(sm0), bus, index: 0 },
        RpUnit { lane: Lane::Sm1(sm1), bus, index: 1 },
        RpUnit { lane: Lane::Sm2(sm2), bus, index: 2 },
        RpUnit { lane: Lane::Sm3(sm3), bus, index: 3 },
    ];
    let platform = RpPlatform {
        bus,
        pins: heapless::Vec::new(),
    };
    SamplingResources::new(platform, units, channels).reserve_interrupt_line(0)
}

/// A lane's receive FIFO, read straight from the registers inside the ISR.
struct PacRx {
    regs: embassy_rp::pac::pio::Pio,
    lane: usize,
}

impl RxQueue for PacRx {
    fn is_empty(&mut self) -> bool {
        self.regs.fstat().read().rxempty() & (1 << self.lane) != 0
    }

    fn pop(&mut self) -> Option<u32> {
        if self.is_empty() {
            None
        } else {
            Some(self.regs.rxf(self.lane).read())
        }
    }
}

/// Body of the notification ISR. A lane whose notifier is off is masked so the
/// level interrupt cannot storm.
pub(crate) fn service_notify_line<PIO: PioIrqMap>() {
    let regs = PIO::regs();
    let line = regs.irqs(usize::from(NOTIFY_LINE));
    // The low nibble holds the four "receive queue not empty" sources.
    let pending = line.ints().read().0 & 0xF;
    let mut queues: [PacRx; SAMPLING_LANE_COUNT] =
        core::array::from_fn(|lane| PacRx { regs, lane });
    let to_mask = PIO::nec_notifier().service_lanes(pending, &mut queues);
    if to_mask != 0 {
        line.inte().modify(|inte| inte.0 &= !to_mask);
    }
}

#[embassy_executor::task(pool_size = 2)]
async fn nec_event_log_task(notifier: &'static NecNotifier) -> ! {
    loop {
        match notifier.next_event().await {
            NecEvent::Decoded(frame) => defmt::info!(
                "NEC: address=0x{:02X} data=0x{:02X} repeat={}",
                frame.address,
                frame.data,
                frame.repeat
            ),
            NecEvent::Malformed(raw) => defmt::warn!("NEC: malformed frame 0x{:08X}", raw.0),
        }
    }
}

/// Spawns a task that logs every event `notifier` delivers.
///
/// # Errors
/// Returns [`Error::TaskSpawn`] if both task slots are in use.
pub fn spawn_nec_event_log(spawner: Spawner, notifier: &'static NecNotifier) -> Result<()> {
    let token = nec_event_log_task(notifier).map_err(Error::TaskSpawn)?;
    spawner.spawn(token);
    Ok(())
}
