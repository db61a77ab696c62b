//! A simulated PIO block for host tests.
//!
//! Four sampling lanes share one [`SimHandle`] bus that holds the GPIO levels, the
//! waveform the capture lanes sample, each lane's receive queue, the instruction
//! memory, and a log of every hardware operation in the order it happened.
//!
//! A notifier bound with [`SimHandle::bind_notifier`] plays the block's interrupt
//! handler: whenever a lane gated onto an interrupt line has a word waiting, the bus
//! runs [`NecNotifier::service_lanes`] and masks the lanes it reports.

use core::cell::RefCell;
use core::future::poll_fn;
use core::task::{Poll, Waker};
use std::collections::VecDeque;
use std::rc::Rc;
use std::vec::Vec;

use crate::constants::{DEFAULT_BASE_CLOCK_HZ, SAMPLING_LANE_COUNT};
use crate::error::{ConfigError, Result};
use crate::notify::{NecNotifier, RxQueue};
use crate::program::{InstructionMemory, Program, ProgramSlot};
use crate::resources::{InterruptLine, SamplingResources};
use crate::sampler::{SamplerConfig, SamplingPlatform, SamplingUnit, Trigger};

/// Depth of a joined receive FIFO.
pub const SIM_RX_FIFO_DEPTH: usize = 8;

/// A simulated hardware operation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SimOp {
    /// `configure_unit` applied a configuration.
    Configured(SamplerConfig),
    /// Restarted at the given origin.
    Restarted(u8),
    /// A trigger wait was executed ahead of the program.
    WaitInjected(Trigger),
    /// Enable bit written.
    Enabled(bool),
    /// Arm gate released.
    GateReleased,
    /// A transfer channel began draining the receive queue.
    TransferStarted {
        /// Index of the transfer channel.
        channel: usize,
        /// Words requested.
        words: usize,
    },
    /// The transfer filled its buffer.
    TransferComplete,
    /// Receive-not-empty interrupt gating changed.
    RxInterrupt {
        /// The gated line.
        line: InterruptLine,
        /// New gating.
        enabled: bool,
    },
}

/// One logged operation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SimEvent {
    /// The lane it was applied to.
    pub lane: usize,
    /// What happened.
    pub op: SimOp,
}

#[derive(Debug, Default)]
struct SimLane {
    config: Option<SamplerConfig>,
    enabled: bool,
    gate_released: bool,
    pending_wait: Option<Trigger>,
    rx: VecDeque<u32>,
    rx_interrupt: Option<InterruptLine>,
}

#[derive(Debug)]
struct SimBus {
    levels: u32,
    wired_pins: u32,
    waveform: VecDeque<u32>,
    lanes: [SimLane; SAMPLING_LANE_COUNT],
    memory: InstructionMemory,
    log: Vec<SimEvent>,
    wakers: Vec<Waker>,
    notifier: Option<&'static NecNotifier>,
}

struct SimRx<'a>(&'a mut VecDeque<u32>);

impl RxQueue for SimRx<'_> {
    fn is_empty(&mut self) -> bool {
        self.0.is_empty()
    }

    fn pop(&mut self) -> Option<u32> {
        self.0.pop_front()
    }
}

impl SimBus {
    fn record(&mut self, lane: usize, op: SimOp) {
        self.log.push(SimEvent { lane, op });
    }

    fn wake_all(&mut self) {
        for waker in self.wakers.drain(..) {
            waker.wake();
        }
    }

    fn level(&self, pin: u8) -> bool {
        (self.levels >> pin) & 1 == 1
    }

    fn lane_mut(&mut self, lane: usize) -> Option<&mut SimLane> {
        self.lanes.get_mut(lane)
    }

    /// Gated lanes with a word waiting, bit `n` for lane `n`.
    fn pending_rx_interrupts(&self) -> u32 {
        (0_u32..)
            .zip(&self.lanes)
            .filter(|(_, sim_lane)| sim_lane.rx_interrupt.is_some() && !sim_lane.rx.is_empty())
            .fold(0, |pending, (lane, _)| pending | (1 << lane))
    }

    /// Re-enters the handler until no gated lane has a word waiting. Every pass
    /// either pops or masks each pending lane.
    fn raise_rx_interrupts(&mut self) {
        let Some(notifier) = self.notifier else {
            return;
        };
        loop {
            let pending = self.pending_rx_interrupts();
            if pending == 0 {
                return;
            }
            let mut queues = self.lanes.each_mut().map(|sim_lane| SimRx(&mut sim_lane.rx));
            let to_mask = notifier.service_lanes(pending, &mut queues);
            for lane in 0..SAMPLING_LANE_COUNT {
                if to_mask & (1 << lane) == 0 {
                    continue;
                }
                let masked = self
                    .lane_mut(lane)
                    .and_then(|sim_lane| sim_lane.rx_interrupt.take());
                if let Some(line) = masked {
                    self.record(
                        lane,
                        SimOp::RxInterrupt {
                            line,
                            enabled: false,
                        },
                    );
                }
            }
        }
    }
}

/// Shared access to the simulated bus, for scripting inputs and inspecting effects.
#[derive(Clone, Debug)]
pub struct SimHandle(Rc<RefCell<SimBus>>);

impl SimHandle {
    fn new() -> Self {
        Self(Rc::new(RefCell::new(SimBus {
            levels: 0,
            wired_pins: u32::MAX,
            waveform: VecDeque::new(),
            lanes: Default::default(),
            memory: InstructionMemory::default(),
            log: Vec::new(),
            wakers: Vec::new(),
            notifier: None,
        })))
    }

    /// Routes every interrupt line to `notifier`. Words already waiting on gated
    /// lanes are handed over at once.
    pub fn bind_notifier(&self, notifier: &'static NecNotifier) {
        let mut bus = self.0.borrow_mut();
        bus.notifier = Some(notifier);
        bus.raise_rx_interrupts();
    }

    /// Drives `pin` to `high`.
    pub fn set_level(&self, pin: u8, high: bool) {
        let mut bus = self.0.borrow_mut();
        if high {
            bus.levels |= 1 << pin;
        } else {
            bus.levels &= !(1 << pin);
        }
        bus.wake_all();
    }

    /// Appends words to the waveform capture lanes sample once triggered.
    /// Past its end, they sample zeros.
    pub fn feed_waveform(&self, words: &[u32]) {
        let mut bus = self.0.borrow_mut();
        bus.waveform.extend(words.iter().copied());
        bus.wake_all();
    }

    /// Places `word` in `lane`'s receive queue as its program would.
    /// Words beyond the FIFO depth are lost.
    pub fn push_rx(&self, lane: usize, word: u32) {
        let mut bus = self.0.borrow_mut();
        if let Some(sim_lane) = bus.lane_mut(lane) {
            if sim_lane.rx.len() < SIM_RX_FIFO_DEPTH {
                sim_lane.rx.push_back(word);
            }
        }
        bus.raise_rx_interrupts();
        bus.wake_all();
    }

    /// Words waiting in `lane`'s receive queue.
    #[must_use]
    pub fn rx_len(&self, lane: usize) -> usize {
        self.0.borrow().lanes.get(lane).map_or(0, |sim_lane| sim_lane.rx.len())
    }

    /// Restricts which GPIOs are wired to the block. Bit `n` set = GPIO `n` wired.
    pub fn set_wired_pins(&self, mask: u32) {
        self.0.borrow_mut().wired_pins = mask;
    }

    /// Whether `lane` is enabled.
    #[must_use]
    pub fn is_enabled(&self, lane: usize) -> bool {
        self.0.borrow().lanes.get(lane).is_some_and(|sim_lane| sim_lane.enabled)
    }

    /// The interrupt line gated on `lane`'s receive queue, if any.
    #[must_use]
    pub fn rx_interrupt(&self, lane: usize) -> Option<InterruptLine> {
        self.0.borrow().lanes.get(lane).and_then(|sim_lane| sim_lane.rx_interrupt)
    }

    /// The configuration last applied to `lane`.
    #[must_use]
    pub fn lane_config(&self, lane: usize) -> Option<SamplerConfig> {
        self.0.borrow().lanes.get(lane).and_then(|sim_lane| sim_lane.config)
    }

    /// Unused instruction memory words.
    #[must_use]
    pub fn free_program_words(&self) -> u32 {
        self.0.borrow().memory.free_words()
    }

    /// Every operation so far, oldest first.
    #[must_use]
    pub fn events(&self) -> Vec<SimEvent> {
        self.0.borrow().log.clone()
    }

    /// Operations on `lane`, oldest first.
    #[must_use]
    pub fn ops(&self, lane: usize) -> Vec<SimOp> {
        self.0
            .borrow()
            .log
            .iter()
            .filter(|event| event.lane == lane)
            .map(|event| event.op)
            .collect()
    }

    /// Forgets logged operations.
    pub fn clear_events(&self) {
        self.0.borrow_mut().log.clear();
    }
}

/// A simulated DMA channel.
#[derive(Debug)]
pub struct SimChannel(usize);

impl SimChannel {
    /// Channel number.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.0
    }
}

/// One simulated state machine.
#[derive(Debug)]
pub struct SimUnit {
    lane: usize,
    bus: SimHandle,
}

impl SimUnit {
    fn with_lane<R>(&self, f: impl FnOnce(&mut SimBus, usize) -> R) -> R {
        f(&mut self.bus.0.borrow_mut(), self.lane)
    }

    fn update(&self, f: impl FnOnce(&mut SimLane)) {
        self.with_lane(|bus, lane| {
            if let Some(sim_lane) = bus.lane_mut(lane) {
                f(sim_lane);
            }
        });
    }
}

impl SamplingUnit for SimUnit {
    type Channel = SimChannel;

    fn restart(&mut self, origin: u8) {
        self.update(|sim_lane| {
            sim_lane.enabled = false;
            sim_lane.gate_released = false;
            sim_lane.pending_wait = None;
            sim_lane.rx.clear();
        });
        self.with_lane(|bus, lane| bus.record(lane, SimOp::Restarted(origin)));
    }

    fn inject_wait(&mut self, trigger: Trigger) {
        self.update(|sim_lane| sim_lane.pending_wait = Some(trigger));
        self.with_lane(|bus, lane| bus.record(lane, SimOp::WaitInjected(trigger)));
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.update(|sim_lane| sim_lane.enabled = enabled);
        self.with_lane(|bus, lane| bus.record(lane, SimOp::Enabled(enabled)));
    }

    fn release_gate(&mut self) {
        self.update(|sim_lane| sim_lane.gate_released = true);
        self.with_lane(|bus, lane| bus.record(lane, SimOp::GateReleased));
    }

    fn rx_is_empty(&mut self) -> bool {
        self.with_lane(|bus, lane| {
            bus.lanes
                .get(lane)
                .is_none_or(|sim_lane| sim_lane.rx.is_empty())
        })
    }

    fn rx_pop(&mut self) -> Option<u32> {
        self.with_lane(|bus, lane| {
            bus.lane_mut(lane)
                .and_then(|sim_lane| sim_lane.rx.pop_front())
        })
    }

    fn set_rx_interrupt(&mut self, line: InterruptLine, enabled: bool) {
        self.update(|sim_lane| sim_lane.rx_interrupt = enabled.then_some(line));
        self.with_lane(|bus, lane| {
            bus.record(lane, SimOp::RxInterrupt { line, enabled });
            bus.raise_rx_interrupts();
        });
    }

    async fn transfer(&mut self, channel: &mut SimChannel, buffer: &mut [u32]) {
        self.set_enabled(true);
        let words = buffer.len();
        let channel = channel.index();
        self.with_lane(|bus, lane| bus.record(lane, SimOp::TransferStarted { channel, words }));
        self.release_gate();

        poll_fn(|cx| {
            let mut bus = self.bus.0.borrow_mut();
            let Some(sim_lane) = bus.lanes.get(self.lane) else {
                return Poll::Pending;
            };
            let running = sim_lane.enabled && sim_lane.gate_released;
            let triggered = sim_lane.pending_wait.is_none_or(|trigger| {
                bus.level(trigger.pin()) == (trigger.polarity().level() == 1)
            });
            if running && triggered {
                Poll::Ready(())
            } else {
                bus.wakers.push(cx.waker().clone());
                Poll::Pending
            }
        })
        .await;

        let mut bus = self.bus.0.borrow_mut();
        for word in buffer.iter_mut() {
            *word = bus.waveform.pop_front().unwrap_or(0);
        }
        if let Some(sim_lane) = bus.lane_mut(self.lane) {
            sim_lane.pending_wait = None;
        }
        bus.record(self.lane, SimOp::TransferComplete);
    }

    async fn pull_when_ready(&mut self) -> u32 {
        poll_fn(|cx| {
            let mut bus = self.bus.0.borrow_mut();
            match bus.lane_mut(self.lane).and_then(|sim_lane| sim_lane.rx.pop_front()) {
                Some(word) => Poll::Ready(word),
                None => {
                    bus.wakers.push(cx.waker().clone());
                    Poll::Pending
                }
            }
        })
        .await
    }
}

/// The simulated block: instruction memory, pin wiring, and clocks.
#[derive(Debug)]
pub struct SimPlatform {
    bus: SimHandle,
    base_clock_hz: u32,
}

impl SamplingPlatform for SimPlatform {
    type Unit = SimUnit;
    type Channel = SimChannel;
    type Program = ProgramSlot;

    fn base_clock_hz(&self) -> u32 {
        self.base_clock_hz
    }

    fn load_program(&mut self, program: &Program) -> Result<ProgramSlot> {
        self.bus.0.borrow_mut().memory.load(program)
    }

    fn unload_program(&mut self, program: ProgramSlot) {
        self.bus.0.borrow_mut().memory.unload(program);
    }

    fn configure_unit(
        &mut self,
        unit: &mut SimUnit,
        _program: &ProgramSlot,
        config: &SamplerConfig,
    ) -> Result<()> {
        let mut bus = self.bus.0.borrow_mut();
        let wired = bus.wired_pins;
        if let Some(pin) = config
            .in_pins()
            .chain(config.jmp_pin())
            .find(|&pin| (wired >> pin) & 1 == 0)
        {
            return Err(ConfigError::PinUnavailable(pin).into());
        }

        if let Some(sim_lane) = bus.lane_mut(unit.lane) {
            *sim_lane = SimLane {
                config: Some(*config),
                ..SimLane::default()
            };
        }
        bus.record(unit.lane, SimOp::Configured(*config));
        Ok(())
    }
}

/// A simulated block at the default 125 MHz clock with `CHANNELS` transfer channels.
#[must_use]
pub fn resources<const CHANNELS: usize>()
-> (SamplingResources<SimPlatform, SAMPLING_LANE_COUNT, CHANNELS>, SimHandle) {
    resources_at(DEFAULT_BASE_CLOCK_HZ)
}

/// A simulated block at `base_clock_hz`.
#[must_use]
pub fn resources_at<const CHANNELS: usize>(
    base_clock_hz: u32,
) -> (SamplingResources<SimPlatform, SAMPLING_LANE_COUNT, CHANNELS>, SimHandle) {
    let bus = SimHandle::new();
    let units = core::array::from_fn(|lane| SimUnit {
        lane,
        bus: bus.clone(),
    });
    let channels = core::array::from_fn(SimChannel);
    let platform = SimPlatform {
        bus: bus.clone(),
        base_clock_hz,
    };
    (SamplingResources::new(platform, units, channels), bus)
}
