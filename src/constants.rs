// Hardware and protocol constants shared across the crate.

/// System clock the RP2040 runs at after `embassy_rp::init` with the default config.
pub const DEFAULT_BASE_CLOCK_HZ: u32 = 125_000_000;

/// Capacity used by the demo firmware for one capture, in 32-bit words.
pub const CAPTURE_BUFFER_WORDS: usize = 512;

/// Width of one receive-queue word.
pub const WORD_BITS: u32 = 32;

/// GPIOs usable as sample or trigger inputs.
pub const GPIO_COUNT: u8 = 30;

/// Sampling lanes (state machines) per PIO block.
pub const SAMPLING_LANE_COUNT: usize = 4;

/// System interrupt lines per PIO block (`PIOx_IRQ_0`, `PIOx_IRQ_1`).
pub const INTERRUPT_LINE_COUNT: usize = 2;

/// Base of the PIO-internal IRQ flags used as the capture arm gate.
/// The capture program waits on this flag relative to its state machine index.
pub const ARM_GATE_IRQ: u8 = 4;

/// NEC burst period.
pub const NEC_BURST_PERIOD_S: f64 = 562.5e-6;

/// The NEC receive program expects 10 state machine ticks per burst period.
pub const NEC_TICKS_PER_BURST: f64 = 10.0;

/// Depth of the decoded-event queue fed by the notification handler.
pub const NEC_EVENT_QUEUE_DEPTH: usize = 8;
