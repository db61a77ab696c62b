//! PIO interrupt bindings and the per-PIO items the embassy adapter dispatches on.
//!
//! `PIOx_IRQ_0` belongs to embassy-rp's driver (FIFO and IRQ-flag wakers).
//! `PIOx_IRQ_1` is the NEC notification line, serviced by [`NecNotifyHandler`].

#![cfg(target_os = "none")]

use core::marker::PhantomData;

use embassy_rp::interrupt::typelevel::{Binding, Handler, Interrupt};
use embassy_rp::peripherals::{PIO0, PIO1};
use embassy_rp::pio::{Instance, InterruptHandler};

use crate::notify::NecNotifier;
use crate::rp::service_notify_line;

/// System interrupt line the notification handler is bound to.
pub const NOTIFY_LINE: u8 = 1;

/// Notification state for decoders on PIO0.
pub static PIO0_NEC_NOTIFIER: NecNotifier = NecNotifier::new();

/// Notification state for decoders on PIO1.
pub static PIO1_NEC_NOTIFIER: NecNotifier = NecNotifier::new();

/// Trait mapping a PIO peripheral to its interrupt bindings and registers.
#[doc(hidden)] // Internal bound reused across the adapter.
pub trait PioIrqMap: Instance {
    /// Interrupt binding type for this PIO resource.
    type Irqs: Binding<Self::Interrupt, InterruptHandler<Self>>;

    /// Returns interrupt bindings for this PIO resource.
    fn irqs() -> Self::Irqs;

    /// Raw register block, for interrupt gating embassy-rp does not expose.
    fn regs() -> embassy_rp::pac::pio::Pio;

    /// The notifier [`NecNotifyHandler`] feeds for this PIO.
    fn nec_notifier() -> &'static NecNotifier;

    /// Clears and unmasks the notification line in the NVIC.
    fn unmask_notify_line();
}

/// Services the notification line: one popped word per pending lane per entry.
pub struct NecNotifyHandler<PIO: Instance> {
    _pio: PhantomData<PIO>,
}

::embassy_rp::bind_interrupts! {
    pub struct Pio0Irqs {
        PIO0_IRQ_0 => ::embassy_rp::pio::InterruptHandler<::embassy_rp::peripherals::PIO0>;
        PIO0_IRQ_1 => crate::pio_irqs::NecNotifyHandler<::embassy_rp::peripherals::PIO0>;
    }
}

::embassy_rp::bind_interrupts! {
    pub struct Pio1Irqs {
        PIO1_IRQ_0 => ::embassy_rp::pio::InterruptHandler<::embassy_rp::peripherals::PIO1>;
        PIO1_IRQ_1 => crate::pio_irqs::NecNotifyHandler<::embassy_rp::peripherals::PIO1>;
    }
}

#[expect(unsafe_code, reason = "interrupt handlers are unsafe fns by trait definition")]
impl Handler<embassy_rp::interrupt::typelevel::PIO0_IRQ_1> for NecNotifyHandler<PIO0> {
    unsafe fn on_interrupt() {
        service_notify_line::<PIO0>();
    }
}

#[expect(unsafe_code, reason = "interrupt handlers are unsafe fns by trait definition")]
impl Handler<embassy_rp::interrupt::typelevel::PIO1_IRQ_1> for NecNotifyHandler<PIO1> {
    unsafe fn on_interrupt() {
        service_notify_line::<PIO1>();
    }
}

impl PioIrqMap for PIO0 {
    type Irqs = Pio0Irqs;

    fn irqs() -> Self::Irqs {
        Pio0Irqs
    }

    fn regs() -> embassy_rp::pac::pio::Pio {
        embassy_rp::pac::PIO0
    }

    fn nec_notifier() -> &'static NecNotifier {
        &PIO0_NEC_NOTIFIER
    }

    #[expect(unsafe_code, reason = "NVIC unmask of a line with a bound handler")]
    fn unmask_notify_line() {
        embassy_rp::interrupt::typelevel::PIO0_IRQ_1::unpend();
        // SAFETY: `Pio0Irqs` binds `NecNotifyHandler<PIO0>` to this line.
        unsafe { embassy_rp::interrupt::typelevel::PIO0_IRQ_1::enable() };
    }
}

impl PioIrqMap for PIO1 {
    type Irqs = Pio1Irqs;

    fn irqs() -> Self::Irqs {
        Pio1Irqs
    }

    fn regs() -> embassy_rp::pac::pio::Pio {
        embassy_rp::pac::PIO1
    }

    fn nec_notifier() -> &'static NecNotifier {
        &PIO1_NEC_NOTIFIER
    }

    #[expect(unsafe_code, reason = "NVIC unmask of a line with a bound handler")]
    fn unmask_notify_line() {
        embassy_rp::interrupt::typelevel::PIO1_IRQ_1::unpend();
        // SAFETY: `Pio1Irqs` binds `NecNotifyHandler<PIO1>` to this line.
        unsafe { embassy_rp::interrupt::typelevel::PIO1_IRQ_1::enable() };
    }
}
