//! Interrupt-to-task delivery of decoded NEC frames.
//!
//! The interrupt side calls [`NecNotifier::on_rx_not_empty`], which pops at most one
//! word, decodes it, and pushes the outcome with `try_send`. It never blocks and never
//! touches the interrupt gating. [`NecNotifier::service_lanes`] is the whole handler
//! body for one interrupt line; it reports which lanes the caller must mask. The
//! foreground side awaits [`NecNotifier::next_event`].

use core::cell::Cell;
use core::fmt;

use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel as EmbassyChannel;
use embassy_sync::signal::Signal;
use portable_atomic::{AtomicBool, AtomicU32, Ordering};

use crate::constants::NEC_EVENT_QUEUE_DEPTH;
use crate::nec::{NecEvent, RawFrame, RepeatTracker};
use crate::resources::{Claim, InterruptLine};

/// Anything a notification handler can pop words from.
pub trait RxQueue {
    /// Whether a word is waiting.
    fn is_empty(&mut self) -> bool;
    /// Removes and returns the oldest word.
    fn pop(&mut self) -> Option<u32>;
}

/// A word that has already left the hardware queue, handed over by an async reader.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PendingFrame(pub Option<u32>);

impl RxQueue for PendingFrame {
    fn is_empty(&mut self) -> bool {
        self.0.is_none()
    }

    fn pop(&mut self) -> Option<u32> {
        self.0.take()
    }
}

/// Outcome of one handler invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Delivery {
    /// One word was popped, decoded, and queued.
    Delivered(NecEvent),
    /// The queue was already drained, e.g. coalesced interrupts or a polling consumer.
    Empty,
    /// Notifications are off; the queue was left alone.
    Disabled,
    /// The event queue was full; the event was counted and discarded.
    Dropped(NecEvent),
}

/// Static resources shared by the interrupt side and the foreground consumer.
pub struct NecNotifier<const N: usize = NEC_EVENT_QUEUE_DEPTH> {
    events: EmbassyChannel<CriticalSectionRawMutex, NecEvent, N>,
    enabled: AtomicBool,
    changed: Signal<CriticalSectionRawMutex, bool>,
    tracker: BlockingMutex<CriticalSectionRawMutex, Cell<RepeatTracker>>,
    dropped: AtomicU32,
}

impl<const N: usize> NecNotifier<N> {
    /// Creates the notifier, disabled. Intended for a `static`.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            events: EmbassyChannel::new(),
            enabled: AtomicBool::new(false),
            changed: Signal::new(),
            tracker: BlockingMutex::new(Cell::new(RepeatTracker::new())),
            dropped: AtomicU32::new(0),
        }
    }

    /// Whether the handler currently consumes words.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub(crate) fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
        if !enabled {
            self.tracker.lock(|tracker| tracker.set(RepeatTracker::new()));
        }
        self.changed.signal(enabled);
    }

    /// Interrupt-side handler: pops exactly one word if present and enqueues its
    /// decoded form.
    pub fn on_rx_not_empty(&self, rx: &mut impl RxQueue) -> Delivery {
        if !self.is_enabled() {
            return Delivery::Disabled;
        }
        if rx.is_empty() {
            return Delivery::Empty;
        }
        let Some(word) = rx.pop() else {
            return Delivery::Empty;
        };

        let event = self.tracker.lock(|cell| {
            let mut tracker = cell.get();
            let event = tracker.observe(RawFrame(word));
            cell.set(tracker);
            event
        });

        match self.events.try_send(event) {
            Ok(()) => Delivery::Delivered(event),
            Err(_) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                Delivery::Dropped(event)
            }
        }
    }

    /// Handler body for one interrupt line.
    ///
    /// Bit `n` of `pending` is set when lane `n`'s receive-not-empty condition is
    /// asserted on the line, and `queues[n]` is that lane's queue. Each pending lane
    /// gets one [`Self::on_rx_not_empty`] call. Returns the lanes that found
    /// notifications off; the caller masks them so the level interrupt stops firing.
    pub fn service_lanes<Q: RxQueue>(&self, pending: u32, queues: &mut [Q]) -> u32 {
        let mut to_mask = 0;
        for (lane, queue) in (0_u32..).zip(queues.iter_mut()) {
            let bit = 1_u32.checked_shl(lane).unwrap_or(0);
            if pending & bit == 0 {
                continue;
            }
            if self.on_rx_not_empty(queue) == Delivery::Disabled {
                to_mask |= bit;
            }
        }
        to_mask
    }

    /// Waits for the next decoded or malformed frame.
    pub async fn next_event(&self) -> NecEvent {
        self.events.receive().await
    }

    /// The next event, if one is already queued.
    pub fn try_next_event(&self) -> Option<NecEvent> {
        self.events.try_receive().ok()
    }

    /// Resolves on the next enable/disable with the new state.
    pub async fn wait_for_change(&self) -> bool {
        self.changed.wait().await
    }

    /// Events discarded because the queue was full.
    #[must_use]
    pub fn dropped_events(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl<const N: usize> fmt::Debug for NecNotifier<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NecNotifier")
            .field("enabled", &self.is_enabled())
            .field("queued", &self.events.len())
            .field("dropped", &self.dropped_events())
            .finish_non_exhaustive()
    }
}

impl<const N: usize> Default for NecNotifier<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// An interrupt line gated on one decoder lane's receive queue.
#[derive(Debug)]
pub struct NotificationBinding {
    pub(crate) line: Claim<InterruptLine>,
    pub(crate) lane: usize,
}

impl NotificationBinding {
    /// The bound interrupt line.
    #[must_use]
    pub fn line(&self) -> InterruptLine {
        *self.line
    }

    /// The lane whose "receive queue not empty" condition drives the line.
    #[must_use]
    pub const fn lane(&self) -> usize {
        self.lane
    }
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
    use heapless::Deque;

    use super::*;
    use crate::nec::{NecFrame, encode};

    struct Fifo(Deque<u32, 8>);

    impl Fifo {
        fn with(words: &[u32]) -> Self {
            let mut fifo = Deque::new();
            for word in words {
                fifo.push_back(*word).expect("room for test words");
            }
            Self(fifo)
        }
    }

    impl RxQueue for Fifo {
        fn is_empty(&mut self) -> bool {
            self.0.is_empty()
        }

        fn pop(&mut self) -> Option<u32> {
            self.0.pop_front()
        }
    }

    #[test]
    fn disabled_handler_leaves_the_queue_alone() {
        let notifier: NecNotifier = NecNotifier::new();
        let mut fifo = Fifo::with(&[encode(1, 2).0]);
        assert_eq!(notifier.on_rx_not_empty(&mut fifo), Delivery::Disabled);
        assert_eq!(fifo.0.len(), 1);
    }

    #[test]
    fn handler_pops_exactly_one_word_per_call() {
        let notifier: NecNotifier = NecNotifier::new();
        notifier.set_enabled(true);
        let mut fifo = Fifo::with(&[encode(1, 2).0, 0xDEAD_BEEF]);

        let first = notifier.on_rx_not_empty(&mut fifo);
        assert_eq!(
            first,
            Delivery::Delivered(NecEvent::Decoded(NecFrame {
                address: 1,
                data: 2,
                repeat: 0
            }))
        );
        assert_eq!(fifo.0.len(), 1);

        let second = notifier.on_rx_not_empty(&mut fifo);
        assert_eq!(
            second,
            Delivery::Delivered(NecEvent::Malformed(RawFrame(0xDEAD_BEEF)))
        );
        assert_eq!(notifier.on_rx_not_empty(&mut fifo), Delivery::Empty);

        assert!(matches!(notifier.try_next_event(), Some(NecEvent::Decoded(_))));
        assert!(matches!(notifier.try_next_event(), Some(NecEvent::Malformed(_))));
        assert_eq!(notifier.try_next_event(), None);
    }

    #[test]
    fn full_event_queue_drops_without_blocking() {
        let notifier: NecNotifier<1> = NecNotifier::new();
        notifier.set_enabled(true);
        let mut fifo = Fifo::with(&[encode(3, 4).0, encode(3, 4).0]);
        assert!(matches!(
            notifier.on_rx_not_empty(&mut fifo),
            Delivery::Delivered(_)
        ));
        assert!(matches!(
            notifier.on_rx_not_empty(&mut fifo),
            Delivery::Dropped(NecEvent::Decoded(NecFrame { repeat: 1, .. }))
        ));
        assert_eq!(notifier.dropped_events(), 1);
    }

    #[test]
    fn service_pops_once_per_pending_lane() {
        let notifier: NecNotifier = NecNotifier::new();
        notifier.set_enabled(true);
        let mut queues = [
            Fifo::with(&[encode(1, 0x10).0, encode(1, 0x11).0]),
            Fifo::with(&[encode(1, 0x20).0]),
            Fifo::with(&[encode(1, 0x30).0]),
            Fifo::with(&[]),
        ];

        assert_eq!(notifier.service_lanes(0b1101, &mut queues), 0);
        let remaining = queues.each_ref().map(|fifo| fifo.0.len());
        assert_eq!(remaining, [1, 1, 0, 0]);

        let data: heapless::Vec<u8, 4> = core::iter::from_fn(|| notifier.try_next_event())
            .filter_map(|event| match event {
                NecEvent::Decoded(frame) => Some(frame.data),
                NecEvent::Malformed(_) => None,
            })
            .collect();
        assert_eq!(data.as_slice(), [0x10, 0x30]);
    }

    #[test]
    fn service_reports_pending_lanes_to_mask_when_disabled() {
        let notifier: NecNotifier = NecNotifier::new();
        let mut queues = [Fifo::with(&[encode(1, 2).0]), Fifo::with(&[encode(1, 3).0])];

        assert_eq!(notifier.service_lanes(0b10, &mut queues), 0b10);
        assert_eq!(queues.each_ref().map(|fifo| fifo.0.len()), [1, 1]);
        assert_eq!(notifier.try_next_event(), None);
    }

    #[test]
    fn service_ignores_pending_bits_without_a_queue() {
        let notifier: NecNotifier = NecNotifier::new();
        let mut queues = [Fifo::with(&[encode(1, 2).0])];
        assert_eq!(notifier.service_lanes(u32::MAX, &mut queues), 0b1);
    }

    #[test]
    fn pending_frame_is_consumed_once() {
        let notifier: NecNotifier = NecNotifier::new();
        notifier.set_enabled(true);
        let mut pending = PendingFrame(Some(encode(9, 9).0));
        assert!(matches!(
            notifier.on_rx_not_empty(&mut pending),
            Delivery::Delivered(_)
        ));
        assert_eq!(notifier.on_rx_not_empty(&mut pending), Delivery::Empty);
    }

    #[test]
    fn disabling_resets_repeat_counting() {
        let notifier: NecNotifier = NecNotifier::new();
        notifier.set_enabled(true);
        let mut fifo = Fifo::with(&[encode(5, 6).0, encode(5, 6).0]);
        notifier.on_rx_not_empty(&mut fifo);
        notifier.set_enabled(false);
        notifier.set_enabled(true);
        assert!(matches!(
            notifier.on_rx_not_empty(&mut fifo),
            Delivery::Delivered(NecEvent::Decoded(NecFrame { repeat: 0, .. }))
        ));
    }
}
