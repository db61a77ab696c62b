//! Finite hardware pools with explicit claim/release.
//!
//! Every sampling lane, transfer channel, and interrupt line lives in a [`Pool`]. A
//! claim moves the resource out of its slot into an owned [`Claim`]; releasing moves it
//! back. Because a `Claim` is consumed on release, a double release cannot be written.
//! Returning a claim to a slot that is already occupied is reported as
//! [`Error::ReleaseConflict`].

use core::ops::{Deref, DerefMut};

use derive_more::derive::Display;

use crate::constants::INTERRUPT_LINE_COUNT;
use crate::error::{Error, Result};
use crate::sampler::SamplingPlatform;

/// Names a pool in error reports.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Resource {
    /// A sampling unit (PIO state machine).
    #[display("sampling lane")]
    SamplingLane,
    /// Room in the shared instruction memory for a program.
    #[display("program space")]
    ProgramSpace,
    /// A bulk-transfer (DMA) channel.
    #[display("transfer channel")]
    TransferChannel,
    /// A system interrupt line of the sampling block.
    #[display("interrupt line")]
    InterruptLine,
}

/// An owned claim on one pool slot.
#[derive(Debug)]
pub struct Claim<T> {
    index: usize,
    item: T,
}

impl<T> Claim<T> {
    /// The slot this claim came from.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }
}

impl<T> Deref for Claim<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.item
    }
}

impl<T> DerefMut for Claim<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.item
    }
}

/// A fixed set of interchangeable resources.
pub struct Pool<T, const N: usize> {
    resource: Resource,
    slots: [Option<T>; N],
}

impl<T, const N: usize> Pool<T, N> {
    /// A pool with every slot free.
    #[must_use]
    pub fn new(resource: Resource, items: [T; N]) -> Self {
        Self {
            resource,
            slots: items.map(Some),
        }
    }

    /// A pool where `None` slots are held elsewhere (for example, reserved by firmware).
    #[must_use]
    pub const fn from_slots(resource: Resource, slots: [Option<T>; N]) -> Self {
        Self { resource, slots }
    }

    /// Claims the lowest free slot.
    ///
    /// # Errors
    /// Returns [`Error::ResourceExhausted`] when every slot is held. Nothing changes.
    pub fn claim(&mut self) -> Result<Claim<T>> {
        self.slots
            .iter_mut()
            .enumerate()
            .find_map(|(index, slot)| slot.take().map(|item| Claim { index, item }))
            .ok_or(Error::ResourceExhausted(self.resource))
    }

    /// Returns a claim to its slot.
    ///
    /// # Errors
    /// Returns [`Error::ReleaseConflict`] if the slot is not vacant, i.e. the claim did
    /// not come from this pool. The claimed resource is dropped in that case.
    pub fn release(&mut self, claim: Claim<T>) -> Result<()> {
        let Claim { index, item } = claim;
        match self.slots.get_mut(index) {
            Some(slot) if slot.is_none() => {
                *slot = Some(item);
                Ok(())
            }
            _ => Err(Error::ReleaseConflict(self.resource)),
        }
    }

    /// Withholds slot `index` for use outside the pool. Returns the item if it was free.
    pub fn reserve(&mut self, index: usize) -> Option<T> {
        self.slots.get_mut(index).and_then(Option::take)
    }

    /// Number of unclaimed slots.
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Whether `index` is currently unclaimed.
    #[must_use]
    pub fn is_free(&self, index: usize) -> bool {
        matches!(self.slots.get(index), Some(Some(_)))
    }

    /// Which pool this is, for error reports.
    #[must_use]
    pub const fn resource(&self) -> Resource {
        self.resource
    }
}

/// One of the sampling block's system interrupt lines.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InterruptLine(u8);

impl InterruptLine {
    /// Hardware line number.
    #[must_use]
    pub const fn id(self) -> u8 {
        self.0
    }
}

/// All the pools one sampling block owns, plus the platform adapter that drives them.
///
/// This is the context every core call takes by `&mut`; there is no global hardware state.
pub struct SamplingResources<P: SamplingPlatform, const LANES: usize, const CHANNELS: usize> {
    pub(crate) platform: P,
    pub(crate) lanes: Pool<P::Unit, LANES>,
    pub(crate) channels: Pool<P::Channel, CHANNELS>,
    pub(crate) interrupt_lines: Pool<InterruptLine, INTERRUPT_LINE_COUNT>,
}

impl<P: SamplingPlatform, const LANES: usize, const CHANNELS: usize>
    SamplingResources<P, LANES, CHANNELS>
{
    /// Wraps a platform and the units and channels it handed out.
    #[must_use]
    pub fn new(platform: P, units: [P::Unit; LANES], channels: [P::Channel; CHANNELS]) -> Self {
        Self {
            platform,
            lanes: Pool::new(Resource::SamplingLane, units),
            channels: Pool::new(Resource::TransferChannel, channels),
            interrupt_lines: Pool::new(
                Resource::InterruptLine,
                [InterruptLine(0), InterruptLine(1)],
            ),
        }
    }

    /// Withholds interrupt line `id`, e.g. one the platform's own drivers service.
    #[must_use]
    pub fn reserve_interrupt_line(mut self, id: u8) -> Self {
        let _reserved = self.interrupt_lines.reserve(usize::from(id));
        self
    }

    /// The platform adapter.
    #[must_use]
    pub const fn platform(&self) -> &P {
        &self.platform
    }

    /// The platform adapter, mutably (for example, to wire more input pins).
    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }

    /// Sampling lanes not claimed by any session.
    #[must_use]
    pub fn free_lanes(&self) -> usize {
        self.lanes.free_count()
    }

    /// Transfer channels not claimed by a capture.
    #[must_use]
    pub fn free_channels(&self) -> usize {
        self.channels.free_count()
    }

    /// Interrupt lines not bound to a decoder.
    #[must_use]
    pub fn free_interrupt_lines(&self) -> usize {
        self.interrupt_lines.free_count()
    }
}
