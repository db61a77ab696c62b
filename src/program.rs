//! PIO programs run by the sampling units, and the single-instruction encodings
//! injected into them.

use pio::{InSource, InstructionOperands, WaitSource};

use crate::constants::ARM_GATE_IRQ;
use crate::error::{Error, Result};
use crate::resources::Resource;
use crate::sampler::{PinCount, ProgramHandle, Trigger};

/// Instruction memory words per PIO block.
pub const INSTRUCTION_MEMORY_WORDS: usize = pio::RP2040_MAX_PROGRAM_SIZE;

/// An assembled program that fits one PIO block.
pub type Program = pio::Program<{ pio::RP2040_MAX_PROGRAM_SIZE }>;

/// The capture loop for `pin_count` adjacent pins.
///
/// ```text
///     wait 1 irq 4 rel     ; arm gate, released once the transfer is armed
/// .wrap_target
///     in pins, <pin_count> ; autopush every 32 bits
/// .wrap
/// ```
///
/// The gate flag is relative, so lane `n` waits on flag `4 + n`.
#[must_use]
pub fn capture_program(pin_count: PinCount) -> Program {
    let mut a = pio::Assembler::<{ pio::RP2040_MAX_PROGRAM_SIZE }>::new();
    let mut wrap_target = a.label();
    let mut wrap_source = a.label();

    a.wait(1, WaitSource::IRQ, ARM_GATE_IRQ, true);
    a.bind(&mut wrap_target);
    a.r#in(InSource::PINS, pin_count.get());
    a.bind(&mut wrap_source);

    a.assemble_with_wrap(wrap_source, wrap_target)
}

/// NEC receive program: 10 ticks per 562.5 µs burst, one frame per autopushed word.
#[must_use]
pub fn nec_program() -> Program {
    let nec = pio::pio_asm!(
        r#"
        .define BURST_LOOP_COUNTER 30    ; threshold for sync burst detection
        .define BIT_SAMPLE_DELAY 15      ; 1.5 burst periods

        .wrap_target
        next_burst:
            set x, BURST_LOOP_COUNTER
            wait 0 pin 0                 ; burst starts, active low

        burst_loop:
            jmp pin data_bit             ; burst ended before the counter ran out
            jmp x-- burst_loop

            mov isr, null                ; sync burst, start a new frame
            wait 1 pin 0
            jmp next_burst

        data_bit:
            nop [BIT_SAMPLE_DELAY - 1]
            in pins, 1                   ; short gap = 0, long gap = 1
        .wrap
        "#
    );
    nec.program
}

/// `wait <polarity> gpio <pin>`: stalls until the absolute GPIO reads the level.
#[must_use]
pub fn wait_for_trigger(trigger: Trigger) -> u16 {
    InstructionOperands::WAIT {
        polarity: trigger.polarity().level(),
        source: WaitSource::GPIO,
        index: trigger.pin(),
        relative: false,
    }
    .encode()
}

/// `jmp <address>`, used to restart a unit at its program origin.
#[must_use]
pub fn jump_to(address: u8) -> u16 {
    InstructionOperands::JMP {
        condition: pio::JmpCondition::Always,
        address,
    }
    .encode()
}

/// Where a program landed in instruction memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ProgramSlot {
    origin: u8,
    len: u8,
}

impl ProgramSlot {
    /// Number of instruction words occupied.
    #[must_use]
    pub const fn len(&self) -> u8 {
        self.len
    }

    /// Whether the slot is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    const fn mask(&self) -> u32 {
        mask(self.origin, self.len)
    }
}

impl ProgramHandle for ProgramSlot {
    fn origin(&self) -> u8 {
        self.origin
    }
}

const fn mask(origin: u8, len: u8) -> u32 {
    let run = if len >= 32 { u32::MAX } else { (1_u32 << len) - 1 };
    run << origin
}

/// Occupancy of one PIO block's 32 instruction words.
///
/// Programs are placed at the highest origin where they fit, matching the
/// allocator in the vendor SDK.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InstructionMemory {
    used: u32,
}

impl InstructionMemory {
    /// Claims room for `program`.
    ///
    /// # Errors
    /// Returns [`Error::ResourceExhausted`] for [`Resource::ProgramSpace`] if no run of
    /// free words is long enough. Occupancy is unchanged in that case.
    pub fn load(&mut self, program: &Program) -> Result<ProgramSlot> {
        let len = u8::try_from(program.code.len())
            .map_err(|_| Error::ResourceExhausted(Resource::ProgramSpace))?;
        if len == 0 || usize::from(len) > INSTRUCTION_MEMORY_WORDS {
            return Err(Error::ResourceExhausted(Resource::ProgramSpace));
        }

        let top = 32_u8.saturating_sub(len);
        let slot = (0..=top)
            .rev()
            .map(|origin| ProgramSlot { origin, len })
            .find(|slot| self.used & slot.mask() == 0)
            .ok_or(Error::ResourceExhausted(Resource::ProgramSpace))?;

        self.used |= slot.mask();
        Ok(slot)
    }

    /// Frees the words held by `slot`.
    pub const fn unload(&mut self, slot: ProgramSlot) {
        self.used &= !slot.mask();
    }

    /// Number of unused instruction words.
    #[must_use]
    pub const fn free_words(&self) -> u32 {
        self.used.count_zeros()
    }
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
    use super::*;
    use crate::sampler::Polarity;

    #[test]
    fn capture_program_gates_then_loops_on_one_in() {
        let program = capture_program(PinCount::Four);
        assert_eq!(program.code.len(), 2);
        // the gate is outside the wrap, the `in` is the whole loop
        assert_eq!(program.wrap.target, 1);
        assert_eq!(program.wrap.source, 1);
    }

    #[test]
    fn capture_program_shifts_pin_count_bits() {
        // IN encoding: 010 ddddd sss bbbbb, PINS source = 000
        let program = capture_program(PinCount::Eight);
        let in_instr = program.code[1];
        assert_eq!(in_instr >> 13, 0b010);
        assert_eq!(in_instr & 0b1_1111, 8);
        assert_eq!((in_instr >> 5) & 0b111, 0);
    }

    #[test]
    fn trigger_wait_encodes_gpio_level_and_pin() {
        // WAIT encoding: 001 ddddd p ss iiiii, GPIO source = 00
        let instr = wait_for_trigger(Trigger::new(15, Polarity::High).expect("GPIO 15 exists"));
        assert_eq!(instr >> 13, 0b001);
        assert_eq!((instr >> 7) & 1, 1);
        assert_eq!((instr >> 5) & 0b11, 0b00);
        assert_eq!(instr & 0b1_1111, 15);

        let low = wait_for_trigger(Trigger::new(3, Polarity::Low).expect("GPIO 3 exists"));
        assert_eq!((low >> 7) & 1, 0);
    }

    #[test]
    fn nec_program_fits_with_a_capture_program() {
        let mut memory = InstructionMemory::default();
        let nec = memory.load(&nec_program()).expect("NEC program fits");
        let capture = memory
            .load(&capture_program(PinCount::One))
            .expect("capture fits alongside");
        assert_eq!(
            memory.free_words(),
            32 - u32::from(nec.len()) - u32::from(capture.len())
        );
    }

    #[test]
    fn programs_are_placed_top_down_and_reuse_freed_space() {
        let mut memory = InstructionMemory::default();
        let first = memory.load(&capture_program(PinCount::One)).expect("fits");
        assert_eq!(first.origin(), 30);
        let second = memory.load(&capture_program(PinCount::Two)).expect("fits");
        assert_eq!(second.origin(), 28);

        memory.unload(first);
        let third = memory.load(&capture_program(PinCount::Four)).expect("fits");
        assert_eq!(third.origin(), 30);
    }

    #[test]
    fn full_memory_reports_program_space() {
        let mut memory = InstructionMemory::default();
        for _ in 0..16 {
            memory.load(&capture_program(PinCount::One)).expect("fits");
        }
        assert_eq!(memory.free_words(), 0);
        assert!(matches!(
            memory.load(&capture_program(PinCount::One)),
            Err(Error::ResourceExhausted(Resource::ProgramSpace))
        ));
    }
}
