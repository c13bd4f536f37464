// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Spill/restore framing.
//!
//! A frame pairs a pre-indexed store on entry with the mirrored post-indexed
//! load on exit:
//!
//! ```asm
//! stp x9, x12, [sp, #-32]!    // save, sp -= 32
//! ...                         // filler may clobber x9 and x12
//! ldp x9, x12, [sp], #32      // restore, sp += 32
//! ```
//!
//! The restore reads the snapshot taken before any filler ran, so the chosen
//! registers come back unchanged whatever the filler does to them.

use rand::Rng;
use rand::seq::SliceRandom;

use crate::error::EncodingError;
use crate::instruction::Instruction;
use crate::registers::RegisterSet;

/// Largest displacement accepted: post-index `ldr` reaches only +255 (imm9),
/// so the largest aligned value is 240.
const MAX_STACK_OFFSET: u32 = 240;

/// Stack displacement of a frame, in bytes. Always a multiple of 16 so `sp`
/// stays aligned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackOffset(u16);

impl StackOffset {
    /// Displacements the generator draws from.
    pub const CHOICES: [StackOffset; 3] = [StackOffset(16), StackOffset(32), StackOffset(48)];

    pub fn new(bytes: u32) -> Result<Self, EncodingError> {
        if bytes == 0 || bytes % 16 != 0 || bytes > MAX_STACK_OFFSET {
            return Err(EncodingError::StackOffset(bytes));
        }
        Ok(Self(bytes as u16))
    }

    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        *Self::CHOICES
            .choose(rng)
            .unwrap_or(&Self::CHOICES[0])
    }

    pub fn bytes(self) -> u16 {
        self.0
    }

    /// Signed displacement of the entry store.
    pub fn entry(self) -> i32 {
        -i32::from(self.0)
    }

    /// Signed displacement of the exit load.
    pub fn exit(self) -> i32 {
        i32::from(self.0)
    }
}

/// A matched save/restore around one sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    registers: RegisterSet,
    offset: StackOffset,
}

impl Frame {
    pub fn new(registers: RegisterSet, offset: StackOffset) -> Self {
        Self { registers, offset }
    }

    pub fn registers(&self) -> RegisterSet {
        self.registers
    }

    pub fn offset(&self) -> StackOffset {
        self.offset
    }

    pub fn entry(&self) -> Instruction {
        Instruction::Spill {
            registers: self.registers,
            offset: self.offset,
        }
    }

    pub fn exit(&self) -> Instruction {
        Instruction::Restore {
            registers: self.registers,
            offset: self.offset,
        }
    }
}

/// Entry and exit instructions for `registers` displaced by `offset`.
pub fn frame(registers: RegisterSet, offset: StackOffset) -> (Instruction, Instruction) {
    let frame = Frame::new(registers, offset);
    (frame.entry(), frame.exit())
}
