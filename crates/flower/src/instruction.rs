// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Typed A64 instructions emitted by the generator.
//!
//! Operand newtypes check their ranges at construction so that an
//! [`Instruction`] value is always encodable. `Display` renders GNU-style
//! assembly text; branches render with location-counter offsets (see
//! [`InstructionSequence::render`](crate::InstructionSequence::render) for the
//! label form).

use std::fmt;

use rand::Rng;

use crate::error::EncodingError;
use crate::frame::StackOffset;
use crate::registers::{Register, RegisterSet};

/// Width of one A64 instruction in bytes.
pub const INSTRUCTION_BYTES: usize = 4;

/// Unsigned 12-bit immediate of `add`/`sub`, excluding zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArithImmediate(u16);

impl ArithImmediate {
    pub const MIN: u16 = 1;
    pub const MAX: u16 = 4095;

    pub fn new(value: u32) -> Result<Self, EncodingError> {
        if (Self::MIN as u32..=Self::MAX as u32).contains(&value) {
            Ok(Self(value as u16))
        } else {
            Err(EncodingError::ArithImmediate(value))
        }
    }

    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self(rng.gen_range(Self::MIN..=Self::MAX))
    }

    pub fn value(self) -> u16 {
        self.0
    }
}

/// Shift amount for a 64-bit register, excluding zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShiftAmount(u8);

impl ShiftAmount {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 63;

    pub fn new(value: u32) -> Result<Self, EncodingError> {
        if (Self::MIN as u32..=Self::MAX as u32).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(EncodingError::ShiftAmount(value))
        }
    }

    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self(rng.gen_range(Self::MIN..=Self::MAX))
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

/// The 16-bit lane a `movk` writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Chunk {
    Lsl0,
    Lsl16,
    Lsl32,
    Lsl48,
}

impl Chunk {
    pub const ALL: [Chunk; 4] = [Chunk::Lsl0, Chunk::Lsl16, Chunk::Lsl32, Chunk::Lsl48];

    pub fn new(shift: u32) -> Result<Self, EncodingError> {
        match shift {
            0 => Ok(Self::Lsl0),
            16 => Ok(Self::Lsl16),
            32 => Ok(Self::Lsl32),
            48 => Ok(Self::Lsl48),
            other => Err(EncodingError::Chunk(other)),
        }
    }

    pub fn shift(self) -> u8 {
        match self {
            Self::Lsl0 => 0,
            Self::Lsl16 => 16,
            Self::Lsl32 => 32,
            Self::Lsl48 => 48,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
}

impl ArithOp {
    pub fn inverse(self) -> Self {
        match self {
            Self::Add => Self::Sub,
            Self::Sub => Self::Add,
        }
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Sub => "sub",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    Eor,
    Bic,
    Orn,
    Orr,
    And,
}

impl LogicalOp {
    pub fn mnemonic(self) -> &'static str {
        match self {
            Self::Eor => "eor",
            Self::Bic => "bic",
            Self::Orn => "orn",
            Self::Orr => "orr",
            Self::And => "and",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftOp {
    Lsl,
    Lsr,
    Asr,
}

impl ShiftOp {
    /// The opposite-direction shift. Both right shifts pair with `lsl`.
    pub fn inverse(self) -> Self {
        match self {
            Self::Lsl => Self::Lsr,
            Self::Lsr | Self::Asr => Self::Lsl,
        }
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Self::Lsl => "lsl",
            Self::Lsr => "lsr",
            Self::Asr => "asr",
        }
    }
}

/// Second source operand of a logical filler op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Register(Register),
    Zero,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Register(r) => write!(f, "{r}"),
            Self::Zero => f.write_str("xzr"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchKind {
    Always,
    IfEqual,
}

impl BranchKind {
    pub fn mnemonic(self) -> &'static str {
        match self {
            Self::Always => "b",
            Self::IfEqual => "b.eq",
        }
    }
}

/// Encodings that leave all architectural state unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NopForm {
    Nop,
    MovZero,
    AddZero,
    SubZero,
    AndZero,
    OrrZero,
}

impl NopForm {
    pub const ALL: [NopForm; 6] = [
        NopForm::Nop,
        NopForm::MovZero,
        NopForm::AddZero,
        NopForm::SubZero,
        NopForm::AndZero,
        NopForm::OrrZero,
    ];

    pub fn text(self) -> &'static str {
        match self {
            Self::Nop => "nop",
            Self::MovZero => "mov xzr, xzr",
            // Register form: the immediate form would name sp for register 31.
            Self::AddZero => "add xzr, xzr, xzr",
            Self::SubZero => "sub xzr, xzr, xzr",
            Self::AndZero => "and xzr, xzr, xzr",
            Self::OrrZero => "orr xzr, xzr, xzr",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    /// Pre-indexed store that also lowers `sp`.
    Spill {
        registers: RegisterSet,
        offset: StackOffset,
    },
    /// Post-indexed load that raises `sp` back.
    Restore {
        registers: RegisterSet,
        offset: StackOffset,
    },
    Arith {
        op: ArithOp,
        register: Register,
        immediate: ArithImmediate,
    },
    Logical {
        op: LogicalOp,
        register: Register,
        source: Source,
    },
    Shift {
        op: ShiftOp,
        register: Register,
        amount: ShiftAmount,
    },
    Movk {
        register: Register,
        immediate: u16,
        chunk: Chunk,
    },
    Compare {
        register: Register,
    },
    /// Forward local branch over the next `skip` instructions.
    Branch { kind: BranchKind, skip: usize },
    Nop(NopForm),
}

impl Instruction {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Self::Spill { registers, .. } => match registers {
                RegisterSet::Single(_) => "str",
                RegisterSet::Pair(..) => "stp",
            },
            Self::Restore { registers, .. } => match registers {
                RegisterSet::Single(_) => "ldr",
                RegisterSet::Pair(..) => "ldp",
            },
            Self::Arith { op, .. } => op.mnemonic(),
            Self::Logical { op, .. } => op.mnemonic(),
            Self::Shift { op, .. } => op.mnemonic(),
            Self::Movk { .. } => "movk",
            Self::Compare { .. } => "cmp",
            Self::Branch { kind, .. } => kind.mnemonic(),
            Self::Nop(form) => match form {
                NopForm::Nop => "nop",
                NopForm::MovZero => "mov",
                NopForm::AddZero => "add",
                NopForm::SubZero => "sub",
                NopForm::AndZero => "and",
                NopForm::OrrZero => "orr",
            },
        }
    }

    /// The register this instruction overwrites, if any besides `sp`.
    pub fn destination(&self) -> Option<Register> {
        match *self {
            Self::Arith { register, .. }
            | Self::Logical { register, .. }
            | Self::Shift { register, .. }
            | Self::Movk { register, .. } => Some(register),
            _ => None,
        }
    }

    /// Index of the instruction a branch at `index` lands on.
    pub fn branch_target(&self, index: usize) -> Option<usize> {
        match *self {
            Self::Branch { skip, .. } => Some(index + 1 + skip),
            _ => None,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spill { registers, offset } => write!(
                f,
                "{} {registers}, [sp, #{}]!",
                self.mnemonic(),
                offset.entry()
            ),
            Self::Restore { registers, offset } => {
                write!(f, "{} {registers}, [sp], #{}", self.mnemonic(), offset.exit())
            }
            Self::Arith {
                op,
                register,
                immediate,
            } => write!(
                f,
                "{} {register}, {register}, #{}",
                op.mnemonic(),
                immediate.value()
            ),
            Self::Logical {
                op,
                register,
                source,
            } => write!(f, "{} {register}, {register}, {source}", op.mnemonic()),
            Self::Shift {
                op,
                register,
                amount,
            } => write!(
                f,
                "{} {register}, {register}, #{}",
                op.mnemonic(),
                amount.value()
            ),
            Self::Movk {
                register,
                immediate,
                chunk,
            } => write!(
                f,
                "movk {register}, #0x{immediate:04x}, lsl #{}",
                chunk.shift()
            ),
            Self::Compare { register } => write!(f, "cmp {register}, {register}"),
            Self::Branch { kind, skip } => write!(
                f,
                "{} .+{}",
                kind.mnemonic(),
                (skip + 1) * INSTRUCTION_BYTES
            ),
            Self::Nop(form) => f.write_str(form.text()),
        }
    }
}
