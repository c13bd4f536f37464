// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Junk instruction synthesis.
//!
//! Each round picks one of the spilled registers and one of eleven mnemonics,
//! then emits a short burst of filler for it:
//!
//! | Mnemonic | Emitted |
//! |----------|---------|
//! | `add`, `sub` | op with `#imm` then its inverse with the same `#imm` |
//! | `eor` | `eor r, r, r` |
//! | `bic`, `orn` | `op r, r, r` or `op r, r, xzr` |
//! | `lsl`, `lsr`, `asr` | shift by `#s` then the opposite-direction shift by `#s` |
//! | `orr` | `orr r, r, xzr` |
//! | `and` | `and r, r, r` |
//! | `mov` | two `movk` into distinct 16-bit chunks, high chunk first |
//!
//! The filler is free to clobber its register: the frame restores it. A round
//! may additionally append a compare plus two fall-through branches.

use std::ops::RangeInclusive;

use rand::Rng;
use rand::seq::SliceRandom;

use crate::instruction::{
    ArithImmediate,
    ArithOp,
    BranchKind,
    Chunk,
    Instruction,
    LogicalOp,
    NopForm,
    ShiftAmount,
    ShiftOp,
    Source,
};
use crate::registers::{Register, RegisterSet};

/// Rounds of filler per sequence.
pub const ROUNDS: RangeInclusive<usize> = 3..=5;

/// Chance that a round is followed by compare/branch camouflage.
pub const CAMOUFLAGE_PROBABILITY: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Filler {
    Add,
    Sub,
    Eor,
    Orr,
    And,
    Mov,
    Bic,
    Orn,
    Lsl,
    Lsr,
    Asr,
}

const FILLERS: [Filler; 11] = [
    Filler::Add,
    Filler::Sub,
    Filler::Eor,
    Filler::Orr,
    Filler::And,
    Filler::Mov,
    Filler::Bic,
    Filler::Orn,
    Filler::Lsl,
    Filler::Lsr,
    Filler::Asr,
];

/// Emits 3-5 rounds of filler over `registers`.
pub fn synthesize<R: Rng + ?Sized>(registers: &RegisterSet, rng: &mut R) -> Vec<Instruction> {
    let rounds = rng.gen_range(ROUNDS);
    let mut output = Vec::new();

    for _ in 0..rounds {
        let register = registers.choose(rng);
        let filler = FILLERS[rng.gen_range(0..FILLERS.len())];
        emit_round(&mut output, filler, register, rng);

        if rng.gen_bool(CAMOUFLAGE_PROBABILITY) {
            emit_camouflage(&mut output, register);
        }
    }

    output
}

/// One no-op drawn from the catalogue, closing a sequence.
pub fn terminal_nop<R: Rng + ?Sized>(rng: &mut R) -> NopForm {
    NopForm::ALL[rng.gen_range(0..NopForm::ALL.len())]
}

fn emit_round<R: Rng + ?Sized>(
    output: &mut Vec<Instruction>,
    filler: Filler,
    register: Register,
    rng: &mut R,
) {
    match filler {
        Filler::Add | Filler::Sub => {
            let op = if filler == Filler::Add {
                ArithOp::Add
            } else {
                ArithOp::Sub
            };
            let immediate = ArithImmediate::random(rng);
            output.push(Instruction::Arith {
                op,
                register,
                immediate,
            });
            output.push(Instruction::Arith {
                op: op.inverse(),
                register,
                immediate,
            });
        }
        Filler::Eor => output.push(Instruction::Logical {
            op: LogicalOp::Eor,
            register,
            source: Source::Register(register),
        }),
        Filler::Bic | Filler::Orn => {
            let op = if filler == Filler::Bic {
                LogicalOp::Bic
            } else {
                LogicalOp::Orn
            };
            let source = if rng.gen_bool(0.5) {
                Source::Zero
            } else {
                Source::Register(register)
            };
            output.push(Instruction::Logical {
                op,
                register,
                source,
            });
        }
        Filler::Lsl | Filler::Lsr | Filler::Asr => {
            let op = match filler {
                Filler::Lsl => ShiftOp::Lsl,
                Filler::Lsr => ShiftOp::Lsr,
                _ => ShiftOp::Asr,
            };
            let amount = ShiftAmount::random(rng);
            output.push(Instruction::Shift {
                op,
                register,
                amount,
            });
            output.push(Instruction::Shift {
                op: op.inverse(),
                register,
                amount,
            });
        }
        Filler::Orr => output.push(Instruction::Logical {
            op: LogicalOp::Orr,
            register,
            source: Source::Zero,
        }),
        Filler::And => output.push(Instruction::Logical {
            op: LogicalOp::And,
            register,
            source: Source::Register(register),
        }),
        Filler::Mov => {
            let mut chunks: Vec<Chunk> = Chunk::ALL.choose_multiple(rng, 2).copied().collect();
            chunks.sort_unstable_by(|a, b| b.cmp(a));
            for chunk in chunks {
                output.push(Instruction::Movk {
                    register,
                    immediate: rng.gen_range(0..=u16::MAX),
                    chunk,
                });
            }
        }
    }
}

/// `cmp r, r; b.eq .+4; b .+8; nop; nop`. Both branches land inside the block.
fn emit_camouflage(output: &mut Vec<Instruction>, register: Register) {
    output.extend([
        Instruction::Compare { register },
        Instruction::Branch {
            kind: BranchKind::IfEqual,
            skip: 0,
        },
        Instruction::Branch {
            kind: BranchKind::Always,
            skip: 1,
        },
        Instruction::Nop(NopForm::Nop),
        Instruction::Nop(NopForm::Nop),
    ]);
}
