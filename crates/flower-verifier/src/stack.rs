// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Stack pointer effects of frame instructions.

use crate::parser::{Operand, ParsedInstruction};

/// Required alignment of `sp` on Arm64.
pub const SP_ALIGNMENT: u32 = 16;

/// Classification of an instruction's effect on the stack pointer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpEffect {
    /// Instruction does not modify SP.
    None,
    /// SP decrement by `N` bytes.
    ///
    /// Recognized patterns:
    /// - `stp Xt, Xt2, [sp, #-N]!` (negative pre-index)
    /// - `str Xt, [sp, #-N]!` (negative pre-index)
    Decrement(u32),
    /// SP increment by `N` bytes.
    ///
    /// Recognized patterns:
    /// - `ldp Xt, Xt2, [sp], #N` (positive post-index)
    /// - `ldr Xt, [sp], #N` (positive post-index)
    Increment(u32),
    /// Modifies SP in an unrecognized way. Must be rejected.
    Unsafe,
}

impl From<&ParsedInstruction<'_>> for SpEffect {
    fn from(instruction: &ParsedInstruction<'_>) -> Self {
        let Some(ops) = instruction.classified_operands() else {
            // Unparseable operands are reported elsewhere; only an explicit
            // mention of sp makes them a stack concern.
            let mentions_sp = instruction
                .operands
                .iter()
                .any(|op| op.contains("sp"));
            return if mentions_sp { SpEffect::Unsafe } else { SpEffect::None };
        };

        let touches_sp = ops
            .iter()
            .any(|op| matches!(op, Operand::Sp | Operand::PreIndexSp(_) | Operand::BaseSp));
        if !touches_sp {
            return SpEffect::None;
        }

        let mnemonic = instruction.mnemonic.to_ascii_lowercase();
        match (mnemonic.as_str(), ops.as_slice()) {
            // str Xt, [sp, #-N]!
            ("str", [Operand::Register(_), Operand::PreIndexSp(off)])
            // stp Xt, Xt2, [sp, #-N]!
            | ("stp", [Operand::Register(_), Operand::Register(_), Operand::PreIndexSp(off)])
                if *off < 0 =>
            {
                u32::try_from(off.unsigned_abs()).map_or(SpEffect::Unsafe, SpEffect::Decrement)
            }
            // ldr Xt, [sp], #N
            ("ldr", [Operand::Register(_), Operand::BaseSp, Operand::Immediate(off)])
            // ldp Xt, Xt2, [sp], #N
            | (
                "ldp",
                [Operand::Register(_), Operand::Register(_), Operand::BaseSp, Operand::Immediate(off)],
            ) if *off > 0 => u32::try_from(*off).map_or(SpEffect::Unsafe, SpEffect::Increment),
            _ => SpEffect::Unsafe,
        }
    }
}

/// Registers named before the address operand of a frame instruction, in order.
pub fn frame_registers(instruction: &ParsedInstruction<'_>) -> Vec<u8> {
    instruction
        .classified_operands()
        .unwrap_or_default()
        .into_iter()
        .map_while(|op| match op {
            Operand::Register(n) => Some(n),
            _ => None,
        })
        .collect()
}
