// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Mnemonic classification
//!
//! Every mnemonic a neutral sequence may contain, grouped by how its operands
//! are checked. Anything absent from [`BY_MNEMONIC`] is rejected.

use std::collections::HashMap;

use lazy_static::lazy_static;

/// How an instruction's operands are validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    /// `str`/`stp` with pre-index writeback.
    Spill,
    /// `ldr`/`ldp` with post-index writeback.
    Restore,
    /// `add`/`sub` with a 12-bit immediate.
    Arithmetic,
    /// Register-register logical ops.
    Logical,
    /// Immediate shifts.
    Shift,
    /// `movk` into one 16-bit chunk.
    MoveKeep,
    /// `mov`, only as the `xzr` no-op.
    Move,
    Compare,
    Branch,
    Nop,
}

/// Classification of a mnemonic.
pub struct ClassifiedMnemonic {
    pub mnemonic: &'static str,
    pub family: Family,
    /// Conditional branches can fall through.
    pub is_conditional: bool,
}

impl ClassifiedMnemonic {
    const fn new(mnemonic: &'static str, family: Family) -> Self {
        Self {
            mnemonic,
            family,
            is_conditional: false,
        }
    }

    const fn conditional_branch(mnemonic: &'static str) -> Self {
        Self {
            mnemonic,
            family: Family::Branch,
            is_conditional: true,
        }
    }

    pub fn is_branch(&self) -> bool {
        self.family == Family::Branch
    }
}

const CLASSIFIED: &[ClassifiedMnemonic] = &[
    ClassifiedMnemonic::new("str", Family::Spill),
    ClassifiedMnemonic::new("stp", Family::Spill),
    ClassifiedMnemonic::new("ldr", Family::Restore),
    ClassifiedMnemonic::new("ldp", Family::Restore),
    ClassifiedMnemonic::new("add", Family::Arithmetic),
    ClassifiedMnemonic::new("sub", Family::Arithmetic),
    ClassifiedMnemonic::new("eor", Family::Logical),
    ClassifiedMnemonic::new("bic", Family::Logical),
    ClassifiedMnemonic::new("orn", Family::Logical),
    ClassifiedMnemonic::new("orr", Family::Logical),
    ClassifiedMnemonic::new("and", Family::Logical),
    ClassifiedMnemonic::new("lsl", Family::Shift),
    ClassifiedMnemonic::new("lsr", Family::Shift),
    ClassifiedMnemonic::new("asr", Family::Shift),
    ClassifiedMnemonic::new("movk", Family::MoveKeep),
    ClassifiedMnemonic::new("mov", Family::Move),
    ClassifiedMnemonic::new("cmp", Family::Compare),
    ClassifiedMnemonic::new("b", Family::Branch),
    ClassifiedMnemonic::conditional_branch("b.eq"),
    ClassifiedMnemonic::conditional_branch("b.ne"),
    ClassifiedMnemonic::new("nop", Family::Nop),
];

lazy_static! {
    /// Lookup by lowercase mnemonic.
    pub static ref BY_MNEMONIC: HashMap<&'static str, &'static ClassifiedMnemonic> =
        CLASSIFIED.iter().map(|c| (c.mnemonic, c)).collect();
}

/// Classify a mnemonic, case-insensitively.
pub fn classify(mnemonic: &str) -> Option<&'static ClassifiedMnemonic> {
    BY_MNEMONIC
        .get(mnemonic.to_ascii_lowercase().as_str())
        .copied()
}

/// Mnemonics whose all-`xzr` register form changes no state.
const ZERO_REGISTER_NOPS: &[&str] = &["mov", "add", "sub", "and", "orr"];

/// Whether `mnemonic operands` is one of the recognised no-op encodings:
/// `nop` or a register-form op whose every operand is `xzr`.
pub fn is_nop_form(mnemonic: &str, operands: &[&str]) -> bool {
    let mnemonic = mnemonic.to_ascii_lowercase();
    if mnemonic == "nop" {
        return operands.is_empty();
    }
    let arity = if mnemonic == "mov" { 2 } else { 3 };
    ZERO_REGISTER_NOPS.contains(&mnemonic.as_str())
        && operands.len() == arity
        && operands.iter().all(|op| op.trim() == "xzr")
}
