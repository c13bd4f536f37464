// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Verifier for junk-sequence headers
//!
//! Checks that a rendered header is well formed and that every unit in it is
//! side-effect neutral, working from the header text alone.
//!
//! # Verification Checklist
//!
//! | Check | Description |
//! |-------|-------------|
//! | **Guard** | Exactly one `#ifndef`/`#endif` pair, with the guard `#define`d |
//! | **Naming** | Units are `<PREFIX>_BLOCK_001`, `_002`, ... in order, no duplicates |
//! | **Clobbers** | Every asm statement clobbers `"memory"`, and `"cc"` if it contains `cmp` |
//! | **Frame** | First instruction is a pre-indexed spill, second to last the matching post-indexed restore |
//! | **SP safety** | Only the frame touches `sp`; displacement is balanced and 16-byte aligned |
//! | **Register safety** | Filler writes only spilled registers; `x29`/`x30` are never spilled |
//! | **Operand ranges** | 12-bit add/sub immediates, shifts in `[1, 63]`, `movk` chunks in pairs |
//! | **Branches** | Forward only, landing no later than the restore |
//! | **Terminal no-op** | Last instruction is `nop` or an all-`xzr` register form |
//! | **Diversity** | Optional: no register shared with the previous `N` units |
//!
//! # Usage
//!
//! ```
//! use flower_verifier::Verifier;
//!
//! let header = "#ifndef J_BLOCKS_H\n#define J_BLOCKS_H\n\
//!     #define J_BLOCK_001() __asm__ __volatile__(\"str x9, [sp, #-16]!;nop;ldr x9, [sp], #16;nop\" ::: \"memory\")\n\
//!     #endif // J_BLOCKS_H\n";
//! let result = Verifier::new().verify_header(header);
//! assert!(result.is_ok());
//! ```

mod classify;
mod error;
mod parser;
mod stack;
mod verify;

pub use classify::{Family, classify, is_nop_form};
pub use error::{UnitSummary, VerificationError, VerificationResult};
pub use parser::{HeaderLine, Operand, ParsedHeader, ParsedInstruction, Unit};
pub use stack::SpEffect;
pub use verify::{Verifier, verify_unit};

/// Verify a header without the diversity check.
pub fn verify_header(text: &str) -> VerificationResult {
    Verifier::new().verify_header(text)
}
