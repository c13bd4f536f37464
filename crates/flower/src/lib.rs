// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Side-effect-neutral junk sequences for Arm64
//!
//! This crate generates short A64 instruction sequences that:
//! - Leave every register and memory location outside their own stack slot unchanged
//! - Vary register choice, stack displacement, filler and terminal no-op from one
//!   sequence to the next, so no single instruction pattern recurs
//! - Serialize into a C header of zero-argument macros, one per sequence
//!
//! # Neutrality
//!
//! Every sequence has the shape
//!
//! ```asm
//! stp x9, x12, [sp, #-32]!    // spill, sp -= 32
//! ...                         // 3-5 rounds of filler on x9/x12
//! ldp x9, x12, [sp], #32      // restore, sp += 32
//! orr xzr, xzr, xzr           // one no-op from the catalogue
//! ```
//!
//! Only the spilled registers are written between the spill and the restore,
//! and the restore reads the pre-filler snapshot, so neutrality does not depend
//! on the filler cancelling itself.
//!
//! # Modules
//!
//! - [`registers`]: scratch pool, diversity selector and lookback window
//! - [`frame`]: spill/restore framing
//! - [`synth`]: filler synthesis
//! - [`sequence`]: assembly of sequences and the generation fold
//! - [`emit`]: header rendering and writing

pub mod config;
pub mod emit;
pub mod error;
pub mod frame;
pub mod instruction;
pub mod registers;
pub mod sequence;
pub mod synth;

pub use config::{EmitConfig, GeneratorConfig, JumpStyle, ShortagePolicy, parse_count};
pub use error::{EmitError, EncodingError, PoolError, SamplingError, UsageError};
pub use frame::{Frame, StackOffset, frame};
pub use instruction::Instruction;
pub use registers::{Lookback, Register, RegisterPool, RegisterSet};
pub use sequence::{Generator, InstructionSequence, SequenceCollection};
pub use synth::synthesize;

/// Generates `count` sequences and renders them as a header.
pub fn generate_header<R: rand::Rng + ?Sized>(
    rng: &mut R,
    count: usize,
    generator: &GeneratorConfig,
    emit: &EmitConfig,
) -> Result<String, SamplingError> {
    let collection = Generator::new(generator.clone()).generate(rng, count)?;
    Ok(emit::render_header(&collection, emit))
}
