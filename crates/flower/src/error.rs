// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Error types for sequence generation.

use std::path::PathBuf;

use thiserror::Error;

/// Invalid invocation parameters. Reported before any generation work.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UsageError {
    /// The sequence count is missing a positive integer value.
    #[error("Please provide a positive integer argument")]
    InvalidCount,
    /// The macro namespace is not usable as a C identifier.
    #[error("'{0}' is not a valid C identifier prefix")]
    InvalidPrefix(String),
}

/// Register selection could not satisfy the requested count.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SamplingError {
    #[error(
        "need {requested} registers but only {available} remain after excluding {excluded} recently used"
    )]
    Shortage {
        requested: usize,
        available: usize,
        excluded: usize,
    },
    /// Every register in the pool is excluded, so even clamping leaves nothing.
    #[error("all {pool} registers in the pool were used by recent sequences")]
    Exhausted { pool: usize },
    #[error("a sequence spills 1 or 2 registers, not {0}")]
    UnsupportedCount(usize),
}

/// A custom register pool violates the scratch-register rules.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("register pool is empty")]
    Empty,
    #[error("x{0} is reserved (frame pointer, link register, or sp/xzr)")]
    Reserved(u8),
    #[error("x{0} appears more than once in the pool")]
    Duplicate(u8),
}

/// An operand does not fit the A64 encoding it is destined for.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodingError {
    #[error("add/sub immediate {0} outside [1, 4095]")]
    ArithImmediate(u32),
    #[error("shift amount {0} outside [1, 63]")]
    ShiftAmount(u32),
    #[error("movk chunk offset {0} is not one of 0, 16, 32, 48")]
    Chunk(u32),
    #[error("stack offset {0} must be a non-zero multiple of 16 no larger than 240")]
    StackOffset(u32),
}

/// The artifact could not be written.
#[derive(Debug, Error)]
pub enum EmitError {
    #[error("failed to write {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
