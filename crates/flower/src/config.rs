// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Generation and emission settings.

use clap::ValueEnum;

use crate::error::UsageError;
use crate::registers::RegisterPool;

/// Sequences generated when no count is given.
pub const DEFAULT_COUNT: usize = 500;

/// Namespace for macro and guard names.
pub const DEFAULT_PREFIX: &str = "FLOWER";

/// Artifact written when no output path is given.
pub const DEFAULT_OUTPUT: &str = "arm64_blocks.h";

/// What to do when the lookback exclusion leaves too few registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ShortagePolicy {
    /// Spill fewer registers; fails only if none remain.
    #[default]
    Clamp,
    /// Ignore the exclusion for this sequence.
    Widen,
    /// Abort generation.
    Fail,
}

/// How the fall-through camouflage branches name their targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum JumpStyle {
    /// Location-counter offsets, `b .+8` (GNU as and LLVM).
    #[default]
    Relative,
    /// Numeric local labels, `b 1f` ... `1: nop`.
    LocalLabel,
}

/// Settings for building a sequence collection.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub pool: RegisterPool,
    /// How many preceding sequences' registers are excluded from the next draw.
    pub lookback: usize,
    pub on_shortage: ShortagePolicy,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            pool: RegisterPool::default(),
            lookback: 1,
            on_shortage: ShortagePolicy::default(),
        }
    }
}

/// Settings for rendering the header artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmitConfig {
    prefix: String,
    pub jump_style: JumpStyle,
}

impl Default for EmitConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            jump_style: JumpStyle::default(),
        }
    }
}

impl EmitConfig {
    pub fn new(prefix: impl Into<String>, jump_style: JumpStyle) -> Result<Self, UsageError> {
        let prefix = prefix.into();
        if !is_c_identifier(&prefix) {
            return Err(UsageError::InvalidPrefix(prefix));
        }
        Ok(Self { prefix, jump_style })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

fn is_c_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Parses the raw sequence-count argument.
///
/// `None` yields [`DEFAULT_COUNT`]. Anything that is not a positive integer is
/// a usage error.
pub fn parse_count(raw: Option<&str>) -> Result<usize, UsageError> {
    let Some(raw) = raw else {
        return Ok(DEFAULT_COUNT);
    };
    match raw.trim().parse::<usize>() {
        Ok(count) if count > 0 => Ok(count),
        _ => Err(UsageError::InvalidCount),
    }
}
