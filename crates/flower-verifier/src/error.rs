// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Error types for header verification

use thiserror::Error;

/// A property violated by the header or one of its units.
///
/// `index` is the 0-based position of an instruction within its unit,
/// ignoring label-only statements.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerificationError {
    #[error("expected exactly one include guard opening, found {0}")]
    GuardOpenings(usize),

    #[error("expected exactly one include guard closing, found {0}")]
    GuardClosings(usize),

    #[error("include guard `{guard}` is opened but never defined")]
    GuardNotDefined { guard: String },

    #[error("line {line}: unrecognised content: {text}")]
    UnrecognisedLine { line: usize, text: String },

    #[error("line {line}: unit `{name}` is out of sequence, expected `{expected}`")]
    UnitOutOfSequence {
        line: usize,
        name: String,
        expected: String,
    },

    #[error("line {line}: duplicate unit `{name}`")]
    DuplicateUnit { line: usize, name: String },

    #[error("{unit}: asm statement does not clobber \"memory\"")]
    MissingMemoryClobber { unit: String },

    #[error("{unit}: asm statement sets the condition flags but does not clobber \"cc\"")]
    MissingFlagsClobber { unit: String },

    #[error("{unit}: first instruction is not a pre-indexed register spill")]
    MissingSpill { unit: String },

    #[error("{unit}: no post-indexed register restore before the terminal no-op")]
    MissingRestore { unit: String },

    #[error("{unit}: unsafe sp modification at instruction {index}: {text}")]
    UnsafeStackModification {
        unit: String,
        index: usize,
        text: String,
    },

    #[error("{unit}: spill lowers sp by {spilled} bytes but restore raises it by {restored}")]
    UnbalancedStack {
        unit: String,
        spilled: u32,
        restored: u32,
    },

    #[error("{unit}: stack displacement of {bytes} bytes is not 16-byte aligned")]
    MisalignedStack { unit: String, bytes: u32 },

    #[error("{unit}: restore names [{restored}] but spill names [{spilled}]")]
    AsymmetricRegisters {
        unit: String,
        spilled: String,
        restored: String,
    },

    #[error("{unit}: spill of reserved or repeated register x{register}")]
    InvalidSpillRegister { unit: String, register: u8 },

    #[error("{unit}: instruction {index} writes x{register}, which was not spilled")]
    UnsavedRegisterWrite {
        unit: String,
        index: usize,
        register: u8,
    },

    #[error("{unit}: {what} {value} at instruction {index} outside [{min}, {max}]")]
    OutOfRange {
        unit: String,
        index: usize,
        what: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },

    #[error(
        "{unit}: movk at instruction {index} must pair with a movk to a lower chunk of the same register"
    )]
    MalformedMovk { unit: String, index: usize },

    #[error("{unit}: branch at instruction {index} does not land forward inside the filler")]
    InvalidBranchTarget { unit: String, index: usize },

    #[error("{unit}: last instruction `{text}` is not a recognised no-op")]
    MissingTerminalNop { unit: String, text: String },

    #[error("{unit}: disallowed instruction at {index}: {text}")]
    DisallowedInstruction {
        unit: String,
        index: usize,
        text: String,
    },

    #[error("{unit}: malformed operands at instruction {index}: {text}")]
    MalformedOperands {
        unit: String,
        index: usize,
        text: String,
    },

    #[error("{unit} reuses registers of {previous}, {distance} unit(s) earlier")]
    RecentRegisterReuse {
        unit: String,
        previous: String,
        distance: usize,
    },
}

/// Per-unit facts gathered during verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitSummary {
    pub name: String,
    /// Spilled register numbers, in spill order.
    pub registers: Vec<u8>,
    /// Bytes the frame lowers `sp` by.
    pub stack_bytes: u32,
    pub instruction_count: usize,
}

/// Result of verification containing any errors found
#[derive(Debug, Default)]
pub struct VerificationResult {
    errors: Vec<VerificationError>,
    units: Vec<UnitSummary>,
}

impl VerificationResult {
    /// Returns true if verification passed with no errors
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the list of verification errors
    pub fn errors(&self) -> &[VerificationError] {
        &self.errors
    }

    /// Consumes the result and returns the errors
    pub fn into_errors(self) -> Vec<VerificationError> {
        self.errors
    }

    /// Summaries of the units that passed unit-level checks
    pub fn units(&self) -> &[UnitSummary] {
        &self.units
    }

    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    pub(crate) fn extend(&mut self, errors: impl IntoIterator<Item = VerificationError>) {
        self.errors.extend(errors);
    }

    pub(crate) fn push(&mut self, error: VerificationError) {
        self.errors.push(error);
    }

    pub(crate) fn add_unit(&mut self, summary: UnitSummary) {
        self.units.push(summary);
    }
}
