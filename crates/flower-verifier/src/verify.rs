// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Header and unit verification.

use std::collections::HashSet;

use log::debug;

use crate::classify::{Family, classify, is_nop_form};
use crate::error::{UnitSummary, VerificationError, VerificationResult};
use crate::parser::{HeaderLine, Operand, ParsedHeader, ParsedInstruction, Unit};
use crate::stack::{SP_ALIGNMENT, SpEffect, frame_registers};

/// First register number that may never be spilled (`x29`, `x30`).
const FIRST_RESERVED_REGISTER: u8 = 29;

/// Legal `movk` chunk offsets.
const MOVK_CHUNKS: [i64; 4] = [0, 16, 32, 48];

/// Verifies rendered headers.
#[derive(Debug, Clone, Default)]
pub struct Verifier {
    lookback: usize,
}

impl Verifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also require each unit's registers to be disjoint from those of the
    /// previous `depth` units. Depth 0 skips the check.
    pub fn with_lookback(mut self, depth: usize) -> Self {
        self.lookback = depth;
        self
    }

    pub fn verify_header(&self, text: &str) -> VerificationResult {
        let header = ParsedHeader::parse(text);
        let mut result = VerificationResult::default();

        check_structure(&header, &mut result);

        let mut summaries = Vec::new();
        for unit in header.units() {
            match verify_unit(unit) {
                Ok(summary) => {
                    summaries.push(Some(summary.clone()));
                    result.add_unit(summary);
                }
                Err(errors) => {
                    summaries.push(None);
                    result.extend(errors);
                }
            }
        }

        self.check_diversity(&summaries, &mut result);

        debug!(
            "verified {} units: {} passed, {} errors",
            summaries.len(),
            result.unit_count(),
            result.errors().len()
        );
        result
    }

    fn check_diversity(&self, summaries: &[Option<UnitSummary>], result: &mut VerificationResult) {
        for (i, current) in summaries.iter().enumerate() {
            let Some(current) = current else {
                continue;
            };
            for distance in 1..=self.lookback.min(i) {
                let Some(previous) = &summaries[i - distance] else {
                    continue;
                };
                if current
                    .registers
                    .iter()
                    .any(|r| previous.registers.contains(r))
                {
                    result.push(VerificationError::RecentRegisterReuse {
                        unit: current.name.clone(),
                        previous: previous.name.clone(),
                        distance,
                    });
                }
            }
        }
    }
}

/// Guard placement, stray lines and unit naming.
fn check_structure(header: &ParsedHeader<'_>, result: &mut VerificationResult) {
    let mut openings = Vec::new();
    let mut defines = Vec::new();
    let mut closings = 0;

    for (line, content) in header.lines() {
        match content {
            HeaderLine::GuardOpen(guard) => openings.push(*guard),
            HeaderLine::GuardDefine(guard) => defines.push(*guard),
            HeaderLine::GuardClose(_) => closings += 1,
            HeaderLine::Unrecognised(text) => result.push(VerificationError::UnrecognisedLine {
                line: *line,
                text: text.to_string(),
            }),
            HeaderLine::Unit(_) | HeaderLine::Blank => {}
        }
    }

    if openings.len() != 1 {
        result.push(VerificationError::GuardOpenings(openings.len()));
    }
    if closings != 1 {
        result.push(VerificationError::GuardClosings(closings));
    }
    if let [guard] = openings[..] {
        if !defines.contains(&guard) {
            result.push(VerificationError::GuardNotDefined {
                guard: guard.to_string(),
            });
        }
    }

    let prefix = match openings[..] {
        [guard] => guard.strip_suffix("_BLOCKS_H"),
        _ => None,
    };
    let mut seen = HashSet::new();
    for (position, unit) in header.units().enumerate() {
        if !seen.insert(unit.name) {
            result.push(VerificationError::DuplicateUnit {
                line: unit.line_number,
                name: unit.name.to_string(),
            });
        }
        if let Some(prefix) = prefix {
            let expected = format!("{prefix}_BLOCK_{:03}", position + 1);
            if unit.name != expected {
                result.push(VerificationError::UnitOutOfSequence {
                    line: unit.line_number,
                    name: unit.name.to_string(),
                    expected,
                });
            }
        }
    }
}

/// Checks one unit's frame, filler and terminal no-op.
pub fn verify_unit(unit: &Unit<'_>) -> Result<UnitSummary, Vec<VerificationError>> {
    let name = unit.name.to_string();
    let instructions: Vec<&ParsedInstruction<'_>> = unit.instructions().collect();
    let mut errors = Vec::new();

    if !unit.clobbers.contains(&"memory") {
        errors.push(VerificationError::MissingMemoryClobber { unit: name.clone() });
    }
    let sets_flags = instructions
        .iter()
        .any(|i| classify(i.mnemonic).is_some_and(|c| c.family == Family::Compare));
    if sets_flags && !unit.clobbers.contains(&"cc") {
        errors.push(VerificationError::MissingFlagsClobber { unit: name.clone() });
    }

    // Frame: spill first, restore second to last, nothing else touches sp.
    let effects: Vec<SpEffect> = instructions.iter().map(|i| SpEffect::from(*i)).collect();
    let spill = match effects.first() {
        Some(SpEffect::Decrement(bytes)) => Some(*bytes),
        _ => {
            errors.push(VerificationError::MissingSpill { unit: name.clone() });
            None
        }
    };
    let restore = match instructions.len().checked_sub(2) {
        Some(index) if index > 0 => match effects[index] {
            SpEffect::Increment(bytes) => Some((index, bytes)),
            _ => None,
        },
        _ => None,
    };
    if restore.is_none() {
        errors.push(VerificationError::MissingRestore { unit: name.clone() });
    }

    for (index, effect) in effects.iter().enumerate() {
        let is_frame = (index == 0 && spill.is_some()) || restore.is_some_and(|(i, _)| i == index);
        if *effect != SpEffect::None && !is_frame {
            errors.push(VerificationError::UnsafeStackModification {
                unit: name.clone(),
                index,
                text: instructions[index].text.to_string(),
            });
        }
    }

    let (Some(spilled_bytes), Some((restore_index, restored_bytes))) = (spill, restore) else {
        return Err(errors);
    };

    if spilled_bytes != restored_bytes {
        errors.push(VerificationError::UnbalancedStack {
            unit: name.clone(),
            spilled: spilled_bytes,
            restored: restored_bytes,
        });
    }
    if spilled_bytes % SP_ALIGNMENT != 0 {
        errors.push(VerificationError::MisalignedStack {
            unit: name.clone(),
            bytes: spilled_bytes,
        });
    }

    let spilled = frame_registers(instructions[0]);
    let restored = frame_registers(instructions[restore_index]);
    if spilled != restored {
        errors.push(VerificationError::AsymmetricRegisters {
            unit: name.clone(),
            spilled: register_list(&spilled),
            restored: register_list(&restored),
        });
    }
    for (i, &register) in spilled.iter().enumerate() {
        if register >= FIRST_RESERVED_REGISTER || spilled[..i].contains(&register) {
            errors.push(VerificationError::InvalidSpillRegister {
                unit: name.clone(),
                register,
            });
        }
    }

    let mut checker = FillerChecker {
        unit: unit.name,
        instructions: &instructions,
        spilled: &spilled,
        restore_index,
        labels: unit.label_positions(),
        errors: Vec::new(),
    };
    checker.run();
    errors.extend(checker.errors);

    if let Some(last) = instructions.last() {
        if !is_nop_form(last.mnemonic, &last.operands) {
            errors.push(VerificationError::MissingTerminalNop {
                unit: name.clone(),
                text: last.text.to_string(),
            });
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(UnitSummary {
        name,
        registers: spilled,
        stack_bytes: spilled_bytes,
        instruction_count: instructions.len(),
    })
}

fn register_list(registers: &[u8]) -> String {
    registers
        .iter()
        .map(|r| format!("x{r}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Walks the instructions strictly between the spill and the restore.
struct FillerChecker<'u, 'a> {
    unit: &'a str,
    instructions: &'u [&'u ParsedInstruction<'a>],
    spilled: &'u [u8],
    restore_index: usize,
    labels: Vec<(&'a str, usize)>,
    errors: Vec<VerificationError>,
}

impl FillerChecker<'_, '_> {
    fn run(&mut self) {
        let mut index = 1;
        while index < self.restore_index {
            index += self.check(index);
        }
    }

    /// Checks the instruction at `index`, returning how many instructions it consumed.
    fn check(&mut self, index: usize) -> usize {
        let instruction = self.instructions[index];
        if is_nop_form(instruction.mnemonic, &instruction.operands) {
            return 1;
        }

        let Some(class) = classify(instruction.mnemonic) else {
            self.disallowed(index);
            return 1;
        };

        if class.is_branch() {
            self.check_branch(index);
            return 1;
        }
        match class.family {
            // Memory access, a non-zero mov, or a nop with operands.
            Family::Spill | Family::Restore | Family::Move | Family::Nop => {
                self.disallowed(index);
                return 1;
            }
            Family::MoveKeep => return self.check_movk(index),
            _ => {}
        }

        let Some(ops) = instruction.classified_operands() else {
            self.malformed(index);
            return 1;
        };

        match (class.family, ops.as_slice()) {
            (
                Family::Arithmetic,
                [Operand::Register(rd), Operand::Register(rn), Operand::Immediate(imm)],
            ) if rd == rn => {
                self.check_write(index, *rd);
                self.check_range(index, "add/sub immediate", *imm, 1, 4095);
            }
            (Family::Logical, [Operand::Register(rd), first, second])
                if is_source(first) && is_source(second) =>
            {
                self.check_write(index, *rd);
            }
            (
                Family::Shift,
                [Operand::Register(rd), Operand::Register(_), Operand::Immediate(amount)],
            ) => {
                self.check_write(index, *rd);
                self.check_range(index, "shift amount", *amount, 1, 63);
            }
            (Family::Compare, [first, second]) if is_source(first) && is_source(second) => {}
            _ => self.malformed(index),
        }
        1
    }

    /// A `movk` must be followed by a `movk` of the same register into a lower chunk.
    fn check_movk(&mut self, index: usize) -> usize {
        let Some((register, immediate, chunk)) = movk_fields(self.instructions[index]) else {
            self.malformed(index);
            return 1;
        };
        self.check_write(index, register);
        self.check_movk_operands(index, immediate, chunk);

        let next = index + 1;
        let partner = if next < self.restore_index {
            movk_fields(self.instructions[next])
        } else {
            None
        };
        match partner {
            Some((second, second_immediate, second_chunk))
                if second == register && second_chunk < chunk =>
            {
                self.check_movk_operands(next, second_immediate, second_chunk);
                2
            }
            _ => {
                self.errors.push(VerificationError::MalformedMovk {
                    unit: self.unit.to_string(),
                    index,
                });
                1
            }
        }
    }

    fn check_movk_operands(&mut self, index: usize, immediate: i64, chunk: i64) {
        self.check_range(index, "movk immediate", immediate, 0, 0xFFFF);
        if !MOVK_CHUNKS.contains(&chunk) {
            self.errors.push(VerificationError::MalformedMovk {
                unit: self.unit.to_string(),
                index,
            });
        }
    }

    fn check_branch(&mut self, index: usize) {
        let instruction = self.instructions[index];
        let target = match instruction.operands.as_slice() {
            [target] => self.resolve_target(index, target),
            _ => None,
        };
        let lands_inside = target.is_some_and(|t| t > index && t <= self.restore_index);
        if !lands_inside {
            self.errors.push(VerificationError::InvalidBranchTarget {
                unit: self.unit.to_string(),
                index,
            });
        }
    }

    /// Instruction index a branch operand refers to.
    ///
    /// Supports `.+N` location-counter offsets, numeric local labels (`1f`),
    /// and plain labels. Backward forms resolve to `None`.
    fn resolve_target(&self, index: usize, target: &str) -> Option<usize> {
        if let Some(bytes) = target.strip_prefix(".+") {
            let bytes: usize = bytes.parse().ok()?;
            return (bytes % 4 == 0).then_some(index + bytes / 4);
        }
        if target.starts_with(".-") || target == "." {
            return None;
        }
        if let Some(number) = target.strip_suffix('f') {
            if !number.is_empty() && number.chars().all(|c| c.is_ascii_digit()) {
                return self
                    .labels
                    .iter()
                    .find(|(label, position)| *label == number && *position > index)
                    .map(|&(_, position)| position);
            }
        }
        self.labels
            .iter()
            .find(|(label, _)| *label == target)
            .map(|&(_, position)| position)
    }

    fn check_write(&mut self, index: usize, register: u8) {
        if !self.spilled.contains(&register) {
            self.errors.push(VerificationError::UnsavedRegisterWrite {
                unit: self.unit.to_string(),
                index,
                register,
            });
        }
    }

    fn check_range(&mut self, index: usize, what: &'static str, value: i64, min: i64, max: i64) {
        if !(min..=max).contains(&value) {
            self.errors.push(VerificationError::OutOfRange {
                unit: self.unit.to_string(),
                index,
                what,
                value,
                min,
                max,
            });
        }
    }

    fn disallowed(&mut self, index: usize) {
        self.errors.push(VerificationError::DisallowedInstruction {
            unit: self.unit.to_string(),
            index,
            text: self.instructions[index].text.to_string(),
        });
    }

    fn malformed(&mut self, index: usize) {
        self.errors.push(VerificationError::MalformedOperands {
            unit: self.unit.to_string(),
            index,
            text: self.instructions[index].text.to_string(),
        });
    }
}

/// `(register, immediate, chunk)` of `movk xN, #imm, lsl #chunk`.
fn movk_fields(instruction: &ParsedInstruction<'_>) -> Option<(u8, i64, i64)> {
    if !instruction.mnemonic.eq_ignore_ascii_case("movk") {
        return None;
    }
    match instruction.classified_operands()?.as_slice() {
        [Operand::Register(rd), Operand::Immediate(imm), Operand::ShiftLsl(chunk)] => {
            Some((*rd, *imm, *chunk))
        }
        _ => None,
    }
}

/// A register or `xzr` read as a source operand.
fn is_source(operand: &Operand) -> bool {
    matches!(operand, Operand::Register(_) | Operand::Zero)
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    fn unit_errors(asm: &str) -> Vec<VerificationError> {
        unit_errors_with_clobbers(asm, "\"memory\", \"cc\"")
    }

    fn unit_errors_with_clobbers(asm: &str, clobbers: &str) -> Vec<VerificationError> {
        let header = format!("#define U() __asm__ __volatile__(\"{asm}\" ::: {clobbers})");
        let parsed = ParsedHeader::parse(&header);
        let unit = parsed.units().next().expect("unit");
        verify_unit(unit).err().unwrap_or_default()
    }

    #[test]
    fn test_compare_requires_flags_clobber() {
        let asm = "str x9, [sp, #-16]!;cmp x9, x9;b.eq .+4;nop;ldr x9, [sp], #16;nop";
        assert_eq!(
            unit_errors_with_clobbers(asm, "\"memory\""),
            vec![VerificationError::MissingFlagsClobber { unit: "U".into() }]
        );
        assert!(unit_errors_with_clobbers(asm, "\"memory\", \"cc\"").is_empty());

        // No flag-setting instruction, no "cc" needed.
        let asm = "str x9, [sp, #-16]!;eor x9, x9, x9;ldr x9, [sp], #16;nop";
        assert!(unit_errors_with_clobbers(asm, "\"memory\"").is_empty());
    }

    #[test]
    fn test_wrapping_spill_displacement_rejected() {
        let errors = unit_errors("str x9, [sp, #-4294967312]!;nop;ldr x9, [sp], #16;nop");
        assert!(errors.contains(&VerificationError::MissingSpill { unit: "U".into() }));
        assert!(errors.iter().any(|e| matches!(
            e,
            VerificationError::UnsafeStackModification { index: 0, .. }
        )));
    }

    #[test]
    fn test_missing_spill() {
        let errors = unit_errors("add x9, x9, #1;ldr x9, [sp], #16;nop");
        assert!(errors.contains(&VerificationError::MissingSpill { unit: "U".into() }));
    }

    #[test]
    fn test_restore_must_precede_terminal_nop() {
        let errors = unit_errors("str x9, [sp, #-16]!;nop;ldr x9, [sp], #16");
        assert!(errors.contains(&VerificationError::MissingRestore { unit: "U".into() }));
    }

    #[test]
    fn test_unbalanced_stack() {
        let errors = unit_errors("str x9, [sp, #-16]!;nop;ldr x9, [sp], #32;nop");
        assert_eq!(
            errors,
            vec![VerificationError::UnbalancedStack {
                unit: "U".into(),
                spilled: 16,
                restored: 32,
            }]
        );
    }

    #[test]
    fn test_misaligned_stack() {
        let errors = unit_errors("str x9, [sp, #-24]!;nop;ldr x9, [sp], #24;nop");
        assert_eq!(
            errors,
            vec![VerificationError::MisalignedStack {
                unit: "U".into(),
                bytes: 24,
            }]
        );
    }

    #[test]
    fn test_asymmetric_registers() {
        let errors = unit_errors("stp x9, x10, [sp, #-16]!;nop;ldp x10, x9, [sp], #16;nop");
        assert_eq!(
            errors,
            vec![VerificationError::AsymmetricRegisters {
                unit: "U".into(),
                spilled: "x9, x10".into(),
                restored: "x10, x9".into(),
            }]
        );
    }

    #[test]
    fn test_reserved_spill_register() {
        let errors = unit_errors("str x30, [sp, #-16]!;nop;ldr x30, [sp], #16;nop");
        assert_eq!(
            errors,
            vec![VerificationError::InvalidSpillRegister {
                unit: "U".into(),
                register: 30,
            }]
        );
    }

    #[test]
    fn test_extra_sp_modification() {
        let errors = unit_errors("str x9, [sp, #-16]!;add sp, sp, #16;ldr x9, [sp], #16;nop");
        assert!(errors.iter().any(|e| matches!(
            e,
            VerificationError::UnsafeStackModification { index: 1, .. }
        )));
    }

    #[test]
    fn test_unsaved_register_write() {
        let errors = unit_errors("str x9, [sp, #-16]!;eor x11, x11, x11;ldr x9, [sp], #16;nop");
        assert_eq!(
            errors,
            vec![VerificationError::UnsavedRegisterWrite {
                unit: "U".into(),
                index: 1,
                register: 11,
            }]
        );
    }

    #[test]
    fn test_immediate_ranges() {
        let errors = unit_errors(
            "str x9, [sp, #-16]!;add x9, x9, #4096;lsl x9, x9, #64;lsr x9, x9, #0;ldr x9, [sp], #16;nop",
        );
        let whats: Vec<_> = errors
            .iter()
            .filter_map(|e| match e {
                VerificationError::OutOfRange { what, index, .. } => Some((*what, *index)),
                _ => None,
            })
            .collect();
        assert_eq!(
            whats,
            vec![
                ("add/sub immediate", 1),
                ("shift amount", 2),
                ("shift amount", 3),
            ]
        );
    }

    #[test]
    fn test_movk_pairing() {
        // Single movk.
        let errors = unit_errors("str x9, [sp, #-16]!;movk x9, #0x1, lsl #16;ldr x9, [sp], #16;nop");
        assert!(errors.contains(&VerificationError::MalformedMovk {
            unit: "U".into(),
            index: 1,
        }));

        // Low chunk first.
        let errors = unit_errors(
            "str x9, [sp, #-16]!;movk x9, #0x1, lsl #0;movk x9, #0x2, lsl #32;ldr x9, [sp], #16;nop",
        );
        assert!(!errors.is_empty());

        // Same chunk twice.
        let errors = unit_errors(
            "str x9, [sp, #-16]!;movk x9, #0x1, lsl #32;movk x9, #0x2, lsl #32;ldr x9, [sp], #16;nop",
        );
        assert!(!errors.is_empty());

        // Illegal chunk.
        let errors = unit_errors(
            "str x9, [sp, #-16]!;movk x9, #0x1, lsl #24;movk x9, #0x2, lsl #0;ldr x9, [sp], #16;nop",
        );
        assert!(errors.contains(&VerificationError::MalformedMovk {
            unit: "U".into(),
            index: 1,
        }));
    }

    #[test]
    fn test_backward_or_escaping_branch() {
        let errors = unit_errors("str x9, [sp, #-16]!;nop;b .-4;ldr x9, [sp], #16;nop");
        assert!(errors.contains(&VerificationError::InvalidBranchTarget {
            unit: "U".into(),
            index: 2,
        }));

        // Lands on the terminal no-op, skipping the restore.
        let errors = unit_errors("str x9, [sp, #-16]!;b .+8;ldr x9, [sp], #16;nop");
        assert!(errors.contains(&VerificationError::InvalidBranchTarget {
            unit: "U".into(),
            index: 1,
        }));
    }

    #[test]
    fn test_disallowed_instructions() {
        let errors = unit_errors("str x9, [sp, #-16]!;svc #0;str x9, [x0];ldr x9, [sp], #16;nop");
        assert!(errors.iter().any(|e| matches!(
            e,
            VerificationError::DisallowedInstruction { index: 1, .. }
        )));
        assert!(errors.iter().any(|e| matches!(
            e,
            VerificationError::DisallowedInstruction { index: 2, .. }
        )));
    }

    #[test]
    fn test_terminal_must_be_nop_form() {
        let errors = unit_errors("str x9, [sp, #-16]!;nop;ldr x9, [sp], #16;add x9, x9, #1");
        assert_eq!(
            errors,
            vec![VerificationError::MissingTerminalNop {
                unit: "U".into(),
                text: "add x9, x9, #1".into(),
            }]
        );
    }

    #[test]
    fn test_header_structure() {
        let result = Verifier::new().verify_header(indoc! {r#"
            #ifndef J_BLOCKS_H
            #define J_BLOCKS_H

            #define J_BLOCK_001() __asm__ __volatile__("str x9, [sp, #-16]!;nop;ldr x9, [sp], #16;nop" ::: "memory")
            #define J_BLOCK_003() __asm__ __volatile__("str x9, [sp, #-16]!;nop;ldr x9, [sp], #16;nop" ::: "memory")
            #define J_BLOCK_001() __asm__ __volatile__("str x9, [sp, #-16]!;nop;ldr x9, [sp], #16;nop" ::: "memory")

            #endif // J_BLOCKS_H
            #endif
        "#});

        let errors = result.errors();
        assert!(errors.contains(&VerificationError::GuardClosings(2)));
        assert!(errors.iter().any(|e| matches!(
            e,
            VerificationError::UnitOutOfSequence { name, .. } if name == "J_BLOCK_003"
        )));
        assert!(errors.iter().any(|e| matches!(
            e,
            VerificationError::DuplicateUnit { name, .. } if name == "J_BLOCK_001"
        )));
        assert_eq!(result.unit_count(), 3);
    }

    #[test]
    fn test_diversity_check() {
        let header = indoc! {r#"
            #ifndef J_BLOCKS_H
            #define J_BLOCKS_H
            #define J_BLOCK_001() __asm__ __volatile__("stp x9, x10, [sp, #-16]!;nop;ldp x9, x10, [sp], #16;nop" ::: "memory")
            #define J_BLOCK_002() __asm__ __volatile__("str x11, [sp, #-16]!;nop;ldr x11, [sp], #16;nop" ::: "memory")
            #define J_BLOCK_003() __asm__ __volatile__("str x10, [sp, #-16]!;nop;ldr x10, [sp], #16;nop" ::: "memory")
            #endif // J_BLOCKS_H
        "#};

        assert!(Verifier::new().with_lookback(1).verify_header(header).is_ok());

        let result = Verifier::new().with_lookback(2).verify_header(header);
        assert_eq!(
            result.errors(),
            [VerificationError::RecentRegisterReuse {
                unit: "J_BLOCK_003".into(),
                previous: "J_BLOCK_001".into(),
                distance: 2,
            }]
        );
    }
}
