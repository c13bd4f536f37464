// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Sequence assembly and collection generation.
//!
//! Generation is a fold over a [`Lookback`] window: each step draws registers
//! that avoid the window, frames and fills one sequence, and hands the advanced
//! window to the next step. Nothing else carries over between sequences.

use std::collections::BTreeMap;

use log::{debug, trace};
use rand::Rng;

use crate::config::{GeneratorConfig, JumpStyle};
use crate::error::SamplingError;
use crate::frame::{Frame, StackOffset};
use crate::instruction::{Instruction, NopForm};
use crate::registers::{Lookback, RegisterSet};
use crate::synth;

/// One self-contained neutral sequence:
/// `[spill, filler..., restore, terminal nop]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionSequence {
    instructions: Vec<Instruction>,
    registers: RegisterSet,
}

impl InstructionSequence {
    /// Concatenates the frame entry, filler, frame exit and terminal no-op.
    pub fn assemble(frame: &Frame, filler: Vec<Instruction>, terminal: NopForm) -> Self {
        let mut instructions = Vec::with_capacity(filler.len() + 3);
        instructions.push(frame.entry());
        instructions.extend(filler);
        instructions.push(frame.exit());
        instructions.push(Instruction::Nop(terminal));

        Self {
            instructions,
            registers: frame.registers(),
        }
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn registers_used(&self) -> RegisterSet {
        self.registers
    }

    /// Renders each instruction as assembly text.
    ///
    /// With [`JumpStyle::LocalLabel`], every branch target gets a numeric local
    /// label (`1:`, `2:`, ...) and branches refer to it with an `f` suffix.
    pub fn render(&self, style: JumpStyle) -> Vec<String> {
        match style {
            JumpStyle::Relative => self.instructions.iter().map(ToString::to_string).collect(),
            JumpStyle::LocalLabel => self.render_with_labels(),
        }
    }

    fn render_with_labels(&self) -> Vec<String> {
        let mut labels: BTreeMap<usize, usize> = BTreeMap::new();
        for (index, instruction) in self.instructions.iter().enumerate() {
            if let Some(target) = instruction.branch_target(index) {
                let next = labels.len() + 1;
                labels.entry(target).or_insert(next);
            }
        }

        self.instructions
            .iter()
            .enumerate()
            .map(|(index, instruction)| {
                let text = match (instruction, instruction.branch_target(index)) {
                    (Instruction::Branch { kind, .. }, Some(target)) => {
                        format!("{} {}f", kind.mnemonic(), labels[&target])
                    }
                    _ => instruction.to_string(),
                };
                match labels.get(&index) {
                    Some(label) => format!("{label}: {text}"),
                    None => text,
                }
            })
            .collect()
    }

    /// The sequence as one opaque GNU C statement.
    ///
    /// `volatile` plus the `"memory"` clobber keep the optimizer from moving,
    /// merging or dropping it; `"cc"` covers the flags `cmp` overwrites.
    pub fn inline_asm(&self, style: JumpStyle) -> String {
        format!(
            "__asm__ __volatile__(\"{}\" ::: \"memory\", \"cc\")",
            self.render(style).join(";")
        )
    }
}

/// Ordered, 1-indexed list of independently neutral sequences.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SequenceCollection {
    sequences: Vec<InstructionSequence>,
}

impl SequenceCollection {
    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    /// The sequence at 1-based `index`.
    pub fn get(&self, index: usize) -> Option<&InstructionSequence> {
        index.checked_sub(1).and_then(|i| self.sequences.get(i))
    }

    pub fn iter(&self) -> impl Iterator<Item = &InstructionSequence> {
        self.sequences.iter()
    }

    /// Sequences paired with their 1-based index.
    pub fn numbered(&self) -> impl Iterator<Item = (usize, &InstructionSequence)> {
        self.sequences.iter().enumerate().map(|(i, s)| (i + 1, s))
    }
}

impl FromIterator<InstructionSequence> for SequenceCollection {
    fn from_iter<I: IntoIterator<Item = InstructionSequence>>(iter: I) -> Self {
        Self {
            sequences: iter.into_iter().collect(),
        }
    }
}

/// Builds sequences according to a [`GeneratorConfig`].
#[derive(Debug, Clone, Default)]
pub struct Generator {
    config: GeneratorConfig,
}

impl Generator {
    pub fn new(config: GeneratorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Produces one sequence and the window advanced past it.
    pub fn step<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        lookback: Lookback,
    ) -> Result<(InstructionSequence, Lookback), SamplingError> {
        let excluded = lookback.excluded();
        let count = rng.gen_range(1..=self.config.pool.len().min(2));
        let registers = self
            .config
            .pool
            .select(rng, &excluded, count, self.config.on_shortage)?;

        let frame = Frame::new(registers, StackOffset::random(rng));
        let filler = synth::synthesize(&registers, rng);
        let terminal = synth::terminal_nop(rng);
        let sequence = InstructionSequence::assemble(&frame, filler, terminal);
        trace!(
            "sequence over [{registers}]: {} instructions",
            sequence.instructions.len()
        );

        Ok((sequence, lookback.advance(registers)))
    }

    /// Produces `count` sequences, threading the lookback window through each step.
    pub fn generate<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        count: usize,
    ) -> Result<SequenceCollection, SamplingError> {
        let start = (Vec::with_capacity(count), Lookback::new(self.config.lookback));
        let (sequences, _) =
            (0..count).try_fold(start, |(mut sequences, lookback), _| {
                let (sequence, lookback) = self.step(rng, lookback)?;
                sequences.push(sequence);
                Ok::<_, SamplingError>((sequences, lookback))
            })?;

        debug!(
            "generated {} sequences with lookback depth {}",
            sequences.len(),
            self.config.lookback
        );
        Ok(SequenceCollection { sequences })
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;
    use crate::config::ShortagePolicy;
    use crate::instruction::{BranchKind, ShiftAmount, ShiftOp};
    use crate::registers::{Register, RegisterPool};

    fn x(n: u8) -> Register {
        Register::new(n).unwrap()
    }

    fn camouflaged() -> InstructionSequence {
        let frame = Frame::new(RegisterSet::Single(x(9)), StackOffset::new(16).unwrap());
        let filler = vec![
            Instruction::Shift {
                op: ShiftOp::Lsl,
                register: x(9),
                amount: ShiftAmount::new(3).unwrap(),
            },
            Instruction::Compare { register: x(9) },
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
        ];
        InstructionSequence::assemble(&frame, filler, NopForm::OrrZero)
    }

    #[test]
    fn test_assemble_order() {
        let sequence = camouflaged();
        let text = sequence.render(JumpStyle::Relative);
        assert_eq!(text.first().map(String::as_str), Some("str x9, [sp, #-16]!"));
        assert_eq!(text[text.len() - 2], "ldr x9, [sp], #16");
        assert_eq!(text.last().map(String::as_str), Some("orr xzr, xzr, xzr"));
        assert_eq!(sequence.registers_used(), RegisterSet::Single(x(9)));
    }

    #[test]
    fn test_render_local_labels() {
        let text = camouflaged().render(JumpStyle::LocalLabel);
        assert_eq!(
            text,
            [
                "str x9, [sp, #-16]!",
                "lsl x9, x9, #3",
                "cmp x9, x9",
                "b.eq 1f",
                "1: b 2f",
                "nop",
                "2: nop",
                "ldr x9, [sp], #16",
                "orr xzr, xzr, xzr",
            ]
        );
    }

    #[test]
    fn test_inline_asm_statement() {
        let statement = camouflaged().inline_asm(JumpStyle::Relative);
        assert_eq!(
            statement,
            "__asm__ __volatile__(\"str x9, [sp, #-16]!;lsl x9, x9, #3;cmp x9, x9;\
             b.eq .+4;b .+8;nop;nop;ldr x9, [sp], #16;orr xzr, xzr, xzr\" ::: \"memory\", \"cc\")"
        );
    }

    #[test]
    fn test_adjacent_sequences_are_disjoint() {
        let generator = Generator::default();
        let mut rng = ChaCha20Rng::seed_from_u64(21);
        let collection = generator.generate(&mut rng, 300).unwrap();
        assert_eq!(collection.len(), 300);

        let sequences: Vec<_> = collection.iter().collect();
        for window in sequences.windows(2) {
            assert!(
                window[0]
                    .registers_used()
                    .is_disjoint(&window[1].registers_used())
            );
        }
    }

    #[test]
    fn test_deeper_lookback() {
        let generator = Generator::new(GeneratorConfig {
            lookback: 2,
            ..GeneratorConfig::default()
        });
        let mut rng = ChaCha20Rng::seed_from_u64(22);
        let collection = generator.generate(&mut rng, 200).unwrap();

        let sequences: Vec<_> = collection.iter().collect();
        for window in sequences.windows(3) {
            let newest = window[2].registers_used();
            assert!(newest.is_disjoint(&window[0].registers_used()));
            assert!(newest.is_disjoint(&window[1].registers_used()));
        }
    }

    #[test]
    fn test_same_seed_same_collection() {
        let generator = Generator::default();
        let first = generator
            .generate(&mut ChaCha20Rng::seed_from_u64(99), 50)
            .unwrap();
        let second = generator
            .generate(&mut ChaCha20Rng::seed_from_u64(99), 50)
            .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_shortage_policy_fail_propagates() {
        let generator = Generator::new(GeneratorConfig {
            pool: RegisterPool::new([9, 10]).unwrap(),
            lookback: 1,
            on_shortage: ShortagePolicy::Fail,
        });
        // With two registers and depth 1, a pair draw is followed by an empty pool.
        let mut rng = ChaCha20Rng::seed_from_u64(5);
        let result = generator.generate(&mut rng, 100);
        assert!(matches!(result, Err(SamplingError::Shortage { .. })));
    }

    #[test]
    fn test_shortage_policy_widen_completes() {
        let generator = Generator::new(GeneratorConfig {
            pool: RegisterPool::new([9, 10]).unwrap(),
            lookback: 1,
            on_shortage: ShortagePolicy::Widen,
        });
        let mut rng = ChaCha20Rng::seed_from_u64(5);
        assert_eq!(generator.generate(&mut rng, 100).unwrap().len(), 100);
    }

    #[test]
    fn test_collection_is_one_indexed() {
        let collection = Generator::default()
            .generate(&mut ChaCha20Rng::seed_from_u64(1), 3)
            .unwrap();
        assert!(collection.get(0).is_none());
        assert!(collection.get(3).is_some());
        assert!(collection.get(4).is_none());
        let indices: Vec<usize> = collection.numbered().map(|(i, _)| i).collect();
        assert_eq!(indices, [1, 2, 3]);
    }
}
