// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Header and inline-assembly text parser.
//!
//! # Two-Level Parsing
//!
//! 1. **Header parsing** ([`ParsedHeader::parse`]): classifies each line of the
//!    artifact as a guard opening, guard define, unit macro, guard closing,
//!    blank, or unrecognised content.
//!
//! 2. **Statement parsing** ([`Unit`]): splits a unit's asm string on `;` and
//!    parses each statement into an optional label and an instruction with
//!    comma-separated operands. Operands are classified lazily with
//!    [`Operand::parse`].

/// A single operand of a filler, frame or branch instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    /// `x0`..`x30`.
    Register(u8),
    /// `xzr`.
    Zero,
    /// `sp`.
    Sp,
    /// `#12`, `#0x00be`, `#-16`.
    Immediate(i64),
    /// `[sp, #-16]!`, pre-indexed with writeback.
    PreIndexSp(i64),
    /// `[sp]`, base for a post-indexed access.
    BaseSp,
    /// `lsl #16`.
    ShiftLsl(i64),
}

impl Operand {
    /// Classify operand text. Returns `None` for anything outside the forms above.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();

        if let Some(inner) = text.strip_prefix('[') {
            return Self::parse_address(inner);
        }
        if let Some(amount) = text.strip_prefix("lsl") {
            return parse_immediate(amount.trim()).map(Self::ShiftLsl);
        }
        if text.starts_with('#') {
            return parse_immediate(text).map(Self::Immediate);
        }

        match text {
            "xzr" => Some(Self::Zero),
            "sp" => Some(Self::Sp),
            _ => {
                let number: u8 = text.strip_prefix('x')?.parse().ok()?;
                (number <= 30).then_some(Self::Register(number))
            }
        }
    }

    fn parse_address(inner: &str) -> Option<Self> {
        if inner.trim() == "sp]" {
            return Some(Self::BaseSp);
        }
        let inner = inner.strip_suffix("]!")?;
        let (base, offset) = inner.split_once(',')?;
        if base.trim() != "sp" {
            return None;
        }
        parse_immediate(offset.trim()).map(Self::PreIndexSp)
    }
}

/// Parse `#N`, `#-N` or `#0xN`.
fn parse_immediate(text: &str) -> Option<i64> {
    let text = text.strip_prefix('#')?;
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let magnitude = match digits.strip_prefix("0x") {
        Some(hex) => i64::from_str_radix(hex, 16).ok()?,
        None => digits.parse::<i64>().ok()?,
    };
    Some(if negative { -magnitude } else { magnitude })
}

/// An instruction with operands as raw strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedInstruction<'a> {
    /// The mnemonic (e.g., "movk", "b.eq").
    pub mnemonic: &'a str,
    /// Operands as raw strings (e.g., `["x9", "[sp, #-16]!"]`).
    pub operands: Vec<&'a str>,
    /// The statement text without its label.
    pub text: &'a str,
}

impl<'a> ParsedInstruction<'a> {
    fn parse(text: &'a str) -> Self {
        let text = text.trim();

        let mut parts = text.splitn(2, |c: char| c.is_whitespace());
        let mnemonic = parts.next().unwrap_or("");
        let operands = Self::parse_operands(parts.next().unwrap_or(""));

        Self {
            mnemonic,
            operands,
            text,
        }
    }

    /// Split comma-separated operands. Commas inside `[...]` are not separators.
    fn parse_operands(s: &'a str) -> Vec<&'a str> {
        let s = s.trim();
        if s.is_empty() {
            return Vec::new();
        }

        let mut operands = Vec::new();
        let mut start = 0;
        let mut bracket_depth: usize = 0;

        for (i, c) in s.char_indices() {
            match c {
                '[' => bracket_depth += 1,
                ']' => bracket_depth = bracket_depth.saturating_sub(1),
                ',' if bracket_depth == 0 => {
                    let operand = s[start..i].trim();
                    if !operand.is_empty() {
                        operands.push(operand);
                    }
                    start = i + 1;
                }
                _ => {}
            }
        }

        let operand = s[start..].trim();
        if !operand.is_empty() {
            operands.push(operand);
        }

        operands
    }

    /// All operands classified, or `None` if any is unrecognised.
    pub fn classified_operands(&self) -> Option<Vec<Operand>> {
        self.operands.iter().map(|op| Operand::parse(op)).collect()
    }
}

/// One `;`-separated statement of a unit's asm string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement<'a> {
    /// Label defined on this statement (e.g., `"1"` from `"1: b 2f"`).
    pub label: Option<&'a str>,
    pub instruction: Option<ParsedInstruction<'a>>,
}

impl<'a> Statement<'a> {
    fn parse(text: &'a str) -> Self {
        let text = text.trim();
        let (label, rest) = split_label(text);
        let instruction = (!rest.is_empty()).then(|| ParsedInstruction::parse(rest));
        Self { label, instruction }
    }
}

/// Split a statement into optional label and remaining text.
fn split_label(text: &str) -> (Option<&str>, &str) {
    match find_label_colon(text) {
        Some(colon) => (Some(text[..colon].trim()), text[colon + 1..].trim()),
        None => (None, text),
    }
}

/// Position of a label-ending colon.
///
/// Valid label characters: alphanumeric, `_`, `.`, `$`
fn find_label_colon(text: &str) -> Option<usize> {
    for (pos, c) in text.char_indices() {
        if c == ':' {
            return (pos > 0).then_some(pos);
        }
        if c.is_alphanumeric() || c == '_' || c == '.' || c == '$' {
            continue;
        }
        break;
    }
    None
}

/// A `#define NAME() __asm__ __volatile__("..." ::: ...)` macro.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit<'a> {
    pub name: &'a str,
    /// 1-indexed line in the header.
    pub line_number: usize,
    pub statements: Vec<Statement<'a>>,
    /// Clobber names without quotes.
    pub clobbers: Vec<&'a str>,
}

impl<'a> Unit<'a> {
    /// Parse the text after `#define `. Returns `None` unless it is a
    /// zero-argument macro expanding to a single volatile asm statement.
    fn parse(definition: &'a str, line_number: usize) -> Option<Self> {
        let (name, body) = definition.split_once("()")?;
        let name = name.trim();
        if name.is_empty() || name.contains(char::is_whitespace) {
            return None;
        }

        let body = body
            .trim()
            .strip_prefix("__asm__ __volatile__(\"")?
            .strip_suffix(')')?;
        let (asm, tail) = body.split_once('"')?;

        let clobbers = match tail.trim().strip_prefix(":::") {
            Some(list) => list
                .split(',')
                .map(|c| c.trim().trim_matches('"'))
                .filter(|c| !c.is_empty())
                .collect(),
            None if tail.trim().is_empty() => Vec::new(),
            None => return None,
        };

        let statements = asm
            .split(';')
            .filter(|s| !s.trim().is_empty())
            .map(Statement::parse)
            .collect();

        Some(Self {
            name,
            line_number,
            statements,
            clobbers,
        })
    }

    /// The instructions in order, skipping label-only statements.
    pub fn instructions(&self) -> impl Iterator<Item = &ParsedInstruction<'a>> {
        self.statements.iter().filter_map(|s| s.instruction.as_ref())
    }

    /// Labels with the index of the instruction each one names.
    ///
    /// A label-only statement names the next instruction.
    pub fn label_positions(&self) -> Vec<(&'a str, usize)> {
        let mut positions = Vec::new();
        let mut index = 0;
        for statement in &self.statements {
            if let Some(label) = statement.label {
                positions.push((label, index));
            }
            if statement.instruction.is_some() {
                index += 1;
            }
        }
        positions
    }
}

/// One line of the header artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderLine<'a> {
    /// `#ifndef GUARD`
    GuardOpen(&'a str),
    /// `#define GUARD`
    GuardDefine(&'a str),
    Unit(Unit<'a>),
    /// `#endif`, with the guard named in a trailing comment if present.
    GuardClose(Option<&'a str>),
    Blank,
    Unrecognised(&'a str),
}

/// Parsed header text, ready for verification.
pub struct ParsedHeader<'a> {
    lines: Vec<(usize, HeaderLine<'a>)>,
}

impl<'a> ParsedHeader<'a> {
    pub fn parse(input: &'a str) -> Self {
        let lines = input
            .lines()
            .enumerate()
            .map(|(idx, text)| (idx + 1, Self::parse_line(text, idx + 1)))
            .collect();
        Self { lines }
    }

    /// Access the parsed lines with their 1-indexed line numbers.
    pub fn lines(&self) -> &[(usize, HeaderLine<'a>)] {
        &self.lines
    }

    pub fn units(&self) -> impl Iterator<Item = &Unit<'a>> {
        self.lines.iter().filter_map(|(_, line)| match line {
            HeaderLine::Unit(unit) => Some(unit),
            _ => None,
        })
    }

    fn parse_line(text: &'a str, line_number: usize) -> HeaderLine<'a> {
        let trimmed = text.trim();

        if trimmed.is_empty() {
            return HeaderLine::Blank;
        }
        if let Some(guard) = trimmed.strip_prefix("#ifndef ") {
            return HeaderLine::GuardOpen(guard.trim());
        }
        if let Some(rest) = trimmed.strip_prefix("#endif") {
            let guard = rest.trim().strip_prefix("//").map(str::trim);
            return HeaderLine::GuardClose(guard);
        }
        if let Some(definition) = trimmed.strip_prefix("#define ") {
            if !definition.contains('(') {
                return HeaderLine::GuardDefine(definition.trim());
            }
            if let Some(unit) = Unit::parse(definition, line_number) {
                return HeaderLine::Unit(unit);
            }
        }
        HeaderLine::Unrecognised(trimmed)
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    fn unit(text: &str) -> Unit<'_> {
        Unit::parse(text, 1).expect("unit should parse")
    }

    #[test]
    fn test_register_operands() {
        assert_eq!(Operand::parse("x9"), Some(Operand::Register(9)));
        assert_eq!(Operand::parse("x30"), Some(Operand::Register(30)));
        assert_eq!(Operand::parse("x31"), None);
        assert_eq!(Operand::parse("xzr"), Some(Operand::Zero));
        assert_eq!(Operand::parse("sp"), Some(Operand::Sp));
        assert_eq!(Operand::parse("w9"), None);
    }

    #[test]
    fn test_immediate_operands() {
        assert_eq!(Operand::parse("#4095"), Some(Operand::Immediate(4095)));
        assert_eq!(Operand::parse("#0x00be"), Some(Operand::Immediate(0xbe)));
        assert_eq!(Operand::parse("#-16"), Some(Operand::Immediate(-16)));
        assert_eq!(Operand::parse("lsl #48"), Some(Operand::ShiftLsl(48)));
        assert_eq!(Operand::parse("#abc"), None);
    }

    #[test]
    fn test_address_operands() {
        assert_eq!(Operand::parse("[sp, #-32]!"), Some(Operand::PreIndexSp(-32)));
        assert_eq!(Operand::parse("[sp]"), Some(Operand::BaseSp));
        assert_eq!(Operand::parse("[sp, #16]"), None);
        assert_eq!(Operand::parse("[x0, #-16]!"), None);
    }

    #[test]
    fn test_operands_respect_brackets() {
        let instruction = ParsedInstruction::parse("stp x9, x10, [sp, #-16]!");
        assert_eq!(instruction.mnemonic, "stp");
        assert_eq!(instruction.operands, vec!["x9", "x10", "[sp, #-16]!"]);
    }

    #[test]
    fn test_statement_with_label() {
        let statement = Statement::parse("1: b 2f");
        assert_eq!(statement.label, Some("1"));
        let instruction = statement.instruction.unwrap();
        assert_eq!(instruction.mnemonic, "b");
        assert_eq!(instruction.operands, vec!["2f"]);
    }

    #[test]
    fn test_dotted_mnemonic_is_not_label() {
        let statement = Statement::parse("b.eq .+4");
        assert!(statement.label.is_none());
        assert_eq!(statement.instruction.unwrap().operands, vec![".+4"]);
    }

    #[test]
    fn test_unit_parse() {
        let unit = unit(
            r#"JUNK_BLOCK_001() __asm__ __volatile__("str x9, [sp, #-16]!;nop;ldr x9, [sp], #16;nop" ::: "memory", "cc")"#,
        );
        assert_eq!(unit.name, "JUNK_BLOCK_001");
        assert_eq!(unit.instructions().count(), 4);
        assert_eq!(unit.clobbers, vec!["memory", "cc"]);
    }

    #[test]
    fn test_unit_label_positions() {
        let unit = unit(r#"U() __asm__ __volatile__("nop;b 1f;nop;1:;nop" ::: "memory")"#);
        assert_eq!(unit.label_positions(), vec![("1", 3)]);
    }

    #[test]
    fn test_unit_rejects_non_asm_body() {
        assert!(Unit::parse("U() do_something()", 1).is_none());
        assert!(Unit::parse("U(x) __asm__ __volatile__(\"nop\")", 1).is_none());
    }

    #[test]
    fn test_header_lines() {
        let header = ParsedHeader::parse(indoc! {r#"
            #ifndef G_BLOCKS_H
            #define G_BLOCKS_H

            #define G_BLOCK_001() __asm__ __volatile__("nop" ::: "memory")
            int stray;
            #endif // G_BLOCKS_H
        "#});

        let lines: Vec<_> = header.lines().iter().map(|(_, l)| l).collect();
        assert_eq!(lines[0], &HeaderLine::GuardOpen("G_BLOCKS_H"));
        assert_eq!(lines[1], &HeaderLine::GuardDefine("G_BLOCKS_H"));
        assert_eq!(lines[2], &HeaderLine::Blank);
        assert!(matches!(lines[3], HeaderLine::Unit(_)));
        assert_eq!(lines[4], &HeaderLine::Unrecognised("int stray;"));
        assert_eq!(lines[5], &HeaderLine::GuardClose(Some("G_BLOCKS_H")));
        assert_eq!(header.units().count(), 1);
    }
}
