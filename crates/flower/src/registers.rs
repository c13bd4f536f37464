// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Scratch register pool and the diversity selector.
//!
//! Every sequence spills one or two registers from the pool. To keep adjacent
//! sequences from sharing a register footprint, the registers used by the last
//! `depth` sequences are excluded from the next draw. The exclusion window is
//! carried by [`Lookback`], which is threaded through generation as a fold
//! accumulator rather than kept as shared state.

use std::collections::{BTreeSet, VecDeque};
use std::fmt;

use log::debug;
use rand::Rng;
use rand::seq::SliceRandom;

use crate::config::ShortagePolicy;
use crate::error::{PoolError, SamplingError};

/// Caller-saved temporaries `x9`..=`x15` under AAPCS64.
pub const SCRATCH_REGISTERS: [u8; 7] = [9, 10, 11, 12, 13, 14, 15];

/// Frame pointer. Registers from here up (`x29`, `x30`, `sp`/`xzr`) are never spilled.
const FIRST_RESERVED: u8 = 29;

/// A general-purpose 64-bit register that is safe to spill and clobber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Register(u8);

impl Register {
    pub fn new(number: u8) -> Result<Self, PoolError> {
        if number >= FIRST_RESERVED {
            return Err(PoolError::Reserved(number));
        }
        Ok(Self(number))
    }

    pub fn number(self) -> u8 {
        self.0
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x{}", self.0)
    }
}

/// The registers one sequence spills, in ascending order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterSet {
    Single(Register),
    /// Invariant: the first register sorts strictly before the second.
    Pair(Register, Register),
}

impl RegisterSet {
    /// Builds a set from one or two distinct registers, sorting them.
    pub fn from_registers(registers: &[Register]) -> Option<Self> {
        match *registers {
            [only] => Some(Self::Single(only)),
            [a, b] if a < b => Some(Self::Pair(a, b)),
            [a, b] if b < a => Some(Self::Pair(b, a)),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Pair(..) => 2,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Register> {
        let (first, second) = match *self {
            Self::Single(a) => (a, None),
            Self::Pair(a, b) => (a, Some(b)),
        };
        std::iter::once(first).chain(second)
    }

    pub fn contains(&self, register: Register) -> bool {
        self.iter().any(|r| r == register)
    }

    pub fn is_disjoint(&self, other: &RegisterSet) -> bool {
        !self.iter().any(|r| other.contains(r))
    }

    /// Picks one member uniformly.
    pub fn choose<R: Rng + ?Sized>(&self, rng: &mut R) -> Register {
        match *self {
            Self::Single(a) => a,
            Self::Pair(a, b) => {
                if rng.gen_bool(0.5) {
                    a
                } else {
                    b
                }
            }
        }
    }
}

impl fmt::Display for RegisterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(a) => write!(f, "{a}"),
            Self::Pair(a, b) => write!(f, "{a}, {b}"),
        }
    }
}

/// The registers eligible for spilling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterPool {
    registers: Vec<Register>,
}

impl Default for RegisterPool {
    fn default() -> Self {
        Self {
            registers: SCRATCH_REGISTERS.iter().map(|&n| Register(n)).collect(),
        }
    }
}

impl RegisterPool {
    /// Builds a custom pool from register numbers.
    pub fn new(numbers: impl IntoIterator<Item = u8>) -> Result<Self, PoolError> {
        let mut registers = Vec::new();
        for number in numbers {
            let register = Register::new(number)?;
            if registers.contains(&register) {
                return Err(PoolError::Duplicate(number));
            }
            registers.push(register);
        }
        if registers.is_empty() {
            return Err(PoolError::Empty);
        }
        Ok(Self { registers })
    }

    pub fn registers(&self) -> &[Register] {
        &self.registers
    }

    pub fn len(&self) -> usize {
        self.registers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registers.is_empty()
    }

    /// Draws `count` distinct registers that are not in `excluded`.
    ///
    /// When fewer than `count` registers remain, `policy` decides whether to
    /// shrink the draw, ignore the exclusion, or fail.
    pub fn select<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        excluded: &BTreeSet<Register>,
        count: usize,
        policy: ShortagePolicy,
    ) -> Result<RegisterSet, SamplingError> {
        if !(1..=2).contains(&count) {
            return Err(SamplingError::UnsupportedCount(count));
        }

        let available: Vec<Register> = self
            .registers
            .iter()
            .copied()
            .filter(|r| !excluded.contains(r))
            .collect();

        let (candidates, count) = if available.len() >= count {
            (available, count)
        } else {
            debug!(
                "register shortage: need {count}, {} available, policy {policy:?}",
                available.len()
            );
            match policy {
                ShortagePolicy::Clamp if available.is_empty() => {
                    return Err(SamplingError::Exhausted {
                        pool: self.registers.len(),
                    });
                }
                ShortagePolicy::Clamp => {
                    let clamped = available.len();
                    (available, clamped)
                }
                ShortagePolicy::Widen if self.registers.len() >= count => {
                    (self.registers.clone(), count)
                }
                ShortagePolicy::Widen | ShortagePolicy::Fail => {
                    return Err(SamplingError::Shortage {
                        requested: count,
                        available: available.len(),
                        excluded: excluded.len(),
                    });
                }
            }
        };

        let chosen: Vec<Register> = candidates.choose_multiple(rng, count).copied().collect();
        RegisterSet::from_registers(&chosen).ok_or(SamplingError::UnsupportedCount(chosen.len()))
    }
}

/// The register sets of the most recent sequences, oldest first.
#[derive(Debug, Clone, Default)]
pub struct Lookback {
    depth: usize,
    recent: VecDeque<RegisterSet>,
}

impl Lookback {
    /// An empty window remembering up to `depth` sequences. Depth 0 disables exclusion.
    pub fn new(depth: usize) -> Self {
        Self {
            depth,
            recent: VecDeque::new(),
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Union of every register in the window.
    pub fn excluded(&self) -> BTreeSet<Register> {
        self.recent.iter().flat_map(RegisterSet::iter).collect()
    }

    /// Records the set used by the sequence just generated.
    #[must_use]
    pub fn advance(mut self, used: RegisterSet) -> Self {
        if self.depth == 0 {
            return self;
        }
        self.recent.push_back(used);
        while self.recent.len() > self.depth {
            self.recent.pop_front();
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;

    fn reg(n: u8) -> Register {
        Register::new(n).unwrap()
    }

    fn excluding(numbers: &[u8]) -> BTreeSet<Register> {
        numbers.iter().map(|&n| reg(n)).collect()
    }

    #[test]
    fn test_reserved_registers_rejected() {
        assert_eq!(Register::new(29), Err(PoolError::Reserved(29)));
        assert_eq!(Register::new(30), Err(PoolError::Reserved(30)));
        assert_eq!(Register::new(31), Err(PoolError::Reserved(31)));
        assert!(Register::new(28).is_ok());
    }

    #[test]
    fn test_default_pool_is_scratch_set() {
        let pool = RegisterPool::default();
        assert_eq!(pool.len(), 7);
        assert_eq!(pool.registers().first().map(|r| r.to_string()), Some("x9".into()));
        assert_eq!(pool.registers().last().map(|r| r.to_string()), Some("x15".into()));
    }

    #[test]
    fn test_custom_pool_validation() {
        assert_eq!(RegisterPool::new([]), Err(PoolError::Empty));
        assert_eq!(RegisterPool::new([9, 9]), Err(PoolError::Duplicate(9)));
        assert_eq!(RegisterPool::new([9, 30]), Err(PoolError::Reserved(30)));
        assert_eq!(RegisterPool::new([3, 4]).unwrap().len(), 2);
    }

    #[test]
    fn test_register_set_is_sorted() {
        let set = RegisterSet::from_registers(&[reg(12), reg(9)]).unwrap();
        assert_eq!(set, RegisterSet::Pair(reg(9), reg(12)));
        assert_eq!(set.to_string(), "x9, x12");
        assert!(RegisterSet::from_registers(&[reg(9), reg(9)]).is_none());
        assert!(RegisterSet::from_registers(&[]).is_none());
    }

    #[test]
    fn test_select_avoids_excluded() {
        let pool = RegisterPool::default();
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        let excluded = excluding(&[9, 10]);

        for _ in 0..200 {
            let set = pool
                .select(&mut rng, &excluded, 2, ShortagePolicy::Fail)
                .unwrap();
            assert_eq!(set.len(), 2);
            assert!(set.iter().all(|r| !excluded.contains(&r)));
        }
    }

    #[test]
    fn test_select_rejects_unsupported_count() {
        let pool = RegisterPool::default();
        let mut rng = ChaCha20Rng::seed_from_u64(0);
        let result = pool.select(&mut rng, &BTreeSet::new(), 3, ShortagePolicy::Clamp);
        assert_eq!(result, Err(SamplingError::UnsupportedCount(3)));
    }

    #[test]
    fn test_shortage_clamp_keeps_exclusion() {
        let pool = RegisterPool::new([9, 10, 11]).unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let set = pool
            .select(&mut rng, &excluding(&[9, 10]), 2, ShortagePolicy::Clamp)
            .unwrap();
        assert_eq!(set, RegisterSet::Single(reg(11)));
    }

    #[test]
    fn test_shortage_clamp_exhausted() {
        let pool = RegisterPool::new([9, 10]).unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let result = pool.select(&mut rng, &excluding(&[9, 10]), 1, ShortagePolicy::Clamp);
        assert_eq!(result, Err(SamplingError::Exhausted { pool: 2 }));
    }

    #[test]
    fn test_shortage_widen_drops_exclusion() {
        let pool = RegisterPool::new([9, 10]).unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let set = pool
            .select(&mut rng, &excluding(&[9]), 2, ShortagePolicy::Widen)
            .unwrap();
        assert_eq!(set, RegisterSet::Pair(reg(9), reg(10)));
    }

    #[test]
    fn test_shortage_fail() {
        let pool = RegisterPool::new([9, 10, 11]).unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let result = pool.select(&mut rng, &excluding(&[9, 10]), 2, ShortagePolicy::Fail);
        assert_eq!(
            result,
            Err(SamplingError::Shortage {
                requested: 2,
                available: 1,
                excluded: 2,
            })
        );
    }

    #[test]
    fn test_lookback_window() {
        let a = RegisterSet::Single(reg(9));
        let b = RegisterSet::Pair(reg(10), reg(11));
        let c = RegisterSet::Single(reg(12));

        let lookback = Lookback::new(2).advance(a).advance(b);
        assert_eq!(lookback.excluded(), excluding(&[9, 10, 11]));

        let lookback = lookback.advance(c);
        assert_eq!(lookback.excluded(), excluding(&[10, 11, 12]));
    }

    #[test]
    fn test_lookback_unbounded_depth() {
        let lookback = Lookback::new(usize::MAX)
            .advance(RegisterSet::Single(reg(9)))
            .advance(RegisterSet::Single(reg(10)));
        assert_eq!(lookback.depth(), usize::MAX);
        assert_eq!(lookback.excluded(), excluding(&[9, 10]));
    }

    #[test]
    fn test_lookback_depth_zero_never_excludes() {
        let lookback = Lookback::new(0).advance(RegisterSet::Single(reg(9)));
        assert!(lookback.excluded().is_empty());
    }
}
