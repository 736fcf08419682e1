//! Physical register pool.
//!
//! The linear-scan allocator hands out physical slots from a [`RegisterFile`]:
//! a bit set of free slots where allocation always picks the lowest free index.
//! Slot numbers index the temporary-register table of
//! [`RegisterConfig`](crate::x64::RegisterConfig).

use std::fmt;

/// Maximum number of slots a register file can track.
pub const MAX_REGISTERS: usize = 64;

/// A physical register slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PhysReg(pub u8);

impl PhysReg {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for PhysReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

/// Bit set over register slots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegBitSet(u64);

impl RegBitSet {
    /// Create empty register set.
    pub fn new() -> Self {
        Self(0)
    }

    /// Set containing slots `0..count`.
    pub fn first_n(count: usize) -> Self {
        if count >= MAX_REGISTERS {
            Self(u64::MAX)
        } else {
            Self((1u64 << count) - 1)
        }
    }

    pub fn contains(&self, reg: PhysReg) -> bool {
        reg.index() < MAX_REGISTERS && self.0 & (1u64 << reg.0) != 0
    }

    pub fn set(&mut self, reg: PhysReg) {
        if reg.index() < MAX_REGISTERS {
            self.0 |= 1u64 << reg.0;
        }
    }

    pub fn clear(&mut self, reg: PhysReg) {
        if reg.index() < MAX_REGISTERS {
            self.0 &= !(1u64 << reg.0);
        }
    }

    /// Lowest slot in the set.
    pub fn first(&self) -> Option<PhysReg> {
        if self.0 == 0 {
            None
        } else {
            Some(PhysReg(self.0.trailing_zeros() as u8))
        }
    }

}

/// Error types for register pool operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegAllocError {
    /// Every slot is taken.
    NoRegistersAvailable,
    /// The slot is not part of this file.
    InvalidRegister(PhysReg),
    /// The slot was already free.
    NotAllocated(PhysReg),
}

impl fmt::Display for RegAllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegAllocError::NoRegistersAvailable => write!(f, "no registers available"),
            RegAllocError::InvalidRegister(reg) => write!(f, "invalid register {}", reg),
            RegAllocError::NotAllocated(reg) => write!(f, "register {} is not allocated", reg),
        }
    }
}

impl std::error::Error for RegAllocError {}

/// Free/used tracking for a fixed number of physical slots.
#[derive(Debug, Clone)]
pub struct RegisterFile {
    count: usize,
    free: RegBitSet,
}

impl RegisterFile {
    pub fn new(count: usize) -> Self {
        let count = count.min(MAX_REGISTERS);
        Self {
            count,
            free: RegBitSet::first_n(count),
        }
    }

    /// Number of slots managed by this file.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Take the lowest-numbered free slot.
    pub fn allocate(&mut self) -> Result<PhysReg, RegAllocError> {
        let reg = self.free.first().ok_or(RegAllocError::NoRegistersAvailable)?;
        self.free.clear(reg);
        Ok(reg)
    }

    /// Return a slot to the pool.
    pub fn release(&mut self, reg: PhysReg) -> Result<(), RegAllocError> {
        if reg.index() >= self.count {
            return Err(RegAllocError::InvalidRegister(reg));
        }
        if self.free.contains(reg) {
            return Err(RegAllocError::NotAllocated(reg));
        }
        self.free.set(reg);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitset_operations() {
        let mut set = RegBitSet::new();
        assert_eq!(set.first(), None);

        set.set(PhysReg(3));
        set.set(PhysReg(1));
        assert!(set.contains(PhysReg(1)));
        assert!(!set.contains(PhysReg(2)));
        assert_eq!(set.first(), Some(PhysReg(1)));

        set.clear(PhysReg(1));
        assert_eq!(set.first(), Some(PhysReg(3)));
        assert!(!set.contains(PhysReg(64)));

        assert_eq!(RegBitSet::first_n(2), {
            let mut pair = RegBitSet::new();
            pair.set(PhysReg(0));
            pair.set(PhysReg(1));
            pair
        });
    }

    #[test]
    fn test_lowest_slot_first() {
        let mut file = RegisterFile::new(6);
        assert_eq!(file.len(), 6);

        let a = file.allocate().unwrap();
        let b = file.allocate().unwrap();
        let c = file.allocate().unwrap();
        assert_eq!((a, b, c), (PhysReg(0), PhysReg(1), PhysReg(2)));

        file.release(b).unwrap();
        assert_eq!(file.allocate().unwrap(), PhysReg(1));
        assert_eq!(file.allocate().unwrap(), PhysReg(3));
    }

    #[test]
    fn test_exhaustion_and_bad_release() {
        let mut file = RegisterFile::new(2);
        file.allocate().unwrap();
        file.allocate().unwrap();
        assert_eq!(file.allocate(), Err(RegAllocError::NoRegistersAvailable));

        assert_eq!(
            file.release(PhysReg(5)),
            Err(RegAllocError::InvalidRegister(PhysReg(5)))
        );
        file.release(PhysReg(0)).unwrap();
        assert_eq!(
            file.release(PhysReg(0)),
            Err(RegAllocError::NotAllocated(PhysReg(0)))
        );
    }
}
