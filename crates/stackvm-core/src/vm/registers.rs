//! General-purpose register file

use stackvm_bytecode::Register;
use std::fmt;

/// The four registers `ax bx cx dx`, all starting at 0
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Registers {
    slots: [i32; Register::COUNT],
}

impl Registers {
    /// Create a zeroed register file
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a register
    #[inline]
    pub fn get(&self, register: Register) -> i32 {
        self.slots[register.index() as usize]
    }

    /// Write a register
    #[inline]
    pub fn set(&mut self, register: Register, value: i32) {
        self.slots[register.index() as usize] = value;
    }

    /// Registers and their values, in index order
    pub fn iter(&self) -> impl Iterator<Item = (Register, i32)> + '_ {
        Register::ALL.into_iter().map(|register| (register, self.get(register)))
    }
}

impl fmt::Display for Registers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (register, value)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}={}", register, value)?;
        }
        Ok(())
    }
}
