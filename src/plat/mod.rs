//! Common platform code for the RISCII 16-bit instruction set.

use std::fmt;

use bitflags::bitflags;
use thiserror::Error;

/// An error for the core platform of RISCII.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PlatformError {
    #[error("invalid operands for {0}")]
    InvalidInstruction(Opcode),
    #[error("immediate {imm} out of range for {op} (expected {min}..={max})")]
    ImmOutOfRange {
        op: Opcode,
        imm: i32,
        min: i32,
        max: i32,
    },
}

/// Type alias for Result<T, [PlatformError]>.
pub type PResult<T> = Result<T, PlatformError>;

/// The eight registers in RISCII.
///
/// `R0` - `R3` are general purpose and may be cached by the compiler. The rest are fixed-purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Register {
    R0 = 0,
    R1,
    R2,
    R3,
    /// Stack pointer
    SP,
    /// Frame pointer
    FP,
    /// Accumulator, holds expression and return values
    AC,
    /// Return address, doubles as the spare address register
    RA,
}

impl Register {
    /// The registers eligible for value caching, in eviction-scan order.
    pub const LOADS: [Register; 4] = [Register::R0, Register::R1, Register::R2, Register::R3];

    pub fn is_load(self) -> bool {
        (self as u8) <= Register::R3 as u8
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Register::R0 => "$0",
            Register::R1 => "$1",
            Register::R2 => "$2",
            Register::R3 => "$3",
            Register::SP => "$sp",
            Register::FP => "$fp",
            Register::AC => "$ac",
            Register::RA => "$ra",
        };
        f.write_str(s)
    }
}

/// The sixteen opcodes of RISCII, one per value of the top nibble of an instruction word.
///
/// ALU opcodes (`ADD`, `SUB`, `XOR`, `SHL`, `SHR`, `ORR`, `AND`) set the `nzp` condition codes
/// from their result. `LBI`, memory and jump opcodes leave them untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// Stops the clock
    Hlt = 0,
    Nop,
    /// `RA <- PC + 2; PC <- PC + 2 + imm9`
    Jal,
    /// "Branch on condition"
    /// ```text
    /// if (flags & nzp) != 0 {
    ///     PC <- PC + 2 + imm9
    /// }
    /// ```
    Brc,
    /// `regA <- mem[regB + imm6]`
    Ldr,
    /// `PC <- regB + imm6`
    Jpr,
    /// `regA <- PC + 2; PC <- regB + imm6`
    Jlr,
    /// `mem[regB + imm6] <- regA`
    Str,
    /// `regA <- regB + (regC | imm5)`
    Add,
    /// `regA <- regB - (regC | imm5)`
    Sub,
    /// "Load byte immediate"
    /// ```text
    /// if shift {
    ///     regA <- (regA << 8) | imm8
    /// } else {
    ///     regA <- sext(imm8)
    /// }
    /// ```
    Lbi,
    /// `regA <- regB ^ (regC | imm5)`
    Xor,
    /// `regA <- regB << (regC | imm4)`
    Shl,
    /// `regA <- regB >> (regC | imm4)`, arithmetic when the `-a` flag is set
    Shr,
    /// `regA <- regB | (regC | imm5)`
    Orr,
    /// `regA <- regB & (regC | imm5)`
    And,
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Opcode::Hlt => "HLT",
            Opcode::Nop => "NOP",
            Opcode::Jal => "JAL",
            Opcode::Brc => "BRC",
            Opcode::Ldr => "LDR",
            Opcode::Jpr => "JPR",
            Opcode::Jlr => "JLR",
            Opcode::Str => "STR",
            Opcode::Add => "ADD",
            Opcode::Sub => "SUB",
            Opcode::Lbi => "LBI",
            Opcode::Xor => "XOR",
            Opcode::Shl => "SHL",
            Opcode::Shr => "SHR",
            Opcode::Orr => "ORR",
            Opcode::And => "AND",
        };
        f.write_str(s)
    }
}

impl Opcode {
    fn is_shift(self) -> bool {
        matches!(self, Opcode::Shl | Opcode::Shr)
    }
}

bitflags! {
    /// Condition codes tested by `BRC`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Cond: u8 {
        const N = 0b100;
        const Z = 0b010;
        const P = 0b001;
    }
}

impl fmt::Display for Cond {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.contains(Cond::N) {
            f.write_str("n")?;
        }
        if self.contains(Cond::Z) {
            f.write_str("z")?;
        }
        if self.contains(Cond::P) {
            f.write_str("p")?;
        }
        Ok(())
    }
}

bitflags! {
    /// Modifier flags of single instructions.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct InstrFlags: u8 {
        /// `LBI -s`: shift the register up a byte before loading the low byte.
        const SHIFT = 0b01;
        /// `SHR -a`: arithmetic (sign-filling) right shift.
        const ARITH = 0b10;
    }
}

/// Operand shapes, indicating which fields an instruction carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstrFormat {
    /// `<Opcode, Register, Register, Register>`
    Rrr(Register, Register, Register),
    /// `<Opcode, Register, Register, Imm5>`
    Rri(Register, Register, i16),
    /// `<Opcode, Register, Imm9>`
    Ri(Register, i16),
    /// `<Opcode, Cond, Imm9>`
    Ci(Cond, i16),
    /// `<Opcode, Register, Register, Imm6>`
    Rro(Register, Register, i16),
    /// `<Opcode, ZEROS, Register, Imm6>`
    Ro(Register, i16),
    /// `<Opcode, ZEROS>`
    OpOnly,
}

/// A single RISCII instruction, with an optional listing comment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Instruction {
    pub op: Opcode,
    pub flags: InstrFlags,
    pub format: InstrFormat,
    pub comment: Option<String>,
}

impl Instruction {
    pub fn new(op: Opcode, format: InstrFormat) -> Self {
        Self {
            op,
            flags: InstrFlags::empty(),
            format,
            comment: None,
        }
    }

    pub fn rrr(op: Opcode, a: Register, b: Register, c: Register) -> Self {
        Self::new(op, InstrFormat::Rrr(a, b, c))
    }

    pub fn rri(op: Opcode, a: Register, b: Register, imm: i16) -> Self {
        Self::new(op, InstrFormat::Rri(a, b, imm))
    }

    /// `LBI reg imm`, or `LBI -s reg imm` when `shift` is set.
    pub fn lbi(reg: Register, imm: i16, shift: bool) -> Self {
        let mut instr = Self::new(Opcode::Lbi, InstrFormat::Ri(reg, imm));
        instr.flags.set(InstrFlags::SHIFT, shift);
        instr
    }

    pub fn brc(cond: Cond, offset: i16) -> Self {
        Self::new(Opcode::Brc, InstrFormat::Ci(cond, offset))
    }

    pub fn rro(op: Opcode, a: Register, b: Register, offset: i16) -> Self {
        Self::new(op, InstrFormat::Rro(a, b, offset))
    }

    pub fn jpr(reg: Register, offset: i16) -> Self {
        Self::new(Opcode::Jpr, InstrFormat::Ro(reg, offset))
    }

    pub fn op_only(op: Opcode) -> Self {
        Self::new(op, InstrFormat::OpOnly)
    }

    pub fn with_flags(mut self, flags: InstrFlags) -> Self {
        self.flags |= flags;
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Checks if this instruction has a valid operand shape for its opcode.
    ///
    /// # Errors
    ///
    /// This function will return an error if the instruction's format is invalid for its opcode.
    pub fn validate(&self) -> PResult<()> {
        #[doc(hidden)]
        macro_rules! assert_format {
            ($fmt:pat) => {
                if matches!(self.format, $fmt) {
                    Ok(())
                } else {
                    Err(PlatformError::InvalidInstruction(self.op))
                }
            };
        }
        match self.op {
            Opcode::Hlt | Opcode::Nop => assert_format!(InstrFormat::OpOnly),
            Opcode::Add
            | Opcode::Sub
            | Opcode::Xor
            | Opcode::Shl
            | Opcode::Shr
            | Opcode::Orr
            | Opcode::And => assert_format!(InstrFormat::Rrr(..) | InstrFormat::Rri(..)),
            Opcode::Lbi | Opcode::Jal => assert_format!(InstrFormat::Ri(..)),
            Opcode::Brc => assert_format!(InstrFormat::Ci(..)),
            Opcode::Ldr | Opcode::Str | Opcode::Jlr => assert_format!(InstrFormat::Rro(..)),
            Opcode::Jpr => assert_format!(InstrFormat::Ro(..)),
        }
    }

    fn check_imm(&self, imm: i16, min: i32, max: i32) -> PResult<u16> {
        let imm = imm as i32;
        if imm < min || imm > max {
            return Err(PlatformError::ImmOutOfRange {
                op: self.op,
                imm,
                min,
                max,
            });
        }
        Ok(imm as u16)
    }

    /// Generates the corresponding 16-bit machine word for this instruction.
    ///
    /// # Errors
    ///
    /// This function will return an error if the instruction's format is invalid for its opcode,
    /// or if an immediate doesn't fit its field.
    pub fn encode(&self) -> PResult<u16> {
        self.validate()?;
        let op = (self.op as u16) << 12;
        let reg = |r: Register, at: u16| (r as u16) << at;
        let aflag = if self.flags.contains(InstrFlags::ARITH) {
            1 << 4
        } else {
            0
        };
        let word = match self.format {
            InstrFormat::OpOnly => op,
            InstrFormat::Rrr(a, b, c) => op | reg(a, 9) | reg(b, 6) | aflag | c as u16,
            InstrFormat::Rri(a, b, imm) => {
                let low = if self.op.is_shift() {
                    self.check_imm(imm, 0, 15)? | aflag
                } else {
                    self.check_imm(imm, -16, 15)? & 0x1F
                };
                op | reg(a, 9) | reg(b, 6) | (1 << 5) | low
            }
            InstrFormat::Ri(a, imm) => {
                let imm9 = if self.op == Opcode::Lbi {
                    let shift = if self.flags.contains(InstrFlags::SHIFT) {
                        1 << 8
                    } else {
                        0
                    };
                    shift | (self.check_imm(imm, -128, 255)? & 0xFF)
                } else {
                    self.check_imm(imm, -256, 255)? & 0x1FF
                };
                op | reg(a, 9) | imm9
            }
            InstrFormat::Ci(cond, imm) => {
                op | ((cond.bits() as u16) << 9) | (self.check_imm(imm, -256, 255)? & 0x1FF)
            }
            InstrFormat::Rro(a, b, imm) => {
                op | reg(a, 9) | reg(b, 6) | (self.check_imm(imm, -32, 31)? & 0x3F)
            }
            InstrFormat::Ro(b, imm) => op | reg(b, 6) | (self.check_imm(imm, -32, 31)? & 0x3F),
        };
        debug_assert_eq!(word >> 12, self.op as u16);
        Ok(word)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.op)?;
        if self.flags.contains(InstrFlags::SHIFT) {
            write!(f, "\t-s")?;
        }
        if self.flags.contains(InstrFlags::ARITH) {
            write!(f, "\t-a")?;
        }
        match self.format {
            InstrFormat::OpOnly => {}
            InstrFormat::Rrr(a, b, c) => write!(f, "\t{a}\t{b}\t{c}")?,
            InstrFormat::Rri(a, b, imm) => write!(f, "\t{a}\t{b}\t{imm}")?,
            InstrFormat::Ri(a, imm) => write!(f, "\t{a}\t{imm}")?,
            InstrFormat::Ci(cond, imm) => write!(f, "\t-{cond}\t{imm}")?,
            InstrFormat::Rro(a, b, imm) => write!(f, "\t{a}\t{b}\t{imm}")?,
            InstrFormat::Ro(b, imm) => write!(f, "\t{b}\t{imm}")?,
        }
        if let Some(comment) = &self.comment {
            write!(f, "\t;{comment}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instruction_encode() {
        let instr = Instruction::rrr(Opcode::And, Register::R0, Register::R1, Register::R2);
        assert_eq!(instr.encode().unwrap(), 0xF042);
    }

    #[test]
    fn test_immediate_forms() {
        let add = Instruction::rri(Opcode::Add, Register::SP, Register::SP, -2);
        assert_eq!(add.encode().unwrap(), 0x8000 | 4 << 9 | 4 << 6 | 1 << 5 | 0x1E);

        let lbi = Instruction::lbi(Register::RA, 0x34, true);
        assert_eq!(lbi.encode().unwrap(), 0xA000 | 7 << 9 | 1 << 8 | 0x34);

        let ldr = Instruction::rro(Opcode::Ldr, Register::R1, Register::FP, -4);
        assert_eq!(ldr.encode().unwrap(), 0x4000 | 1 << 9 | 5 << 6 | 0x3C);

        let brc = Instruction::brc(Cond::N | Cond::P, 6);
        assert_eq!(brc.encode().unwrap(), 0x3000 | 0b101 << 9 | 6);

        assert_eq!(Instruction::op_only(Opcode::Hlt).encode().unwrap(), 0x0000);
    }

    #[test]
    fn test_arith_shift() {
        let shr = Instruction::rri(Opcode::Shr, Register::AC, Register::R0, 3)
            .with_flags(InstrFlags::ARITH);
        assert_eq!(shr.encode().unwrap(), 0xD000 | 6 << 9 | 1 << 5 | 1 << 4 | 3);
    }

    #[test]
    fn test_invalid_instructions() {
        let bad = Instruction::new(Opcode::Add, InstrFormat::OpOnly);
        assert_eq!(bad.encode(), Err(PlatformError::InvalidInstruction(Opcode::Add)));

        let wide = Instruction::rri(Opcode::Add, Register::R0, Register::R0, 16);
        assert!(matches!(
            wide.encode(),
            Err(PlatformError::ImmOutOfRange { imm: 16, .. })
        ));
    }

    #[test]
    fn test_display() {
        let instr = Instruction::lbi(Register::R2, -5, false).with_comment("-5 -> r2");
        assert_eq!(instr.to_string(), "LBI\t$2\t-5\t;-5 -> r2");
        assert_eq!(Instruction::brc(Cond::Z, 2).to_string(), "BRC\t-z\t2");
    }
}
