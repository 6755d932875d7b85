//! The instruction assembler module for RISCII.
//!
//! Code generation appends [Entry] items to an [AsmMaker](assembler::AsmMaker). Once the stream is
//! complete it is resolved and encoded in two passes, then rendered by [listing].

use thiserror::Error;

use crate::plat::{Instruction, PlatformError};

pub mod assembler;
pub mod listing;

pub use assembler::AsmMaker;

/// Prefix of a function's entry label.
pub const FUNC_PREFIX: &str = "f_";
/// Prefix of a function's return label.
pub const RET_PREFIX: &str = "ret_";

/// Size in bytes of one expanded call macro.
pub const MACRO_SIZE: u32 = 6;
/// Size in bytes of one real instruction.
pub const INSTR_SIZE: u32 = 2;

/// An error for the assembler module of RISCII.
#[derive(Debug, Error)]
pub enum AsmError {
    #[error("label {0} is defined twice")]
    DuplicateLabel(String),
    #[error("undefined label: {0}")]
    UndefinedLabel(String),
    #[error("program is {0} bytes, exceeding the 16-bit address space")]
    ProgramTooLarge(u32),
    #[error("cannot encode `{instr}`: {source}")]
    Encode {
        instr: String,
        source: PlatformError,
    },
}

/// One entry of the instruction stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    /// A machine instruction, encoded one-to-one.
    Real(Instruction),
    /// Marks the address of the entry that follows it.
    Label(String),
    /// A free-text listing comment.
    Comment(String),
    /// A blank listing line.
    Spacer,
    /// A call to a label, expanded into three real instructions when encoded.
    ///
    /// ```text
    /// LBI     $ra hi(label)
    /// LBI -s  $ra lo(label)
    /// JLR     $ra $ra 0
    /// ```
    CallMacro(String),
}

impl Entry {
    /// Number of bytes the entry occupies in the encoded program.
    pub fn size_in_bytes(&self) -> u32 {
        match self {
            Entry::Real(_) => INSTR_SIZE,
            Entry::CallMacro(_) => MACRO_SIZE,
            Entry::Label(_) | Entry::Comment(_) | Entry::Spacer => 0,
        }
    }
}
