use anyhow::{Error, Result};
use rustc_hash::FxHashMap;

use crate::{
    diag::CompError,
    plat::{Instruction, Opcode, Register},
};

use super::{AsmError, Entry, FUNC_PREFIX, RET_PREFIX};

/// The append-only instruction stream of one program.
#[derive(Debug, Default)]
pub struct AsmMaker {
    entries: Vec<Entry>,
    label_cnt: u16,
    num_instrs: usize,
    num_macros: usize,
}

impl AsmMaker {
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn num_instrs(&self) -> usize {
        self.num_instrs
    }

    pub fn num_macros(&self) -> usize {
        self.num_macros
    }

    pub fn gen_instr(&mut self, instr: Instruction) {
        log::trace!("{instr}");
        self.entries.push(Entry::Real(instr));
        self.num_instrs += 1;
    }

    pub fn add_spacer(&mut self) {
        self.entries.push(Entry::Spacer);
    }

    pub fn add_comment(&mut self, text: impl Into<String>) {
        self.entries.push(Entry::Comment(text.into()));
    }

    pub fn add_label(&mut self, label: impl Into<String>) {
        self.entries.push(Entry::Label(label.into()));
    }

    /// Jumps to `label`, clobbering `$ra`.
    pub fn gen_to_label(&mut self, label: impl Into<String>) {
        self.entries.push(Entry::CallMacro(label.into()));
        self.num_macros += 1;
    }

    /// Calls function `func`, leaving the return address in `$ra`.
    pub fn gen_call(&mut self, func: &str) {
        self.gen_to_label(format!("{FUNC_PREFIX}{func}"));
    }

    /// Jumps to the epilogue of function `func`.
    pub fn gen_to_ret(&mut self, func: &str) {
        self.gen_to_label(format!("{RET_PREFIX}{func}"));
    }

    /// Produces a fresh label name, unique for this stream.
    ///
    /// # Errors
    ///
    /// Fails with an internal error once the label counter is exhausted.
    pub fn new_label(&mut self) -> Result<String, CompError> {
        let label = format!("L{}", self.label_cnt);
        self.label_cnt = self
            .label_cnt
            .checked_add(1)
            .ok_or_else(|| CompError::internal("label counter exhausted"))?;
        Ok(label)
    }

    /// Address pass: maps each label to the byte address of the entry following it.
    pub fn resolve(&self) -> Result<FxHashMap<String, u16>> {
        let mut labels = FxHashMap::default();
        let mut addr = 0u32;
        for entry in self.entries.iter() {
            if let Entry::Label(name) = entry {
                if addr > u16::MAX as u32 {
                    return Err(Error::from(AsmError::ProgramTooLarge(addr)));
                }
                if labels.insert(name.clone(), addr as u16).is_some() {
                    return Err(Error::from(AsmError::DuplicateLabel(name.clone())));
                }
            }
            addr += entry.size_in_bytes();
        }
        if addr > u16::MAX as u32 + 1 {
            return Err(Error::from(AsmError::ProgramTooLarge(addr)));
        }
        Ok(labels)
    }

    /// Encode pass: expands macros and packs every real instruction into its machine word.
    pub fn assemble(&self) -> Result<Vec<u16>> {
        let labels = self.resolve()?;
        let mut words = Vec::with_capacity(self.num_instrs + 3 * self.num_macros);
        let mut push = |instr: &Instruction| -> Result<()> {
            let word = instr.encode().map_err(|source| AsmError::Encode {
                instr: instr.to_string(),
                source,
            })?;
            words.push(word);
            Ok(())
        };
        for entry in self.entries.iter() {
            match entry {
                Entry::Real(instr) => push(instr)?,
                Entry::CallMacro(target) => {
                    let addr = *labels
                        .get(target)
                        .ok_or_else(|| AsmError::UndefinedLabel(target.clone()))?;
                    for instr in expand_macro(addr) {
                        push(&instr)?;
                    }
                }
                Entry::Label(_) | Entry::Comment(_) | Entry::Spacer => {}
            }
        }
        Ok(words)
    }
}

/// The three real instructions a call macro to `addr` stands for.
pub fn expand_macro(addr: u16) -> [Instruction; 3] {
    [
        Instruction::lbi(Register::RA, ((addr >> 8) & 0xFF) as i16, false),
        Instruction::lbi(Register::RA, (addr & 0xFF) as i16, true),
        Instruction::rro(Opcode::Jlr, Register::RA, Register::RA, 0),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nop() -> Instruction {
        Instruction::op_only(Opcode::Nop)
    }

    #[test]
    fn test_macro_resolves_to_label_position() {
        let mut asm = AsmMaker::default();
        asm.add_label("L");
        asm.gen_to_label("L");
        for _ in 0..10 {
            asm.gen_instr(nop());
        }
        asm.gen_to_label("L");

        let labels = asm.resolve().unwrap();
        assert_eq!(labels["L"], 0);

        let words = asm.assemble().unwrap();
        assert_eq!(words.len(), 3 + 10 + 3);
        let call: [u16; 3] = [0xAE00, 0xAF00, 0x6000 | 7 << 9 | 7 << 6];
        assert_eq!(&words[0..3], &call);
        assert_eq!(&words[13..16], &call);
    }

    #[test]
    fn test_addresses_skip_pseudo_entries() {
        let mut asm = AsmMaker::default();
        asm.add_comment("startup");
        asm.gen_call("main");
        asm.gen_instr(Instruction::op_only(Opcode::Hlt));
        asm.add_spacer();
        asm.add_label("f_main");
        asm.gen_instr(nop());
        asm.gen_to_ret("main");
        asm.add_label("ret_main");
        asm.gen_instr(Instruction::jpr(Register::RA, 0));

        let labels = asm.resolve().unwrap();
        assert_eq!(labels["f_main"], 8);
        assert_eq!(labels["ret_main"], 16);
        assert_eq!(asm.num_instrs(), 3);
        assert_eq!(asm.num_macros(), 2);
    }

    #[test]
    fn test_label_errors() {
        let mut asm = AsmMaker::default();
        asm.gen_to_label("nowhere");
        let err = asm.assemble().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AsmError>(),
            Some(AsmError::UndefinedLabel(_))
        ));

        let mut asm = AsmMaker::default();
        asm.add_label("L0");
        asm.add_label("L0");
        assert!(asm.resolve().is_err());
    }

    #[test]
    fn test_new_label() {
        let mut asm = AsmMaker::default();
        assert_eq!(asm.new_label().unwrap(), "L0");
        assert_eq!(asm.new_label().unwrap(), "L1");

        asm.label_cnt = u16::MAX;
        assert!(matches!(asm.new_label(), Err(CompError::Internal(_))));
    }
}
