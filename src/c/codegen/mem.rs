//! The register cache, tracking which value each register currently holds.

use anyhow::Result;

use crate::{
    asm::AsmMaker,
    c::sema::symbol::{Location, SymbolId, SymbolTable},
    diag::CompError,
    plat::{Instruction, Opcode, Register},
};

/// Something code generation can ask to have in a register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenValue {
    Literal(i16),
    Symbol(SymbolId),
    /// An unnamed expression result. Lives in `$ac`, or on the stack once spilled.
    Intermediate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Empty,
    Reserved,
    Holds(GenValue),
}

/// Loads `value` into `reg` with one or two `LBI`s.
pub fn load_lit(asm: &mut AsmMaker, reg: Register, value: i16) {
    let comment = format!("{value} -> r{}", reg as u8);
    if i8::try_from(value).is_ok() {
        asm.gen_instr(Instruction::lbi(reg, value, false).with_comment(comment));
    } else {
        let hi = (value >> 8) as i8 as i16;
        let lo = (value as u16 & 0xFF) as i16;
        asm.gen_instr(Instruction::lbi(reg, hi, false).with_comment(comment));
        asm.gen_instr(Instruction::lbi(reg, lo, true));
    }
}

/// `reg += imm`, going through `$ra` when `imm` does not fit an imm5.
pub fn add_imm(asm: &mut AsmMaker, reg: Register, imm: i16) {
    if (-16..=15).contains(&imm) {
        asm.gen_instr(Instruction::rri(Opcode::Add, reg, reg, imm));
    } else {
        load_lit(asm, Register::RA, imm);
        asm.gen_instr(Instruction::rrr(Opcode::Add, reg, reg, Register::RA));
    }
}

/// A load or store of `reg` at `base + off`.
fn frame_access(
    asm: &mut AsmMaker,
    op: Opcode,
    reg: Register,
    base: Register,
    off: i16,
    comment: &str,
) {
    if (-32..=30).contains(&off) {
        asm.gen_instr(Instruction::rro(op, reg, base, off).with_comment(comment));
    } else {
        load_lit(asm, Register::RA, off);
        asm.gen_instr(Instruction::rrr(Opcode::Add, Register::RA, Register::RA, base));
        asm.gen_instr(Instruction::rro(op, reg, Register::RA, 0).with_comment(comment));
    }
}

/// Caches values in registers, evicting the least recently used load register on a miss.
///
/// `$sp`, `$fp` and `$ra` are never cached. `$ac` is cached but never evicted: it only changes
/// hands through [RegCache::update_reg].
#[derive(Debug)]
pub struct RegCache {
    slots: [Slot; 8],
    /// Recency rank per load register. 0 is evicted next, 3 was used last.
    uses: [u8; 4],
}

impl Default for RegCache {
    fn default() -> Self {
        let mut slots = [Slot::Empty; 8];
        for reg in [Register::SP, Register::FP, Register::RA] {
            slots[reg as usize] = Slot::Reserved;
        }
        Self {
            slots,
            uses: [0, 1, 2, 3],
        }
    }
}

impl RegCache {
    /// The register holding `key`, if any. Never emits code.
    pub fn find(&self, key: GenValue) -> Option<Register> {
        if key == GenValue::Intermediate {
            return (self.slots[Register::AC as usize] == Slot::Holds(key)).then_some(Register::AC);
        }
        Register::LOADS
            .into_iter()
            .chain([Register::AC])
            .find(|&r| self.slots[r as usize] == Slot::Holds(key))
    }

    fn used_reg(&mut self, reg: Register) {
        if !reg.is_load() {
            return;
        }
        let old = self.uses[reg as usize];
        for rank in self.uses.iter_mut() {
            if *rank > old {
                *rank -= 1;
            }
        }
        self.uses[reg as usize] = 3;
    }

    fn victim(&self) -> Result<Register, CompError> {
        self.uses
            .iter()
            .position(|&rank| rank == 0)
            .map(|i| Register::LOADS[i])
            .ok_or_else(|| CompError::internal(format!("no register to evict, ranks {:?}", self.uses)))
    }

    /// Brings `key` into a register and returns it.
    ///
    /// Loading an [GenValue::Intermediate] consumes it.
    pub fn load(&mut self, key: GenValue, syms: &SymbolTable, asm: &mut AsmMaker) -> Result<Register> {
        if let Some(reg) = self.find(key) {
            if key == GenValue::Intermediate {
                self.slots[reg as usize] = Slot::Empty;
            }
            self.used_reg(reg);
            return Ok(reg);
        }

        let reg = self.victim()?;
        let mut slot = Slot::Holds(key);
        match key {
            GenValue::Literal(v) => load_lit(asm, reg, v),
            GenValue::Intermediate => {
                asm.gen_instr(Instruction::rro(Opcode::Ldr, reg, Register::SP, 0).with_comment("pop"));
                add_imm(asm, Register::SP, 2);
                slot = Slot::Empty;
            }
            GenValue::Symbol(id) => {
                let sym = syms.get(id);
                match sym.location {
                    Some(Location::Absolute(addr)) => {
                        load_lit(asm, Register::RA, addr as i16);
                        asm.gen_instr(
                            Instruction::rro(Opcode::Ldr, reg, Register::RA, 0).with_comment(&sym.name),
                        );
                    }
                    Some(Location::Frame(off)) => match sym.const_val {
                        Some(v) if i8::try_from(v).is_ok() => {
                            log::info!("OPT- replacing load of \"{}\" with {v}", sym.name);
                            load_lit(asm, reg, v);
                        }
                        _ => frame_access(asm, Opcode::Ldr, reg, Register::FP, off, &sym.name),
                    },
                    None => {
                        return Err(
                            CompError::internal(format!("\"{}\" has no storage", sym.name)).into(),
                        )
                    }
                }
            }
        }
        self.slots[reg as usize] = slot;
        self.used_reg(reg);
        Ok(reg)
    }

    /// Writes `reg` to the home of `key`. An intermediate is pushed onto the stack.
    ///
    /// After storing a symbol, `reg` is its only cached copy.
    pub fn store(
        &mut self,
        reg: Register,
        key: GenValue,
        syms: &SymbolTable,
        asm: &mut AsmMaker,
    ) -> Result<()> {
        match key {
            GenValue::Intermediate => {
                add_imm(asm, Register::SP, -2);
                asm.gen_instr(Instruction::rro(Opcode::Str, reg, Register::SP, 0).with_comment("push"));
            }
            GenValue::Symbol(id) => {
                let sym = syms.get(id);
                match sym.location {
                    Some(Location::Absolute(addr)) => {
                        load_lit(asm, Register::RA, addr as i16);
                        asm.gen_instr(
                            Instruction::rro(Opcode::Str, reg, Register::RA, 0).with_comment(&sym.name),
                        );
                    }
                    Some(Location::Frame(off)) => {
                        frame_access(asm, Opcode::Str, reg, Register::FP, off, &sym.name)
                    }
                    None => {
                        return Err(
                            CompError::internal(format!("\"{}\" has no storage", sym.name)).into(),
                        )
                    }
                }
                self.update_reg(reg, key);
            }
            GenValue::Literal(v) => {
                return Err(CompError::internal(format!("store to literal {v}")).into())
            }
        }
        self.used_reg(reg);
        Ok(())
    }

    /// Stores an outgoing call argument at `$sp + offset`.
    pub fn push_arg(&mut self, reg: Register, offset: i16, asm: &mut AsmMaker) {
        frame_access(asm, Opcode::Str, reg, Register::SP, offset, "arg");
    }

    /// Records that `reg` now holds `key`, dropping stale copies of the same symbol.
    pub fn update_reg(&mut self, reg: Register, key: GenValue) {
        if matches!(key, GenValue::Symbol(_)) {
            for slot in self.slots.iter_mut() {
                if *slot == Slot::Holds(key) {
                    *slot = Slot::Empty;
                }
            }
        }
        self.slots[reg as usize] = Slot::Holds(key);
        self.used_reg(reg);
    }

    /// Frees `$ac` for a new result, spilling a live intermediate first.
    pub fn claim_accum(&mut self, syms: &SymbolTable, asm: &mut AsmMaker) -> Result<()> {
        if self.find(GenValue::Intermediate).is_some() {
            self.store(Register::AC, GenValue::Intermediate, syms, asm)?;
        }
        self.clear_accum();
        Ok(())
    }

    pub fn clear_loads(&mut self) {
        for reg in Register::LOADS {
            self.slots[reg as usize] = Slot::Empty;
        }
    }

    pub fn clear_accum(&mut self) {
        self.slots[Register::AC as usize] = Slot::Empty;
    }

    pub fn clear(&mut self) {
        self.clear_loads();
        self.clear_accum();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        asm::Entry,
        c::sema::{symbol::SymKind, types::VarType},
        plat::InstrFormat,
    };

    fn instrs(asm: &AsmMaker) -> Vec<(Opcode, InstrFormat)> {
        asm.entries()
            .iter()
            .filter_map(|e| match e {
                Entry::Real(i) => Some((i.op, i.format)),
                _ => None,
            })
            .collect()
    }

    fn var(syms: &mut SymbolTable, name: &str, loc: Location) -> SymbolId {
        let id = syms.add_sym(name, None, VarType::Int, SymKind::Var).unwrap();
        syms.get_mut(id).location = Some(loc);
        id
    }

    #[test]
    fn test_literal_hit_emits_nothing() {
        let syms = SymbolTable::default();
        let mut asm = AsmMaker::default();
        let mut cache = RegCache::default();

        let r = cache.load(GenValue::Literal(-5), &syms, &mut asm).unwrap();
        assert_eq!(r, Register::R0);
        assert_eq!(instrs(&asm), vec![(Opcode::Lbi, InstrFormat::Ri(Register::R0, -5))]);

        assert_eq!(cache.load(GenValue::Literal(-5), &syms, &mut asm).unwrap(), r);
        assert_eq!(asm.num_instrs(), 1);
    }

    #[test]
    fn test_wide_literal_takes_two_loads() {
        let syms = SymbolTable::default();
        let mut asm = AsmMaker::default();
        let mut cache = RegCache::default();
        cache.load(GenValue::Literal(0x1234), &syms, &mut asm).unwrap();
        cache.load(GenValue::Literal(-300), &syms, &mut asm).unwrap();
        assert_eq!(
            instrs(&asm),
            vec![
                (Opcode::Lbi, InstrFormat::Ri(Register::R0, 0x12)),
                (Opcode::Lbi, InstrFormat::Ri(Register::R0, 0x34)),
                (Opcode::Lbi, InstrFormat::Ri(Register::R1, -2)),
                (Opcode::Lbi, InstrFormat::Ri(Register::R1, 0xD4)),
            ]
        );
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let syms = SymbolTable::default();
        let mut asm = AsmMaker::default();
        let mut cache = RegCache::default();
        for v in 1..=4 {
            cache.load(GenValue::Literal(v), &syms, &mut asm).unwrap();
        }
        // touch 1 so that 2 becomes the oldest
        assert_eq!(cache.load(GenValue::Literal(1), &syms, &mut asm).unwrap(), Register::R0);

        let r = cache.load(GenValue::Literal(5), &syms, &mut asm).unwrap();
        assert_eq!(r, Register::R1);
        assert_eq!(cache.find(GenValue::Literal(2)), None);
        assert_eq!(cache.find(GenValue::Literal(1)), Some(Register::R0));
        assert_eq!(cache.find(GenValue::Literal(4)), Some(Register::R3));

        let mut ranks = cache.uses;
        ranks.sort_unstable();
        assert_eq!(ranks, [0, 1, 2, 3]);
    }

    #[test]
    fn test_symbol_is_cached_once() {
        let mut syms = SymbolTable::default();
        let x = var(&mut syms, "x", Location::Frame(-2));
        let mut asm = AsmMaker::default();
        let mut cache = RegCache::default();

        let r = cache.load(GenValue::Symbol(x), &syms, &mut asm).unwrap();
        assert_eq!(r, Register::R0);
        cache.update_reg(Register::AC, GenValue::Symbol(x));
        assert_eq!(cache.find(GenValue::Symbol(x)), Some(Register::AC));
        assert_eq!(cache.slots[Register::R0 as usize], Slot::Empty);

        cache.update_reg(Register::R2, GenValue::Symbol(x));
        assert_eq!(cache.find(GenValue::Symbol(x)), Some(Register::R2));
        assert_eq!(cache.slots[Register::AC as usize], Slot::Empty);
        assert_eq!(
            instrs(&asm),
            vec![(Opcode::Ldr, InstrFormat::Rro(Register::R0, Register::FP, -2))]
        );
    }

    #[test]
    fn test_intermediate_is_consumed() {
        let syms = SymbolTable::default();
        let mut asm = AsmMaker::default();
        let mut cache = RegCache::default();

        cache.update_reg(Register::AC, GenValue::Intermediate);
        assert_eq!(cache.load(GenValue::Intermediate, &syms, &mut asm).unwrap(), Register::AC);
        assert_eq!(cache.find(GenValue::Intermediate), None);
        assert_eq!(asm.num_instrs(), 0);

        // a second load pops the spilled copy
        let r = cache.load(GenValue::Intermediate, &syms, &mut asm).unwrap();
        assert_eq!(
            instrs(&asm),
            vec![
                (Opcode::Ldr, InstrFormat::Rro(r, Register::SP, 0)),
                (Opcode::Add, InstrFormat::Rri(Register::SP, Register::SP, 2)),
            ]
        );
    }

    #[test]
    fn test_claim_accum_spills_live_result() {
        let syms = SymbolTable::default();
        let mut asm = AsmMaker::default();
        let mut cache = RegCache::default();

        cache.claim_accum(&syms, &mut asm).unwrap();
        assert_eq!(asm.num_instrs(), 0);

        cache.update_reg(Register::AC, GenValue::Intermediate);
        cache.claim_accum(&syms, &mut asm).unwrap();
        assert_eq!(
            instrs(&asm),
            vec![
                (Opcode::Add, InstrFormat::Rri(Register::SP, Register::SP, -2)),
                (Opcode::Str, InstrFormat::Rro(Register::AC, Register::SP, 0)),
            ]
        );
        assert_eq!(cache.find(GenValue::Intermediate), None);
    }

    #[test]
    fn test_symbol_addressing_modes() {
        let mut syms = SymbolTable::default();
        let g = var(&mut syms, "g", Location::Absolute(6));
        let far = var(&mut syms, "far", Location::Frame(-40));
        let k = var(&mut syms, "k", Location::Frame(-4));
        syms.get_mut(k).const_val = Some(7);
        let mut asm = AsmMaker::default();
        let mut cache = RegCache::default();

        cache.load(GenValue::Symbol(g), &syms, &mut asm).unwrap();
        cache.load(GenValue::Symbol(far), &syms, &mut asm).unwrap();
        cache.load(GenValue::Symbol(k), &syms, &mut asm).unwrap();
        cache.store(Register::R0, GenValue::Symbol(k), &syms, &mut asm).unwrap();
        assert_eq!(
            instrs(&asm),
            vec![
                (Opcode::Lbi, InstrFormat::Ri(Register::RA, 6)),
                (Opcode::Ldr, InstrFormat::Rro(Register::R0, Register::RA, 0)),
                (Opcode::Lbi, InstrFormat::Ri(Register::RA, -40)),
                (Opcode::Add, InstrFormat::Rrr(Register::RA, Register::RA, Register::FP)),
                (Opcode::Ldr, InstrFormat::Rro(Register::R1, Register::RA, 0)),
                (Opcode::Lbi, InstrFormat::Ri(Register::R2, 7)),
                (Opcode::Str, InstrFormat::Rro(Register::R0, Register::FP, -4)),
            ]
        );
    }

    #[test]
    fn test_store_replaces_stale_copies() {
        let mut syms = SymbolTable::default();
        let x = var(&mut syms, "x", Location::Frame(-2));
        let mut asm = AsmMaker::default();
        let mut cache = RegCache::default();

        assert_eq!(cache.load(GenValue::Symbol(x), &syms, &mut asm).unwrap(), Register::R0);
        cache.store(Register::AC, GenValue::Symbol(x), &syms, &mut asm).unwrap();
        assert_eq!(cache.slots[Register::R0 as usize], Slot::Empty);

        let before = asm.num_instrs();
        assert_eq!(cache.load(GenValue::Symbol(x), &syms, &mut asm).unwrap(), Register::AC);
        assert_eq!(asm.num_instrs(), before);
    }

    #[test]
    fn test_store_to_literal_is_internal_error() {
        let syms = SymbolTable::default();
        let mut asm = AsmMaker::default();
        let mut cache = RegCache::default();
        let err = cache
            .store(Register::R0, GenValue::Literal(1), &syms, &mut asm)
            .unwrap_err();
        assert!(err.to_string().starts_with("internal error:"));
    }
}
