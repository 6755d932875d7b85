use anyhow::Result;

use crate::{
    c::{
        ast::{NodeId, NodeKind, NodeTag},
        sema::types::VarType,
    },
    diag::CompError,
    plat::{Cond, InstrFlags, Instruction, Opcode, Register},
};

use super::{
    mem::{add_imm, GenValue},
    Codegen,
};

/// The flags that hold after `SUB $ac lhs rhs` when the comparison is true.
fn comparison_cond(tag: NodeTag) -> Option<Cond> {
    Some(match tag {
        NodeTag::Eq => Cond::Z,
        NodeTag::Neq => Cond::N | Cond::P,
        NodeTag::Lt => Cond::N,
        NodeTag::Leq => Cond::N | Cond::Z,
        NodeTag::Grt => Cond::P,
        NodeTag::Geq => Cond::Z | Cond::P,
        _ => return None,
    })
}

fn alu_opcode(tag: NodeTag) -> Option<Opcode> {
    Some(match tag {
        NodeTag::Plus => Opcode::Add,
        NodeTag::Minus => Opcode::Sub,
        NodeTag::And => Opcode::And,
        NodeTag::Xor => Opcode::Xor,
        NodeTag::Or => Opcode::Orr,
        NodeTag::LShift => Opcode::Shl,
        NodeTag::RShift => Opcode::Shr,
        _ => return None,
    })
}

impl<'a> Codegen<'a> {
    /// Generates the code computing `id`, returning where its value can be found.
    ///
    /// Only operators and calls emit code here. Literals and variables are loaded lazily by
    /// whoever consumes them.
    pub(super) fn gen_expr(&mut self, id: NodeId) -> Result<GenValue> {
        let ast = self.ast;
        let node = &ast[id];
        if let Some(v) = node.const_val {
            return Ok(GenValue::Literal(v as u16 as i16));
        }
        match &node.kind {
            NodeKind::Id { .. } => Ok(GenValue::Symbol(self.sym_of(id)?)),
            NodeKind::Call { callee, args } => self.gen_call_expr(*callee, args),
            NodeKind::Expr { lhs: None, rhs } => self.gen_unary(id, *rhs),
            NodeKind::Expr {
                lhs: Some(lhs),
                rhs,
            } => self.gen_binary(id, *lhs, *rhs),
            _ => Err(CompError::internal(format!(
                "cannot generate {:?} as an expression",
                node.tag
            ))
            .into()),
        }
    }

    /// Leaves `$ac = 1` when the flags match `cond`, else `$ac = 0`.
    fn gen_flag_to_bool(&mut self, cond: Cond) {
        self.asm.gen_instr(Instruction::lbi(Register::AC, 1, false));
        self.asm.gen_instr(Instruction::brc(cond, 2));
        self.asm.gen_instr(Instruction::lbi(Register::AC, 0, false));
    }

    fn gen_unary(&mut self, id: NodeId, rhs: NodeId) -> Result<GenValue> {
        let key = self.gen_expr(rhs)?;
        let reg = self.cache.load(key, &self.sess.symbols, &mut self.asm)?;
        self.cache.claim_accum(&self.sess.symbols, &mut self.asm)?;
        match self.ast[id].tag {
            NodeTag::LNot => {
                self.asm
                    .gen_instr(Instruction::rri(Opcode::Xor, Register::AC, reg, -1));
            }
            NodeTag::Minus => {
                self.asm
                    .gen_instr(Instruction::rri(Opcode::Xor, Register::AC, reg, -1));
                self.asm
                    .gen_instr(Instruction::rri(Opcode::Add, Register::AC, Register::AC, 1));
            }
            NodeTag::BNot => {
                self.asm
                    .gen_instr(Instruction::rri(Opcode::Orr, Register::AC, reg, 0));
                self.gen_flag_to_bool(Cond::Z);
            }
            tag => {
                return Err(CompError::internal(format!("{tag:?} is not a unary operator")).into())
            }
        }
        self.cache.update_reg(Register::AC, GenValue::Intermediate);
        Ok(GenValue::Intermediate)
    }

    fn gen_binary(&mut self, id: NodeId, lhs: NodeId, rhs: NodeId) -> Result<GenValue> {
        let tag = self.ast[id].tag;
        let lkey = self.gen_expr(lhs)?;
        let rkey = self.gen_expr(rhs)?;
        // the right result is the most recent, so it has to come off first
        let rreg = self.cache.load(rkey, &self.sess.symbols, &mut self.asm)?;
        let lreg = self.cache.load(lkey, &self.sess.symbols, &mut self.asm)?;
        self.cache.claim_accum(&self.sess.symbols, &mut self.asm)?;

        if let Some(cond) = comparison_cond(tag) {
            if matches!(tag, NodeTag::Eq | NodeTag::Neq) {
                self.asm
                    .gen_instr(Instruction::rrr(Opcode::Sub, Register::AC, lreg, rreg));
            } else {
                let unsigned = self.ast[id].ty.is_some_and(|ty| ty.is_unsigned());
                self.gen_ordering_flags(lreg, rreg, unsigned);
            }
            self.gen_flag_to_bool(cond);
        } else {
            let op = alu_opcode(tag).ok_or_else(|| {
                CompError::internal(format!("{tag:?} is not a binary operator"))
            })?;
            let mut instr = Instruction::rrr(op, Register::AC, lreg, rreg);
            if op == Opcode::Shr && self.is_arith_shift(lhs) {
                instr = instr.with_flags(InstrFlags::ARITH);
            }
            self.asm.gen_instr(instr);
        }
        self.cache.update_reg(Register::AC, GenValue::Intermediate);
        Ok(GenValue::Intermediate)
    }

    /// Sets the flags as the sign of `lhs - rhs` would be without overflow.
    ///
    /// The difference only decides when both sign bits agree. Otherwise the operand with the set
    /// sign bit is the smaller one if signed and the larger one if unsigned, so the flags come
    /// from `lhs | 1` or `rhs | 1`, which is never zero.
    fn gen_ordering_flags(&mut self, lhs: Register, rhs: Register, unsigned: bool) {
        let decider = if unsigned { rhs } else { lhs };
        self.asm.gen_instr(
            Instruction::rrr(Opcode::Xor, Register::RA, lhs, rhs).with_comment("sign bits differ?"),
        );
        self.asm.gen_instr(Instruction::brc(Cond::N, 4));
        self.asm
            .gen_instr(Instruction::rrr(Opcode::Sub, Register::AC, lhs, rhs));
        self.asm
            .gen_instr(Instruction::brc(Cond::N | Cond::Z | Cond::P, 2));
        self.asm
            .gen_instr(Instruction::rri(Opcode::Orr, Register::AC, decider, 1));
    }

    fn is_arith_shift(&self, lhs: NodeId) -> bool {
        let node = &self.ast[lhs];
        match node.ty {
            Some(VarType::Int | VarType::Char) => true,
            Some(VarType::Literal) => node.const_val.is_some_and(|v| v <= 0x7FFF),
            _ => false,
        }
    }

    fn gen_call_expr(&mut self, callee: NodeId, args: &[NodeId]) -> Result<GenValue> {
        let NodeKind::Id { name, .. } = &self.ast[callee].kind else {
            return Err(CompError::internal("callee is not an identifier").into());
        };
        let name = name.clone();
        let area = i16::try_from(2 * args.len())
            .map_err(|_| CompError::internal(format!("too many arguments to \"{name}\"")))?;

        self.cache.claim_accum(&self.sess.symbols, &mut self.asm)?;
        if area > 0 {
            add_imm(&mut self.asm, Register::SP, -area);
        }
        for (i, &arg) in args.iter().enumerate() {
            let key = self.gen_expr(arg)?;
            let reg = self.cache.load(key, &self.sess.symbols, &mut self.asm)?;
            self.cache.push_arg(reg, 2 * i as i16, &mut self.asm);
        }
        self.asm.gen_call(&name);
        if area > 0 {
            add_imm(&mut self.asm, Register::SP, area);
        }

        self.cache.clear_loads();
        self.cache.clear_accum();
        self.cache.update_reg(Register::AC, GenValue::Intermediate);
        Ok(GenValue::Intermediate)
    }
}
