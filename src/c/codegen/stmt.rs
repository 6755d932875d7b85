use anyhow::Result;

use crate::{
    asm::MACRO_SIZE,
    c::ast::{NodeId, NodeKind},
    diag::CompError,
    plat::{Cond, Instruction, Opcode, Register},
};

use super::{mem::GenValue, Codegen};

impl<'a> Codegen<'a> {
    /// The folded value of a condition, when constant branches may be folded.
    fn static_cond(&self, cond: NodeId) -> Option<i32> {
        if self.sess.opts.optimize {
            self.ast[cond].const_val
        } else {
            None
        }
    }

    /// Evaluates `cond` and jumps to `target` when it is zero.
    fn gen_branch_if_zero(&mut self, cond: NodeId, target: &str) -> Result<()> {
        let key = self.gen_expr(cond)?;
        let reg = self.cache.load(key, &self.sess.symbols, &mut self.asm)?;
        self.asm.gen_instr(Instruction::rri(Opcode::Orr, reg, reg, 0));
        self.asm
            .gen_instr(Instruction::brc(Cond::N | Cond::P, MACRO_SIZE as i16));
        self.asm.gen_to_label(target);
        Ok(())
    }

    fn gen_block(&mut self, body: &[NodeId]) -> Result<()> {
        for &stmt in body {
            self.gen_stmt(stmt)?;
        }
        Ok(())
    }

    pub(super) fn gen_stmt(&mut self, id: NodeId) -> Result<()> {
        let ast = self.ast;
        match &ast[id].kind {
            NodeKind::VarDecl { .. } => {}
            NodeKind::Assign { target, value } => {
                let key = self.gen_expr(*value)?;
                let reg = self.cache.load(key, &self.sess.symbols, &mut self.asm)?;
                let dest = GenValue::Symbol(self.sym_of(*target)?);
                self.cache.store(reg, dest, &self.sess.symbols, &mut self.asm)?;
            }
            NodeKind::Return { value } => {
                let key = self.gen_expr(*value)?;
                let reg = self.cache.load(key, &self.sess.symbols, &mut self.asm)?;
                if reg != Register::AC {
                    self.asm
                        .gen_instr(Instruction::rri(Opcode::Add, Register::AC, reg, 0));
                }
                self.asm.gen_to_ret(&self.cur_func);
            }
            NodeKind::If { cond, body } => match self.static_cond(*cond) {
                Some(0) => self.sess.diag.info(ast[id].line, "OPT- dropping if with a zero condition"),
                Some(_) => self.gen_block(body)?,
                None => {
                    let end = self.asm.new_label()?;
                    self.gen_branch_if_zero(*cond, &end)?;
                    self.gen_block(body)?;
                    self.asm.add_label(end);
                    self.cache.clear();
                }
            },
            NodeKind::While { cond, body } => {
                let constant = self.static_cond(*cond);
                if constant == Some(0) {
                    self.sess
                        .diag
                        .info(ast[id].line, "OPT- dropping while with a zero condition");
                    return Ok(());
                }
                let top = self.asm.new_label()?;
                let end = self.asm.new_label()?;
                self.asm.add_label(top.clone());
                self.cache.clear();
                if constant.is_none() {
                    self.gen_branch_if_zero(*cond, &end)?;
                }
                self.gen_block(body)?;
                self.asm.gen_to_label(top);
                self.asm.add_label(end);
                self.cache.clear();
            }
            NodeKind::Call { .. } => {
                self.gen_expr(id)?;
                self.cache.clear_accum();
            }
            _ => {
                return Err(CompError::internal(format!(
                    "cannot generate {:?} as a statement",
                    ast[id].tag
                ))
                .into())
            }
        }
        Ok(())
    }
}
