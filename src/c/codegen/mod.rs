//! Code generation from a checked tree into an [AsmMaker] stream.
//!
//! Every function gets the frame
//!
//! ```text
//! FP + 4 + 2i  argument i
//! FP + 2       saved $ra
//! FP           saved $fp
//! FP - 2 - 2k  local k
//! ```
//!
//! and returns its value in `$ac`. Globals sit at fixed addresses from 0 upwards, while the
//! stack grows down from the top of memory.

use anyhow::{Context, Result};

use crate::{
    asm::{AsmMaker, FUNC_PREFIX, RET_PREFIX},
    diag::CompError,
    plat::{Instruction, Opcode, Register},
};

use self::mem::{add_imm, RegCache};

use super::{
    ast::{Ast, NodeId, NodeKind},
    sema::symbol::{Location, SymbolId},
    Session,
};

mod expr;
pub mod mem;
mod stmt;

pub struct Codegen<'a> {
    ast: &'a Ast,
    sess: &'a mut Session,
    asm: AsmMaker,
    cache: RegCache,
    /// Name of the function being generated, for `return`.
    cur_func: String,
}

impl<'a> Codegen<'a> {
    pub fn new(ast: &'a Ast, sess: &'a mut Session) -> Self {
        Self {
            ast,
            sess,
            asm: AsmMaker::default(),
            cache: RegCache::default(),
            cur_func: String::new(),
        }
    }

    pub fn finish(self) -> AsmMaker {
        self.asm
    }

    fn sym_of(&self, id: NodeId) -> Result<SymbolId, CompError> {
        self.ast[id]
            .sym()
            .ok_or_else(|| CompError::internal(format!("{:?} node has no symbol", self.ast[id].tag)))
    }

    fn place(&mut self, id: NodeId, loc: Location) -> Result<(), CompError> {
        let sym = self.sym_of(id)?;
        self.sess.symbols.get_mut(sym).location = Some(loc);
        Ok(())
    }

    pub fn gen_program(&mut self) -> Result<()> {
        let ast = self.ast;
        let Some(root) = ast.root() else {
            return Ok(());
        };
        let NodeKind::Program { decls } = &ast[root].kind else {
            return Err(CompError::internal("tree root is not a program").into());
        };

        let mut addr = 0u16;
        for &decl in decls {
            if let NodeKind::VarDecl { .. } = ast[decl].kind {
                self.place(decl, Location::Absolute(addr))?;
                addr = addr
                    .checked_add(2)
                    .ok_or_else(|| CompError::internal("globals exceed the address space"))?;
            }
        }
        log::debug!("{} bytes of globals", addr);

        self.asm.add_comment("startup");
        self.asm.gen_instr(Instruction::lbi(Register::SP, 0, false));
        self.asm
            .gen_instr(Instruction::rri(Opcode::Add, Register::FP, Register::SP, 0));
        self.asm.gen_call("main");
        self.asm.gen_instr(Instruction::op_only(Opcode::Hlt));

        for &decl in decls {
            if let NodeKind::FuncDef { name, .. } = &ast[decl].kind {
                self.gen_func(decl)
                    .with_context(|| format!("generating function \"{name}\""))?;
            }
        }
        Ok(())
    }

    /// Appends every local declared anywhere in `body`, in source order.
    fn collect_locals(&self, body: &[NodeId], out: &mut Vec<NodeId>) {
        for &stmt in body {
            match &self.ast[stmt].kind {
                NodeKind::VarDecl { .. } => out.push(stmt),
                NodeKind::If { body, .. } | NodeKind::While { body, .. } => {
                    self.collect_locals(body, out)
                }
                _ => {}
            }
        }
    }

    fn gen_func(&mut self, id: NodeId) -> Result<()> {
        let ast = self.ast;
        let NodeKind::FuncDef {
            name, params, body, ..
        } = &ast[id].kind
        else {
            return Err(CompError::internal("expected a function definition").into());
        };

        for (i, &param) in params.iter().enumerate() {
            let off = i16::try_from(4 + 2 * i)
                .map_err(|_| CompError::internal("too many parameters"))?;
            self.place(param, Location::Frame(off))?;
        }
        let mut locals = vec![];
        self.collect_locals(body, &mut locals);
        let frame = i16::try_from(2 * locals.len())
            .map_err(|_| CompError::internal("too many locals"))?;
        for (k, &local) in locals.iter().enumerate() {
            self.place(local, Location::Frame(-2 - 2 * k as i16))?;
        }

        self.asm.add_spacer();
        self.asm.add_comment(format!("{name}: {} params, {} locals", params.len(), locals.len()));
        self.asm.add_label(format!("{FUNC_PREFIX}{name}"));
        self.push(Register::RA);
        self.push(Register::FP);
        self.asm
            .gen_instr(Instruction::rri(Opcode::Add, Register::FP, Register::SP, 0));
        if frame > 0 {
            add_imm(&mut self.asm, Register::SP, -frame);
        }

        self.cache.clear();
        self.cur_func = name.clone();
        for &stmt in body {
            self.gen_stmt(stmt)?;
        }

        self.asm.add_label(format!("{RET_PREFIX}{name}"));
        self.cache.clear();
        self.asm
            .gen_instr(Instruction::rri(Opcode::Add, Register::SP, Register::FP, 0));
        self.pop(Register::FP);
        self.pop(Register::RA);
        self.asm.gen_instr(Instruction::jpr(Register::RA, 0));
        Ok(())
    }

    fn push(&mut self, reg: Register) {
        add_imm(&mut self.asm, Register::SP, -2);
        self.asm
            .gen_instr(Instruction::rro(Opcode::Str, reg, Register::SP, 0).with_comment(format!("push {reg}")));
    }

    fn pop(&mut self, reg: Register) {
        self.asm
            .gen_instr(Instruction::rro(Opcode::Ldr, reg, Register::SP, 0).with_comment(format!("pop {reg}")));
        add_imm(&mut self.asm, Register::SP, 2);
    }
}
