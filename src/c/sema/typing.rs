use anyhow::Result;

use crate::{
    c::ast::{NodeId, NodeKind, NodeTag},
    diag::CompError,
};

use super::{
    literal::parse_literal,
    types::{can_assign, new_typing, VarType},
    Analyzer, Warning,
};

impl<'a> Analyzer<'a> {
    /// Infers expression types and checks conversions and reachability.
    pub fn check_typing(&mut self, id: NodeId) -> Result<()> {
        match self.ast[id].kind.clone() {
            NodeKind::Program { decls } => {
                for decl in decls {
                    self.check_typing(decl)?;
                }
            }
            NodeKind::FuncDef { name, body, .. } => {
                self.cur_func = Some(id);
                let exits = self.check_block(&body)?;
                if !exits {
                    self.sess
                        .diag
                        .warn(self.ast[id].line, Warning::MissingReturn(name))?;
                }
                self.cur_func = None;
            }
            NodeKind::VarDecl { .. } => {}
            _ => {
                self.check_stmt(id)?;
            }
        }
        Ok(())
    }

    /// Checks a statement list, returning whether it definitely leaves the function.
    fn check_block(&mut self, body: &[NodeId]) -> Result<bool> {
        let mut exits = false;
        let mut warned = false;
        for &stmt in body {
            if exits && !warned {
                self.sess.diag.warn(self.ast[stmt].line, Warning::Unreachable)?;
                warned = true;
            }
            if self.check_stmt(stmt)? {
                exits = true;
            }
        }
        Ok(exits)
    }

    fn check_stmt(&mut self, id: NodeId) -> Result<bool> {
        let line = self.ast[id].line;
        let exits = match self.ast[id].kind.clone() {
            NodeKind::VarDecl { .. } => false,
            NodeKind::Assign { target, value } => {
                let to = self.type_of(target)?;
                let from = self.type_of(value)?;
                self.check_conversion(line, to, from)?;
                false
            }
            NodeKind::Return { value } => {
                let from = self.type_of(value)?;
                let to = match self.cur_func.map(|f| &self.ast[f].kind) {
                    Some(NodeKind::FuncDef { ty, .. }) => *ty,
                    _ => return Err(CompError::internal("return outside of a function").into()),
                };
                self.check_conversion(line, to, from)?;
                true
            }
            NodeKind::If { cond, body } => {
                self.type_of(cond)?;
                let constant = self.literal_cond(cond)?;
                let body_exits = self.check_block(&body)?;
                constant.is_some_and(|v| v != 0) && body_exits
            }
            NodeKind::While { cond, body } => {
                self.type_of(cond)?;
                let constant = self.literal_cond(cond)?;
                self.check_block(&body)?;
                constant.is_some_and(|v| v != 0)
            }
            NodeKind::Call { .. } => {
                self.type_of(id)?;
                false
            }
            _ => {
                return Err(CompError::internal(format!(
                    "{:?} node used as a statement",
                    self.ast[id].tag
                ))
                .into())
            }
        };
        Ok(exits)
    }

    /// The value of a condition written as a bare literal, warning about it.
    fn literal_cond(&mut self, cond: NodeId) -> Result<Option<i32>> {
        let NodeKind::Lit { value, .. } = self.ast[cond].kind else {
            return Ok(None);
        };
        self.sess
            .diag
            .warn(self.ast[cond].line, Warning::ConstantCondition)?;
        Ok(value)
    }

    fn check_conversion(&mut self, line: Option<usize>, to: VarType, from: VarType) -> Result<()> {
        if !can_assign(to, from) {
            self.sess.diag.warn(line, Warning::Lossy { from, to })?;
        }
        Ok(())
    }

    /// Infers and records the type of an expression.
    fn type_of(&mut self, id: NodeId) -> Result<VarType> {
        let line = self.ast[id].line;
        let ty = match self.ast[id].kind.clone() {
            NodeKind::Lit { text, .. } => {
                let lit = parse_literal(&text)
                    .ok_or_else(|| CompError::internal(format!("malformed literal {text}")))?;
                if let NodeKind::Lit { value, .. } = &mut self.ast[id].kind {
                    *value = Some(lit.value);
                }
                if lit.overflow {
                    self.sess
                        .diag
                        .warn(line, Warning::LiteralOverflow(text, lit.value))?;
                    VarType::UInt
                } else {
                    VarType::Literal
                }
            }
            NodeKind::Id { sym, name, .. } => {
                let sym = sym.ok_or_else(|| CompError::internal(format!("\"{name}\" is unbound")))?;
                self.sess.symbols.get(sym).ty
            }
            NodeKind::Call { callee, args } => {
                let sym = self.ast[callee]
                    .sym()
                    .ok_or_else(|| CompError::internal("call to an unbound function"))?;
                let params = self.sess.symbols.get(sym).params().to_vec();
                for (arg, param) in args.into_iter().zip(params) {
                    let from = self.type_of(arg)?;
                    self.check_conversion(self.ast[arg].line, param, from)?;
                }
                self.sess.symbols.get(sym).ty
            }
            NodeKind::Expr { lhs: None, rhs } => {
                let operand = self.type_of(rhs)?;
                match self.ast[id].tag {
                    NodeTag::BNot => VarType::Int,
                    _ => operand,
                }
            }
            NodeKind::Expr {
                lhs: Some(lhs),
                rhs,
            } => {
                let l = self.type_of(lhs)?;
                let r = self.type_of(rhs)?;
                if self.ast[id].tag == NodeTag::RShift {
                    l
                } else {
                    let combined = new_typing(l, r);
                    if combined.lossy {
                        let from = if l.is_signed() { l } else { r };
                        self.sess
                            .diag
                            .warn(line, Warning::Lossy { from, to: combined.ty })?;
                    }
                    combined.ty
                }
            }
            _ => {
                return Err(CompError::internal(format!(
                    "{:?} node used as an expression",
                    self.ast[id].tag
                ))
                .into())
            }
        };
        self.ast[id].ty = Some(ty);
        Ok(ty)
    }
}
