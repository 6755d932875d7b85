//! Constant folding and single-assignment constant propagation.

use super::{
    ast::{Ast, NodeId, NodeKind, NodeTag},
    sema::types::VarType,
    Session,
};

/// Truncates a folded value to the 16-bit machine word, reinterpreted as signed.
fn wrap(v: i32) -> i32 {
    v as u16 as i16 as i32
}

/// Folds one operator over constant operands.
///
/// `ty` is the type the typing pass gave the operator node. `lhs` is unset for unary operators.
pub fn fold(tag: NodeTag, ty: VarType, lhs: Option<i32>, rhs: i32) -> Option<i32> {
    let Some(l) = lhs else {
        return match tag {
            NodeTag::Minus => Some(wrap(rhs.wrapping_neg())),
            NodeTag::LNot => Some(wrap(!rhs)),
            NodeTag::BNot => Some((wrap(rhs) == 0) as i32),
            _ => None,
        };
    };
    let r = rhs;
    let cmp = |f: fn(i32, i32) -> bool| {
        let res = match ty {
            VarType::UInt | VarType::UChar => f(l as u16 as i32, r as u16 as i32),
            VarType::Literal => f(l, r),
            VarType::Int | VarType::Char => f(wrap(l), wrap(r)),
        };
        Some(res as i32)
    };
    match tag {
        NodeTag::Plus => Some(wrap(l.wrapping_add(r))),
        NodeTag::Minus => Some(wrap(l.wrapping_sub(r))),
        NodeTag::And => Some(wrap(l & r)),
        NodeTag::Xor => Some(wrap(l ^ r)),
        NodeTag::Or => Some(wrap(l | r)),
        NodeTag::LShift => {
            let amt = r as u16;
            Some(if amt >= 16 { 0 } else { wrap(l << amt) })
        }
        NodeTag::RShift => {
            let amt = (r as u16).min(15) as u32;
            let big = r as u16 >= 16;
            if ty.is_unsigned() || l > 0x7FFF {
                Some(if big { 0 } else { (l as u16 >> amt) as i32 })
            } else {
                let l = l as u16 as i16;
                Some(if big { (l >> 15) as i32 } else { (l >> amt) as i32 })
            }
        }
        NodeTag::Eq => cmp(|a, b| a == b),
        NodeTag::Neq => cmp(|a, b| a != b),
        NodeTag::Lt => cmp(|a, b| a < b),
        NodeTag::Leq => cmp(|a, b| a <= b),
        NodeTag::Grt => cmp(|a, b| a > b),
        NodeTag::Geq => cmp(|a, b| a >= b),
        _ => None,
    }
}

pub struct Optimizer<'a> {
    ast: &'a mut Ast,
    sess: &'a mut Session,
}

impl<'a> Optimizer<'a> {
    pub fn new(ast: &'a mut Ast, sess: &'a mut Session) -> Self {
        Self { ast, sess }
    }

    pub fn run(&mut self) {
        let Some(root) = self.ast.root() else {
            return;
        };
        self.fold_tree(root);
        if self.sess.opts.optimize {
            self.propagate(root);
        }
    }

    /// Records `const_val` on every expression whose operands are all known.
    fn fold_tree(&mut self, id: NodeId) -> Option<i32> {
        let folded = match self.ast[id].kind.clone() {
            NodeKind::Program { decls: children } | NodeKind::FuncDef { body: children, .. } => {
                for child in children {
                    self.fold_tree(child);
                }
                None
            }
            NodeKind::If { cond, body } | NodeKind::While { cond, body } => {
                self.fold_tree(cond);
                for stmt in body {
                    self.fold_tree(stmt);
                }
                None
            }
            NodeKind::Assign { target: _, value } | NodeKind::Return { value } => {
                self.fold_tree(value);
                None
            }
            NodeKind::Call { args, .. } => {
                for arg in args {
                    self.fold_tree(arg);
                }
                None
            }
            NodeKind::Lit { value, .. } => value,
            NodeKind::Expr { lhs, rhs } => {
                let l = lhs.map(|l| self.fold_tree(l));
                let r = self.fold_tree(rhs);
                let node = &self.ast[id];
                let ty = node.ty.unwrap_or(VarType::Int);
                match (l, r) {
                    (None, Some(r)) => fold(node.tag, ty, None, r),
                    (Some(Some(l)), Some(r)) => fold(node.tag, ty, Some(l), r),
                    _ => None,
                }
            }
            NodeKind::VarDecl { .. } | NodeKind::Id { .. } => None,
        };
        if let Some(v) = folded {
            if self.ast[id].tag != NodeTag::Lit {
                log::trace!("folded {:?} on line {:?} to {v}", self.ast[id].tag, self.ast[id].line);
            }
            self.ast[id].const_val = Some(v);
        }
        folded
    }

    /// Gives single-assignment locals the constant they are assigned.
    fn propagate(&mut self, id: NodeId) {
        match self.ast[id].kind.clone() {
            NodeKind::Program { decls: children }
            | NodeKind::FuncDef { body: children, .. }
            | NodeKind::If { body: children, .. }
            | NodeKind::While { body: children, .. } => {
                for child in children {
                    self.propagate(child);
                }
            }
            NodeKind::Assign { target, value } => {
                let (Some(sym), Some(v)) = (self.ast[target].sym(), self.ast[value].const_val)
                else {
                    return;
                };
                let sym = self.sess.symbols.get_mut(sym);
                if !sym.is_global && !sym.is_param && sym.writes == 1 {
                    log::debug!("\"{}\" is constant {v}", sym.name);
                    sym.const_val = Some(v as u16 as i16);
                }
            }
            _ => {}
        }
    }
}
