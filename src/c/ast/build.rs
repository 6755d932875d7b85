//! Node constructors. Each one pops the items of its production off the build-stack, stopping at
//! the first unrelated item, which is pushed back untouched.

use crate::{
    c::{lexer::TokenKind, sema::types::VarType},
    diag::CompError,
};

use super::{Ast, BuildItem, BuildStack, Node, NodeId, NodeKind, NodeTag};

type BResult<T> = Result<T, CompError>;

fn malformed(tag: NodeTag) -> CompError {
    CompError::internal(format!("malformed build-stack for {tag:?}"))
}

impl Ast {
    /// Builds one `tag` node from the top of `stack` and pushes it back as a single item.
    pub fn build(&mut self, tag: NodeTag, stack: &mut BuildStack) -> BResult<NodeId> {
        let node = match tag {
            NodeTag::Program => self.build_program(stack),
            NodeTag::VarDecl => self.build_var_decl(stack)?,
            NodeTag::FuncDef => self.build_func_def(stack)?,
            NodeTag::Id => build_id(stack)?,
            NodeTag::Lit => build_lit(stack)?,
            NodeTag::If | NodeTag::While => self.build_branch(tag, stack)?,
            NodeTag::Return => self.build_return(stack)?,
            NodeTag::Assign => self.build_assign(stack)?,
            NodeTag::Call => self.build_call(stack)?,
            _ => self.build_expr(tag, stack)?,
        };
        let id = self.add(node);
        stack.push(BuildItem::Node(id));
        Ok(id)
    }

    fn build_program(&mut self, stack: &mut BuildStack) -> Node {
        let mut decls = vec![];
        while let Some(item) = stack.pop() {
            match item {
                BuildItem::Node(id) if self[id].is_decl() => decls.push(id),
                other => {
                    stack.push(other);
                    break;
                }
            }
        }
        decls.reverse();
        let line = decls.first().and_then(|&d| self[d].line);
        Node::new(NodeTag::Program, line, NodeKind::Program { decls })
    }

    fn build_var_decl(&mut self, stack: &mut BuildStack) -> BResult<Node> {
        let mut is_param = true;
        if let Some(item) = stack.pop() {
            match item {
                BuildItem::Token(tok) if tok.kind == TokenKind::Semicolon => is_param = false,
                other => stack.push(other),
            }
        }
        let (name, ty, line) = pop_decl_header(stack, NodeTag::VarDecl)?;
        Ok(Node::new(
            NodeTag::VarDecl,
            Some(line),
            NodeKind::VarDecl {
                name,
                ty,
                is_param,
                sym: None,
            },
        ))
    }

    fn build_func_def(&mut self, stack: &mut BuildStack) -> BResult<Node> {
        let body = self.pop_block(NodeTag::FuncDef, stack)?;

        let mut params = vec![];
        loop {
            match stack.pop().ok_or_else(|| malformed(NodeTag::FuncDef))? {
                BuildItem::Token(tok) if tok.kind == TokenKind::LParen => break,
                BuildItem::Token(_) => {}
                BuildItem::Node(id) if self[id].tag == NodeTag::VarDecl => params.push(id),
                BuildItem::Node(_) => return Err(malformed(NodeTag::FuncDef)),
            }
        }
        params.reverse();

        let (name, ty, line) = pop_decl_header(stack, NodeTag::FuncDef)?;
        Ok(Node::new(
            NodeTag::FuncDef,
            Some(line),
            NodeKind::FuncDef {
                name,
                ty,
                params,
                body,
                sym: None,
            },
        ))
    }

    /// Pops statements down to and including the opening `{`, returned in source order.
    fn pop_block(&self, tag: NodeTag, stack: &mut BuildStack) -> BResult<Vec<NodeId>> {
        let mut body = vec![];
        loop {
            match stack.pop().ok_or_else(|| malformed(tag))? {
                BuildItem::Token(tok) if tok.kind == TokenKind::LCurly => break,
                BuildItem::Token(_) => {}
                BuildItem::Node(id) if self[id].is_stmt() => body.push(id),
                BuildItem::Node(_) => return Err(malformed(tag)),
            }
        }
        body.reverse();
        Ok(body)
    }

    fn build_branch(&mut self, tag: NodeTag, stack: &mut BuildStack) -> BResult<Node> {
        let body = self.pop_block(tag, stack)?;
        let keyword = if tag == NodeTag::If {
            TokenKind::If
        } else {
            TokenKind::While
        };
        let mut cond = None;
        let line = loop {
            match stack.pop().ok_or_else(|| malformed(tag))? {
                BuildItem::Token(tok) if tok.kind == keyword => break tok.line,
                BuildItem::Token(_) => {}
                BuildItem::Node(id) if self[id].is_expr() && cond.is_none() => cond = Some(id),
                BuildItem::Node(_) => return Err(malformed(tag)),
            }
        };
        let cond = cond.ok_or_else(|| malformed(tag))?;
        let kind = if tag == NodeTag::If {
            NodeKind::If { cond, body }
        } else {
            NodeKind::While { cond, body }
        };
        Ok(Node::new(tag, Some(line), kind))
    }

    fn build_return(&mut self, stack: &mut BuildStack) -> BResult<Node> {
        let mut value = None;
        let line = loop {
            match stack.pop().ok_or_else(|| malformed(NodeTag::Return))? {
                BuildItem::Token(tok) if tok.kind == TokenKind::Return => break tok.line,
                BuildItem::Token(_) => {}
                BuildItem::Node(id) if self[id].is_expr() && value.is_none() => value = Some(id),
                BuildItem::Node(_) => return Err(malformed(NodeTag::Return)),
            }
        };
        let value = value.ok_or_else(|| malformed(NodeTag::Return))?;
        Ok(Node::new(NodeTag::Return, Some(line), NodeKind::Return { value }))
    }

    fn build_assign(&mut self, stack: &mut BuildStack) -> BResult<Node> {
        let mut value = None;
        let line = loop {
            match stack.pop().ok_or_else(|| malformed(NodeTag::Assign))? {
                BuildItem::Token(tok) if tok.kind == TokenKind::Assign => break tok.line,
                BuildItem::Token(_) => {}
                BuildItem::Node(id) if self[id].is_expr() && value.is_none() => value = Some(id),
                BuildItem::Node(_) => return Err(malformed(NodeTag::Assign)),
            }
        };
        let value = value.ok_or_else(|| malformed(NodeTag::Assign))?;
        let target = match stack.pop() {
            Some(BuildItem::Node(id)) if self[id].tag == NodeTag::Id => id,
            _ => return Err(malformed(NodeTag::Assign)),
        };
        if let NodeKind::Id { is_write, .. } = &mut self[target].kind {
            *is_write = true;
        }
        Ok(Node::new(
            NodeTag::Assign,
            Some(line),
            NodeKind::Assign { target, value },
        ))
    }

    fn build_call(&mut self, stack: &mut BuildStack) -> BResult<Node> {
        let mut args = vec![];
        let mut depth = 0usize;
        let callee = loop {
            match stack.pop().ok_or_else(|| malformed(NodeTag::Call))? {
                BuildItem::Token(tok) if tok.kind == TokenKind::RParen => depth += 1,
                BuildItem::Token(tok) if tok.kind == TokenKind::LParen => {
                    depth = depth.checked_sub(1).ok_or_else(|| malformed(NodeTag::Call))?;
                }
                BuildItem::Token(tok) if tok.kind == TokenKind::Comma => {}
                BuildItem::Node(id) if depth > 0 && self[id].is_expr() => args.push(id),
                BuildItem::Node(id) if depth == 0 && self[id].tag == NodeTag::Id => break id,
                _ => return Err(malformed(NodeTag::Call)),
            }
        };
        args.reverse();
        let line = self[callee].line;
        Ok(Node::new(NodeTag::Call, line, NodeKind::Call { callee, args }))
    }

    /// Unary and binary operators. Parentheses around either operand are dropped here.
    fn build_expr(&mut self, tag: NodeTag, stack: &mut BuildStack) -> BResult<Node> {
        let mut rhs = None;
        let mut parens = 0usize;
        let line = loop {
            match stack.pop().ok_or_else(|| malformed(tag))? {
                BuildItem::Token(tok) if tok.kind == TokenKind::RParen => parens += 1,
                BuildItem::Token(tok) if tok.kind == TokenKind::LParen && parens > 0 => parens -= 1,
                BuildItem::Token(tok) if parens == 0 => break tok.line,
                BuildItem::Node(id) if self[id].is_expr() && rhs.is_none() => rhs = Some(id),
                _ => return Err(malformed(tag)),
            }
        };
        let rhs = rhs.ok_or_else(|| malformed(tag))?;

        let mut lhs = None;
        parens = 0;
        while let Some(item) = stack.pop() {
            match item {
                BuildItem::Token(tok) if tok.kind == TokenKind::RParen => parens += 1,
                BuildItem::Token(tok) if tok.kind == TokenKind::LParen && parens > 0 => parens -= 1,
                BuildItem::Node(id) if lhs.is_none() && self[id].is_expr() => lhs = Some(id),
                other => {
                    stack.push(other);
                    break;
                }
            }
        }

        let unary = matches!(tag, NodeTag::LNot | NodeTag::BNot);
        if unary && lhs.is_some() || !unary && tag != NodeTag::Minus && lhs.is_none() {
            return Err(malformed(tag));
        }
        Ok(Node::new(tag, Some(line), NodeKind::Expr { lhs, rhs }))
    }
}

fn build_id(stack: &mut BuildStack) -> BResult<Node> {
    match stack.pop() {
        Some(BuildItem::Token(tok)) if tok.kind == TokenKind::Id => Ok(Node::new(
            NodeTag::Id,
            Some(tok.line),
            NodeKind::Id {
                name: tok.text,
                is_write: false,
                sym: None,
            },
        )),
        _ => Err(malformed(NodeTag::Id)),
    }
}

fn build_lit(stack: &mut BuildStack) -> BResult<Node> {
    match stack.pop() {
        Some(BuildItem::Token(tok))
            if matches!(
                tok.kind,
                TokenKind::ILiteral | TokenKind::HLiteral | TokenKind::CLiteral
            ) =>
        {
            Ok(Node::new(
                NodeTag::Lit,
                Some(tok.line),
                NodeKind::Lit {
                    text: tok.text,
                    value: None,
                },
            ))
        }
        _ => Err(malformed(NodeTag::Lit)),
    }
}

/// Pops `<unsigned>? <int|char>? <id>`, as found at the start of every declaration.
fn pop_decl_header(stack: &mut BuildStack, tag: NodeTag) -> BResult<(String, VarType, usize)> {
    let (name, line) = match stack.pop() {
        Some(BuildItem::Token(tok)) if tok.kind == TokenKind::Id => (tok.text, tok.line),
        _ => return Err(malformed(tag)),
    };
    let mut base = None;
    let mut unsigned = false;
    while let Some(item) = stack.pop() {
        match item {
            BuildItem::Token(tok) if tok.kind == TokenKind::Unsigned && !unsigned => {
                unsigned = true
            }
            BuildItem::Token(tok)
                if base.is_none()
                    && !unsigned
                    && matches!(tok.kind, TokenKind::Int | TokenKind::Char) =>
            {
                base = Some(tok.kind)
            }
            other => {
                stack.push(other);
                break;
            }
        }
    }
    let ty = match (base, unsigned) {
        (Some(TokenKind::Char), false) => VarType::Char,
        (Some(TokenKind::Char), true) => VarType::UChar,
        (Some(_), false) => VarType::Int,
        (_, true) => VarType::UInt,
        (None, false) => return Err(malformed(tag)),
    };
    Ok((name, ty, line))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::c::lexer::ScanToken;

    fn tok(kind: TokenKind, text: &str) -> BuildItem {
        BuildItem::Token(ScanToken {
            kind,
            text: text.to_owned(),
            line: 1,
        })
    }

    #[test]
    fn test_unsigned_char_decl() {
        let mut ast = Ast::default();
        let mut stack = BuildStack::default();
        for item in [
            tok(TokenKind::Unsigned, "unsigned"),
            tok(TokenKind::Char, "char"),
            tok(TokenKind::Id, "c"),
            tok(TokenKind::Semicolon, ";"),
        ] {
            stack.push(item);
        }
        let id = ast.build(NodeTag::VarDecl, &mut stack).unwrap();
        assert!(matches!(
            &ast[id].kind,
            NodeKind::VarDecl { ty: VarType::UChar, is_param: false, .. }
        ));
        assert_eq!(stack.len(), 1);
    }

    #[test]
    fn test_parenthesized_operands() {
        // (a) - b, then -(that)
        let mut ast = Ast::default();
        let mut stack = BuildStack::default();
        stack.push(tok(TokenKind::Minus, "-"));
        stack.push(tok(TokenKind::LParen, "("));
        stack.push(tok(TokenKind::LParen, "("));
        stack.push(tok(TokenKind::Id, "a"));
        let a = ast.build(NodeTag::Id, &mut stack).unwrap();
        stack.push(tok(TokenKind::RParen, ")"));
        stack.push(tok(TokenKind::Minus, "-"));
        stack.push(tok(TokenKind::Id, "b"));
        let b = ast.build(NodeTag::Id, &mut stack).unwrap();
        let sub = ast.build(NodeTag::Minus, &mut stack).unwrap();
        assert!(matches!(ast[sub].kind, NodeKind::Expr { lhs: Some(l), rhs } if l == a && rhs == b));

        stack.push(tok(TokenKind::RParen, ")"));
        let neg = ast.build(NodeTag::Minus, &mut stack).unwrap();
        assert!(matches!(ast[neg].kind, NodeKind::Expr { lhs: None, rhs } if rhs == sub));
        assert_eq!(stack.len(), 1);
    }
}
