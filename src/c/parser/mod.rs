//! Recursive-descent parser.
//!
//! The parser never assembles nodes itself: it shifts every consumed token onto a
//! [BuildStack] and, once a production is complete, asks the [Ast] to build that production's
//! node from the top of the stack. Operator precedence falls out of the call order.

use anyhow::Result;
use thiserror::Error;

use crate::diag::Diagnostics;

use super::{
    ast::{Ast, BuildItem, BuildStack, NodeId, NodeTag},
    lexer::{ScanToken, TokenKind},
};

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("expected {expected}, found \"{found}\"")]
    Expected {
        expected: &'static str,
        found: String,
    },
}

/// Binary operator levels, loosest first.
const LEVELS: [&[TokenKind]; 7] = [
    &[TokenKind::Or],
    &[TokenKind::Xor],
    &[TokenKind::And],
    &[TokenKind::Eq, TokenKind::Neq],
    &[TokenKind::Lt, TokenKind::Leq, TokenKind::Grt, TokenKind::Geq],
    &[TokenKind::LShift, TokenKind::RShift],
    &[TokenKind::Plus, TokenKind::Minus],
];

struct Parser<'t, 'd> {
    toks: &'t [ScanToken],
    pos: usize,
    stack: BuildStack,
    ast: Ast,
    diag: &'d mut Diagnostics,
}

/// Parses a token stream ending in [TokenKind::Eof] into a tree rooted at a program node.
pub fn parse(toks: &[ScanToken], diag: &mut Diagnostics) -> Result<Ast> {
    let mut parser = Parser {
        toks,
        pos: 0,
        stack: BuildStack::default(),
        ast: Ast::default(),
        diag,
    };
    let root = parser.program()?;
    parser.ast.set_root(root);
    Ok(parser.ast)
}

impl<'t, 'd> Parser<'t, 'd> {
    fn peek(&self) -> TokenKind {
        self.peek_at(0)
    }

    fn peek_at(&self, ahead: usize) -> TokenKind {
        self.toks
            .get(self.pos + ahead)
            .map_or(TokenKind::Eof, |t| t.kind)
    }

    fn error(&mut self, expected: &'static str) -> anyhow::Error {
        let (found, line) = match self.toks.get(self.pos) {
            Some(tok) if tok.kind == TokenKind::Eof => (tok.kind.to_string(), Some(tok.line)),
            Some(tok) => (tok.text.clone(), Some(tok.line)),
            None => (TokenKind::Eof.to_string(), None),
        };
        self.diag
            .fatal(line, ParseError::Expected { expected, found })
            .into()
    }

    /// Moves the current token onto the build-stack.
    fn shift(&mut self) {
        if let Some(tok) = self.toks.get(self.pos) {
            self.stack.push(BuildItem::Token(tok.clone()));
            self.pos += 1;
        }
    }

    fn expect(&mut self, kind: TokenKind, expected: &'static str) -> Result<()> {
        if self.peek() != kind {
            return Err(self.error(expected));
        }
        self.shift();
        Ok(())
    }

    fn build(&mut self, tag: NodeTag) -> Result<NodeId> {
        Ok(self.ast.build(tag, &mut self.stack)?)
    }

    fn program(&mut self) -> Result<NodeId> {
        while self.peek() != TokenKind::Eof {
            self.declaration()?;
        }
        let root = self.build(NodeTag::Program)?;
        if self.stack.len() != 1 {
            return Err(self.error("a declaration"));
        }
        Ok(root)
    }

    fn type_spec(&mut self) -> Result<()> {
        if self.peek() == TokenKind::Unsigned {
            self.shift();
            if matches!(self.peek(), TokenKind::Int | TokenKind::Char) {
                self.shift();
            }
            return Ok(());
        }
        match self.peek() {
            TokenKind::Int | TokenKind::Char => {
                self.shift();
                Ok(())
            }
            _ => Err(self.error("a type")),
        }
    }

    fn declaration(&mut self) -> Result<()> {
        self.type_spec()?;
        self.expect(TokenKind::Id, "an identifier")?;
        if self.peek() != TokenKind::LParen {
            self.expect(TokenKind::Semicolon, "\";\"")?;
            self.build(NodeTag::VarDecl)?;
            return Ok(());
        }

        self.shift();
        if self.peek() != TokenKind::RParen {
            self.parameter()?;
            while self.peek() == TokenKind::Comma {
                self.shift();
                self.parameter()?;
            }
        }
        self.expect(TokenKind::RParen, "\")\"")?;
        self.block()?;
        self.build(NodeTag::FuncDef)?;
        Ok(())
    }

    fn parameter(&mut self) -> Result<()> {
        self.type_spec()?;
        self.expect(TokenKind::Id, "a parameter name")?;
        self.build(NodeTag::VarDecl)?;
        Ok(())
    }

    fn block(&mut self) -> Result<()> {
        self.expect(TokenKind::LCurly, "\"{\"")?;
        while !matches!(self.peek(), TokenKind::RCurly | TokenKind::Eof) {
            self.statement()?;
        }
        self.expect(TokenKind::RCurly, "\"}\"")
    }

    fn statement(&mut self) -> Result<()> {
        match self.peek() {
            TokenKind::Int | TokenKind::Char | TokenKind::Unsigned => {
                self.type_spec()?;
                self.expect(TokenKind::Id, "an identifier")?;
                self.expect(TokenKind::Semicolon, "\";\"")?;
                self.build(NodeTag::VarDecl)?;
            }
            TokenKind::If | TokenKind::While => {
                let tag = if self.peek() == TokenKind::If {
                    NodeTag::If
                } else {
                    NodeTag::While
                };
                self.shift();
                self.expect(TokenKind::LParen, "\"(\"")?;
                self.expression()?;
                self.expect(TokenKind::RParen, "\")\"")?;
                self.block()?;
                self.build(tag)?;
            }
            TokenKind::Return => {
                self.shift();
                self.expression()?;
                self.expect(TokenKind::Semicolon, "\";\"")?;
                self.build(NodeTag::Return)?;
            }
            TokenKind::Id if self.peek_at(1) == TokenKind::LParen => {
                self.call()?;
                self.expect(TokenKind::Semicolon, "\";\"")?;
            }
            TokenKind::Id => {
                self.shift();
                self.build(NodeTag::Id)?;
                self.expect(TokenKind::Assign, "\"=\"")?;
                self.expression()?;
                self.expect(TokenKind::Semicolon, "\";\"")?;
                self.build(NodeTag::Assign)?;
            }
            _ => return Err(self.error("a statement")),
        }
        Ok(())
    }

    fn expression(&mut self) -> Result<()> {
        self.binary(0)
    }

    fn binary(&mut self, level: usize) -> Result<()> {
        let Some(ops) = LEVELS.get(level) else {
            return self.unary();
        };
        self.binary(level + 1)?;
        while ops.contains(&self.peek()) {
            let tag = NodeTag::from_operator(self.peek()).ok_or_else(|| self.error("an operator"))?;
            self.shift();
            self.binary(level + 1)?;
            self.build(tag)?;
        }
        Ok(())
    }

    fn unary(&mut self) -> Result<()> {
        match self.peek() {
            TokenKind::Minus | TokenKind::Tilde | TokenKind::Bang => {
                let tag = NodeTag::from_operator(self.peek()).ok_or_else(|| self.error("an operator"))?;
                self.shift();
                self.unary()?;
                self.build(tag)?;
                Ok(())
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<()> {
        match self.peek() {
            TokenKind::ILiteral | TokenKind::HLiteral | TokenKind::CLiteral => {
                self.shift();
                self.build(NodeTag::Lit)?;
            }
            TokenKind::Id if self.peek_at(1) == TokenKind::LParen => self.call()?,
            TokenKind::Id => {
                self.shift();
                self.build(NodeTag::Id)?;
            }
            TokenKind::LParen => {
                self.shift();
                self.expression()?;
                self.expect(TokenKind::RParen, "\")\"")?;
            }
            _ => return Err(self.error("an expression")),
        }
        Ok(())
    }

    fn call(&mut self) -> Result<()> {
        self.shift();
        self.build(NodeTag::Id)?;
        self.expect(TokenKind::LParen, "\"(\"")?;
        if self.peek() != TokenKind::RParen {
            self.expression()?;
            while self.peek() == TokenKind::Comma {
                self.shift();
                self.expression()?;
            }
        }
        self.expect(TokenKind::RParen, "\")\"")?;
        self.build(NodeTag::Call)?;
        Ok(())
    }
}
