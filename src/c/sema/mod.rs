//! Semantic analysis: symbol binding, then type inference.
//!
//! Both passes walk the whole tree and must run in order, since typing relies on every
//! identifier having been resolved.

use anyhow::{Context, Result};
use thiserror::Error;

use self::types::VarType;

use super::{
    ast::{Ast, NodeId},
    Session,
};

pub mod literal;
pub mod semantics;
pub mod symbol;
pub mod types;
pub mod typing;

/// Fatal errors found while binding symbols.
#[derive(Debug, Error)]
pub enum SemaError {
    #[error("\"{0}\" is undeclared")]
    Undeclared(String),
    #[error("\"int main()\" does not exist")]
    MissingMain,
    #[error("\"{name}\" takes {expected} argument(s) but {found} were given")]
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("\"{0}\" is not a function")]
    NotAFunction(String),
    #[error("function \"{0}\" used as a variable")]
    NotAVariable(String),
}

/// Non-fatal findings.
#[derive(Debug, Error)]
pub enum Warning {
    #[error("\"{0}\" is unused")]
    Unused(String),
    #[error("\"{0}\" is uninitialized")]
    Uninitialized(String),
    #[error("{from} to {to} may be lossy")]
    Lossy { from: VarType, to: VarType },
    #[error("unreachable code")]
    Unreachable,
    #[error("condition is constant")]
    ConstantCondition,
    #[error("literal {0} does not fit in 16 bits, truncated to {1}")]
    LiteralOverflow(String, i32),
    #[error("\"{0}\" may not return a value")]
    MissingReturn(String),
}

/// Runs the semantic and typing passes over one tree.
pub struct Analyzer<'a> {
    pub(crate) ast: &'a mut Ast,
    pub(crate) sess: &'a mut Session,
    /// The function whose body is being typed.
    pub(crate) cur_func: Option<NodeId>,
}

impl<'a> Analyzer<'a> {
    pub fn new(ast: &'a mut Ast, sess: &'a mut Session) -> Self {
        Self {
            ast,
            sess,
            cur_func: None,
        }
    }

    pub fn run(&mut self) -> Result<()> {
        let Some(root) = self.ast.root() else {
            return Ok(());
        };
        self.check_semantics(root)
            .context("checking semantics")?;
        self.check_typing(root).context("checking types")?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use crate::{
        c::{Options, Session},
        diag::Diagnostic,
    };

    /// Runs the front end, returning every diagnostic or the fatal error text.
    pub fn analyze(src: &str) -> Result<Vec<Diagnostic>, String> {
        let mut sess = Session::new(Options::default());
        match sess.front_end(src) {
            Ok(_) => Ok(sess.diag.all().to_vec()),
            Err(e) => Err(e.root_cause().to_string()),
        }
    }

    pub fn warnings(src: &str) -> Vec<String> {
        analyze(src)
            .unwrap()
            .into_iter()
            .filter(|d| d.severity == crate::diag::Severity::Warn)
            .map(|d| d.to_string())
            .collect()
    }
}
