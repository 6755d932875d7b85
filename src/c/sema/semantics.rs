use anyhow::Result;

use crate::c::ast::{NodeId, NodeKind};

use super::{
    symbol::{SymKind, SymbolId},
    types::VarType,
    Analyzer, SemaError, Warning,
};

impl<'a> Analyzer<'a> {
    /// Binds declarations and references to symbols, tracking scopes, use and initialization.
    pub fn check_semantics(&mut self, id: NodeId) -> Result<()> {
        let line = self.ast[id].line;
        match self.ast[id].kind.clone() {
            NodeKind::Program { decls } => {
                for decl in decls {
                    self.check_semantics(decl)?;
                }
                self.check_main()?;
                self.report_unused()?;
            }
            NodeKind::VarDecl {
                name, ty, is_param, ..
            } => {
                let sym = self
                    .sess
                    .symbols
                    .add_sym(&name, line, ty, SymKind::Var)
                    .map_err(|e| self.sess.diag.fatal(line, e))?;
                let s = self.sess.symbols.get_mut(sym);
                s.is_param = is_param;
                s.is_init = is_param;
                self.set_sym(id, sym);
            }
            NodeKind::FuncDef {
                name,
                ty,
                params,
                body,
                ..
            } => {
                let param_types = params
                    .iter()
                    .map(|&p| match &self.ast[p].kind {
                        NodeKind::VarDecl { ty, .. } => *ty,
                        _ => VarType::Int,
                    })
                    .collect();
                let sym = self
                    .sess
                    .symbols
                    .add_sym(
                        &name,
                        line,
                        ty,
                        SymKind::Func {
                            params: param_types,
                        },
                    )
                    .map_err(|e| self.sess.diag.fatal(line, e))?;
                self.sess.symbols.get_mut(sym).is_init = true;
                self.set_sym(id, sym);

                self.sess.symbols.push_scope();
                for stmt in params.into_iter().chain(body) {
                    self.check_semantics(stmt)?;
                }
                self.sess.symbols.pop_scope();
            }
            NodeKind::Id { name, is_write, .. } => {
                let sym = self.resolve(&name, line)?;
                if self.sess.symbols.get(sym).is_func() {
                    return Err(self.sess.diag.fatal(line, SemaError::NotAVariable(name)).into());
                }
                let s = self.sess.symbols.get_mut(sym);
                s.is_used = true;
                if is_write {
                    s.is_init = true;
                    s.writes += 1;
                } else if !s.is_init {
                    self.sess.diag.warn(line, Warning::Uninitialized(name))?;
                }
                self.set_sym(id, sym);
            }
            NodeKind::Assign { target, value } => {
                self.check_semantics(value)?;
                self.check_semantics(target)?;
            }
            NodeKind::If { cond, body } | NodeKind::While { cond, body } => {
                self.check_semantics(cond)?;
                self.sess.symbols.push_scope();
                for stmt in body {
                    self.check_semantics(stmt)?;
                }
                self.sess.symbols.pop_scope();
            }
            NodeKind::Return { value } => self.check_semantics(value)?,
            NodeKind::Call { callee, args } => {
                let NodeKind::Id { name, .. } = self.ast[callee].kind.clone() else {
                    return Ok(());
                };
                let sym = self.resolve(&name, line)?;
                let expected = {
                    let s = self.sess.symbols.get_mut(sym);
                    if !s.is_func() {
                        return Err(self.sess.diag.fatal(line, SemaError::NotAFunction(name)).into());
                    }
                    s.is_used = true;
                    s.params().len()
                };
                self.set_sym(callee, sym);
                if expected != args.len() {
                    let err = SemaError::ArityMismatch {
                        name,
                        expected,
                        found: args.len(),
                    };
                    return Err(self.sess.diag.fatal(line, err).into());
                }
                for arg in args {
                    self.check_semantics(arg)?;
                }
            }
            NodeKind::Expr { lhs, rhs } => {
                if let Some(lhs) = lhs {
                    self.check_semantics(lhs)?;
                }
                self.check_semantics(rhs)?;
            }
            NodeKind::Lit { .. } => {}
        }
        Ok(())
    }

    fn resolve(&mut self, name: &str, line: Option<usize>) -> Result<SymbolId> {
        match self.sess.symbols.get_global(name) {
            Some(sym) => Ok(sym),
            None => Err(self
                .sess
                .diag
                .fatal(line, SemaError::Undeclared(name.to_owned()))
                .into()),
        }
    }

    fn set_sym(&mut self, id: NodeId, new: SymbolId) {
        match &mut self.ast[id].kind {
            NodeKind::VarDecl { sym, .. }
            | NodeKind::FuncDef { sym, .. }
            | NodeKind::Id { sym, .. } => *sym = Some(new),
            _ => {}
        }
    }

    fn check_main(&mut self) -> Result<()> {
        let main = self.sess.symbols.get_local("main").filter(|&m| {
            let s = self.sess.symbols.get(m);
            s.is_func() && s.params().is_empty() && s.ty == VarType::Int
        });
        match main {
            Some(m) => {
                self.sess.symbols.get_mut(m).is_used = true;
                Ok(())
            }
            None => Err(self.sess.diag.fatal(None, SemaError::MissingMain).into()),
        }
    }

    fn report_unused(&mut self) -> Result<()> {
        let unused: Vec<_> = self
            .sess
            .symbols
            .iter()
            .filter(|(_, s)| !s.is_used)
            .map(|(_, s)| (s.line, s.name.clone()))
            .collect();
        for (line, name) in unused {
            self.sess.diag.warn(line, Warning::Unused(name))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::c::sema::tests::{analyze, warnings};

    #[test]
    fn test_redeclaration_is_fatal() {
        let err = analyze("int main() { int a; int a; return 0; }").unwrap_err();
        assert_eq!(err, "(Line 1) \"a\" multiply declared");
    }

    #[test]
    fn test_shadowing_is_legal() {
        let src = "int main() {
            int a;
            a = 1;
            if (a) { int a; a = 2; return a; }
            return a;
        }";
        assert!(analyze(src).is_ok());
    }

    #[test]
    fn test_block_scope_ends_at_brace() {
        let src = "int main() {
            if (1) { int inner; inner = 1; }
            return inner;
        }";
        assert_eq!(analyze(src).unwrap_err(), "(Line 3) \"inner\" is undeclared");
    }

    #[test]
    fn test_main_is_required() {
        let err = analyze("int start() { return 0; }").unwrap_err();
        assert_eq!(err, "\"int main()\" does not exist");

        let err = analyze("char main() { return 0; }").unwrap_err();
        assert_eq!(err, "\"int main()\" does not exist");

        let err = analyze("int main(int argc) { return argc; }").unwrap_err();
        assert_eq!(err, "\"int main()\" does not exist");
    }

    #[test]
    fn test_call_checks() {
        let err = analyze("int f(int a) { return a; } int main() { return f(1, 2); }").unwrap_err();
        assert_eq!(
            err,
            "(Line 1) \"f\" takes 1 argument(s) but 2 were given"
        );

        let err = analyze("int x; int main() { return x(); }").unwrap_err();
        assert_eq!(err, "(Line 1) \"x\" is not a function");

        let err = analyze("int main() { int y; y = main; return y; }").unwrap_err();
        assert_eq!(err, "(Line 1) function \"main\" used as a variable");
    }

    #[test]
    fn test_use_and_init_tracking() {
        let src = "int main() {
            int unused;
            int x;
            x = x + 1;
            return x;
        }";
        let warns = warnings(src);
        assert!(warns.contains(&"(Line 4) \"x\" is uninitialized".to_owned()));
        assert!(warns.contains(&"(Line 2) \"unused\" is unused".to_owned()));
        assert!(!warns.iter().any(|w| w.contains("\"x\" is unused")));
    }

    #[test]
    fn test_params_are_initialized() {
        let src = "int id(int v) { return v; } int main() { return id(3); }";
        assert!(warnings(src).is_empty());
    }
}
