use rustc_hash::FxHashMap;
use thiserror::Error;

use super::types::VarType;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SymbolError {
    #[error("\"{0}\" multiply declared")]
    AlreadyDeclared(String),
}

/// Handle to a [Symbol] owned by a [SymbolTable].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(u32);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymKind {
    Var,
    Func { params: Vec<VarType> },
}

/// Where code generation placed a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    /// Absolute data address of a global.
    Absolute(u16),
    /// Offset from the frame pointer of a local or parameter.
    Frame(i16),
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub line: Option<usize>,
    pub ty: VarType,
    pub kind: SymKind,
    pub is_global: bool,
    pub is_init: bool,
    pub is_used: bool,
    pub is_param: bool,
    /// Number of assignments targeting this symbol anywhere in the program.
    pub writes: u32,
    pub const_val: Option<i16>,
    pub location: Option<Location>,
}

impl Symbol {
    pub fn is_func(&self) -> bool {
        matches!(self.kind, SymKind::Func { .. })
    }

    pub fn params(&self) -> &[VarType] {
        match &self.kind {
            SymKind::Func { params } => params,
            SymKind::Var => &[],
        }
    }
}

/// Scoped name resolution over a table-wide symbol arena.
///
/// Popping a scope only forgets names. The symbols themselves live as long as the table, since
/// the tree keeps referring to them.
#[derive(Debug, Default)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
    scopes: Vec<FxHashMap<String, SymbolId>>,
}

impl SymbolTable {
    fn ensure_scope(&mut self) {
        if self.scopes.is_empty() {
            self.scopes.push(FxHashMap::default());
        }
    }

    pub fn depth(&self) -> usize {
        self.scopes.len().max(1)
    }

    pub fn push_scope(&mut self) {
        self.ensure_scope();
        self.scopes.push(FxHashMap::default());
    }

    pub fn pop_scope(&mut self) {
        self.scopes.pop();
        self.ensure_scope();
    }

    /// Declares `name` in the innermost scope.
    pub fn add_sym(
        &mut self,
        name: &str,
        line: Option<usize>,
        ty: VarType,
        kind: SymKind,
    ) -> Result<SymbolId, SymbolError> {
        self.ensure_scope();
        let is_global = self.scopes.len() == 1;
        let id = SymbolId(self.symbols.len() as u32);
        if let Some(scope) = self.scopes.last_mut() {
            if scope.contains_key(name) {
                return Err(SymbolError::AlreadyDeclared(name.to_owned()));
            }
            scope.insert(name.to_owned(), id);
        }
        self.symbols.push(Symbol {
            name: name.to_owned(),
            line,
            ty,
            kind,
            is_global,
            is_init: false,
            is_used: false,
            is_param: false,
            writes: 0,
            const_val: None,
            location: None,
        });
        Ok(id)
    }

    /// Looks `name` up in the innermost scope only.
    pub fn get_local(&self, name: &str) -> Option<SymbolId> {
        self.scopes.last().and_then(|s| s.get(name)).copied()
    }

    /// Looks `name` up from the innermost scope outwards.
    pub fn get_global(&self, name: &str) -> Option<SymbolId> {
        self.scopes
            .iter()
            .rev()
            .find_map(|s| s.get(name))
            .copied()
    }

    pub fn get(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id.0 as usize]
    }

    /// Every symbol ever declared, in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (SymbolId, &Symbol)> {
        self.symbols
            .iter()
            .enumerate()
            .map(|(i, s)| (SymbolId(i as u32), s))
    }
}
