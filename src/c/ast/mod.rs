//! The syntax tree, stored as an arena of [Node]s addressed by [NodeId].

use std::ops::{Index, IndexMut};

use bitflags::bitflags;

use super::{
    lexer::{ScanToken, TokenKind},
    sema::{symbol::SymbolId, types::VarType},
};

pub mod build;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

/// The grammar production a node was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeTag {
    Program,
    VarDecl,
    FuncDef,
    Id,
    If,
    While,
    Return,
    Assign,
    Call,
    /// `~x`
    LNot,
    /// `!x`
    BNot,
    /// `-x` or `a - b`
    Minus,
    Lit,
    Plus,
    LShift,
    RShift,
    Grt,
    Lt,
    Geq,
    Leq,
    Eq,
    Neq,
    And,
    Xor,
    Or,
}

bitflags! {
    /// The roles a node can play in its parent.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Caps: u8 {
        const DECL = 0b001;
        const STMT = 0b010;
        const EXPR = 0b100;
    }
}

impl NodeTag {
    pub fn caps(self) -> Caps {
        match self {
            NodeTag::Program => Caps::empty(),
            NodeTag::VarDecl => Caps::DECL | Caps::STMT,
            NodeTag::FuncDef => Caps::DECL,
            NodeTag::If | NodeTag::While | NodeTag::Return | NodeTag::Assign => Caps::STMT,
            NodeTag::Call => Caps::STMT | Caps::EXPR,
            _ => Caps::EXPR,
        }
    }

    /// The operator token of an expression production.
    pub fn from_operator(kind: TokenKind) -> Option<Self> {
        Some(match kind {
            TokenKind::Tilde => NodeTag::LNot,
            TokenKind::Bang => NodeTag::BNot,
            TokenKind::Minus => NodeTag::Minus,
            TokenKind::Plus => NodeTag::Plus,
            TokenKind::LShift => NodeTag::LShift,
            TokenKind::RShift => NodeTag::RShift,
            TokenKind::Grt => NodeTag::Grt,
            TokenKind::Lt => NodeTag::Lt,
            TokenKind::Geq => NodeTag::Geq,
            TokenKind::Leq => NodeTag::Leq,
            TokenKind::Eq => NodeTag::Eq,
            TokenKind::Neq => NodeTag::Neq,
            TokenKind::And => NodeTag::And,
            TokenKind::Xor => NodeTag::Xor,
            TokenKind::Or => NodeTag::Or,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Program {
        decls: Vec<NodeId>,
    },
    VarDecl {
        name: String,
        ty: VarType,
        is_param: bool,
        sym: Option<SymbolId>,
    },
    FuncDef {
        name: String,
        ty: VarType,
        params: Vec<NodeId>,
        body: Vec<NodeId>,
        sym: Option<SymbolId>,
    },
    Id {
        name: String,
        /// The identifier is the target of an assignment.
        is_write: bool,
        sym: Option<SymbolId>,
    },
    Lit {
        text: String,
        /// Filled in by the typing pass.
        value: Option<i32>,
    },
    If {
        cond: NodeId,
        body: Vec<NodeId>,
    },
    While {
        cond: NodeId,
        body: Vec<NodeId>,
    },
    Return {
        value: NodeId,
    },
    Assign {
        target: NodeId,
        value: NodeId,
    },
    Call {
        callee: NodeId,
        args: Vec<NodeId>,
    },
    /// An operator node. `lhs` is unset for unary operators.
    Expr {
        lhs: Option<NodeId>,
        rhs: NodeId,
    },
}

#[derive(Debug, Clone)]
pub struct Node {
    pub tag: NodeTag,
    pub caps: Caps,
    pub line: Option<usize>,
    pub kind: NodeKind,
    /// Inferred by the typing pass, for expressions.
    pub ty: Option<VarType>,
    /// Known value of a constant expression, set by the optimizer.
    pub const_val: Option<i32>,
}

impl Node {
    pub fn new(tag: NodeTag, line: Option<usize>, kind: NodeKind) -> Self {
        Self {
            tag,
            caps: tag.caps(),
            line,
            kind,
            ty: None,
            const_val: None,
        }
    }

    pub fn is_decl(&self) -> bool {
        self.caps.contains(Caps::DECL)
    }

    pub fn is_stmt(&self) -> bool {
        self.caps.contains(Caps::STMT)
    }

    pub fn is_expr(&self) -> bool {
        self.caps.contains(Caps::EXPR)
    }

    /// The symbol a declaration or reference resolved to.
    pub fn sym(&self) -> Option<SymbolId> {
        match &self.kind {
            NodeKind::VarDecl { sym, .. }
            | NodeKind::FuncDef { sym, .. }
            | NodeKind::Id { sym, .. } => *sym,
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct Ast {
    nodes: Vec<Node>,
    root: Option<NodeId>,
}

impl Ast {
    pub fn add(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn set_root(&mut self, id: NodeId) {
        self.root = Some(id);
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Every node in creation order, children before their parents.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (NodeId(i as u32), n))
    }
}

impl Index<NodeId> for Ast {
    type Output = Node;

    fn index(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }
}

impl IndexMut<NodeId> for Ast {
    fn index_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0 as usize]
    }
}

/// One item of the parser's build-stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildItem {
    Token(ScanToken),
    Node(NodeId),
}

/// The LIFO sequence of tokens and finished nodes that node constructors consume.
#[derive(Debug, Default)]
pub struct BuildStack {
    items: Vec<BuildItem>,
}

impl BuildStack {
    pub fn push(&mut self, item: BuildItem) {
        self.items.push(item);
    }

    pub fn pop(&mut self) -> Option<BuildItem> {
        self.items.pop()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
