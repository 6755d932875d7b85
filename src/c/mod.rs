//! The C-subset compiler for RISCII.
//!
//! Compilation runs in fixed stages over one [Session]: lexing, parsing into the [ast::Ast] arena,
//! the semantic pass, the typing pass, constant folding and code generation.

use anyhow::{Context, Result};

use crate::{
    asm::{listing, AsmMaker},
    diag::{Diagnostic, Diagnostics},
};

use self::{ast::Ast, codegen::Codegen, opt::Optimizer, sema::symbol::SymbolTable, sema::Analyzer};

pub mod ast;
pub mod codegen;
pub mod lexer;
pub mod opt;
pub mod parser;
pub mod sema;

/// Compiler switches, as given on the command line.
#[derive(Debug, Clone, Copy, Default)]
pub struct Options {
    /// Enables constant propagation and constant-branch folding.
    pub optimize: bool,
    /// Escalates the first warning to a fatal error.
    pub werror: bool,
}

/// State shared by every stage of one compilation.
pub struct Session {
    pub opts: Options,
    pub diag: Diagnostics,
    pub symbols: SymbolTable,
}

impl Session {
    pub fn new(opts: Options) -> Self {
        Self {
            opts,
            diag: Diagnostics::new(opts.werror),
            symbols: SymbolTable::default(),
        }
    }

    /// Runs every stage up to (but excluding) code generation.
    pub fn front_end(&mut self, src: &str) -> Result<Ast> {
        let toks = lexer::lex(src, &mut self.diag).context("lexing")?;
        let mut ast = parser::parse(&toks, &mut self.diag).context("parsing")?;
        Analyzer::new(&mut ast, self).run()?;
        Optimizer::new(&mut ast, self).run();
        Ok(ast)
    }

    pub fn back_end(&mut self, ast: &Ast) -> Result<AsmMaker> {
        let mut cg = Codegen::new(ast, self);
        cg.gen_program().context("generating code")?;
        Ok(cg.finish())
    }
}

/// Everything a successful compilation produces.
#[derive(Debug)]
pub struct Output {
    pub asm: String,
    pub hex: String,
    pub words: Vec<u16>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Compiles one translation unit.
pub fn compile(src: &str, opts: Options) -> Result<Output> {
    let mut sess = Session::new(opts);
    let ast = sess.front_end(src)?;
    let asm = sess.back_end(&ast)?;
    let words = asm.assemble().context("assembling")?;
    log::info!(
        "{} instructions, {} call macros, {} words",
        asm.num_instrs(),
        asm.num_macros(),
        words.len()
    );
    Ok(Output {
        asm: listing::render_asm(&asm),
        hex: listing::render_hex(&words),
        words,
        diagnostics: sess.diag.all().to_vec(),
    })
}
