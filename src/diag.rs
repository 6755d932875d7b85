//! The diagnostic sink shared by every compilation stage.
//!
//! Every message is logged through the [log] facade. Warnings are also recorded so that callers
//! can inspect them after a successful run. Fatal diagnostics come back as a [CompError] for the
//! caller to propagate.

use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Shown in verbose mode only.
    Info,
    /// Shown always, fatal under warnings-as-errors.
    Warn,
    /// A user error. Always fatal.
    Err,
    /// A bug in the compiler itself. Always fatal.
    Assert,
}

/// One logged message, with the 1-based source line it refers to (if known).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub line: Option<usize>,
    pub msg: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "(Line {line}) {}", self.msg),
            None => f.write_str(&self.msg),
        }
    }
}

/// A diagnostic that ends the compilation.
#[derive(Debug, Error)]
pub enum CompError {
    #[error("{0}")]
    Fatal(Diagnostic),
    #[error("{0} (warnings are errors)")]
    Werror(Diagnostic),
    #[error("internal error: {0}")]
    Internal(String),
}

impl CompError {
    pub fn internal(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        log::error!("internal error: {msg}");
        Self::Internal(msg)
    }
}

#[derive(Debug, Default)]
pub struct Diagnostics {
    werror: bool,
    recorded: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new(werror: bool) -> Self {
        Self {
            werror,
            recorded: vec![],
        }
    }

    fn record(&mut self, severity: Severity, line: Option<usize>, msg: String) -> Diagnostic {
        let diag = Diagnostic {
            severity,
            line,
            msg,
        };
        self.recorded.push(diag.clone());
        diag
    }

    pub fn info(&mut self, line: Option<usize>, msg: impl fmt::Display) {
        let diag = self.record(Severity::Info, line, msg.to_string());
        log::info!("{diag}");
    }

    /// Logs a warning.
    ///
    /// # Errors
    ///
    /// Fails with [CompError::Werror] when warnings are treated as errors.
    pub fn warn(&mut self, line: Option<usize>, msg: impl fmt::Display) -> Result<(), CompError> {
        let diag = self.record(Severity::Warn, line, msg.to_string());
        if self.werror {
            log::error!("{diag}");
            return Err(CompError::Werror(diag));
        }
        log::warn!("{diag}");
        Ok(())
    }

    /// Logs a fatal user error and hands it back for propagation.
    pub fn fatal(&mut self, line: Option<usize>, msg: impl fmt::Display) -> CompError {
        let diag = self.record(Severity::Err, line, msg.to_string());
        log::error!("{diag}");
        CompError::Fatal(diag)
    }

    pub fn all(&self) -> &[Diagnostic] {
        &self.recorded
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.recorded
            .iter()
            .filter(|d| d.severity == Severity::Warn)
    }
}
