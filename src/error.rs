use std::io;
use thiserror::Error;

/// What exactly is wrong with a rejected command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SyntaxErrorKind {
    #[error("unclosed quotes")]
    UnclosedQuote,
    #[error("trailing backslash")]
    TrailingBackslash,
    #[error("redirection at start of command")]
    RedirectionAtStart,
    #[error("redirection without a target")]
    MissingRedirectionTarget,
}

/// Errors surfaced by the shell.
///
/// Everything except [`ShellError::FatalTerminal`] is contained to a single
/// iteration of the main loop: the message is printed and the next prompt is
/// drawn.
#[derive(Debug, Error)]
pub enum ShellError {
    #[error("syntax error: {0}")]
    Syntax(#[from] SyntaxErrorKind),

    #[error("{0}: command not found")]
    CommandNotFound(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    /// The controlling terminal can no longer be read or restored.
    #[error("terminal failure: {0}")]
    FatalTerminal(io::Error),
}

impl ShellError {
    /// Errors that end the whole session rather than one loop iteration.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ShellError::FatalTerminal(_))
    }
}
