//! The session object and the read–parse–execute loop.

use anyhow::{Context, Result};
use slog::{debug, Logger};

use crate::builtin::BuiltinTable;
use crate::completion::CompletionEngine;
use crate::editor::{self, ReadOutcome};
use crate::env::Environment;
use crate::error::ShellError;
use crate::executor;
use crate::parser;
use crate::terminal::{Prompt, Terminal};

/// The interactive shell session.
///
/// Owns every piece of process-wide mutable state: the saved terminal
/// attributes, the double-TAB memory, and the builtin table. All of it is
/// touched only from [`Interpreter::repl`], which runs one command to
/// completion (descriptor restoration included) before drawing the next
/// prompt.
pub struct Interpreter {
    env: Environment,
    terminal: Terminal,
    builtins: BuiltinTable,
    completion: CompletionEngine,
    logger: Logger,
}

impl Interpreter {
    pub fn new(logger: Logger) -> Result<Self> {
        let terminal =
            Terminal::new().context("failed to inspect the controlling terminal")?;
        let builtins = BuiltinTable::new();
        let env = Environment::new();
        let completion = CompletionEngine::new(builtins.names().collect(), env.clone());
        Ok(Self {
            env,
            terminal,
            builtins,
            completion,
            logger,
        })
    }

    /// Run the interactive loop until `exit`, end-of-file, or a fatal
    /// terminal failure.
    ///
    /// Returns the status the process should exit with. Syntax and I/O
    /// errors are reported to stderr and confined to their own iteration.
    pub fn repl(&mut self) -> Result<i32> {
        loop {
            let prompt = Prompt::new(&self.env.current_dir(), self.terminal.is_interactive());
            let line = match editor::read_line(&mut self.terminal, &mut self.completion, &prompt)
            {
                Ok(ReadOutcome::Line(line)) => line,
                Ok(ReadOutcome::Eof) => return Ok(0),
                Err(err) => {
                    return Err(ShellError::FatalTerminal(err))
                        .context("cannot read from the controlling terminal");
                }
            };
            self.completion.reset();
            if line.trim().is_empty() {
                continue;
            }
            debug!(self.logger, "accepted line"; "bytes" => line.len());

            match parser::parse_line(&line) {
                Ok(invocation) => {
                    debug!(self.logger, "parsed";
                        "argc" => invocation.argv.len(),
                        "redirected" => !invocation.redir.is_empty());
                    match executor::process_invocation(
                        &invocation,
                        &mut self.env,
                        &self.builtins,
                        &self.logger,
                    ) {
                        Ok(status) => {
                            debug!(self.logger, "command finished"; "status" => status);
                        }
                        Err(err) => eprintln!("conch: {err}"),
                    }
                }
                Err(err) => eprintln!("conch: {err}"),
            }
        }
    }
}
