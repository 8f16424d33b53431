//! Turning one raw command line into an [`Invocation`].
//!
//! Parsing happens in two quote-aware passes. The first pass scans for
//! redirection operators and records their byte spans together with the span
//! of the following target word; the line itself is never rewritten in
//! place. The second pass splits whatever text remains into `argv` using the
//! rules in [`crate::lexer`].

use crate::error::{ShellError, SyntaxErrorKind};
use crate::lexer;

/// Where one redirected stream should go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirTarget {
    pub path: String,
    pub append: bool,
}

/// Output redirections requested by one command line.
///
/// The two streams are independent; neither, either or both may be set.
/// Standard input is never redirected.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Redirection {
    pub stdout: Option<RedirTarget>,
    pub stderr: Option<RedirTarget>,
}

impl Redirection {
    pub fn is_empty(&self) -> bool {
        self.stdout.is_none() && self.stderr.is_none()
    }
}

/// The parsed form of one command line: dequoted arguments plus the
/// redirections that were stripped out of it.
///
/// An empty line parses to an `Invocation` with empty `argv` and no
/// redirections, which executes as a no-op.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Invocation {
    pub argv: Vec<String>,
    pub redir: Redirection,
}

impl Invocation {
    pub fn is_empty(&self) -> bool {
        self.argv.is_empty()
    }

    /// The command name, when the line had one.
    pub fn command(&self) -> Option<&str> {
        self.argv.first().map(String::as_str)
    }

    /// Render back to a command line that reparses to the same invocation.
    pub fn to_command_line(&self) -> String {
        let mut parts: Vec<String> = self.argv.iter().map(|w| lexer::quote_word(w)).collect();
        if let Some(target) = &self.redir.stdout {
            let op = if target.append { ">>" } else { ">" };
            parts.push(format!("{op} {}", lexer::quote_word(&target.path)));
        }
        if let Some(target) = &self.redir.stderr {
            let op = if target.append { "2>>" } else { "2>" };
            parts.push(format!("{op} {}", lexer::quote_word(&target.path)));
        }
        parts.join(" ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

/// One redirection operator found by the pre-scan. `start..end` covers the
/// operator itself, fd digit included.
#[derive(Debug)]
struct OperatorSpan {
    start: usize,
    end: usize,
    stream: Stream,
    append: bool,
}

/// Parse one line into an [`Invocation`].
pub fn parse_line(input: &str) -> Result<Invocation, ShellError> {
    let bytes = input.as_bytes();
    let spans = scan_operators(input)?;

    let mut redir = Redirection::default();
    let mut excised: Vec<(usize, usize)> = Vec::new();
    for (idx, span) in spans.iter().enumerate() {
        let limit = spans
            .get(idx + 1)
            .map(|next| next.start)
            .unwrap_or(bytes.len());
        let (path, end) = take_target_word(bytes, span.end, limit)?;
        let target = RedirTarget {
            path,
            append: span.append,
        };
        // several operators on the same stream: the last one wins
        match span.stream {
            Stream::Stdout => redir.stdout = Some(target),
            Stream::Stderr => redir.stderr = Some(target),
        }
        excised.push((span.start, end));
    }

    let mut remainder = Vec::with_capacity(bytes.len());
    let mut pos = 0;
    for (start, end) in &excised {
        remainder.extend_from_slice(&bytes[pos..*start]);
        pos = *end;
    }
    remainder.extend_from_slice(&bytes[pos..]);
    let remainder = String::from_utf8_lossy(&remainder).into_owned();

    let argv = lexer::split_words(&remainder)?;
    Ok(Invocation { argv, redir })
}

/// Quote-aware scan for redirection operators.
///
/// A `>` counts as an operator only when it sits outside quotes and is
/// preceded by whitespace, start of input, or an fd digit (`1` or `2`) that
/// is itself at start of input or preceded by whitespace; the digit is then
/// consumed as part of the operator. A second `>` selects append mode. An
/// operator at the first non-whitespace position is rejected.
///
/// The scan doubles as the line validator: unclosed quotes and a trailing
/// backslash are reported here, before any argument splitting.
fn scan_operators(input: &str) -> Result<Vec<OperatorSpan>, ShellError> {
    let bytes = input.as_bytes();
    let first_word_start = bytes.iter().position(|b| !b.is_ascii_whitespace());
    let mut spans = Vec::new();
    let mut in_single = false;
    let mut in_double = false;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if b == b'\\' && !in_single {
            if i + 1 >= bytes.len() {
                return Err(SyntaxErrorKind::TrailingBackslash.into());
            }
            i += 2;
            continue;
        }
        match b {
            b'\'' if !in_double => in_single = !in_single,
            b'"' if !in_single => in_double = !in_double,
            b'>' if !in_single && !in_double => {
                let digit = (i > 0
                    && matches!(bytes[i - 1], b'1' | b'2')
                    && (i == 1 || is_blank(bytes[i - 2])))
                .then(|| bytes[i - 1]);
                let is_operator = digit.is_some() || i == 0 || is_blank(bytes[i - 1]);
                if is_operator {
                    let start = if digit.is_some() { i - 1 } else { i };
                    if Some(start) == first_word_start {
                        return Err(SyntaxErrorKind::RedirectionAtStart.into());
                    }
                    let append = bytes.get(i + 1) == Some(&b'>');
                    let end = if append { i + 2 } else { i + 1 };
                    let stream = if digit == Some(b'2') {
                        Stream::Stderr
                    } else {
                        Stream::Stdout
                    };
                    spans.push(OperatorSpan {
                        start,
                        end,
                        stream,
                        append,
                    });
                    i = end;
                    continue;
                }
            }
            _ => {}
        }
        i += 1;
    }

    if in_single || in_double {
        return Err(SyntaxErrorKind::UnclosedQuote.into());
    }
    Ok(spans)
}

/// Extract the dequoted target word following an operator.
///
/// Leading blanks are skipped; the word ends at the next unescaped blank, at
/// `limit` (the start of the next operator), or at end of input. A missing
/// word is a syntax error.
fn take_target_word(
    bytes: &[u8],
    from: usize,
    limit: usize,
) -> Result<(String, usize), ShellError> {
    let mut pos = from;
    while pos < limit && is_blank(bytes[pos]) {
        pos += 1;
    }
    if pos >= limit {
        return Err(SyntaxErrorKind::MissingRedirectionTarget.into());
    }

    let mut word = Vec::new();
    let mut in_single = false;
    let mut in_double = false;
    while pos < limit {
        let b = bytes[pos];
        if b == b'\\' && !in_single {
            if pos + 1 >= bytes.len() {
                return Err(SyntaxErrorKind::TrailingBackslash.into());
            }
            let next = bytes[pos + 1];
            if in_double && !matches!(next, b'\\' | b'"' | b'$' | b'\n') {
                word.push(b'\\');
            }
            word.push(next);
            pos += 2;
            continue;
        }
        match b {
            b'\'' if !in_double => in_single = !in_single,
            b'"' if !in_single => in_double = !in_double,
            b' ' | b'\t' if !in_single && !in_double => break,
            _ => word.push(b),
        }
        pos += 1;
    }
    Ok((String::from_utf8_lossy(&word).into_owned(), pos))
}

fn is_blank(b: u8) -> bool {
    b == b' ' || b == b'\t'
}
