//! Lexical scanning of command lines.
//!
//! A single left-to-right pass splits a line into words while honouring the
//! three quoting contexts:
//!
//! * inside single quotes every byte is literal and only `'` ends the state;
//! * inside double quotes a backslash escapes only `\`, `"`, `$` and newline,
//!   any other pair is kept verbatim;
//! * outside quotes a backslash escapes any single byte and unescaped
//!   spaces/tabs separate words.
//!
//! The inverse operation, [`quote_word`], renders a word back into a form
//! that survives a round trip through [`split_words`].

use crate::error::{ShellError, SyntaxErrorKind};

/// Split a line into dequoted words.
///
/// Empty words (e.g. `''` standing alone, or runs of separators) are
/// suppressed. Unterminated quotes and a trailing backslash are rejected.
pub fn split_words(input: &str) -> Result<Vec<String>, ShellError> {
    let bytes = input.as_bytes();
    let mut words = Vec::new();
    let mut current: Vec<u8> = Vec::new();
    let mut in_single = false;
    let mut in_double = false;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if b == b'\\' && !in_single {
            if i + 1 >= bytes.len() {
                return Err(SyntaxErrorKind::TrailingBackslash.into());
            }
            let next = bytes[i + 1];
            if in_double && !matches!(next, b'\\' | b'"' | b'$' | b'\n') {
                current.push(b'\\');
            }
            current.push(next);
            i += 2;
            continue;
        }
        match b {
            b'\'' if !in_double => in_single = !in_single,
            b'"' if !in_single => in_double = !in_double,
            b' ' | b'\t' if !in_single && !in_double => {
                if !current.is_empty() {
                    words.push(take_word(&mut current));
                }
            }
            _ => current.push(b),
        }
        i += 1;
    }

    if in_single || in_double {
        return Err(SyntaxErrorKind::UnclosedQuote.into());
    }
    if !current.is_empty() {
        words.push(take_word(&mut current));
    }
    Ok(words)
}

fn take_word(bytes: &mut Vec<u8>) -> String {
    String::from_utf8_lossy(&std::mem::take(bytes)).into_owned()
}

/// Render a word so that [`split_words`] reproduces it exactly.
///
/// Plain words pass through untouched; anything containing a separator,
/// quote, escape or operator byte is wrapped in single quotes, with embedded
/// single quotes spliced out as `'\''`.
pub fn quote_word(word: &str) -> String {
    if !word.is_empty() && word.bytes().all(is_plain_byte) {
        return word.to_string();
    }
    let mut quoted = String::with_capacity(word.len() + 2);
    quoted.push('\'');
    for ch in word.chars() {
        if ch == '\'' {
            quoted.push_str("'\\''");
        } else {
            quoted.push(ch);
        }
    }
    quoted.push('\'');
    quoted
}

fn is_plain_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric()
        || matches!(
            b,
            b'_' | b'-' | b'.' | b'/' | b':' | b'=' | b'+' | b',' | b'%' | b'@' | b'^'
        )
}
