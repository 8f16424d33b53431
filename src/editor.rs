//! Raw-mode line editing: an editable byte buffer with a cursor, and the
//! key-dispatch loop that fills it one byte at a time.

use std::io::{self, BufRead, Read, Write};

use crate::completion::CompletionEngine;
use crate::terminal::{self, Prompt, Terminal};

const INITIAL_CAPACITY: usize = 1024;

const CTRL_A: u8 = 0x01;
const CTRL_B: u8 = 0x02;
const CTRL_C: u8 = 0x03;
const CTRL_D: u8 = 0x04;
const CTRL_E: u8 = 0x05;
const CTRL_F: u8 = 0x06;
const CTRL_H: u8 = 0x08;
const TAB: u8 = 0x09;
const CTRL_K: u8 = 0x0b;
const CTRL_L: u8 = 0x0c;
const CTRL_U: u8 = 0x15;
const CTRL_W: u8 = 0x17;
const ESC: u8 = 0x1b;
const BACKSPACE: u8 = 0x7f;

/// Editable line with a byte cursor.
///
/// Editing is byte-addressed; multi-byte UTF-8 input is stored as-is and
/// edited one byte at a time. The cursor is always within `0..=len`.
#[derive(Debug, Default)]
pub struct LineBuffer {
    bytes: Vec<u8>,
    cursor: usize,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self {
            bytes: Vec::with_capacity(INITIAL_CAPACITY),
            cursor: 0,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }

    pub fn insert(&mut self, b: u8) {
        self.bytes.insert(self.cursor, b);
        self.cursor += 1;
    }

    /// Delete the byte before the cursor. Returns whether anything changed.
    pub fn delete_back(&mut self) -> bool {
        if self.cursor == 0 {
            return false;
        }
        self.cursor -= 1;
        self.bytes.remove(self.cursor);
        true
    }

    /// Delete the byte under the cursor (the Delete key).
    pub fn delete_forward(&mut self) -> bool {
        if self.cursor >= self.bytes.len() {
            return false;
        }
        self.bytes.remove(self.cursor);
        true
    }

    pub fn move_left(&mut self) -> bool {
        if self.cursor == 0 {
            return false;
        }
        self.cursor -= 1;
        true
    }

    pub fn move_right(&mut self) -> bool {
        if self.cursor >= self.bytes.len() {
            return false;
        }
        self.cursor += 1;
        true
    }

    pub fn move_home(&mut self) {
        self.cursor = 0;
    }

    pub fn move_end(&mut self) {
        self.cursor = self.bytes.len();
    }

    pub fn kill_to_end(&mut self) {
        self.bytes.truncate(self.cursor);
    }

    pub fn kill_to_start(&mut self) {
        self.bytes.drain(..self.cursor);
        self.cursor = 0;
    }

    /// Delete the word before the cursor: skip whitespace backwards, then
    /// the word itself.
    pub fn kill_prev_word(&mut self) {
        let mut start = self.cursor;
        while start > 0 && self.bytes[start - 1].is_ascii_whitespace() {
            start -= 1;
        }
        while start > 0 && !self.bytes[start - 1].is_ascii_whitespace() {
            start -= 1;
        }
        self.bytes.drain(start..self.cursor);
        self.cursor = start;
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
        self.cursor = 0;
    }

    /// Replace the byte range `start..end` with `replacement` and leave the
    /// cursor right after it.
    pub fn replace_range(&mut self, start: usize, end: usize, replacement: &str) {
        self.bytes.splice(start..end, replacement.bytes());
        self.cursor = start + replacement.len();
    }
}

/// Result of one [`read_line`] call.
#[derive(Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    Line(String),
    Eof,
}

/// Read one logical line from the terminal.
///
/// On a tty this enters raw mode for the duration of the call and runs the
/// key-dispatch loop; otherwise it reads a plain buffered line so that
/// piped input keeps working.
pub fn read_line(
    terminal: &mut Terminal,
    completion: &mut CompletionEngine,
    prompt: &Prompt,
) -> io::Result<ReadOutcome> {
    if !terminal.is_interactive() {
        return read_plain_line(prompt);
    }

    let _raw = terminal.raw_guard()?;
    let mut out = io::stdout();
    let mut input = io::stdin();
    out.write_all(prompt.text.as_bytes())?;
    out.flush()?;

    let mut buf = LineBuffer::new();
    loop {
        let Some(byte) = read_byte(&mut input)? else {
            // the terminal went away mid-line
            out.write_all(b"\r\n")?;
            out.flush()?;
            return Ok(ReadOutcome::Eof);
        };
        match byte {
            b'\r' | b'\n' => {
                out.write_all(b"\r\n")?;
                out.flush()?;
                return Ok(ReadOutcome::Line(buf.text()));
            }
            CTRL_C => {
                out.write_all(b"^C\r\n")?;
                buf.clear();
                out.write_all(prompt.text.as_bytes())?;
                out.flush()?;
            }
            CTRL_D => {
                if buf.is_empty() {
                    out.write_all(b"\r\n")?;
                    out.flush()?;
                    return Ok(ReadOutcome::Eof);
                }
            }
            CTRL_H | BACKSPACE => {
                if buf.delete_back() {
                    terminal::refresh_line(&mut out, prompt, buf.as_bytes(), buf.cursor())?;
                }
            }
            TAB => {
                completion.complete(&mut buf, prompt, &mut out)?;
            }
            ESC => match read_escape(&mut input)? {
                EscapeKey::Left => {
                    if buf.move_left() {
                        terminal::refresh_line(&mut out, prompt, buf.as_bytes(), buf.cursor())?;
                    }
                }
                EscapeKey::Right => {
                    if buf.move_right() {
                        terminal::refresh_line(&mut out, prompt, buf.as_bytes(), buf.cursor())?;
                    }
                }
                EscapeKey::Home => {
                    buf.move_home();
                    terminal::refresh_line(&mut out, prompt, buf.as_bytes(), buf.cursor())?;
                }
                EscapeKey::End => {
                    buf.move_end();
                    terminal::refresh_line(&mut out, prompt, buf.as_bytes(), buf.cursor())?;
                }
                EscapeKey::Delete => {
                    if buf.delete_forward() {
                        terminal::refresh_line(&mut out, prompt, buf.as_bytes(), buf.cursor())?;
                    }
                }
                EscapeKey::None => {}
            },
            CTRL_A => {
                buf.move_home();
                terminal::refresh_line(&mut out, prompt, buf.as_bytes(), buf.cursor())?;
            }
            CTRL_E => {
                buf.move_end();
                terminal::refresh_line(&mut out, prompt, buf.as_bytes(), buf.cursor())?;
            }
            CTRL_B => {
                if buf.move_left() {
                    terminal::refresh_line(&mut out, prompt, buf.as_bytes(), buf.cursor())?;
                }
            }
            CTRL_F => {
                if buf.move_right() {
                    terminal::refresh_line(&mut out, prompt, buf.as_bytes(), buf.cursor())?;
                }
            }
            CTRL_K => {
                buf.kill_to_end();
                terminal::refresh_line(&mut out, prompt, buf.as_bytes(), buf.cursor())?;
            }
            CTRL_U => {
                buf.kill_to_start();
                terminal::refresh_line(&mut out, prompt, buf.as_bytes(), buf.cursor())?;
            }
            CTRL_W => {
                buf.kill_prev_word();
                terminal::refresh_line(&mut out, prompt, buf.as_bytes(), buf.cursor())?;
            }
            CTRL_L => {
                terminal::clear_screen(&mut out)?;
                terminal::refresh_line(&mut out, prompt, buf.as_bytes(), buf.cursor())?;
            }
            b if b >= 0x20 && b != BACKSPACE => {
                // printable ASCII plus UTF-8 continuation bytes
                buf.insert(b);
                terminal::refresh_line(&mut out, prompt, buf.as_bytes(), buf.cursor())?;
            }
            _ => {}
        }
    }
}

fn read_plain_line(prompt: &Prompt) -> io::Result<ReadOutcome> {
    let mut out = io::stdout();
    out.write_all(prompt.text.as_bytes())?;
    out.flush()?;
    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        return Ok(ReadOutcome::Eof);
    }
    while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
    }
    Ok(ReadOutcome::Line(line))
}

fn read_byte(input: &mut impl Read) -> io::Result<Option<u8>> {
    let mut byte = [0u8; 1];
    loop {
        match input.read(&mut byte) {
            Ok(0) => return Ok(None),
            Ok(_) => return Ok(Some(byte[0])),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

enum EscapeKey {
    Left,
    Right,
    Home,
    End,
    Delete,
    None,
}

/// Decode the remainder of an escape sequence.
///
/// Understands CSI `A`/`B`/`C`/`D`/`H`/`F`, CSI `<digits>~` and SS3
/// `A`..`F`. Up and down map to `None` for now, as does anything
/// unrecognised, which is simply dropped without touching the buffer.
fn read_escape(input: &mut impl Read) -> io::Result<EscapeKey> {
    let Some(first) = read_byte(input)? else {
        return Ok(EscapeKey::None);
    };
    match first {
        b'[' => {
            let Some(second) = read_byte(input)? else {
                return Ok(EscapeKey::None);
            };
            if second.is_ascii_digit() {
                let mut code = (second - b'0') as u32;
                loop {
                    match read_byte(input)? {
                        Some(b'~') => break,
                        Some(d) if d.is_ascii_digit() => code = code * 10 + (d - b'0') as u32,
                        _ => return Ok(EscapeKey::None),
                    }
                }
                Ok(match code {
                    1 | 15 => EscapeKey::Home,
                    3 => EscapeKey::Delete,
                    4 | 17 => EscapeKey::End,
                    _ => EscapeKey::None,
                })
            } else {
                Ok(match second {
                    b'C' => EscapeKey::Right,
                    b'D' => EscapeKey::Left,
                    b'H' => EscapeKey::Home,
                    b'F' => EscapeKey::End,
                    _ => EscapeKey::None,
                })
            }
        }
        b'O' => {
            let Some(second) = read_byte(input)? else {
                return Ok(EscapeKey::None);
            };
            Ok(match second {
                b'C' => EscapeKey::Right,
                b'D' => EscapeKey::Left,
                b'H' => EscapeKey::Home,
                b'F' => EscapeKey::End,
                _ => EscapeKey::None,
            })
        }
        _ => Ok(EscapeKey::None),
    }
}
