//! Terminal control: the saved attribute state, the raw-mode guard, and the
//! escape-sequence output used to draw the prompt and the edited line.

use std::io::{self, Write};
use std::os::fd::AsRawFd;
use std::path::Path;

use nix::sys::termios::{
    self, ControlFlags, InputFlags, LocalFlags, OutputFlags, SetArg, SpecialCharacterIndices,
    Termios,
};
use nix::unistd;

/// Terminal state owned by the session.
///
/// Captures the original attributes once at startup and tracks whether raw
/// mode is currently in force. All raw-mode entries go through
/// [`Terminal::raw_guard`] so the attributes are restored on every exit
/// path, panics included.
pub struct Terminal {
    saved: Option<Termios>,
    raw_enabled: bool,
    interactive: bool,
}

impl Terminal {
    pub fn new() -> io::Result<Self> {
        let stdin = io::stdin();
        let interactive = unistd::isatty(stdin.as_raw_fd()).unwrap_or(false);
        let saved = if interactive {
            Some(termios::tcgetattr(&stdin).map_err(io::Error::from)?)
        } else {
            None
        };
        Ok(Self {
            saved,
            raw_enabled: false,
            interactive,
        })
    }

    /// Whether stdin is a tty. Without one the editor falls back to plain
    /// buffered reads and the prompt loses its styling.
    pub fn is_interactive(&self) -> bool {
        self.interactive
    }

    /// Enter raw mode and return a guard that restores the saved attributes
    /// when dropped.
    pub fn raw_guard(&mut self) -> io::Result<RawModeGuard<'_>> {
        self.enter_raw()?;
        Ok(RawModeGuard { terminal: self })
    }

    fn enter_raw(&mut self) -> io::Result<()> {
        let Some(saved) = &self.saved else {
            return Ok(());
        };
        if self.raw_enabled {
            return Ok(());
        }
        let mut raw = saved.clone();
        raw.input_flags &= !(InputFlags::BRKINT
            | InputFlags::ICRNL
            | InputFlags::INPCK
            | InputFlags::ISTRIP
            | InputFlags::IXON);
        raw.output_flags &= !OutputFlags::OPOST;
        raw.control_flags |= ControlFlags::CS8;
        raw.local_flags &=
            !(LocalFlags::ECHO | LocalFlags::ICANON | LocalFlags::IEXTEN | LocalFlags::ISIG);
        raw.control_chars[SpecialCharacterIndices::VMIN as usize] = 1;
        raw.control_chars[SpecialCharacterIndices::VTIME as usize] = 0;
        termios::tcsetattr(&io::stdin(), SetArg::TCSAFLUSH, &raw).map_err(io::Error::from)?;
        self.raw_enabled = true;
        Ok(())
    }

    /// Restore the original attributes if raw mode is in force.
    pub fn restore(&mut self) -> io::Result<()> {
        if !self.raw_enabled {
            return Ok(());
        }
        if let Some(saved) = &self.saved {
            termios::tcsetattr(&io::stdin(), SetArg::TCSAFLUSH, saved).map_err(io::Error::from)?;
        }
        self.raw_enabled = false;
        Ok(())
    }
}

/// Scoped raw mode. Dropping the guard performs a best-effort restore.
pub struct RawModeGuard<'a> {
    terminal: &'a mut Terminal,
}

impl Drop for RawModeGuard<'_> {
    fn drop(&mut self) {
        let _ = self.terminal.restore();
    }
}

/// The rendered prompt plus its visible width, which the redraw logic needs
/// to place the cursor (the styling escapes take no columns).
pub struct Prompt {
    pub text: String,
    pub width: usize,
}

impl Prompt {
    pub fn new(cwd: &Path, interactive: bool) -> Self {
        if interactive {
            let dir = cwd.display().to_string();
            Self {
                width: dir.len() + 2,
                text: format!("\x1b[1;32m{dir}\x1b[0m$ "),
            }
        } else {
            Self {
                width: 2,
                text: "$ ".to_string(),
            }
        }
    }
}

/// Redraw the prompt and buffer after an edit.
///
/// Carriage return, prompt, buffer, erase the rest of the line (the old
/// buffer may have been longer), then move the cursor to prompt width plus
/// byte offset.
pub fn refresh_line<W: Write>(
    out: &mut W,
    prompt: &Prompt,
    buffer: &[u8],
    cursor: usize,
) -> io::Result<()> {
    out.write_all(b"\r")?;
    out.write_all(prompt.text.as_bytes())?;
    out.write_all(buffer)?;
    out.write_all(b"\x1b[K")?;
    let col = prompt.width + cursor;
    write!(out, "\r\x1b[{col}C")?;
    out.flush()
}

pub fn clear_screen<W: Write>(out: &mut W) -> io::Result<()> {
    out.write_all(b"\x1b[2J\x1b[H")?;
    out.flush()
}

pub fn bell<W: Write>(out: &mut W) -> io::Result<()> {
    out.write_all(b"\x07")?;
    out.flush()
}
