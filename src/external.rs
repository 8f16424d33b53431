//! Locating and running external programs.

use std::os::unix::fs::PermissionsExt;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

use crate::error::ShellError;

/// Resolve a command name the way the shell looks things up: a name
/// containing `/` is checked directly, anything else is searched left to
/// right through the given `PATH` value.
pub fn find_executable(search_path: Option<&str>, name: &str) -> Option<PathBuf> {
    if name.contains('/') {
        let path = Path::new(name);
        return is_executable(path).then(|| path.to_path_buf());
    }
    let search = search_path?;
    for dir in std::env::split_paths(search) {
        let candidate = dir.join(name);
        if is_executable(&candidate) {
            return Some(candidate);
        }
    }
    None
}

/// A regular file with any execute bit set.
pub fn is_executable(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// Run a resolved external command and report its exit status.
///
/// The child inherits the (possibly redirected) standard descriptors and
/// receives the parsed argv unchanged, command name included. The shell
/// blocks until the child exits.
pub fn run(path: &Path, argv: &[String]) -> Result<i32, ShellError> {
    let mut command = Command::new(path);
    command.arg0(&argv[0]).args(&argv[1..]);
    let mut child = command.spawn().map_err(ShellError::Io)?;
    let status = child.wait().map_err(ShellError::Io)?;
    Ok(exit_code(status))
}

fn exit_code(status: ExitStatus) -> i32 {
    match status.code() {
        Some(code) => code,
        None => status.signal().map(|sig| 128 + sig).unwrap_or(1),
    }
}
