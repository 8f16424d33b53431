//! Built-in commands and their dispatch table.
//!
//! Builtins run inside the shell process. Each handler receives the full
//! argv, the environment view and a writer standing in for stdout; error
//! text goes to stderr directly, which the redirection machinery has
//! already pointed at the right place.

use std::io::Write;

use crate::env::Environment;
use crate::external;

pub type BuiltinFn = fn(&[String], &mut Environment, &mut dyn Write) -> i32;

pub struct Builtin {
    pub name: &'static str,
    pub run: BuiltinFn,
    pub help: &'static str,
}

const BUILTINS: &[Builtin] = &[
    Builtin {
        name: "cd",
        run: builtin_cd,
        help: "Change the current directory",
    },
    Builtin {
        name: "echo",
        run: builtin_echo,
        help: "Display a line of text",
    },
    Builtin {
        name: "exit",
        run: builtin_exit,
        help: "Exit the shell",
    },
    Builtin {
        name: "help",
        run: builtin_help,
        help: "Display help for built-in commands",
    },
    Builtin {
        name: "pwd",
        run: builtin_pwd,
        help: "Print the current working directory",
    },
    Builtin {
        name: "type",
        run: builtin_type,
        help: "Display information about command type",
    },
];

/// The immutable name-to-handler table, built once at startup.
#[derive(Default)]
pub struct BuiltinTable;

impl BuiltinTable {
    pub fn new() -> Self {
        Self
    }

    pub fn find(&self, name: &str) -> Option<&'static Builtin> {
        BUILTINS.iter().find(|b| b.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> {
        BUILTINS.iter().map(|b| b.name)
    }
}

fn builtin_cd(argv: &[String], env: &mut Environment, _out: &mut dyn Write) -> i32 {
    let arg = argv.get(1).map(String::as_str).unwrap_or("");
    let target = if arg.is_empty() || arg == "~" {
        match env.home() {
            Some(home) => home,
            None => {
                eprintln!("cd: HOME not set");
                return 1;
            }
        }
    } else if arg.starts_with("~/") {
        match env.home() {
            Some(home) => format!("{home}{}", &arg[1..]),
            None => {
                eprintln!("cd: HOME not set");
                return 1;
            }
        }
    } else {
        arg.to_string()
    };
    if std::env::set_current_dir(&target).is_err() {
        eprintln!("cd: {target}: No such file or directory");
        return 1;
    }
    0
}

fn builtin_echo(argv: &[String], _env: &mut Environment, out: &mut dyn Write) -> i32 {
    let line = argv[1..].join(" ");
    if writeln!(out, "{line}").is_err() {
        return 1;
    }
    0
}

fn builtin_pwd(_argv: &[String], _env: &mut Environment, out: &mut dyn Write) -> i32 {
    match std::env::current_dir() {
        Ok(dir) => {
            let _ = writeln!(out, "{}", dir.display());
            0
        }
        Err(_) => {
            eprintln!("pwd: unable to get current directory");
            1
        }
    }
}

fn builtin_exit(argv: &[String], _env: &mut Environment, _out: &mut dyn Write) -> i32 {
    std::process::exit(exit_status(argv.get(1).map(String::as_str)));
}

/// Status for `exit [n]`: 0 with no argument, the number itself when
/// numeric, 2 after a complaint otherwise.
fn exit_status(arg: Option<&str>) -> i32 {
    match arg {
        None => 0,
        Some(text) => match text.parse::<i32>() {
            Ok(code) => code,
            Err(_) => {
                eprintln!("exit: {text}: numeric argument required");
                2
            }
        },
    }
}

fn builtin_type(argv: &[String], env: &mut Environment, out: &mut dyn Write) -> i32 {
    if argv.len() < 2 {
        eprintln!("type: missing command name");
        return 1;
    }
    let mut status = 0;
    for name in &argv[1..] {
        if BUILTINS.iter().any(|b| b.name == name.as_str()) {
            let _ = writeln!(out, "{name} is a shell builtin");
        } else if let Some(path) =
            external::find_executable(env.search_path().as_deref(), name)
        {
            let _ = writeln!(out, "{name} is {}", path.display());
        } else {
            let _ = writeln!(out, "{name}: not found");
            status = 1;
        }
    }
    status
}

fn builtin_help(argv: &[String], _env: &mut Environment, out: &mut dyn Write) -> i32 {
    if argv.len() == 1 {
        let _ = writeln!(out, "Shell built-in commands:");
        for b in BUILTINS {
            let _ = writeln!(out, "  {:<10} {}", b.name, b.help);
        }
        let _ = writeln!(
            out,
            "\nType 'help name' to find out more about the function 'name'."
        );
        return 0;
    }
    for name in &argv[1..] {
        match BUILTINS.iter().find(|b| b.name == name.as_str()) {
            Some(b) => {
                let _ = writeln!(out, "{}: {}", b.name, b.help);
            }
            None => {
                eprintln!("help: no help topics match '{name}'");
                return 1;
            }
        }
    }
    0
}
