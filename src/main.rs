use argh::FromArgs;
use slog::{o, Drain, Logger};

use conch::Interpreter;

/// An interactive POSIX-style command shell with raw-mode line editing and
/// TAB completion.
#[derive(FromArgs)]
struct Options {
    /// enable debug-level diagnostics
    #[argh(switch, short = 'v')]
    verbose: bool,

    /// print program name and version, then exit
    #[argh(switch, short = 'V')]
    version: bool,
}

fn main() {
    let argv: Vec<String> = std::env::args().collect();
    // argh only recognises the long form of help
    let args: Vec<&str> = argv[1..]
        .iter()
        .map(|arg| match arg.as_str() {
            "-h" => "--help",
            other => other,
        })
        .collect();
    let options = match Options::from_args(&[argv[0].as_str()], &args) {
        Ok(options) => options,
        Err(argh::EarlyExit { output, status }) => match status {
            Ok(()) => {
                println!("{output}");
                std::process::exit(0);
            }
            Err(()) => {
                eprintln!("{output}");
                std::process::exit(1);
            }
        },
    };
    if options.version {
        println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        return;
    }

    let logger = assemble_logger(options.verbose);
    let status = match Interpreter::new(logger).and_then(|mut shell| shell.repl()) {
        Ok(status) => status,
        Err(err) => {
            eprintln!("conch: {err:#}");
            1
        }
    };
    std::process::exit(status);
}

fn assemble_logger(verbose: bool) -> Logger {
    let decorator = slog_term::TermDecorator::new().stderr().build();
    let drain = slog_term::FullFormat::new(decorator).build();
    let level = if verbose {
        slog::Level::Debug
    } else {
        slog::Level::Info
    };
    let drain = std::sync::Mutex::new(drain).filter_level(level).fuse();
    Logger::root(drain, o!())
}
