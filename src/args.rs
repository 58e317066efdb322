//! Module for parsing command-line arguments passed to the compiler.

use std::path::PathBuf;
use std::process;

use crate::compiler::driver::STAGES;
use crate::print_err;

/// Compiler command-line arguments.
#[derive(Debug)]
pub struct Args {
    /// Name of the program.
    pub program: String,
    /// Compilation stage to dump and terminate at (`tokenize`, `parse`,
    /// `validate`, `ir`, `assemble`).
    ///
    /// Empty by default, which runs the full pipeline.
    pub stage: String,
    /// Whether to trace every stage to standard output.
    pub debug: bool,
    /// Path of the input source file (required).
    pub in_path: PathBuf,
    /// Output path for assembly emission.
    pub out_path: PathBuf,
}

impl Args {
    /// Parses command-line arguments from `std::env::args()`, [exiting] on
    /// error.
    ///
    /// [exiting]: std::process::exit
    pub fn parse() -> Self {
        let mut args = std::env::args().peekable();
        let program = args.next().unwrap_or("minic".into());

        let mut stage = String::new();
        let mut debug = false;
        let mut out_path = PathBuf::new();

        while let Some(arg) = args.peek() {
            if !arg.starts_with("-") {
                // No remaining flags to process.
                break;
            }

            // Already peeked the next argument.
            let flag_name = args.next().expect("next argument should be present");

            let Some(flag) = FLAG_REGISTRY
                .iter()
                .find(|flag| flag.names.contains(&flag_name.as_str()))
            else {
                print_err!(&program, "invalid flag '{flag_name}'");
                print_usage(&program);
            };

            match flag.names {
                ["-s", "--stage"] => match args.next() {
                    Some(name) if STAGES.contains(&name.as_str()) => stage = name,
                    Some(name) => {
                        print_err!(&program, "invalid stage: '{name}'");
                        print_usage(&program);
                    }
                    None => {
                        print_err!(&program, "missing stage name after '-s'|'--stage'");
                        print_usage(&program);
                    }
                },
                ["-o", "--output"] => match args.next() {
                    Some(path) => out_path = PathBuf::from(&path),
                    None => {
                        print_err!(&program, "missing file name after '-o'|'--output'");
                        print_usage(&program);
                    }
                },
                ["-d", "--debug"] => debug = true,
                _ => {
                    if let Some(run) = flag.run {
                        run(&program);
                    }
                }
            }
        }

        // Input file comes after all flags have been processed.
        let Some(in_path) = args.next() else {
            print_err!(&program, "no input file");
            print_usage(&program);
        };

        if args.next().is_some() {
            print_err!(&program, "only one input file is supported");
            print_usage(&program);
        }

        // Indicates no output path was provided.
        if out_path.capacity() == 0 {
            out_path = PathBuf::from("./dump.s");
        }

        Self {
            program,
            stage,
            debug,
            in_path: PathBuf::from(in_path),
            out_path,
        }
    }
}

struct Flag {
    names: [&'static str; 2],
    description: &'static str,
    run: Option<fn(&str) -> !>,
}

const FLAG_REGISTRY: &[Flag] = &[
    Flag {
        names: ["-s", "--stage"],
        description:
            "          dump the named stage and stop: 'tokenize', 'parse', 'validate', 'ir', or 'assemble'.",
        run: None,
    },
    Flag {
        names: ["-o", "--output"],
        description: "         specify the output file. defaults to './dump.s'.",
        run: None,
    },
    Flag {
        names: ["-d", "--debug"],
        description: "          trace every compilation stage on standard output.",
        run: None,
    },
    Flag {
        names: ["-h", "--help"],
        description: "           print this summary.",
        run: Some(print_usage),
    },
    Flag {
        names: ["-v", "--version"],
        description: "        show version.",
        run: Some(print_version),
    },
];

/// Prints the usage information for the program, exiting with a non-zero
/// status.
pub fn print_usage(program: &str) -> ! {
    eprintln!("\x1b[1;1musage:\x1b[0m");
    eprintln!("      {program} [options] <infile>");
    eprintln!("\x1b[1;1moptions:\x1b[0m");

    for flag in FLAG_REGISTRY {
        eprintln!("   {}  {}", flag.names.join(", "), flag.description);
    }

    process::exit(1);
}

fn print_version(program: &str) -> ! {
    println!(
        "\x1b[1;1m{} - {}\x1b[0m",
        program,
        env!("CARGO_PKG_VERSION")
    );
    process::exit(0);
}
