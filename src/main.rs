//! Compiler binary entry point.

use std::process;

use minic::args::Args;
use minic::compiler::driver;
use minic::print_err;

fn main() {
    let args = Args::parse();

    if let Err(err) = driver::run_compiler(&args) {
        print_err!(&args.program, "{err}");
        process::exit(1);
    }
}
