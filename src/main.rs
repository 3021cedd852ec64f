#![forbid(unsafe_code)]
//! pig command line interface

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    std::process::exit(pig::cli::run(&args));
}
