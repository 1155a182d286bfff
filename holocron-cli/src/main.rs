//! Entry point for the `holocron` command.
#![forbid(unsafe_code)]

use holocron_cli::CliError;

fn main() {
    match holocron_cli::run() {
        Ok(()) => {}
        Err(CliError::ArgumentParsing(err)) => err.exit(),
        Err(err) => {
            eprintln!("holocron: {err}");
            std::process::exit(1);
        }
    }
}
