use std::path::PathBuf;

use clap::Parser;

mod analysis;
mod datatypes;
mod engine;
mod error;
mod geometry;
mod input;
mod output;

use engine::ProcessEngine;
use error::SectionError;

/// Cross-section property and stress analysis driven over an external
/// structural-analysis engine. Prints the result document as JSON on stdout;
/// all diagnostics go to stderr.
#[derive(Parser)]
#[command(name = "sectio")]
struct Cli {
    /// Request document; the first line holds one JSON object
    input: PathBuf,

    /// Command used to launch the external analysis engine
    #[arg(long, default_value = "section-engine")]
    engine: String,
}

fn run(cli: &Cli) -> Result<(), SectionError> {
    eprintln!("info: start working on the file: {}", cli.input.display());

    let request = input::load_request(&cli.input)?;
    let mut engine = ProcessEngine::spawn(&cli.engine)?;

    let model = input::normalize(&request, &mut engine)?;
    let results = analysis::run(&mut engine, &model)?;
    let document = output::assemble(results);

    println!("{}", output::to_json(&document)?);
    eprintln!("info: done");

    Ok(())
}

fn main() {
    let cli = Cli::parse();

    if let Err(err) = run(&cli) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
