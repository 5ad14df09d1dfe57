use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use log::LevelFilter;

use insnfreq::format::OutputFormat;
use insnfreq::parser::{Bytecode, ModuleParser};
use insnfreq::strategy::Strategy;
use insnfreq::{analyze, AnalysisConfig};

/// Count how often each instruction and each pair of adjacent instructions
/// occurs in the reachable code of a bytecode module.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Bytecode file to analyze; standard input when omitted
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Only report sequences occurring at least this many times
    #[arg(short, long, default_value_t = 1)]
    threshold: u32,

    /// How executable code is discovered
    #[arg(short, long, value_enum, default_value_t = Strategy::Recursive)]
    strategy: Strategy,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Frequency table capacity; sized from the code length when omitted
    #[arg(long)]
    capacity: Option<usize>,

    /// More log output on stderr (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    // RUST_LOG, when set, overrides the flag.
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn load_module(input: Option<&Path>) -> Result<Bytecode> {
    let parser = ModuleParser::new();
    match input {
        Some(path) => parser
            .parse_file(path)
            .with_context(|| format!("failed to load {}", path.display())),
        None => parser
            .parse_reader(std::io::stdin().lock())
            .context("failed to load module from standard input"),
    }
}

fn run(args: Args) -> Result<()> {
    let module = load_module(args.input.as_deref())?;

    let config = AnalysisConfig {
        threshold: args.threshold,
        strategy: args.strategy,
        capacity: args.capacity,
    };
    let report = analyze(&module, &config).context("analysis failed")?;

    let output = args.format.get_formatter().format(&report)?;
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(output.as_bytes())?;
    stdout.flush()?;
    Ok(())
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    if let Err(e) = run(args) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_error_chain_names_the_section_once() {
        // Header only, declaring 5 public symbols.
        let mut header = Vec::new();
        for field in [0u32, 0, 5] {
            header.extend_from_slice(&field.to_le_bytes());
        }
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&header).unwrap();

        let err = load_module(Some(file.path())).unwrap_err();
        let rendered = format!("{:#}", err);

        assert!(rendered.starts_with("failed to load "), "{rendered}");
        assert_eq!(rendered.matches("too small for public area").count(), 1, "{rendered}");
        assert_eq!(err.chain().count(), 2);
    }

    #[test]
    fn test_missing_input_file_is_reported_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.bc");

        let err = load_module(Some(&path)).unwrap_err();
        let rendered = format!("{:#}", err);
        assert!(rendered.contains("absent.bc"), "{rendered}");
        assert_eq!(err.chain().count(), 2);
    }
}
