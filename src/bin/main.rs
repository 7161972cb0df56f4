use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use jmmc::diagnostics::Diagnostics;
use jmmc::parser::{parse_source, Lexer};
use jmmc::{Config, Error};

#[derive(Parser)]
#[command(name = "jmmc")]
#[command(about = "j-- compiler")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a .java file and write one .jasm listing per class
    Compile {
        /// Input .java file
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Output directory for .jasm files
        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Parse a .java file and show the AST
    Parse {
        /// Input .java file
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },

    /// Lexically analyze a .java file
    Lex {
        /// Input .java file
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Show token locations
        #[arg(short, long)]
        locations: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let verbose = matches!(cli.command, Commands::Compile { verbose: true, .. });
    let level = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match run(&cli) {
        Ok(code) => code,
        Err(err) => {
            // Diagnostics are the whole story for a failed compilation
            match err.downcast_ref::<Error>() {
                Some(Error::Compilation { diagnostics, .. }) => {
                    for diagnostic in diagnostics {
                        eprintln!("{}", diagnostic);
                    }
                }
                _ => eprintln!("error: {:#}", err),
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<ExitCode> {
    let config = Config::from_env()?;
    match &cli.command {
        Commands::Compile { input, output, verbose } => {
            compile_file(input, output.as_deref(), &config.with_verbose(*verbose))?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Parse { input } => parse_file(input, &config),
        Commands::Lex { input, locations } => lex_file(input, *locations, &config),
    }
}

fn read_source(input: &Path) -> Result<String> {
    fs::read_to_string(input).with_context(|| format!("cannot read {}", input.display()))
}

fn compile_file(input: &Path, output: Option<&Path>, config: &Config) -> Result<()> {
    let source = read_source(input)?;
    let classes = jmmc::compile(&source, &input.display().to_string(), config)?;

    let output_dir = output.unwrap_or_else(|| Path::new("."));
    if !output_dir.exists() {
        fs::create_dir_all(output_dir)
            .with_context(|| format!("cannot create {}", output_dir.display()))?;
    }

    for class in &classes {
        let path = output_dir.join(format!("{}.jasm", class.simple_name()));
        fs::write(&path, class.listing()).with_context(|| format!("cannot write {}", path.display()))?;
        log::info!("wrote {}", path.display());
    }
    if config.verbose {
        println!(
            "Compiled {} class(es) from {} into {}",
            classes.len(),
            input.display(),
            output_dir.display()
        );
    }
    Ok(())
}

fn parse_file(input: &Path, config: &Config) -> Result<ExitCode> {
    let source = read_source(input)?;
    let (unit, diagnostics) = parse_source(&source, &input.display().to_string(), config);
    println!("{:#?}", unit);
    Ok(report(&diagnostics))
}

fn lex_file(input: &Path, locations: bool, config: &Config) -> Result<ExitCode> {
    let source = read_source(input)?;
    let mut diagnostics = Diagnostics::new(input.display().to_string(), config.max_errors);
    let tokens = Lexer::new(&source).tokenize(&mut diagnostics);

    for token in tokens {
        if locations {
            println!("{:?} at {}:{}", token.kind(), token.location.line, token.location.column);
        } else {
            println!("{:?}: '{}'", token.kind(), token.image());
        }
    }
    Ok(report(&diagnostics))
}

/// Print collected diagnostics; failure when there were any
fn report(diagnostics: &Diagnostics) -> ExitCode {
    for diagnostic in diagnostics.entries() {
        eprintln!("{}", diagnostic);
    }
    if diagnostics.error_has_occurred() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
