//! FasterBASIC compiler CLI.
//!
//! Command-line interface for compiling `.bas` programs to textual IR (and,
//! with the `jit` feature, running them directly through the in-process
//! JIT).

use clap::{CommandFactory, Parser as ClapParser, Subcommand};
use clap_complete::{generate, Shell};
use fbc::config::CompilerConfig;
use std::io;
use std::path::{Path, PathBuf};
use std::process;
use tracing::info;

#[derive(ClapParser)]
#[command(name = "fbc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "FasterBASIC compiler", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a .bas file to textual IR
    Build {
        /// Input .bas source file
        input: PathBuf,

        /// Output IR path (defaults to input filename with a .ir extension)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Path to a TOML config overriding the embedded defaults
        #[arg(long)]
        config: Option<PathBuf>,

        /// Also emit a CFG dump (one .cfg.txt file per function) alongside the IR
        #[arg(long)]
        emit_cfg: bool,
    },

    /// Compile and run a .bas file through the in-process JIT
    #[cfg(feature = "jit")]
    Run {
        /// Input .bas source file
        input: PathBuf,

        /// Path to a TOML config overriding the embedded defaults
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Generate shell completion scripts
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("fbc=info".parse().unwrap()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Build { input, output, config, emit_cfg } => {
            let output = output.unwrap_or_else(|| input.with_extension("ir"));
            run_build(&input, &output, config.as_deref(), emit_cfg);
        }
        #[cfg(feature = "jit")]
        Commands::Run { input, config } => {
            run_jit(&input, config.as_deref());
        }
        Commands::Completions { shell } => {
            run_completions(shell);
        }
    }
}

fn run_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "fbc", &mut io::stdout());
}

fn load_config(path: Option<&Path>) -> CompilerConfig {
    match path {
        Some(p) => CompilerConfig::load(p).unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            process::exit(1);
        }),
        None => CompilerConfig::default(),
    }
}

fn run_build(input: &Path, output: &Path, config_path: Option<&Path>, emit_cfg: bool) {
    let config = load_config(config_path);
    let source = match std::fs::read_to_string(input) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error reading {}: {}", input.display(), e);
            process::exit(1);
        }
    };

    info!(path = %input.display(), "compiling");

    match fbc::compile(&source, &config) {
        Ok(result) => {
            if let Err(e) = std::fs::write(output, result.ir.text()) {
                eprintln!("Error writing {}: {}", output.display(), e);
                process::exit(1);
            }
            println!("Compiled {} -> {}", input.display(), output.display());

            if emit_cfg {
                for cfg in &result.cfgs {
                    let cfg_path = output.with_extension(format!("{}.cfg.txt", cfg.name));
                    let _ = std::fs::write(&cfg_path, fbc::cfg::to_text(cfg));
                }
            }
        }
        Err(diagnostics) => {
            for e in diagnostics.errors() {
                eprintln!("error: {}", e);
            }
            process::exit(1);
        }
    }
}

#[cfg(feature = "jit")]
fn run_jit(input: &Path, config_path: Option<&Path>) {
    let config = load_config(config_path);
    let source = match std::fs::read_to_string(input) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error reading {}: {}", input.display(), e);
            process::exit(1);
        }
    };

    match fbc::compile_and_run(&source, &config) {
        Ok(code) => process::exit(code as i32),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}
