//! Agent-driven Enzyme to React Testing Library migrator.
//!
//! Reads `.migrator/config.toml` from the current directory, which is also the
//! directory the test runner is started in.

use std::env;
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;

use migrator::batch::{BatchOptions, BatchResult, run_batch};
use migrator::exit_codes;
use migrator::io::agent::OpenAiAgentClient;
use migrator::io::config::{MigratorConfig, config_path, load_config, write_config};
use migrator::io::validation::{CommandValidationRunner, ValidationRequest, ValidationRunner};
use migrator::logging;
use migrator::orchestrator::{MigrationRequest, promote_candidate, run_migration};

#[derive(Parser)]
#[command(
    name = "migrator",
    version,
    about = "Migrate Enzyme tests to React Testing Library with an LLM agent"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write `.migrator/config.toml` with defaults if missing.
    Init {
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// Migrate one test file.
    Migrate {
        file: PathBuf,
        /// Candidate output path (default: `<name>.migrated.<ext>` next to FILE).
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Override the submission ceiling.
        #[arg(long)]
        max_attempts: Option<u32>,
        /// Never let the agent edit source files.
        #[arg(long)]
        no_source_edits: bool,
        /// Replace FILE with the candidate when it passes.
        #[arg(long)]
        in_place: bool,
        /// Also write a debug-level log to this file.
        #[arg(long)]
        verbose_log: Option<PathBuf>,
    },
    /// Migrate every Enzyme test under a directory.
    Batch {
        dir: PathBuf,
        /// Replace each source test with its passing candidate.
        #[arg(long)]
        in_place: bool,
        /// Also write a debug-level log to this file.
        #[arg(long)]
        verbose_log: Option<PathBuf>,
    },
    /// Run the configured validation on a file and print the result.
    Check { file: PathBuf },
}

impl Command {
    fn verbose_log(&self) -> Option<&Path> {
        match self {
            Command::Migrate { verbose_log, .. } | Command::Batch { verbose_log, .. } => {
                verbose_log.as_deref()
            }
            Command::Init { .. } | Command::Check { .. } => None,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    if let Err(err) = logging::init(cli.command.verbose_log()) {
        eprintln!("{err:#}");
        process::exit(exit_codes::INVALID);
    }
    match run(cli) {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("{err:#}");
            process::exit(exit_codes::INVALID);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    let root = env::current_dir().context("resolve current directory")?;
    match cli.command {
        Command::Init { force } => cmd_init(&root, force),
        Command::Migrate {
            file,
            output,
            max_attempts,
            no_source_edits,
            in_place,
            verbose_log: _,
        } => {
            let mut config = load_config(&config_path(&root))?;
            if let Some(max) = max_attempts {
                config.max_attempts = max;
            }
            if no_source_edits {
                config.allow_source_edits = false;
            }
            config.validate()?;
            cmd_migrate(&root, &config, file, output, in_place)
        }
        Command::Batch {
            dir,
            in_place,
            verbose_log: _,
        } => {
            let config = load_config(&config_path(&root))?;
            config.validate()?;
            cmd_batch(&root, &config, &dir, in_place)
        }
        Command::Check { file } => {
            let config = load_config(&config_path(&root))?;
            config.validate()?;
            cmd_check(&root, &config, &file)
        }
    }
}

fn cmd_init(root: &Path, force: bool) -> Result<i32> {
    let path = config_path(root);
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    write_config(&path, &MigratorConfig::default())?;
    println!("{}", path.display());
    Ok(exit_codes::OK)
}

fn cmd_migrate(
    root: &Path,
    config: &MigratorConfig,
    file: PathBuf,
    output: Option<PathBuf>,
    in_place: bool,
) -> Result<i32> {
    let agent = OpenAiAgentClient::from_config(&config.agent)?;
    let validator = CommandValidationRunner::from_config(config);
    let source = root.join(&file);
    let request = MigrationRequest {
        source_path: source.clone(),
        output_path: output,
        workdir: root.to_path_buf(),
    };

    let outcome = run_migration(config, &request, &agent, &validator)?;
    print_json(&outcome)?;
    if in_place && outcome.passed() {
        promote_candidate(&outcome, &source)?;
    }
    Ok(exit_codes::for_outcome(&outcome))
}

fn cmd_batch(root: &Path, config: &MigratorConfig, dir: &Path, in_place: bool) -> Result<i32> {
    let agent = OpenAiAgentClient::from_config(&config.agent)?;
    let validator = CommandValidationRunner::from_config(config);
    let summary = run_batch(
        config,
        &root.join(dir),
        root,
        BatchOptions { in_place },
        &agent,
        &validator,
        |entry| match &entry.result {
            BatchResult::Finished { outcome } => eprintln!(
                "{}: {:?} after {} attempt(s)",
                entry.path.display(),
                outcome.termination,
                outcome.attempts
            ),
            BatchResult::Error { message } => {
                eprintln!("{}: error: {message}", entry.path.display());
            }
        },
    )?;
    print_json(&summary)?;
    if summary.all_passed() {
        Ok(exit_codes::OK)
    } else {
        Ok(exit_codes::NOT_PASSED)
    }
}

fn cmd_check(root: &Path, config: &MigratorConfig, file: &Path) -> Result<i32> {
    let validator = CommandValidationRunner::from_config(config);
    let result = validator.validate(&ValidationRequest {
        candidate_path: root.join(file),
        workdir: root.to_path_buf(),
    })?;
    print_json(&result)?;
    if result.did_pass {
        Ok(exit_codes::OK)
    } else {
        Ok(exit_codes::NOT_PASSED)
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let payload = serde_json::to_string_pretty(value).context("serialize output")?;
    println!("{payload}");
    Ok(())
}
