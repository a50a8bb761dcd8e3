//! `dbtest` command-line entry point.
//!
//! # Responsibility
//! - Assemble the configuration, start logging and dispatch subcommands.
//! - Exit non-zero when a seeding report carries an error.

mod cli;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use dbtest_core::{
    init_logging, load_config, open_db, run_startup_seeding, write_default_config,
    ConfigOverrides, HarnessConfig, Schema,
};
use log::info;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::cli::args::Cli;
use crate::cli::command::Command;

fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    if let Command::InitConfig { path } = &cli.cmd {
        let target = match path.clone().or_else(dbtest_core::config::default_config_path) {
            Some(target) => target,
            None => return Err(anyhow!("no --path given and HOME is not set")),
        };
        write_default_config(&target)
            .with_context(|| format!("writing default config to {}", target.display()))?;
        println!(
            "wrote {}; customize it before running `dbtest seed`",
            target.display()
        );
        return Ok(ExitCode::SUCCESS);
    }

    let overrides = ConfigOverrides {
        sec_db_path: cli.sec_db.clone(),
        app_db_path: cli.app_db.clone(),
        log_level: cli.log_level.clone(),
        log_dir: cli.log_dir.clone(),
    };
    let config = load_config(
        cli.config.as_deref(),
        |name| std::env::var(name).ok(),
        &overrides,
    )
    .context("loading configuration")?;

    match cli.cmd {
        Command::ShowConfig => {
            print!("{}", config.to_toml_string()?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Seed { json } => seed(&config, json),
        Command::InitConfig { .. } => Ok(ExitCode::SUCCESS),
    }
}

fn seed(config: &HarnessConfig, json: bool) -> Result<ExitCode> {
    let mut log = config.log.clone();
    log.dir = log.dir.as_deref().map(absolutize).transpose()?;
    init_logging(&log).context("initializing logging")?;
    info!(
        "event=cli_seed module=cli status=start sec_db={} app_db={}",
        config.sec_db_path.display(),
        config.app_db_path.display()
    );

    let sec_conn = open_db(&config.sec_db_path, Schema::Sec)
        .with_context(|| format!("opening secdb at {}", config.sec_db_path.display()))?;
    let app_conn = open_db(&config.app_db_path, Schema::App)
        .with_context(|| format!("opening appdb at {}", config.app_db_path.display()))?;

    let run = run_startup_seeding(&sec_conn, &app_conn);
    if json {
        println!("{}", serde_json::to_string_pretty(&run)?);
    } else {
        for report in &run.reports {
            for event in &report.events {
                println!("[{}] {event}", report.schema);
            }
            if let Some(error) = &report.error {
                println!("[{}] seeding failed: {error}", report.schema);
            }
        }
    }

    let status = if run.is_ok() { "ok" } else { "error" };
    info!("event=cli_seed module=cli status={status}");
    Ok(if run.is_ok() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn absolutize(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().context("resolving current directory")?;
    Ok(cwd.join(path))
}
