use clap::Parser;
use std::path::PathBuf;

use crate::cli::command::Command;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Seed and exercise the secdb and appdb harness databases",
    long_about = "Opens the security and application SQLite databases, applies migrations and runs the startup seeding workflow."
)]
pub struct Cli {
    #[arg(
        long,
        global = true,
        value_name = "FILE",
        help = "Config file to load instead of $HOME/.dbtest.toml"
    )]
    pub config: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        value_name = "PATH",
        help = "secdb database file (overrides DBTEST_SEC_DB)"
    )]
    pub sec_db: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        value_name = "PATH",
        help = "appdb database file (overrides DBTEST_APP_DB)"
    )]
    pub app_db: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        value_name = "LEVEL",
        help = "Log level: trace|debug|info|warn|error (overrides DBTEST_LOG_LEVEL)"
    )]
    pub log_level: Option<String>,

    #[arg(
        long,
        global = true,
        value_name = "DIR",
        help = "Write rotating log files to DIR instead of stderr (overrides DBTEST_LOG_DIR)"
    )]
    pub log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub cmd: Command,
}
