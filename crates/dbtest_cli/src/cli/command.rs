use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    #[command(
        about = "Run the startup seeding for both schemas",
        long_about = "Migrates both databases, then seeds secdb and appdb, each in its own transaction. A failing schema is reported and the next one still runs."
    )]
    Seed {
        #[arg(long, default_value_t = false, help = "Print the seeding report as JSON")]
        json: bool,
    },
    #[command(about = "Write the default config file")]
    InitConfig {
        #[arg(
            long,
            value_name = "FILE",
            help = "Target file (defaults to $HOME/.dbtest.toml)"
        )]
        path: Option<PathBuf>,
    },
    #[command(about = "Print the effective configuration as TOML")]
    ShowConfig,
}
