use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::process::{ExitCode, Termination};

use clap::Parser;

#[allow(clippy::large_enum_variant)]
#[derive(clap::Subcommand, Debug)]
pub enum Command {
    /// Scrape vendor advisory listings into the canonical table.
    Scan(vigil_scraper::Run),
    /// Ask a canned question of an exported table.
    Query(vigil_query::Run),
    /// Mail an exported table as a CSV report.
    Report(vigil_report::Run),
    /// Watch the listings and mail newly published advisories.
    Monitor(vigil_monitor::Run),
}

#[derive(clap::Parser, Debug)]
#[command(
    author,
    version = env!("CARGO_PKG_VERSION"),
    about = "Vigil",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub(crate) command: Command,
}

impl Cli {
    async fn run(self) -> ExitCode {
        match self.run_command().await {
            Ok(code) => code,
            Err(err) => {
                eprintln!("Error: {err}");
                for (n, err) in err.chain().skip(1).enumerate() {
                    if n == 0 {
                        eprintln!("Caused by:");
                    }
                    eprintln!("\t{err}");
                }

                ExitCode::FAILURE
            }
        }
    }

    async fn run_command(self) -> anyhow::Result<ExitCode> {
        match self.command {
            Command::Scan(run) => run.run().await,
            Command::Query(run) => run.run().await,
            Command::Report(run) => run.run().await,
            Command::Monitor(run) => run.run().await,
        }
    }
}

#[tokio::main]
async fn main() -> impl Termination {
    let _ = env_logger::builder().format_timestamp_millis().try_init();
    load_xdg_config();
    Cli::parse().run().await
}

fn load_xdg_config() {
    let config_dir = if let Ok(xdg_config_home) = std::env::var("XDG_CONFIG_HOME") {
        Some(Path::new(&xdg_config_home).join("vigil"))
    } else if let Ok(home) = std::env::var("HOME") {
        Some(Path::new(&home).join(".config").join("vigil"))
    } else {
        None
    };

    if let Some(config_dir) = config_dir {
        if config_dir.exists() && config_dir.is_dir() {
            if let Ok(dir) = config_dir.read_dir() {
                for entry in dir.flatten() {
                    if let Some(var_name) = entry.file_name().to_str().map(ToString::to_string) {
                        if let Ok(mut file) = File::open(entry.path()) {
                            let mut var_value = String::new();
                            if file.read_to_string(&mut var_value).is_ok() {
                                std::env::set_var(var_name, var_value.trim());
                            }
                        }
                    }
                }
            } else {
                eprintln!("Warning: unable to read configuration directory: {:?}", config_dir);
            }
        }
    }
}
