use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use testwire::config::Config;
use testwire::dispatch;
use testwire::dispatch::parse_args;
use testwire::manifest::catalog_from_config;

const CATALOG_FILE: &str = "testwire.toml";
const LOG_ENV: &str = "TESTWIRE_LOG";

#[derive(Parser)]
#[command(name = "testwire")]
#[command(about = "Run JUnit4, JUnit5 or TestNG style tests and stream their lifecycle events")]
#[command(version)]
struct Cli {
    /// Path to the test catalog (default: testwire.toml)
    #[arg(short, long, env = "TESTWIRE_CATALOG")]
    catalog: Option<PathBuf>,

    /// Runner type (junit, junit5, testng) followed by
    /// CLASS<class> and METHOD<method>:<class> selections
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

fn main() {
    init_logging();

    match run() {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .init();
}

fn run() -> Result<i32> {
    let cli = Cli::parse();

    // argument errors win over a broken catalog
    if let Err(e) = parse_args(&cli.args) {
        eprintln!("{}", e);
        return Ok(1);
    }

    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    let (config, base_dir) = load_config(cli.catalog.as_deref(), &cwd)?;
    let catalog = catalog_from_config(&config, &base_dir)?;
    debug!("Catalog for '{}' has {} classes", config.project.name, catalog.len());

    let mut stderr = io::stderr();
    Ok(dispatch(&cli.args, &catalog, &config.runner, io::stdout(), &mut stderr))
}

/// An explicit catalog must exist; a missing default one means nothing resolves
fn load_config(explicit: Option<&Path>, cwd: &Path) -> Result<(Config, PathBuf)> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let path = cwd.join(CATALOG_FILE);
            if !path.exists() {
                let project = cwd
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| "default".to_string());
                debug!("No {} found, using an empty catalog", CATALOG_FILE);
                return Ok((Config::empty(&project), cwd.to_path_buf()));
            }
            path
        }
    };

    let config = Config::load(&path)?;
    let base_dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    Ok((config, base_dir))
}
