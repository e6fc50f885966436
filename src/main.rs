//! sitepipe - asset pipeline and performance audit harness for a static site.

mod audit;
mod build;
mod cli;
mod compiler;
mod config;
mod logger;
mod serve;
mod utils;
mod watch;

use anyhow::{Result, bail};
use audit::{AuditOutcome, run_audit};
use build::{build_site, clean};
use clap::Parser;
use cli::{Cli, Commands};
use config::SiteConfig;
use serve::serve_dir;
use watch::watch_for_changes_blocking;

fn main() -> Result<()> {
    let cli: &'static Cli = Box::leak(Box::new(Cli::parse()));
    let config: &'static SiteConfig = Box::leak(Box::new(load_config(cli)?));

    match &cli.command {
        Commands::Build { watch: false, .. } => build_site(config).map(|_| ()),
        Commands::Build { watch: true, .. } => {
            // A broken initial build is reported, then fixed by editing.
            if let Err(err) = build_site(config) {
                log!("error"; "initial build failed: {err:#}");
            }
            watch_for_changes_blocking(config)
        }
        Commands::Clean => clean(config),
        Commands::Audit { pages } => match run_audit(config, pages)? {
            AuditOutcome::Passed { pages, warnings } => {
                log!("audit"; "passed: {pages} page(s), {warnings} warning(s)");
                Ok(())
            }
            AuditOutcome::Manual => Ok(()),
            AuditOutcome::Failed(violations) => {
                bail!("{} blocking threshold(s) failed", violations.len())
            }
        },
        Commands::Serve { port, dir, spa } => {
            let dir = dir.as_ref().map_or_else(
                || config.build.output.clone(),
                |dir| config.get_root().join(dir),
            );
            serve_dir(&dir, *port, *spa)
        }
    }
}

/// Load and validate configuration from CLI arguments
fn load_config(cli: &'static Cli) -> Result<SiteConfig> {
    let config = SiteConfig::load(cli)?;
    config.validate()?;
    Ok(config)
}
