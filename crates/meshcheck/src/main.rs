//! meshcheck entrypoint.

use std::{io, net::IpAddr, path::PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use meshcheck::{default_registry, Observer, RunConfig, Runner};
use meshcheck_sim::SimNetworkBuilder;
use tokio::runtime::Runtime;
use tracing::{error, info};
use tracing_subscriber::{prelude::*, EnvFilter};

fn main() -> Result<()> {
    let flags = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_file(false)
                .compact()
                .with_filter(
                    EnvFilter::try_from_env("MESHCHECK").unwrap_or_else(|_| EnvFilter::new("info")),
                ),
        )
        .init();

    let cfg = match &flags.config {
        Some(path) => RunConfig::load(path)?,
        None => RunConfig::default(),
    };

    match flags.command {
        Command::List => {
            let registry = default_registry(&cfg.factory)?;
            for entry in registry.entries() {
                println!("{}\t{:?}", entry.name, entry.timeout);
            }
            Ok(())
        }
        Command::Command {
            public_ip,
            bootstrap,
        } => {
            let deps = bootstrap
                .into_iter()
                .map(|ip| cfg.factory.service_from_ip(ip))
                .collect::<Vec<_>>();
            println!("{}", cfg.factory.start_command(public_ip, &deps).join(" "));
            Ok(())
        }
        Command::Run { names } => run(cfg, &names),
    }
}

fn run(cfg: RunConfig, names: &[String]) -> Result<()> {
    let registry = default_registry(&cfg.factory).context("unable to build test registry")?;
    let runner = Runner::new(SimNetworkBuilder::new(cfg.sim), Observer::new(cfg.retry));

    let rt = Runtime::new()?;
    let reports = rt.block_on(runner.run(&registry, names))?;

    let mut failed = 0;
    for report in &reports {
        match &report.outcome {
            Ok(()) => println!("PASS {} ({:?})", report.name, report.elapsed),
            Err(err) => {
                failed += 1;
                let chain = anyhow::Chain::new(err)
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(": ");
                println!("FAIL {} ({:?}): {chain}", report.name, report.elapsed);
            }
        }
    }

    if failed > 0 {
        error!(failed, total = reports.len(), "run failed");
        bail!("{failed} of {} tests failed", reports.len());
    }
    info!(total = reports.len(), "all tests passed");
    Ok(())
}

#[derive(Debug, Parser)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Path to a TOML run configuration.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the registered tests.
    List,
    /// Run tests against the simulated network.
    Run {
        /// Tests to run. Runs all of them when empty.
        names: Vec<String>,
    },
    /// Print the command that launches a node.
    Command {
        /// Address the node advertises.
        #[arg(long)]
        public_ip: IpAddr,
        /// Boot members to bootstrap from.
        #[arg(long)]
        bootstrap: Vec<IpAddr>,
    },
}
