//! p8s command line: thin shell over the lifecycle controller.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use p8s::{Config, Environment, SetupError};

#[derive(Parser, Debug)]
#[command(name = "p8s", version, about = "Bootstrap a single-node Kubernetes cluster on this host")]
struct Args {
    /// Root path owning all orchestrator state
    #[arg(short = 'r', long = "root", default_value = "/opt/p8s")]
    root: PathBuf,

    /// Optional p8s.toml configuration file
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Categories removed by the clean phase (binaries, etcd, iptables,
    /// kubectl, kubelet, logs, manifests, mounts, network, secrets,
    /// systemd, all, none)
    #[arg(long = "clean")]
    clean: Option<String>,

    /// Categories kept by the clean phase; any keep token overrides --clean
    #[arg(long = "keep")]
    keep: Option<String>,

    /// Drain behavior before stop (workloads, iptables, kubeletgc, all, none)
    #[arg(long = "drain")]
    drain: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Set up, start the cluster and block until it is drained
    Run {
        /// How long to wait for the cluster to become healthy, in seconds
        #[arg(long = "run-timeout", default_value_t = 300)]
        run_timeout: u64,
    },
    /// Set up the environment without starting any unit
    Setup,
    /// Remove artifacts according to the clean/keep policy
    Clean,
    /// Clean, then set the environment up again from scratch
    Reset,
}

async fn execute(args: Args) -> Result<(), SetupError> {
    let mut config = Config::load(args.config.as_deref())?;
    if let Some(clean) = &args.clean {
        config.clean = clean.clone();
    }
    if let Some(keep) = &args.keep {
        config.keep = keep.clone();
    }
    if let Some(drain) = &args.drain {
        config.drain = drain.clone();
    }
    let mut env = Environment::new(&config, &args.root)?;

    match args.command {
        Commands::Setup => env.setup().await,
        Commands::Clean => {
            // Clean targets whatever an earlier Setup left behind; unit
            // names are deterministic, so no setup runs first
            let report = env.clean().await;
            if report.is_ok() {
                Ok(())
            } else {
                Err(SetupError::Config(report.to_string()))
            }
        }
        Commands::Reset => {
            let report = env.clean().await;
            if !report.is_ok() {
                return Err(SetupError::Config(report.to_string()));
            }
            env.setup().await
        }
        Commands::Run { run_timeout } => {
            env.setup().await?;
            env.run(Duration::from_secs(run_timeout)).await?;
            tracing::info!("Cluster is up; press Ctrl-C to drain and clean");
            tokio::signal::ctrl_c().await?;
            env.drain().await?;
            let report = env.clean().await;
            if report.is_ok() {
                Ok(())
            } else {
                Err(SetupError::Config(report.to_string()))
            }
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    if let Err(e) = execute(args).await {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}
