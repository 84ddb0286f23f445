//! idlegrid — operator CLI for the scaling providers.
//!
//! Drives the same `Provider` the proxy uses, one token at a time. Useful
//! for checking RBAC, label conventions and readiness by hand.
//!
//! # Usage
//!
//! ```text
//! idlegrid --config /etc/idlegrid/provider.toml scale-up deployment_shop_web_2
//! idlegrid is-up deployment_shop_web_2
//! idlegrid encode --kind statefulset --namespace db --name pg --replicas 1
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{debug, info};

use idlegrid_core::{Provider, ProviderConfig, WorkloadIdentity, WorkloadKind};
use idlegrid_kubernetes::{KubeControlPlane, KubernetesScaler};
use idlegrid_metrics::{InstanceCounters, MetricsSink, NoopSink, render_prometheus};

#[derive(Parser)]
#[command(name = "idlegrid", about = "Scale workloads to and from zero")]
struct Cli {
    /// Provider config file (TOML). Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scale a workload to its target replica count.
    ScaleUp { token: String },

    /// Scale a workload to zero.
    ScaleDown { token: String },

    /// Check whether a workload can serve traffic. Exits 1 when it cannot.
    IsUp { token: String },

    /// Build an identity token.
    Encode {
        #[arg(long, value_parser = parse_kind)]
        kind: WorkloadKind,
        #[arg(long)]
        namespace: String,
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "1")]
        replicas: u32,
    },

    /// Print the effective provider config.
    Config,
}

fn parse_kind(s: &str) -> Result<WorkloadKind, String> {
    s.parse::<WorkloadKind>().map_err(|e| e.to_string())
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,idlegrid=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<ProviderConfig> {
    match path {
        Some(path) => ProviderConfig::from_file(path)
            .with_context(|| format!("loading provider config from {}", path.display())),
        None => Ok(ProviderConfig::default()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.json);

    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Command::Encode {
            kind,
            namespace,
            name,
            replicas,
        } => {
            let identity = WorkloadIdentity::new(kind, namespace, name, replicas);
            println!("{}", config.identity_codec().encode(&identity)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Config => {
            print!("{}", config.to_toml_string()?);
            Ok(ExitCode::SUCCESS)
        }
        Command::ScaleUp { token } => {
            let counters = InstanceCounters::new();
            let scaler = connect(&config, Arc::new(counters.clone())).await?;
            scaler.scale_up(&token).await?;
            log_counters(&counters).await;
            Ok(ExitCode::SUCCESS)
        }
        Command::ScaleDown { token } => {
            let counters = InstanceCounters::new();
            let scaler = connect(&config, Arc::new(counters.clone())).await?;
            scaler.scale_down(&token).await?;
            log_counters(&counters).await;
            Ok(ExitCode::SUCCESS)
        }
        Command::IsUp { token } => {
            // Readiness checks never count starts or stops.
            let scaler = connect(&config, Arc::new(NoopSink)).await?;
            let up = scaler.is_up(&token).await;
            println!("{}", if up { "up" } else { "down" });
            Ok(if up { ExitCode::SUCCESS } else { ExitCode::FAILURE })
        }
    }
}

async fn connect(
    config: &ProviderConfig,
    metrics: Arc<dyn MetricsSink>,
) -> anyhow::Result<KubernetesScaler<KubeControlPlane>> {
    let plane = KubeControlPlane::connect(config)
        .await
        .context("connecting to the Kubernetes API")?;
    let scaler = KubernetesScaler::new(Arc::new(plane), config, metrics);
    info!(provider = scaler.name(), "provider ready");
    Ok(scaler)
}

async fn log_counters(counters: &InstanceCounters) {
    debug!(metrics = %render_prometheus(&counters.snapshot().await), "instance counters");
}
