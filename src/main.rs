use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::Client;
use peering_reflector::config::ReflectorConfig;
use peering_reflector::peering::{PhaseAuthority, PhaseFeed};
use peering_reflector::reflection::{
    NamespaceSignals, NattingTable, ReflectionContext, ReflectorsController,
};
use peering_reflector::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the reflector
    Run(RunArgs),
    /// Show version information
    Version,
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Kubeconfig of the foreign cluster; the home cluster is inferred
    #[arg(long, env = "FOREIGN_KUBECONFIG")]
    foreign_kubeconfig: PathBuf,

    /// Context to use from the foreign kubeconfig
    #[arg(long, env = "FOREIGN_CONTEXT")]
    foreign_context: Option<String>,

    /// Cluster ID of the home cluster
    #[arg(long, env = "HOME_CLUSTER_ID")]
    home_cluster_id: String,

    /// Cluster ID of the peer whose phase gates reflection
    #[arg(long, env = "REMOTE_CLUSTER_ID")]
    remote_cluster_id: String,

    /// Virtual node representing the peer; also the ownership marker value
    #[arg(long, env = "VIRTUAL_NODE_NAME")]
    virtual_node: String,

    /// TOML file with namespace mappings and cleanup tuning
    #[arg(long, env = "REFLECTOR_CONFIG")]
    config: Option<PathBuf>,

    /// Seconds to wait for each reflector cache to sync at startup
    #[arg(long, env = "CACHE_SYNC_TIMEOUT_SECS", default_value_t = 60)]
    cache_sync_timeout: u64,

    /// Admission webhook listen address
    #[arg(long, env = "WEBHOOK_ADDR", default_value = "0.0.0.0:8443")]
    webhook_addr: SocketAddr,

    /// Do not start the admission webhook
    #[arg(long, env = "DISABLE_WEBHOOK")]
    disable_webhook: bool,

    #[arg(long, env = "WEBHOOK_TLS_CERT", requires = "tls_key")]
    tls_cert: Option<String>,

    #[arg(long, env = "WEBHOOK_TLS_KEY", requires = "tls_cert")]
    tls_key: Option<String>,

    /// Timeout of peer identity lookups, in seconds
    #[arg(long, env = "IDENTITY_LOOKUP_TIMEOUT_SECS", default_value_t = 10)]
    identity_lookup_timeout: u64,

    /// Log as JSON lines
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = Args::parse();

    match args.command {
        Commands::Version => {
            println!("peering-reflector v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Run(run_args) => run_reflector(run_args).await,
    }
}

fn init_tracing(log_json: bool) {
    let env_filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    let fmt_layer = if log_json {
        fmt::layer().json().with_target(true).boxed()
    } else {
        fmt::layer().with_target(true).boxed()
    };

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer);

    // Only enable OTEL if an endpoint is provided
    let otel_enabled = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok();

    if otel_enabled {
        let otel_layer = peering_reflector::telemetry::init_telemetry(&registry);
        registry.with(otel_layer).init();
        info!("OpenTelemetry tracing initialized");
    } else {
        registry.init();
        info!("OpenTelemetry tracing disabled (OTEL_EXPORTER_OTLP_ENDPOINT not set)");
    }
}

async fn foreign_client(path: &PathBuf, context: Option<String>) -> Result<Client, Error> {
    let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
        Error::ConfigError(format!("Cannot read foreign kubeconfig {}: {e}", path.display()))
    })?;
    let options = KubeConfigOptions {
        context,
        ..Default::default()
    };
    let config = kube::Config::from_custom_kubeconfig(kubeconfig, &options)
        .await
        .map_err(|e| Error::ConfigError(format!("Invalid foreign kubeconfig: {e}")))?;
    Ok(Client::try_from(config)?)
}

async fn run_reflector(args: RunArgs) -> Result<(), Error> {
    init_tracing(args.log_json);

    info!(
        home = %args.home_cluster_id,
        remote = %args.remote_cluster_id,
        "Starting peering-reflector v{}",
        env!("CARGO_PKG_VERSION")
    );

    let file_config = match &args.config {
        Some(path) => ReflectorConfig::from_file(path)?,
        None => ReflectorConfig::default(),
    };

    let home_client = Client::try_default().await?;
    let foreign_client = foreign_client(&args.foreign_kubeconfig, args.foreign_context.clone()).await?;
    info!("Connected to home and foreign clusters");

    let authority = Arc::new(PhaseAuthority::new());
    let feed = PhaseFeed::new(home_client.clone(), Arc::clone(&authority));
    tokio::spawn(async move {
        if let Err(e) = feed.run().await {
            error!("Peering phase feed failed: {}", e);
        }
    });

    let (table, signals) = NattingTable::new();
    let table = Arc::new(table);
    let NamespaceSignals {
        start_incoming,
        stop_incoming,
        start_outgoing,
        stop_outgoing,
    } = signals;

    let ctx = ReflectionContext {
        home_client: home_client.clone(),
        foreign_client,
        mapper: table.clone(),
        authority,
        remote_cluster_id: args.remote_cluster_id.clone(),
        origin: args.virtual_node.clone(),
        cache_sync_timeout: Duration::from_secs(args.cache_sync_timeout),
        cleanup_policy: file_config.cleanup_policy(),
    };
    let outgoing = Arc::new(ReflectorsController::outgoing(&ctx).await?);
    let incoming = Arc::new(ReflectorsController::incoming(&ctx).await?);

    let shutdown = CancellationToken::new();
    let outgoing_task = tokio::spawn({
        let controller = Arc::clone(&outgoing);
        let shutdown = shutdown.clone();
        async move {
            controller
                .run(start_outgoing, stop_outgoing, shutdown)
                .await
        }
    });
    let incoming_task = tokio::spawn({
        let controller = Arc::clone(&incoming);
        let shutdown = shutdown.clone();
        async move {
            controller
                .run(start_incoming, stop_incoming, shutdown)
                .await
        }
    });

    for pair in file_config.pairs() {
        table.map(&pair.local, &pair.foreign);
    }

    #[cfg(feature = "admission-webhook")]
    if !args.disable_webhook {
        use peering_reflector::webhook::{HttpClusterInfoProvider, WebhookServer};

        let provider =
            HttpClusterInfoProvider::new(Duration::from_secs(args.identity_lookup_timeout))?;
        let mut server = WebhookServer::new(Arc::new(provider));
        if let (Some(cert), Some(key)) = (args.tls_cert.clone(), args.tls_key.clone()) {
            server = server.with_tls(cert, key);
        }
        let addr = args.webhook_addr;
        tokio::spawn(async move {
            if let Err(e) = server.start(addr).await {
                error!("Webhook server error: {}", e);
            }
        });
    }
    #[cfg(not(feature = "admission-webhook"))]
    if !args.disable_webhook {
        warn!("Built without the admission-webhook feature, webhook not started");
    }

    tokio::signal::ctrl_c().await?;
    warn!("Shutdown requested, stopping reflection");
    shutdown.cancel();

    for task in [outgoing_task, incoming_task] {
        if let Err(e) = task.await {
            error!("Controller task failed: {}", e);
        }
    }

    // Flush any remaining traces
    peering_reflector::telemetry::shutdown_telemetry();
    Ok(())
}
