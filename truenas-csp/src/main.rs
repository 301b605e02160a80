use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use truenas_csp::config::{CspConfig, DatasetDefaults, RetryPolicy};
use truenas_csp::{AppState, metrics, router};

#[derive(Parser, Debug)]
#[command(name = "truenas-csp")]
#[command(about = "TrueNAS/FreeNAS Container Storage Provider for the HPE CSI Driver")]
struct Args {
    /// HTTP listen address
    #[arg(long, default_value = "0.0.0.0:8080")]
    listen: SocketAddr,

    /// Prometheus metrics listen address (disabled when unset)
    #[arg(long)]
    metrics_listen: Option<SocketAddr>,

    /// Verify the appliance TLS certificate
    #[arg(long, env = "VERIFY_TLS", default_value_t = false)]
    verify_tls: bool,

    /// URL scheme for appliance requests
    #[arg(long, env = "BACKEND_SCHEME", default_value = "https")]
    backend_scheme: String,

    /// Retries for appliance operations that settle asynchronously
    #[arg(long, env = "BACKEND_RETRIES", default_value_t = 15)]
    backend_retries: u32,

    /// Delay between retries, in milliseconds
    #[arg(long, env = "BACKEND_DELAY_MS", default_value_t = 1500)]
    backend_delay_ms: u64,

    /// CHAP credential tag on the appliance
    #[arg(long, env = "DEFAULT_CHAP_TAG", default_value_t = 4730274)]
    chap_tag: u32,

    /// Default deduplication mode for new volumes
    #[arg(long, env = "DEFAULT_DEDUPLICATION", default_value = "OFF")]
    deduplication: String,

    /// Default compression for new volumes
    #[arg(long, env = "DEFAULT_COMPRESSION", default_value = "LZ4")]
    compression: String,

    /// Default sync mode for new volumes
    #[arg(long, env = "DEFAULT_SYNC", default_value = "STANDARD")]
    sync: String,

    /// Create sparse zvols by default ("true"/"false")
    #[arg(long, env = "DEFAULT_SPARSE", default_value = "true")]
    sparse: String,

    /// Default root dataset for new volumes
    #[arg(long, env = "DEFAULT_ROOT", default_value = "tank")]
    root: String,

    /// Default volume block size
    #[arg(long, env = "DEFAULT_VOLBLOCKSIZE", default_value = "8K")]
    volblocksize: String,

    /// Default dataset comment template
    #[arg(
        long,
        env = "DEFAULT_DESCRIPTION",
        default_value = "Dataset created by HPE CSI Driver for Kubernetes as {pv} in {namespace} from {pvc}"
    )]
    description: String,
}

impl Args {
    fn csp_config(&self) -> CspConfig {
        CspConfig {
            backend_scheme: self.backend_scheme.clone(),
            verify_tls: self.verify_tls,
            retry: RetryPolicy {
                attempts: self.backend_retries,
                delay: Duration::from_millis(self.backend_delay_ms),
            },
            chap_tag: self.chap_tag,
            dataset_defaults: DatasetDefaults {
                deduplication: self.deduplication.clone(),
                compression: self.compression.clone(),
                sync: self.sync.clone(),
                sparse: self.sparse.clone(),
                root: self.root.clone(),
                volblocksize: self.volblocksize.clone(),
                description: self.description.clone(),
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let default_level = if std::env::var_os("LOG_DEBUG").is_some() {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    info!("Starting truenas-csp on {}", args.listen);
    info!("Default root dataset: {}", args.root);

    if let Some(addr) = args.metrics_listen {
        metrics::serve(addr)?;
    }

    let state = Arc::new(AppState::new(args.csp_config())?);
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(args.listen).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
