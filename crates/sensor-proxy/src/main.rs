use std::sync::Arc;

use clap::Parser;
use sensor_detect::{DetectionConfig, ForestModel, MlModel, NullModel, ProxyConfig};
use tracing::{error, info};

/// Screenwatch inline proxy: bridges a screen-share client to the
/// upstream server while monitoring the byte stream for exfiltration.
#[derive(Parser)]
#[command(name = "screenwatch-proxy")]
#[command(about = "Transparent session proxy with inline exfiltration detection")]
#[command(version)]
struct Cli {
    /// Client-side bind address.
    #[arg(long, default_value = "0.0.0.0:5900")]
    listen: String,

    /// Upstream target address.
    #[arg(long, default_value = "localhost:5901")]
    server: String,

    /// Alert sink (C7) endpoint.
    #[arg(long, default_value = "http://localhost:8000/api/v1/alerts")]
    alert_url: String,

    /// Auto-contain a session on an affirmative verdict of severity >= HIGH.
    #[arg(long)]
    contain_on_alert: bool,

    /// R1 clipboard-burst threshold, in KB.
    #[arg(long, default_value_t = 200)]
    clipboard_threshold_kb: u64,

    /// R2 frameburst threshold, in MB.
    #[arg(long, default_value_t = 10)]
    frameburst_threshold_mb: u64,

    /// R3 sustained-transfer rate threshold, in kbps.
    #[arg(long, default_value_t = 1000)]
    file_transfer_rate_kbps: u64,

    /// Enable verbose (debug) logging.
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false).with_thread_ids(false))
        .with(tracing_subscriber::filter::LevelFilter::from_level(level))
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let detection = DetectionConfig {
        clipboard_threshold_bytes: cli.clipboard_threshold_kb * 1024,
        frameburst_threshold_bytes: cli.frameburst_threshold_mb * 1024 * 1024,
        file_transfer_rate_kbps: cli.file_transfer_rate_kbps as f64,
        ..DetectionConfig::default().from_env()
    };

    let config = ProxyConfig { listen_addr: cli.listen, server_addr: cli.server, alert_url: cli.alert_url, contain_on_alert: cli.contain_on_alert, detection, ..ProxyConfig::default() };

    let model: Arc<dyn MlModel> = match std::env::var("MODEL_PATH") {
        Ok(path) => match ForestModel::load(&path) {
            Ok(model) => {
                info!(path, "loaded ML model");
                Arc::new(model)
            }
            Err(e) => {
                error!(path, error = %e, "model feature layout mismatch or load failure");
                std::process::exit(2);
            }
        },
        Err(_) => Arc::new(NullModel),
    };

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    match sensor_proxy::run(config, model, shutdown).await {
        Ok(()) => {
            info!("clean shutdown");
            std::process::exit(0);
        }
        Err(e) => {
            error!(error = %e, "failed to start listening");
            std::process::exit(1);
        }
    }
}
