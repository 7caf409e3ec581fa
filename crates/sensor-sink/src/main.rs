use std::sync::Arc;

use clap::{Parser, Subcommand};
use sensor_detect::{ForestModel, MlModel, NullModel, SinkConfig};
use sensor_sink::{recompute_leaf_hashes, verify_anchor, AlertSink, AnchorService, ForensicWriter, SessionRegistry};
use sensor_storage::JsonLinesLog;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "screenwatch-sink")]
#[command(about = "Alert ingestion, forensic writer and Merkle anchor service")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// HTTP listen address for `serve`.
    #[arg(long, default_value = "0.0.0.0:8000")]
    listen: String,

    /// Optional append-only alert replay log (JSON-lines).
    #[arg(long)]
    alert_log: Option<String>,

    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP alert-ingestion service (default if omitted).
    Serve,
    /// Inspect persisted anchors.
    Anchor {
        #[command(subcommand)]
        action: AnchorCommand,
    },
}

#[derive(Subcommand)]
enum AnchorCommand {
    /// List anchor ids under ANCHOR_DIR.
    List,
    /// Recompute an anchor's Merkle root from a set of forensic records
    /// and compare it against the stored root.
    Verify {
        anchor_id: String,
        /// Forensic record ids, in the order they were originally
        /// enqueued for this anchor.
        #[arg(long, value_delimiter = ',')]
        record_ids: Vec<String>,
    },
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false).with_thread_ids(false))
        .with(tracing_subscriber::filter::LevelFilter::from_level(level))
        .init();
}

fn load_model(config: &SinkConfig) -> Arc<dyn MlModel> {
    match &config.model_path {
        Some(path) => match ForestModel::load(path) {
            Ok(model) => {
                info!(path, "loaded ML model");
                Arc::new(model)
            }
            Err(e) => {
                error!(path, error = %e, "model feature layout mismatch or load failure");
                std::process::exit(2);
            }
        },
        None => Arc::new(NullModel),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let config = SinkConfig::default();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let model = load_model(&config);
            let forensic_writer = match ForensicWriter::new(config.forensic_dir.clone(), config.forensic_write_retries).await {
                Ok(w) => w,
                Err(e) => {
                    error!(error = %e, "failed to initialize forensic writer");
                    std::process::exit(2);
                }
            };
            let signer = Arc::new(sensor_crypto::HmacSigner::new("local", b"screenwatch-local-anchor-key".to_vec()));
            let anchor_service = match AnchorService::new(
                config.anchor_dir.clone(),
                signer,
                config.anchor_batch_size,
                config.anchor_interval_sec,
                config.backpressure_multiplier,
            )
            .await
            {
                Ok(s) => Arc::new(s),
                Err(e) => {
                    error!(error = %e, "failed to initialize anchor service");
                    std::process::exit(2);
                }
            };

            let replay_log = match &cli.alert_log {
                Some(path) => match JsonLinesLog::open(path).await {
                    Ok(log) => Some(log),
                    Err(e) => {
                        error!(error = %e, "failed to open alert replay log");
                        std::process::exit(2);
                    }
                },
                None => None,
            };

            let sink = Arc::new(AlertSink::new(config, model, forensic_writer, anchor_service.clone(), replay_log));
            let sessions = Arc::new(SessionRegistry::new());

            let shutdown = async {
                let _ = tokio::signal::ctrl_c().await;
            };
            let batcher_shutdown = async {
                let _ = tokio::signal::ctrl_c().await;
            };
            let batcher = tokio::spawn(anchor_service.run_batcher(batcher_shutdown));

            let app = sensor_sink::http::router(sink, sessions);
            let listener = match tokio::net::TcpListener::bind(&cli.listen).await {
                Ok(l) => l,
                Err(e) => {
                    error!(error = %e, addr = %cli.listen, "failed to bind listen address");
                    std::process::exit(1);
                }
            };
            info!(listen = %cli.listen, "alert sink listening");

            tokio::select! {
                result = axum::serve(listener, app) => {
                    if let Err(e) = result {
                        error!(error = %e, "http server error");
                        std::process::exit(1);
                    }
                }
                _ = shutdown => {
                    info!("shutdown signal received");
                }
            }
            let _ = batcher.await;
            std::process::exit(0);
        }

        Command::Anchor { action } => {
            let signer = Arc::new(sensor_crypto::HmacSigner::new("local", b"screenwatch-local-anchor-key".to_vec()));
            let anchor_service =
                match AnchorService::new(config.anchor_dir.clone(), signer, config.anchor_batch_size, config.anchor_interval_sec, config.backpressure_multiplier)
                    .await
                {
                    Ok(s) => s,
                    Err(e) => {
                        error!(error = %e, "failed to open anchor store");
                        std::process::exit(2);
                    }
                };

            match action {
                AnchorCommand::List => match anchor_service.list().await {
                    Ok(ids) => println!("{}", serde_json::to_string_pretty(&ids).unwrap()),
                    Err(e) => {
                        error!(error = %e, "failed to list anchors");
                        std::process::exit(1);
                    }
                },
                AnchorCommand::Verify { anchor_id, record_ids } => {
                    let anchor = match anchor_service.get(&anchor_id).await {
                        Ok(Some(a)) => a,
                        Ok(None) => {
                            error!(anchor_id, "anchor not found");
                            std::process::exit(1);
                        }
                        Err(e) => {
                            error!(error = %e, "failed to read anchor");
                            std::process::exit(1);
                        }
                    };

                    let forensic_writer = match ForensicWriter::new(config.forensic_dir.clone(), 1).await {
                        Ok(w) => w,
                        Err(e) => {
                            error!(error = %e, "failed to open forensic store");
                            std::process::exit(1);
                        }
                    };
                    let mut records = Vec::with_capacity(record_ids.len());
                    for id in &record_ids {
                        match forensic_writer.read(id).await {
                            Ok(Some(record)) => records.push(record),
                            Ok(None) => {
                                error!(forensic_id = %id, "forensic record not found");
                                std::process::exit(1);
                            }
                            Err(e) => {
                                error!(error = %e, "failed to read forensic record");
                                std::process::exit(1);
                            }
                        }
                    }

                    let leaf_hashes = match recompute_leaf_hashes(&records) {
                        Ok(h) => h,
                        Err(e) => {
                            error!(error = %e, "failed to recanonicalize forensic records");
                            std::process::exit(1);
                        }
                    };

                    let outcome = verify_anchor(&anchor, &leaf_hashes);
                    println!("{}", serde_json::json!({
                        "anchor_id": anchor.anchor_id,
                        "matches": outcome.matches,
                        "first_divergence": outcome.first_divergence,
                    }));
                    if !outcome.matches {
                        std::process::exit(1);
                    }
                }
            }
        }
    }
}
