//! C6: Session Proxy — accept loop and the bidirectional forwarding
//! loop with interposed monitoring and containment (spec.md §4.5).

use std::sync::Arc;
use std::time::Duration;

use sensor_detect::{Direction, MlModel, ProxyConfig, Severity};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::alert_client::{build_payload, AlertClient};
use crate::session::{Session, SessionState};

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("failed to bind listen address {addr}: {source}")]
    Listen { addr: String, #[source] source: std::io::Error },
}

/// Runs the accept loop until `shutdown` resolves. Each accepted
/// connection becomes one Session with two forwarder tasks.
pub async fn run(config: ProxyConfig, model: Arc<dyn MlModel>, shutdown: impl std::future::Future<Output = ()>) -> Result<(), ProxyError> {
    let listener =
        TcpListener::bind(&config.listen_addr).await.map_err(|source| ProxyError::Listen { addr: config.listen_addr.clone(), source })?;
    info!(listen = %config.listen_addr, server = %config.server_addr, "proxy listening");

    let config = Arc::new(config);
    let alert_client = Arc::new(AlertClient::new(config.alert_url.clone(), config.alert_timeout_sec));

    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("shutdown signal received, no longer accepting connections");
                return Ok(());
            }
            accepted = listener.accept() => {
                let (client_stream, client_addr) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                        continue;
                    }
                };
                let config = config.clone();
                let model = model.clone();
                let alert_client = alert_client.clone();
                tokio::spawn(async move {
                    handle_connection(client_stream, client_addr.to_string(), config, model, alert_client).await;
                });
            }
        }
    }
}

async fn handle_connection(
    client_stream: TcpStream,
    client_addr: String,
    config: Arc<ProxyConfig>,
    model: Arc<dyn MlModel>,
    alert_client: Arc<AlertClient>,
) {
    let connect = tokio::time::timeout(Duration::from_secs(config.connect_timeout_sec), TcpStream::connect(&config.server_addr)).await;
    let server_stream = match connect {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            warn!(client = %client_addr, error = %e, "upstream dial failed");
            return;
        }
        Err(_) => {
            warn!(client = %client_addr, "upstream dial timed out");
            return;
        }
    };

    let session_id = format!("SESSION_{}", Uuid::new_v4());
    let session = Arc::new(Session::new(session_id.clone(), client_addr.clone(), config.server_addr.clone(), config.window_capacity));
    info!(session_id = %session_id, client = %client_addr, "session established");

    let (client_read, client_write) = client_stream.into_split();
    let (server_read, server_write) = server_stream.into_split();

    let c2s = tokio::spawn(forward_direction(
        session.clone(),
        client_read,
        server_write,
        Direction::ClientToServer,
        config.clone(),
        model.clone(),
        alert_client.clone(),
    ));
    let s2c = tokio::spawn(forward_direction(
        session.clone(),
        server_read,
        client_write,
        Direction::ServerToClient,
        config,
        model,
        alert_client,
    ));

    let _ = tokio::join!(c2s, s2c);
    session.close();
    info!(session_id = %session_id, "session closed");
}

/// One direction's forwarding loop (spec.md §4.5 "Forwarding loop").
async fn forward_direction(
    session: Arc<Session>,
    mut reader: OwnedReadHalf,
    mut writer: OwnedWriteHalf,
    direction: Direction,
    config: Arc<ProxyConfig>,
    model: Arc<dyn MlModel>,
    alert_client: Arc<AlertClient>,
) {
    let mut buf = vec![0u8; config.max_chunk];
    loop {
        if session.state() == SessionState::Contained {
            break;
        }

        // Obtain the notified future before the second state check so a
        // contain() landing between the two checks is not missed (the
        // Notify is guaranteed to be observed by any Notified created
        // before notify_waiters() fires, even if not yet polled).
        let contained = session.contained();
        if session.state() == SessionState::Contained {
            break;
        }

        let read = tokio::select! {
            _ = contained => {
                debug!(session_id = %session.session_id, "containment signalled, aborting read for this direction");
                break;
            }
            read = tokio::time::timeout(Duration::from_secs(config.io_timeout_sec), reader.read(&mut buf)) => read,
        };
        let n = match read {
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => n,
            Ok(Err(e)) => {
                debug!(session_id = %session.session_id, error = %e, "read error, closing direction");
                break;
            }
            Err(_) => {
                debug!(session_id = %session.session_id, "read timed out, closing direction");
                break;
            }
        };

        if session.state() == SessionState::Contained {
            break;
        }

        let (verdict, counters) = session.observe_chunk(direction, n as u64, &config.detection, model.as_ref()).await;

        if verdict.is_alert {
            let timestamp = session.now();
            let recent_samples = session.recent_samples(20).await;
            let payload = build_payload(&session, direction, n as u64, &verdict, timestamp, &recent_samples, counters);

            let mut should_contain = config.contain_on_alert && verdict.severity >= Severity::High;
            match alert_client.post_alert(&payload).await {
                Ok(response) => {
                    if response.action == "contain" {
                        should_contain = true;
                    }
                }
                Err(e) => {
                    warn!(session_id = %session.session_id, error = %e, "alert sink unreachable, continuing uncontained");
                }
            }
            if should_contain {
                session.contain();
            }
        }

        if session.state() == SessionState::Contained {
            break;
        }

        if let Err(e) = writer.write_all(&buf[..n]).await {
            debug!(session_id = %session.session_id, error = %e, "destination closed");
            break;
        }
    }
    let _ = writer.shutdown().await;
}
