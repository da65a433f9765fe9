//! WebSocket connection server
//!
//! One axum listener serves the command socket at `/` and `/ws` plus a small
//! JSON status endpoint.  Each upgraded socket runs a single select loop:
//!
//! ```text
//!   inbound frame ──► Dispatcher::handle_frame(reply)
//!   outbox        ──► encode ──► socket
//!   log feed      ──► debugLog ──► socket
//!   shutdown      ──► close frame, deregister
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower_http::cors::CorsLayer;
use tracing::{debug, error, info, warn};
use webcontrol_proto::protocol::{Response, PROTOCOL_VERSION};

use crate::connection::ConnectionRegistry;
use crate::dispatcher::Dispatcher;
use crate::download::DownloadManager;
use crate::error::ServerError;
use crate::filesystem::ContentRoots;
use crate::host::Host;
use crate::logging::LogLine;
use crate::queue::TaskQueue;

/// How long `stop()` waits for sockets and the listener to wind down.
const STOP_GRACE: Duration = Duration::from_secs(5);

#[derive(Clone)]
struct Shared {
    dispatcher: Dispatcher,
    registry: Arc<ConnectionRegistry>,
    queue: Arc<TaskQueue<Host>>,
    downloads: Arc<DownloadManager>,
    logs: broadcast::Sender<LogLine>,
    shutdown: CancellationToken,
    connections: TaskTracker,
}

struct Running {
    addr: SocketAddr,
    shutdown: CancellationToken,
    connections: TaskTracker,
    serve: tokio::task::JoinHandle<()>,
}

pub struct ConnectionServer {
    dispatcher: Dispatcher,
    registry: Arc<ConnectionRegistry>,
    queue: Arc<TaskQueue<Host>>,
    downloads: Arc<DownloadManager>,
    logs: broadcast::Sender<LogLine>,
    running: Option<Running>,
}

impl ConnectionServer {
    pub fn new(
        queue: Arc<TaskQueue<Host>>,
        roots: Arc<ContentRoots>,
        downloads: Arc<DownloadManager>,
        logs: broadcast::Sender<LogLine>,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let dispatcher = Dispatcher::new(queue.clone(), roots, downloads.clone(), registry.clone());
        Self {
            dispatcher,
            registry,
            queue,
            downloads,
            logs,
            running: None,
        }
    }

    /// Bind `bind` and start accepting.  Returns the bound address, so
    /// `127.0.0.1:0` picks a free port.
    pub async fn start(&mut self, bind: &str) -> Result<SocketAddr, ServerError> {
        if self.running.is_some() {
            return Err(ServerError::AlreadyRunning);
        }

        let listener = TcpListener::bind(bind)
            .await
            .map_err(|source| ServerError::Bind {
                addr: bind.to_string(),
                source,
            })?;
        let addr = listener.local_addr()?;

        let shutdown = CancellationToken::new();
        let connections = TaskTracker::new();
        let shared = Shared {
            dispatcher: self.dispatcher.clone(),
            registry: self.registry.clone(),
            queue: self.queue.clone(),
            downloads: self.downloads.clone(),
            logs: self.logs.clone(),
            shutdown: shutdown.clone(),
            connections: connections.clone(),
        };
        let app = router(shared);

        let token = shutdown.clone();
        let serve = tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(async move {
                token.cancelled().await;
            });
            if let Err(e) = server.await {
                error!("Command server error: {}", e);
            }
        });

        info!("Command server listening at ws://{}", addr);
        self.running = Some(Running {
            addr,
            shutdown,
            connections,
            serve,
        });
        Ok(addr)
    }

    /// Close every connection, release the listener and cancel in-flight
    /// downloads.  Does nothing when the server is not running.
    pub async fn stop(&mut self) {
        let Some(mut running) = self.running.take() else {
            debug!("stop: command server not running");
            return;
        };

        info!("Stopping command server on {}", running.addr);
        running.shutdown.cancel();
        running.connections.close();

        if tokio::time::timeout(STOP_GRACE, running.connections.wait())
            .await
            .is_err()
        {
            warn!("Connections still open after {:?}", STOP_GRACE);
        }
        match tokio::time::timeout(STOP_GRACE, &mut running.serve).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Command server task ended abnormally: {}", e),
            Err(_) => {
                warn!("Listener did not shut down in {:?}, aborting", STOP_GRACE);
                running.serve.abort();
            }
        }

        self.downloads.shutdown();
        info!("Command server stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|r| r.addr)
    }

    pub fn open_connections(&self) -> usize {
        self.registry.open_count()
    }
}

impl Drop for ConnectionServer {
    fn drop(&mut self) {
        if let Some(running) = &self.running {
            running.shutdown.cancel();
        }
    }
}

fn router(shared: Shared) -> Router {
    Router::new()
        .route("/", get(ws_route))
        .route("/ws", get(ws_route))
        .route("/api/status", get(status))
        .layer(CorsLayer::permissive())
        .with_state(shared)
}

// ── HTTP ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct StatusBody {
    protocol_version: u32,
    connections: usize,
    pending_tasks: usize,
    active_downloads: usize,
}

async fn status(State(shared): State<Shared>) -> impl IntoResponse {
    Json(StatusBody {
        protocol_version: PROTOCOL_VERSION,
        connections: shared.registry.open_count(),
        pending_tasks: shared.queue.len(),
        active_downloads: shared.downloads.active_jobs(),
    })
}

// ── WebSocket ─────────────────────────────────────────────────────────────────

async fn ws_route(ws: WebSocketUpgrade, State(shared): State<Shared>) -> impl IntoResponse {
    let connections = shared.connections.clone();
    ws.on_upgrade(move |socket| connections.track_future(handle_socket(socket, shared)))
}

async fn handle_socket(socket: WebSocket, shared: Shared) {
    let (reply, mut outbox) = shared.registry.register();
    let id = reply.connection();
    let mut logs = shared.logs.subscribe();
    let mut logs_open = true;
    let (mut sender, mut receiver) = socket.split();

    shared.registry.mark_open(id);
    info!("Client {} connected", id);

    loop {
        tokio::select! {
            _ = shared.shutdown.cancelled() => {
                let close = Message::Close(Some(CloseFrame {
                    code: close_code::AWAY,
                    reason: "server shutting down".into(),
                }));
                let _ = sender.send(close).await;
                break;
            }

            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        shared.dispatcher.handle_frame(text.as_bytes(), &reply);
                    }
                    Some(Ok(Message::Binary(data))) => {
                        shared.dispatcher.handle_frame(&data, &reply);
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Client {} closed connection", id);
                        break;
                    }
                    // Ping/pong are answered by the transport
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("Read error from client {}: {}", id, e);
                        break;
                    }
                }
            }

            Some(response) = outbox.recv() => {
                if !send_response(&mut sender, &response).await {
                    break;
                }
            }

            line = logs.recv(), if logs_open => {
                match line {
                    Ok(line) => {
                        let response = Response::DebugLog {
                            message: line.message,
                            timestamp: line.timestamp,
                        };
                        if !send_response(&mut sender, &response).await {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        debug!("Client {} skipped {} log lines", id, n);
                    }
                    Err(broadcast::error::RecvError::Closed) => logs_open = false,
                }
            }
        }
    }

    shared.registry.deregister(id);
    info!("Client {} disconnected", id);
}

/// `false` once the socket is unusable.
async fn send_response<S>(sender: &mut S, response: &Response) -> bool
where
    S: futures_util::Sink<Message> + Unpin,
{
    let text = match response.encode() {
        Ok(t) => t,
        Err(e) => {
            error!("Failed to encode {:?}: {}", response, e);
            return true;
        }
    };
    sender.send(Message::Text(text)).await.is_ok()
}
