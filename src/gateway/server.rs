//! Gateway transports: Unix socket server and stdio session.
//!
//! Both speak JSON lines. A connection that sends `subscribe` also
//! receives its tenant's events as [`Notification`] lines, interleaved
//! with responses.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;
use tokio::sync::broadcast;

use crate::config::GatewayConfig;
use crate::domain::{EventEnvelope, TenantId};
use crate::error::{JobBuildaError, Result};
use crate::gateway::messages::{GatewayError, Methods, Notification, Request, Response};
use crate::gateway::router::{Gateway, SubscribeParams, params};

struct Subscription {
    tenant: TenantId,
    rx: broadcast::Receiver<EventEnvelope>,
}

async fn next_event(
    subscription: &mut Option<Subscription>,
) -> std::result::Result<EventEnvelope, broadcast::error::RecvError> {
    match subscription {
        Some(sub) => sub.rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn write_line<W, T>(writer: &mut W, message: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut line = serde_json::to_vec(message)?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    writer.flush().await?;
    Ok(())
}

/// Serve one JSON-lines session until the reader hits EOF.
pub async fn serve_connection<R, W>(gateway: Arc<Gateway>, reader: R, mut writer: W) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut subscription: Option<Subscription> = None;

    loop {
        tokio::select! {
            read = lines.next_line() => {
                let Some(line) = read? else {
                    break;
                };
                let trimmed = line.trim();
                if !trimmed.is_empty() {
                    let response = dispatch(&gateway, trimmed, &mut subscription).await;
                    write_line(&mut writer, &response).await?;
                }
            }
            event = next_event(&mut subscription) => {
                match event {
                    Ok(event) => {
                        let wanted = subscription.as_ref().is_some_and(|s| s.tenant == event.tenant_id);
                        if wanted {
                            write_line(&mut writer, &Notification::from(&event)).await?;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        log::warn!("Subscriber lagged, {} events skipped", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        subscription = None;
                    }
                }
            }
        }
    }
    Ok(())
}

async fn dispatch(gateway: &Gateway, line: &str, subscription: &mut Option<Subscription>) -> Response {
    let request: Request = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(_) => return gateway.handle_line(line).await,
    };
    if request.method != Methods::SUBSCRIBE {
        return gateway.handle(request).await;
    }

    let tenant = params::<SubscribeParams>(request.params.clone()).map(|p| p.context.tenant_id);
    // Attach before acknowledging so no event after the ack is missed.
    let rx = gateway.subscribe();
    let response = gateway.handle(request).await;
    if let (true, Ok(tenant)) = (response.is_success(), tenant) {
        log::debug!("Connection subscribed to {}", tenant);
        *subscription = Some(Subscription { tenant, rx });
    }
    response
}

/// Serve a single session over stdin/stdout.
pub async fn serve_stdio(gateway: Arc<Gateway>) -> Result<()> {
    log::info!("Gateway serving on stdio");
    serve_connection(gateway, tokio::io::stdin(), tokio::io::stdout()).await
}

/// One occupied client slot, released on drop even if the session panics.
struct ClientSlot {
    clients: Arc<AtomicUsize>,
}

impl ClientSlot {
    fn claim(clients: &Arc<AtomicUsize>) -> Self {
        clients.fetch_add(1, Ordering::SeqCst);
        Self {
            clients: Arc::clone(clients),
        }
    }
}

impl Drop for ClientSlot {
    fn drop(&mut self) {
        self.clients.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Unix socket server accepting a bounded number of clients
pub struct GatewayServer {
    socket_path: PathBuf,
    max_clients: usize,
    gateway: Arc<Gateway>,
    clients: Arc<AtomicUsize>,
}

impl GatewayServer {
    pub fn new(config: &GatewayConfig, gateway: Arc<Gateway>) -> Self {
        Self {
            socket_path: config.socket_path.clone(),
            max_clients: config.max_clients.max(1),
            gateway,
            clients: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn client_count(&self) -> usize {
        self.clients.load(Ordering::SeqCst)
    }

    /// Serve until Ctrl-C.
    pub async fn run(&self) -> Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("Failed to listen for Ctrl-C: {}", e);
            }
        })
        .await
    }

    /// Serve until `shutdown` resolves, then remove the socket.
    pub async fn run_until<F: Future<Output = ()>>(&self, shutdown: F) -> Result<()> {
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)?;
        }
        if let Some(parent) = self.socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(&self.socket_path)
            .map_err(|e| JobBuildaError::Io(std::io::Error::new(e.kind(), format!("Failed to bind socket: {}", e))))?;
        log::info!("Gateway listening on {}", self.socket_path.display());

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, _addr) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            log::warn!("Accept error: {}", e);
                            continue;
                        }
                    };
                    let (reader, mut writer) = stream.into_split();

                    if self.client_count() >= self.max_clients {
                        log::warn!("Rejecting client, {} already connected", self.max_clients);
                        let busy = Response::error(0, GatewayError::internal_error("Gateway at capacity"));
                        let _ = write_line(&mut writer, &busy).await;
                        continue;
                    }

                    let slot = ClientSlot::claim(&self.clients);
                    let gateway = Arc::clone(&self.gateway);
                    log::debug!("Client connected ({} active)", self.client_count());

                    tokio::spawn(async move {
                        let _slot = slot;
                        if let Err(e) = serve_connection(gateway, reader, writer).await {
                            log::debug!("Client session ended with error: {}", e);
                        }
                    });
                }
                _ = &mut shutdown => {
                    log::info!("Gateway shutting down");
                    break;
                }
            }
        }

        let _ = std::fs::remove_file(&self.socket_path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::gateway::messages::ErrorCode;
    use crate::store::Database;
    use serde_json::{Value, json};
    use tokio::io::{AsyncBufReadExt, BufReader, DuplexStream, Lines};

    fn gateway() -> Arc<Gateway> {
        let db = Arc::new(Database::open_in_memory().unwrap());
        Arc::new(Gateway::with_database(db, &Config::default()).unwrap())
    }

    struct Client {
        tx: tokio::io::WriteHalf<DuplexStream>,
        lines: Lines<BufReader<tokio::io::ReadHalf<DuplexStream>>>,
    }

    impl Client {
        fn connect(gateway: Arc<Gateway>) -> Self {
            let (client, server) = tokio::io::duplex(64 * 1024);
            let (server_rx, server_tx) = tokio::io::split(server);
            tokio::spawn(serve_connection(gateway, server_rx, server_tx));
            let (client_rx, client_tx) = tokio::io::split(client);
            Self {
                tx: client_tx,
                lines: BufReader::new(client_rx).lines(),
            }
        }

        async fn send(&mut self, raw: &str) {
            self.tx.write_all(raw.as_bytes()).await.unwrap();
            self.tx.write_all(b"\n").await.unwrap();
        }

        async fn recv(&mut self) -> Value {
            let line = self.lines.next_line().await.unwrap().unwrap();
            serde_json::from_str(&line).unwrap()
        }

        async fn request(&mut self, value: Value) -> Value {
            self.send(&value.to_string()).await;
            self.recv().await
        }
    }

    fn expense(id: u64, tenant: &str) -> Value {
        json!({
            "id": id,
            "method": "tools/call",
            "params": {
                "name": "record_expense",
                "arguments": {"supplier": "CEF", "description": "Cable", "net_pence": 1000, "vat_pence": 200, "incurred_on": "2024-05-01"},
                "context": {"tenant_id": tenant}
            }
        })
    }

    #[tokio::test]
    async fn test_session_round_trip() {
        let mut client = Client::connect(gateway());

        let pong = client.request(json!({"id": 1, "method": "ping"})).await;
        assert_eq!(pong["id"], 1);
        assert_eq!(pong["result"]["pong"], true);

        client.send("this is not json").await;
        let parse = client.recv().await;
        assert_eq!(parse["error"]["code"], ErrorCode::PARSE_ERROR);

        let blank_then_ping = {
            client.send("").await;
            client.request(json!({"id": 2, "method": "ping"})).await
        };
        assert_eq!(blank_then_ping["id"], 2);
    }

    #[tokio::test]
    async fn test_subscribe_streams_only_own_tenant() {
        let gw = gateway();
        let mut watcher = Client::connect(Arc::clone(&gw));
        let mut other = Client::connect(Arc::clone(&gw));

        let ack = watcher
            .request(json!({"id": 1, "method": "subscribe", "params": {"context": {"tenant_id": "acme"}}}))
            .await;
        assert_eq!(ack["result"]["subscribed"], true);

        let created = other.request(expense(1, "globex")).await;
        assert!(created["result"].is_object());
        let created = other.request(expense(2, "acme")).await;
        assert!(created["result"].is_object());

        let note = watcher.recv().await;
        assert_eq!(note["event"], "expense.recorded");
        assert_eq!(note["data"]["tenant_id"], "acme");
        assert!(note.get("id").is_none());
    }

    #[tokio::test]
    async fn test_subscribe_without_context_is_rejected() {
        let mut client = Client::connect(gateway());
        let resp = client.request(json!({"id": 5, "method": "subscribe"})).await;
        assert_eq!(resp["id"], 5);
        assert_eq!(resp["error"]["code"], ErrorCode::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_unix_socket_server() {
        let dir = tempfile::tempdir().unwrap();
        let config = GatewayConfig {
            socket_path: dir.path().join("gw.sock"),
            max_clients: 4,
        };
        let server = Arc::new(GatewayServer::new(&config, gateway()));
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();

        let running = Arc::clone(&server);
        let handle = tokio::spawn(async move {
            running
                .run_until(async {
                    let _ = stop_rx.await;
                })
                .await
        });

        let mut stream = None;
        for _ in 0..50 {
            if let Ok(s) = tokio::net::UnixStream::connect(&config.socket_path).await {
                stream = Some(s);
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        let stream = stream.expect("server did not start");
        let (rx, mut tx) = stream.into_split();
        tx.write_all(b"{\"id\": 7, \"method\": \"initialize\"}\n").await.unwrap();
        let mut lines = BufReader::new(rx).lines();
        let line = lines.next_line().await.unwrap().unwrap();
        let resp: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(resp["id"], 7);
        assert_eq!(resp["result"]["name"], "jobbuilda");

        stop_tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
        assert!(!config.socket_path.exists());
    }

    #[tokio::test]
    async fn test_client_slot_is_released_when_session_panics() {
        let clients = Arc::new(AtomicUsize::new(0));
        let slot = ClientSlot::claim(&clients);
        assert_eq!(clients.load(Ordering::SeqCst), 1);

        let session = tokio::spawn(async move {
            let _slot = slot;
            panic!("session crashed");
        });
        assert!(session.await.unwrap_err().is_panic());
        assert_eq!(clients.load(Ordering::SeqCst), 0);
    }
}
