//! WebSocket server listener
//!
//! Handles TCP accept loop and spawns one session task per subscriber.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;

use crate::error::Result;
use crate::relay::Relay;
use crate::scanner::{HttpProber, Prober};
use crate::server::config::ServerConfig;
use crate::server::session;

/// Serves the relay's hub to WebSocket subscribers
pub struct RelayServer<P: Prober = HttpProber> {
    config: ServerConfig,
    relay: Arc<Relay<P>>,
    connection_semaphore: Option<Arc<Semaphore>>,
}

impl<P: Prober> RelayServer<P> {
    /// Create a new server for a relay
    pub fn new(config: ServerConfig, relay: Arc<Relay<P>>) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        Self {
            config,
            relay,
            connection_semaphore,
        }
    }

    /// Get a reference to the relay
    pub fn relay(&self) -> &Arc<Relay<P>> {
        &self.relay
    }

    /// Run the server
    ///
    /// This method blocks until the listener fails to bind.
    pub async fn run(&self) -> Result<()> {
        let listener = self.bind().await?;
        self.accept_loop(&listener).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        let listener = self.bind().await?;
        self.serve_until(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` resolves
    pub async fn serve_until<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                Ok(())
            }
            result = self.accept_loop(&listener) => result,
        }
    }

    async fn bind(&self) -> Result<TcpListener> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!(
            addr = %self.config.bind_addr,
            endpoint = %self.config.endpoint,
            "WebSocket server listening"
        );
        Ok(listener)
    }

    async fn accept_loop(&self, listener: &TcpListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => {
                    self.handle_connection(socket, peer_addr);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        // Check connection limit
        let permit = if let Some(ref sem) = self.connection_semaphore {
            match sem.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                    return;
                }
            }
        } else {
            None
        };

        let session_id = self.relay.hub().next_session_id();

        tracing::debug!(
            session_id = session_id,
            peer = %peer_addr,
            "New connection"
        );

        if self.config.tcp_nodelay {
            if let Err(e) = socket.set_nodelay(true) {
                tracing::error!(error = %e, "Failed to configure socket");
                return;
            }
        }

        let config = self.config.clone();
        let relay = Arc::clone(&self.relay);

        tokio::spawn(async move {
            // Held for the lifetime of the session
            let _permit = permit;

            if let Err(e) = session::serve(session_id, socket, peer_addr, relay, config).await {
                tracing::debug!(
                    session_id = session_id,
                    error = %e,
                    "Connection error"
                );
            }

            tracing::debug!(session_id = session_id, "Connection closed");
        });
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;
    use std::time::Duration;

    use bytes::Bytes;
    use futures_util::{SinkExt, StreamExt};
    use tokio::net::TcpStream;
    use tokio::sync::oneshot;
    use tokio_tungstenite::tungstenite::Message;
    use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

    use super::*;
    use crate::registry::DeviceId;
    use crate::relay::RelayConfig;
    use crate::scanner::{ProbeError, ProbeReport};

    struct NoDevices;

    impl Prober for NoDevices {
        async fn probe(&self, _ip: Ipv4Addr) -> std::result::Result<ProbeReport, ProbeError> {
            Err(ProbeError::Status(404))
        }
    }

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    async fn start(config: ServerConfig) -> (SocketAddr, Arc<Relay<NoDevices>>, oneshot::Sender<()>) {
        let relay = Arc::new(Relay::with_prober(RelayConfig::default(), NoDevices));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let server = RelayServer::new(config, relay.clone());
        tokio::spawn(async move {
            server
                .serve_until(listener, async {
                    let _ = stop_rx.await;
                })
                .await
        });

        (addr, relay, stop_tx)
    }

    async fn connect(addr: SocketAddr, path: &str) -> Client {
        let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{}{}", addr, path))
            .await
            .unwrap();
        ws
    }

    async fn next_json(ws: &mut Client) -> serde_json::Value {
        loop {
            let message = tokio::time::timeout(Duration::from_secs(5), ws.next())
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            if let Message::Text(text) = message {
                return serde_json::from_str(&text).unwrap();
            }
        }
    }

    async fn wait_for_subscribers(relay: &Relay<NoDevices>, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while relay.hub().subscriber_count() != count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_subscriber_receives_welcome_and_frames() {
        let (addr, relay, _stop) = start(ServerConfig::default()).await;
        let mut ws = connect(addr, "/ws/screen").await;

        let welcome = next_json(&mut ws).await;
        assert_eq!(welcome["type"], "welcome");
        assert_eq!(welcome["v"], 1);

        wait_for_subscribers(&relay, 1).await;
        relay
            .hub()
            .publish_frame(DeviceId::new(3), &Bytes::from_static(&[0xFF, 0xD8, 0xFF, 0xD9]));

        let frame = next_json(&mut ws).await;
        assert_eq!(frame["type"], "frame");
        assert_eq!(frame["deviceId"], 3);
        assert_eq!(frame["image"], "data:image/jpeg;base64,/9j/2Q==");
    }

    #[tokio::test]
    async fn test_ping_and_device_list_requests() {
        let (addr, _relay, _stop) = start(ServerConfig::default()).await;
        let mut ws = connect(addr, "/ws/screen").await;
        next_json(&mut ws).await;

        ws.send(Message::Text(r#"{"type":"ping"}"#.into())).await.unwrap();
        assert_eq!(next_json(&mut ws).await["type"], "pong");

        ws.send(Message::Text(r#"{"type":"request_device_list"}"#.into()))
            .await
            .unwrap();
        let list = next_json(&mut ws).await;
        assert_eq!(list["type"], "device_list");
        assert_eq!(list["devices"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_other_paths_rejected() {
        let (addr, relay, _stop) = start(ServerConfig::default()).await;

        let result = tokio_tungstenite::connect_async(format!("ws://{}/other", addr)).await;

        match result {
            Err(tokio_tungstenite::tungstenite::Error::Http(response)) => {
                assert_eq!(response.status(), 404);
            }
            other => panic!("expected 404, got {:?}", other.map(|_| ())),
        }
        assert_eq!(relay.hub().subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_disconnect_unsubscribes() {
        let (addr, relay, _stop) = start(ServerConfig::default()).await;
        let mut ws = connect(addr, "/ws/screen").await;
        next_json(&mut ws).await;
        wait_for_subscribers(&relay, 1).await;

        ws.close(None).await.unwrap();

        wait_for_subscribers(&relay, 0).await;
    }

    #[tokio::test]
    async fn test_relay_shutdown_closes_sessions() {
        let (addr, relay, _stop) = start(ServerConfig::default()).await;
        let mut ws = connect(addr, "/ws/screen").await;
        next_json(&mut ws).await;
        wait_for_subscribers(&relay, 1).await;

        relay.shutdown();

        let closed = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match ws.next().await {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(_)) => {}
                }
            }
        })
        .await;
        assert!(closed.is_ok());
    }

    #[tokio::test]
    async fn test_connection_limit() {
        let (addr, relay, _stop) = start(ServerConfig::default().max_connections(1)).await;
        let mut first = connect(addr, "/ws/screen").await;
        next_json(&mut first).await;
        wait_for_subscribers(&relay, 1).await;

        let second = tokio_tungstenite::connect_async(format!("ws://{}/ws/screen", addr)).await;

        assert!(second.is_err());
        assert_eq!(relay.hub().subscriber_count(), 1);
    }
}
