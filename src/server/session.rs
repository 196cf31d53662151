//! One WebSocket subscriber connection
//!
//! The session upgrades the socket, attaches a bounded [`ChannelSink`] to the
//! hub, then pumps hub messages out and client messages in until either side
//! goes away.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;

use crate::error::{Error, Result};
use crate::hub::{ChannelSink, SessionId, Subscriber};
use crate::relay::Relay;
use crate::scanner::Prober;

use super::config::ServerConfig;

/// Serve a single accepted connection to completion
pub(crate) async fn serve<P: Prober>(
    session_id: SessionId,
    socket: TcpStream,
    peer_addr: SocketAddr,
    relay: Arc<Relay<P>>,
    config: ServerConfig,
) -> Result<()> {
    let endpoint = config.endpoint.as_str();
    let check_path = |request: &Request, response: Response| {
        if request.uri().path() == endpoint {
            Ok(response)
        } else {
            tracing::debug!(peer = %peer_addr, path = %request.uri().path(), "Rejecting upgrade");
            let mut rejection = ErrorResponse::new(Some("Not Found".to_string()));
            *rejection.status_mut() = StatusCode::NOT_FOUND;
            Err(rejection)
        }
    };

    let handshake = tokio_tungstenite::accept_hdr_async(socket, check_path);
    let ws = match timeout(config.handshake_timeout, handshake).await {
        Ok(ws) => ws?,
        Err(_) => {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "WebSocket handshake timed out",
            )))
        }
    };

    let (sink, mut outbound) = ChannelSink::new(config.outbound_queue);
    let sink: Arc<dyn Subscriber> = Arc::new(sink);
    if !relay.hub().subscribe(session_id, &sink) {
        return Ok(());
    }

    tracing::info!(session_id = session_id, peer = %peer_addr, "Subscriber connected");

    let (mut writer, mut reader) = ws.split();

    let result = loop {
        tokio::select! {
            message = outbound.recv() => match message {
                Some(text) => {
                    if let Err(e) = writer.send(Message::Text(text.to_string())).await {
                        break Err(e.into());
                    }
                }
                None => {
                    // Sink closed by the hub: pruned or relay shutting down
                    let _ = writer.send(Message::Close(None)).await;
                    break Ok(());
                }
            },
            incoming = reader.next() => match incoming {
                Some(Ok(Message::Text(text))) => relay.handle_client_message(session_id, &text),
                Some(Ok(Message::Close(_))) | None => break Ok(()),
                Some(Ok(_)) => {}
                Some(Err(e)) => break Err(e.into()),
            },
        }
    };

    relay.hub().unsubscribe(session_id);
    sink.close();

    tracing::info!(session_id = session_id, peer = %peer_addr, "Subscriber disconnected");
    result
}
