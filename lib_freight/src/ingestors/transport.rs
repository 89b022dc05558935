//! # Socket Transport
//!
//! The seam between the reconnecting socket client and the wire. A
//! [`Connector`] turns a URL into a [`Link`]: an outbound text sender plus an
//! inbound stream of [`LinkEvent`]s. The client never touches the socket
//! itself, so its state machine can be driven by a scripted link in tests.
//!
//! [`WsConnector`] is the production implementation on top of
//! `tokio-tungstenite`. Each link is serviced by one pump task that owns the
//! split stream; dropping the link's outbound sender makes the pump send a
//! close frame and exit.

use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::socket_client::SocketError;

/// Something that happened on an established link.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// A UTF-8 text frame (binary frames holding valid UTF-8 are delivered here too).
    Text(String),
    /// The transport closed, locally or remotely. Always the last event.
    Closed {
        /// Close code, when the peer sent one.
        code: Option<u16>,
        /// Close reason or a description of the failure.
        reason: String,
    },
    /// A transport error; a `Closed` event follows.
    Error(String),
}

/// An open transport.
#[derive(Debug)]
pub struct Link {
    /// Text frames to write. Dropping the sender closes the transport.
    pub outbound: mpsc::UnboundedSender<String>,
    /// Everything read from the transport, in receipt order.
    pub inbound: mpsc::UnboundedReceiver<LinkEvent>,
}

/// Opens transports for the socket client.
pub trait Connector: Send + Sync + 'static {
    /// Starts opening `url`, offering `protocols` during the handshake.
    fn connect(&self, url: &str, protocols: &[String]) -> BoxFuture<'static, Result<Link, SocketError>>;
}

/// WebSocket transport over `tokio-tungstenite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl Connector for WsConnector {
    fn connect(&self, url: &str, protocols: &[String]) -> BoxFuture<'static, Result<Link, SocketError>> {
        let url = url.to_string();
        let protocols = protocols.join(", ");

        Box::pin(async move {
            let mut request = url
                .as_str()
                .into_client_request()
                .map_err(|e| SocketError::InvalidUrl(format!("{}: {}", url, e)))?;
            if !protocols.is_empty() {
                let value = HeaderValue::from_str(&protocols)
                    .map_err(|e| SocketError::InvalidUrl(format!("sub-protocols: {}", e)))?;
                request.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, value);
            }

            let (stream, _response) = connect_async(request)
                .await
                .map_err(|e| SocketError::Connect(e.to_string()))?;
            log::debug!("WebSocket handshake with {} complete", url);

            let (outbound, outbound_rx) = mpsc::unbounded_channel();
            let (inbound_tx, inbound) = mpsc::unbounded_channel();
            tokio::spawn(pump(stream, outbound_rx, inbound_tx));

            Ok(Link { outbound, inbound })
        })
    }
}

/// Moves frames between the socket and the link channels until either side goes away.
async fn pump(
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    mut outbound: mpsc::UnboundedReceiver<String>,
    inbound: mpsc::UnboundedSender<LinkEvent>,
) {
    let (mut write, mut read) = stream.split();

    loop {
        tokio::select! {
            out = outbound.recv() => match out {
                Some(text) => {
                    if let Err(e) = write.send(Message::Text(text.into())).await {
                        let _ = inbound.send(LinkEvent::Error(e.to_string()));
                        let _ = inbound.send(LinkEvent::Closed { code: None, reason: "write failed".to_string() });
                        break;
                    }
                }
                None => {
                    // The client dropped the link: close politely.
                    let _ = write.send(Message::Close(None)).await;
                    let _ = write.close().await;
                    break;
                }
            },
            msg = read.next() => {
                let event = match msg {
                    Some(Ok(Message::Text(text))) => LinkEvent::Text(text.as_str().to_owned()),
                    Some(Ok(Message::Binary(bin))) => match String::from_utf8(bin.to_vec()) {
                        Ok(text) => LinkEvent::Text(text),
                        Err(_) => {
                            log::warn!("Dropping non UTF-8 binary frame ({} bytes)", bin.len());
                            continue;
                        }
                    },
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = match frame {
                            Some(f) => (Some(u16::from(f.code)), f.reason.as_str().to_owned()),
                            None => (None, "closed by peer".to_string()),
                        };
                        let _ = inbound.send(LinkEvent::Closed { code, reason });
                        break;
                    }
                    // Ping/pong are answered by tungstenite.
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        log::error!("WSS Read Error: {}", e);
                        let _ = inbound.send(LinkEvent::Error(e.to_string()));
                        let _ = inbound.send(LinkEvent::Closed { code: None, reason: "read failed".to_string() });
                        break;
                    }
                    None => {
                        let _ = inbound.send(LinkEvent::Closed { code: None, reason: "stream ended".to_string() });
                        break;
                    }
                };
                if inbound.send(event).is_err() {
                    break;
                }
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bad_url_is_rejected_before_dialing() {
        let err = WsConnector.connect("not a url", &[]).await.unwrap_err();
        assert!(matches!(err, SocketError::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn refused_connection_reports_connect_error() {
        let err = WsConnector
            .connect("ws://127.0.0.1:9/ws", &["freight.v1".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, SocketError::Connect(_)));
    }
}
