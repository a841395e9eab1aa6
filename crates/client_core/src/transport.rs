use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        client::IntoClientRequest,
        http::{header::ORIGIN, HeaderValue},
        Message,
    },
};
use tracing::{debug, warn};
use url::Url;

use crate::error::TransportError;

pub type InboundFrame = Result<String, TransportError>;

/// An open transport. Dropping `outbound` closes the connection; `inbound`
/// yields `None` once the peer has gone away.
pub struct TransportLink {
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: mpsc::UnboundedReceiver<InboundFrame>,
}

impl TransportLink {
    pub fn new(
        outbound: mpsc::UnboundedSender<String>,
        inbound: mpsc::UnboundedReceiver<InboundFrame>,
    ) -> Self {
        Self { outbound, inbound }
    }
}

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn open(&self, url: &Url) -> Result<TransportLink, TransportError>;
}

#[derive(Debug, Clone, Default)]
pub struct WebSocketTransport {
    origin: Option<String>,
}

impl WebSocketTransport {
    pub fn new(origin: Option<String>) -> Self {
        Self { origin }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(&self, url: &Url) -> Result<TransportLink, TransportError> {
        let connect_error = |reason: String| TransportError::Connect {
            url: url.to_string(),
            reason,
        };
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|err| connect_error(err.to_string()))?;
        if let Some(origin) = &self.origin {
            let value = HeaderValue::from_str(origin)
                .map_err(|err| connect_error(format!("invalid origin header: {err}")))?;
            request.headers_mut().insert(ORIGIN, value);
        }

        let (ws_stream, _) = connect_async(request)
            .await
            .map_err(|err| connect_error(err.to_string()))?;
        debug!(%url, "transport: websocket open");
        let (mut ws_writer, mut ws_reader) = ws_stream.split();

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<InboundFrame>();

        tokio::spawn(async move {
            while let Some(text) = outbound_rx.recv().await {
                if let Err(err) = ws_writer.send(Message::Text(text)).await {
                    warn!(%err, "transport: websocket send failed");
                    break;
                }
            }
            let _ = ws_writer.close().await;
        });

        tokio::spawn(async move {
            while let Some(msg) = ws_reader.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        if inbound_tx.send(Ok(text)).is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(frame)) => {
                        debug!(?frame, "transport: websocket closed by peer");
                        break;
                    }
                    Ok(_) => {}
                    Err(err) => {
                        let _ = inbound_tx.send(Err(TransportError::Receive(err.to_string())));
                        break;
                    }
                }
            }
        });

        Ok(TransportLink::new(outbound_tx, inbound_rx))
    }
}
