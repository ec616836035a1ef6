// src/stream/websocket.rs

//! Live-search connector over websockets (`tokio-tungstenite`).

use std::time::Duration;

use futures_util::StreamExt;
use futures_util::future::BoxFuture;
use reqwest::Url;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{MarketSettings, StreamSettings};
use crate::errors::{Result, WatchError};
use crate::stream::transport::{StreamTransport, push_frame};
use crate::stream::{StreamConnector, StreamTarget};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens one websocket per watch at `{stream_url}/{season}/{search}`.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    market: MarketSettings,
    settings: StreamSettings,
}

impl WebSocketConnector {
    pub fn new(market: MarketSettings, settings: StreamSettings) -> Self {
        Self { market, settings }
    }

    /// Full stream URL for a target; season and search ids are
    /// percent-encoded as path segments.
    pub fn stream_url(&self, target: &StreamTarget) -> Result<Url> {
        let mut url = Url::parse(&self.market.stream_url)
            .map_err(|e| WatchError::ConnectFailed(format!("invalid stream url: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| WatchError::ConnectFailed("stream url cannot be a base".to_string()))?
            .pop_if_empty()
            .push(&target.season_id)
            .push(&target.search_id);
        Ok(url)
    }

    fn build_request(&self, target: &StreamTarget) -> Result<Request> {
        let url = self.stream_url(target)?;
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| WatchError::ConnectFailed(e.to_string()))?;

        for (name, value) in self.market.header_pairs(&target.credential) {
            let value = HeaderValue::from_str(&value).map_err(|e| {
                WatchError::ConnectFailed(format!("invalid value for header '{name}': {e}"))
            })?;
            request.headers_mut().insert(name, value);
        }
        Ok(request)
    }
}

impl StreamConnector for WebSocketConnector {
    fn connect<'a>(&'a self, target: &'a StreamTarget) -> BoxFuture<'a, Result<StreamTransport>> {
        Box::pin(async move {
            let request = self.build_request(target)?;
            let label = target.label();
            info!(stream = %label, uri = %request.uri(), "connecting live search");

            let (ws, response) =
                match timeout(self.settings.connect_timeout, connect_async(request)).await {
                    Ok(Ok(pair)) => pair,
                    Ok(Err(e)) => {
                        warn!(stream = %label, error = %e, "live search connection failed");
                        return Err(WatchError::ConnectFailed(e.to_string()));
                    }
                    Err(_) => {
                        warn!(stream = %label, "live search connection timed out");
                        return Err(WatchError::ConnectFailed(format!(
                            "timed out after {:?}",
                            self.settings.connect_timeout
                        )));
                    }
                };
            debug!(stream = %label, status = %response.status(), "live search connected");

            let (tx, rx) = mpsc::channel(self.settings.queue_capacity);
            let cancel = CancellationToken::new();
            let reader = tokio::spawn(read_loop(
                ws,
                tx,
                cancel.clone(),
                self.settings.close_timeout,
                label.clone(),
            ));

            Ok(StreamTransport::new(label, rx, reader, cancel))
        })
    }
}

/// Background reader: owns the socket, forwards text frames, and performs
/// the close handshake when cancelled.
async fn read_loop(
    mut ws: WsStream,
    tx: mpsc::Sender<String>,
    cancel: CancellationToken,
    close_timeout: Duration,
    label: String,
) {
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = ws.next() => next,
        };

        match next {
            Some(Ok(Message::Text(text))) => {
                if !push_frame(&tx, &cancel, text.as_str().to_owned()).await {
                    break;
                }
            }
            Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                Ok(text) => {
                    if !push_frame(&tx, &cancel, text).await {
                        break;
                    }
                }
                Err(_) => debug!(stream = %label, "ignoring non-utf8 binary frame"),
            },
            Some(Ok(Message::Close(frame))) => {
                info!(stream = %label, frame = ?frame, "live search closed by peer");
                return;
            }
            // Pings are answered by tungstenite itself.
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                warn!(stream = %label, error = %e, "live search read failed");
                return;
            }
            None => {
                debug!(stream = %label, "live search ended");
                return;
            }
        }
    }

    // Stop requested: consumers must not see anything after this point.
    drop(tx);
    close_gracefully(ws, close_timeout, &label).await;
}

async fn close_gracefully(mut ws: WsStream, close_timeout: Duration, label: &str) {
    let handshake = async {
        ws.close(None).await?;
        while let Some(msg) = ws.next().await {
            msg?;
        }
        Ok::<(), tokio_tungstenite::tungstenite::Error>(())
    };

    match timeout(close_timeout, handshake).await {
        Ok(Ok(())) => debug!(stream = %label, "close handshake complete"),
        Ok(Err(e)) => debug!(stream = %label, error = %e, "connection closed during handshake"),
        Err(_) => warn!(stream = %label, "close handshake timed out; dropping connection"),
    }
}
