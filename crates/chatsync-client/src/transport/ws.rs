//! WebSocket link to the broker.
//!
//! [`connect`] performs the WebSocket upgrade, presenting the bearer
//! credential, and returns a [`WsLink`] whose channels carry raw STOMP text
//! frames. Framing and the STOMP handshake are handled by the caller. The
//! link is gone once `from_server` yields `None`.

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream,
    tungstenite::{
        self, Message,
        client::IntoClientRequest,
        http::{HeaderValue, StatusCode, header::AUTHORIZATION},
    },
};
use url::Url;

use super::TransportError;
use crate::credential::Credential;

type Stream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Handle to an open WebSocket link.
///
/// Text frames are sent and received via the channels; an internal task
/// handles the socket I/O.
pub struct WsLink {
    /// Send text frames to the broker.
    pub to_server: mpsc::Sender<String>,
    /// Receive text frames from the broker.
    pub from_server: mpsc::Receiver<String>,
    /// Abort handle to stop the link task.
    abort_handle: tokio::task::AbortHandle,
}

impl WsLink {
    /// Stop the link.
    pub fn stop(&self) {
        self.abort_handle.abort();
    }
}

/// Open a WebSocket link to `endpoint`.
///
/// A 401 or 403 answer to the upgrade is reported as
/// [`TransportError::Rejected`].
pub async fn connect(endpoint: &str, credential: &Credential) -> Result<WsLink, TransportError> {
    let url = Url::parse(endpoint).map_err(|e| TransportError::InvalidEndpoint {
        endpoint: endpoint.to_owned(),
        reason: e.to_string(),
    })?;
    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(TransportError::InvalidEndpoint {
            endpoint: endpoint.to_owned(),
            reason: format!("unsupported scheme {}", url.scheme()),
        });
    }

    let mut request = url
        .as_str()
        .into_client_request()
        .map_err(|e| TransportError::Connection(format!("invalid request: {e}")))?;
    let bearer = HeaderValue::from_str(&credential.bearer())
        .map_err(|_| TransportError::Connection("credential is not a valid header".into()))?;
    request.headers_mut().insert(AUTHORIZATION, bearer);

    let (stream, _) = tokio_tungstenite::connect_async(request).await.map_err(|e| match e {
        tungstenite::Error::Http(response)
            if matches!(response.status(), StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) =>
        {
            TransportError::Rejected { status: response.status().as_u16() }
        },
        other => TransportError::Connection(other.to_string()),
    })?;

    let (to_server_tx, to_server_rx) = mpsc::channel::<String>(32);
    let (from_server_tx, from_server_rx) = mpsc::channel::<String>(32);

    let handle = tokio::spawn(run_link(stream, to_server_rx, from_server_tx));

    Ok(WsLink {
        to_server: to_server_tx,
        from_server: from_server_rx,
        abort_handle: handle.abort_handle(),
    })
}

/// Pump frames between the channels and the socket until either side ends.
async fn run_link(
    stream: Stream,
    mut to_server: mpsc::Receiver<String>,
    from_server: mpsc::Sender<String>,
) {
    let (mut sink, mut source) = stream.split();

    loop {
        tokio::select! {
            outgoing = to_server.recv() => {
                let Some(text) = outgoing else {
                    if let Err(e) = sink.close().await {
                        tracing::debug!(error = %e, "websocket close failed");
                    }
                    break;
                };
                if let Err(e) = sink.send(Message::Text(text.into())).await {
                    tracing::warn!(error = %e, "websocket send failed");
                    break;
                }
            },
            incoming = source.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    if from_server.send(text.as_str().to_owned()).await.is_err() {
                        break;
                    }
                },
                Some(Ok(Message::Close(frame))) => {
                    tracing::debug!(?frame, "websocket closed by peer");
                    break;
                },
                Some(Ok(_)) => {},
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "websocket receive failed");
                    break;
                },
                None => break,
            },
        }
    }
}
