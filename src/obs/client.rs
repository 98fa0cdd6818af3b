//! Persistent OBS websocket session with request/response correlation
//!
//! The session is opened lazily on the first request and dropped whenever
//! the connection is found closed; the next request reconnects. A single
//! reader task owns the receive half and completes pending requests by id.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace, warn};

use super::protocol::{
    op, Envelope, Hello, Identified, Identify, Outgoing, RequestPayload, RequestResponse,
    CLOSE_AUTHENTICATION_FAILED, SUBPROTOCOL,
};
use super::{ObsError, Requester};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;
type PendingMap = Arc<Mutex<PendingRequests>>;

/// Connection settings for OBS
#[derive(Debug, Clone)]
pub struct ObsSettings {
    /// Websocket URL, e.g. `ws://127.0.0.1:4455`
    pub url: String,
    /// Password, if OBS has authentication enabled
    pub password: Option<String>,
    /// Upper bound on connect+identify and on each request round trip
    pub request_timeout: Duration,
}

/// Shared OBS client. Cheap to share behind an `Arc`.
pub struct ObsClient {
    settings: ObsSettings,
    session: Mutex<Option<Arc<Session>>>,
    next_seq: AtomicU64,
}

/// Callers waiting for a response, by request id
#[derive(Default)]
struct PendingRequests {
    waiters: HashMap<String, oneshot::Sender<RequestResponse>>,
    closed: bool,
}

impl PendingRequests {
    /// `None` once the reader has exited; nothing would ever answer.
    fn register(&mut self, request_id: &str) -> Option<oneshot::Receiver<RequestResponse>> {
        if self.closed {
            return None;
        }
        let (tx, rx) = oneshot::channel();
        self.waiters.insert(request_id.to_string(), tx);
        Some(rx)
    }

    fn cancel(&mut self, request_id: &str) {
        self.waiters.remove(request_id);
    }

    /// Hand `response` to its caller. Returns false for unknown ids.
    fn complete(&mut self, response: RequestResponse) -> bool {
        match self.waiters.remove(&response.request_id) {
            Some(tx) => {
                let _ = tx.send(response);
                true
            }
            None => false,
        }
    }

    /// Dropping the senders wakes every waiter with a closed-connection error.
    fn close(&mut self) {
        self.closed = true;
        self.waiters.clear();
    }
}

/// One identified websocket connection
struct Session {
    sink: Mutex<WsSink>,
    pending: PendingMap,
    alive: Arc<AtomicBool>,
    reader: JoinHandle<()>,
    rpc_version: u32,
}

impl Session {
    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

impl ObsClient {
    pub fn new(settings: ObsSettings) -> Self {
        Self {
            settings,
            session: Mutex::new(None),
            next_seq: AtomicU64::new(0),
        }
    }

    /// Connect and identify now instead of on the first request.
    pub async fn connect(&self) -> Result<(), ObsError> {
        self.session().await.map(|_| ())
    }

    /// Close the current session, if any.
    pub async fn close(&self) {
        let session = self.session.lock().await.take();
        if let Some(session) = session {
            session.alive.store(false, Ordering::SeqCst);
            if let Err(e) = session.sink.lock().await.close().await {
                debug!(?e, "error closing OBS websocket");
            }
            info!("OBS session closed");
        }
    }

    /// Send one request and wait for the response carrying the same id.
    pub async fn call(
        &self,
        request_type: &str,
        request_data: Option<Value>,
        id_prefix: &str,
    ) -> Result<Value, ObsError> {
        let session = self.session().await?;
        let request_id = self.next_request_id(id_prefix);

        let frame = Outgoing {
            op: op::REQUEST,
            d: RequestPayload {
                request_type,
                request_id: &request_id,
                request_data,
            },
        }
        .to_text()?;

        let registered = session.pending.lock().await.register(&request_id);
        let Some(rx) = registered else {
            self.invalidate(&session).await;
            return Err(ObsError::ConnectionClosed(format!(
                "connection lost before sending {request_type}"
            )));
        };

        trace!(%request_type, %request_id, "sending request");
        let sent = session.sink.lock().await.send(Message::Text(frame.into())).await;
        if let Err(e) = sent {
            session.pending.lock().await.cancel(&request_id);
            self.invalidate(&session).await;
            return Err(ObsError::ConnectionClosed(e.to_string()));
        }

        let response = match timeout(self.settings.request_timeout, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => {
                self.invalidate(&session).await;
                return Err(ObsError::ConnectionClosed(format!(
                    "connection lost waiting for {request_type}"
                )));
            }
            Err(_) => {
                session.pending.lock().await.cancel(&request_id);
                return Err(ObsError::Timeout {
                    request_type: request_type.to_string(),
                    after: self.settings.request_timeout,
                });
            }
        };

        response.into_result(request_type)
    }

    fn next_request_id(&self, prefix: &str) -> String {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let prefix = if prefix.is_empty() { "req" } else { prefix };
        format!("{prefix}-{seq}")
    }

    /// Return the live session, reconnecting if there is none.
    async fn session(&self) -> Result<Arc<Session>, ObsError> {
        let mut guard = self.session.lock().await;

        if let Some(session) = guard.as_ref() {
            if session.is_alive() {
                return Ok(Arc::clone(session));
            }
            info!("OBS session lost, reconnecting");
        }
        *guard = None;

        let session = match timeout(self.settings.request_timeout, self.open_session()).await {
            Ok(result) => Arc::new(result?),
            Err(_) => {
                return Err(ObsError::Timeout {
                    request_type: "Identify".to_string(),
                    after: self.settings.request_timeout,
                })
            }
        };

        info!(rpc_version = session.rpc_version, "connected and identified with OBS");
        *guard = Some(Arc::clone(&session));
        Ok(session)
    }

    /// Drop `session` if it is still the current one.
    async fn invalidate(&self, session: &Arc<Session>) {
        session.alive.store(false, Ordering::SeqCst);
        let mut guard = self.session.lock().await;
        if guard.as_ref().is_some_and(|current| Arc::ptr_eq(current, session)) {
            *guard = None;
            warn!("OBS session invalidated");
        }
    }

    async fn open_session(&self) -> Result<Session, ObsError> {
        info!(url = %self.settings.url, "connecting to OBS websocket");

        let mut request = self
            .settings
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| ObsError::Connection(e.to_string()))?;
        request
            .headers_mut()
            .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(SUBPROTOCOL));

        let (ws, _) = connect_async(request)
            .await
            .map_err(|e| ObsError::Connection(e.to_string()))?;
        let (mut sink, mut source) = ws.split();

        let hello: Hello = wait_for_op(&mut source, op::HELLO).await?.payload()?;
        debug!(
            rpc_version = hello.rpc_version,
            auth_required = hello.authentication.is_some(),
            "received hello"
        );

        let identify = Identify::for_hello(&hello, self.settings.password.as_deref());
        if hello.authentication.is_some() && identify.authentication.is_none() {
            warn!("OBS requested authentication but no password is configured");
        }
        let frame = Outgoing { op: op::IDENTIFY, d: identify }.to_text()?;
        sink.send(Message::Text(frame.into()))
            .await
            .map_err(|e| ObsError::ConnectionClosed(e.to_string()))?;

        let identified: Identified = wait_for_op(&mut source, op::IDENTIFIED).await?.payload()?;

        let pending: PendingMap = Arc::new(Mutex::new(PendingRequests::default()));
        let alive = Arc::new(AtomicBool::new(true));
        let reader = tokio::spawn(read_loop(source, Arc::clone(&pending), Arc::clone(&alive)));

        Ok(Session {
            sink: Mutex::new(sink),
            pending,
            alive,
            reader,
            rpc_version: identified.negotiated_rpc_version,
        })
    }
}

#[async_trait]
impl Requester for ObsClient {
    async fn request(
        &self,
        request_type: &str,
        request_data: Option<Value>,
        id_prefix: &str,
    ) -> Result<Value, ObsError> {
        self.call(request_type, request_data, id_prefix).await
    }
}

/// Read frames during the handshake until one with `wanted` op arrives.
async fn wait_for_op(source: &mut WsSource, wanted: u8) -> Result<Envelope, ObsError> {
    loop {
        let message = match source.next().await {
            Some(Ok(message)) => message,
            Some(Err(e)) => return Err(ObsError::ConnectionClosed(e.to_string())),
            None => return Err(ObsError::ConnectionClosed("stream ended".into())),
        };

        match message {
            Message::Text(text) => {
                let envelope = Envelope::parse(text.as_str())?;
                if envelope.op == wanted {
                    return Ok(envelope);
                }
                trace!(op = envelope.op, wanted, "ignoring frame during handshake");
            }
            Message::Close(frame) => return Err(close_error(frame)),
            _ => {}
        }
    }
}

fn close_error(frame: Option<CloseFrame>) -> ObsError {
    match frame {
        Some(frame) => {
            let code = u16::from(frame.code);
            let reason = frame.reason.as_str().to_string();
            if code == CLOSE_AUTHENTICATION_FAILED {
                ObsError::Authentication { code, reason }
            } else {
                ObsError::ConnectionClosed(format!("closed by OBS ({code}): {reason}"))
            }
        }
        None => ObsError::ConnectionClosed("closed by OBS".into()),
    }
}

/// Route responses to waiting callers until the connection ends.
async fn read_loop(mut source: WsSource, pending: PendingMap, alive: Arc<AtomicBool>) {
    while let Some(message) = source.next().await {
        match message {
            Ok(Message::Text(text)) => dispatch(text.as_str(), &pending).await,
            Ok(Message::Close(frame)) => {
                warn!(error = %close_error(frame), "OBS closed the connection");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(?e, "OBS websocket error");
                break;
            }
        }
    }

    alive.store(false, Ordering::SeqCst);
    pending.lock().await.close();
}

async fn dispatch(text: &str, pending: &PendingMap) {
    let envelope = match Envelope::parse(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(%e, "dropping unparseable OBS frame");
            return;
        }
    };

    if envelope.op != op::REQUEST_RESPONSE {
        trace!(op = envelope.op, "dropping unsolicited frame");
        return;
    }

    let response: RequestResponse = match envelope.payload() {
        Ok(response) => response,
        Err(e) => {
            warn!(%e, "dropping malformed request response");
            return;
        }
    };

    let request_id = response.request_id.clone();
    if !pending.lock().await.complete(response) {
        debug!(%request_id, "dropping response for unknown id");
    }
}
