//! WebSocket block subscriptions
//!
//! A subscriber opens `/api/ws/{channel}` and sends one frame naming its
//! `peer_id` and the first `height` it wants. After the backend accepts the
//! registration, three loops share the socket:
//!
//! - heartbeat: a `node_ws_PublishHeartbeat` frame every interval
//! - block push: long-polls the backend for block `height`, sends it as
//!   `node_ws_PublishNewBlock` and moves to `height + 1`
//! - unregister signal: long-polls the backend for an eviction of the peer
//!
//! The first loop to end stops the others. Every attempted registration is
//! paired with exactly one unregistration. A socket that sends no subscribe
//! frame within one heartbeat interval is closed.

use std::{
    fmt::{self, Display},
    net::SocketAddr,
    panic::AssertUnwindSafe,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use axum::extract::ws::{Message, WebSocket};
use dashmap::DashMap;
use futures::{FutureExt, Sink, SinkExt, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::backend::{decode_embedded, BackendError, BackendRegistry, ChannelBackend};
use crate::codec::{convert_value, ValueType};
use crate::response_code::ResponseCode;

/// Method of heartbeat frames
pub const PUBLISH_HEARTBEAT: &str = "node_ws_PublishHeartbeat";
/// Method of block frames
pub const PUBLISH_NEW_BLOCK: &str = "node_ws_PublishNewBlock";

/// First frame sent by a subscriber
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeRequest {
    /// Subscriber identity
    pub peer_id: String,
    /// First block height to deliver
    pub height: u64,
}

impl SubscribeRequest {
    /// Parse the subscribe frame. The fields may sit at the top level or in
    /// the `params` of a `node_ws_Subscribe` request.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        let value: JsonValue = serde_json::from_str(text)?;
        match value.get("params") {
            Some(params) if params.is_object() => serde_json::from_value(params.clone()),
            _ => serde_json::from_value(value),
        }
    }
}

/// Active subscriber
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Connection the subscriber streams on, unique per manager
    pub connection: u64,
    /// Subscriber identity
    pub peer_id: String,
    /// Channel subscribed to
    pub channel: String,
    /// Subscriber address
    pub remote: SocketAddr,
}

/// Why a session ended
#[derive(Debug)]
enum SessionEnd {
    /// The subscriber closed the socket
    ClientClosed,
    /// Writing to the socket failed
    SendFailed(String),
    /// The streaming loops panicked
    Panicked,
    /// A backend call failed
    Backend(&'static str, BackendError),
    /// The backend evicted the subscriber
    Unregistered,
    /// The backend delivered a block out of order
    WrongHeight { expected: u64, delivered: i64 },
}

impl SessionEnd {
    /// Error frame to send before closing, if the socket is still usable
    fn frame(&self) -> Option<JsonValue> {
        let (method, code) = match self {
            SessionEnd::ClientClosed | SessionEnd::SendFailed(_) => return None,
            SessionEnd::Panicked => (PUBLISH_HEARTBEAT, ResponseCode::FAIL),
            SessionEnd::Backend(method, _) => (*method, ResponseCode::FAIL),
            SessionEnd::Unregistered => (PUBLISH_HEARTBEAT, ResponseCode::FAIL),
            SessionEnd::WrongHeight { .. } => (PUBLISH_NEW_BLOCK, ResponseCode::FAIL_WRONG_BLOCK_HEIGHT),
        };
        Some(error_frame(method, &self.to_string(), code))
    }
}

impl Display for SessionEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEnd::ClientClosed => write!(f, "client closed the connection"),
            SessionEnd::SendFailed(e) => write!(f, "send failed: {}", e),
            SessionEnd::Panicked => write!(f, "internal error"),
            SessionEnd::Backend(_, e) => write!(f, "{}", e),
            SessionEnd::Unregistered => write!(f, "Unregistered"),
            SessionEnd::WrongHeight { expected, delivered } => {
                write!(f, "expected block {} but received {}", expected, delivered)
            }
        }
    }
}

fn notification(method: &str, params: Option<JsonValue>) -> JsonValue {
    match params {
        Some(params) => json!({"jsonrpc": "2.0", "method": method, "params": params}),
        None => json!({"jsonrpc": "2.0", "method": method}),
    }
}

fn error_frame(method: &str, error: &str, code: ResponseCode) -> JsonValue {
    notification(method, Some(json!({"error": error, "code": code})))
}

async fn send_frame<S, E>(sink: &Mutex<S>, frame: &JsonValue) -> Result<(), SessionEnd>
where
    S: Sink<Message, Error = E> + Unpin,
    E: Display,
{
    sink.lock()
        .await
        .send(Message::Text(frame.to_string()))
        .await
        .map_err(|e| SessionEnd::SendFailed(e.to_string()))
}

/// Runs the subscription protocol for every websocket connection
pub struct SubscriptionManager {
    backends: Arc<BackendRegistry>,
    heartbeat_interval: Duration,
    next_connection: AtomicU64,
    sessions: DashMap<u64, Session>,
}

impl SubscriptionManager {
    /// Create a manager over `backends`
    pub fn new(backends: Arc<BackendRegistry>, heartbeat_interval: Duration) -> Self {
        Self {
            backends,
            heartbeat_interval,
            next_connection: AtomicU64::new(0),
            sessions: DashMap::new(),
        }
    }

    /// Number of connections currently streaming
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Whether `peer_id` is streaming on at least one connection
    pub fn is_subscribed(&self, peer_id: &str) -> bool {
        self.sessions.iter().any(|s| s.peer_id == peer_id)
    }

    /// Serve an upgraded websocket
    pub async fn handle_connection(&self, socket: WebSocket, channel: String, remote: SocketAddr) {
        info!("New WebSocket subscription connection from {}", remote);
        let (sender, receiver) = socket.split();
        self.run(sender, receiver, &channel, remote).await;
        info!("WebSocket subscription connection from {} closed", remote);
    }

    /// Run the protocol over any message sink and stream
    pub async fn run<S, R, SE, RE>(&self, sender: S, mut receiver: R, channel: &str, remote: SocketAddr)
    where
        S: Sink<Message, Error = SE> + Unpin,
        SE: Display,
        R: Stream<Item = Result<Message, RE>> + Unpin,
        RE: Display,
    {
        let sender = Mutex::new(sender);

        let first = tokio::time::timeout(
            self.heartbeat_interval,
            read_subscribe_request(&sender, &mut receiver, remote),
        )
        .await
        .unwrap_or_else(|_| {
            warn!("No subscribe request from {} within {:?}", remote, self.heartbeat_interval);
            None
        });
        let Some(request) = first else {
            close(&sender).await;
            return;
        };

        let backend = match self.backends.get(channel) {
            Ok(backend) => backend,
            Err(e) => {
                warn!("Subscription from {} rejected: {}", remote, e);
                let _ = send_frame(&sender, &error_frame(PUBLISH_HEARTBEAT, "Invalid channel name", ResponseCode::FAIL)).await;
                close(&sender).await;
                return;
            }
        };

        let peer_id = request.peer_id.clone();
        let registered = self.register(backend.as_ref(), &peer_id, remote).await;

        if registered {
            let connection = self.next_connection.fetch_add(1, Ordering::Relaxed);
            self.sessions.insert(
                connection,
                Session {
                    connection,
                    peer_id: peer_id.clone(),
                    channel: channel.to_string(),
                    remote,
                },
            );

            let streamed = AssertUnwindSafe(self.stream(
                backend.as_ref(),
                &sender,
                &mut receiver,
                &peer_id,
                request.height,
            ))
            .catch_unwind()
            .await;

            let end = streamed.unwrap_or_else(|_| {
                error!("Subscription stream for {} panicked", peer_id);
                SessionEnd::Panicked
            });

            match &end {
                SessionEnd::ClientClosed => info!("Subscriber {} disconnected", peer_id),
                other => warn!("Subscription of {} ended: {}", peer_id, other),
            }
            if let Some(frame) = end.frame() {
                let _ = send_frame(&sender, &frame).await;
            }
            self.sessions.remove(&connection);
        } else {
            let code = ResponseCode::FAIL_SUBSCRIBE_LIMIT;
            let _ = send_frame(&sender, &error_frame(PUBLISH_HEARTBEAT, code.message(), code)).await;
        }

        self.unregister(backend.as_ref(), &peer_id).await;
        close(&sender).await;
    }

    async fn register(&self, backend: &dyn ChannelBackend, peer_id: &str, remote: SocketAddr) -> bool {
        let target = remote.to_string();
        let connected_time = chrono::Utc::now().timestamp_micros();

        match self
            .backends
            .call(backend.register_citizen(peer_id, &target, connected_time))
            .await
        {
            Ok(true) => {
                debug!("Registered citizen {} from {}", peer_id, target);
                true
            }
            Ok(false) => {
                warn!("Subscriber limit reached, rejecting {}", peer_id);
                false
            }
            Err(e) => {
                error!("Failed to register citizen {}: {}", peer_id, e);
                false
            }
        }
    }

    async fn unregister(&self, backend: &dyn ChannelBackend, peer_id: &str) {
        match self.backends.call(backend.unregister_citizen(peer_id)).await {
            Ok(()) => debug!("Unregistered citizen {}", peer_id),
            Err(e) => error!("Failed to unregister citizen {}: {}", peer_id, e),
        }
    }

    async fn stream<S, R, SE, RE>(
        &self,
        backend: &dyn ChannelBackend,
        sender: &Mutex<S>,
        receiver: &mut R,
        peer_id: &str,
        height: u64,
    ) -> SessionEnd
    where
        S: Sink<Message, Error = SE> + Unpin,
        SE: Display,
        R: Stream<Item = Result<Message, RE>> + Unpin,
        RE: Display,
    {
        tokio::select! {
            end = self.heartbeat(sender) => end,
            end = self.push_blocks(backend, sender, peer_id, height) => end,
            end = self.watch_unregister(backend, peer_id) => end,
            end = watch_client(sender, receiver) => end,
        }
    }

    async fn heartbeat<S, SE>(&self, sender: &Mutex<S>) -> SessionEnd
    where
        S: Sink<Message, Error = SE> + Unpin,
        SE: Display,
    {
        let frame = notification(PUBLISH_HEARTBEAT, None);
        loop {
            tokio::time::sleep(self.heartbeat_interval).await;
            if let Err(end) = send_frame(sender, &frame).await {
                return end;
            }
        }
    }

    async fn push_blocks<S, SE>(
        &self,
        backend: &dyn ChannelBackend,
        sender: &Mutex<S>,
        peer_id: &str,
        mut height: u64,
    ) -> SessionEnd
    where
        S: Sink<Message, Error = SE> + Unpin,
        SE: Display,
    {
        loop {
            let new_block = match self
                .backends
                .long_poll(backend.announce_new_block(height, peer_id))
                .await
            {
                Ok(new_block) => new_block,
                Err(BackendError::Timeout(_)) => continue,
                Err(e) => return SessionEnd::Backend(PUBLISH_NEW_BLOCK, e),
            };

            let block = match decode_embedded(new_block.block) {
                Ok(block) => block,
                Err(e) => {
                    return SessionEnd::Backend(
                        PUBLISH_NEW_BLOCK,
                        BackendError::Decode(e.to_string()),
                    )
                }
            };

            if let Some(delivered) = block_height(&block) {
                if u64::try_from(delivered).ok() != Some(height) {
                    error!(
                        "Backend delivered block {} to {} while {} was expected",
                        delivered, peer_id, height
                    );
                    return SessionEnd::WrongHeight {
                        expected: height,
                        delivered,
                    };
                }
            }

            let frame = notification(
                PUBLISH_NEW_BLOCK,
                Some(json!({"block": block, "confirm_info": new_block.confirm_info})),
            );
            if let Err(end) = send_frame(sender, &frame).await {
                return end;
            }
            debug!("Published block {} to {}", height, peer_id);
            height += 1;
        }
    }

    async fn watch_unregister(&self, backend: &dyn ChannelBackend, peer_id: &str) -> SessionEnd {
        loop {
            match self
                .backends
                .long_poll(backend.wait_for_unregister_signal(peer_id))
                .await
            {
                Ok(true) => return SessionEnd::Unregistered,
                Ok(false) | Err(BackendError::Timeout(_)) => continue,
                Err(BackendError::Unsupported(_)) => {
                    // backend cannot signal evictions
                    return std::future::pending().await;
                }
                Err(e) => return SessionEnd::Backend(PUBLISH_HEARTBEAT, e),
            }
        }
    }
}

/// Height carried by a block, decimal or `0x` hex
fn block_height(block: &JsonValue) -> Option<i64> {
    block
        .get("height")
        .map(|h| convert_value(h, ValueType::Integer))
        .and_then(|h| h.as_i64())
}

async fn read_subscribe_request<S, R, SE, RE>(
    sender: &Mutex<S>,
    receiver: &mut R,
    remote: SocketAddr,
) -> Option<SubscribeRequest>
where
    S: Sink<Message, Error = SE> + Unpin,
    SE: Display,
    R: Stream<Item = Result<Message, RE>> + Unpin,
    RE: Display,
{
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                debug!("Received subscribe request from {}: {}", remote, text);
                return match SubscribeRequest::parse(&text) {
                    Ok(request) => Some(request),
                    Err(e) => {
                        warn!("Invalid subscribe request from {}: {}", remote, e);
                        let code = ResponseCode::FAIL_VALIDATE_PARAMS;
                        let _ = send_frame(
                            sender,
                            &error_frame(PUBLISH_HEARTBEAT, &format!("Invalid subscribe request: {}", e), code),
                        )
                        .await;
                        None
                    }
                };
            }
            Ok(Message::Binary(_)) => {
                warn!("Received binary message from {}, ignoring", remote);
            }
            Ok(Message::Ping(data)) => {
                if let Err(e) = sender.lock().await.send(Message::Pong(data)).await {
                    error!("Failed to send pong: {}", e);
                    return None;
                }
            }
            Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!("WebSocket close message from {}", remote);
                return None;
            }
            Err(e) => {
                error!("WebSocket error from {}: {}", remote, e);
                return None;
            }
        }
    }
    None
}

/// Ends when the subscriber goes away; answers pings meanwhile.
async fn watch_client<S, R, SE, RE>(sender: &Mutex<S>, receiver: &mut R) -> SessionEnd
where
    S: Sink<Message, Error = SE> + Unpin,
    SE: Display,
    R: Stream<Item = Result<Message, RE>> + Unpin,
    RE: Display,
{
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Ping(data)) => {
                if let Err(e) = sender.lock().await.send(Message::Pong(data)).await {
                    return SessionEnd::SendFailed(e.to_string());
                }
            }
            Ok(Message::Close(_)) => return SessionEnd::ClientClosed,
            Ok(_) => {}
            Err(e) => {
                debug!("WebSocket read error: {}", e);
                return SessionEnd::ClientClosed;
            }
        }
    }
    SessionEnd::ClientClosed
}

async fn close<S, SE>(sender: &Mutex<S>)
where
    S: Sink<Message, Error = SE> + Unpin,
    SE: Display,
{
    let mut sender = sender.lock().await;
    if let Err(e) = sender.close().await {
        debug!("Closing websocket failed: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NewBlock;
    use async_trait::async_trait;
    use futures::channel::mpsc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Spy {
        accept: bool,
        fail_register: bool,
        registered: AtomicUsize,
        unregistered: AtomicUsize,
        polled: std::sync::Mutex<Vec<u64>>,
    }

    #[async_trait]
    impl ChannelBackend for Spy {
        async fn register_citizen(&self, _: &str, _: &str, _: i64) -> Result<bool, BackendError> {
            self.registered.fetch_add(1, Ordering::SeqCst);
            if self.fail_register {
                return Err(BackendError::ConnectionLost("gone".to_string()));
            }
            Ok(self.accept)
        }

        async fn unregister_citizen(&self, _: &str) -> Result<(), BackendError> {
            self.unregistered.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn announce_new_block(&self, height: u64, _: &str) -> Result<NewBlock, BackendError> {
            self.polled.lock().unwrap().push(height);
            match height {
                1 => Ok(NewBlock {
                    block: json!({"height": 7}),
                    confirm_info: String::new(),
                }),
                5 => Ok(NewBlock {
                    block: json!(r#"{"version": "0.3", "height": "0x5"}"#),
                    confirm_info: "votes".to_string(),
                }),
                _ => std::future::pending().await,
            }
        }
    }

    fn remote() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 7100))
    }

    fn manager(spy: Arc<Spy>) -> SubscriptionManager {
        let registry = Arc::new(BackendRegistry::new(
            Duration::from_secs(5),
            Duration::from_secs(60),
        ));
        registry.register("icon_dex", spy);
        SubscriptionManager::new(registry, Duration::from_secs(30))
    }

    fn frame_json(message: Message) -> JsonValue {
        match message {
            Message::Text(text) => serde_json::from_str(&text).unwrap(),
            other => panic!("unexpected frame {:?}", other),
        }
    }

    #[test]
    fn test_subscribe_request_shapes() {
        let flat = SubscribeRequest::parse(r#"{"peer_id": "p1", "height": 5}"#).unwrap();
        let wrapped = SubscribeRequest::parse(
            r#"{"jsonrpc": "2.0", "method": "node_ws_Subscribe", "params": {"peer_id": "p1", "height": 5}}"#,
        )
        .unwrap();
        assert_eq!(flat, wrapped);
        assert_eq!(flat.height, 5);
        assert!(SubscribeRequest::parse(r#"{"peer_id": "p1"}"#).is_err());
    }

    async fn run_rejected(spy: Arc<Spy>) -> Vec<Message> {
        let manager = manager(Arc::clone(&spy));
        let (out_tx, out_rx) = mpsc::unbounded::<Message>();
        let (in_tx, in_rx) = mpsc::unbounded::<Result<Message, std::io::Error>>();

        in_tx
            .unbounded_send(Ok(Message::Text(r#"{"peer_id": "p1", "height": 1}"#.to_string())))
            .unwrap();

        manager.run(out_tx, in_rx, "icon_dex", remote()).await;
        assert_eq!(manager.session_count(), 0);
        out_rx.collect().await
    }

    #[tokio::test]
    async fn test_rejected_registration_sends_limit_frame() {
        let spy = Arc::new(Spy::default());
        let frames = run_rejected(Arc::clone(&spy)).await;

        assert_eq!(frames.len(), 1);
        let frame = frame_json(frames.into_iter().next().unwrap());
        assert_eq!(frame["params"]["code"], -11);
        assert_eq!(spy.registered.load(Ordering::SeqCst), 1);
        assert_eq!(spy.unregistered.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_registration_still_unregisters() {
        let spy = Arc::new(Spy {
            fail_register: true,
            ..Default::default()
        });
        let frames = run_rejected(Arc::clone(&spy)).await;

        assert_eq!(frames.len(), 1);
        assert_eq!(spy.unregistered.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_out_of_order_block_stops_stream() {
        let spy = Arc::new(Spy {
            accept: true,
            ..Default::default()
        });
        let manager = manager(Arc::clone(&spy));
        let (out_tx, out_rx) = mpsc::unbounded::<Message>();
        let (in_tx, in_rx) = mpsc::unbounded::<Result<Message, std::io::Error>>();

        in_tx
            .unbounded_send(Ok(Message::Text(r#"{"peer_id": "p1", "height": 1}"#.to_string())))
            .unwrap();

        manager.run(out_tx, in_rx, "icon_dex", remote()).await;
        drop(in_tx);

        let frames: Vec<Message> = out_rx.collect().await;
        assert_eq!(frames.len(), 1);
        let frame = frame_json(frames.into_iter().next().unwrap());
        assert_eq!(frame["method"], PUBLISH_NEW_BLOCK);
        assert_eq!(frame["params"]["code"], -202);
        assert_eq!(spy.unregistered.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_streams_blocks_and_heartbeats() {
        let spy = Arc::new(Spy {
            accept: true,
            ..Default::default()
        });
        let manager = manager(Arc::clone(&spy));
        let (out_tx, mut out_rx) = mpsc::unbounded::<Message>();
        let (in_tx, in_rx) = mpsc::unbounded::<Result<Message, std::io::Error>>();

        in_tx
            .unbounded_send(Ok(Message::Text(r#"{"peer_id": "p1", "height": 5}"#.to_string())))
            .unwrap();

        let client = async {
            let block = frame_json(out_rx.next().await.unwrap());
            assert_eq!(block["method"], PUBLISH_NEW_BLOCK);
            assert_eq!(block["params"]["block"]["height"], "0x5");
            assert_eq!(block["params"]["confirm_info"], "votes");
            assert!(manager.is_subscribed("p1"));

            let started = tokio::time::Instant::now();
            let heartbeat = frame_json(out_rx.next().await.unwrap());
            assert_eq!(heartbeat["method"], PUBLISH_HEARTBEAT);
            assert!(started.elapsed() >= Duration::from_secs(30));

            in_tx.unbounded_send(Ok(Message::Close(None))).unwrap();
        };

        tokio::join!(manager.run(out_tx, in_rx, "icon_dex", remote()), client);

        assert!(out_rx.next().await.is_none());
        assert_eq!(*spy.polled.lock().unwrap(), vec![5, 6]);
        assert_eq!(manager.session_count(), 0);
        assert_eq!(spy.registered.load(Ordering::SeqCst), 1);
        assert_eq!(spy.unregistered.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_peer_on_two_connections() {
        let spy = Arc::new(Spy {
            accept: true,
            ..Default::default()
        });
        let manager = manager(Arc::clone(&spy));
        let subscribe = || Ok(Message::Text(r#"{"peer_id": "p1", "height": 50}"#.to_string()));

        let (a_out, _a_frames) = mpsc::unbounded::<Message>();
        let (a_in, a_rx) = mpsc::unbounded::<Result<Message, std::io::Error>>();
        let (b_out, _b_frames) = mpsc::unbounded::<Message>();
        let (b_in, b_rx) = mpsc::unbounded::<Result<Message, std::io::Error>>();
        a_in.unbounded_send(subscribe()).unwrap();
        b_in.unbounded_send(subscribe()).unwrap();

        let client = async {
            while manager.session_count() < 2 {
                tokio::task::yield_now().await;
            }
            assert!(manager.is_subscribed("p1"));

            a_in.unbounded_send(Ok(Message::Close(None))).unwrap();
            while manager.session_count() > 1 {
                tokio::task::yield_now().await;
            }
            assert!(manager.is_subscribed("p1"));

            b_in.unbounded_send(Ok(Message::Close(None))).unwrap();
        };

        tokio::join!(
            manager.run(a_out, a_rx, "icon_dex", remote()),
            manager.run(b_out, b_rx, "icon_dex", SocketAddr::from(([127, 0, 0, 1], 7101))),
            client,
        );

        assert_eq!(manager.session_count(), 0);
        assert!(!manager.is_subscribed("p1"));
        assert_eq!(spy.registered.load(Ordering::SeqCst), 2);
        assert_eq!(spy.unregistered.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_socket_is_closed_without_registering() {
        let spy = Arc::new(Spy::default());
        let manager = manager(Arc::clone(&spy));
        let (out_tx, out_rx) = mpsc::unbounded::<Message>();
        let (_in_tx, in_rx) = mpsc::unbounded::<Result<Message, std::io::Error>>();

        let started = tokio::time::Instant::now();
        manager.run(out_tx, in_rx, "icon_dex", remote()).await;
        assert!(started.elapsed() >= Duration::from_secs(30));

        let frames: Vec<Message> = out_rx.collect().await;
        assert!(frames.is_empty());
        assert_eq!(spy.registered.load(Ordering::SeqCst), 0);
        assert_eq!(spy.unregistered.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_end_reason_frames() {
        assert!(SessionEnd::ClientClosed.frame().is_none());
        assert!(SessionEnd::SendFailed("broken pipe".to_string()).frame().is_none());

        let frame = SessionEnd::WrongHeight {
            expected: 3,
            delivered: 4,
        }
        .frame()
        .unwrap();
        assert_eq!(frame["params"]["error"], "expected block 3 but received 4");
        assert_eq!(frame["params"]["code"], -202);
    }

    #[tokio::test]
    async fn test_unknown_channel_never_registers() {
        let spy = Arc::new(Spy::default());
        let manager = manager(Arc::clone(&spy));
        let (out_tx, out_rx) = mpsc::unbounded::<Message>();
        let (in_tx, in_rx) = mpsc::unbounded::<Result<Message, std::io::Error>>();

        in_tx
            .unbounded_send(Ok(Message::Text(r#"{"peer_id": "p1", "height": 1}"#.to_string())))
            .unwrap();

        manager.run(out_tx, in_rx, "missing", remote()).await;

        let frames: Vec<Message> = out_rx.collect().await;
        assert_eq!(frames.len(), 1);
        assert_eq!(spy.registered.load(Ordering::SeqCst), 0);
        assert_eq!(spy.unregistered.load(Ordering::SeqCst), 0);
    }
}
