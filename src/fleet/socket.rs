use crate::error::AppError;
use crate::fleet::types::{
    parse_telemetry_payload, ConnectionState, ConnectionStatusSnapshot, SocketClientConfig,
};
use crate::fleet::TelemetrySink;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async_with_config, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

pub type FeedWsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const CLOSE_FRAME_TIMEOUT: Duration = Duration::from_secs(1);

pub async fn connect_telemetry_feed(url: &str) -> Result<FeedWsStream, AppError> {
    let ws_config = WebSocketConfig {
        max_message_size: Some(16 << 20),
        max_frame_size: Some(4 << 20),
        ..Default::default()
    };

    let (stream, _) = connect_async_with_config(url, Some(ws_config), true).await?;
    Ok(stream)
}

enum SessionEnd {
    Closed,
    Cancelled,
}

struct SocketRuntime {
    config: SocketClientConfig,
    sink: Arc<dyn TelemetrySink>,
    status: watch::Sender<ConnectionStatusSnapshot>,
    attempts: Arc<AtomicU32>,
    cancel_token: CancellationToken,
}

impl SocketRuntime {
    fn publish(&self, state: ConnectionState, reason: Option<String>) {
        let reconnect_attempts = self.attempts.load(Ordering::Relaxed);
        tracing::debug!(url = %self.config.url, ?state, reconnect_attempts, ?reason, "feed state");
        self.status.send_replace(ConnectionStatusSnapshot {
            state,
            url: self.config.url.clone(),
            reconnect_attempts,
            reason,
        });
    }

    fn report(&self, error: AppError) {
        if error.is_transport() {
            tracing::warn!(url = %self.config.url, %error, "telemetry transport fault");
        } else {
            tracing::warn!(url = %self.config.url, %error, "dropped telemetry payload");
        }
        self.sink.on_error(&error);
    }

    fn deliver(&self, mut payload: Vec<u8>) {
        match parse_telemetry_payload(payload.as_mut_slice()) {
            Ok(event) => self.sink.on_event(event),
            Err(error) => self.report(error),
        }
    }

    async fn run(self, mut outbound: mpsc::UnboundedReceiver<String>) {
        loop {
            self.publish(ConnectionState::Connecting, None);

            let connected = tokio::select! {
                _ = self.cancel_token.cancelled() => break,
                result = connect_telemetry_feed(&self.config.url) => result,
            };

            let close_reason = match connected {
                Ok(stream) => {
                    self.attempts.store(0, Ordering::Relaxed);
                    self.publish(ConnectionState::Connected, Some("websocket connected".to_string()));
                    tracing::info!(url = %self.config.url, "telemetry feed connected");

                    match self.pump(stream, &mut outbound).await {
                        SessionEnd::Cancelled => break,
                        SessionEnd::Closed => {
                            let dropped = discard_stale_outbound(&mut outbound);
                            if dropped > 0 {
                                tracing::debug!(
                                    url = %self.config.url,
                                    dropped,
                                    "discarded messages queued for the closed session"
                                );
                            }
                            "websocket closed".to_string()
                        }
                    }
                }
                Err(error) => {
                    let reason = format!("websocket connect error: {error}");
                    self.report(error);
                    reason
                }
            };

            self.publish(ConnectionState::Disconnected, Some(close_reason));

            let attempts = self.attempts.load(Ordering::Relaxed);
            if attempts >= self.config.max_reconnect_attempts {
                tracing::error!(
                    url = %self.config.url,
                    attempts,
                    "telemetry feed gave up reconnecting"
                );
                self.publish(
                    ConnectionState::PermanentlyFailed,
                    Some(format!("gave up after {attempts} reconnect attempts")),
                );
                return;
            }

            self.publish(
                ConnectionState::Reconnecting,
                Some(format!("reconnect attempt {} scheduled", attempts + 1)),
            );
            tokio::select! {
                _ = self.cancel_token.cancelled() => break,
                _ = tokio::time::sleep(Duration::from_millis(self.config.reconnect_interval_ms)) => {}
            }
            let attempt = self.attempts.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::info!(url = %self.config.url, attempt, "reconnecting telemetry feed");
        }

        self.publish(
            ConnectionState::Disconnected,
            Some("disconnected by client".to_string()),
        );
    }

    async fn pump(
        &self,
        stream: FeedWsStream,
        outbound: &mut mpsc::UnboundedReceiver<String>,
    ) -> SessionEnd {
        let (mut writer, mut reader) = stream.split();

        let end = loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => break SessionEnd::Cancelled,
                Some(text) = outbound.recv() => {
                    let sent = tokio::select! {
                        _ = self.cancel_token.cancelled() => break SessionEnd::Cancelled,
                        result = writer.send(Message::Text(text)) => result,
                    };
                    if let Err(error) = sent {
                        self.report(error.into());
                        break SessionEnd::Closed;
                    }
                }
                frame = reader.next() => {
                    let Some(frame_result) = frame else {
                        break SessionEnd::Closed;
                    };

                    match frame_result {
                        Ok(Message::Text(text)) => self.deliver(text.into_bytes()),
                        Ok(Message::Binary(bytes)) => self.deliver(bytes),
                        Ok(Message::Close(_)) => break SessionEnd::Closed,
                        Ok(_) => {}
                        Err(error) => {
                            self.report(error.into());
                            break SessionEnd::Closed;
                        }
                    }
                }
            }
        };

        if matches!(end, SessionEnd::Cancelled)
            && tokio::time::timeout(CLOSE_FRAME_TIMEOUT, writer.send(Message::Close(None)))
                .await
                .is_err()
        {
            tracing::debug!(url = %self.config.url, "peer did not take the close frame in time");
        }
        end
    }
}

/// Drops everything queued for a session that has ended. Returns how many were dropped.
fn discard_stale_outbound(outbound: &mut mpsc::UnboundedReceiver<String>) -> usize {
    let mut dropped = 0;
    while outbound.try_recv().is_ok() {
        dropped += 1;
    }
    dropped
}

/// Owned handle of one reconnecting feed connection.
pub struct TelemetrySocket {
    url: String,
    cancellation_token: CancellationToken,
    join_handle: Option<JoinHandle<()>>,
    outbound: mpsc::UnboundedSender<String>,
    status: watch::Receiver<ConnectionStatusSnapshot>,
    attempts: Arc<AtomicU32>,
}

impl TelemetrySocket {
    pub fn connect(config: SocketClientConfig, sink: Arc<dyn TelemetrySink>) -> Self {
        let (status_tx, status_rx) = watch::channel(ConnectionStatusSnapshot::disconnected(
            config.url.clone(),
            None,
        ));
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let cancellation_token = CancellationToken::new();
        let attempts = Arc::new(AtomicU32::new(0));
        let url = config.url.clone();

        let runtime = SocketRuntime {
            config,
            sink,
            status: status_tx,
            attempts: Arc::clone(&attempts),
            cancel_token: cancellation_token.clone(),
        };
        let join_handle = tokio::spawn(runtime.run(outbound_rx));

        Self {
            url,
            cancellation_token,
            join_handle: Some(join_handle),
            outbound: outbound_tx,
            status: status_rx,
            attempts,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn state(&self) -> ConnectionState {
        self.status.borrow().state
    }

    pub fn status(&self) -> ConnectionStatusSnapshot {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatusSnapshot> {
        self.status.clone()
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Queues a JSON message; dropped with a warning unless connected.
    pub fn send<T: Serialize>(&self, message: &T) -> bool {
        if self.state() != ConnectionState::Connected {
            tracing::warn!(url = %self.url, "telemetry feed is not connected; message dropped");
            return false;
        }

        let payload = match simd_json::serde::to_string(message) {
            Ok(payload) => payload,
            Err(error) => {
                tracing::warn!(url = %self.url, %error, "failed to encode outbound message");
                return false;
            }
        };

        self.outbound.send(payload).is_ok()
    }

    /// Terminal close. Returns once the connection task is gone, so the sink
    /// sees no callbacks afterwards.
    pub async fn disconnect(&mut self) {
        self.cancellation_token.cancel();
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.await;
            tracing::info!(url = %self.url, "telemetry feed disconnected");
        }
    }
}

impl Drop for TelemetrySocket {
    fn drop(&mut self) {
        self.cancellation_token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet::types::{EventTimestamp, TelemetryEvent};
    use std::sync::atomic::AtomicUsize;
    use tokio::net::TcpListener;
    use tokio::sync::mpsc::UnboundedReceiver;

    enum SinkCall {
        Event(TelemetryEvent),
        Error(String),
    }

    struct ChannelSink {
        tx: mpsc::UnboundedSender<SinkCall>,
    }

    impl TelemetrySink for ChannelSink {
        fn on_event(&self, event: TelemetryEvent) {
            let _ = self.tx.send(SinkCall::Event(event));
        }

        fn on_error(&self, error: &AppError) {
            let _ = self.tx.send(SinkCall::Error(error.to_string()));
        }
    }

    fn channel_sink() -> (Arc<dyn TelemetrySink>, UnboundedReceiver<SinkCall>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(ChannelSink { tx }), rx)
    }

    fn config_for(url: String, max_reconnect_attempts: u32) -> SocketClientConfig {
        SocketClientConfig {
            url,
            reconnect_interval_ms: 10,
            max_reconnect_attempts,
        }
    }

    async fn next_call(rx: &mut UnboundedReceiver<SinkCall>) -> SinkCall {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("sink call should arrive")
            .expect("sink channel should stay open")
    }

    async fn wait_for_state(socket: &TelemetrySocket, state: ConnectionState) {
        let mut status = socket.subscribe_status();
        tokio::time::timeout(
            Duration::from_secs(5),
            status.wait_for(|snapshot| snapshot.state == state),
        )
        .await
        .expect("state should be reached in time")
        .expect("status channel should stay open");
    }

    #[tokio::test]
    async fn gives_up_after_max_reconnect_attempts() {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("listener should bind");
        let address = listener.local_addr().expect("listener has an address");
        let accepted = Arc::new(AtomicUsize::new(0));
        let server_accepted = Arc::clone(&accepted);
        let server = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                server_accepted.fetch_add(1, Ordering::SeqCst);
                drop(stream);
            }
        });

        let (sink, _calls) = channel_sink();
        let mut socket = TelemetrySocket::connect(config_for(format!("ws://{address}"), 3), sink);

        wait_for_state(&socket, ConnectionState::PermanentlyFailed).await;
        assert_eq!(socket.reconnect_attempts(), 3);
        assert_eq!(accepted.load(Ordering::SeqCst), 4);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(accepted.load(Ordering::SeqCst), 4);
        assert_eq!(socket.state(), ConnectionState::PermanentlyFailed);

        socket.disconnect().await;
        server.abort();
    }

    #[tokio::test]
    async fn delivers_events_and_reports_malformed_payloads() {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("listener should bind");
        let address = listener.local_addr().expect("listener has an address");
        let (inbound_tx, mut inbound_rx) = mpsc::unbounded_channel::<String>();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("client should connect");
            let mut ws = tokio_tungstenite::accept_async(stream)
                .await
                .expect("handshake should succeed");
            for frame in [
                r#"{"type":"fuel_update","truckId":"1","timestamp":1000,"fuelLevel":42}"#,
                r#"{"type":"fuel_update","truckId":"#,
                r#"{"type":"heartbeat"}"#,
            ] {
                ws.send(Message::Text(frame.to_string()))
                    .await
                    .expect("server send should succeed");
            }
            while let Some(Ok(message)) = ws.next().await {
                if let Message::Text(text) = message {
                    let _ = inbound_tx.send(text);
                }
            }
        });

        let (sink, mut calls) = channel_sink();
        let mut socket = TelemetrySocket::connect(config_for(format!("ws://{address}"), 0), sink);

        let SinkCall::Event(first) = next_call(&mut calls).await else {
            panic!("first call should be an event");
        };
        assert_eq!(
            first,
            TelemetryEvent::FuelUpdate {
                truck_id: "1".to_string(),
                timestamp: Some(EventTimestamp::Millis(1000.0)),
                fuel_level: 42.0,
            }
        );
        let SinkCall::Error(error) = next_call(&mut calls).await else {
            panic!("second call should report the malformed payload");
        };
        assert!(error.starts_with("malformed payload"));
        let SinkCall::Event(third) = next_call(&mut calls).await else {
            panic!("third call should be an event");
        };
        assert_eq!(
            third,
            TelemetryEvent::Unrecognized {
                kind: "heartbeat".to_string()
            }
        );

        wait_for_state(&socket, ConnectionState::Connected).await;
        assert!(socket.send(&outbound_fixture::Ping { kind: "ping" }));
        let echoed = tokio::time::timeout(Duration::from_secs(5), inbound_rx.recv())
            .await
            .expect("server should receive the message")
            .expect("server channel open");
        assert_eq!(echoed, r#"{"type":"ping"}"#);

        socket.disconnect().await;
        assert_eq!(socket.state(), ConnectionState::Disconnected);
        assert!(!socket.send(&outbound_fixture::Ping { kind: "ping" }));
        let _ = server.await;
    }

    #[tokio::test]
    async fn disconnect_cancels_pending_reconnect() {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("listener should bind");
        let address = listener.local_addr().expect("listener has an address");
        drop(listener);

        let (sink, mut calls) = channel_sink();
        let mut socket = TelemetrySocket::connect(
            SocketClientConfig {
                url: format!("ws://{address}"),
                reconnect_interval_ms: 60_000,
                max_reconnect_attempts: 5,
            },
            sink,
        );

        wait_for_state(&socket, ConnectionState::Reconnecting).await;
        assert!(matches!(next_call(&mut calls).await, SinkCall::Error(_)));

        socket.disconnect().await;
        assert_eq!(socket.state(), ConnectionState::Disconnected);
        assert_eq!(socket.reconnect_attempts(), 0);
        assert!(calls.try_recv().is_err());
    }

    #[tokio::test]
    async fn reconnect_counter_resets_after_each_open() {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("listener should bind");
        let address = listener.local_addr().expect("listener has an address");
        let accepted = Arc::new(AtomicUsize::new(0));
        let server_accepted = Arc::clone(&accepted);
        let server = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                server_accepted.fetch_add(1, Ordering::SeqCst);
                let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                    continue;
                };
                tokio::time::sleep(Duration::from_millis(50)).await;
                let _ = ws.close(None).await;
            }
        });

        let (sink, _calls) = channel_sink();
        let mut socket = TelemetrySocket::connect(
            SocketClientConfig {
                url: format!("ws://{address}"),
                reconnect_interval_ms: 20,
                max_reconnect_attempts: 1,
            },
            sink,
        );

        for _ in 0..3 {
            wait_for_state(&socket, ConnectionState::Connected).await;
            assert_eq!(socket.reconnect_attempts(), 0);
            wait_for_state(&socket, ConnectionState::Reconnecting).await;
        }
        assert!(accepted.load(Ordering::SeqCst) > 2);
        assert_ne!(socket.state(), ConnectionState::PermanentlyFailed);

        socket.disconnect().await;
        server.abort();
    }

    #[test]
    fn closed_session_discards_queued_messages() {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        tx.send("first".to_string()).expect("receiver is open");
        tx.send("second".to_string()).expect("receiver is open");

        assert_eq!(discard_stale_outbound(&mut rx), 2);
        assert!(rx.try_recv().is_err());
        assert_eq!(discard_stale_outbound(&mut rx), 0);
    }

    #[tokio::test]
    async fn disconnect_returns_when_peer_stops_reading() {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("listener should bind");
        let address = listener.local_addr().expect("listener has an address");
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("client should connect");
            let ws = tokio_tungstenite::accept_async(stream)
                .await
                .expect("handshake should succeed");
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(ws);
        });

        let (sink, _calls) = channel_sink();
        let mut socket = TelemetrySocket::connect(config_for(format!("ws://{address}"), 0), sink);
        wait_for_state(&socket, ConnectionState::Connected).await;

        let chunk = "x".repeat(256 << 10);
        for _ in 0..128 {
            assert!(socket.send(&chunk));
        }
        tokio::time::sleep(Duration::from_millis(100)).await;

        tokio::time::timeout(Duration::from_secs(5), socket.disconnect())
            .await
            .expect("disconnect should not wait on a stalled peer");
        assert_eq!(socket.state(), ConnectionState::Disconnected);
        server.abort();
    }

    mod outbound_fixture {
        use serde::Serialize;

        #[derive(Serialize)]
        pub struct Ping {
            #[serde(rename = "type")]
            pub kind: &'static str,
        }
    }
}
