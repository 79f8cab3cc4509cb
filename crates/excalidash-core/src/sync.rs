//! Live-channel protocol and WebSocket client.
//!
//! Messages are JSON text frames tagged by `type`:
//! ```json
//! { "type": "join-room", "documentId": "d1", "user": { "id": "...", "name": "Jazz", ... } }
//! { "type": "user-activity", "documentId": "d1", "isActive": false }
//! { "type": "cursor-move", "documentId": "d1", "userId": "...", "pointer": { "x": 1, "y": 2 }, ... }
//! { "type": "element-update", "documentId": "d1", "elements": [...], "senderId": "..." }
//! { "type": "presence-update", "peers": [...] }
//! ```

use kurbo::Point;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::element::Element;
use crate::identity::Identity;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Not connected")]
    NotConnected,
    #[error("Already connected")]
    AlreadyConnected,
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Send failed: {0}")]
    Send(String),
    #[error("Encode failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Pointer button state carried with cursor updates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointerButton {
    Down,
    #[default]
    Up,
}

/// One peer's cursor sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorMove {
    pub document_id: String,
    pub user_id: String,
    pub pointer: Point,
    #[serde(default)]
    pub button: PointerButton,
    /// Element ids the peer has selected.
    #[serde(default)]
    pub selection: Vec<String>,
    pub color: String,
}

/// A batch of changed elements from one sender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementUpdate {
    pub document_id: String,
    pub elements: Vec<Element>,
    pub sender_id: String,
}

/// A room member as reported by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Peer {
    pub id: String,
    pub name: String,
    pub initials: String,
    pub color: String,
    pub is_active: bool,
}

impl Peer {
    /// A freshly joined peer is active.
    pub fn from_identity(identity: Identity) -> Self {
        Self {
            id: identity.id,
            name: identity.name,
            initials: identity.initials,
            color: identity.color,
            is_active: true,
        }
    }
}

/// Messages sent to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Join the live session of a document.
    JoinRoom { document_id: String, user: Identity },
    /// Focus/blur or pointer enter/leave.
    UserActivity { document_id: String, is_active: bool },
    CursorMove(CursorMove),
    ElementUpdate(ElementUpdate),
}

/// Messages received from the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Full member list of the room, active and inactive.
    PresenceUpdate { peers: Vec<Peer> },
    /// Activity change of another peer, stamped with its id by the server.
    UserActivity {
        document_id: String,
        user_id: String,
        is_active: bool,
    },
    CursorMove(CursorMove),
    ElementUpdate(ElementUpdate),
    /// The server could not parse something we sent.
    Error { message: String },
}

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Events from the WebSocket client
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    Connected,
    Disconnected,
    Message(ServerMessage),
    Error { message: String },
}

/// Parse a server frame. Malformed or unknown frames yield `None`.
pub fn parse_server_message(text: &str) -> Option<ServerMessage> {
    match serde_json::from_str::<ServerMessage>(text) {
        Ok(msg) => Some(msg),
        Err(e) => {
            log::debug!("Dropping unparseable server message: {}", e);
            None
        }
    }
}

/// Bidirectional message pipe to the relay server.
pub trait Transport {
    /// Queue a message for sending.
    fn send(&self, message: &ClientMessage) -> Result<(), SyncError>;

    /// Drain pending events without blocking.
    fn poll_events(&mut self) -> Vec<SyncEvent>;

    fn state(&self) -> ConnectionState;

    fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }
}

// ============================================================================
// Native WebSocket Client
// ============================================================================

mod native_client {
    use super::*;
    use std::net::TcpStream;
    use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};
    use std::thread::{self, JoinHandle};
    use std::time::Duration;
    use tungstenite::stream::MaybeTlsStream;
    use tungstenite::{Message, WebSocket};
    use url::Url;

    /// Read timeout on the socket; bounds how long an outgoing frame can wait.
    const READ_TIMEOUT: Duration = Duration::from_millis(20);
    const WRITE_TIMEOUT: Duration = Duration::from_secs(5);
    const LOG_PREVIEW_CHARS: usize = 100;

    enum Command {
        Send(String),
        Close,
    }

    enum Flow {
        Continue,
        Stop,
    }

    /// First `LOG_PREVIEW_CHARS` characters of a frame, cut on a char boundary.
    pub(super) fn log_preview(text: &str) -> &str {
        match text.char_indices().nth(LOG_PREVIEW_CHARS) {
            Some((end, _)) => &text[..end],
            None => text,
        }
    }

    /// Reports `Disconnected` when the socket thread ends, however it ends.
    struct DisconnectOnExit(Sender<SyncEvent>);

    impl Drop for DisconnectOnExit {
        fn drop(&mut self) {
            let _ = self.0.send(SyncEvent::Disconnected);
        }
    }

    /// Socket side of the client, owned by the background thread.
    struct SocketWorker {
        socket: WebSocket<MaybeTlsStream<TcpStream>>,
        commands: Receiver<Command>,
        events: Sender<SyncEvent>,
    }

    impl SocketWorker {
        fn run(mut self) {
            let _exit = DisconnectOnExit(self.events.clone());
            loop {
                if let Flow::Stop = self.send_pending() {
                    break;
                }
                if let Flow::Stop = self.read_frame() {
                    break;
                }
            }
            log::info!("Live channel thread exiting");
        }

        fn send_pending(&mut self) -> Flow {
            loop {
                match self.commands.try_recv() {
                    Ok(Command::Send(text)) => {
                        log::debug!("Sending frame: {}", log_preview(&text));
                        if let Err(e) = self.socket.send(Message::Text(text)) {
                            log::error!("Live channel send failed: {}", e);
                            let _ = self.events.send(SyncEvent::Error {
                                message: format!("Send failed: {}", e),
                            });
                            return Flow::Stop;
                        }
                    }
                    Ok(Command::Close) => {
                        log::info!("Closing live channel");
                        let _ = self.socket.close(None);
                        let _ = self.socket.flush();
                        return Flow::Stop;
                    }
                    Err(TryRecvError::Empty) => return Flow::Continue,
                    Err(TryRecvError::Disconnected) => return Flow::Stop,
                }
            }
        }

        fn read_frame(&mut self) -> Flow {
            match self.socket.read() {
                Ok(Message::Text(text)) => {
                    if let Some(msg) = parse_server_message(&text) {
                        let _ = self.events.send(SyncEvent::Message(msg));
                    }
                    Flow::Continue
                }
                Ok(Message::Close(_)) => {
                    log::info!("Server closed the live channel");
                    Flow::Stop
                }
                // Pings are answered by tungstenite on the next write/flush.
                Ok(_) => Flow::Continue,
                Err(tungstenite::Error::Io(ref e))
                    if matches!(
                        e.kind(),
                        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                    ) =>
                {
                    Flow::Continue
                }
                Err(tungstenite::Error::ConnectionClosed) => Flow::Stop,
                Err(e) => {
                    log::error!("Live channel read failed: {}", e);
                    Flow::Stop
                }
            }
        }
    }

    fn set_timeouts(socket: &mut WebSocket<MaybeTlsStream<TcpStream>>) {
        match socket.get_mut() {
            MaybeTlsStream::Plain(tcp) => {
                let _ = tcp.set_read_timeout(Some(READ_TIMEOUT));
                let _ = tcp.set_write_timeout(Some(WRITE_TIMEOUT));
            }
            #[allow(unreachable_patterns)]
            _ => log::debug!("Non-plain stream, keeping default timeouts"),
        }
    }

    /// Live-channel client backed by a background thread.
    ///
    /// The editing loop never blocks on the socket: outgoing frames go through a
    /// command channel and incoming frames are collected by `poll_events()`.
    pub struct NativeWebSocket {
        state: ConnectionState,
        commands: Option<Sender<Command>>,
        events: Option<Receiver<SyncEvent>>,
        _thread: Option<JoinHandle<()>>,
    }

    impl NativeWebSocket {
        pub fn new() -> Self {
            Self {
                state: ConnectionState::Disconnected,
                commands: None,
                events: None,
                _thread: None,
            }
        }

        /// Start connecting to a relay server (`ws://` or `wss://`).
        ///
        /// Returns once the thread is spawned; `SyncEvent::Connected` or
        /// `SyncEvent::Error` follows through `poll_events()`.
        pub fn connect(&mut self, url: &str) -> Result<(), SyncError> {
            if self.commands.is_some() {
                return Err(SyncError::AlreadyConnected);
            }

            let parsed = Url::parse(url).map_err(|e| SyncError::InvalidUrl(e.to_string()))?;
            if !matches!(parsed.scheme(), "ws" | "wss") {
                return Err(SyncError::InvalidUrl(format!(
                    "unsupported scheme: {}",
                    parsed.scheme()
                )));
            }

            self.state = ConnectionState::Connecting;

            let (cmd_tx, cmd_rx) = channel::<Command>();
            let (event_tx, event_rx) = channel::<SyncEvent>();
            let url = url.to_string();

            let handle = thread::spawn(move || {
                log::info!("Connecting live channel to {}", url);
                match tungstenite::connect(&url) {
                    Ok((mut socket, response)) => {
                        log::info!("Live channel connected, status: {}", response.status());
                        set_timeouts(&mut socket);
                        let _ = event_tx.send(SyncEvent::Connected);
                        SocketWorker {
                            socket,
                            commands: cmd_rx,
                            events: event_tx,
                        }
                        .run();
                    }
                    Err(e) => {
                        log::error!("Live channel connection failed: {}", e);
                        let _ = event_tx.send(SyncEvent::Error {
                            message: format!("Connection failed: {}", e),
                        });
                    }
                }
            });

            self.commands = Some(cmd_tx);
            self.events = Some(event_rx);
            self._thread = Some(handle);
            Ok(())
        }

        pub fn disconnect(&mut self) {
            if let Some(tx) = self.commands.take() {
                let _ = tx.send(Command::Close);
            }
            self.events = None;
            self._thread = None;
            self.state = ConnectionState::Disconnected;
        }
    }

    impl Transport for NativeWebSocket {
        fn send(&self, message: &ClientMessage) -> Result<(), SyncError> {
            let tx = self.commands.as_ref().ok_or(SyncError::NotConnected)?;
            let json = serde_json::to_string(message)?;
            tx.send(Command::Send(json))
                .map_err(|e| SyncError::Send(e.to_string()))
        }

        fn poll_events(&mut self) -> Vec<SyncEvent> {
            let Some(rx) = self.events.as_ref() else {
                return Vec::new();
            };
            let events: Vec<SyncEvent> = rx.try_iter().collect();
            for event in &events {
                match event {
                    SyncEvent::Connected => self.state = ConnectionState::Connected,
                    SyncEvent::Disconnected => self.state = ConnectionState::Disconnected,
                    SyncEvent::Error { .. } => self.state = ConnectionState::Error,
                    SyncEvent::Message(_) => {}
                }
            }
            events
        }

        fn state(&self) -> ConnectionState {
            self.state
        }
    }

    impl Default for NativeWebSocket {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Drop for NativeWebSocket {
        fn drop(&mut self) {
            self.disconnect();
        }
    }
}

pub use native_client::NativeWebSocket;

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::cell::RefCell;

    /// In-process transport that records what was sent and replays scripted events.
    pub struct FakeTransport {
        pub state: ConnectionState,
        pub sent: RefCell<Vec<ClientMessage>>,
        pub inbox: Vec<SyncEvent>,
    }

    impl FakeTransport {
        pub fn connected() -> Self {
            Self {
                state: ConnectionState::Connected,
                sent: RefCell::new(Vec::new()),
                inbox: Vec::new(),
            }
        }

        pub fn disconnected() -> Self {
            Self {
                state: ConnectionState::Disconnected,
                ..Self::connected()
            }
        }

        pub fn deliver(&mut self, message: ServerMessage) {
            self.inbox.push(SyncEvent::Message(message));
        }

        pub fn take_sent(&self) -> Vec<ClientMessage> {
            std::mem::take(&mut *self.sent.borrow_mut())
        }
    }

    impl Transport for FakeTransport {
        fn send(&self, message: &ClientMessage) -> Result<(), SyncError> {
            if self.state != ConnectionState::Connected {
                return Err(SyncError::NotConnected);
            }
            self.sent.borrow_mut().push(message.clone());
            Ok(())
        }

        fn poll_events(&mut self) -> Vec<SyncEvent> {
            for event in &self.inbox {
                match event {
                    SyncEvent::Connected => self.state = ConnectionState::Connected,
                    SyncEvent::Disconnected => self.state = ConnectionState::Disconnected,
                    SyncEvent::Error { .. } => self.state = ConnectionState::Error,
                    SyncEvent::Message(_) => {}
                }
            }
            std::mem::take(&mut self.inbox)
        }

        fn state(&self) -> ConnectionState {
            self.state
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::net::TcpListener;
    use std::sync::mpsc;
    use std::thread;
    use std::time::{Duration, Instant};

    fn identity() -> Identity {
        Identity {
            id: "u1".into(),
            name: "Jazz".into(),
            initials: "JA".into(),
            color: "#3b82f6".into(),
        }
    }

    #[test]
    fn test_join_room_wire_format() {
        let msg = ClientMessage::JoinRoom {
            document_id: "doc-1".into(),
            user: identity(),
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "join-room");
        assert_eq!(value["documentId"], "doc-1");
        assert_eq!(value["user"]["initials"], "JA");
    }

    #[test]
    fn test_cursor_move_wire_format() {
        let msg = ClientMessage::CursorMove(CursorMove {
            document_id: "doc-1".into(),
            user_id: "u1".into(),
            pointer: Point::new(10.0, 20.0),
            button: PointerButton::Down,
            selection: vec!["e1".into()],
            color: "#3b82f6".into(),
        });
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "cursor-move",
                "documentId": "doc-1",
                "userId": "u1",
                "pointer": {"x": 10.0, "y": 20.0},
                "button": "down",
                "selection": ["e1"],
                "color": "#3b82f6"
            })
        );
    }

    #[test]
    fn test_presence_update_deserialize() {
        let text = r##"{"type":"presence-update","peers":[
            {"id":"u1","name":"Jazz","initials":"JA","color":"#fff","isActive":true},
            {"id":"u2","name":"Kup","initials":"KU","color":"#000","isActive":false}
        ]}"##;
        match parse_server_message(text) {
            Some(ServerMessage::PresenceUpdate { peers }) => {
                assert_eq!(peers.len(), 2);
                assert!(peers[0].is_active);
                assert!(!peers[1].is_active);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_element_update_roundtrip_through_server_type() {
        let update = ElementUpdate {
            document_id: "doc-1".into(),
            elements: vec![Element::new("e1")],
            sender_id: "u1".into(),
        };
        let text = serde_json::to_string(&ClientMessage::ElementUpdate(update.clone())).unwrap();
        assert_eq!(
            parse_server_message(&text),
            Some(ServerMessage::ElementUpdate(update))
        );
    }

    #[test]
    fn test_malformed_messages_are_dropped() {
        assert_eq!(parse_server_message("not json"), None);
        assert_eq!(parse_server_message(r#"{"type":"teleport"}"#), None);
        assert_eq!(parse_server_message(r#"{"type":"cursor-move"}"#), None);
    }

    #[test]
    fn test_send_without_connection() {
        let ws = NativeWebSocket::new();
        let msg = ClientMessage::UserActivity {
            document_id: "d".into(),
            is_active: true,
        };
        assert!(matches!(ws.send(&msg), Err(SyncError::NotConnected)));
    }

    #[test]
    fn test_connect_rejects_non_ws_url() {
        let mut ws = NativeWebSocket::new();
        assert!(matches!(
            ws.connect("http://localhost:3030/ws"),
            Err(SyncError::InvalidUrl(_))
        ));
        assert_eq!(ws.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_log_preview_respects_char_boundaries() {
        let text = "é".repeat(150);
        let preview = native_client::log_preview(&text);
        assert_eq!(preview.chars().count(), 100);
        assert_eq!(native_client::log_preview("short"), "short");
    }

    /// Poll until `done` holds for the collected events or five seconds pass.
    fn collect_until(ws: &mut NativeWebSocket, done: impl Fn(&[SyncEvent]) -> bool) -> Vec<SyncEvent> {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut events = Vec::new();
        while Instant::now() < deadline {
            events.extend(ws.poll_events());
            if done(&events) {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        events
    }

    #[test]
    fn test_loopback_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let (received_tx, received_rx) = mpsc::channel::<String>();

        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut socket = tungstenite::accept(stream).unwrap();
            loop {
                match socket.read().unwrap() {
                    tungstenite::Message::Text(text) => {
                        received_tx.send(text).unwrap();
                        break;
                    }
                    _ => continue,
                }
            }
            let presence = ServerMessage::PresenceUpdate {
                peers: vec![Peer::from_identity(identity())],
            };
            socket
                .send(tungstenite::Message::Text("{\"type\":\"teleport\"}".into()))
                .unwrap();
            socket
                .send(tungstenite::Message::Text(serde_json::to_string(&presence).unwrap()))
                .unwrap();
            socket.close(None).unwrap();
            while socket.read().is_ok() {}
        });

        let mut ws = NativeWebSocket::new();
        ws.connect(&format!("ws://127.0.0.1:{port}/ws")).unwrap();
        let events = collect_until(&mut ws, |evs| evs.contains(&SyncEvent::Connected));
        assert!(events.contains(&SyncEvent::Connected));
        assert!(ws.is_connected());

        let join = ClientMessage::JoinRoom {
            document_id: "doc-1".into(),
            user: identity(),
        };
        ws.send(&join).unwrap();
        let frame = received_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(serde_json::from_str::<ClientMessage>(&frame).unwrap(), join);

        let events = collect_until(&mut ws, |evs| evs.contains(&SyncEvent::Disconnected));
        let messages: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                SyncEvent::Message(msg) => Some(msg),
                _ => None,
            })
            .collect();
        assert!(matches!(messages.as_slice(), [ServerMessage::PresenceUpdate { peers }] if peers[0].id == "u1"));
        assert_eq!(events.last(), Some(&SyncEvent::Disconnected));
        assert_eq!(ws.state(), ConnectionState::Disconnected);

        server.join().unwrap();
    }
}
