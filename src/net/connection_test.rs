use super::*;

use std::collections::VecDeque;

use async_trait::async_trait;
use frames::{Message, UserRef};
use futures::channel::mpsc as script_mpsc;
use tokio::sync::mpsc;
use tokio::time::Instant;

const BASE: Duration = Duration::from_millis(100);

// =============================================================================
// SCRIPTED CONNECTOR
// =============================================================================

type ServerEnd = script_mpsc::UnboundedSender<Result<String, TransportError>>;

enum Script {
    Fail,
    Open(script_mpsc::UnboundedReceiver<Result<String, TransportError>>),
}

/// Connector that replays a script of open outcomes and records when each
/// open happened. Once the script runs out every open fails.
#[derive(Default)]
struct ScriptedConnector {
    script: Mutex<VecDeque<Script>>,
    opens: Mutex<Vec<Instant>>,
}

impl ScriptedConnector {
    fn new(script: Vec<Script>) -> Arc<Self> {
        Arc::new(Self { script: Mutex::new(script.into()), opens: Mutex::new(Vec::new()) })
    }

    fn open_times(&self) -> Vec<Instant> {
        self.opens.lock().unwrap().clone()
    }

    fn open_count(&self) -> usize {
        self.opens.lock().unwrap().len()
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn open(&self, _url: &str) -> Result<FrameStream, TransportError> {
        self.opens.lock().unwrap().push(Instant::now());
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Script::Open(rx)) => Ok(Box::pin(rx)),
            Some(Script::Fail) | None => Err(TransportError::Open("connection refused".to_owned())),
        }
    }
}

fn opened() -> (ServerEnd, Script) {
    let (tx, rx) = script_mpsc::unbounded();
    (tx, Script::Open(rx))
}

fn manager_with(connector: Arc<ScriptedConnector>) -> ConnectionManager {
    ConnectionManager::new("ws://chat.test/ws/chat/", connector, ReconnectPolicy { base_delay: BASE, max_attempts: 5 })
}

fn record_all(manager: &ConnectionManager) -> mpsc::UnboundedReceiver<ChannelEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    for kind in [EventKind::Connecting, EventKind::Connect, EventKind::Message, EventKind::Disconnect, EventKind::Error] {
        let tx = tx.clone();
        assert!(manager.on(kind, move |event| {
            let _ = tx.send(event);
        }));
    }
    rx
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<ChannelEvent>) -> ChannelEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for channel event")
        .expect("event channel closed")
}

fn drain(rx: &mut mpsc::UnboundedReceiver<ChannelEvent>) -> Vec<ChannelEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn count(events: &[ChannelEvent], kind: EventKind) -> usize {
    events.iter().filter(|event| event.kind() == kind).count()
}

fn sample_frame() -> Frame {
    Frame::SendMessage(Message {
        id: 11,
        room_id: 3,
        author: UserRef { id: 2, username: "bob".to_owned(), avatar: None },
        content: "hello".to_owned(),
        ts: 1_700_000_000_000,
        reply_to: None,
        attachments: Vec::new(),
        edited: false,
    })
}

// =============================================================================
// POLICY
// =============================================================================

#[test]
fn reconnect_delay_grows_linearly() {
    let policy = ReconnectPolicy { base_delay: BASE, max_attempts: 5 };
    assert_eq!(policy.delay_for(1), BASE);
    assert_eq!(policy.delay_for(3), BASE * 3);
}

#[test]
fn default_policy_is_one_second_five_attempts() {
    let policy = ReconnectPolicy::default();
    assert_eq!(policy.base_delay, Duration::from_millis(1000));
    assert_eq!(policy.max_attempts, 5);
}

#[test]
fn status_banner_only_when_not_connected() {
    assert_eq!(ConnectionStatus::Connected.banner(), None);
    assert!(ConnectionStatus::Disconnected.banner().is_some());
    assert!(ConnectionStatus::Error.banner().is_some());
}

// =============================================================================
// LIFECYCLE
// =============================================================================

#[tokio::test(start_paused = true)]
async fn failing_server_gets_exactly_max_attempts_with_linear_backoff() {
    let connector = ScriptedConnector::new(Vec::new());
    let manager = manager_with(connector.clone());
    let mut events = record_all(&manager);
    let started = Instant::now();

    manager.connect();
    tokio::time::sleep(Duration::from_secs(60)).await;

    let opens = connector.open_times();
    assert_eq!(opens.len(), 6, "initial open plus five reconnects");
    assert_eq!(opens[0], started);
    for (n, pair) in opens.windows(2).enumerate() {
        let attempt = u32::try_from(n).unwrap() + 1;
        assert_eq!(pair[1] - pair[0], BASE * attempt);
    }

    let events = drain(&mut events);
    assert_eq!(count(&events, EventKind::Connecting), 6);
    assert_eq!(count(&events, EventKind::Disconnect), 6);
    assert_eq!(count(&events, EventKind::Connect), 0);
    assert_eq!(
        events.last(),
        Some(&ChannelEvent::Error(ChannelError::ReconnectExhausted { attempts: 5 }))
    );
    assert_eq!(manager.status(), ConnectionStatus::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn failed_open_reports_error_then_disconnect() {
    let connector = ScriptedConnector::new(vec![Script::Fail]);
    let manager = manager_with(connector);
    let mut events = record_all(&manager);

    manager.connect();
    assert_eq!(next_event(&mut events).await, ChannelEvent::Connecting { attempt: 0 });
    assert!(matches!(
        next_event(&mut events).await,
        ChannelEvent::Error(ChannelError::Transport(TransportError::Open(_)))
    ));
    assert_eq!(next_event(&mut events).await, ChannelEvent::Disconnect);
}

#[tokio::test(start_paused = true)]
async fn unexpected_close_schedules_one_reconnect_after_base_delay() {
    let (server, first) = opened();
    let (_second_server, second) = opened();
    let connector = ScriptedConnector::new(vec![first, second]);
    let manager = manager_with(connector.clone());
    let mut events = record_all(&manager);

    manager.connect();
    assert_eq!(next_event(&mut events).await, ChannelEvent::Connecting { attempt: 0 });
    assert_eq!(next_event(&mut events).await, ChannelEvent::Connect);
    assert_eq!(manager.status(), ConnectionStatus::Connected);

    drop(server);
    assert_eq!(next_event(&mut events).await, ChannelEvent::Disconnect);
    assert_eq!(manager.status(), ConnectionStatus::Disconnected);

    tokio::time::sleep(BASE - Duration::from_millis(1)).await;
    assert_eq!(connector.open_count(), 1);

    tokio::time::sleep(Duration::from_millis(2)).await;
    assert_eq!(connector.open_count(), 2);
    assert_eq!(next_event(&mut events).await, ChannelEvent::Connecting { attempt: 1 });
    assert_eq!(next_event(&mut events).await, ChannelEvent::Connect);
    assert_eq!(manager.status(), ConnectionStatus::Connected);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(connector.open_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn successful_open_resets_the_backoff() {
    let (first_server, first) = opened();
    let (_second_server, second) = opened();
    let connector = ScriptedConnector::new(vec![Script::Fail, first, second]);
    let manager = manager_with(connector.clone());
    let mut events = record_all(&manager);

    manager.connect();
    loop {
        if next_event(&mut events).await == ChannelEvent::Connect {
            break;
        }
    }
    drop(first_server);
    tokio::time::sleep(Duration::from_secs(60)).await;

    let opens = connector.open_times();
    assert_eq!(opens.len(), 3);
    assert_eq!(opens[1] - opens[0], BASE);
    assert_eq!(opens[2] - opens[1], BASE, "counter restarts after a successful open");
    assert_eq!(manager.status(), ConnectionStatus::Connected);
}

#[tokio::test(start_paused = true)]
async fn connecting_twice_yields_one_live_channel() {
    let (_server, first) = opened();
    let connector = ScriptedConnector::new(vec![first]);
    let manager = manager_with(connector.clone());
    let mut events = record_all(&manager);

    manager.connect();
    manager.connect();
    tokio::time::sleep(Duration::from_millis(10)).await;

    let events = drain(&mut events);
    assert_eq!(count(&events, EventKind::Connect), 1);
    assert_eq!(count(&events, EventKind::Connecting), 1);
    assert_eq!(connector.open_count(), 1);
    assert_eq!(manager.status(), ConnectionStatus::Connected);
}

#[tokio::test(start_paused = true)]
async fn reconnecting_while_open_replaces_channel_without_disconnect() {
    let (_first_server, first) = opened();
    let (_second_server, second) = opened();
    let connector = ScriptedConnector::new(vec![first, second]);
    let manager = manager_with(connector.clone());
    let mut events = record_all(&manager);

    manager.connect();
    assert_eq!(next_event(&mut events).await, ChannelEvent::Connecting { attempt: 0 });
    assert_eq!(next_event(&mut events).await, ChannelEvent::Connect);

    manager.connect();
    assert_eq!(next_event(&mut events).await, ChannelEvent::Connecting { attempt: 0 });
    assert_eq!(next_event(&mut events).await, ChannelEvent::Connect);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(drain(&mut events).is_empty());
    assert_eq!(connector.open_count(), 2);
}

// =============================================================================
// LISTENERS AND INBOUND TRAFFIC
// =============================================================================

#[tokio::test(start_paused = true)]
async fn first_registered_listener_keeps_the_slot() {
    let (server, first) = opened();
    let connector = ScriptedConnector::new(vec![first]);
    let manager = manager_with(connector);

    let (first_tx, mut first_rx) = mpsc::unbounded_channel();
    let (second_tx, mut second_rx) = mpsc::unbounded_channel();
    assert!(manager.on(EventKind::Message, move |event| {
        let _ = first_tx.send(event);
    }));
    let second_for_handler = second_tx.clone();
    assert!(!manager.on(EventKind::Message, move |event| {
        let _ = second_for_handler.send(event);
    }));

    manager.connect();
    server.unbounded_send(Ok(frames::encode_frame(&sample_frame()))).unwrap();

    let delivered = next_event(&mut first_rx).await;
    assert_eq!(delivered, ChannelEvent::Message(sample_frame()));
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(second_rx.try_recv().is_err());

    manager.off(EventKind::Message);
    assert!(!manager.has_listener(EventKind::Message));
    assert!(manager.on(EventKind::Message, move |event| {
        let _ = second_tx.send(event);
    }));
}

#[tokio::test(start_paused = true)]
async fn malformed_payload_is_reported_and_stream_continues() {
    let (server, first) = opened();
    let connector = ScriptedConnector::new(vec![first]);
    let manager = manager_with(connector);
    let mut events = record_all(&manager);

    manager.connect();
    assert_eq!(next_event(&mut events).await, ChannelEvent::Connecting { attempt: 0 });
    assert_eq!(next_event(&mut events).await, ChannelEvent::Connect);

    server.unbounded_send(Ok("not json".to_owned())).unwrap();
    server.unbounded_send(Ok(frames::encode_frame(&sample_frame()))).unwrap();

    match next_event(&mut events).await {
        ChannelEvent::Error(ChannelError::Malformed { raw, .. }) => assert_eq!(raw, "not json"),
        other => panic!("expected malformed error, got {other:?}"),
    }
    assert_eq!(next_event(&mut events).await, ChannelEvent::Message(sample_frame()));
    assert_eq!(manager.status(), ConnectionStatus::Connected);
}

#[tokio::test(start_paused = true)]
async fn receive_failure_closes_and_schedules_reconnect() {
    let (server, first) = opened();
    let connector = ScriptedConnector::new(vec![first]);
    let manager = manager_with(connector);
    let mut events = record_all(&manager);

    manager.connect();
    assert_eq!(next_event(&mut events).await, ChannelEvent::Connecting { attempt: 0 });
    assert_eq!(next_event(&mut events).await, ChannelEvent::Connect);

    server.unbounded_send(Err(TransportError::Receive("reset by peer".to_owned()))).unwrap();
    assert!(matches!(
        next_event(&mut events).await,
        ChannelEvent::Error(ChannelError::Transport(TransportError::Receive(_)))
    ));
    assert_eq!(next_event(&mut events).await, ChannelEvent::Disconnect);
    assert_eq!(next_event(&mut events).await, ChannelEvent::Connecting { attempt: 1 });
}

#[tokio::test(start_paused = true)]
async fn disconnect_cancels_reconnects_and_clears_listeners() {
    let (_server, first) = opened();
    let connector = ScriptedConnector::new(vec![first]);
    let manager = manager_with(connector.clone());
    let mut events = record_all(&manager);

    manager.connect();
    assert_eq!(next_event(&mut events).await, ChannelEvent::Connecting { attempt: 0 });
    assert_eq!(next_event(&mut events).await, ChannelEvent::Connect);

    manager.disconnect();
    assert_eq!(manager.status(), ConnectionStatus::Disconnected);
    for kind in [EventKind::Connecting, EventKind::Connect, EventKind::Message, EventKind::Disconnect, EventKind::Error] {
        assert!(!manager.has_listener(kind));
    }

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(connector.open_count(), 1);
    assert_eq!(events.recv().await, None, "handlers dropped with their senders");
}

#[tokio::test(start_paused = true)]
async fn disconnect_during_backoff_suppresses_pending_reconnect() {
    let connector = ScriptedConnector::new(vec![Script::Fail]);
    let manager = manager_with(connector.clone());
    let mut events = record_all(&manager);

    manager.connect();
    loop {
        if next_event(&mut events).await == ChannelEvent::Disconnect {
            break;
        }
    }
    manager.disconnect();
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(connector.open_count(), 1);
    assert_eq!(manager.status(), ConnectionStatus::Disconnected);
}
