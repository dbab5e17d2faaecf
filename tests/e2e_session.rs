//! End-to-end session engine tests.
//!
//! These drive the public surface the way a real deployment does: bytes in
//! through the session manager, dispatched requests observed through a
//! capturing handler, framed responses observed through a memory-backed
//! write path.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::BytesMut;
use framewire::{
    Config, ConnectionId, DeflateCodec, FramewireError, IoBackend, LimitsConfig, MessageCodec,
    Result, ServiceHandler, SessionManager,
};

/// Body text passes through unless it opens with "bad".
struct TextCodec;

impl MessageCodec for TextCodec {
    type Request = String;
    type Response = String;

    fn decode(&self, body: &str) -> Result<String> {
        if body.starts_with("bad") {
            Err(FramewireError::Decode("unparsable body".into()))
        } else {
            Ok(body.to_owned())
        }
    }

    fn encode(&self, response: &String) -> Result<String> {
        Ok(response.clone())
    }
}

/// Records every dispatched request; answers all but "silent" ones.
#[derive(Default)]
struct CapturingHandler {
    seen: Mutex<Vec<String>>,
}

impl ServiceHandler<TextCodec> for CapturingHandler {
    fn perform(&self, request: String, _peer: SocketAddr) -> Option<String> {
        self.seen.lock().unwrap().push(request.clone());
        if request == "silent" {
            None
        } else {
            Some(format!("re:{request}"))
        }
    }
}

#[derive(Default)]
struct MemoryIo {
    writes: Mutex<Vec<(ConnectionId, Vec<u8>)>>,
}

impl IoBackend for MemoryIo {
    fn acquire_buffer(&self) -> BytesMut {
        BytesMut::with_capacity(4096)
    }

    fn enqueue_for_write(&self, conn: ConnectionId, buffer: BytesMut) {
        self.writes.lock().unwrap().push((conn, buffer.to_vec()));
    }
}

impl MemoryIo {
    fn frames(&self) -> Vec<Vec<u8>> {
        self.writes
            .lock()
            .unwrap()
            .iter()
            .map(|(_, b)| b.clone())
            .collect()
    }
}

struct Rig {
    io: Arc<MemoryIo>,
    handler: Arc<CapturingHandler>,
    manager: SessionManager<TextCodec>,
}

fn rig(config: Config) -> Rig {
    let io = Arc::new(MemoryIo::default());
    let handler = Arc::new(CapturingHandler::default());
    let manager = SessionManager::new(Arc::new(TextCodec), handler.clone(), io.clone(), config);
    Rig {
        io,
        handler,
        manager,
    }
}

fn peer() -> SocketAddr {
    "192.0.2.17:5100".parse().unwrap()
}

fn wire(body: &str, uid: u64) -> Vec<u8> {
    format!("content-length:{}\r\nuid:{}\r\n\r\n{}", body.len(), uid, body).into_bytes()
}

#[test]
fn test_end_to_end_single_message() {
    let r = rig(Config::default());
    let conn = ConnectionId(1);
    let session = r.manager.accept_connection(conn, peer());

    let enqueued = r
        .manager
        .feed_bytes(conn, b"content-length:13\r\n\r\n<ping uid=1/>")
        .unwrap();
    assert_eq!(enqueued, 1);
    assert!(session.message_waiting());

    r.manager.process_queued_messages(conn).unwrap();
    assert_eq!(r.handler.seen.lock().unwrap().as_slice(), ["<ping uid=1/>"]);
    assert!(!session.message_waiting());

    let frames = r.io.frames();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0], b"content-length:16\r\nuid:0\r\n\r\nre:<ping uid=1/>");
}

#[test]
fn test_chunking_invariance_against_whole_feed() {
    let mut stream = Vec::new();
    for (body, uid) in [("alpha", 1u64), ("beta", 2), ("gamma-delta", 3)] {
        stream.extend_from_slice(&wire(body, uid));
    }

    // Whole-stream delivery.
    let whole = rig(Config::default());
    whole.manager.accept_connection(ConnectionId(1), peer());
    whole.manager.feed_bytes(ConnectionId(1), &stream).unwrap();
    whole
        .manager
        .process_queued_messages(ConnectionId(1))
        .unwrap();

    // Byte-at-a-time delivery of the identical stream.
    let trickle = rig(Config::default());
    trickle.manager.accept_connection(ConnectionId(1), peer());
    for byte in &stream {
        trickle
            .manager
            .feed_bytes(ConnectionId(1), std::slice::from_ref(byte))
            .unwrap();
    }
    trickle
        .manager
        .process_queued_messages(ConnectionId(1))
        .unwrap();

    assert_eq!(
        whole.handler.seen.lock().unwrap().as_slice(),
        trickle.handler.seen.lock().unwrap().as_slice()
    );
    assert_eq!(whole.io.frames(), trickle.io.frames());
}

#[test]
fn test_fifo_dispatch_and_response_order() {
    let r = rig(Config::default());
    let conn = ConnectionId(4);
    r.manager.accept_connection(conn, peer());

    for uid in 1..=3u64 {
        r.manager
            .feed_bytes(conn, &wire(&format!("m{uid}"), uid))
            .unwrap();
    }
    r.manager.process_queued_messages(conn).unwrap();

    assert_eq!(
        r.handler.seen.lock().unwrap().as_slice(),
        ["m1", "m2", "m3"]
    );
    let uids: Vec<String> = r
        .io
        .frames()
        .iter()
        .map(|f| String::from_utf8_lossy(f).to_string())
        .collect();
    assert!(uids[0].contains("uid:1"));
    assert!(uids[1].contains("uid:2"));
    assert!(uids[2].contains("uid:3"));
}

#[test]
fn test_short_body_waits_for_remaining_bytes() {
    let r = rig(Config::default());
    let conn = ConnectionId(5);
    r.manager.accept_connection(conn, peer());

    let full = wire("twelve-bytes", 9);
    let (first, rest) = full.split_at(full.len() - 4);

    assert_eq!(r.manager.feed_bytes(conn, first).unwrap(), 0);
    assert!(r.handler.seen.lock().unwrap().is_empty());

    assert_eq!(r.manager.feed_bytes(conn, rest).unwrap(), 1);
    r.manager.process_queued_messages(conn).unwrap();
    assert_eq!(r.handler.seen.lock().unwrap().as_slice(), ["twelve-bytes"]);
}

#[test]
fn test_deflate_both_directions() {
    let r = rig(Config::default());
    let conn = ConnectionId(6);
    r.manager.accept_connection(conn, peer());

    // Client sends a compressed body and advertises deflate support.
    let mut codec = DeflateCodec::new(4096);
    let mut body = Vec::new();
    codec.compress("squeezed payload", &mut body).unwrap();
    let mut stream = format!(
        "content-length:{}\r\nuid:11\r\ncontent-encoding:deflate\r\naccept-encoding:deflate\r\n\r\n",
        body.len()
    )
    .into_bytes();
    stream.extend_from_slice(&body);

    assert_eq!(r.manager.feed_bytes(conn, &stream).unwrap(), 1);
    r.manager.process_queued_messages(conn).unwrap();
    assert_eq!(
        r.handler.seen.lock().unwrap().as_slice(),
        ["squeezed payload"]
    );

    // The response must come back compressed, declaring the compressed length.
    let frames = r.io.frames();
    let text = String::from_utf8_lossy(&frames[0]).to_string();
    assert!(text.contains("content-encoding:deflate"));
    assert!(text.contains("uid:11"));

    let split = frames[0].windows(4).position(|w| w == b"\r\n\r\n").unwrap() + 4;
    assert_eq!(
        codec.decompress(&frames[0][split..]).unwrap(),
        "re:squeezed payload"
    );
}

#[test]
fn test_decode_failures_evict_at_threshold() {
    let config = Config {
        limits: LimitsConfig::default().with_max_transmission_errors(3),
        ..Config::default()
    };
    let r = rig(config);
    let conn = ConnectionId(7);
    r.manager.accept_connection(conn, peer());

    assert_eq!(r.manager.feed_bytes(conn, &wire("bad 1", 1)).unwrap(), 0);
    assert_eq!(r.manager.feed_bytes(conn, &wire("bad 2", 2)).unwrap(), 0);
    let err = r.manager.feed_bytes(conn, &wire("bad 3", 3)).unwrap_err();
    match err {
        FramewireError::BadClient { peer: p, reason } => {
            assert_eq!(p, peer());
            assert!(reason.contains("bad transmissions"));
        },
        other => panic!("expected BadClient, got {other:?}"),
    }
    // The session is gone; no frame was ever written for the bad messages.
    assert_eq!(r.manager.count(), 0);
    assert!(r.io.frames().is_empty());
}

#[test]
fn test_valid_message_prevents_eviction() {
    let config = Config {
        limits: LimitsConfig::default().with_max_transmission_errors(3),
        ..Config::default()
    };
    let r = rig(config);
    let conn = ConnectionId(8);
    r.manager.accept_connection(conn, peer());

    r.manager.feed_bytes(conn, &wire("bad 1", 1)).unwrap();
    r.manager.feed_bytes(conn, &wire("bad 2", 2)).unwrap();
    r.manager.feed_bytes(conn, &wire("healthy", 3)).unwrap();
    // Counter reset: two more failures stay under the ceiling.
    assert!(r.manager.feed_bytes(conn, &wire("bad 4", 4)).is_ok());
    assert!(r.manager.feed_bytes(conn, &wire("bad 5", 5)).is_ok());
    assert_eq!(r.manager.count(), 1);
}

#[test]
fn test_oversized_declared_content_fatal() {
    let config = Config {
        limits: LimitsConfig::default().with_max_message_size(32),
        ..Config::default()
    };
    let r = rig(config);
    let conn = ConnectionId(9);
    r.manager.accept_connection(conn, peer());

    let err = r
        .manager
        .feed_bytes(conn, b"content-length:33\r\n\r\n")
        .unwrap_err();
    assert!(matches!(err, FramewireError::BadClient { .. }));
    assert_eq!(r.manager.count(), 0);
}

#[test]
fn test_oversized_header_fatal_names_peer() {
    let config = Config {
        limits: LimitsConfig::default().with_max_header_len(24),
        ..Config::default()
    };
    let r = rig(config);
    let conn = ConnectionId(10);
    r.manager.accept_connection(conn, peer());

    let err = r.manager.feed_bytes(conn, &[b'k'; 64]).unwrap_err();
    match err {
        FramewireError::BadClient { peer: p, reason } => {
            assert_eq!(p, peer());
            assert!(reason.contains("header"));
        },
        other => panic!("expected BadClient, got {other:?}"),
    }
}

#[test]
fn test_idle_watchdog_sweeps_stalled_session() {
    let config = Config {
        limits: LimitsConfig::default().with_idle_timeout(Duration::from_secs(0)),
        ..Config::default()
    };
    let r = rig(config);
    r.manager.accept_connection(ConnectionId(11), peer());
    std::thread::sleep(Duration::from_millis(10));

    let evicted = r.manager.sweep_idle();
    assert_eq!(evicted, vec![(ConnectionId(11), peer())]);
    assert_eq!(r.manager.count(), 0);
}

#[test]
fn test_push_update_and_teardown_noop() {
    let r = rig(Config::default());
    let conn = ConnectionId(12);
    let session = r.manager.accept_connection(conn, peer());

    r.manager
        .push_update(conn, &"broadcast".to_string())
        .unwrap();
    let frames = r.io.frames();
    assert_eq!(frames[0], b"content-length:9\r\n\r\nbroadcast");

    session.invalidate();
    r.manager.push_update(conn, &"late".to_string()).unwrap();
    assert_eq!(r.io.frames().len(), 1);

    r.manager.disconnect(conn);
    assert!(matches!(
        r.manager.push_update(conn, &"gone".to_string()),
        Err(FramewireError::UnknownConnection(_))
    ));
}

#[test]
fn test_fire_and_forget_request() {
    let r = rig(Config::default());
    let conn = ConnectionId(13);
    r.manager.accept_connection(conn, peer());

    r.manager.feed_bytes(conn, &wire("silent", 21)).unwrap();
    r.manager.process_queued_messages(conn).unwrap();

    assert_eq!(r.handler.seen.lock().unwrap().as_slice(), ["silent"]);
    assert!(r.io.frames().is_empty());
}
