//! Sender pipeline tests: emission order, progress events, retention, and
//! caller-driven replay.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chirplink_core::codec;
use chirplink_core::types::{ParityId, ParityKind};
use chirplink_protocol::error::SendError;
use chirplink_protocol::events::{ProgressEvent, ReceiverEvent, SendStage};
use chirplink_protocol::fec;
use chirplink_protocol::receiver::{Receiver, ReceiverConfig};
use chirplink_protocol::sender::{SendOptions, Sender};
use chirplink_protocol::transport::{FrameTransport, ProtocolTag, TransportError};

#[derive(Clone, Default)]
struct CollectTransport {
    frames: Arc<Mutex<Vec<String>>>,
}

impl CollectTransport {
    fn frames(&self) -> Vec<String> {
        self.frames.lock().unwrap().clone()
    }
}

impl FrameTransport for CollectTransport {
    async fn transmit(&self, frame: &str, _protocol: &ProtocolTag) -> Result<(), TransportError> {
        self.frames.lock().unwrap().push(frame.to_string());
        Ok(())
    }
}

/// Records frames but fails exactly once, at the given 0-based emission.
#[derive(Clone)]
struct FlakyTransport {
    frames: Arc<Mutex<Vec<String>>>,
    fail_at: Arc<AtomicUsize>,
    emitted: Arc<AtomicUsize>,
}

impl FlakyTransport {
    fn failing_at(index: usize) -> Self {
        Self {
            frames: Arc::new(Mutex::new(Vec::new())),
            fail_at: Arc::new(AtomicUsize::new(index)),
            emitted: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn frames(&self) -> Vec<String> {
        self.frames.lock().unwrap().clone()
    }
}

impl FrameTransport for FlakyTransport {
    async fn transmit(&self, frame: &str, _protocol: &ProtocolTag) -> Result<(), TransportError> {
        let index = self.emitted.fetch_add(1, Ordering::SeqCst);
        if index == self.fail_at.load(Ordering::SeqCst) {
            return Err(TransportError::Playback("speaker went away".to_string()));
        }
        self.frames.lock().unwrap().push(frame.to_string());
        Ok(())
    }
}

fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| ((i * 31 + 7) % 251) as u8 + 1).collect()
}

#[tokio::test]
async fn frames_are_emitted_in_protocol_order() {
    let transport = CollectTransport::default();
    let mut sender = Sender::new(transport.clone(), ProtocolTag::new("TEST"));
    let message = payload(300); // four chunks
    let sid = sender
        .send(
            &message,
            SendOptions {
                compress: false,
                scheme: fec::BASIC_4,
            },
            |_| {},
        )
        .await
        .unwrap();

    let frames = transport.frames();
    assert_eq!(frames.len(), 1 + 4 + 1 + 1);
    assert!(frames[0].starts_with(&format!("S:{sid}::")));
    assert!(frames[0].ends_with(":4:FBASIC_4"));
    for (i, frame) in frames[1..5].iter().enumerate() {
        assert!(
            frame.starts_with(&format!("D:{sid}:{}:", i + 1)),
            "frame {i}: {frame}"
        );
    }
    assert!(frames[5].starts_with(&format!("P:{sid}:1-4-0:")));
    assert_eq!(frames[6], format!("E:{sid}::"));
}

#[tokio::test]
async fn start_frame_carries_compression_flag_and_stream_hash() {
    let transport = CollectTransport::default();
    let mut sender = Sender::new(transport.clone(), ProtocolTag::new("TEST"));
    let message = payload(300);
    let sid = sender
        .send(
            &message,
            SendOptions {
                compress: true,
                scheme: fec::NONE,
            },
            |_| {},
        )
        .await
        .unwrap();

    let compressed = codec::gzip_compress(&message).unwrap();
    let hash = codec::md5_base64(&compressed);
    let total = codec::split_chunks(&compressed).len();
    let frames = transport.frames();
    assert_eq!(frames[0], format!("S:{sid}::{hash}:{total}:C"));
}

#[tokio::test]
async fn progress_events_mirror_the_emitted_frames() {
    let transport = CollectTransport::default();
    let mut sender = Sender::new(transport.clone(), ProtocolTag::new("TEST"));
    let mut events: Vec<ProgressEvent> = Vec::new();
    sender
        .send(
            &payload(300),
            SendOptions {
                compress: false,
                scheme: fec::BASIC_4,
            },
            |event| events.push(event),
        )
        .await
        .unwrap();

    let stages: Vec<SendStage> = events.iter().map(|e| e.stage).collect();
    assert_eq!(
        stages,
        vec![
            SendStage::Start,
            SendStage::Data,
            SendStage::Data,
            SendStage::Data,
            SendStage::Data,
            SendStage::Parity,
            SendStage::End,
        ]
    );

    let frames = transport.frames();
    let event_frames: Vec<&str> = events.iter().map(|e| e.frame.as_str()).collect();
    assert_eq!(event_frames, frames.iter().map(String::as_str).collect::<Vec<_>>());

    let parity_event = &events[5];
    assert_eq!(parity_event.parity_id.as_deref(), Some("1-4-0"));
    assert_eq!(parity_event.current, 1);
    assert_eq!(parity_event.total, 1);

    let data_event = &events[2];
    assert_eq!(data_event.current, 2);
    assert_eq!(data_event.total, 4);
}

#[tokio::test]
async fn finished_session_is_retained_with_counters() {
    let transport = CollectTransport::default();
    let mut sender = Sender::new(transport, ProtocolTag::new("TEST"));
    let message = payload(300);
    let sid = sender
        .send(
            &message,
            SendOptions {
                compress: false,
                scheme: fec::STRONG_OVERLAPPING_3,
            },
            |_| {},
        )
        .await
        .unwrap();

    let listed = sender.store().list();
    assert_eq!(listed.len(), 1);
    let summary = &listed[0];
    assert_eq!(summary.session, sid.to_string());
    assert_eq!(summary.total, 4);
    assert_eq!(summary.sent_chunks, 4);
    assert_eq!(summary.sent_parity as usize, summary.parity_count);
    assert_eq!(summary.scheme, "STRONG_OVERLAPPING_3");
    assert_eq!(summary.hash, codec::md5_base64(&message));
    assert!(!summary.compressed);
}

#[tokio::test]
async fn resend_chunks_replays_in_the_requested_order() {
    let transport = CollectTransport::default();
    let mut sender = Sender::new(transport.clone(), ProtocolTag::new("TEST"));
    let sid = sender
        .send(
            &payload(300),
            SendOptions {
                compress: false,
                scheme: fec::NONE,
            },
            |_| {},
        )
        .await
        .unwrap();

    let before = transport.frames();
    sender.resend_chunks(sid.as_str(), &[3, 1]).await.unwrap();
    let after = transport.frames();

    assert_eq!(after.len(), before.len() + 2);
    assert_eq!(after[after.len() - 2], before[3]); // D:…:3:…
    assert_eq!(after[after.len() - 1], before[1]); // D:…:1:…
    assert_eq!(sender.store().get(sid.as_str()).unwrap().sent_chunks, 6);
}

#[tokio::test]
async fn resend_rejects_unknown_sessions_chunks_and_parity() {
    let transport = CollectTransport::default();
    let mut sender = Sender::new(transport, ProtocolTag::new("TEST"));
    let sid = sender
        .send(
            &payload(300),
            SendOptions {
                compress: false,
                scheme: fec::BASIC_4,
            },
            |_| {},
        )
        .await
        .unwrap();

    assert!(matches!(
        sender.resend_chunks("ghost", &[1]).await,
        Err(SendError::UnknownSession(_))
    ));
    assert!(matches!(
        sender.resend_chunks(sid.as_str(), &[99]).await,
        Err(SendError::UnknownChunk { seq: 99, .. })
    ));
    assert!(matches!(
        sender
            .resend_parity(sid.as_str(), &[ParityId::new(9, 12, ParityKind::Primary)])
            .await,
        Err(SendError::UnknownParity { .. })
    ));

    // A valid parity id replays fine.
    sender
        .resend_parity(sid.as_str(), &[ParityId::new(1, 4, ParityKind::Primary)])
        .await
        .unwrap();
    assert_eq!(sender.store().get(sid.as_str()).unwrap().sent_parity, 2);
}

#[tokio::test]
async fn transport_failure_keeps_the_partial_session_for_replay() {
    // START and DATA 1 play, DATA 2 fails mid-send.
    let transport = FlakyTransport::failing_at(2);
    let mut sender = Sender::new(transport.clone(), ProtocolTag::new("TEST"));
    let message = payload(300);
    let result = sender
        .send(
            &message,
            SendOptions {
                compress: false,
                scheme: fec::NONE,
            },
            |_| {},
        )
        .await;
    assert!(matches!(result, Err(SendError::Transport(_))));

    let listed = sender.store().list();
    assert_eq!(listed.len(), 1, "partial session must stay in the store");
    let sid = listed[0].session.clone();
    assert_eq!(listed[0].sent_chunks, 1);

    // The caller completes the transfer by explicit replay; the receiver
    // finishes without ever seeing an END frame.
    sender.resend_chunks(&sid, &[2, 3, 4]).await.unwrap();

    let mut receiver = Receiver::new(ReceiverConfig {
        protocol: ProtocolTag::new("TEST"),
        ..ReceiverConfig::default()
    });
    let now = Instant::now();
    let mut delivered = None;
    for frame in transport.frames() {
        for event in receiver.handle_frame(&frame, now) {
            if let ReceiverEvent::Message { body } = event {
                delivered = Some(body);
            }
        }
    }
    assert_eq!(delivered.as_deref(), Some(&message[..]));
}
