use delonghikit_communication::codec::wire::{TYPE_ACK, TYPE_LCD, TYPE_LOG};
use delonghikit_communication::commands;
use delonghikit_communication::{
    encode, init_with, ConnectionStatus, Engine, EngineConfig, EngineState, LoopbackTransport,
    TransportSelection, WireFrame,
};
use delonghikit_core::types::thread_safe;
use delonghikit_core::{packet, CodecError, DeviceState, Error, EngineError, FrameKind};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

fn start(transport: &LoopbackTransport) -> Engine {
    init_with(
        EngineConfig::default(),
        TransportSelection::custom(transport.clone()),
    )
    .expect("engine should start on an open loopback")
}

fn lcd_reply() -> (Vec<u8>, Vec<u8>) {
    let mut packet = vec![0xB0, 0x00, 0x80, 0x0A, 0x13, 0x03, 0x27, 0xF0, 0x75, 0x00, 0x00];
    let last = packet.len() - 1;
    packet[last] = packet::checksum(&packet);
    let frame = WireFrame::new(TYPE_LCD, packet.clone()).encode().unwrap();
    (packet, frame)
}

#[test]
fn test_poll_reply_updates_lcd_and_notifies_once() {
    let transport = LoopbackTransport::new();
    let engine = start(&transport);

    let notifications = Arc::new(AtomicUsize::new(0));
    let n = notifications.clone();
    let _sub = engine.subscribe(move |_state: &DeviceState| {
        n.fetch_add(1, Ordering::SeqCst);
    });

    engine.send_data("p").unwrap();
    assert_eq!(transport.written(), vec![commands::poll().encoded().to_vec()]);

    let (packet, reply) = lcd_reply();
    transport.inject(&reply);

    assert_eq!(notifications.load(Ordering::SeqCst), 1);
    let lcd = engine.store().lcd().expect("lcd slot should be filled");
    assert_eq!(lcd.kind(), FrameKind::Lcd);
    assert_eq!(lcd.payload(), packet.as_slice());
    assert_eq!(lcd.raw_hex(), hex::encode_upper(&packet));
}

#[test]
fn test_commands_round_trip_through_echo() {
    let transport = LoopbackTransport::with_echo();
    let engine = start(&transport);

    let all = [
        commands::poll(),
        commands::reset_machine(),
        commands::reset_filters(),
        commands::enable_logging(),
        commands::disable_logging(),
        commands::set_grind_mode(&"other".into()).unwrap(),
    ];

    let seen = thread_safe(Vec::new());
    let seen_clone = seen.clone();
    let _sub = engine.subscribe(move |state: &DeviceState| {
        if let Some(frame) = &state.last_unknown {
            seen_clone.lock().push(frame.raw_hex().to_string());
        }
    });

    for command in &all {
        engine.send(command).unwrap();
    }

    let expected: Vec<String> = all.iter().map(|c| c.hex_payload()).collect();
    assert_eq!(*seen.lock(), expected);
}

#[test]
fn test_identical_log_frames_both_kept() {
    let transport = LoopbackTransport::new();
    let engine = start(&transport);

    let line = WireFrame::new(TYPE_LOG, b"[Delonghi] Sync'd".to_vec())
        .encode()
        .unwrap();
    transport.inject(&line);
    transport.inject(&line);

    let state = engine.device_state();
    assert_eq!(state.log.len(), 2);
    assert_eq!(state.log[0], state.log[1]);
    assert_eq!(state.log_lines()[0], "[Delonghi] Sync'd");
}

#[test]
fn test_reply_split_across_deliveries() {
    let transport = LoopbackTransport::new();
    let engine = start(&transport);

    let (_, reply) = lcd_reply();
    let mut stream = reply.clone();
    stream.extend(WireFrame::new(TYPE_ACK, vec![b'p']).encode().unwrap());

    for chunk in stream.chunks(3) {
        transport.inject(chunk);
    }

    let state = engine.device_state();
    assert!(state.lcd.is_some());
    assert_eq!(state.last_ack.as_ref().map(|f| f.text()), Some("p".to_string()));
    assert!(state.last_unknown.is_none());
}

#[test]
fn test_invalid_hex_writes_nothing() {
    let transport = LoopbackTransport::new();
    let engine = start(&transport);

    assert!(matches!(encode("bZZ"), Err(CodecError::InvalidHex { .. })));
    let err = engine.send_data("bZZ").unwrap_err();
    assert!(matches!(err, Error::Codec(CodecError::InvalidHex { .. })));
    assert!(transport.written().is_empty());
}

#[test]
fn test_not_ready_before_init() {
    let engine = Engine::new(EngineConfig::default());
    let err = engine.send_data("p").unwrap_err();
    assert!(matches!(err, Error::Engine(EngineError::NotReady { .. })));
}

#[test]
fn test_disconnect_and_reconnect() {
    let transport = LoopbackTransport::new();
    let engine = start(&transport);

    // A partial frame in flight is surfaced when the link drops.
    let (_, reply) = lcd_reply();
    transport.inject(&reply[..4]);
    transport.disconnect();

    assert_eq!(engine.state(), EngineState::Disconnected);
    assert_eq!(engine.status(), ConnectionStatus::Disconnected);
    assert_eq!(
        engine.device_state().last_unknown.map(|f| f.payload().to_vec()),
        Some(reply[..4].to_vec())
    );
    assert!(matches!(
        engine.poll().unwrap_err(),
        Error::Engine(EngineError::NotReady { .. })
    ));

    let replacement = LoopbackTransport::new();
    engine
        .reconnect(TransportSelection::custom(replacement.clone()))
        .unwrap();
    assert_eq!(engine.state(), EngineState::Ready);

    // The old link no longer affects the engine.
    transport.disconnect();
    assert_eq!(engine.state(), EngineState::Ready);

    engine.reset_filters().unwrap();
    assert_eq!(replacement.written(), vec![commands::reset_filters().encoded().to_vec()]);
}

#[test]
fn test_clones_share_state() {
    let transport = LoopbackTransport::new();
    let engine = start(&transport);
    let other = engine.clone();

    other.poll().unwrap();
    assert_eq!(transport.written().len(), 1);
    assert!(Arc::ptr_eq(&engine.store(), &other.store()));
}

#[test]
fn test_subscriber_can_send_over_echo() {
    let transport = LoopbackTransport::with_echo();
    let engine = start(&transport);

    let sent = Arc::new(AtomicBool::new(false));
    let notifications = Arc::new(AtomicUsize::new(0));
    let responder = engine.clone();
    let (sent_flag, n) = (sent.clone(), notifications.clone());
    let _sub = engine.subscribe(move |_state: &DeviceState| {
        n.fetch_add(1, Ordering::SeqCst);
        if !sent_flag.swap(true, Ordering::SeqCst) {
            responder.poll().expect("poll from an observer");
        }
    });

    let (done_tx, done_rx) = mpsc::channel();
    let sender = engine.clone();
    thread::spawn(move || {
        let result = sender.reset_filters();
        let _ = done_tx.send(result.is_ok());
    });

    assert_eq!(done_rx.recv_timeout(Duration::from_secs(5)), Ok(true));
    // Echo of the reset, then echo of the poll sent from the observer.
    assert_eq!(notifications.load(Ordering::SeqCst), 2);
    assert_eq!(
        engine.device_state().last_unknown.map(|f| f.raw_hex().to_string()),
        Some(commands::poll().hex_payload())
    );
    assert_eq!(
        transport.written(),
        vec![
            commands::reset_filters().encoded().to_vec(),
            commands::poll().encoded().to_vec(),
        ]
    );
}

#[test]
fn test_link_error_moves_engine_to_error() {
    let transport = LoopbackTransport::new();
    let engine = start(&transport);

    transport.fail();
    assert_eq!(engine.state(), EngineState::Error);
    assert_eq!(engine.status(), ConnectionStatus::Error);
    assert!(matches!(
        engine.poll().unwrap_err(),
        Error::Engine(EngineError::NotReady { .. })
    ));

    engine
        .reconnect(TransportSelection::custom(LoopbackTransport::new()))
        .unwrap();
    assert_eq!(engine.state(), EngineState::Ready);
}

#[test]
fn test_concurrent_sends_write_whole_frames() {
    let transport = LoopbackTransport::new();
    let engine = start(&transport);

    let texts = ["p", "r", "f", "g01", "b00FFFF00000000FF00t3bFFFFFFFFFFFFFFFFFFt8"];
    let handles: Vec<_> = texts
        .iter()
        .map(|text| {
            let engine = engine.clone();
            let text = text.to_string();
            thread::spawn(move || {
                for _ in 0..20 {
                    engine.send_data(&text).expect("send from worker thread");
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("sender thread panicked");
    }

    let expected: Vec<Vec<u8>> = texts.iter().map(|t| encode(t).unwrap()).collect();
    let written = transport.written();
    assert_eq!(written.len(), texts.len() * 20);
    for frame in &written {
        assert!(expected.contains(frame), "torn write {:02X?}", frame);
    }
    for bytes in &expected {
        assert_eq!(written.iter().filter(|w| *w == bytes).count(), 20);
    }
}
