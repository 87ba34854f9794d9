//! Performance benchmarks for the hot paths of the client core

use client::chat::EditBuffer;
use client::input::KeyInput;
use client::queue::MessageQueue;
use client::session::GameSession;
use client::simulation::{HeadlessSimulation, Simulation, TickInput};
use shared::{decode, encode, encode_frame, read_frame, GameMode, Message, SessionParams};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

/// Benchmarks frame encoding and decoding of chat messages
#[test]
fn benchmark_message_codec() {
    let msg = Message::chat("the quick brown fox jumps over the lazy dog");
    let iterations = 100_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let body = encode(&msg).unwrap();
        let _ = decode(&body).unwrap();
    }

    let duration = start.elapsed();
    println!(
        "Message codec: {} iterations in {:?} ({:.2} ns/iter)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    // Should complete in under 2 seconds
    assert!(duration.as_millis() < 2000);
}

/// Benchmarks reading a long stream of frames back to back
#[test]
fn benchmark_frame_stream() {
    let frames = 20_000;
    let mut wire = Vec::new();
    for i in 0..frames {
        wire.extend(encode_frame(&Message::score_update(i)).unwrap());
    }

    let start = Instant::now();
    let mut cursor = std::io::Cursor::new(wire);
    for _ in 0..frames {
        read_frame(&mut cursor).unwrap();
    }

    let duration = start.elapsed();
    println!("Frame stream: {} frames in {:?}", frames, duration);
    assert!(duration.as_millis() < 1000);
}

/// Benchmarks the chat queue with several producers and one consumer
#[test]
fn benchmark_queue_throughput() {
    let queue = Arc::new(MessageQueue::new());
    let producers = 4;
    let per_producer = 25_000;
    let start = Instant::now();

    let handles: Vec<_> = (0..producers)
        .map(|p| {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for i in 0..per_producer {
                    queue.push((p, i));
                }
            })
        })
        .collect();

    let mut last_seen = vec![None; producers];
    for _ in 0..producers * per_producer {
        let (p, i) = queue.pop().unwrap();
        // Per-producer order survives interleaving.
        if let Some(prev) = last_seen[p] {
            assert!(i > prev);
        }
        last_seen[p] = Some(i);
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let duration = start.elapsed();
    println!(
        "Queue: {} items from {} producers in {:?}",
        producers * per_producer,
        producers,
        duration
    );
    assert!(duration.as_secs() < 5);
}

/// Benchmarks session parameter parsing as done on every NEW_GAME
#[test]
fn benchmark_session_params_parsing() {
    let mut params = SessionParams::new(GameMode::RisingTide, 123_456_789);
    params.listen_port = 9103;
    params.accept_peers = 2;
    params.dial_peers = (0..3).map(|i| format!("10.0.0.{}:910{}", i + 1, i)).collect();
    let payload = params.to_payload();

    let iterations = 50_000;
    let start = Instant::now();
    for _ in 0..iterations {
        let parsed: SessionParams = payload.parse().unwrap();
        assert_eq!(parsed.expected_peers(), 5);
    }

    let duration = start.elapsed();
    println!("Params parsing: {} iterations in {:?}", iterations, duration);
    assert!(duration.as_millis() < 2000);
}

/// Benchmarks composing full-length chat lines
#[test]
fn benchmark_edit_buffer_typing() {
    let mut buffer = EditBuffer::default();
    let iterations = 200;
    let start = Instant::now();
    let mut lines = 0;

    for _ in 0..iterations {
        for c in "abcdefghij".chars().cycle().take(600) {
            if buffer.apply(KeyInput::Char(c)).is_some() {
                lines += 1;
            }
        }
        buffer.clear();
    }

    let duration = start.elapsed();
    println!("Edit buffer: {} lines in {:?}", lines, duration);
    assert_eq!(lines, iterations);
    assert!(duration.as_millis() < 2000);
}

/// Benchmarks the headless simulation tick with the shared RNG
#[test]
fn benchmark_simulation_ticks() {
    let mut session = GameSession::new(SessionParams::new(GameMode::Chill, 7));
    let mut sim = HeadlessSimulation::new(0);
    let ticks = 100_000;
    let start = Instant::now();

    for i in 0..ticks {
        let input = TickInput {
            player_move: None,
            garbage_lines: 0,
            random: session.next_random(),
        };
        let outcome = sim.tick(input);
        session.record_tick(outcome.lines_cleared);
        if i % 1000 == 0 {
            assert!(!outcome.game_over);
        }
    }

    let duration = start.elapsed();
    println!("Simulation: {} ticks in {:?}", ticks, duration);
    assert_eq!(session.ticks, ticks);
    assert!(duration.as_millis() < 1000);
}
