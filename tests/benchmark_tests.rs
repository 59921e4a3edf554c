//! Performance benchmarks for the per-tick hot paths

use client::playback::Playback;
use glam::Vec2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use server::game::SimulationState;
use server::input_buffer::PlayerInputBuffer;
use server::physics::sat_penetration;
use shared::{
    dispatch_payload, decode_packet, encode_packet, CollisionShape, MessageBody, ObjectKey,
    ObjectSyncState, PayloadWriter, TickInput, NET_MAX_INPUT_TICKS, OBJ_MAX_NETWORK_OBJECTS,
};
use std::time::Instant;

fn box_at(p: Vec2, rotation: f32) -> ObjectSyncState {
    ObjectSyncState {
        init: true,
        is_active: true,
        has_collision: true,
        p,
        rotation,
        collision: CollisionShape::rect(Vec2::splat(12.0)),
        ..ObjectSyncState::default()
    }
}

/// Benchmarks SAT penetration tests between rotated boxes
#[test]
fn benchmark_sat_penetration() {
    let a = box_at(Vec2::new(100.0, 100.0), 0.3);
    let b = box_at(Vec2::new(115.0, 108.0), -0.7);

    let iterations = 100_000;
    let start = Instant::now();

    let mut hits = 0;
    for _ in 0..iterations {
        if sat_penetration(&a, &b).is_some() {
            hits += 1;
        }
    }

    let duration = start.elapsed();
    println!(
        "SAT penetration: {} iterations in {:?} ({:.2} ns/iter)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    assert_eq!(hits, iterations);
    // Should complete in under 1 second
    assert!(duration.as_millis() < 1000);
}

/// Benchmarks full simulation ticks with a crowded world
#[test]
fn benchmark_simulation_tick() {
    let mut state = SimulationState::new();
    let mut players: Vec<ObjectKey> = Vec::new();
    while let Some(key) = state.spawn_player() {
        players.push(key);
        if players.len() == 32 {
            break;
        }
    }

    let mut rng = StdRng::seed_from_u64(1);
    let ticks = 1_000;
    let start = Instant::now();

    for _ in 0..ticks {
        let inputs: Vec<(ObjectKey, TickInput)> = players
            .iter()
            .map(|key| {
                let angle = rng.gen_range(0.0..std::f32::consts::TAU);
                (*key, TickInput::moving(Vec2::from_angle(angle)))
            })
            .collect();
        state.tick(&inputs);
    }

    let duration = start.elapsed();
    println!(
        "Simulation: {} ticks with {} players in {:?} ({:.2} μs/tick)",
        ticks,
        players.len(),
        duration,
        duration.as_micros() as f64 / ticks as f64
    );

    assert_eq!(state.tick, ticks);
    // Should complete in under 2 seconds
    assert!(duration.as_millis() < 2000);
}

/// Benchmarks encoding and dispatching one broadcast's worth of packets
#[test]
fn benchmark_broadcast_codec() {
    let sync = box_at(Vec2::new(10.0, 20.0), 0.1);
    let iterations = 200;
    let start = Instant::now();

    let mut decoded = 0;
    for tick in 0..iterations {
        for net_index in 0..OBJ_MAX_NETWORK_OBJECTS as u32 {
            let mut writer = PayloadWriter::new();
            writer
                .push(tick, &MessageBody::ObjUpdate { net_index, sync })
                .unwrap();
            let packet = encode_packet(writer.as_bytes()).unwrap();
            let payload = decode_packet(&packet).unwrap();
            decoded += dispatch_payload(payload, |_| {});
        }
    }

    let duration = start.elapsed();
    println!(
        "Broadcast codec: {} packets in {:?}",
        decoded, duration
    );

    assert_eq!(decoded, iterations as usize * OBJ_MAX_NETWORK_OBJECTS);
    // Should complete in under 1 second
    assert!(duration.as_millis() < 1000);
}

/// Benchmarks snapshot inserts and playback for every network slot
#[test]
fn benchmark_snapshot_playback() {
    let mut playback = Playback::new();
    let mut rng = StdRng::seed_from_u64(2);
    let ticks = 2_000u64;
    let start = Instant::now();

    for tick in 1..=ticks {
        for index in 0..OBJ_MAX_NETWORK_OBJECTS {
            // drop about a fifth of the updates to force interpolation
            if rng.gen_bool(0.2) {
                continue;
            }
            let _ = playback.insert(index, tick, box_at(Vec2::new(tick as f32, 0.0), 0.0));
        }
        playback.playback_tick();
    }

    let duration = start.elapsed();
    println!(
        "Snapshot playback: {} ticks x {} slots in {:?}",
        ticks, OBJ_MAX_NETWORK_OBJECTS, duration
    );

    assert!(playback.next_playback_tick() > ticks / 2);
    // Should complete in under 2 seconds
    assert!(duration.as_millis() < 2000);
}

/// Stress tests the input buffer with overlapping windows
#[test]
fn stress_test_input_windows() {
    let mut buffer = PlayerInputBuffer::new();
    let window: Vec<TickInput> = (0..NET_MAX_INPUT_TICKS)
        .map(|i| TickInput::moving(Vec2::new(i as f32, 1.0)))
        .collect();

    let iterations = 100_000u64;
    let start = Instant::now();

    let mut queued = 0;
    for tick in 1..=iterations {
        queued += buffer.insert_batch(&window, tick);
        let _ = buffer.get_input_for_tick();
    }

    let duration = start.elapsed();
    println!("Input windows: {} batches in {:?}", iterations, duration);

    // every tick id is queued exactly once
    assert_eq!(queued as u64, iterations);
    assert!(duration.as_millis() < 2000);
}
