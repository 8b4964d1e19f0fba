// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use cadence_core::{Bus, BusError, Response, RunState, ScopeId, ENTER_FRAME};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(3);

#[test]
fn test_trigger_then_loop_then_set_tick_then_stop() {
    // --- 1. ARRANGE ---
    let bus = Bus::new();
    let hits = Arc::new(AtomicUsize::new(0));
    let frames = Arc::new(AtomicUsize::new(0));
    {
        let hits = Arc::clone(&hits);
        bus.global_bind("Enter", move |_, _| {
            hits.fetch_add(1, Ordering::SeqCst);
            Response::Continue
        })
        .unwrap();
        let frames = Arc::clone(&frames);
        bus.global_bind(ENTER_FRAME, move |_, _| {
            frames.fetch_add(1, Ordering::SeqCst);
            Response::Continue
        })
        .unwrap();
    }

    // --- 2. ACT & ASSERT ---
    let report = bus
        .trigger("Enter", ScopeId::GLOBAL, ())
        .unwrap()
        .wait()
        .expect("trigger completes");
    assert_eq!(report.invoked, 1);
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    let signals = bus.start_loop(60).unwrap();
    assert_eq!(bus.run_state(), RunState::Running);
    let first = signals.recv_timeout(WAIT).expect("first frame signal");
    assert_eq!(first, 1, "The first signal reports the first completed frame");
    // The next tick is one interval away; allow it to land meanwhile.
    let elapsed = bus.frames_elapsed();
    assert!(
        elapsed == first || elapsed == first + 1,
        "frames_elapsed() = {} after the first signal",
        elapsed
    );

    bus.set_tick(Duration::from_secs(1)).unwrap();
    let second = signals.recv_timeout(WAIT).expect("second frame signal");
    assert_eq!(second, first + 1, "Changing the rate must not fire an extra tick");
    assert_eq!(bus.frames_elapsed(), second);

    bus.stop().unwrap();
    assert_eq!(bus.run_state(), RunState::Stopped);
    while signals.try_recv().is_some() {}
    assert_eq!(signals.recv_timeout(Duration::from_millis(300)), None);

    // --- 3. ASSERT ---
    let elapsed = bus.frames_elapsed();
    thread::sleep(Duration::from_millis(100));
    assert_eq!(bus.frames_elapsed(), elapsed);
    assert_eq!(frames.load(Ordering::SeqCst) as u64, elapsed);
}

#[test]
fn test_frame_count_tracks_ticks() {
    let bus = Bus::new();
    let signals = bus.start_loop(200).unwrap();

    let mut last = 0;
    while last < 10 {
        last = signals.recv_timeout(WAIT).expect("frame signal");
    }
    bus.stop().unwrap();

    assert!(bus.frames_elapsed() >= 10);
}

#[test]
fn test_pause_does_not_replay_missed_ticks() {
    // --- 1. ARRANGE ---
    let bus = Bus::new();
    let _signals = bus.start_loop(100).unwrap();
    thread::sleep(Duration::from_millis(100));

    // --- 2. ACT ---
    bus.pause().unwrap();
    assert_eq!(bus.run_state(), RunState::Paused);
    // The loop may finish the tick it was running when the pause arrived.
    thread::sleep(Duration::from_millis(20));
    let at_pause = bus.frames_elapsed();
    thread::sleep(Duration::from_millis(300));
    let still_paused = bus.frames_elapsed();

    bus.resume().unwrap();
    thread::sleep(Duration::from_millis(50));
    let after_resume = bus.frames_elapsed();
    bus.stop().unwrap();

    // --- 3. ASSERT ---
    assert!(at_pause > 0);
    assert_eq!(still_paused, at_pause, "No ticks while paused");
    // 300ms of missed ticks would be 30 frames.
    assert!(
        after_resume - at_pause < 20,
        "Resuming must not catch up: {} -> {}",
        at_pause,
        after_resume
    );
}

#[test]
fn test_lifecycle_errors() {
    let bus = Bus::new();

    assert!(matches!(bus.start_loop(0), Err(BusError::InvalidTickRate(0))));
    assert!(matches!(bus.pause(), Err(BusError::NotStarted)));
    assert!(matches!(bus.stop(), Err(BusError::NotStarted)));

    let _signals = bus.start_loop(30).unwrap();
    assert!(matches!(bus.start_loop(30), Err(BusError::AlreadyRunning)));
    assert!(matches!(
        bus.set_tick(Duration::ZERO),
        Err(BusError::InvalidTickInterval(_))
    ));

    bus.stop().unwrap();
    bus.stop().unwrap();
    assert!(matches!(bus.resume(), Err(BusError::Stopped)));
    assert!(matches!(bus.start_loop(30), Err(BusError::Stopped)));

    bus.reset();
    let signals = bus.start_loop(100).unwrap();
    assert!(signals.recv_timeout(WAIT).is_some());
}

#[test]
fn test_listener_can_stop_the_loop() {
    let bus = Arc::new(Bus::new());
    {
        let weak = Arc::downgrade(&bus);
        bus.global_bind(ENTER_FRAME, move |_, payload| {
            let frame = payload.downcast_ref::<u64>().copied().unwrap_or_default();
            if frame == 2 {
                if let Some(bus) = weak.upgrade() {
                    bus.stop().unwrap();
                }
            }
            Response::Continue
        })
        .unwrap();
    }

    let signals = bus.start_loop(200).unwrap();
    while signals.recv_timeout(WAIT).is_some() {}

    assert_eq!(bus.frames_elapsed(), 3);
    assert_eq!(bus.run_state(), RunState::Stopped);
}

#[test]
fn test_slow_consumer_never_blocks_the_loop() {
    let bus = Bus::new();
    let signals = bus.start_loop(500).unwrap();

    thread::sleep(Duration::from_millis(100));
    let latest = signals.recv_timeout(WAIT).expect("buffered signal");
    bus.stop().unwrap();

    assert!(latest > 1, "Only the newest signal is kept, got {}", latest);
    assert!(bus.frames_elapsed() >= latest);
}
