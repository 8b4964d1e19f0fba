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

// Cadence Sandbox
// Drives a small bus scenario: entity scopes, priorities, an input thread
// and the frame loop lifecycle.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use cadence_core::{typed, Bus, BusConfig, Response, ScopeId};

/// A toy entity registered as an event scope.
#[derive(Debug)]
struct Player {
    name: &'static str,
    health: AtomicU32,
}

fn load_config() -> Result<BusConfig> {
    match std::env::args().nth(1) {
        Some(path) => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading bus config '{}'", path))?;
            BusConfig::from_json_str(&text).with_context(|| format!("parsing '{}'", path))
        }
        None => Ok(BusConfig::default()),
    }
}

fn spawn_player(bus: &Bus, name: &'static str, health: u32, priority: i32) -> Result<ScopeId> {
    let player = Arc::new(Player {
        name,
        health: AtomicU32::new(health),
    });
    let scope = bus.scopes().next_id(Arc::clone(&player));

    // The shield absorbs the first hit, then unbinds itself on the next one.
    let spent = AtomicBool::new(false);
    bus.bind_priority(
        "Hit",
        scope,
        10,
        typed(move |scope, damage: &u32| {
            if spent.swap(true, Ordering::SeqCst) {
                log::debug!("Shield of {} is gone.", scope);
                return Response::UnbindSingle;
            }
            log::info!("{}'s shield absorbed {} damage.", name, damage);
            Response::StopPropagation
        }),
    )?;
    bus.bind(
        "Hit",
        scope,
        typed(move |_, damage: &u32| {
            let before = player
                .health
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |hp| {
                    Some(hp.saturating_sub(*damage))
                })
                .unwrap_or_default();
            let left = before.saturating_sub(*damage);
            log::info!("{} took {} damage ({} left).", player.name, damage, left);
            Response::Continue
        }),
    )?;

    // Per-frame logic; players with a higher priority update first.
    let frame_event = bus.config().frame_event.clone();
    bus.bind_priority(
        &frame_event,
        scope,
        priority,
        typed(move |scope, frame: &u64| {
            if frame % 60 == 0 {
                log::debug!("{} ({}) updates on frame {}.", name, scope, frame);
            }
            Response::Continue
        }),
    )?;
    Ok(scope)
}

fn main() -> Result<()> {
    use env_logger::{Builder, Env};

    Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = load_config()?;
    let frame_event = config.frame_event.clone();
    let frame_rate = config.frame_rate;
    let bus = Arc::new(Bus::with_config(config)?);

    let alice = spawn_player(&bus, "alice", 30, 2)?;
    let bob = spawn_player(&bus, "bob", 20, 1)?;

    bus.global_bind(&frame_event, |_, payload| {
        if let Some(frame) = payload.downcast_ref::<u64>() {
            if frame % 30 == 0 {
                log::info!("Frame {}.", frame);
            }
        }
        Response::Continue
    })?;

    // Shields take the first hit of each player.
    bus.trigger_sync("Hit", alice, 5u32)?;
    let report = bus.trigger_sync("Hit", bob, 8u32)?;
    log::info!("Hit on bob: {:?}", report);

    let signals = bus.start_loop(frame_rate)?;

    let input = {
        let bus = Arc::clone(&bus);
        thread::Builder::new()
            .name("sandbox-input".to_string())
            .spawn(move || -> Result<()> {
                for damage in [3u32, 7, 11] {
                    thread::sleep(Duration::from_millis(150));
                    let completion = bus.trigger("Hit", alice, damage)?;
                    if let Some(report) = completion.wait() {
                        log::info!("Input hit ({}) delivered: {:?}", damage, report);
                    }
                }
                Ok(())
            })
            .context("spawning input thread")?
    };

    thread::sleep(Duration::from_millis(300));
    bus.pause()?;
    log::info!("Paused at frame {}.", bus.frames_elapsed());
    thread::sleep(Duration::from_millis(300));
    bus.resume()?;
    bus.set_tick(Duration::from_millis(50))?;

    if let Some(frame) = signals.recv_timeout(Duration::from_secs(1)) {
        log::info!("Frame {} completed after the rate change.", frame);
    }

    match input.join() {
        Ok(result) => result?,
        Err(_) => anyhow::bail!("input thread panicked"),
    }

    bus.destroy_scope(bob);
    bus.stop()?;
    log::info!(
        "Sandbox finished after {} frames; {} 'Hit' listener(s) left.",
        bus.frames_elapsed(),
        bus.listener_count("Hit")
    );
    Ok(())
}
