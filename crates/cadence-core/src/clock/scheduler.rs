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

//! Background frame loop with pause, resume, rate changes and shutdown.

use super::FrameDriver;
use crate::error::{BusError, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Observable state of the frame loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    /// No loop is ticking: never started, stopped, or reset.
    #[default]
    Stopped,
    /// The loop is dispatching the frame event at its configured rate.
    Running,
    /// The loop is alive but dispatches nothing until resumed.
    Paused,
}

/// Completion signals published by the frame loop after each tick.
///
/// Each signal carries the number of frames elapsed once that tick finished.
/// The channel holds a single signal; if the consumer falls behind, the
/// stale signal is replaced by the newest one. Once the loop stops, the
/// channel is closed and every receive returns `None`.
#[derive(Debug, Clone)]
pub struct FrameSignals {
    receiver: Receiver<u64>,
}

impl FrameSignals {
    /// Blocks until the next tick completes, or returns `None` once the loop is gone.
    pub fn recv(&self) -> Option<u64> {
        self.receiver.recv().ok()
    }

    /// Like [`recv`](Self::recv), giving up after `timeout`.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<u64> {
        self.receiver.recv_timeout(timeout).ok()
    }

    /// Returns a signal if one is buffered, without blocking.
    pub fn try_recv(&self) -> Option<u64> {
        self.receiver.try_recv().ok()
    }
}

#[derive(Debug, Clone, Copy)]
enum Control {
    Pause,
    Resume,
    SetTick(Duration),
    Stop,
}

struct ActiveLoop {
    control: Sender<Control>,
    handle: JoinHandle<()>,
    paused: bool,
}

enum LoopSlot {
    Idle,
    Active(ActiveLoop),
    /// Stopped; a new loop needs a reset first.
    Halted,
}

/// Owns the frame loop thread and the control side of its channel.
pub(crate) struct FrameScheduler {
    driver: Arc<dyn FrameDriver>,
    thread_name: String,
    slot: Mutex<LoopSlot>,
}

impl FrameScheduler {
    pub(crate) fn new(driver: Arc<dyn FrameDriver>, thread_name: impl Into<String>) -> Self {
        Self {
            driver,
            thread_name: thread_name.into(),
            slot: Mutex::new(LoopSlot::Idle),
        }
    }

    fn slot(&self) -> MutexGuard<'_, LoopSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts ticking at `ticks_per_second`.
    pub(crate) fn start(&self, ticks_per_second: u32) -> Result<FrameSignals> {
        if ticks_per_second == 0 {
            return Err(BusError::InvalidTickRate(ticks_per_second));
        }

        let mut slot = self.slot();
        match *slot {
            LoopSlot::Active(_) => return Err(BusError::AlreadyRunning),
            LoopSlot::Halted => return Err(BusError::Stopped),
            LoopSlot::Idle => {}
        }

        let interval = Duration::from_secs(1) / ticks_per_second;
        let (control_tx, control_rx) = crossbeam_channel::unbounded();
        let (signal_tx, signal_rx) = crossbeam_channel::bounded(1);
        let worker = FrameLoop {
            driver: Arc::clone(&self.driver),
            control: control_rx,
            signals: signal_tx,
            stale: signal_rx.clone(),
            interval,
        };

        let handle = thread::Builder::new()
            .name(self.thread_name.clone())
            .spawn(move || worker.run())
            .map_err(|source| BusError::Spawn {
                what: "frame loop",
                source,
            })?;

        *slot = LoopSlot::Active(ActiveLoop {
            control: control_tx,
            handle,
            paused: false,
        });
        log::info!(
            "Frame loop started at {} ticks per second ({:?} per tick).",
            ticks_per_second,
            interval
        );
        Ok(FrameSignals {
            receiver: signal_rx,
        })
    }

    fn with_active<T>(&self, f: impl FnOnce(&mut ActiveLoop) -> T) -> Result<T> {
        match &mut *self.slot() {
            LoopSlot::Active(active) => Ok(f(active)),
            LoopSlot::Idle => Err(BusError::NotStarted),
            LoopSlot::Halted => Err(BusError::Stopped),
        }
    }

    pub(crate) fn pause(&self) -> Result<()> {
        self.with_active(|active| {
            if !active.paused {
                active.paused = true;
                send(&active.control, Control::Pause);
            }
        })
    }

    pub(crate) fn resume(&self) -> Result<()> {
        self.with_active(|active| {
            if active.paused {
                active.paused = false;
                send(&active.control, Control::Resume);
            }
        })
    }

    /// Changes the tick interval, measured from the last tick (or resume).
    ///
    /// Zero and intervals too long to schedule are rejected with
    /// [`BusError::InvalidTickInterval`].
    pub(crate) fn set_tick(&self, interval: Duration) -> Result<()> {
        if interval.is_zero() || Instant::now().checked_add(interval).is_none() {
            return Err(BusError::InvalidTickInterval(interval));
        }
        self.with_active(|active| send(&active.control, Control::SetTick(interval)))
    }

    /// Stops the loop for good and waits for its thread to exit.
    ///
    /// Called from the loop thread itself (a frame listener stopping the
    /// loop), it only signals the loop, which exits after the current tick.
    pub(crate) fn stop(&self) -> Result<()> {
        let active = {
            let mut slot = self.slot();
            match std::mem::replace(&mut *slot, LoopSlot::Halted) {
                LoopSlot::Active(active) => active,
                LoopSlot::Halted => return Ok(()),
                LoopSlot::Idle => {
                    *slot = LoopSlot::Idle;
                    return Err(BusError::NotStarted);
                }
            }
        };
        // The slot lock is released here: frame listeners may still call
        // pause/resume while we wait for the thread.
        shut_down(active);
        Ok(())
    }

    pub(crate) fn run_state(&self) -> RunState {
        match &*self.slot() {
            LoopSlot::Active(active) if active.paused => RunState::Paused,
            LoopSlot::Active(_) => RunState::Running,
            LoopSlot::Idle | LoopSlot::Halted => RunState::Stopped,
        }
    }

    /// Stops any loop and makes the scheduler startable again.
    pub(crate) fn reset(&self) {
        let previous = std::mem::replace(&mut *self.slot(), LoopSlot::Idle);
        if let LoopSlot::Active(active) = previous {
            shut_down(active);
        }
    }
}

impl Drop for FrameScheduler {
    fn drop(&mut self) {
        self.reset();
    }
}

fn send(control: &Sender<Control>, message: Control) {
    if control.send(message).is_err() {
        log::warn!("Frame loop is gone; dropped {:?}.", message);
    }
}

fn shut_down(active: ActiveLoop) {
    send(&active.control, Control::Stop);
    if active.handle.thread().id() == thread::current().id() {
        log::debug!("Frame loop stop requested from its own thread; not joining.");
        return;
    }
    if active.handle.join().is_err() {
        log::error!("Frame loop thread panicked.");
    }
}

/// Deadline one `interval` after `from`, or `None` if it cannot be represented.
fn schedule(from: Instant, interval: Duration) -> Option<Instant> {
    from.checked_add(interval)
}

/// State owned by the loop thread.
struct FrameLoop {
    driver: Arc<dyn FrameDriver>,
    control: Receiver<Control>,
    signals: Sender<u64>,
    /// Receiving end kept by the loop so it can evict an unread signal.
    stale: Receiver<u64>,
    interval: Duration,
}

impl FrameLoop {
    fn run(self) {
        log::info!("Frame loop thread started.");

        let mut interval = self.interval;
        // Anchor of the schedule: the last tick, or the last resume.
        let mut anchor = Instant::now();
        let mut next_tick = schedule(anchor, interval);
        let mut paused = false;

        loop {
            let message = match next_tick {
                Some(deadline) if !paused => self.control.recv_deadline(deadline),
                _ => self
                    .control
                    .recv()
                    .map_err(|_| RecvTimeoutError::Disconnected),
            };

            match message {
                Ok(Control::Pause) => {
                    paused = true;
                    log::info!("Frame loop paused.");
                }
                Ok(Control::Resume) => {
                    if paused {
                        paused = false;
                        // Missed ticks are not replayed.
                        anchor = Instant::now();
                        next_tick = schedule(anchor, interval);
                        log::info!("Frame loop resumed.");
                    }
                }
                Ok(Control::SetTick(new_interval)) => {
                    interval = new_interval;
                    next_tick = schedule(anchor, interval);
                    log::info!("Frame loop tick interval set to {:?}.", interval);
                }
                Ok(Control::Stop) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {
                    let scheduled = next_tick.unwrap_or_else(Instant::now);
                    anchor = Instant::now();
                    self.tick();

                    let now = Instant::now();
                    next_tick = match schedule(scheduled, interval) {
                        Some(deadline) if deadline > now => Some(deadline),
                        _ => schedule(now, interval),
                    };
                }
            }
        }

        log::info!("Frame loop thread stopped.");
    }

    fn tick(&self) {
        match self.driver.step_frame() {
            Ok(step) => {
                if !step.report.is_clean() {
                    log::debug!(
                        "Frame {} finished with {} failing listener(s).",
                        step.frames_elapsed,
                        step.report.failed
                    );
                }
                self.publish(step.frames_elapsed);
            }
            Err(e) => log::error!("Frame loop could not step a frame: {}", e),
        }
    }

    /// Latest-wins publication: never blocks the loop.
    fn publish(&self, frames_elapsed: u64) {
        match self.signals.try_send(frames_elapsed) {
            Ok(()) | Err(TrySendError::Disconnected(_)) => {}
            Err(TrySendError::Full(_)) => {
                if let Ok(stale) = self.stale.try_recv() {
                    log::trace!(
                        "Completion signal for frame {} was never read; replacing it.",
                        stale
                    );
                }
                if self.signals.try_send(frames_elapsed).is_err() {
                    log::trace!("Completion signal for frame {} dropped.", frames_elapsed);
                }
            }
        }
    }
}
