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

use super::dispatch::{DispatchReport, Dispatcher};
use super::listener::{Callback, Payload, Response};
use super::scope::{ScopeId, ScopeRegistry};
use super::table::{BindingHandle, BindingTable};
use super::worker::TriggerQueue;
use crate::clock::{FrameClock, FrameDriver, FrameScheduler, FrameSignals, FrameStep, RunState};
use crate::config::BusConfig;
use crate::error::{BusError, Result};
use crossbeam_channel::Receiver;
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

/// State shared between the bus, its frame loop thread and trigger workers.
struct BusCore {
    config: BusConfig,
    table: BindingTable,
    clock: FrameClock,
    scopes: ScopeRegistry,
}

impl BusCore {
    fn dispatch(&self, name: &str, scope: ScopeId, payload: &Payload) -> DispatchReport {
        Dispatcher::new(&self.table).dispatch(name, scope, payload)
    }
}

impl FrameDriver for BusCore {
    fn step_frame(&self) -> Result<FrameStep> {
        self.clock.step(|frame| {
            self.dispatch(&self.config.frame_event, ScopeId::GLOBAL, &frame)
        })
    }
}

/// Completion signal of an asynchronous [`Bus::trigger`].
///
/// Carries the [`DispatchReport`] of the pass once it has finished.
#[derive(Debug)]
pub struct Completion {
    receiver: Receiver<DispatchReport>,
}

impl Completion {
    /// Blocks until the dispatch pass has finished.
    ///
    /// Returns `None` only if the worker died before reporting.
    pub fn wait(self) -> Option<DispatchReport> {
        self.receiver.recv().ok()
    }

    /// Waits at most `timeout` for the dispatch pass to finish.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<DispatchReport> {
        self.receiver.recv_timeout(timeout).ok()
    }

    /// Returns the report if the pass has already finished.
    pub fn try_get(&self) -> Option<DispatchReport> {
        self.receiver.try_recv().ok()
    }
}

/// Event bus: registration, dispatch and the frame loop behind one facade.
///
/// A bus is explicitly constructed and shared by reference (or inside an
/// `Arc`) with everything that binds or triggers events. Independent buses
/// never see each other's events.
///
/// ```
/// use cadence_core::{Bus, Response, ScopeId};
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// let bus = Bus::new();
/// let hits = Arc::new(AtomicUsize::new(0));
/// let counter = Arc::clone(&hits);
/// bus.global_bind("Enter", move |_, _| {
///     counter.fetch_add(1, Ordering::SeqCst);
///     Response::Continue
/// })
/// .unwrap();
///
/// bus.trigger("Enter", ScopeId::GLOBAL, ()).unwrap().wait();
/// assert_eq!(hits.load(Ordering::SeqCst), 1);
/// ```
pub struct Bus {
    core: Arc<BusCore>,
    scheduler: FrameScheduler,
    triggers: TriggerQueue,
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(BusError::EmptyEventName);
    }
    Ok(())
}

impl Bus {
    /// Creates a bus with the default [`BusConfig`].
    pub fn new() -> Self {
        Self::from_valid_config(BusConfig::default())
    }

    /// Creates a bus after validating `config`.
    pub fn with_config(config: BusConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_valid_config(config))
    }

    fn from_valid_config(config: BusConfig) -> Self {
        let thread_name = config.loop_thread_name.clone();
        log::info!("Event bus initialized (frame event '{}').", config.frame_event);
        let core = Arc::new(BusCore {
            config,
            table: BindingTable::new(),
            clock: FrameClock::new(),
            scopes: ScopeRegistry::new(),
        });
        let scheduler = FrameScheduler::new(core.clone(), thread_name);
        Self {
            core,
            scheduler,
            triggers: TriggerQueue::new("cadence-trigger"),
        }
    }

    /// The configuration this bus was built with.
    pub fn config(&self) -> &BusConfig {
        &self.core.config
    }

    /// The registry of entity scopes owned by this bus.
    pub fn scopes(&self) -> &ScopeRegistry {
        &self.core.scopes
    }

    // --- Registration ---

    /// Binds `callback` to `name` for `scope`, at priority 0.
    pub fn bind<F>(&self, name: &str, scope: ScopeId, callback: F) -> Result<BindingHandle>
    where
        F: Fn(ScopeId, &Payload) -> Response + Send + Sync + 'static,
    {
        self.bind_priority(name, scope, 0, callback)
    }

    /// Binds `callback` to `name` for `scope` at `priority`.
    ///
    /// Higher priorities are delivered first; equal priorities are delivered
    /// in registration order. If `name` is being dispatched right now, the
    /// binding takes effect when that pass completes.
    pub fn bind_priority<F>(
        &self,
        name: &str,
        scope: ScopeId,
        priority: i32,
        callback: F,
    ) -> Result<BindingHandle>
    where
        F: Fn(ScopeId, &Payload) -> Response + Send + Sync + 'static,
    {
        validate_name(name)?;
        Ok(self
            .core
            .table
            .bind(name, scope, priority, Arc::new(callback)))
    }

    /// Binds `callback` to `name` for every scope.
    pub fn global_bind<F>(&self, name: &str, callback: F) -> Result<BindingHandle>
    where
        F: Fn(ScopeId, &Payload) -> Response + Send + Sync + 'static,
    {
        self.bind_priority(name, ScopeId::GLOBAL, 0, callback)
    }

    /// Removes the registration behind `handle`. Unknown handles are ignored.
    pub fn unbind(&self, handle: &BindingHandle) {
        self.core.table.unbind(handle);
    }

    /// Removes every registration held by `scope`, across all events.
    pub fn unbind_all(&self, scope: ScopeId) {
        self.core.table.unbind_all(scope);
    }

    /// Replaces everything `scope` listens to with `bindings` in one step.
    ///
    /// A dispatch pass sees either the old set of registrations or the new
    /// one, never a mix.
    pub fn unbind_all_and_rebind(
        &self,
        scope: ScopeId,
        bindings: Vec<(String, Callback)>,
    ) -> Result<Vec<BindingHandle>> {
        for (name, _) in &bindings {
            validate_name(name)?;
        }
        Ok(self.core.table.rebind(scope, bindings))
    }

    /// Forgets the entity behind `scope` and unbinds everything it held.
    pub fn destroy_scope(&self, scope: ScopeId) {
        self.core.scopes.remove(scope);
        self.unbind_all(scope);
    }

    // --- Triggering ---

    /// Queues `name` for dispatch on the bus's trigger worker and returns its
    /// completion signal.
    ///
    /// Triggers run one at a time, in the order they were queued, on a single
    /// background thread. A trigger issued by a listener already running on
    /// that thread is dispatched inline before this returns. Callers that
    /// fire at a high rate and do not need to overlap with the dispatch should
    /// prefer [`Bus::trigger_sync`].
    ///
    /// A global `scope` reaches every registration of `name`; any other scope
    /// reaches global registrations plus the ones made for that scope.
    pub fn trigger<P>(&self, name: &str, scope: ScopeId, payload: P) -> Result<Completion>
    where
        P: Any + Send + Sync,
    {
        validate_name(name)?;
        let (tx, rx) = crossbeam_channel::bounded(1);
        if self.triggers.is_worker_thread() {
            // The receiver is alive and the slot empty.
            let _ = tx.send(self.core.dispatch(name, scope, &payload));
            return Ok(Completion { receiver: rx });
        }

        let core = Arc::clone(&self.core);
        let name = name.to_string();
        self.triggers.submit(Box::new(move || {
            let report = core.dispatch(&name, scope, &payload);
            // Nobody waiting is fine.
            let _ = tx.send(report);
        }))?;
        Ok(Completion { receiver: rx })
    }

    /// Dispatches `name` on the calling thread.
    pub fn trigger_sync<P>(&self, name: &str, scope: ScopeId, payload: P) -> Result<DispatchReport>
    where
        P: Any + Send + Sync,
    {
        validate_name(name)?;
        Ok(self.core.dispatch(name, scope, &payload))
    }

    /// Runs one frame outside of the frame loop, for hosts that keep their
    /// own timing. Pending changes that can be merged are merged first.
    pub fn update(&self) -> Result<()> {
        self.core.table.flush();
        self.single_step().map(|_| ())
    }

    /// Dispatches the frame event once and advances the frame counter, exactly
    /// like a tick of the frame loop would.
    pub fn single_step(&self) -> Result<DispatchReport> {
        self.core.step_frame().map(|step| step.report)
    }

    // --- Frame loop ---

    /// Starts the frame loop at `ticks_per_second`.
    ///
    /// ## Returns
    /// The stream of completion signals, one per finished tick.
    ///
    /// ## Errors
    /// [`BusError::InvalidTickRate`] for zero, [`BusError::AlreadyRunning`]
    /// if a loop is active, [`BusError::Stopped`] if the loop was stopped and
    /// the bus not reset since.
    pub fn start_loop(&self, ticks_per_second: u32) -> Result<FrameSignals> {
        self.scheduler.start(ticks_per_second)
    }

    /// Suspends frame ticks. Registrations and the frame counter are kept.
    pub fn pause(&self) -> Result<()> {
        self.scheduler.pause()
    }

    /// Resumes frame ticks. Ticks missed while paused are not replayed.
    pub fn resume(&self) -> Result<()> {
        self.scheduler.resume()
    }

    /// Stops the frame loop permanently. Repeated calls succeed.
    pub fn stop(&self) -> Result<()> {
        self.scheduler.stop()
    }

    /// Changes the time between two ticks, starting with the next one.
    pub fn set_tick(&self, interval: Duration) -> Result<()> {
        self.scheduler.set_tick(interval)
    }

    /// Number of frames fully dispatched so far.
    pub fn frames_elapsed(&self) -> u64 {
        self.core.clock.frames_elapsed()
    }

    /// Current state of the frame loop.
    pub fn run_state(&self) -> RunState {
        self.scheduler.run_state()
    }

    // --- Maintenance ---

    /// Merges the pending queue into the binding table.
    ///
    /// Entries of events that are being dispatched cannot be merged yet; they
    /// are merged when their pass completes and reported through
    /// [`BusError::DispatchInProgress`].
    pub fn flush(&self) -> Result<()> {
        let outcome = self.core.table.flush();
        if outcome.deferred > 0 {
            return Err(BusError::DispatchInProgress {
                deferred: outcome.deferred,
            });
        }
        Ok(())
    }

    /// Drops every registration, pending change and entity scope, stops the
    /// frame loop and zeroes the frame counter. The loop can be started again.
    pub fn reset(&self) {
        self.scheduler.reset();
        self.core.table.clear();
        self.core.clock.reset();
        self.core.scopes.clear();
        log::info!("Event bus reset.");
    }

    // --- Introspection ---

    /// Number of installed registrations for `name`.
    pub fn listener_count(&self, name: &str) -> usize {
        self.core.table.listener_count(name)
    }

    /// Handles of the registrations for `name`, in delivery order.
    pub fn bindings(&self, name: &str) -> Vec<BindingHandle> {
        self.core.table.handles(name)
    }

    /// Number of bindings and unbindings waiting for a dispatch pass to end.
    pub fn pending_count(&self) -> usize {
        self.core.table.pending_count()
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{typed, ENTER_FRAME as ENTER};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn counter(bus: &Bus, name: &str, scope: ScopeId) -> Arc<AtomicUsize> {
        let hits = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&hits);
        bus.bind(name, scope, move |_, _| {
            inner.fetch_add(1, Ordering::SeqCst);
            Response::Continue
        })
        .unwrap();
        hits
    }

    #[test]
    fn test_empty_names_are_rejected() {
        let bus = Bus::new();
        assert!(matches!(
            bus.global_bind("", |_, _| Response::Continue),
            Err(BusError::EmptyEventName)
        ));
        assert!(matches!(
            bus.trigger_sync("  ", ScopeId::GLOBAL, ()),
            Err(BusError::EmptyEventName)
        ));
        let callback: Callback = Arc::new(|_: ScopeId, _: &Payload| Response::Continue);
        assert!(matches!(
            bus.unbind_all_and_rebind(ScopeId(1), vec![(String::new(), callback)]),
            Err(BusError::EmptyEventName)
        ));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = BusConfig {
            frame_rate: 0,
            ..Default::default()
        };
        assert!(matches!(Bus::with_config(config), Err(BusError::InvalidConfig(_))));
    }

    #[test]
    fn test_frame_listeners_see_pre_increment_count() {
        let bus = Bus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = Arc::clone(&seen);
            bus.global_bind(ENTER, move |_, payload| {
                seen.lock().unwrap().push(*payload.downcast_ref::<u64>().unwrap());
                Response::Continue
            })
            .unwrap();
        }
        bus.single_step().unwrap();
        bus.single_step().unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![0, 1]);
        assert_eq!(bus.frames_elapsed(), 2);
    }

    #[test]
    fn test_custom_frame_event_name() {
        let bus = Bus::with_config(BusConfig {
            frame_event: "Tick".to_string(),
            ..Default::default()
        })
        .unwrap();
        let tick = counter(&bus, "Tick", ScopeId::GLOBAL);
        let enter = counter(&bus, ENTER, ScopeId::GLOBAL);

        bus.update().unwrap();
        assert_eq!(tick.load(Ordering::SeqCst), 1);
        assert_eq!(enter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_update_from_frame_listener_is_refused() {
        let bus = Arc::new(Bus::new());
        let nested = Arc::new(Mutex::new(None));
        {
            let weak = Arc::downgrade(&bus);
            let nested = Arc::clone(&nested);
            bus.global_bind(ENTER, move |_, _| {
                if let Some(bus) = weak.upgrade() {
                    *nested.lock().unwrap() = Some(bus.update().is_err());
                }
                Response::Continue
            })
            .unwrap();
        }
        bus.update().unwrap();
        assert_eq!(*nested.lock().unwrap(), Some(true));
        assert_eq!(bus.frames_elapsed(), 1);
    }

    #[test]
    fn test_destroy_scope_unbinds_entity() {
        let bus = Bus::new();
        let scope = bus.scopes().next_id(Arc::new("crate"));
        let hits = counter(&bus, "Hit", scope);

        bus.trigger_sync("Hit", scope, ()).unwrap();
        bus.destroy_scope(scope);
        bus.trigger_sync("Hit", scope, ()).unwrap();

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(!bus.scopes().contains(scope));
        assert_eq!(bus.listener_count("Hit"), 0);
    }

    #[test]
    fn test_flush_reports_entries_held_by_an_active_pass() {
        let bus = Arc::new(Bus::new());
        let flush_result = Arc::new(Mutex::new(None));
        {
            let weak = Arc::downgrade(&bus);
            let flush_result = Arc::clone(&flush_result);
            bus.global_bind("Spawn", move |_, _| {
                if let Some(bus) = weak.upgrade() {
                    bus.global_bind("Spawn", |_, _| Response::Continue).unwrap();
                    *flush_result.lock().unwrap() = Some(bus.flush());
                }
                Response::UnbindSingle
            })
            .unwrap();
        }

        bus.trigger_sync("Spawn", ScopeId::GLOBAL, ()).unwrap();
        let result = flush_result.lock().unwrap().take().unwrap();
        assert!(matches!(result, Err(BusError::DispatchInProgress { deferred: 1 })));

        // Merged once the pass completed: the new listener replaced the old one.
        assert_eq!(bus.pending_count(), 0);
        assert_eq!(bus.listener_count("Spawn"), 1);
        assert!(bus.flush().is_ok());
    }

    #[test]
    fn test_async_trigger_reports_completion() {
        let bus = Bus::new();
        let hits = counter(&bus, "Ping", ScopeId::GLOBAL);

        let completion = bus.trigger("Ping", ScopeId::GLOBAL, 3u8).unwrap();
        let report = completion
            .wait_timeout(Duration::from_secs(2))
            .expect("trigger should complete");
        assert_eq!(report.invoked, 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(completion.try_get(), None);
    }

    #[test]
    fn test_triggers_share_one_worker_in_order() {
        let bus = Bus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = Arc::clone(&seen);
            bus.global_bind("Key", typed(move |_, key: &u32| {
                seen.lock().unwrap().push((*key, std::thread::current().id()));
                Response::Continue
            }))
            .unwrap();
        }

        let completions: Vec<_> = (0..50)
            .map(|key| bus.trigger("Key", ScopeId::GLOBAL, key as u32).unwrap())
            .collect();
        for completion in completions {
            completion.wait_timeout(Duration::from_secs(2)).expect("trigger completes");
        }

        let seen = seen.lock().unwrap();
        let keys: Vec<u32> = seen.iter().map(|(key, _)| *key).collect();
        assert_eq!(keys, (0..50).collect::<Vec<u32>>());
        assert!(seen.iter().all(|(_, id)| *id == seen[0].1));
        assert_ne!(seen[0].1, std::thread::current().id());
    }

    #[test]
    fn test_listener_can_wait_on_its_own_trigger() {
        let bus = Arc::new(Bus::new());
        let echoed = counter(&bus, "Echo", ScopeId::GLOBAL);
        {
            let weak = Arc::downgrade(&bus);
            bus.global_bind("Call", move |_, _| {
                if let Some(bus) = weak.upgrade() {
                    let report = bus.trigger("Echo", ScopeId::GLOBAL, ()).unwrap().wait();
                    assert_eq!(report.map(|r| r.invoked), Some(1));
                }
                Response::Continue
            })
            .unwrap();
        }

        let report = bus
            .trigger("Call", ScopeId::GLOBAL, ())
            .unwrap()
            .wait_timeout(Duration::from_secs(2))
            .expect("outer trigger completes");
        assert!(report.is_clean());
        assert_eq!(echoed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_bindings_lists_delivery_order() {
        let bus = Bus::new();
        let low = bus.bind_priority("Draw", ScopeId::GLOBAL, -1, |_, _| Response::Continue).unwrap();
        let high = bus.bind_priority("Draw", ScopeId(2), 10, |_, _| Response::Continue).unwrap();

        assert_eq!(bus.bindings("Draw"), vec![high, low]);
    }
}
