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

//! The background thread that runs asynchronous triggers.

use crate::error::{BusError, Result};
use crossbeam_channel::Sender;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};

/// A dispatch pass waiting to run on the worker.
pub(crate) type TriggerJob = Box<dyn FnOnce() + Send + 'static>;

struct Worker {
    jobs: Sender<TriggerJob>,
    handle: JoinHandle<()>,
}

/// Single worker thread fed by an unbounded FIFO queue.
///
/// The thread is spawned by the first submitted job. Jobs run one at a time,
/// in submission order. Dropping the queue lets the worker finish what is
/// already queued, then joins it.
pub(crate) struct TriggerQueue {
    thread_name: String,
    worker: Mutex<Option<Worker>>,
}

impl TriggerQueue {
    pub(crate) fn new(thread_name: impl Into<String>) -> Self {
        Self {
            thread_name: thread_name.into(),
            worker: Mutex::new(None),
        }
    }

    fn worker(&self) -> MutexGuard<'_, Option<Worker>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns true when called from a job running on the worker.
    pub(crate) fn is_worker_thread(&self) -> bool {
        self.worker_id() == Some(thread::current().id())
    }

    fn worker_id(&self) -> Option<ThreadId> {
        self.worker().as_ref().map(|w| w.handle.thread().id())
    }

    /// Queues `job`, spawning the worker if it is not running yet.
    pub(crate) fn submit(&self, job: TriggerJob) -> Result<()> {
        let mut worker = self.worker();
        if worker.is_none() {
            let (jobs, queue) = crossbeam_channel::unbounded::<TriggerJob>();
            let handle = thread::Builder::new()
                .name(self.thread_name.clone())
                .spawn(move || {
                    log::debug!("Trigger worker started.");
                    for job in queue {
                        job();
                    }
                    log::debug!("Trigger worker stopped.");
                })
                .map_err(|source| BusError::Spawn {
                    what: "trigger worker",
                    source,
                })?;
            *worker = Some(Worker { jobs, handle });
        }

        match worker.as_ref() {
            Some(active) if active.jobs.send(job).is_ok() => Ok(()),
            _ => {
                log::error!("Trigger worker is gone; the job was not queued.");
                Err(BusError::Stopped)
            }
        }
    }
}

impl Drop for TriggerQueue {
    fn drop(&mut self) {
        let Some(Worker { jobs, handle }) = self.worker().take() else {
            return;
        };
        drop(jobs);
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            log::error!("Trigger worker thread panicked.");
        }
    }
}
