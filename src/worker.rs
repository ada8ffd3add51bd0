// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Background worker: startup reconciliation and the delivery loop.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐    mutex +     ┌──────────────┐   on_file_ready   ┌──────────────┐
//! │    push()    │ ── condvar ──► │    Worker    │ ────────────────► │  Processor   │
//! │  (producer)  │                │  (bg thread) │ ◄──── verdict ─── │ (user code)  │
//! └──────────────┘                └──────────────┘                   └──────────────┘
//! ```
//!
//! The worker first rebuilds the queue state from the working directory
//! (the directory listing is the only durable state), then loops: wait for
//! a deliverable head, dispatch it to the processor outside the lock, apply
//! the verdict. Delivery is strictly FIFO; a failed head blocks all of its
//! successors.
//!
//! Errors in this thread never propagate out; they are logged and the loop
//! carries on.

use std::{sync::Arc, time::Duration};

use parking_lot::MutexGuard;
use tracing::{debug, error, info, warn};

use crate::{
    processor::{ProcessingResult, Processor},
    queue::{Core, CurrentFile, State},
    status::{FileInfo, QueueStatus},
};

pub(crate) struct Worker {
    core:      Arc<Core>,
    processor: Box<dyn Processor>,
}

impl Worker {
    pub(crate) fn new(core: Arc<Core>, processor: Box<dyn Processor>) -> Self {
        Self { core, processor }
    }

    pub(crate) fn run(&mut self) {
        info!("Worker starting");
        self.reconcile();
        self.deliver_loop();
        info!("Worker stopped");
    }

    /// Rebuild the in-memory state from the working directory.
    ///
    /// Finalized files seed the FIFO. Of the current-named files left over
    /// from previous runs, all but the newest are finalized on the spot by
    /// rename; the newest is adopted as the live current file unless the
    /// finalize policy already fires for its on-disk size and age. Runs
    /// under the state lock, so producers observe a fully reconciled queue.
    fn reconcile(&self) {
        let mut state = self.core.state.lock();

        let mut finalized = match self.core.scan(&self.core.config.naming.finalized) {
            Ok(files) => files,
            Err(e) => {
                error!(error = ?e, "Startup scan of finalized files failed");
                Vec::new()
            }
        };

        match self.core.scan(&self.core.config.naming.current) {
            Ok(mut currents) => {
                // A producer may have already opened a fresh current file;
                // everything found on disk besides it is from a previous
                // run.
                if let Some(live) = state.current.as_ref() {
                    let live_path = live.path.clone();
                    currents.retain(|f| f.path != live_path);
                }
                let newest = if state.current.is_none() { currents.pop() } else { None };

                for stale in currents {
                    if let Some(info) = self.finalize_on_disk(stale) {
                        finalized.push(info);
                    }
                }

                if let Some(candidate) = newest
                    && let Some(info) = self.adopt_or_finalize(&mut state, candidate)
                {
                    finalized.push(info);
                }
            }
            Err(e) => error!(error = ?e, "Startup scan of current files failed"),
        }

        finalized.sort();
        state.status.finalized.total_size = finalized.iter().map(|f| f.size).sum();
        state.status.finalized.queue = finalized.into();

        self.core.purge(&mut state);

        info!(
            queued = state.status.finalized.queue.len(),
            total_size = state.status.finalized.total_size,
            current_size = state.status.current_size,
            "Startup reconciliation complete"
        );

        state.status_ready = true;
        self.core.cond.notify_all();
    }

    /// Rename a leftover current file to its finalized name.
    fn finalize_on_disk(&self, file: FileInfo) -> Option<FileInfo> {
        let name = self.core.config.naming.finalized.generate(file.timestamp);
        let path = self.core.fs.join_path(&self.core.config.directory, &name);
        match self.core.fs.rename(&file.path, &path) {
            Ok(()) => {
                info!(from = %file.name, to = %name, "Finalized leftover current file");
                Some(FileInfo {
                    name,
                    path,
                    timestamp: file.timestamp,
                    size: file.size,
                })
            }
            Err(e) => {
                // Left under its current name; the next startup retries.
                error!(file = %file.name, error = ?e, "Failed to finalize leftover file");
                None
            }
        }
    }

    /// Adopt `candidate` as the live current file, or finalize it right
    /// away if the policy says it is already due.
    fn adopt_or_finalize(&self, state: &mut State, candidate: FileInfo) -> Option<FileInfo> {
        let now = self.core.clock.now();
        let probe = QueueStatus {
            current_size: candidate.size,
            current_timestamp: candidate.timestamp,
            ..Default::default()
        };
        if self.core.config.finalize.should_finalize(&probe, now) {
            return self.finalize_on_disk(candidate);
        }
        match self.core.fs.open_append(&candidate.path) {
            Ok(handle) => {
                info!(file = %candidate.name, size = candidate.size, "Resuming current file");
                state.status.current_size = candidate.size;
                state.status.current_timestamp = candidate.timestamp;
                state.current = Some(CurrentFile {
                    handle,
                    path: candidate.path,
                });
                None
            }
            Err(e) => {
                // Cannot append to it; salvage the contents by finalizing.
                warn!(file = %candidate.name, error = ?e, "Failed to reopen current file, finalizing it");
                self.finalize_on_disk(candidate)
            }
        }
    }

    /// Wait for a deliverable head, dispatch it, apply the verdict. Repeats
    /// until shutdown.
    fn deliver_loop(&mut self) {
        loop {
            let file = {
                let mut state = self.core.state.lock();
                match self.next_deliverable(&mut state) {
                    Some(file) => file,
                    None => return,
                }
            };

            // The processor runs outside the lock and may block for as long
            // as it needs.
            let verdict = self.processor.on_file_ready(&file, self.core.clock.now());

            let mut state = self.core.state.lock();
            self.apply_verdict(&mut state, &file, verdict);
        }
    }

    /// Block until the head of the finalized queue may be dispatched.
    /// Returns `None` on shutdown.
    fn next_deliverable(&self, state: &mut MutexGuard<'_, State>) -> Option<FileInfo> {
        loop {
            if state.shutdown {
                return None;
            }
            if state.force_processing {
                // Consumed on wake; it cleared any suspension when it was
                // set and does not bypass a pending retry delay.
                state.force_processing = false;
            }
            if !state.suspended && !state.status.finalized.queue.is_empty() {
                let now = self.core.clock.now();
                match state.retry.should_wait(now) {
                    None => {
                        if let Some(head) = state.status.finalized.queue.front() {
                            return Some(head.clone());
                        }
                    }
                    Some(remaining) => {
                        // Woken early by finalize/force/shutdown, or by the
                        // deadline; either way the predicate is re-checked.
                        let _ = self
                            .core
                            .cond
                            .wait_for(state, Duration::from_millis(remaining));
                    }
                }
            } else {
                self.core.cond.wait(state);
            }
        }
    }

    fn apply_verdict(&self, state: &mut State, file: &FileInfo, verdict: ProcessingResult) {
        // Only this thread pops, but the purge may have evicted the head
        // while the processor ran; the verdict then concerns a gone file.
        let still_head = state
            .status
            .finalized
            .queue
            .front()
            .is_some_and(|head| head.name == file.name);
        if !still_head {
            debug!(file = %file.name, "Head purged during processing, discarding verdict");
            return;
        }

        let now = self.core.clock.now();
        match verdict {
            ProcessingResult::Success => {
                if let Err(e) = self.core.fs.remove(&file.path) {
                    // The pop still happens; the orphan is re-delivered on
                    // the next startup (at-least-once).
                    warn!(file = %file.name, error = ?e, "Failed to remove delivered file");
                }
                self.pop_head(state);
                state.retry.on_success(now);
                debug!(file = %file.name, "Delivered");
            }
            ProcessingResult::SuccessAndMoved => {
                self.pop_head(state);
                state.retry.on_success(now);
                debug!(file = %file.name, "Delivered (moved by processor)");
            }
            ProcessingResult::Unavailable => {
                state.suspended = true;
                info!(file = %file.name, "Processor unavailable, delivery suspended");
            }
            ProcessingResult::FailureNeedRetry => {
                let next_eligible = state.retry.on_failure(now);
                debug!(file = %file.name, next_eligible, "Delivery failed, will retry");
            }
        }
    }

    fn pop_head(&self, state: &mut State) {
        if let Some(head) = state.status.finalized.queue.pop_front() {
            state.status.finalized.total_size =
                state.status.finalized.total_size.saturating_sub(head.size);
        }
    }
}
