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

//! Queue engine and lifecycle management.
//!
//! [`Fsq`] is the central entry point. It owns a single append-only
//! "current" file, rolls it over into immutable "finalized" files by atomic
//! rename, and runs a background [`Worker`](crate::worker) thread that hands
//! finalized files to the user's [`Processor`](crate::Processor) in FIFO
//! order.
//!
//! ## Usage
//!
//! ```ignore
//! let queue = FsqBuilder::new("/path/to/queue").build(MyProcessor)?;
//!
//! queue.push("payload")?;
//! queue.force_processing(true);
//!
//! // Clean shutdown
//! queue.shutdown()?;
//! ```
//!
//! ## Coordination
//!
//! One mutex guards the whole queue state (current-file handle and
//! accounting, finalized FIFO, flags, retry schedule); one condition
//! variable wakes the worker on finalization, force-processing, purge, and
//! shutdown. Appends hold the mutex only for the duration of a short write.

use std::{
    io::Write,
    path::PathBuf,
    sync::Arc,
    thread::{self, JoinHandle},
};

use bytes::Bytes;
use parking_lot::{Condvar, Mutex};
use snafu::{ResultExt, ensure};
use tracing::{error, info, warn};

use crate::{
    clock::Clock,
    config::FsqConfig,
    error::{RenameSnafu, Result, ShuttingDownSnafu, WorkerPanickedSnafu},
    fs::FileSystem,
    message::{append_message, message_cost},
    naming::FilePattern,
    processor::Processor,
    retry::ExponentialRetry,
    status::{FileInfo, QueueStatus},
    worker::Worker,
};

/// The open current file.
pub(crate) struct CurrentFile {
    pub(crate) handle: Box<dyn Write + Send>,
    pub(crate) path:   PathBuf,
}

/// Everything guarded by the state mutex.
pub(crate) struct State {
    pub(crate) status:           QueueStatus,
    pub(crate) current:          Option<CurrentFile>,
    pub(crate) retry:            ExponentialRetry,
    /// Latched once the startup scan completes; never cleared.
    pub(crate) status_ready:     bool,
    pub(crate) force_processing: bool,
    /// Set by an `Unavailable` verdict; cleared by `force_processing`.
    pub(crate) suspended:        bool,
    pub(crate) shutdown:         bool,
}

/// State shared between the public handle and the worker thread.
pub(crate) struct Core {
    pub(crate) config: FsqConfig,
    pub(crate) clock:  Arc<dyn Clock>,
    pub(crate) fs:     Arc<dyn FileSystem>,
    pub(crate) state:  Mutex<State>,
    pub(crate) cond:   Condvar,
}

impl Core {
    /// Open a fresh current file named after `now`, if none is open.
    pub(crate) fn ensure_current_open(&self, state: &mut State, now: u64) -> Result<()> {
        if state.current.is_some() {
            return Ok(());
        }
        let name = self.config.naming.current.generate(now);
        let path = self.fs.join_path(&self.config.directory, &name);
        let handle = self.fs.open_append(&path)?;
        state.current = Some(CurrentFile { handle, path });
        state.status.current_size = 0;
        state.status.current_timestamp = now;
        Ok(())
    }

    /// Close the current file, rename it to its finalized name, enqueue it,
    /// purge, and wake the worker. A no-op when no current file is open.
    ///
    /// On rename failure nothing is enqueued and the accounting is left
    /// untouched: the file stays current and the next push retries.
    pub(crate) fn finalize_current(&self, state: &mut State) -> Result<()> {
        let Some(current) = state.current.take() else {
            return Ok(());
        };
        let CurrentFile { handle, path } = current;
        // Close before the rename so the finalized file is complete.
        drop(handle);

        let timestamp = state.status.current_timestamp;
        let name = self.config.naming.finalized.generate(timestamp);
        let finalized_path = self.fs.join_path(&self.config.directory, &name);

        if let Err(source) = self.fs.rename(&path, &finalized_path) {
            error!(from = ?path, to = ?finalized_path, error = ?source, "Finalization rename failed");
            match self.fs.open_append(&path) {
                Ok(handle) => state.current = Some(CurrentFile { handle, path: path.clone() }),
                // The file stays current on disk; the next startup scan
                // reconciles it.
                Err(e) => error!(path = ?path, error = ?e, "Failed to reopen current file"),
            }
            return Err(source).context(RenameSnafu {
                from: path,
                to:   finalized_path,
            });
        }

        let info = FileInfo {
            name,
            path: finalized_path,
            timestamp,
            size: state.status.current_size,
        };
        info!(file = %info.name, size = info.size, "Finalized current file");
        state.status.finalized.total_size += info.size;
        state.status.finalized.queue.push_back(info);
        state.status.current_size = 0;
        state.status.current_timestamp = 0;

        self.purge(state);
        self.cond.notify_all();
        Ok(())
    }

    /// Evict oldest finalized files until the purge predicate clears.
    pub(crate) fn purge(&self, state: &mut State) {
        while self.config.purge.overflow(&state.status) {
            let Some(evicted) = state.status.finalized.queue.pop_front() else {
                break;
            };
            state.status.finalized.total_size =
                state.status.finalized.total_size.saturating_sub(evicted.size);
            // Removal happens after eviction; a failed delete leaves an
            // orphan that the next startup scan re-collects.
            if let Err(e) = self.fs.remove(&evicted.path) {
                warn!(file = %evicted.name, error = ?e, "Failed to remove purged file");
            }
            info!(file = %evicted.name, size = evicted.size, "Purged oldest finalized file");
        }
    }

    /// Collect the on-disk files matching `pattern`, sorted by timestamp.
    pub(crate) fn scan(&self, pattern: &FilePattern) -> Result<Vec<FileInfo>> {
        let mut matched: Vec<(String, u64)> = Vec::new();
        self.fs.scan_dir(&self.config.directory, &mut |name| {
            if let Some(timestamp) = pattern.parse(name) {
                matched.push((name.to_string(), timestamp));
            }
        })?;

        let mut files = Vec::with_capacity(matched.len());
        for (name, timestamp) in matched {
            let path = self.fs.join_path(&self.config.directory, &name);
            match self.fs.size(&path) {
                Ok(size) => files.push(FileInfo {
                    name,
                    path,
                    timestamp,
                    size,
                }),
                // The file vanished between the scan and the stat.
                Err(e) => warn!(file = %name, error = ?e, "Skipping unreadable file"),
            }
        }
        files.sort();
        Ok(files)
    }
}

/// A durable, filesystem-backed message queue.
///
/// Pushed messages accumulate in a single current file; finalized files are
/// delivered to the processor, in FIFO order, from a dedicated worker
/// thread. The queue survives restarts: on startup the worker rebuilds its
/// state from the working directory alone.
pub struct Fsq {
    core:          Arc<Core>,
    worker_handle: Option<JoinHandle<()>>,
}

impl Fsq {
    /// Create the queue and start its worker thread.
    pub(crate) fn new(
        config: FsqConfig,
        clock: Arc<dyn Clock>,
        fs: Arc<dyn FileSystem>,
        processor: Box<dyn Processor>,
    ) -> Result<Self> {
        std::fs::create_dir_all(&config.directory)?;

        let retry = ExponentialRetry::new(config.retry.clone());
        let core = Arc::new(Core {
            config,
            clock,
            fs,
            state: Mutex::new(State {
                status: QueueStatus::default(),
                current: None,
                retry,
                status_ready: false,
                force_processing: false,
                suspended: false,
                shutdown: false,
            }),
            cond: Condvar::new(),
        });

        let worker_core = core.clone();
        let worker_handle = thread::Builder::new()
            .name("fsq-worker".into())
            .spawn(move || {
                let mut worker = Worker::new(worker_core, processor);
                worker.run();
            })?;

        info!(directory = ?core.config.directory, "Queue started");

        Ok(Self {
            core,
            worker_handle: Some(worker_handle),
        })
    }

    /// Append a message to the queue.
    ///
    /// Opens a current file stamped with the clock's `now` if none is open,
    /// appends the payload plus separator, and rolls the file over when the
    /// finalize policy fires. A current file that is already overdue (by
    /// age) is rolled before the append, so the new message lands in a
    /// fresh file.
    ///
    /// Appends are not serialized across producers by the engine beyond the
    /// state mutex; program order within one producer is preserved.
    ///
    /// After shutdown the call silently no-ops: nothing is written, no
    /// state changes, and `Ok(())` is returned.
    ///
    /// # Errors
    ///
    /// The underlying IO error, with the accounting left untouched.
    pub fn push(&self, message: impl Into<Bytes>) -> Result<()> {
        let message = message.into();
        let mut state = self.core.state.lock();
        if state.shutdown {
            return Ok(());
        }

        let now = self.core.clock.now();
        if state.current.is_some() && self.core.config.finalize.should_finalize(&state.status, now)
        {
            self.core.finalize_current(&mut state)?;
        }
        self.core.ensure_current_open(&mut state, now)?;

        let cost = message_cost(message.len());
        if let Some(current) = state.current.as_mut() {
            append_message(current.handle.as_mut(), &message, self.core.config.separator)?;
        }
        state.status.current_size += cost;

        if self.core.config.finalize.should_finalize(&state.status, now) {
            self.core.finalize_current(&mut state)?;
        }
        Ok(())
    }

    /// Kick the worker: resume delivery after an `Unavailable` verdict and,
    /// when `finalize_current` is set or nothing is queued yet, roll the
    /// open current file so its contents become deliverable.
    ///
    /// Does not bypass a pending retry delay. A no-op after shutdown.
    pub fn force_processing(&self, finalize_current: bool) {
        let mut state = self.core.state.lock();
        if state.shutdown {
            return;
        }
        if finalize_current || state.status.finalized.queue.is_empty() {
            if let Err(e) = self.core.finalize_current(&mut state) {
                error!(error = ?e, "Failed to finalize on force_processing");
            }
        }
        state.force_processing = true;
        state.suspended = false;
        self.core.cond.notify_all();
    }

    /// Snapshot of the queue state.
    ///
    /// Blocks until the worker's startup scan has completed.
    ///
    /// # Errors
    ///
    /// [`Error::ShuttingDown`](crate::Error::ShuttingDown) if shutdown wins
    /// the race against a waiting caller.
    pub fn status(&self) -> Result<QueueStatus> {
        let mut state = self.core.state.lock();
        while !state.status_ready {
            ensure!(!state.shutdown, ShuttingDownSnafu);
            self.core.cond.wait(&mut state);
        }
        Ok(state.status.clone())
    }

    /// Remove every file in the working directory whose name parses as
    /// current or finalized. Unrecognized names are left alone.
    ///
    /// Intended for tests and resets; in-memory accounting is untouched.
    pub fn remove_all_files(&self) -> Result<()> {
        for pattern in [
            &self.core.config.naming.finalized,
            &self.core.config.naming.current,
        ] {
            for file in self.core.scan(pattern)? {
                self.core.fs.remove(&file.path)?;
            }
        }
        Ok(())
    }

    /// Get the queue configuration.
    #[must_use]
    pub fn config(&self) -> &FsqConfig { &self.core.config }

    /// Shut down the queue.
    ///
    /// The open current file is closed without finalizing it; the next
    /// startup reconciles it. The worker finishes any in-flight processor
    /// call, then exits and is joined (or detached, per
    /// `detach_on_shutdown`).
    ///
    /// # Errors
    ///
    /// Returns an error if the worker thread panicked.
    pub fn shutdown(mut self) -> Result<()> {
        self.begin_shutdown();
        if let Some(handle) = self.worker_handle.take()
            && !self.core.config.detach_on_shutdown
        {
            handle.join().map_err(|_| WorkerPanickedSnafu.build())?;
        }
        info!("Queue shutdown complete");
        Ok(())
    }

    fn begin_shutdown(&self) {
        let mut state = self.core.state.lock();
        if state.shutdown {
            return;
        }
        state.shutdown = true;
        // Close without finalizing; the file keeps its current name.
        state.current = None;
        self.core.cond.notify_all();
    }
}

impl Drop for Fsq {
    fn drop(&mut self) {
        self.begin_shutdown();
        if let Some(handle) = self.worker_handle.take()
            && !self.core.config.detach_on_shutdown
        {
            let _ = handle.join();
        }
    }
}
