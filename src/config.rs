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

use std::path::PathBuf;

use crate::{naming::NamingScheme, status::QueueStatus};

#[derive(Debug, Clone)]
pub struct FsqConfig {
    /// Flat working directory holding every file of one queue instance.
    pub directory:          PathBuf,
    /// Byte written after each message payload.
    pub separator:          u8,
    pub naming:             NamingScheme,
    pub finalize:           FinalizePolicy,
    pub purge:              PurgePolicy,
    pub retry:              RetryParams,
    /// Detach the worker thread on shutdown instead of joining it.
    pub detach_on_shutdown: bool,
}

impl Default for FsqConfig {
    fn default() -> Self {
        Self {
            directory:          PathBuf::from("./fsq_data"),
            separator:          b'\n',
            naming:             NamingScheme::default(),
            finalize:           FinalizePolicy::default(),
            purge:              PurgePolicy::default(),
            retry:              RetryParams::default(),
            detach_on_shutdown: false,
        }
    }
}

/// When to roll the current file over.
///
/// Two regimes, keyed on whether finalized files are already queued. With a
/// backlog the thresholds are larger, so a stuck processor coalesces work
/// into fewer, bigger files. All comparisons are inclusive: a file of
/// exactly `realtime_max_size` bytes rolls.
#[derive(Debug, Clone)]
pub struct FinalizePolicy {
    /// Size threshold with no backlog.
    pub realtime_max_size: u64,
    /// Age threshold (ticks) with no backlog.
    pub realtime_max_age:  u64,
    /// Size threshold with a backlog.
    pub backlog_max_size:  u64,
    /// Age threshold (ticks) with a backlog.
    pub backlog_max_age:   u64,
}

impl Default for FinalizePolicy {
    /// Keep files around 100KiB and at most 24h old while a backlog exists;
    /// 10KiB and 10 minutes otherwise.
    fn default() -> Self {
        Self {
            realtime_max_size: 10 * 1024,
            realtime_max_age:  10 * 60 * 1000,
            backlog_max_size:  100 * 1024,
            backlog_max_age:   24 * 60 * 60 * 1000,
        }
    }
}

impl FinalizePolicy {
    pub fn should_finalize(&self, status: &QueueStatus, now: u64) -> bool {
        // A decreasing clock sample reads as age zero.
        let age = now.saturating_sub(status.current_timestamp);
        if status.current_size >= self.backlog_max_size || age >= self.backlog_max_age {
            return true;
        }
        if !status.finalized.queue.is_empty() {
            // The backlog thresholds are the only ones that apply while
            // files are pending.
            return false;
        }
        status.current_size >= self.realtime_max_size || age >= self.realtime_max_age
    }
}

/// On-disk footprint ceiling for the finalized set.
///
/// When either bound is exceeded the engine drops the oldest finalized
/// files, one at a time, until the predicate clears.
#[derive(Debug, Clone)]
pub struct PurgePolicy {
    pub max_total_size: u64,
    pub max_files:      usize,
}

impl Default for PurgePolicy {
    /// Keep under 20MiB and under 1000 finalized files.
    fn default() -> Self {
        Self {
            max_total_size: 20 * 1024 * 1024,
            max_files:      1000,
        }
    }
}

impl PurgePolicy {
    pub fn overflow(&self, status: &QueueStatus) -> bool {
        status.finalized.total_size > self.max_total_size
            || status.finalized.queue.len() > self.max_files
    }
}

/// Exponential backoff parameters for failed deliveries.
#[derive(Debug, Clone)]
pub struct RetryParams {
    /// First delay (ticks); doubles on each consecutive failure.
    pub base_delay: u64,
    /// Delay ceiling (ticks).
    pub max_delay:  u64,
    /// Jitter fraction in `[0, 1)`; each delay is scaled by a random factor
    /// in `[1 - jitter, 1 + jitter]`.
    pub jitter:     f64,
}

impl Default for RetryParams {
    /// One second doubling up to 24 hours, 20% jitter.
    fn default() -> Self {
        Self {
            base_delay: 1000,
            max_delay:  24 * 60 * 60 * 1000,
            jitter:     0.2,
        }
    }
}
