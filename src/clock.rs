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

use chrono::Utc;

/// A source of timestamps for the queue.
///
/// Timestamps are integer ticks; the default domain is milliseconds since
/// the UNIX epoch. Strict monotonicity is not required — the finalize and
/// retry policies treat a mildly decreasing sample as age zero.
pub trait Clock: Send + Sync {
    /// Returns the current timestamp in ticks.
    fn now(&self) -> u64;
}

/// Wall-clock time in milliseconds since the UNIX epoch.
#[derive(Debug, Clone, Copy, Default)]
pub struct WallClock;

impl Clock for WallClock {
    fn now(&self) -> u64 { Utc::now().timestamp_millis().max(0) as u64 }
}
