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

//! Retry schedule for failed deliveries.
//!
//! Exponential backoff with jitter, capped at a ceiling. The eligibility
//! timestamp only moves forward on failure, so delays between attempts are
//! non-decreasing until a success resets the schedule. A clock observed
//! running backwards resets the schedule rather than stalling delivery.

use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::config::RetryParams;

pub(crate) struct ExponentialRetry {
    params:        RetryParams,
    failures:      u32,
    next_eligible: u64,
    last_update:   u64,
    rng:           StdRng,
}

impl ExponentialRetry {
    pub(crate) fn new(params: RetryParams) -> Self {
        Self {
            params,
            failures: 0,
            next_eligible: 0,
            last_update: 0,
            rng: StdRng::from_entropy(),
        }
    }

    #[cfg(test)]
    fn with_seed(params: RetryParams, seed: u64) -> Self {
        Self {
            params,
            failures: 0,
            next_eligible: 0,
            last_update: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Clear all delays; deliveries proceed as files arrive.
    pub(crate) fn on_success(&mut self, now: u64) {
        self.failures = 0;
        self.next_eligible = now;
        self.last_update = now;
    }

    /// Record a failed attempt and return the tick at which the next
    /// attempt becomes eligible.
    pub(crate) fn on_failure(&mut self, now: u64) -> u64 {
        if now < self.last_update {
            // Time skew; restart the schedule from the new clock.
            self.next_eligible = now;
        }
        let exp = self
            .params
            .base_delay
            .saturating_mul(1u64.checked_shl(self.failures).unwrap_or(u64::MAX))
            .min(self.params.max_delay);
        let jitter = self.params.jitter.clamp(0.0, 1.0);
        let factor = self.rng.gen_range(1.0 - jitter..=1.0 + jitter);
        let delay = ((exp as f64 * factor) as u64).min(self.params.max_delay);
        self.failures = self.failures.saturating_add(1);
        self.next_eligible = self.next_eligible.max(now.saturating_add(delay));
        self.last_update = now;
        self.next_eligible
    }

    /// Remaining ticks before the next attempt, or `None` when eligible.
    pub(crate) fn should_wait(&mut self, now: u64) -> Option<u64> {
        if now < self.last_update {
            // Time skew; stay on the safe side and deliver.
            self.last_update = now;
            self.next_eligible = now;
            return None;
        }
        if now >= self.next_eligible {
            None
        } else {
            Some(self.next_eligible - now)
        }
    }
}
