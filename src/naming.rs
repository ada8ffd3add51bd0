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

//! File naming: a bidirectional mapping between names and timestamps.
//!
//! Names embed a zero-padded fixed-width decimal timestamp between a prefix
//! and a suffix, so lexicographic order equals numeric order. `parse` is the
//! exact inverse of `generate`: anything that does not match the template
//! byte-for-byte is rejected, which is what lets directory scans separate
//! current files, finalized files, and strangers.

/// Width of the timestamp field. 20 digits covers the full `u64` range.
const TIMESTAMP_WIDTH: usize = 20;

/// One naming template, e.g. `current-<20 digits>.bin`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePattern {
    prefix: String,
    suffix: String,
}

impl FilePattern {
    pub fn new(prefix: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            suffix: suffix.into(),
        }
    }

    /// Render the name for `timestamp`. Deterministic.
    pub fn generate(&self, timestamp: u64) -> String {
        format!("{}{:0width$}{}", self.prefix, timestamp, self.suffix, width = TIMESTAMP_WIDTH)
    }

    /// Recover the timestamp from `name`, or `None` if `name` does not
    /// match this template exactly.
    pub fn parse(&self, name: &str) -> Option<u64> {
        let expected_len = self.prefix.len() + TIMESTAMP_WIDTH + self.suffix.len();
        if name.len() != expected_len
            || !name.starts_with(self.prefix.as_str())
            || !name.ends_with(self.suffix.as_str())
        {
            return None;
        }
        let digits = &name.as_bytes()[self.prefix.len()..self.prefix.len() + TIMESTAMP_WIDTH];
        if !digits.iter().all(|b| b.is_ascii_digit()) {
            return None;
        }
        // parse() rejects 20-digit values beyond u64::MAX.
        std::str::from_utf8(digits).ok()?.parse::<u64>().ok()
    }
}

/// The pair of templates distinguishing the two file kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingScheme {
    pub current:   FilePattern,
    pub finalized: FilePattern,
}

impl Default for NamingScheme {
    fn default() -> Self {
        Self {
            current:   FilePattern::new("current-", ".bin"),
            finalized: FilePattern::new("finalized-", ".bin"),
        }
    }
}
