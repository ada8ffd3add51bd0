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

//! In-memory queue accounting: the open current file and the finalized FIFO.

use std::{collections::VecDeque, path::PathBuf};

/// A finalized (or finalizable) file on disk.
///
/// Ordering is by creation timestamp, ties broken by name; fixed-width
/// timestamps in the default naming make the two agree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// File basename, e.g. `finalized-00000000000000001001.bin`.
    pub name:      String,
    /// Full path inside the working directory.
    pub path:      PathBuf,
    /// Creation timestamp parsed from the name.
    pub timestamp: u64,
    /// Size in bytes.
    pub size:      u64,
}

impl Ord for FileInfo {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.timestamp, &self.name).cmp(&(other.timestamp, &other.name))
    }
}

impl PartialOrd for FileInfo {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> { Some(self.cmp(other)) }
}

/// The finalized files awaiting delivery, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FinalizedStatus {
    pub queue:      VecDeque<FileInfo>,
    /// Sum of sizes of the queued entries.
    pub total_size: u64,
}

/// Snapshot of the queue state.
///
/// `current_size` and `current_timestamp` are both zero when no current
/// file is open.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueStatus {
    pub current_size:      u64,
    pub current_timestamp: u64,
    pub finalized:         FinalizedStatus,
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn info(name: &str, timestamp: u64) -> FileInfo {
        FileInfo {
            name: name.to_string(),
            path: PathBuf::from("/q").join(name),
            timestamp,
            size: 1,
        }
    }

    #[test]
    fn test_ordering_by_timestamp_then_name() {
        let mut files = vec![info("b", 2), info("a", 2), info("z", 1)];
        files.sort();
        let names: Vec<_> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["z", "a", "b"]);
    }

    #[test]
    fn test_default_status_is_empty() {
        let status = QueueStatus::default();
        assert_eq!(status.current_size, 0);
        assert_eq!(status.current_timestamp, 0);
        assert!(status.finalized.queue.is_empty());
        assert_eq!(status.finalized.total_size, 0);
    }
}
