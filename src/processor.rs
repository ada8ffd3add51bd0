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

//! The user-supplied consumer of finalized files.

use crate::status::FileInfo;

/// Verdict returned from [`Processor::on_file_ready`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingResult {
    /// The file was consumed; the queue deletes it and moves on.
    Success,
    /// The file was consumed and the processor already moved or deleted it;
    /// the queue skips the delete and moves on.
    SuccessAndMoved,
    /// The processor cannot make progress (e.g. the uplink is offline).
    /// Delivery is suspended until `force_processing` is called.
    Unavailable,
    /// The attempt failed; redeliver the same file after the retry schedule
    /// allows it.
    FailureNeedRetry,
}

/// Consumes finalized files, one at a time, in FIFO order.
///
/// Invoked from the queue's worker thread only and never concurrently with
/// itself. The call may block for as long as the processor needs; a failed
/// head file blocks all of its successors.
pub trait Processor: Send {
    fn on_file_ready(&mut self, file: &FileInfo, now: u64) -> ProcessingResult;
}
