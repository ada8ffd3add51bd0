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

//! On-disk message format.
//!
//! Messages are written as raw payload bytes followed by a single separator
//! byte (newline by default):
//!
//! ```text
//! ┌──────────────────────┬─────────────────┐
//! │  Payload (variable)  │  Separator (1B) │
//! └──────────────────────┴─────────────────┘
//! ```
//!
//! [`message_cost`] must return exactly the number of bytes
//! [`append_message`] writes; the current-file size accounting depends on
//! the two agreeing.

use std::io::{self, Write};

/// Size of the separator in bytes.
pub(crate) const SEPARATOR_SIZE: u64 = 1;

/// Total on-disk cost of a message with the given payload length.
#[inline]
pub(crate) const fn message_cost(payload_len: usize) -> u64 { payload_len as u64 + SEPARATOR_SIZE }

/// Write one message to the open current file and flush it to the OS.
pub(crate) fn append_message(
    file: &mut dyn Write,
    payload: &[u8],
    separator: u8,
) -> io::Result<()> {
    file.write_all(payload)?;
    file.write_all(&[separator])?;
    file.flush()
}
