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

//! Durable, filesystem-backed message queue with FIFO file delivery.
//!
//! Features:
//! - Messages accumulate in a single append-only "current" file
//! - Size/age-based rollover into immutable "finalized" files via atomic
//!   rename
//! - A background worker delivers finalized files to a user-supplied
//!   [`Processor`], strictly oldest-first
//! - Survives restarts: state is rebuilt from the working directory alone
//! - Back-pressure aware: retry with exponential backoff, suspension on
//!   processor unavailability, oldest-first purge to bound disk usage

mod message;
mod queue;
mod retry;
mod worker;

pub mod builder;
pub mod clock;
pub mod config;
pub mod error;
pub mod fs;
pub mod naming;
pub mod processor;
pub mod status;

pub use builder::FsqBuilder;
pub use clock::{Clock, WallClock};
pub use config::{FinalizePolicy, FsqConfig, PurgePolicy, RetryParams};
pub use error::{Error, Result};
pub use fs::{FileSystem, OsFileSystem};
pub use naming::{FilePattern, NamingScheme};
pub use processor::{ProcessingResult, Processor};
pub use queue::Fsq;
pub use status::{FileInfo, FinalizedStatus, QueueStatus};
