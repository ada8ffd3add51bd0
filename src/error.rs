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

use snafu::Snafu;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("IO error"), context(false))]
    Io {
        source: std::io::Error,
        #[snafu(implicit)]
        loc:    snafu::Location,
    },

    /// Finalization rename failed. The file is still current and the
    /// in-memory accounting has not been touched.
    #[snafu(display("Failed to finalize {} as {}", from.display(), to.display()))]
    Rename {
        source: std::io::Error,
        from:   PathBuf,
        to:     PathBuf,
        #[snafu(implicit)]
        loc:    snafu::Location,
    },

    /// Shutdown interrupted a caller waiting on the startup scan. Pushes
    /// after shutdown do not use this; they silently no-op.
    #[snafu(display("Queue is shutting down"))]
    ShuttingDown {
        #[snafu(implicit)]
        loc: snafu::Location,
    },

    #[snafu(display("Worker thread panicked"))]
    WorkerPanicked {
        #[snafu(implicit)]
        loc: snafu::Location,
    },
}
