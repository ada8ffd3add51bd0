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

use std::{path::PathBuf, sync::Arc};

use crate::{
    clock::{Clock, WallClock},
    config::{FinalizePolicy, FsqConfig, PurgePolicy, RetryParams},
    error::Result,
    fs::{FileSystem, OsFileSystem},
    naming::NamingScheme,
    processor::Processor,
    queue::Fsq,
};

pub struct FsqBuilder {
    config: FsqConfig,
    clock:  Option<Arc<dyn Clock>>,
    fs:     Option<Arc<dyn FileSystem>>,
}

impl FsqBuilder {
    pub fn new<P: Into<PathBuf>>(directory: P) -> Self {
        Self {
            config: FsqConfig {
                directory: directory.into(),
                ..Default::default()
            },
            clock:  None,
            fs:     None,
        }
    }

    pub fn separator(mut self, separator: u8) -> Self {
        self.config.separator = separator;
        self
    }

    pub fn naming(mut self, naming: NamingScheme) -> Self {
        self.config.naming = naming;
        self
    }

    pub fn finalize_policy(mut self, policy: FinalizePolicy) -> Self {
        self.config.finalize = policy;
        self
    }

    pub fn purge_policy(mut self, policy: PurgePolicy) -> Self {
        self.config.purge = policy;
        self
    }

    pub fn retry_params(mut self, params: RetryParams) -> Self {
        self.config.retry = params;
        self
    }

    pub fn detach_on_shutdown(mut self, detach: bool) -> Self {
        self.config.detach_on_shutdown = detach;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn file_system(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = Some(fs);
        self
    }

    /// Build the queue and start delivering to `processor`.
    pub fn build<P: Processor + 'static>(self, processor: P) -> Result<Fsq> {
        let clock = self.clock.unwrap_or_else(|| Arc::new(WallClock));
        let fs = self.fs.unwrap_or_else(|| Arc::new(OsFileSystem));
        Fsq::new(self.config, clock, fs, Box::new(processor))
    }
}
