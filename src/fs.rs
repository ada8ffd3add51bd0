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

//! Filesystem adapter consumed by the queue engine.
//!
//! The engine touches disk only through [`FileSystem`], which keeps the
//! durability-sensitive operations (append, same-directory rename, remove,
//! flat scan) in one replaceable seam. [`OsFileSystem`] is the `std::fs`
//! implementation used in production; tests can substitute a failing or
//! instrumented adapter.

use std::{
    fs::{File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};

/// Primitive filesystem operations the queue relies on.
///
/// `rename` must be atomic for paths within the same directory; the
/// finalization handoff depends on it. Closing an append handle is dropping
/// it.
pub trait FileSystem: Send + Sync {
    /// Open `path` for appending, creating it if absent.
    fn open_append(&self, path: &Path) -> io::Result<Box<dyn Write + Send>>;

    /// Atomically rename `from` to `to`. Both paths are in the same
    /// directory.
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    fn remove(&self, path: &Path) -> io::Result<()>;

    fn size(&self, path: &Path) -> io::Result<u64>;

    /// Visit every plain file name in `dir`, non-recursively.
    fn scan_dir(&self, dir: &Path, visit: &mut dyn FnMut(&str)) -> io::Result<()>;

    fn join_path(&self, dir: &Path, name: &str) -> PathBuf { dir.join(name) }
}

/// The `std::fs` implementation.
///
/// Rename atomicity follows POSIX semantics; platforms without atomic
/// same-directory rename are not supported.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFileSystem;

impl FileSystem for OsFileSystem {
    fn open_append(&self, path: &Path) -> io::Result<Box<dyn Write + Send>> {
        let file: File = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Box::new(file))
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> { std::fs::rename(from, to) }

    fn remove(&self, path: &Path) -> io::Result<()> { std::fs::remove_file(path) }

    fn size(&self, path: &Path) -> io::Result<u64> { Ok(std::fs::metadata(path)?.len()) }

    fn scan_dir(&self, dir: &Path, visit: &mut dyn FnMut(&str)) -> io::Result<()> {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                visit(name);
            }
        }
        Ok(())
    }
}
