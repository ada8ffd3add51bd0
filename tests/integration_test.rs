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

use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use crossbeam::channel::{Receiver, Sender, unbounded};
use fsq::{
    Clock, FileInfo, FinalizePolicy, FsqBuilder, NamingScheme, ProcessingResult, Processor,
    PurgePolicy, QueueStatus, RetryParams,
};
use tempfile::TempDir;

#[derive(Clone, Default)]
struct MockClock(Arc<AtomicU64>);

impl MockClock {
    fn set(&self, now: u64) { self.0.store(now, Ordering::SeqCst); }
}

impl Clock for MockClock {
    fn now(&self) -> u64 { self.0.load(Ordering::SeqCst) }
}

struct Call {
    file:     FileInfo,
    contents: String,
    now:      u64,
    at:       Instant,
}

/// Plays back a scripted sequence of verdicts, recording every call.
struct ScriptProcessor {
    script: VecDeque<ProcessingResult>,
    tx:     Sender<Call>,
}

impl ScriptProcessor {
    fn new(script: &[ProcessingResult]) -> (Self, Receiver<Call>) {
        let (tx, rx) = unbounded();
        (
            Self {
                script: script.iter().copied().collect(),
                tx,
            },
            rx,
        )
    }
}

impl Processor for ScriptProcessor {
    fn on_file_ready(&mut self, file: &FileInfo, now: u64) -> ProcessingResult {
        let verdict = self.script.pop_front().unwrap_or(ProcessingResult::Success);
        let contents = std::fs::read_to_string(&file.path).unwrap_or_default();
        let _ = self.tx.send(Call {
            file: file.clone(),
            contents,
            now,
            at: Instant::now(),
        });
        verdict
    }
}

/// Finalize policy with thresholds far out of the way.
fn lenient_finalize() -> FinalizePolicy {
    FinalizePolicy {
        realtime_max_size: u64::MAX,
        realtime_max_age:  u64::MAX,
        backlog_max_size:  u64::MAX,
        backlog_max_age:   u64::MAX,
    }
}

fn recv(rx: &Receiver<Call>) -> Call {
    rx.recv_timeout(Duration::from_secs(5)).expect("processor call")
}

fn assert_no_call(rx: &Receiver<Call>, within: Duration) {
    assert!(rx.recv_timeout(within).is_err(), "unexpected processor call");
}

/// Poll until `predicate` holds; panics after five seconds.
fn wait_for_status(queue: &fsq::Fsq, predicate: impl Fn(&QueueStatus) -> bool) -> QueueStatus {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let status = queue.status().unwrap();
        if predicate(&status) {
            return status;
        }
        assert!(Instant::now() < deadline, "timed out waiting for status");
        std::thread::sleep(Duration::from_millis(5));
    }
}

fn disk_names(dir: &std::path::Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn test_force_finalize_delivers_batch() {
    let dir = TempDir::new().unwrap();
    let clock = MockClock::default();
    let (processor, rx) = ScriptProcessor::new(&[]);

    let queue = FsqBuilder::new(dir.path())
        .finalize_policy(FinalizePolicy {
            realtime_max_size: 20,
            realtime_max_age:  10_000,
            backlog_max_size:  100,
            backlog_max_age:   60_000,
        })
        .clock(Arc::new(clock.clone()))
        .build(processor)
        .unwrap();

    // Empty queue after startup: all zeros, no processor call.
    let status = queue.status().unwrap();
    assert_eq!(status, QueueStatus::default());

    clock.set(1001);
    queue.push("foo").unwrap();
    clock.set(1002);
    queue.push("bar").unwrap();
    clock.set(1003);
    queue.push("baz").unwrap();
    clock.set(1010);

    // Three messages of (3 + '\n') bytes each, nothing finalized yet.
    let status = queue.status().unwrap();
    assert_eq!(status.current_size, 12);
    assert_eq!(status.current_timestamp, 1001);
    assert!(status.finalized.queue.is_empty());
    assert_eq!(status.finalized.total_size, 0);
    assert_no_call(&rx, Duration::from_millis(50));

    queue.force_processing(true);

    let call = recv(&rx);
    assert_eq!(call.file.name, "finalized-00000000000000001001.bin");
    assert_eq!(call.file.timestamp, 1001);
    assert_eq!(call.file.size, 12);
    assert_eq!(call.contents, "foo\nbar\nbaz\n");

    let status = wait_for_status(&queue, |s| s.finalized.queue.is_empty());
    assert_eq!(status.current_size, 0);
    assert_eq!(status.finalized.total_size, 0);
    assert!(!call.file.path.exists(), "delivered file should be removed");

    queue.shutdown().unwrap();
}

#[test]
fn test_size_triggered_roll() {
    let dir = TempDir::new().unwrap();
    let clock = MockClock::default();
    clock.set(2000);
    let (processor, rx) = ScriptProcessor::new(&[]);

    let queue = FsqBuilder::new(dir.path())
        .finalize_policy(FinalizePolicy {
            realtime_max_size: 4,
            realtime_max_age:  u64::MAX,
            backlog_max_size:  u64::MAX,
            backlog_max_age:   u64::MAX,
        })
        .clock(Arc::new(clock.clone()))
        .build(processor)
        .unwrap();

    queue.push("aa").unwrap();
    assert_no_call(&rx, Duration::from_millis(50));

    // Total 6 bytes >= 4 rolls on the second push.
    queue.push("bb").unwrap();

    let call = recv(&rx);
    assert_eq!(call.file.timestamp, 2000);
    assert_eq!(call.contents, "aa\nbb\n");

    queue.shutdown().unwrap();
}

#[test]
fn test_age_triggered_roll() {
    let dir = TempDir::new().unwrap();
    let clock = MockClock::default();
    let (processor, rx) = ScriptProcessor::new(&[]);

    let queue = FsqBuilder::new(dir.path())
        .finalize_policy(FinalizePolicy {
            realtime_max_size: 1000,
            realtime_max_age:  1000,
            backlog_max_size:  u64::MAX,
            backlog_max_age:   u64::MAX,
        })
        .clock(Arc::new(clock.clone()))
        .build(processor)
        .unwrap();

    clock.set(100);
    queue.push("x").unwrap();

    // The first file is 1100 ticks old by now, past the age threshold: it
    // rolls before "y" is written, which opens a fresh file at 1200.
    clock.set(1200);
    queue.push("y").unwrap();

    let status = queue.status().unwrap();
    assert_eq!(status.current_timestamp, 1200);
    assert_eq!(status.current_size, 2);

    queue.force_processing(true);

    let first = recv(&rx);
    assert_eq!(first.file.timestamp, 100);
    assert_eq!(first.contents, "x\n");
    let second = recv(&rx);
    assert_eq!(second.file.timestamp, 1200);
    assert_eq!(second.contents, "y\n");
    assert!(first.file.timestamp <= second.file.timestamp);

    queue.shutdown().unwrap();
}

#[test]
fn test_failed_delivery_retries_with_backoff() {
    let dir = TempDir::new().unwrap();
    let (processor, rx) = ScriptProcessor::new(&[
        ProcessingResult::FailureNeedRetry,
        ProcessingResult::FailureNeedRetry,
        ProcessingResult::FailureNeedRetry,
        ProcessingResult::Success,
    ]);

    // Real clock: retry waits are condvar deadlines in milliseconds.
    let queue = FsqBuilder::new(dir.path())
        .finalize_policy(lenient_finalize())
        .retry_params(RetryParams {
            base_delay: 20,
            max_delay:  400,
            jitter:     0.2,
        })
        .build(processor)
        .unwrap();

    queue.push("payload").unwrap();
    queue.force_processing(true);

    let calls: Vec<Call> = (0..4).map(|_| recv(&rx)).collect();

    // Exactly four identical dispatches, then nothing more.
    for call in &calls {
        assert_eq!(call.file.name, calls[0].file.name);
        assert_eq!(call.contents, "payload\n");
    }
    assert_no_call(&rx, Duration::from_millis(100));

    // Backoff doubles (with 20% jitter): the three waits span at least
    // about 0.8 * (20 + 40 + 80) milliseconds.
    let elapsed = calls[3].at - calls[0].at;
    assert!(elapsed >= Duration::from_millis(110), "elapsed {elapsed:?}");
    assert!(calls.windows(2).all(|w| w[0].now <= w[1].now));

    wait_for_status(&queue, |s| s.finalized.queue.is_empty());
    assert!(!calls[0].file.path.exists(), "file removed after success");

    queue.shutdown().unwrap();
}

#[test]
fn test_unavailable_suspends_until_forced() {
    let dir = TempDir::new().unwrap();
    let (processor, rx) =
        ScriptProcessor::new(&[ProcessingResult::Unavailable, ProcessingResult::Success]);

    let queue = FsqBuilder::new(dir.path())
        .finalize_policy(lenient_finalize())
        .build(processor)
        .unwrap();

    queue.push("stuck").unwrap();
    queue.force_processing(true);

    let first = recv(&rx);
    assert_eq!(first.contents, "stuck\n");

    // Suspended: no further calls until processing is forced again.
    assert_no_call(&rx, Duration::from_millis(150));

    queue.force_processing(false);

    let second = recv(&rx);
    assert_eq!(second.file.name, first.file.name);

    wait_for_status(&queue, |s| s.finalized.queue.is_empty());
    queue.shutdown().unwrap();
}

#[test]
fn test_purge_drops_oldest_files() {
    let dir = TempDir::new().unwrap();
    let clock = MockClock::default();
    let (processor, rx) = ScriptProcessor::new(&[
        ProcessingResult::Unavailable,
        ProcessingResult::Success,
        ProcessingResult::Success,
    ]);

    // Every push rolls its own file; keep at most two finalized.
    let queue = FsqBuilder::new(dir.path())
        .finalize_policy(FinalizePolicy {
            realtime_max_size: 1,
            realtime_max_age:  u64::MAX,
            backlog_max_size:  1,
            backlog_max_age:   u64::MAX,
        })
        .purge_policy(PurgePolicy {
            max_total_size: u64::MAX,
            max_files:      2,
        })
        .clock(Arc::new(clock.clone()))
        .build(processor)
        .unwrap();

    clock.set(10);
    queue.push("a").unwrap();

    // The head is dispatched once, suspends delivery, and stays queued.
    let first = recv(&rx);
    assert_eq!(first.file.timestamp, 10);
    std::thread::sleep(Duration::from_millis(50));

    clock.set(20);
    queue.push("b").unwrap();
    clock.set(30);
    queue.push("c").unwrap();
    clock.set(40);
    queue.push("d").unwrap();

    // Only the two newest survive the third and fourth finalizations.
    let status = wait_for_status(&queue, |s| s.finalized.queue.len() == 2);
    let queued: Vec<u64> = status.finalized.queue.iter().map(|f| f.timestamp).collect();
    assert_eq!(queued, vec![30, 40]);
    assert_eq!(status.finalized.total_size, 4);
    assert_eq!(
        disk_names(dir.path()),
        vec![
            "finalized-00000000000000000030.bin".to_string(),
            "finalized-00000000000000000040.bin".to_string(),
        ]
    );

    queue.force_processing(false);

    let second = recv(&rx);
    assert_eq!(second.file.timestamp, 30);
    assert_eq!(second.contents, "c\n");
    let third = recv(&rx);
    assert_eq!(third.file.timestamp, 40);
    assert_eq!(third.contents, "d\n");

    wait_for_status(&queue, |s| s.finalized.queue.is_empty());
    queue.shutdown().unwrap();
}

#[test]
fn test_startup_scan_reconciles_leftovers() {
    let dir = TempDir::new().unwrap();
    let naming = NamingScheme::default();

    // A previous run left one finalized file and two current files behind.
    std::fs::write(dir.path().join(naming.finalized.generate(100)), "old\n").unwrap();
    std::fs::write(dir.path().join(naming.current.generate(200)), "mid\n").unwrap();
    std::fs::write(dir.path().join(naming.current.generate(300)), "new\n").unwrap();

    let clock = MockClock::default();
    clock.set(400);
    let (processor, rx) = ScriptProcessor::new(&[]);

    let queue = FsqBuilder::new(dir.path())
        .finalize_policy(lenient_finalize())
        .clock(Arc::new(clock.clone()))
        .build(processor)
        .unwrap();

    // The two recovered finalized files are delivered oldest-first.
    let first = recv(&rx);
    assert_eq!(first.file.timestamp, 100);
    assert_eq!(first.contents, "old\n");
    let second = recv(&rx);
    assert_eq!(second.file.name, "finalized-00000000000000000200.bin");
    assert_eq!(second.contents, "mid\n");

    // The newest current file was adopted, not finalized.
    let status = wait_for_status(&queue, |s| s.finalized.queue.is_empty());
    assert_eq!(status.current_timestamp, 300);
    assert_eq!(status.current_size, 4);
    let currents: Vec<String> = disk_names(dir.path())
        .into_iter()
        .filter(|n| naming.current.parse(n).is_some())
        .collect();
    assert_eq!(currents, vec![naming.current.generate(300)]);

    // New pushes land in the adopted file.
    clock.set(410);
    queue.push("x").unwrap();
    queue.force_processing(true);

    let third = recv(&rx);
    assert_eq!(third.file.timestamp, 300);
    assert_eq!(third.contents, "new\nx\n");

    queue.shutdown().unwrap();
}

#[test]
fn test_crash_recovery_preserves_all_messages() {
    let dir = TempDir::new().unwrap();
    let clock = MockClock::default();

    // First life: two finalized files plus an unfinalized current file,
    // nothing delivered (the processor reports itself unavailable).
    {
        let (processor, rx) = ScriptProcessor::new(&[ProcessingResult::Unavailable]);
        let queue = FsqBuilder::new(dir.path())
            .finalize_policy(FinalizePolicy {
                realtime_max_size: 4,
                realtime_max_age:  u64::MAX,
                backlog_max_size:  4,
                backlog_max_age:   u64::MAX,
            })
            .clock(Arc::new(clock.clone()))
            .build(processor)
            .unwrap();

        clock.set(1);
        queue.push("aaa").unwrap();
        let _ = recv(&rx);
        clock.set(2);
        queue.push("bbb").unwrap();
        clock.set(3);
        queue.push("c").unwrap();

        let status = wait_for_status(&queue, |s| s.finalized.queue.len() == 2);
        assert_eq!(status.current_size, 2);
        // Dropping shuts down without finalizing the current file.
    }

    // Second life: everything is recovered from the directory alone.
    let (processor, rx) = ScriptProcessor::new(&[]);
    clock.set(1000);
    let queue = FsqBuilder::new(dir.path())
        .finalize_policy(FinalizePolicy {
            realtime_max_size: 1000,
            realtime_max_age:  10_000,
            backlog_max_size:  u64::MAX,
            backlog_max_age:   u64::MAX,
        })
        .clock(Arc::new(clock.clone()))
        .build(processor)
        .unwrap();

    let first = recv(&rx);
    assert_eq!(first.file.timestamp, 1);
    assert_eq!(first.contents, "aaa\n");
    let second = recv(&rx);
    assert_eq!(second.file.timestamp, 2);
    assert_eq!(second.contents, "bbb\n");

    // The interrupted current file was recognized, not lost.
    let status = wait_for_status(&queue, |s| s.finalized.queue.is_empty());
    assert_eq!(status.current_timestamp, 3);
    assert_eq!(status.current_size, 2);

    queue.force_processing(true);
    let third = recv(&rx);
    assert_eq!(third.file.timestamp, 3);
    assert_eq!(third.contents, "c\n");

    queue.shutdown().unwrap();
}

#[test]
fn test_stale_current_finalized_at_startup() {
    let dir = TempDir::new().unwrap();
    let naming = NamingScheme::default();
    std::fs::write(dir.path().join(naming.current.generate(100)), "stale\n").unwrap();

    let clock = MockClock::default();
    clock.set(10_000);
    let (processor, rx) = ScriptProcessor::new(&[]);

    // Age 9900 >= 1000: the leftover current file is finalized right away
    // rather than adopted.
    let queue = FsqBuilder::new(dir.path())
        .finalize_policy(FinalizePolicy {
            realtime_max_size: 1000,
            realtime_max_age:  1000,
            backlog_max_size:  u64::MAX,
            backlog_max_age:   u64::MAX,
        })
        .clock(Arc::new(clock.clone()))
        .build(processor)
        .unwrap();

    let call = recv(&rx);
    assert_eq!(call.file.name, naming.finalized.generate(100));
    assert_eq!(call.contents, "stale\n");

    let status = wait_for_status(&queue, |s| s.finalized.queue.is_empty());
    assert_eq!(status.current_timestamp, 0);
    assert_eq!(status.current_size, 0);

    queue.shutdown().unwrap();
}

#[test]
fn test_remove_all_files_ignores_strangers() {
    let dir = TempDir::new().unwrap();
    let clock = MockClock::default();
    let (processor, rx) = ScriptProcessor::new(&[ProcessingResult::Unavailable]);

    let queue = FsqBuilder::new(dir.path())
        .finalize_policy(FinalizePolicy {
            realtime_max_size: 1,
            realtime_max_age:  u64::MAX,
            backlog_max_size:  1,
            backlog_max_age:   u64::MAX,
        })
        .clock(Arc::new(clock.clone()))
        .build(processor)
        .unwrap();

    clock.set(1);
    queue.push("a").unwrap();
    let _ = recv(&rx);
    std::thread::sleep(Duration::from_millis(50));
    clock.set(2);
    queue.push("b").unwrap();

    std::fs::write(dir.path().join("notes.txt"), "keep me").unwrap();
    wait_for_status(&queue, |s| s.finalized.queue.len() == 2);

    queue.remove_all_files().unwrap();

    assert_eq!(disk_names(dir.path()), vec!["notes.txt".to_string()]);

    queue.shutdown().unwrap();
}

#[test]
fn test_status_totals_match_queue_contents() {
    let dir = TempDir::new().unwrap();
    let clock = MockClock::default();
    let (processor, rx) = ScriptProcessor::new(&[ProcessingResult::Unavailable]);

    let queue = FsqBuilder::new(dir.path())
        .finalize_policy(FinalizePolicy {
            realtime_max_size: 1,
            realtime_max_age:  u64::MAX,
            backlog_max_size:  1,
            backlog_max_age:   u64::MAX,
        })
        .clock(Arc::new(clock.clone()))
        .build(processor)
        .unwrap();

    clock.set(1);
    queue.push("one").unwrap();
    let _ = recv(&rx);
    std::thread::sleep(Duration::from_millis(50));
    clock.set(2);
    queue.push("two22").unwrap();
    clock.set(3);
    queue.push("three").unwrap();

    let status = wait_for_status(&queue, |s| s.finalized.queue.len() == 3);
    let sum: u64 = status.finalized.queue.iter().map(|f| f.size).sum();
    assert_eq!(status.finalized.total_size, sum);
    let timestamps: Vec<u64> = status.finalized.queue.iter().map(|f| f.timestamp).collect();
    let mut sorted = timestamps.clone();
    sorted.sort_unstable();
    assert_eq!(timestamps, sorted);
    for file in &status.finalized.queue {
        assert_eq!(
            NamingScheme::default().finalized.parse(&file.name),
            Some(file.timestamp)
        );
    }

    queue.shutdown().unwrap();
}
