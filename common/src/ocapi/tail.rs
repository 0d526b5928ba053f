// Incremental log tailing driven by execution status and a deadline

use crate::errors::StatusOutcome;
use crate::models::{ByteRange, ExecutionDescriptor, ExecutionStatus};
use crate::ocapi::JobsApi;
use crate::output::{announce, OutputSink};
use metrics::counter;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, instrument};

/// Fixed delays used while tailing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TailSchedule {
    /// Wait before the first fetch so the remote side can open the log
    pub grace_period: Duration,
    /// Constant delay between status/size polls
    pub poll_interval: Duration,
}

impl Default for TailSchedule {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_millis(1000),
            poll_interval: Duration::from_millis(1500),
        }
    }
}

/// How a tail run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TailOutcome {
    /// The execution reached a terminal status
    Completed(ExecutionStatus),
    /// The deadline passed while the execution was still active
    TimedOut,
}

#[derive(Debug)]
enum TailState {
    Draining,
    Polling { deadline: Instant },
    TimedOut,
    Done,
}

/// Tail one execution until its status is terminal or `timeout` elapses.
///
/// Every remote failure is absorbed: status failures end the loop through a
/// terminal status, size probe failures skip the tick, and content failures
/// leave `log_bytes_read` untouched so the next tick asks for the same range.
#[instrument(
    skip(api, sink, schedule, descriptor),
    fields(job_id = %descriptor.job_id, execution_id = descriptor.execution_id)
)]
pub async fn tail_execution(
    api: &dyn JobsApi,
    sink: &dyn OutputSink,
    schedule: &TailSchedule,
    descriptor: &mut ExecutionDescriptor,
    timeout: Duration,
) -> TailOutcome {
    let mut state = TailState::Draining;
    let mut outcome = TailOutcome::Completed(descriptor.status.clone());

    loop {
        state = match state {
            TailState::Draining => {
                sleep(schedule.grace_period).await;
                initial_drain(api, sink, descriptor).await;
                TailState::Polling {
                    deadline: Instant::now() + timeout,
                }
            }
            TailState::Polling { deadline } => {
                if descriptor.status.is_terminal() {
                    outcome = TailOutcome::Completed(descriptor.status.clone());
                    TailState::Done
                } else if Instant::now() >= deadline {
                    TailState::TimedOut
                } else {
                    sleep(schedule.poll_interval).await;
                    poll_tick(api, sink, descriptor).await;
                    TailState::Polling { deadline }
                }
            }
            TailState::TimedOut => {
                announce(
                    sink,
                    &format!(
                        "Execution timeout of {}ms reached, stopping tail watch. \
                         You can specify a longer timeout using @sfccJobTailLogTimeout {}",
                        timeout.as_millis(),
                        crate::models::DEFAULT_TAIL_TIMEOUT_MS
                    ),
                );
                outcome = TailOutcome::TimedOut;
                TailState::Done
            }
            TailState::Done => break,
        };
    }

    info!(
        outcome = ?outcome,
        log_bytes_read = descriptor.log_bytes_read,
        "Tail finished"
    );
    outcome
}

/// Fetch the whole log once and remember its size
async fn initial_drain(api: &dyn JobsApi, sink: &dyn OutputSink, descriptor: &mut ExecutionDescriptor) {
    if let Ok(chunk) = api.log_content(&descriptor.log_file_path, None).await {
        if !chunk.text.is_empty() {
            sink.append_line(&chunk.text);
        }
        descriptor.log_bytes_read = chunk.size;
        counter!("log_bytes_tailed_total").increment(chunk.size);
    }
}

/// One polling step: refresh status first, then catch up on new log bytes
async fn poll_tick(api: &dyn JobsApi, sink: &dyn OutputSink, descriptor: &mut ExecutionDescriptor) {
    descriptor.status = api
        .job_status(&descriptor.job_id, descriptor.execution_id)
        .await
        .into_status();

    if descriptor.status != ExecutionStatus::Running {
        announce(
            sink,
            &format!("{} status: {}", descriptor.job_id, descriptor.status),
        );
    }

    let size = api.log_size(&descriptor.log_file_path).await.unwrap_or(0);
    if size <= descriptor.log_bytes_read {
        return;
    }

    let range = ByteRange::new(descriptor.log_bytes_read, size);
    debug!(range = %range, "Fetching appended log bytes");

    if let Ok(chunk) = api.log_content(&descriptor.log_file_path, Some(range)).await {
        sink.append_line(&chunk.text);
        descriptor.log_bytes_read = size;
        counter!("log_bytes_tailed_total").increment(range.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{LoggedFailure, OcapiError};
    use crate::models::LogChunk;
    use crate::output::MemorySink;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Scripted remote: statuses and sizes are consumed one per call, the
    /// last value repeating once the script runs out
    struct ScriptedApi {
        initial_size: u64,
        statuses: Mutex<VecDeque<ExecutionStatus>>,
        sizes: Mutex<VecDeque<Result<u64, ()>>>,
        fail_content_once: Mutex<bool>,
        status_calls: Mutex<usize>,
        size_calls: Mutex<usize>,
        ranges: Mutex<Vec<ByteRange>>,
    }

    impl ScriptedApi {
        fn new(initial_size: u64, statuses: &[&str], sizes: &[u64]) -> Self {
            Self {
                initial_size,
                statuses: Mutex::new(statuses.iter().map(|s| ExecutionStatus::from(*s)).collect()),
                sizes: Mutex::new(sizes.iter().map(|s| Ok(*s)).collect()),
                fail_content_once: Mutex::new(false),
                status_calls: Mutex::new(0),
                size_calls: Mutex::new(0),
                ranges: Mutex::new(Vec::new()),
            }
        }

        fn next<T: Clone>(queue: &Mutex<VecDeque<T>>) -> T {
            let mut queue = queue.lock().unwrap();
            if queue.len() > 1 {
                queue.pop_front().unwrap()
            } else {
                queue.front().cloned().unwrap()
            }
        }

        fn status_calls(&self) -> usize {
            *self.status_calls.lock().unwrap()
        }

        fn ranges(&self) -> Vec<ByteRange> {
            self.ranges.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl JobsApi for ScriptedApi {
        async fn execute_job(&self, _job_id: &str) -> Result<ExecutionDescriptor, LoggedFailure> {
            unreachable!("tail never starts executions")
        }

        async fn job_status(
            &self,
            _job_id: &str,
            _execution_id: i64,
        ) -> Result<ExecutionStatus, LoggedFailure> {
            *self.status_calls.lock().unwrap() += 1;
            Ok(Self::next(&self.statuses))
        }

        async fn log_content(
            &self,
            _log_file_path: &str,
            range: Option<ByteRange>,
        ) -> Result<LogChunk, OcapiError> {
            match range {
                None => Ok(LogChunk {
                    text: "x".repeat(self.initial_size as usize),
                    size: self.initial_size,
                }),
                Some(range) => {
                    let mut fail = self.fail_content_once.lock().unwrap();
                    if *fail {
                        *fail = false;
                        return Err(OcapiError::HttpRequestFailed("reset".to_string()));
                    }
                    self.ranges.lock().unwrap().push(range);
                    Ok(LogChunk {
                        text: "x".repeat(range.len() as usize),
                        size: range.len(),
                    })
                }
            }
        }

        async fn log_size(&self, _log_file_path: &str) -> Result<u64, OcapiError> {
            *self.size_calls.lock().unwrap() += 1;
            Self::next(&self.sizes)
                .map_err(|_| OcapiError::HttpRequestFailed("probe failed".to_string()))
        }

        fn log_url(&self, log_file_path: &str) -> String {
            format!("https://example.com/webdav{}", log_file_path)
        }
    }

    fn descriptor(status: &str) -> ExecutionDescriptor {
        ExecutionDescriptor {
            job_id: "export-catalog".to_string(),
            execution_id: 7,
            log_file_path: "/Sites/LOGS/jobs/export.log".to_string(),
            status: ExecutionStatus::from(status),
            log_bytes_read: 0,
        }
    }

    fn fast_schedule() -> TailSchedule {
        TailSchedule {
            grace_period: Duration::from_millis(1),
            poll_interval: Duration::from_millis(5),
        }
    }

    #[tokio::test]
    async fn test_incremental_ranges() {
        let api = ScriptedApi::new(
            100,
            &["running", "running", "running", "running", "ok"],
            &[100, 100, 250, 250, 400],
        );
        let sink = MemorySink::new();
        let mut descriptor = descriptor("running");

        let outcome = tail_execution(
            &api,
            &sink,
            &fast_schedule(),
            &mut descriptor,
            Duration::from_secs(30),
        )
        .await;

        assert_eq!(outcome, TailOutcome::Completed(ExecutionStatus::from("ok")));
        assert_eq!(
            api.ranges(),
            vec![ByteRange::new(100, 250), ByteRange::new(250, 400)]
        );
        assert_eq!(sink.content().len(), 400);
        assert_eq!(descriptor.log_bytes_read, 400);
        // No status poll after the terminal one
        assert_eq!(api.status_calls(), 5);
    }

    #[tokio::test]
    async fn test_timeout_emits_single_notice() {
        let api = ScriptedApi::new(0, &["running"], &[0]);
        let sink = MemorySink::new();
        let mut descriptor = descriptor("running");
        let timeout = Duration::from_millis(60);

        let started = Instant::now();
        let outcome =
            tail_execution(&api, &sink, &fast_schedule(), &mut descriptor, timeout).await;

        assert_eq!(outcome, TailOutcome::TimedOut);
        assert!(started.elapsed() >= timeout);
        let notices: Vec<String> = sink
            .announcements()
            .into_iter()
            .filter(|line| line.contains("Execution timeout of 60ms reached"))
            .collect();
        assert_eq!(notices.len(), 1);
        assert!(notices[0].contains("@sfccJobTailLogTimeout"));
    }

    #[tokio::test]
    async fn test_terminal_initial_status_skips_polling() {
        let api = ScriptedApi::new(12, &["running"], &[12]);
        let sink = MemorySink::new();
        let mut descriptor = descriptor("ok");

        let outcome = tail_execution(
            &api,
            &sink,
            &fast_schedule(),
            &mut descriptor,
            Duration::from_secs(5),
        )
        .await;

        assert_eq!(outcome, TailOutcome::Completed(ExecutionStatus::from("ok")));
        assert_eq!(api.status_calls(), 0);
        assert_eq!(sink.content().len(), 12);
    }

    #[tokio::test]
    async fn test_terminal_status_still_drains_same_tick() {
        let api = ScriptedApi::new(10, &["error"], &[25]);
        let sink = MemorySink::new();
        let mut descriptor = descriptor("pending");

        tail_execution(
            &api,
            &sink,
            &fast_schedule(),
            &mut descriptor,
            Duration::from_secs(5),
        )
        .await;

        assert_eq!(api.ranges(), vec![ByteRange::new(10, 25)]);
        assert_eq!(api.status_calls(), 1);
        assert!(sink
            .announcements()
            .contains(&"export-catalog status: error".to_string()));
    }

    #[tokio::test]
    async fn test_pending_status_is_announced_each_tick() {
        let api = ScriptedApi::new(0, &["pending", "pending", "ok"], &[0]);
        let sink = MemorySink::new();
        let mut descriptor = descriptor("pending");

        tail_execution(
            &api,
            &sink,
            &fast_schedule(),
            &mut descriptor,
            Duration::from_secs(5),
        )
        .await;

        let status_lines: Vec<String> = sink
            .announcements()
            .into_iter()
            .filter(|line| line.starts_with("export-catalog status:"))
            .collect();
        assert_eq!(
            status_lines,
            vec![
                "export-catalog status: pending".to_string(),
                "export-catalog status: pending".to_string(),
                "export-catalog status: ok".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_size_probe_skips_tick() {
        let api = ScriptedApi::new(5, &["running", "ok"], &[]);
        *api.sizes.lock().unwrap() = VecDeque::from(vec![Err(()), Ok(9)]);
        let sink = MemorySink::new();
        let mut descriptor = descriptor("running");

        tail_execution(
            &api,
            &sink,
            &fast_schedule(),
            &mut descriptor,
            Duration::from_secs(5),
        )
        .await;

        assert_eq!(api.ranges(), vec![ByteRange::new(5, 9)]);
        assert_eq!(descriptor.log_bytes_read, 9);
    }

    #[tokio::test]
    async fn test_failed_content_fetch_retries_range() {
        let api = ScriptedApi::new(0, &["running", "running", "ok"], &[30]);
        *api.fail_content_once.lock().unwrap() = true;
        let sink = MemorySink::new();
        let mut descriptor = descriptor("running");

        tail_execution(
            &api,
            &sink,
            &fast_schedule(),
            &mut descriptor,
            Duration::from_secs(5),
        )
        .await;

        assert_eq!(api.ranges(), vec![ByteRange::new(0, 30)]);
        assert_eq!(sink.content().len(), 30);
    }
}
