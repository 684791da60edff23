//! Submit-and-poll statement execution.
//!
//! [`AsyncStatementExecutor::execute`] submits one statement and then
//! describes it on a fixed interval until it reaches a terminal state.
//! Sleeping goes through a [`Pacer`] so tests can run the loop without real
//! delays.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, error};

use super::{Row, StatementDescription, StatementHandle, StatementService, StatementStatus};
use crate::error::{LoadError, LoadResult};

/// Sleeps between status polls.
#[async_trait]
pub trait Pacer: Send + Sync {
    async fn pause(&self, interval: Duration);
}

/// Real-time pacing on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioPacer;

#[async_trait]
impl Pacer for TokioPacer {
    async fn pause(&self, interval: Duration) {
        tokio::time::sleep(interval).await;
    }
}

/// How often to poll, and for how long.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// `None` polls until the statement is terminal, however long that takes.
    /// The wait counts whichever is larger: the intervals slept or the wall
    /// clock since submission.
    pub max_wait: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_wait: None,
        }
    }
}

/// Terminal outcome of one statement.
#[derive(Debug, Clone, PartialEq)]
pub struct StatementResult {
    pub handle: StatementHandle,
    pub status: StatementStatus,
    pub description: StatementDescription,
    /// Populated only for finished statements that return a result set.
    pub rows: Vec<Row>,
    /// Number of status polls issued, including the first.
    pub polls: u32,
}

impl StatementResult {
    pub fn is_finished(&self) -> bool {
        self.status == StatementStatus::Finished
    }
}

/// Executes statements one at a time against a [`StatementService`].
pub struct AsyncStatementExecutor<S, P = TokioPacer> {
    service: S,
    pacer: P,
    policy: PollPolicy,
}

impl<S: StatementService> AsyncStatementExecutor<S, TokioPacer> {
    pub fn new(service: S, policy: PollPolicy) -> Self {
        Self::with_pacer(service, TokioPacer, policy)
    }
}

impl<S: StatementService, P: Pacer> AsyncStatementExecutor<S, P> {
    pub fn with_pacer(service: S, pacer: P, policy: PollPolicy) -> Self {
        Self {
            service,
            pacer,
            policy,
        }
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn pacer(&self) -> &P {
        &self.pacer
    }

    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    /// Run `sql` to completion.
    ///
    /// A Failed or Aborted statement is logged and returned, not raised;
    /// callers decide whether it is fatal. Errors are reserved for the
    /// service itself failing and for the poll deadline running out.
    pub async fn execute(&self, sql: &str) -> LoadResult<StatementResult> {
        let handle = self.service.submit(sql).await?;
        debug!(id = %handle, "Statement submitted");

        let started = Instant::now();
        let mut polls = 0u32;
        let mut slept = Duration::ZERO;

        let description = loop {
            let description = self.service.describe(&handle).await?;
            polls += 1;

            if description.status.is_terminal() {
                break description;
            }

            if let Some(max_wait) = self.policy.max_wait {
                let waited = slept.max(started.elapsed());
                if waited >= max_wait {
                    error!(id = %handle, status = %description.status, sql, "Statement timed out");
                    return Err(LoadError::StatementTimeout {
                        id: handle.0,
                        status: description.status,
                        waited_ms: waited.as_millis(),
                    });
                }
            }

            debug!(id = %handle, status = %description.status, polls, "Statement pending");
            self.pacer.pause(self.policy.interval).await;
            slept += self.policy.interval;
        };

        let status = description.status;
        if status != StatementStatus::Finished {
            error!(
                id = %handle,
                %status,
                sql,
                detail = ?description,
                "SQL failed"
            );
        }

        let rows = if status == StatementStatus::Finished && description.has_result_set {
            self.service.fetch_result(&handle).await?.into_rows()
        } else {
            Vec::new()
        };

        Ok(StatementResult {
            handle,
            status,
            description,
            rows,
            polls,
        })
    }
}
