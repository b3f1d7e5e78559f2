//! Bounded parallel fan-out over independent upstream calls.
//!
//! ```text
//! queries ──▶ JoinSet::spawn(with_timeout(per_call(q_i))) × N
//!                      │ (branches settle in any order)
//!                      ▼
//!             outcomes reassembled in input order, one per query
//! ```
//!
//! No branch failure aborts a sibling or the batch; the batch returns only
//! once every branch has settled. Because branches run concurrently, batch
//! wall-clock is bounded by a single branch timeout plus latency variance,
//! not `timeout × N`.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{BranchError, UpstreamError};
use crate::timeout::with_timeout;

/// The settled result of one fan-out branch, tagged with its originating
/// query so synthesis can re-establish correspondence.
#[derive(Debug)]
pub struct SubQueryOutcome {
    pub query: String,
    pub result: Result<String, BranchError>,
}

impl SubQueryOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn response(&self) -> Option<&str> {
        self.result.as_deref().ok()
    }
}

/// Run `per_call` over every query concurrently, each branch guarded by
/// `branch_timeout`. Returns exactly one outcome per input query, in input
/// order, after every branch has settled.
pub async fn execute_all<F, Fut>(
    queries: &[String],
    branch_timeout: Duration,
    per_call: F,
) -> Vec<SubQueryOutcome>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<String, UpstreamError>> + Send + 'static,
{
    let mut join_set: JoinSet<(usize, Result<String, BranchError>)> = JoinSet::new();

    for (idx, query) in queries.iter().enumerate() {
        let fut = per_call(query.clone());
        let message = format!("query {} timed out", idx + 1);
        join_set.spawn(async move {
            let start = Instant::now();
            let result = match with_timeout(fut, branch_timeout, message).await {
                Ok(Ok(text)) => Ok(text),
                Ok(Err(upstream)) => Err(BranchError::Upstream(upstream)),
                Err(timeout) => Err(BranchError::Timeout(timeout)),
            };
            debug!(
                branch = idx + 1,
                ok = result.is_ok(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "branch settled"
            );
            (idx, result)
        });
    }

    // Branches complete in arbitrary order; slot them back by index.
    let mut slots: Vec<Option<Result<String, BranchError>>> =
        (0..queries.len()).map(|_| None).collect();
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((idx, result)) => slots[idx] = Some(result),
            Err(e) => warn!(error = %e, "fan-out branch task died before settling"),
        }
    }

    queries
        .iter()
        .zip(slots)
        .map(|(query, slot)| SubQueryOutcome {
            query: query.clone(),
            result: slot.unwrap_or_else(|| {
                Err(BranchError::Aborted("branch task did not settle".into()))
            }),
        })
        .collect()
}
