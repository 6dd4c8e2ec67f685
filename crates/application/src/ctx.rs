//! The per-measurement context.
//!
//! Replaces ambient side channels (context values, globals) with one
//! explicit object: every port method takes a [`MeasureContext`] carrying
//! the shared trace log, the cancellation token, an optional deadline and
//! the current transaction identifier.

use netsonde_domain::{NetError, TraceLog};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct MeasureContext {
    trace: Arc<TraceLog>,
    cancel: CancellationToken,
    deadline: Option<Instant>,
    transaction_id: u64,
}

impl MeasureContext {
    pub fn new(trace: Arc<TraceLog>) -> Self {
        let transaction_id = trace.next_transaction_id();
        Self {
            trace,
            cancel: CancellationToken::new(),
            deadline: None,
            transaction_id,
        }
    }

    pub fn trace(&self) -> &TraceLog {
        &self.trace
    }

    /// An owned handle on the trace log, for wrappers that outlive the
    /// call that created them.
    pub fn trace_handle(&self) -> Arc<TraceLog> {
        self.trace.clone()
    }

    /// Monotonic offset since the measurement began; every event timestamp
    /// comes from this clock.
    pub fn elapsed(&self) -> Duration {
        self.trace.elapsed()
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn transaction_id(&self) -> u64 {
        self.transaction_id
    }

    /// A child context with a fresh transaction identifier, so nested
    /// operations (e.g. a DoH lookup inside an HTTP measurement) can be
    /// told apart in the trace.
    pub fn child_transaction(&self) -> Self {
        let mut child = self.clone();
        child.transaction_id = self.trace.next_transaction_id();
        child
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// A child context whose deadline is at most `ceiling` from now; an
    /// earlier caller-supplied deadline is kept.
    pub fn with_deadline_capped(&self, ceiling: Duration) -> Self {
        let capped = Instant::now() + ceiling;
        let deadline = match self.deadline {
            Some(existing) if existing < capped => existing,
            _ => capped,
        };
        Self {
            deadline: Some(deadline),
            ..self.clone()
        }
    }

    /// Races `fut` against cancellation and the context deadline. The
    /// losing future is dropped, which closes any socket it owns.
    pub async fn bounded<T, F>(&self, fut: F) -> Result<T, NetError>
    where
        F: Future<Output = Result<T, NetError>>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(NetError::Interrupted),
            _ = sleep_until_deadline(self.deadline) => Err(NetError::DeadlineExceeded),
            result = fut => result,
        }
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netsonde_domain::Failure;

    #[tokio::test]
    async fn bounded_returns_interrupted_on_cancel() {
        let cx = MeasureContext::new(Arc::new(TraceLog::new()));
        cx.cancel_token().cancel();
        let got = cx
            .bounded(async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            })
            .await;
        assert!(matches!(got, Err(NetError::Interrupted)));
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_respects_deadline() {
        let cx = MeasureContext::new(Arc::new(TraceLog::new()))
            .with_deadline_capped(Duration::from_millis(50));
        let got: Result<(), NetError> = cx
            .bounded(async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            })
            .await;
        let err = got.unwrap_err();
        assert!(matches!(err, NetError::DeadlineExceeded));
        assert_eq!(
            netsonde_domain::classify(err, netsonde_domain::Operation::Connect).failure,
            Failure::GenericTimeout
        );
    }

    #[test]
    fn child_transactions_are_distinct() {
        let cx = MeasureContext::new(Arc::new(TraceLog::new()));
        let a = cx.child_transaction();
        let b = cx.child_transaction();
        assert_ne!(a.transaction_id(), cx.transaction_id());
        assert_ne!(a.transaction_id(), b.transaction_id());
    }

    #[test]
    fn contexts_sharing_a_log_get_distinct_transactions() {
        let trace = Arc::new(TraceLog::new());
        let a = MeasureContext::new(trace.clone());
        let b = MeasureContext::new(trace);
        assert_ne!(a.transaction_id(), b.transaction_id());
    }

    #[test]
    fn capped_deadline_keeps_earlier_deadline() {
        let cx = MeasureContext::new(Arc::new(TraceLog::new()))
            .with_deadline_capped(Duration::from_secs(1));
        let early = cx.deadline().unwrap();
        let capped = cx.with_deadline_capped(Duration::from_secs(30));
        assert_eq!(capped.deadline().unwrap(), early);
    }
}
