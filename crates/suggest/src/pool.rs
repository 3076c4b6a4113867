use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::warn;

use crate::{Proposal, ProposalSource, SuggestError};

/// Fixed ceiling on concurrent in-flight proposal calls, chosen for typical
/// language-model rate limits.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Run one proposal call per payee through a bounded worker pool: a fixed
/// number of workers pull from a shared queue until it drains.
///
/// Results come back keyed by payee in a `BTreeMap`, so downstream grouping
/// is reproducible regardless of network timing. A failed call records an
/// error for its own payee only — partial-batch success is expected and
/// acceptable, and there is no cancellation.
pub async fn propose_all(
    source: Arc<dyn ProposalSource>,
    payees: Vec<String>,
    concurrency: usize,
) -> BTreeMap<String, Result<Proposal, SuggestError>> {
    let queue: Arc<Mutex<VecDeque<String>>> = Arc::new(Mutex::new(payees.into_iter().collect()));
    let results: Arc<Mutex<BTreeMap<String, Result<Proposal, SuggestError>>>> =
        Arc::new(Mutex::new(BTreeMap::new()));

    let mut workers = JoinSet::new();
    for _ in 0..concurrency.max(1) {
        let queue = Arc::clone(&queue);
        let results = Arc::clone(&results);
        let source = Arc::clone(&source);
        workers.spawn(async move {
            loop {
                let next = queue.lock().await.pop_front();
                let Some(payee) = next else { break };
                let outcome = source.propose(&payee).await;
                if let Err(e) = &outcome {
                    warn!(payee = %payee, error = %e, "proposal call failed");
                }
                results.lock().await.insert(payee, outcome);
            }
        });
    }
    while workers.join_next().await.is_some() {}

    match Arc::try_unwrap(results) {
        Ok(mutex) => mutex.into_inner(),
        // All workers have joined, so this branch is unreachable in
        // practice; clone rather than panic if it ever is not.
        Err(shared) => shared.lock().await.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct MockSource {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        fail_for: Option<String>,
    }

    impl MockSource {
        fn new(fail_for: Option<&str>) -> Self {
            MockSource {
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                fail_for: fail_for.map(str::to_string),
            }
        }
    }

    #[async_trait]
    impl ProposalSource for MockSource {
        async fn propose(&self, raw_payee: &str) -> Result<Proposal, SuggestError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.fail_for.as_deref() == Some(raw_payee) {
                return Err(SuggestError::Backend("boom".to_string()));
            }
            Ok(Proposal {
                clean_name: raw_payee.to_lowercase(),
                category: None,
            })
        }
    }

    fn payees(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("PAYEE {i:02}")).collect()
    }

    #[tokio::test]
    async fn every_input_gets_exactly_one_keyed_result() {
        let source = Arc::new(MockSource::new(None));
        let results = propose_all(source, payees(7), 3).await;
        assert_eq!(results.len(), 7);
        for (payee, outcome) in &results {
            assert_eq!(outcome.as_ref().unwrap().clean_name, payee.to_lowercase());
        }
    }

    #[tokio::test]
    async fn concurrency_never_exceeds_the_ceiling() {
        let source = Arc::new(MockSource::new(None));
        let _ = propose_all(Arc::clone(&source) as Arc<dyn ProposalSource>, payees(12), 3).await;
        let max = source.max_in_flight.load(Ordering::SeqCst);
        assert!(max <= 3, "observed {max} concurrent calls");
    }

    #[tokio::test]
    async fn one_failure_does_not_abort_the_batch() {
        let source = Arc::new(MockSource::new(Some("PAYEE 02")));
        let results = propose_all(source, payees(5), 2).await;
        assert_eq!(results.len(), 5);
        assert!(results["PAYEE 02"].is_err());
        assert_eq!(results.values().filter(|r| r.is_ok()).count(), 4);
    }

    #[tokio::test]
    async fn empty_input_yields_empty_results() {
        let source = Arc::new(MockSource::new(None));
        let results = propose_all(source, vec![], 5).await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn more_workers_than_work_is_fine() {
        let source = Arc::new(MockSource::new(None));
        let results = propose_all(source, payees(2), 8).await;
        assert_eq!(results.len(), 2);
    }
}
