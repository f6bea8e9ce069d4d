//! Concurrent oracle pool.
//!
//! Epistemic foundation:
//! - K_i: Sample i goes to worker i mod T; each worker owns its oracle
//! - K_i: Workers share nothing; results are merged after the join
//! - B_i: Any worker may fail → first error propagates after all finish
//! - I^R: Worker count comes from `oracle.threads`

use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::models::{Config, PacError, Range, Result, Sample};
use crate::oracle::{batch_oracle, Answers, BatchOracle, Requests};

/// Merged output of one pool run.
#[derive(Debug, Clone)]
pub struct PoolOutcome {
    /// Sample index → oracle answer, one entry per sample.
    pub answers: Answers,
    /// `None` only when there were no samples.
    pub range: Option<Range>,
}

/// Fixed set of batch oracles, one per worker.
pub struct OraclePool {
    workers: Vec<Arc<dyn BatchOracle>>,
    progress: bool,
}

impl OraclePool {
    pub fn new(workers: Vec<Arc<dyn BatchOracle>>) -> Result<Self> {
        if workers.is_empty() {
            return Err(PacError::InvalidInput(
                "the oracle pool needs at least one worker".to_string(),
            ));
        }
        Ok(Self {
            workers,
            progress: false,
        })
    }

    /// One identically configured oracle per `oracle.threads`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let workers = (0..config.oracle.threads.max(1))
            .map(|_| batch_oracle(config))
            .collect::<Result<Vec<_>>>()?;
        Self::new(workers)
    }

    /// Show a progress bar while workers run.
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Round-robin buckets; bucket `w` holds every sample index `i` with `i % T == w`.
    fn partition(&self, samples: &[Sample]) -> Vec<Requests> {
        let mut buckets = vec![Requests::new(); self.workers.len()];
        for (i, sample) in samples.iter().enumerate() {
            buckets[i % self.workers.len()].insert(i, sample.to_constants());
        }
        buckets
    }

    /// Check every sample and merge per-worker answers and ranges.
    pub async fn run(&self, samples: &[Sample]) -> Result<PoolOutcome> {
        let start = Instant::now();
        info!(
            samples = samples.len(),
            workers = self.workers.len(),
            backend = self.workers[0].name(),
            "Dispatching samples to oracle pool"
        );

        let pb = if self.progress {
            let pb = ProgressBar::new(samples.len() as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} ({percent}%) {msg}")
                    .map_err(|e| PacError::Internal(format!("progress template: {e}")))?
                    .progress_chars("##-"),
            );
            pb
        } else {
            ProgressBar::hidden()
        };

        let mut set = JoinSet::new();
        for (worker, requests) in self.partition(samples).into_iter().enumerate() {
            if requests.is_empty() {
                continue;
            }
            let oracle = Arc::clone(&self.workers[worker]);
            set.spawn(async move {
                let answers = oracle.check(&requests).await?;
                let range = partial_range(&requests, &answers)?;
                Ok::<_, PacError>((worker, answers, range))
            });
        }

        let mut answers = Answers::new();
        let mut ranges = Vec::new();
        let mut first_error = None;

        // Wait for every worker before reporting, so no subprocess outlives the call.
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Ok((worker, partial, range))) => {
                    debug!(worker, answers = partial.len(), "Worker finished");
                    pb.inc(partial.len() as u64);
                    answers.extend(partial);
                    ranges.extend(range);
                }
                Ok(Err(e)) => {
                    warn!(error = %e, "Oracle worker failed");
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    first_error.get_or_insert(PacError::Internal(format!(
                        "oracle worker panicked: {e}"
                    )));
                }
            }
        }

        if let Some(e) = first_error {
            pb.abandon_with_message("failed");
            return Err(e);
        }
        if answers.len() != samples.len() {
            return Err(PacError::Internal(format!(
                "pool collected {} answers for {} samples",
                answers.len(),
                samples.len()
            )));
        }

        pb.finish_with_message("done");
        info!(
            answers = answers.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Oracle pool complete"
        );

        Ok(PoolOutcome {
            answers,
            range: Range::merge_all(ranges),
        })
    }
}

/// Range over one worker's answers, witnessed by the sample constants.
fn partial_range(requests: &Requests, answers: &Answers) -> Result<Option<Range>> {
    let mut range: Option<Range> = None;
    for (id, value) in answers {
        let witness = requests
            .get(id)
            .ok_or_else(|| PacError::OracleProtocol(format!("result for unknown request id {id}")))?;
        match range.as_mut() {
            Some(range) => range.observe(*value, witness),
            None => range = Some(Range::single(*value, witness.clone())),
        }
    }
    Ok(range)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OracleResult, Parameter};
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers `p * 10`; counts how many requests it saw.
    struct Scaling {
        seen: AtomicUsize,
    }

    #[async_trait]
    impl BatchOracle for Scaling {
        fn name(&self) -> &'static str {
            "scaling"
        }

        async fn check(&self, requests: &Requests) -> Result<Answers> {
            self.seen.fetch_add(requests.len(), Ordering::SeqCst);
            requests
                .iter()
                .map(|(&id, constants)| {
                    let p = crate::models::parse_decimal(&constants[0].value)?;
                    Ok((id, OracleResult::Finite(p * dec!(10))))
                })
                .collect()
        }
    }

    struct Broken;

    #[async_trait]
    impl BatchOracle for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }

        async fn check(&self, _requests: &Requests) -> Result<Answers> {
            Err(PacError::OracleProtocol("segfault".to_string()))
        }
    }

    fn samples(values: &[Decimal]) -> Vec<Sample> {
        let p = [Parameter::new("p", dec!(0), dec!(1)).unwrap()];
        values
            .iter()
            .map(|v| Sample::from_values(&p, vec![*v]).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn merges_answers_and_range_across_workers() {
        let workers: Vec<Arc<Scaling>> = (0..3)
            .map(|_| Arc::new(Scaling { seen: AtomicUsize::new(0) }))
            .collect();
        let pool = OraclePool::new(
            workers
                .iter()
                .map(|w| Arc::clone(w) as Arc<dyn BatchOracle>)
                .collect(),
        )
        .unwrap();

        let samples = samples(&[dec!(0.3), dec!(0.1), dec!(0.9), dec!(0.5), dec!(0.2)]);
        let outcome = pool.run(&samples).await.unwrap();

        assert_eq!(outcome.answers.len(), 5);
        assert_eq!(outcome.answers[&2], OracleResult::Finite(dec!(9)));
        // Round-robin: worker 0 gets {0, 3}, worker 1 {1, 4}, worker 2 {2}.
        let seen: Vec<usize> = workers.iter().map(|w| w.seen.load(Ordering::SeqCst)).collect();
        assert_eq!(seen, vec![2, 2, 1]);

        let range = outcome.range.unwrap();
        assert_eq!(range.lower.value, OracleResult::Finite(dec!(1)));
        assert_eq!(range.lower.witness[0].value, "0.1");
        assert_eq!(range.upper.value, OracleResult::Finite(dec!(9)));
        assert_eq!(range.upper.witness[0].value, "0.9");
    }

    #[tokio::test]
    async fn more_workers_than_samples() {
        let workers: Vec<Arc<dyn BatchOracle>> = (0..4)
            .map(|_| Arc::new(Scaling { seen: AtomicUsize::new(0) }) as Arc<dyn BatchOracle>)
            .collect();
        let outcome = OraclePool::new(workers)
            .unwrap()
            .run(&samples(&[dec!(0.5)]))
            .await
            .unwrap();
        assert_eq!(outcome.answers.len(), 1);
    }

    #[tokio::test]
    async fn worker_failure_propagates() {
        let workers: Vec<Arc<dyn BatchOracle>> = vec![
            Arc::new(Scaling { seen: AtomicUsize::new(0) }),
            Arc::new(Broken),
        ];
        let err = OraclePool::new(workers)
            .unwrap()
            .run(&samples(&[dec!(0.1), dec!(0.2), dec!(0.3)]))
            .await
            .unwrap_err();
        assert!(matches!(err, PacError::OracleProtocol(m) if m == "segfault"));
    }

    #[tokio::test]
    async fn no_samples_no_range() {
        let pool = OraclePool::new(vec![Arc::new(Broken) as Arc<dyn BatchOracle>]).unwrap();
        let outcome = pool.run(&[]).await.unwrap();
        assert!(outcome.answers.is_empty());
        assert!(outcome.range.is_none());
    }

    #[test]
    fn empty_pool_is_rejected() {
        assert!(OraclePool::new(Vec::new()).is_err());
    }
}
