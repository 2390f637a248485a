//! Paced, best-effort bulk processing.
//!
//! Items are split into fixed-size batches with a pause between batches. A
//! failing item (or batch) is logged and counted, never fatal: the report says
//! how much actually went through.

use std::fmt::{Debug, Display};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy)]
pub struct BatchedMapper {
    batch_size: usize,
    pause: Duration,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchReport {
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub batches: u64,
}

impl BatchedMapper {
    pub fn new(batch_size: usize, pause: Duration) -> Self {
        Self {
            batch_size: batch_size.max(1),
            pause,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Run `op` on every item, one at a time within each batch
    pub async fn map_each<T, F, Fut, E>(&self, items: Vec<T>, mut op: F) -> BatchReport
    where
        T: Debug + Clone,
        F: FnMut(T) -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: Display,
    {
        let mut report = BatchReport {
            total: items.len() as u64,
            ..BatchReport::default()
        };

        let mut remaining = items.into_iter().peekable();
        while remaining.peek().is_some() {
            let batch: Vec<T> = remaining.by_ref().take(self.batch_size).collect();
            report.batches += 1;

            for item in batch {
                match op(item.clone()).await {
                    Ok(()) => report.succeeded += 1,
                    Err(e) => {
                        report.failed += 1;
                        warn!(item = ?item, error = %e, "Batch item failed, continuing");
                    }
                }
            }

            debug!(
                batch = report.batches,
                succeeded = report.succeeded,
                failed = report.failed,
                "Batch finished"
            );

            if remaining.peek().is_some() && !self.pause.is_zero() {
                tokio::time::sleep(self.pause).await;
            }
        }

        report
    }

    /// Run `op` on whole batches. `op` returns how many items of the batch
    /// succeeded; an error counts the entire batch as failed.
    pub async fn map_batches<T, F, Fut, E>(&self, items: Vec<T>, mut op: F) -> BatchReport
    where
        F: FnMut(Vec<T>) -> Fut,
        Fut: Future<Output = Result<u64, E>>,
        E: Display,
    {
        let mut report = BatchReport {
            total: items.len() as u64,
            ..BatchReport::default()
        };

        let mut remaining = items.into_iter().peekable();
        while remaining.peek().is_some() {
            let batch: Vec<T> = remaining.by_ref().take(self.batch_size).collect();
            let batch_len = batch.len() as u64;
            report.batches += 1;

            match op(batch).await {
                Ok(succeeded) => {
                    let succeeded = succeeded.min(batch_len);
                    report.succeeded += succeeded;
                    report.failed += batch_len - succeeded;
                }
                Err(e) => {
                    report.failed += batch_len;
                    warn!(batch = report.batches, size = batch_len, error = %e, "Batch failed, continuing");
                }
            }

            if remaining.peek().is_some() && !self.pause.is_zero() {
                tokio::time::sleep(self.pause).await;
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn test_map_each_tolerates_item_failures() {
        let mapper = BatchedMapper::new(3, Duration::ZERO);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let report = mapper
            .map_each((1..=7).collect::<Vec<i64>>(), |n| {
                let seen = Arc::clone(&seen);
                async move {
                    seen.lock().unwrap().push(n);
                    if n % 3 == 0 {
                        Err(format!("item {} failed", n))
                    } else {
                        Ok(())
                    }
                }
            })
            .await;

        assert_eq!(
            report,
            BatchReport {
                total: 7,
                succeeded: 5,
                failed: 2,
                batches: 3
            }
        );
        // every item is attempted, in order
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3, 4, 5, 6, 7]);
    }

    #[tokio::test]
    async fn test_map_batches_counts_failed_batch() {
        let mapper = BatchedMapper::new(4, Duration::ZERO);
        let mut calls = 0;

        let report = mapper
            .map_batches((0..10).collect::<Vec<u32>>(), |batch| {
                calls += 1;
                let call = calls;
                async move {
                    if call == 2 {
                        Err("timed out")
                    } else {
                        Ok(batch.len() as u64)
                    }
                }
            })
            .await;

        assert_eq!(report.batches, 3);
        assert_eq!(report.succeeded, 6);
        assert_eq!(report.failed, 4);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let mapper = BatchedMapper::new(10, Duration::from_secs(5));
        let report = mapper
            .map_each(Vec::<i64>::new(), |_| async { Ok::<(), String>(()) })
            .await;
        assert_eq!(report, BatchReport::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pauses_only_between_batches() {
        let mapper = BatchedMapper::new(2, Duration::from_millis(100));
        let started = tokio::time::Instant::now();

        let report = mapper
            .map_each(vec![1, 2, 3, 4, 5], |_| async { Ok::<(), String>(()) })
            .await;

        assert_eq!(report.batches, 3);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(200), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_millis(300), "elapsed {:?}", elapsed);
    }

    #[test]
    fn test_zero_batch_size_is_clamped() {
        assert_eq!(BatchedMapper::new(0, Duration::ZERO).batch_size(), 1);
    }
}
