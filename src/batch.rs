//! Bounded fan-out with a cooldown between chunks.
//!
//! Items are split into consecutive chunks of `width`. All workers of a chunk
//! are polled together on the current task; the next chunk starts only after
//! the whole chunk has resolved and the cooldown has elapsed. Results keep the
//! input order and the first error aborts the batch.

use futures::future::try_join_all;
use std::future::Future;
use std::time::Duration;

pub const DEFAULT_COOLDOWN: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchRunner {
    width: usize,
    cooldown: Duration,
}

impl Default for BatchRunner {
    fn default() -> Self {
        Self::new(1)
    }
}

impl BatchRunner {
    /// A width of 0 is treated as 1.
    pub fn new(width: usize) -> Self {
        Self {
            width: width.max(1),
            cooldown: DEFAULT_COOLDOWN,
        }
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub async fn run<T, R, E, F, Fut>(&self, items: Vec<T>, worker: F) -> Result<Vec<R>, E>
    where
        F: Fn(T) -> Fut,
        Fut: Future<Output = Result<R, E>>,
    {
        let total = items.len();
        let mut results = Vec::with_capacity(total);
        let mut pending = items.into_iter().peekable();
        let mut chunk_index = 0usize;

        while pending.peek().is_some() {
            let chunk: Vec<T> = pending.by_ref().take(self.width).collect();
            chunk_index += 1;
            tracing::debug!(chunk = chunk_index, size = chunk.len(), total, "running batch chunk");

            results.extend(try_join_all(chunk.into_iter().map(&worker)).await?);

            if pending.peek().is_some() && !self.cooldown.is_zero() {
                tokio::time::sleep(self.cooldown).await;
            }
        }

        Ok(results)
    }
}

/// Run `worker` over `items` in chunks of `width` with the default cooldown.
pub async fn run_batched<T, R, E, F, Fut>(items: Vec<T>, width: usize, worker: F) -> Result<Vec<R>, E>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<R, E>>,
{
    BatchRunner::new(width).run(items, worker).await
}
