//! Batched embedding with bounded retry-with-backoff on rate limits.

use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use super::{Embedder, EmbedderError};

/// Batching and retry settings for bulk embedding.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub batch_size: usize,
    /// Retries after the first attempt, per batch and per item.
    pub max_retries: u32,
    /// Backoff before retry `n` is `base_backoff << n` unless the provider
    /// sent a `Retry-After` hint.
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            batch_size: 32,
            max_retries: 5,
            base_backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    fn delay(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        hint.unwrap_or_else(|| self.base_backoff.saturating_mul(1u32 << attempt.min(16)))
    }

    /// Run `f`, retrying while it reports a rate limit and retries remain.
    pub fn run<T>(
        &self,
        mut f: impl FnMut() -> Result<T, EmbedderError>,
    ) -> Result<T, EmbedderError> {
        let mut attempt = 0;
        loop {
            match f() {
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let hint = match e {
                        EmbedderError::RateLimited { retry_after } => retry_after,
                        _ => None,
                    };
                    let delay = self.delay(attempt, hint);
                    warn!(
                        "embedding provider rate limited, retrying in {}ms ({}/{})",
                        delay.as_millis(),
                        attempt + 1,
                        self.max_retries
                    );
                    thread::sleep(delay);
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

/// Embed `texts` in batches, returning one slot per input.
///
/// A batch that fails after retries is retried item by item; an item that
/// still fails, is blank, or comes back with the wrong dimensionality is
/// dropped (`None`) with a warning.
pub fn embed_texts<E: Embedder + ?Sized>(
    embedder: &E,
    texts: &[&str],
    policy: &RetryPolicy,
) -> Vec<Option<Vec<f32>>> {
    let dims = embedder.dimensions();
    let valid = |v: &Vec<f32>| v.len() == dims;

    let mut out: Vec<Option<Vec<f32>>> = Vec::with_capacity(texts.len());
    for (batch_no, batch) in texts.chunks(policy.batch_size.max(1)).enumerate() {
        let offset = out.len();
        let mut slots: Vec<Option<Vec<f32>>> = vec![None; batch.len()];

        let live: Vec<(usize, &str)> = batch
            .iter()
            .enumerate()
            .filter(|(i, t)| {
                let blank = t.trim().is_empty();
                if blank {
                    warn!("dropping input {}: empty text", offset + i);
                }
                !blank
            })
            .map(|(i, t)| (i, *t))
            .collect();
        if live.is_empty() {
            out.extend(slots);
            continue;
        }

        let inputs: Vec<&str> = live.iter().map(|(_, t)| *t).collect();
        let batch_result = match policy.run(|| embedder.embed_batch(&inputs)) {
            Ok(vectors) if vectors.len() == inputs.len() => Some(vectors),
            Ok(vectors) => {
                warn!(
                    "batch {batch_no} returned {} vectors for {} inputs, embedding items one by one",
                    vectors.len(),
                    inputs.len()
                );
                None
            }
            Err(e) => {
                warn!("batch {batch_no} failed ({e}), embedding items one by one");
                None
            }
        };

        match batch_result {
            Some(vectors) => {
                for ((i, _), vector) in live.iter().zip(vectors) {
                    slots[*i] = Some(vector);
                }
            }
            None => {
                for (i, text) in &live {
                    match policy.run(|| embedder.embed(text)) {
                        Ok(vector) => slots[*i] = Some(vector),
                        Err(e) => warn!("dropping input {}: {e}", offset + i),
                    }
                }
            }
        }

        for (i, slot) in slots.iter_mut().enumerate() {
            if slot.as_ref().is_some_and(|v| !valid(v)) {
                warn!("dropping input {}: expected {dims} dimensions", offset + i);
                *slot = None;
            }
        }
        debug!("embedded batch {batch_no} ({} inputs)", batch.len());
        out.extend(slots);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::mock::MockEmbedder;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast_policy(batch_size: usize, max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            batch_size,
            max_retries,
            base_backoff: Duration::ZERO,
        }
    }

    /// Rate-limits the first `limited` calls, then delegates to a mock.
    struct Throttled {
        inner: MockEmbedder,
        limited: usize,
        calls: AtomicUsize,
    }

    impl Throttled {
        fn new(limited: usize) -> Self {
            Self {
                inner: MockEmbedder::new(16),
                limited,
                calls: AtomicUsize::new(0),
            }
        }

        fn gate(&self) -> Result<(), EmbedderError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.limited {
                Err(EmbedderError::RateLimited {
                    retry_after: Some(Duration::ZERO),
                })
            } else {
                Ok(())
            }
        }
    }

    impl Embedder for Throttled {
        fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
            self.gate()?;
            self.inner.embed(text)
        }

        fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
            self.gate()?;
            self.inner.embed_batch(texts)
        }

        fn dimensions(&self) -> usize {
            16
        }
    }

    /// Fails whole batches and any text containing "poison".
    struct Picky {
        inner: MockEmbedder,
        batch_sizes: Mutex<Vec<usize>>,
    }

    impl Embedder for Picky {
        fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
            if text.contains("poison") {
                return Err(EmbedderError::InferenceFailed("bad token".into()));
            }
            self.inner.embed(text)
        }

        fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
            self.batch_sizes.lock().unwrap().push(texts.len());
            Err(EmbedderError::Http("503".into()))
        }

        fn dimensions(&self) -> usize {
            16
        }
    }

    #[test]
    fn test_batches_respect_batch_size() {
        let embedder = Picky {
            inner: MockEmbedder::new(16),
            batch_sizes: Mutex::new(Vec::new()),
        };
        let texts = ["a", "b", "c", "d", "e"];

        let out = embed_texts(&embedder, &texts, &fast_policy(2, 0));

        assert_eq!(*embedder.batch_sizes.lock().unwrap(), vec![2, 2, 1]);
        assert!(out.iter().all(Option::is_some));
    }

    #[test]
    fn test_rate_limit_is_retried() {
        let embedder = Throttled::new(2);

        let out = embed_texts(&embedder, &["alpha", "beta"], &fast_policy(8, 3));

        assert!(out.iter().all(Option::is_some));
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_exhausted_retries_drop_items() {
        let embedder = Throttled::new(usize::MAX);

        let out = embed_texts(&embedder, &["alpha", "beta"], &fast_policy(8, 1));

        assert_eq!(out.len(), 2);
        assert!(out.iter().all(Option::is_none));
        // One batch (2 attempts) and two items (2 attempts each).
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn test_failed_items_are_dropped_individually() {
        let embedder = Picky {
            inner: MockEmbedder::new(16),
            batch_sizes: Mutex::new(Vec::new()),
        };

        let out = embed_texts(&embedder, &["ok one", "poison", "   ", "ok two"], &fast_policy(4, 0));

        assert!(out[0].is_some());
        assert!(out[1].is_none());
        assert!(out[2].is_none());
        assert!(out[3].is_some());
    }

    #[test]
    fn test_wrong_dimensions_are_dropped() {
        struct Liar;
        impl Embedder for Liar {
            fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedderError> {
                Ok(vec![1.0; 3])
            }
            fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
                Ok(texts.iter().map(|_| vec![1.0; 3]).collect())
            }
            fn dimensions(&self) -> usize {
                4
            }
        }

        let out = embed_texts(&Liar, &["x"], &RetryPolicy::default());

        assert_eq!(out, vec![None]);
    }

    #[test]
    fn test_backoff_grows_exponentially() {
        let policy = RetryPolicy {
            base_backoff: Duration::from_millis(100),
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay(0, None), Duration::from_millis(100));
        assert_eq!(policy.delay(3, None), Duration::from_millis(800));
        assert_eq!(policy.delay(3, Some(Duration::from_secs(2))), Duration::from_secs(2));
    }
}
