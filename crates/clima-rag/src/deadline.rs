use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

use crate::error::{RetrievalError, RetrievalResult};

/// One budget shared by every external call of a request.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
    budget: Duration,
}

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
            budget,
        }
    }

    /// Await `fut`, failing with `RetrievalError::Timeout` once the deadline passes.
    pub async fn run<F, T>(&self, operation: &'static str, fut: F) -> RetrievalResult<T>
    where
        F: Future<Output = T>,
    {
        tokio::time::timeout_at(self.at, fut)
            .await
            .map_err(|_| RetrievalError::Timeout {
                operation,
                budget: self.budget,
            })
    }
}
