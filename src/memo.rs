// src/memo.rs

//! At-most-once initialization with a cached outcome.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::OnceCell;

use crate::errors::SharedError;

/// Caches the result of an expensive setup, success or failure.
///
/// The first caller runs the initializer; concurrent first callers wait for
/// it. Every later call observes the same value or the same error, and the
/// initializer never runs again.
#[derive(Debug)]
pub struct Memo<T> {
    cell: OnceCell<Result<T, SharedError>>,
}

impl<T> Default for Memo<T> {
    fn default() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }
}

impl<T: Clone> Memo<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_init<F, Fut>(&self, init: F) -> anyhow::Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let outcome = self
            .cell
            .get_or_init(|| async move { init().await.map_err(|e| SharedError(Arc::new(e))) })
            .await;
        match outcome {
            Ok(value) => Ok(value.clone()),
            Err(err) => Err(anyhow::Error::new(err.clone())),
        }
    }

    /// True once the initializer has completed.
    pub fn is_initialized(&self) -> bool {
        self.cell.initialized()
    }
}
