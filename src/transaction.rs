use std::future::Future;
use std::panic::AssertUnwindSafe;

use anyhow::Result;
use futures::FutureExt;
use tracing::warn;

use crate::database::Database;

type Callback<'a> = Box<dyn FnOnce() + Send + 'a>;

/// Runs a unit of work between begin and commit/rollback.
///
/// Never propagates the work's error or panic: every failure path yields
/// `false` and fires the failure callback, every success `true` and the
/// success callback.
pub struct Transactional<'a> {
    db: &'a Database,
    on_success: Option<Callback<'a>>,
    on_failure: Option<Callback<'a>>,
}

impl<'a> Transactional<'a> {
    pub(crate) fn new(db: &'a Database) -> Self {
        Self {
            db,
            on_success: None,
            on_failure: None,
        }
    }

    pub fn on_success(mut self, f: impl FnOnce() + Send + 'a) -> Self {
        self.on_success = Some(Box::new(f));
        self
    }

    pub fn on_failure(mut self, f: impl FnOnce() + Send + 'a) -> Self {
        self.on_failure = Some(Box::new(f));
        self
    }

    pub async fn run_async<F, Fut>(self, work: F) -> bool
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        self.run_if_async(|| work().map(|r| r.map(|()| true))).await
    }

    /// Commits only when `work` returns `Ok(true)`.
    pub async fn run_if_async<F, Fut>(self, work: F) -> bool
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<bool>>,
    {
        let Transactional {
            db,
            on_success,
            on_failure,
        } = self;

        let committed = match db.begin_transaction_async().await {
            Ok(()) => {
                let outcome = AssertUnwindSafe(async move { work().await })
                    .catch_unwind()
                    .await;
                match outcome {
                    Ok(Ok(true)) => match db.complete_transaction_async().await {
                        Ok(()) => true,
                        Err(e) => {
                            warn!(error = %e, "transaction commit failed");
                            false
                        }
                    },
                    Ok(Ok(false)) => {
                        warn!("transaction work declined; rolling back");
                        abort(db).await;
                        false
                    }
                    Ok(Err(e)) => {
                        warn!(error = %e, "transaction work failed; rolling back");
                        abort(db).await;
                        false
                    }
                    Err(_) => {
                        warn!("transaction work panicked; rolling back");
                        abort(db).await;
                        false
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "could not begin transaction");
                false
            }
        };

        let callback = if committed { on_success } else { on_failure };
        if let Some(f) = callback {
            f();
        }
        committed
    }
}

async fn abort(db: &Database) {
    if let Err(e) = db.abort_transaction_async().await {
        warn!(error = %e, "transaction rollback failed");
    }
}
