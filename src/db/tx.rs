use std::future::Future;
use std::sync::{Arc, Mutex};

use sqlx::{Acquire, PgPool, Postgres, Transaction};

use crate::bus::Bus;
use crate::error::AppResult;

type Callback = Box<dyn FnOnce(&Bus) + Send>;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AccessMode {
    ReadWrite,
    ReadOnly,
}

/// Wraps a `sqlx` transaction with nested-savepoint support and an
/// on-commit callback queue (spec §4.1).
///
/// Callbacks registered on a nested scope are forwarded to the root; they
/// fire, in registration order, only if the root commits. If the root
/// rolls back, every collected callback is discarded with it. Callbacks run
/// after `commit` has returned, never on the connection itself, so a bus
/// publish triggered by a callback can never deadlock inside the
/// transaction.
pub struct Tx<'c> {
    inner: Transaction<'c, Postgres>,
    callbacks: Arc<Mutex<Vec<Callback>>>,
}

impl Tx<'static> {
    pub async fn begin(pool: &PgPool, mode: AccessMode) -> AppResult<Tx<'static>> {
        let mut inner = pool.begin().await?;
        if mode == AccessMode::ReadOnly {
            sqlx::query("SET TRANSACTION READ ONLY")
                .execute(&mut *inner)
                .await?;
        }
        Ok(Tx {
            inner,
            callbacks: Arc::new(Mutex::new(Vec::new())),
        })
    }

    /// Commits the root transaction, then drains and runs the collected
    /// on-commit callbacks in registration order. Rolling back instead
    /// (simply dropping the `Tx`) discards the callbacks untouched.
    pub async fn commit(self, bus: &Bus) -> AppResult<()> {
        self.inner.commit().await?;
        let callbacks = std::mem::take(
            &mut *self.callbacks.lock().expect("tx callbacks mutex poisoned"),
        );
        for cb in callbacks {
            cb(bus);
        }
        Ok(())
    }

    pub async fn rollback(self) -> AppResult<()> {
        self.inner.rollback().await?;
        Ok(())
    }
}

impl<'c> Tx<'c> {
    /// The live connection, for issuing queries directly.
    pub fn conn(&mut self) -> &mut sqlx::PgConnection {
        &mut self.inner
    }

    /// Registers a callback that fires once the *root* transaction commits.
    /// Safe to call from any nested scope — it always forwards to the root.
    pub fn on_commit<F>(&self, f: F)
    where
        F: FnOnce(&Bus) + Send + 'static,
    {
        self.callbacks
            .lock()
            .expect("tx callbacks mutex poisoned")
            .push(Box::new(f));
    }

    /// Runs `f` in a nested scope backed by a `SAVEPOINT`. If `f` returns an
    /// error, the scope rolls back to the savepoint and the error
    /// propagates; on success the savepoint is released. Either way,
    /// on-commit callbacks registered inside `f` stay queued on the root —
    /// a rolled-back savepoint does not discard them unless the *root*
    /// itself later rolls back.
    pub async fn savepoint<'a, F, Fut, T>(&'a mut self, f: F) -> AppResult<T>
    where
        F: FnOnce(&mut Tx<'a>) -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let nested = self.inner.begin().await?;
        let mut nested_tx = Tx {
            inner: nested,
            callbacks: Arc::clone(&self.callbacks),
        };
        match f(&mut nested_tx).await {
            Ok(value) => {
                nested_tx.inner.commit().await?;
                Ok(value)
            }
            Err(err) => {
                let _ = nested_tx.inner.rollback().await;
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    // Exercised against a live database in `tests/` — savepoint rollback
    // and on-commit callback ordering need a real Postgres connection to
    // verify meaningfully, so unit tests here are limited to the parts that
    // don't require one.
    use super::*;

    #[test]
    fn access_mode_is_copy_and_comparable() {
        assert_eq!(AccessMode::ReadWrite, AccessMode::ReadWrite);
        assert_ne!(AccessMode::ReadWrite, AccessMode::ReadOnly);
    }
}
