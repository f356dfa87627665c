//! Explicit unit-of-work handle over a database transaction.
//!
//! Store operations take any `PgExecutor`, so they join this transaction
//! when handed `uow.conn()` and run standalone when handed a pool. The
//! after-commit hooks are the transaction-synchronization seam used by the
//! fast-path publisher: they run only after a successful commit, never on
//! rollback or drop.

use anyhow::Result;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};

type AfterCommitHook = Box<dyn FnOnce() + Send + 'static>;

pub struct UnitOfWork {
    tx: Transaction<'static, Postgres>,
    after_commit: Vec<AfterCommitHook>,
}

impl UnitOfWork {
    /// Open a transaction on the pool.
    pub async fn begin(pool: &PgPool) -> Result<Self> {
        let tx = pool.begin().await?;
        Ok(Self {
            tx,
            after_commit: Vec::new(),
        })
    }

    /// The transaction's connection, for store calls that must join it.
    pub fn conn(&mut self) -> &mut PgConnection {
        &mut self.tx
    }

    /// Register a hook to run after (and only after) a successful commit.
    pub fn after_commit(&mut self, hook: impl FnOnce() + Send + 'static) {
        self.after_commit.push(Box::new(hook));
    }

    /// Commit, then run the registered hooks in registration order.
    pub async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        for hook in self.after_commit {
            hook();
        }
        Ok(())
    }

    /// Roll back, discarding the registered hooks.
    pub async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
