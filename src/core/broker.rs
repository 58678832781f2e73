//! Serialized mutation access to the corpus database.
//!
//! Every write path routes through the `DbBroker`: it acquires the
//! process-wide mutation lock with a bounded wait, opens a transaction, and
//! appends one audit event per operation to `broker.events.jsonl`.
//! Validation-then-write is indivisible with respect to other mutations;
//! readers open their own connections and never take this lock.

use crate::core::db;
use crate::core::error::RaasError;
use crate::core::model::now_iso;
use crate::core::schemas;
use rusqlite::{Connection, TransactionBehavior};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use ulid::Ulid;

static MUTATION_LOCK: Mutex<()> = Mutex::new(());

const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(10);

pub struct DbBroker {
    db_path: PathBuf,
    audit_log_path: PathBuf,
    lock_wait: Duration,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BrokerEvent {
    pub ts: String,
    pub event_id: String,
    pub actor: String,
    pub op: String,
    pub status: String,
}

impl DbBroker {
    pub fn new(root: &Path, lock_wait_ms: u64) -> Self {
        Self {
            db_path: db::corpus_db_path(root),
            audit_log_path: root.join(schemas::BROKER_EVENTS_NAME),
            lock_wait: Duration::from_millis(lock_wait_ms),
        }
    }

    /// Run `f` inside an immediate transaction under the mutation lock.
    /// Commits only when `f` returns Ok; any error rolls back with no
    /// observable effect. Lock acquisition waits at most the configured
    /// bound and then fails with a retryable contention error.
    pub fn with_txn<F, R>(&self, actor: &str, op_name: &str, f: F) -> Result<R, RaasError>
    where
        F: FnOnce(&rusqlite::Transaction) -> Result<R, RaasError>,
    {
        let _guard = self.acquire_lock(op_name)?;

        let mut conn = self.connect()?;
        let txn = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let result = f(&txn);

        let result = match result {
            Ok(value) => {
                txn.commit()?;
                Ok(value)
            }
            Err(e) => {
                // Drop rolls the transaction back.
                Err(e)
            }
        };

        let status = if result.is_ok() { "success" } else { "error" };
        self.log_event(actor, op_name, status)?;

        result
    }

    /// Read-only access; no mutation lock, no audit entry.
    pub fn with_read<F, R>(&self, f: F) -> Result<R, RaasError>
    where
        F: FnOnce(&Connection) -> Result<R, RaasError>,
    {
        let conn = self.connect()?;
        f(&conn)
    }

    fn connect(&self) -> Result<Connection, RaasError> {
        db::db_connect(&self.db_path.to_string_lossy())
    }

    fn acquire_lock(&self, op_name: &str) -> Result<std::sync::MutexGuard<'static, ()>, RaasError> {
        let deadline = Instant::now() + self.lock_wait;
        loop {
            match MUTATION_LOCK.try_lock() {
                Ok(guard) => return Ok(guard),
                Err(std::sync::TryLockError::Poisoned(poisoned)) => {
                    // A panicked holder cannot have committed; the data is intact.
                    return Ok(poisoned.into_inner());
                }
                Err(std::sync::TryLockError::WouldBlock) => {
                    if Instant::now() >= deadline {
                        return Err(RaasError::Contention(format!(
                            "mutation lock not acquired within {}ms for '{}'",
                            self.lock_wait.as_millis(),
                            op_name
                        )));
                    }
                    std::thread::sleep(LOCK_POLL_INTERVAL);
                }
            }
        }
    }

    fn log_event(&self, actor: &str, op: &str, status: &str) -> Result<(), RaasError> {
        use std::fs::OpenOptions;
        use std::io::Write;

        let ev = BrokerEvent {
            ts: now_iso(),
            event_id: Ulid::new().to_string(),
            actor: actor.to_string(),
            op: op.to_string(),
            status: status.to_string(),
        };

        let line = serde_json::to_string(&ev)
            .map_err(|e| RaasError::ConfigError(format!("audit serialization: {}", e)))?;
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.audit_log_path)
            .map_err(RaasError::IoError)?;
        writeln!(f, "{}", line).map_err(RaasError::IoError)?;
        Ok(())
    }
}
