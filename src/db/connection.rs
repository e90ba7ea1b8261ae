use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
    time::Duration,
};

use anyhow::{anyhow, Context, Result};
use log::{error, info};
use rusqlite::Connection;
use tokio::sync::oneshot;

use super::migrations::run_migrations;

const WORKER_THREAD_NAME: &str = "breathcam-db";
const BUSY_TIMEOUT: Duration = Duration::from_secs(2);

type LedgerJob = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum LedgerCommand {
    Run(LedgerJob),
    Close,
}

struct Worker {
    commands: mpsc::Sender<LedgerCommand>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Worker {
    fn drop(&mut self) {
        let handle = match self.thread.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(handle) = handle else {
            return;
        };

        if let Err(err) = self.commands.send(LedgerCommand::Close) {
            error!("Session ledger worker already gone: {err}");
        }
        if let Err(err) = handle.join() {
            error!("Session ledger worker panicked: {err:?}");
        }
    }
}

/// Handle to the SQLite session ledger.
///
/// All statements run on one dedicated thread; async callers hand it a
/// closure and await the reply. Clones share the same worker, which exits
/// when the last clone is dropped.
#[derive(Clone)]
pub struct Database {
    worker: Arc<Worker>,
    db_path: Arc<PathBuf>,
}

impl Database {
    pub fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }

        let (commands, inbox) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();
        let path = db_path.clone();

        let thread = thread::Builder::new()
            .name(WORKER_THREAD_NAME.into())
            .spawn(move || match open_ledger(&path) {
                Ok(conn) => {
                    if ready_tx.send(Ok(())).is_ok() {
                        serve(conn, inbox);
                    }
                }
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                }
            })
            .context("failed to spawn database worker thread")?;

        ready_rx
            .recv()
            .context("database worker exited before signaling readiness")??;

        info!("Session ledger ready at {}", db_path.display());

        Ok(Self {
            worker: Arc::new(Worker {
                commands,
                thread: Mutex::new(Some(thread)),
            }),
            db_path: Arc::new(db_path),
        })
    }

    pub fn path(&self) -> &Path {
        self.db_path.as_path()
    }

    /// Run `task` on the worker thread and wait for its result.
    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: LedgerJob = Box::new(move |conn| {
            // The caller may have been cancelled; nothing to report then.
            let _ = reply_tx.send(task(conn));
        });

        self.worker
            .commands
            .send(LedgerCommand::Run(job))
            .map_err(|_| anyhow!("session ledger worker has shut down"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("session ledger worker dropped the request"))?
    }
}

fn open_ledger(path: &Path) -> Result<Connection> {
    let mut conn = Connection::open(path)
        .with_context(|| format!("failed to open SQLite database {}", path.display()))?;

    if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
        error!("Failed to enable WAL mode: {err}");
    }
    conn.busy_timeout(BUSY_TIMEOUT)
        .context("failed to set busy timeout")?;

    run_migrations(&mut conn).context("failed to run database migrations")?;
    Ok(conn)
}

fn serve(mut conn: Connection, inbox: mpsc::Receiver<LedgerCommand>) {
    for command in inbox {
        match command {
            LedgerCommand::Run(job) => job(&mut conn),
            LedgerCommand::Close => break,
        }
    }
    info!("Session ledger worker shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn clones_share_one_worker() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("nested/ledger.sqlite3")).unwrap();
        let other = db.clone();
        assert_eq!(db.path(), other.path());

        let (a, b) = tokio::join!(
            db.execute(|conn| Ok(conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?)),
            other.execute(|conn| Ok(conn.query_row("SELECT 2", [], |row| row.get::<_, i64>(0))?)),
        );
        assert_eq!((a.unwrap(), b.unwrap()), (1, 2));
    }

    #[tokio::test]
    async fn task_errors_reach_the_caller() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("ledger.sqlite3")).unwrap();
        let result: Result<()> = db
            .execute(|conn| {
                conn.execute("INSERT INTO missing_table VALUES (1)", [])?;
                Ok(())
            })
            .await;
        assert!(result.is_err());

        // The worker survives a failed statement.
        let ok = db.execute(|_| Ok(7)).await.unwrap();
        assert_eq!(ok, 7);
    }
}
