use super::DbPool;
use crate::errors::{Result, StorageError};
use diesel::SqliteConnection;
use log::error;
use std::any::Any;
use tokio::sync::{mpsc, oneshot};

// Type alias for the job to be executed by the writer actor.
type Job<T> = Box<dyn FnOnce(&mut SqliteConnection) -> Result<T> + Send + 'static>;

type Reply = oneshot::Sender<Result<Box<dyn Any + Send + 'static>>>;

/// Handle for sending jobs to the writer actor.
#[derive(Clone)]
pub struct WriteHandle {
    // Each job is a boxed closure with a oneshot sender for the reply.
    // The Box<dyn Any + Send> erases the job's return type.
    tx: mpsc::Sender<(Job<Box<dyn Any + Send + 'static>>, Reply)>,
}

impl WriteHandle {
    /// Executes a database job on the writer actor's dedicated connection,
    /// inside an immediate transaction.
    pub async fn exec<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T> + Send + 'static,
        T: Send + 'static + Any,
    {
        let (ret_tx, ret_rx) = oneshot::channel();

        self.tx
            .send((
                Box::new(move |c| job(c).map(|v| Box::new(v) as Box<dyn Any + Send>)),
                ret_tx,
            ))
            .await
            .map_err(|_| StorageError::WriterUnavailable("receiving channel closed".to_string()))?;

        let boxed = ret_rx.await.map_err(|_| {
            StorageError::WriterUnavailable("reply dropped without a result".to_string())
        })??;

        boxed
            .downcast::<T>()
            .map(|value| *value)
            .map_err(|_| StorageError::WriterUnavailable("unexpected result type".to_string()))
    }
}

/// Spawns a background Tokio task that acts as the single writer to the database.
/// The actor owns one pooled connection and processes write jobs serially.
///
/// Must be called from within a Tokio runtime.
pub fn spawn_writer(pool: &DbPool) -> Result<WriteHandle> {
    let mut conn = pool.get()?;

    // Bounded channel; senders wait when the writer falls behind.
    let (tx, mut rx) = mpsc::channel::<(Job<Box<dyn Any + Send + 'static>>, Reply)>(1024);

    tokio::spawn(async move {
        while let Some((job, reply_tx)) = rx.recv().await {
            let result = conn.immediate_transaction::<_, StorageError, _>(|c| job(c));
            if let Err(e) = &result {
                error!("Cache write failed: {}", e);
            }

            // The requester may have been cancelled.
            let _ = reply_tx.send(result);
        }
        // All handles dropped.
    });

    Ok(WriteHandle { tx })
}
