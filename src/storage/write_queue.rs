//! # File Write Queue
//!
//! A FIFO queue with a single consumer thread, one per store file. Every
//! mutation of the file goes through here; reads bypass it. Producers submit
//! a unit of work and get back a ticket that resolves with the work's
//! outcome; multiple producers may submit concurrently, and the consumer
//! runs them strictly one at a time in submission order.
//!
//! ```text
//! Context A ──┐
//! Context B ──┼──► channel ──► consumer thread ──► StorageFileManager
//! Context C ──┘                     │
//!                                   └──► ticket completions
//! ```
//!
//! ## Cancellation
//!
//! Each job carries a cancellation token. A token observed as cancelled
//! before the job runs completes its ticket with `Cancelled` without
//! executing; a job that is already running sees the token and may stop
//! between its internal steps.
//!
//! ## Shutdown
//!
//! `shutdown` closes the queue to new submissions, waits up to ten seconds
//! for the consumer to drain what was already queued, and joins the thread.
//! Tickets for jobs that never ran resolve with `QueueClosed`.

use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use log::warn;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, StoreError};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

type WriteWork = Box<dyn FnOnce(&CancellationToken) -> Result<()> + Send + 'static>;

struct WriteJob {
    work: WriteWork,
    cancel: CancellationToken,
    done: oneshot::Sender<Result<()>>,
}

/// Completion handle for one submitted unit of work.
///
/// The outcome can be taken synchronously with [`wait`](Self::wait) or
/// awaited with [`join`](Self::join).
#[derive(Debug)]
pub struct WriteTicket {
    rx: oneshot::Receiver<Result<()>>,
}

impl WriteTicket {
    /// Blocks until the work has run and returns its outcome.
    ///
    /// Must not be called from inside an async runtime; use
    /// [`join`](Self::join) there instead.
    pub fn wait(self) -> Result<()> {
        match self.rx.blocking_recv() {
            Ok(result) => result,
            Err(_) => Err(StoreError::QueueClosed),
        }
    }

    /// Awaits the work's outcome.
    pub async fn join(self) -> Result<()> {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(StoreError::QueueClosed),
        }
    }
}

/// Single-consumer FIFO for all mutating operations on one file.
pub struct FileWriteQueue {
    sender: Mutex<Option<Sender<WriteJob>>>,
    consumer: Mutex<Option<JoinHandle<()>>>,
    drained: Receiver<()>,
}

impl FileWriteQueue {
    /// Starts the consumer thread. The label only names the thread.
    pub fn start(label: &str) -> Result<Self> {
        let (tx, rx) = channel::unbounded::<WriteJob>();
        let (drained_tx, drained_rx) = channel::bounded::<()>(1);

        let handle = std::thread::Builder::new()
            .name(format!("flatdb-writer-{}", label))
            .spawn(move || {
                for job in rx.iter() {
                    let result = if job.cancel.is_cancelled() {
                        Err(StoreError::Cancelled)
                    } else {
                        (job.work)(&job.cancel)
                    };
                    let _ = job.done.send(result);
                }
                let _ = drained_tx.send(());
            })?;

        Ok(Self {
            sender: Mutex::new(Some(tx)),
            consumer: Mutex::new(Some(handle)),
            drained: drained_rx,
        })
    }

    /// Appends a unit of work and returns immediately with its ticket.
    pub fn submit<F>(&self, cancel: CancellationToken, work: F) -> Result<WriteTicket>
    where
        F: FnOnce(&CancellationToken) -> Result<()> + Send + 'static,
    {
        let guard = self.sender.lock();
        let sender = guard.as_ref().ok_or(StoreError::QueueClosed)?;

        let (done, rx) = oneshot::channel();
        sender
            .send(WriteJob {
                work: Box::new(work),
                cancel,
                done,
            })
            .map_err(|_| StoreError::QueueClosed)?;

        Ok(WriteTicket { rx })
    }

    /// Submits a no-op and waits for it, so every previously submitted unit
    /// of work has finished when this returns. Blocks the calling thread
    /// directly (without a ticket), so it is safe from any context.
    pub fn flush(&self) -> Result<()> {
        let (tx, rx) = channel::bounded::<()>(1);
        self.submit(CancellationToken::new(), move |_| {
            let _ = tx.send(());
            Ok(())
        })?;
        rx.recv().map_err(|_| StoreError::QueueClosed)
    }

    /// Closes the queue to new submissions, drains outstanding work with a
    /// bounded wait, and stops the consumer. Idempotent.
    pub fn shutdown(&self) {
        drop(self.sender.lock().take());

        let Some(handle) = self.consumer.lock().take() else {
            return;
        };

        match self.drained.recv_timeout(SHUTDOWN_TIMEOUT) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                let _ = handle.join();
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    "write queue consumer did not drain within {:?}; detaching",
                    SHUTDOWN_TIMEOUT
                );
            }
        }
    }
}

impl Drop for FileWriteQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}
