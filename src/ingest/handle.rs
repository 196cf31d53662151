//! Handles to running ingestors

use std::net::SocketAddr;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::registry::DeviceId;

use super::ingestor::IngestReport;

/// What an ingestor needs to know about the device it serves
///
/// Issued by the registry; `session` ties the ingestor's state writes to the
/// registry slot it was started for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestTicket {
    pub device_id: DeviceId,
    pub addr: SocketAddr,
    pub session: u64,
}

/// Owner's side of a running ingestor
///
/// Stopping, or simply dropping the handle, makes the read loop close the
/// socket and finish.
#[derive(Debug)]
pub struct IngestHandle {
    session: u64,
    stop_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<IngestReport>,
}

impl IngestHandle {
    pub(crate) fn new(
        session: u64,
        stop_tx: oneshot::Sender<()>,
        task: JoinHandle<IngestReport>,
    ) -> Self {
        Self {
            session,
            stop_tx: Some(stop_tx),
            task,
        }
    }

    /// Ingest session this handle controls
    pub fn session(&self) -> u64 {
        self.session
    }

    /// Whether the ingest task has not finished yet
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Ask the ingestor to stop
    ///
    /// Returns false if it was already stopped or had finished.
    pub fn stop(&mut self) -> bool {
        match self.stop_tx.take() {
            Some(tx) => tx.send(()).is_ok(),
            None => false,
        }
    }

    /// Stop the ingestor and wait for its report
    pub async fn shutdown(mut self) -> Option<IngestReport> {
        self.stop();
        self.task.await.ok()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::ingest::CloseReason;

    /// Handle to a task that idles until stopped, for registry tests
    ///
    /// The receiver resolves once the task has seen the stop signal.
    pub fn parked(ticket: IngestTicket) -> (IngestHandle, oneshot::Receiver<()>) {
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let (done_tx, done_rx) = oneshot::channel();
        let task = tokio::spawn(async move {
            let _ = stop_rx.await;
            let _ = done_tx.send(());
            IngestReport {
                device_id: ticket.device_id,
                session: ticket.session,
                reason: CloseReason::Stopped,
                frames: 0,
                undelivered_frames: 0,
                bytes_received: 0,
                buffer_overflows: 0,
            }
        });
        (IngestHandle::new(ticket.session, stop_tx, task), done_rx)
    }
}
