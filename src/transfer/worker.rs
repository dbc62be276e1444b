//! Background worker running transfers off the caller's thread

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{info, warn};

use super::{TransferController, TransferError, TransferOutcome, TransferPhase};
use crate::mapper::WriteRequest;

#[derive(Debug, Clone)]
pub enum TransferJob {
    Apply(WriteRequest),
    Rollback,
}

#[derive(Debug)]
pub enum TransferEvent {
    Phase(TransferPhase),
    Finished(Result<TransferOutcome, TransferError>),
}

/// Events of one submitted job
///
/// Each job gets its own channel, so a ticket only ever sees the phases and
/// result of the job it was issued for.
pub struct TransferTicket {
    events: Receiver<TransferEvent>,
}

impl TransferTicket {
    /// Block until the job finishes, passing each phase to `on_phase`
    ///
    /// A privileged copy has no safe cancellation point, so a slow job is
    /// reported every `poll` but never abandoned. Returns once the worker has
    /// released the job, so a new one can be submitted right away.
    pub fn wait(
        self,
        poll: Duration,
        mut on_phase: impl FnMut(TransferPhase),
    ) -> Result<TransferOutcome, TransferError> {
        let mut last = TransferPhase::Idle;
        let mut finished = None;
        loop {
            match self.events.recv_timeout(poll) {
                Ok(TransferEvent::Phase(phase)) => {
                    last = phase;
                    on_phase(phase);
                }
                Ok(TransferEvent::Finished(result)) => finished = Some(result),
                Err(RecvTimeoutError::Timeout) if finished.is_none() => {
                    warn!(phase = %last, waited = ?poll, "Transfer still running");
                }
                Err(RecvTimeoutError::Timeout) => {}
                // the worker drops the job's sender only after clearing busy
                Err(RecvTimeoutError::Disconnected) => {
                    return finished.unwrap_or(Err(TransferError::WorkerStopped));
                }
            }
        }
    }
}

/// Owns the controller on a dedicated thread; one job at a time
pub struct TransferWorker {
    jobs: Option<Sender<(TransferJob, Sender<TransferEvent>)>>,
    busy: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl TransferWorker {
    pub fn spawn(mut controller: TransferController) -> Self {
        let (job_tx, job_rx) = mpsc::channel::<(TransferJob, Sender<TransferEvent>)>();
        let busy = Arc::new(AtomicBool::new(false));
        let worker_busy = Arc::clone(&busy);

        let handle = thread::spawn(move || {
            info!("Transfer worker started");
            for (job, reply) in job_rx {
                controller.set_event_sender(Some(reply.clone()));
                let result = match &job {
                    TransferJob::Apply(request) => controller.apply(request),
                    TransferJob::Rollback => controller.rollback(),
                };
                controller.set_event_sender(None);

                if reply.send(TransferEvent::Finished(result)).is_err() {
                    warn!("Job result dropped, nobody is waiting on it");
                }
                worker_busy.store(false, Ordering::SeqCst);
                drop(reply);
            }
            info!("Transfer worker stopped");
        });

        Self {
            jobs: Some(job_tx),
            busy,
            handle: Some(handle),
        }
    }

    #[cfg(test)]
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Queue `job`, or reject it while another one runs
    pub fn submit(&self, job: TransferJob) -> Result<TransferTicket, TransferError> {
        if self.busy.swap(true, Ordering::SeqCst) {
            warn!("Rejecting job, worker is busy");
            return Err(TransferError::Busy);
        }

        let (reply_tx, reply_rx) = mpsc::channel();
        let sent = self.jobs.as_ref().map(|jobs| jobs.send((job, reply_tx)));
        if !matches!(sent, Some(Ok(()))) {
            self.busy.store(false, Ordering::SeqCst);
            return Err(TransferError::WorkerStopped);
        }
        Ok(TransferTicket { events: reply_rx })
    }
}

impl Drop for TransferWorker {
    fn drop(&mut self) {
        // closing the job channel ends the worker loop after the current job
        self.jobs.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
