//! Dispenser worker — one thread that owns the orchestrator.
//!
//! ```text
//! ┌──────────────┐  WorkerCommand  ┌────────────────────────────┐
//! │   callers    │───────────────▶│  worker thread              │
//! │ (CLI, UI, …) │◀───────────────│  FulfillmentOrchestrator    │
//! └──────────────┘   Ticket<T>     │  (link, ledger, sink)       │
//!                                  └────────────────────────────┘
//! ```
//!
//! The link is never shared: every request is queued and the worker runs
//! them strictly one after another.  Dropping the worker closes the queue,
//! lets already-queued requests finish, then joins the thread.

use std::io;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use embedded_hal::delay::DelayNs;
use log::{debug, info, warn};

use crate::error::{OrchestrationError, ProtocolError, WorkerError};
use crate::link::Link;
use crate::model::{PatientId, Prescription};

use super::commands::{CancelToken, FulfillmentReply, WorkerCommand};
use super::orchestrator::FulfillmentOrchestrator;
use super::ports::{EventSink, PatientStore};

/// Pending reply to one queued request.
#[derive(Debug)]
pub struct Ticket<T> {
    rx: Receiver<T>,
}

impl<T> Ticket<T> {
    /// Block until the worker answers.
    pub fn wait(self) -> Result<T, WorkerError> {
        self.rx.recv().map_err(|_| WorkerError::Stopped)
    }

    pub fn wait_timeout(&self, timeout: Duration) -> Result<T, WorkerError> {
        self.rx.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => WorkerError::Timeout,
            RecvTimeoutError::Disconnected => WorkerError::Stopped,
        })
    }
}

/// A queued fulfillment plus the means to cancel it.
#[derive(Debug)]
pub struct FulfillmentTicket {
    ticket: Ticket<FulfillmentReply>,
    cancel: CancelToken,
}

impl FulfillmentTicket {
    /// Stop before the next medicine.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn wait(self) -> Result<FulfillmentReply, WorkerError> {
        self.ticket.wait()
    }

    pub fn wait_timeout(&self, timeout: Duration) -> Result<FulfillmentReply, WorkerError> {
        self.ticket.wait_timeout(timeout)
    }
}

pub struct DispenserWorker {
    tx: Option<Sender<WorkerCommand>>,
    handle: Option<JoinHandle<()>>,
}

impl DispenserWorker {
    /// Move `orchestrator` and `sink` onto a dedicated thread.
    pub fn spawn<L, D, S, E>(
        orchestrator: FulfillmentOrchestrator<L, D, S>,
        sink: E,
    ) -> io::Result<Self>
    where
        L: Link + Send + 'static,
        D: DelayNs + Send + 'static,
        S: PatientStore + Send + 'static,
        E: EventSink + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let handle = thread::Builder::new()
            .name("dispenser".into())
            .spawn(move || run(orchestrator, sink, rx))?;
        info!("worker: started");
        Ok(Self {
            tx: Some(tx),
            handle: Some(handle),
        })
    }

    /// Queue a fulfillment for `patient_id`.
    ///
    /// With `prescriptions` set, that list is dispensed instead of the one
    /// stored for the patient.
    pub fn submit(
        &self,
        patient_id: &str,
        prescriptions: Option<Vec<Prescription>>,
    ) -> Result<FulfillmentTicket, WorkerError> {
        let cancel = CancelToken::new();
        let (reply, rx) = mpsc::channel();
        self.send(WorkerCommand::Fulfill {
            patient_id: patient_id.to_owned(),
            prescriptions,
            cancel: cancel.clone(),
            reply,
        })?;
        Ok(FulfillmentTicket {
            ticket: Ticket { rx },
            cancel,
        })
    }

    pub fn scan(&self) -> Result<Ticket<Result<Option<String>, ProtocolError>>, WorkerError> {
        let (reply, rx) = mpsc::channel();
        self.send(WorkerCommand::Scan { reply })?;
        Ok(Ticket { rx })
    }

    pub fn home(&self) -> Result<Ticket<Result<(), ProtocolError>>, WorkerError> {
        let (reply, rx) = mpsc::channel();
        self.send(WorkerCommand::Home { reply })?;
        Ok(Ticket { rx })
    }

    /// Close the queue and wait for queued requests to finish.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn send(&self, cmd: WorkerCommand) -> Result<(), WorkerError> {
        self.tx
            .as_ref()
            .ok_or(WorkerError::Stopped)?
            .send(cmd)
            .map_err(|_| WorkerError::Stopped)
    }

    fn stop(&mut self) {
        drop(self.tx.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("worker: thread panicked");
            }
            info!("worker: stopped");
        }
    }
}

impl Drop for DispenserWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run<L, D, S, E>(
    mut orchestrator: FulfillmentOrchestrator<L, D, S>,
    mut sink: E,
    rx: Receiver<WorkerCommand>,
) where
    L: Link,
    D: DelayNs,
    S: PatientStore,
    E: EventSink,
{
    for cmd in rx {
        match cmd {
            WorkerCommand::Fulfill {
                patient_id,
                prescriptions,
                cancel,
                reply,
            } => {
                let result = match prescriptions {
                    Some(list) => PatientId::parse(&patient_id)
                        .map_err(OrchestrationError::from)
                        .and_then(|id| orchestrator.fulfill(&id, &list, &cancel, &mut sink)),
                    None => orchestrator.fulfill_patient(&patient_id, &cancel, &mut sink),
                };
                if reply.send(result).is_err() {
                    debug!("worker: fulfillment reply dropped by caller");
                }
            }
            WorkerCommand::Scan { reply } => {
                if reply.send(orchestrator.scan_patient()).is_err() {
                    debug!("worker: scan reply dropped by caller");
                }
            }
            WorkerCommand::Home { reply } => {
                if reply.send(orchestrator.home()).is_err() {
                    debug!("worker: home reply dropped by caller");
                }
            }
        }
    }
}
