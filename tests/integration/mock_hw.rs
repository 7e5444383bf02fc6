//! Mock adapters for integration tests.
//!
//! Every mock keeps its record behind an `Arc` so a test can still inspect
//! it after the adapter has moved into a protocol, orchestrator or worker
//! thread.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use embedded_hal::delay::DelayNs;
use medvend::adapters::json_store::{JsonStore, StoreDocument};
use medvend::app::commands::CancelToken;
use medvend::app::events::FulfillmentEvent;
use medvend::app::orchestrator::FulfillmentOrchestrator;
use medvend::app::ports::{EventSink, PatientStore};
use medvend::config::DispenserConfig;
use medvend::error::{LinkError, StoreError};
use medvend::ledger::InventoryLedger;
use medvend::link::{Line, Link};
use medvend::model::{PatientId, PatientRecord, Prescription, StockEntry};
use medvend::protocol::{DispenserProtocol, ProtocolSettings};

// ── Scripted link ─────────────────────────────────────────────

/// What the fake controller does in response to one command.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Queue these lines for the following `receive` calls.
    Lines(Vec<String>),
    /// Stay silent; the next `receive` times out.
    Silent,
    /// The next `receive` reports a garbled line.
    Garbled,
    /// The cable is pulled; everything afterwards is `NotConnected`.
    Disconnect,
}

pub fn ack(slot: u16) -> Reply {
    Reply::Lines(vec![format!("DISPENSE_COMPLETE:{slot}")])
}

pub fn line(text: &str) -> Reply {
    Reply::Lines(vec![text.to_owned()])
}

#[derive(Debug, Default)]
pub struct LinkLog {
    pub sent: Vec<String>,
    pub clears: u32,
    connected: bool,
    script: VecDeque<Reply>,
    pending: VecDeque<Result<Line, LinkError>>,
}

/// A [`Link`] that answers from a script, one reply per command sent.
#[derive(Clone)]
pub struct ScriptedLink {
    log: Arc<Mutex<LinkLog>>,
}

#[allow(dead_code)]
impl ScriptedLink {
    pub fn new(script: impl IntoIterator<Item = Reply>) -> Self {
        Self {
            log: Arc::new(Mutex::new(LinkLog {
                connected: true,
                script: script.into_iter().collect(),
                ..LinkLog::default()
            })),
        }
    }

    pub fn disconnected() -> Self {
        let link = Self::new([]);
        link.log.lock().unwrap().connected = false;
        link
    }

    /// Leave a stale line in the input buffer, as if left over from an
    /// earlier exchange.
    pub fn inject_stale(&self, text: &str) {
        self.log.lock().unwrap().pending.push_back(Ok(to_line(text)));
    }

    pub fn sent(&self) -> Vec<String> {
        self.log.lock().unwrap().sent.clone()
    }

    pub fn commands_sent(&self) -> usize {
        self.log.lock().unwrap().sent.len()
    }

    pub fn clears(&self) -> u32 {
        self.log.lock().unwrap().clears
    }
}

fn to_line(text: &str) -> Line {
    let mut l = Line::new();
    l.push_str(text).expect("scripted line fits");
    l
}

impl Link for ScriptedLink {
    fn send(&mut self, frame: &[u8]) -> Result<(), LinkError> {
        let mut log = self.log.lock().unwrap();
        if !log.connected {
            return Err(LinkError::NotConnected);
        }
        log.sent.push(String::from_utf8_lossy(frame).into_owned());
        match log.script.pop_front().unwrap_or(Reply::Silent) {
            Reply::Lines(lines) => {
                for l in lines {
                    log.pending.push_back(Ok(to_line(&l)));
                }
            }
            Reply::Silent => {}
            Reply::Garbled => log.pending.push_back(Err(LinkError::Garbled)),
            Reply::Disconnect => log.connected = false,
        }
        Ok(())
    }

    fn receive(&mut self, _timeout: Duration) -> Result<Line, LinkError> {
        let mut log = self.log.lock().unwrap();
        if !log.connected {
            return Err(LinkError::NotConnected);
        }
        log.pending.pop_front().unwrap_or(Err(LinkError::Timeout))
    }

    fn clear_input(&mut self) -> Result<(), LinkError> {
        let mut log = self.log.lock().unwrap();
        if !log.connected {
            return Err(LinkError::NotConnected);
        }
        log.clears += 1;
        log.pending.clear();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.log.lock().unwrap().connected
    }
}

// ── Recording delay ───────────────────────────────────────────

/// Counts settle waits instead of sleeping.
#[derive(Clone, Default)]
pub struct RecordingDelay {
    calls: Arc<AtomicU32>,
    total_ms: Arc<AtomicU32>,
}

#[allow(dead_code)]
impl RecordingDelay {
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn total_ms(&self) -> u32 {
        self.total_ms.load(Ordering::SeqCst)
    }
}

impl DelayNs for RecordingDelay {
    fn delay_ns(&mut self, _ns: u32) {}

    fn delay_ms(&mut self, ms: u32) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.total_ms.fetch_add(ms, Ordering::SeqCst);
    }
}

// ── Failure-injecting store ───────────────────────────────────

/// In-memory store whose lookups or commits can be made to fail.
#[derive(Clone)]
pub struct FlakyStore {
    inner: Arc<Mutex<JsonStore>>,
    fail_patient_lookups: Arc<AtomicBool>,
    fail_stock_lookups: Arc<AtomicBool>,
    fail_commits: Arc<AtomicBool>,
    commits: Arc<AtomicU32>,
}

#[allow(dead_code)]
impl FlakyStore {
    pub fn new(doc: StoreDocument) -> Self {
        Self {
            inner: Arc::new(Mutex::new(JsonStore::in_memory(doc))),
            fail_patient_lookups: Arc::new(AtomicBool::new(false)),
            fail_stock_lookups: Arc::new(AtomicBool::new(false)),
            fail_commits: Arc::new(AtomicBool::new(false)),
            commits: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn fail_patient_lookups(&self, on: bool) {
        self.fail_patient_lookups.store(on, Ordering::SeqCst);
    }

    pub fn fail_stock_lookups(&self, on: bool) {
        self.fail_stock_lookups.store(on, Ordering::SeqCst);
    }

    pub fn fail_commits(&self, on: bool) {
        self.fail_commits.store(on, Ordering::SeqCst);
    }

    /// Commits that reached the inner store.
    pub fn commits(&self) -> u32 {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn stock(&self, slot: u16) -> u32 {
        self.inner.lock().unwrap().lookup_stock(slot).unwrap().available_count
    }

    pub fn balance(&self, id: &str) -> i64 {
        let id = PatientId::parse(id).unwrap();
        self.inner.lock().unwrap().lookup_patient(&id).unwrap().balance_cents
    }
}

impl PatientStore for FlakyStore {
    fn lookup_patient(&self, id: &PatientId) -> Result<PatientRecord, StoreError> {
        if self.fail_patient_lookups.load(Ordering::SeqCst) {
            return Err(StoreError::Unreachable("lookup refused".into()));
        }
        self.inner.lock().unwrap().lookup_patient(id)
    }

    fn lookup_stock(&self, slot: u16) -> Result<StockEntry, StoreError> {
        if self.fail_stock_lookups.load(Ordering::SeqCst) {
            return Err(StoreError::Unreachable("lookup refused".into()));
        }
        self.inner.lock().unwrap().lookup_stock(slot)
    }

    fn commit(
        &mut self,
        patient: &PatientId,
        balance_delta_cents: i64,
        slot: u16,
        stock_delta: i64,
    ) -> Result<(), StoreError> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(StoreError::Unreachable("write refused".into()));
        }
        self.commits.fetch_add(1, Ordering::SeqCst);
        self.inner
            .lock()
            .unwrap()
            .commit(patient, balance_delta_cents, slot, stock_delta)
    }
}

// ── Event sinks ───────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<FulfillmentEvent>>>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn events(&self) -> Vec<FulfillmentEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &FulfillmentEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

/// Cancels `token` as soon as the first outcome is recorded.
pub struct CancelAfterFirst {
    pub token: CancelToken,
}

impl EventSink for CancelAfterFirst {
    fn emit(&mut self, event: &FulfillmentEvent) {
        if let FulfillmentEvent::OutcomeRecorded(_) = event {
            self.token.cancel();
        }
    }
}

/// Blocks the worker at the first session start until released.
pub struct GateSink {
    pub gate: Option<Receiver<()>>,
}

impl EventSink for GateSink {
    fn emit(&mut self, event: &FulfillmentEvent) {
        if let FulfillmentEvent::SessionStarted { .. } = event {
            if let Some(gate) = self.gate.take() {
                let _ = gate.recv();
            }
        }
    }
}

// ── Fixtures ──────────────────────────────────────────────────

/// Two patients; slot 1 well stocked at 5 c/unit, slot 2 holding 5 units,
/// slot 3 stocked at 12 c/unit.
pub fn fixture_document() -> StoreDocument {
    StoreDocument {
        patients: vec![
            PatientRecord {
                id: PatientId::parse("PATIENT_01").unwrap(),
                name: "Ada".into(),
                balance_cents: 10_000,
                prescriptions: vec![
                    Prescription::new("Paracetamol", 20, 1).unwrap(),
                    Prescription::new("Metformin", 30, 3).unwrap(),
                ],
            },
            PatientRecord {
                id: PatientId::parse("PATIENT_02").unwrap(),
                name: "Grace".into(),
                balance_cents: 2_000,
                prescriptions: vec![Prescription::new("Paracetamol", 10, 1).unwrap()],
            },
        ],
        stock: vec![
            StockEntry {
                slot: 1,
                medicine: "Paracetamol".into(),
                available_count: 100,
                unit_cost_cents: 5,
            },
            StockEntry {
                slot: 2,
                medicine: "Ibuprofen".into(),
                available_count: 5,
                unit_cost_cents: 8,
            },
            StockEntry {
                slot: 3,
                medicine: "Metformin".into(),
                available_count: 60,
                unit_cost_cents: 12,
            },
        ],
    }
}

pub fn settings() -> ProtocolSettings {
    ProtocolSettings::from(&DispenserConfig::default())
}

pub fn protocol(link: ScriptedLink) -> (DispenserProtocol<ScriptedLink, RecordingDelay>, RecordingDelay) {
    let delay = RecordingDelay::default();
    (DispenserProtocol::new(link, delay.clone(), settings()), delay)
}

pub fn orchestrator(
    link: ScriptedLink,
    store: FlakyStore,
) -> FulfillmentOrchestrator<ScriptedLink, RecordingDelay, FlakyStore> {
    let (protocol, _) = protocol(link);
    FulfillmentOrchestrator::new(protocol, InventoryLedger::new(store))
}

pub fn patient(id: &str) -> PatientId {
    PatientId::parse(id).unwrap()
}

pub fn rx(medicine: &str, quantity: u32, slot: u16) -> Prescription {
    Prescription::new(medicine, quantity, slot).unwrap()
}
