//! Fulfillment sessions: per-medicine pipeline, ledger reconciliation and
//! halting behaviour.

use medvend::app::commands::CancelToken;
use medvend::app::events::FulfillmentEvent;
use medvend::app::ports::NullSink;
use medvend::app::stage::MedicineStage;
use medvend::error::{LedgerError, OrchestrationError};
use medvend::model::DispenseStatus;

use crate::mock_hw::{
    CancelAfterFirst, FlakyStore, RecordingSink, Reply, ScriptedLink, ack, fixture_document, line,
    orchestrator, patient, rx,
};

#[test]
fn partial_failure_deducts_only_delivered_chunks() {
    let store = FlakyStore::new(fixture_document());
    let link = ScriptedLink::new([ack(1), Reply::Silent]);
    let mut o = orchestrator(link.clone(), store.clone());

    let report = o
        .fulfill(
            &patient("PATIENT_01"),
            &[rx("Paracetamol", 30, 1)],
            &CancelToken::new(),
            &mut NullSink,
        )
        .unwrap();

    let outcome = &report.outcomes[0];
    assert_eq!(outcome.status(), DispenseStatus::Partial);
    assert_eq!(outcome.chunks_completed(), 1);
    assert_eq!(link.commands_sent(), 2);
    assert_eq!(store.stock(1), 90);
    assert_eq!(store.balance("PATIENT_01"), 10_000 - 10 * 5);
}

#[test]
fn insufficient_stock_does_not_block_next_medicine() {
    let store = FlakyStore::new(fixture_document());
    let link = ScriptedLink::new([ack(1)]);
    let mut o = orchestrator(link.clone(), store.clone());

    let report = o
        .fulfill(
            &patient("PATIENT_01"),
            &[rx("Ibuprofen", 10, 2), rx("Paracetamol", 10, 1)],
            &CancelToken::new(),
            &mut NullSink,
        )
        .unwrap();

    assert_eq!(report.outcomes[0].status(), DispenseStatus::InsufficientStock);
    assert_eq!(report.outcomes[1].status(), DispenseStatus::Complete);
    assert_eq!(link.sent(), vec!["DISPENSE:1\n"]);
    assert_eq!(store.stock(2), 5);
    assert_eq!(store.stock(1), 90);
}

#[test]
fn disconnected_dispenser_commits_nothing() {
    let store = FlakyStore::new(fixture_document());
    let mut o = orchestrator(ScriptedLink::disconnected(), store.clone());

    let report = o
        .fulfill_patient("PATIENT_01", &CancelToken::new(), &mut NullSink)
        .unwrap();

    assert!(
        report
            .outcomes
            .iter()
            .all(|r| r.status() == DispenseStatus::HardwareUnavailable)
    );
    assert_eq!(store.commits(), 0, "zero-delta commits skip the store");
    assert_eq!(store.balance("PATIENT_01"), 10_000);
}

#[test]
fn commit_failure_halts_with_alert() {
    let store = FlakyStore::new(fixture_document());
    store.fail_commits(true);
    let link = ScriptedLink::new([ack(1), ack(1), ack(3)]);
    let mut o = orchestrator(link.clone(), store.clone());
    let mut sink = RecordingSink::default();

    let err = o
        .fulfill_patient("PATIENT_01", &CancelToken::new(), &mut sink)
        .unwrap_err();

    let OrchestrationError::Reconciliation { outcomes, alert } = &err else {
        panic!("expected reconciliation, got {err:?}");
    };
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].status(), DispenseStatus::Complete);
    assert_eq!(alert.units_unrecorded, 20);
    assert_eq!(alert.cost_cents_unrecorded, 100);
    assert_eq!(alert.slot, 1);
    assert_eq!(link.commands_sent(), 2, "second medicine never started");
    assert!(
        sink.events()
            .iter()
            .any(|e| matches!(e, FulfillmentEvent::ReconciliationRequired(_)))
    );
}

#[test]
fn store_outage_before_dispense_aborts_without_motion() {
    let store = FlakyStore::new(fixture_document());
    let link = ScriptedLink::new([ack(1), ack(1)]);
    let mut o = orchestrator(link.clone(), store.clone());
    let id = patient("PATIENT_01");

    let first = o
        .fulfill(&id, &[rx("Paracetamol", 20, 1)], &CancelToken::new(), &mut NullSink)
        .unwrap();
    assert_eq!(first.outcomes.len(), 1);

    store.fail_stock_lookups(true);
    let err = o
        .fulfill(
            &id,
            &[rx("Metformin", 10, 3), rx("Paracetamol", 10, 1)],
            &CancelToken::new(),
            &mut NullSink,
        )
        .unwrap_err();

    assert!(matches!(
        err,
        OrchestrationError::StoreUnavailable {
            source: LedgerError::SyncFailure(_),
            ..
        }
    ));
    assert!(err.outcomes().is_empty());
    assert_eq!(link.commands_sent(), 2);
}

#[test]
fn cancellation_is_observed_between_medicines() {
    let store = FlakyStore::new(fixture_document());
    let link = ScriptedLink::new([ack(1), ack(1)]);
    let mut o = orchestrator(link.clone(), store);
    let token = CancelToken::new();
    let mut sink = CancelAfterFirst {
        token: token.clone(),
    };

    let report = o.fulfill_patient("PATIENT_01", &token, &mut sink).unwrap();

    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(report.outcomes[0].status(), DispenseStatus::Complete);
    assert_eq!(report.skipped, vec!["Metformin"]);
    assert!(report.cancelled());
    assert_eq!(link.commands_sent(), 2);
}

#[test]
fn events_follow_the_stage_pipeline() {
    let store = FlakyStore::new(fixture_document());
    let mut o = orchestrator(ScriptedLink::new([ack(1)]), store);
    let mut sink = RecordingSink::default();

    o.fulfill(
        &patient("PATIENT_02"),
        &[rx("Paracetamol", 10, 1), rx("Ibuprofen", 50, 2)],
        &CancelToken::new(),
        &mut sink,
    )
    .unwrap();

    let stages: Vec<(String, MedicineStage)> = sink
        .events()
        .into_iter()
        .filter_map(|e| match e {
            FulfillmentEvent::StageChanged { medicine, to, .. } => Some((medicine, to)),
            _ => None,
        })
        .collect();
    use MedicineStage::*;
    assert_eq!(
        stages,
        vec![
            ("Paracetamol".into(), Reserving),
            ("Paracetamol".into(), Dispensing),
            ("Paracetamol".into(), Committing),
            ("Paracetamol".into(), Done),
            ("Ibuprofen".into(), Reserving),
            ("Ibuprofen".into(), Committing),
            ("Ibuprofen".into(), Done),
        ]
    );

    let events = sink.events();
    assert!(matches!(
        events.first(),
        Some(FulfillmentEvent::SessionStarted { medicines: 2, .. })
    ));
    assert!(matches!(
        events.last(),
        Some(FulfillmentEvent::SessionFinished {
            complete: 1,
            total: 2,
            ..
        })
    ));
}

#[test]
fn ledger_view_tracks_commits() {
    let store = FlakyStore::new(fixture_document());
    let link = ScriptedLink::new([line("BUSY"), ack(3), ack(3), ack(3)]);
    let mut o = orchestrator(link, store);
    let id = patient("PATIENT_01");

    o.fulfill_patient(id.as_str(), &CancelToken::new(), &mut NullSink)
        .unwrap();

    // Paracetamol hit a busy controller, Metformin got all three chunks.
    assert_eq!(o.ledger().available(1), Some(100));
    assert_eq!(o.ledger().available(3), Some(30));
    assert_eq!(o.ledger().balance(&id), Some(10_000 - 30 * 12));
}

#[test]
fn unknown_patient_with_explicit_list_is_refused_before_motion() {
    let store = FlakyStore::new(fixture_document());
    let link = ScriptedLink::new([ack(1), ack(1)]);
    let mut o = orchestrator(link.clone(), store.clone());

    let err = o
        .fulfill(
            &patient("GHOST"),
            &[rx("Paracetamol", 20, 1)],
            &CancelToken::new(),
            &mut NullSink,
        )
        .unwrap_err();

    assert!(matches!(
        err,
        OrchestrationError::PatientLookup(LedgerError::PatientNotFound(_))
    ));
    assert_eq!(link.commands_sent(), 0);
    assert_eq!(store.commits(), 0);
    assert_eq!(store.stock(1), 100);
}

#[test]
fn unreachable_patient_lookup_is_refused_before_motion() {
    let store = FlakyStore::new(fixture_document());
    store.fail_patient_lookups(true);
    let link = ScriptedLink::new([ack(1), ack(1)]);
    let mut o = orchestrator(link.clone(), store);

    let err = o
        .fulfill(
            &patient("PATIENT_01"),
            &[rx("Paracetamol", 20, 1)],
            &CancelToken::new(),
            &mut NullSink,
        )
        .unwrap_err();

    assert!(matches!(
        err,
        OrchestrationError::PatientLookup(LedgerError::SyncFailure(_))
    ));
    assert_eq!(link.commands_sent(), 0);
}

#[test]
fn slot_holding_another_medicine_is_rejected() {
    let store = FlakyStore::new(fixture_document());
    let link = ScriptedLink::new([ack(3)]);
    let mut o = orchestrator(link.clone(), store.clone());

    let report = o
        .fulfill(
            &patient("PATIENT_01"),
            &[rx("Warfarin", 20, 1), rx("Metformin", 10, 3)],
            &CancelToken::new(),
            &mut NullSink,
        )
        .unwrap();

    assert_eq!(report.outcomes[0].status(), DispenseStatus::Rejected);
    assert_eq!(report.outcomes[0].units_dispensed(), 0);
    assert_eq!(report.outcomes[1].status(), DispenseStatus::Complete);
    assert_eq!(link.sent(), vec!["DISPENSE:3\n"]);
    assert_eq!(store.stock(1), 100);
    assert_eq!(store.balance("PATIENT_01"), 10_000 - 10 * 12);
}

#[test]
fn overflowing_charge_raises_alert_instead_of_panicking() {
    let mut doc = fixture_document();
    doc.stock[0].unit_cost_cents = i64::MAX / 5;
    let store = FlakyStore::new(doc);
    let link = ScriptedLink::new([ack(1), ack(1)]);
    let mut o = orchestrator(link.clone(), store.clone());

    let err = o
        .fulfill(
            &patient("PATIENT_01"),
            &[rx("Paracetamol", 20, 1)],
            &CancelToken::new(),
            &mut NullSink,
        )
        .unwrap_err();

    let OrchestrationError::Reconciliation { outcomes, alert } = &err else {
        panic!("expected reconciliation, got {err:?}");
    };
    assert_eq!(outcomes[0].status(), DispenseStatus::Complete);
    assert_eq!(alert.units_unrecorded, 20);
    assert_eq!(alert.cost_cents_unrecorded, i64::MAX);
    assert_eq!(link.commands_sent(), 2);
    assert_eq!(store.commits(), 0);
    assert_eq!(store.stock(1), 100);
    assert_eq!(store.balance("PATIENT_01"), 10_000);
}
