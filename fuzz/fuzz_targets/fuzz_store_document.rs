//! Fuzz target: store document deserialization
//!
//! Arbitrary JSON must either be rejected or yield records whose
//! prescriptions and patient ids already passed validation.
//!
//! cargo fuzz run fuzz_store_document

#![no_main]

use libfuzzer_sys::fuzz_target;
use medvend::adapters::json_store::StoreDocument;
use medvend::model::PatientId;

fuzz_target!(|data: &[u8]| {
    let Ok(doc) = serde_json::from_slice::<StoreDocument>(data) else {
        return;
    };
    for patient in &doc.patients {
        assert!(PatientId::parse(patient.id.as_str()).is_ok());
        for rx in &patient.prescriptions {
            assert!(rx.quantity() > 0);
            assert!(!rx.medicine().trim().is_empty());
        }
    }
});
