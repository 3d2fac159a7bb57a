//! Privacy engine WASM integration tests
//!
//! Run with: wasm-pack test --headless --chrome
//! (or --firefox, --safari)

#![cfg(target_arch = "wasm32")]

use std::cell::RefCell;
use std::rc::Rc;

use wasm_bindgen_test::*;

use leakscope_wasm::{
    AudioFingerprinter, CancelToken, CanvasFingerprinter, CapabilityTable, FontFingerprinter,
    NatType, ProbeStatus, Scanner, WebGlFingerprinter, WebRtcLeakDetector, REFERENCE_FONTS,
};

wasm_bindgen_test_configure!(run_in_browser);

// ===== Capability Table =====

#[wasm_bindgen_test]
fn capability_table_resolves_in_browser() {
    let caps = CapabilityTable::probe();
    assert!(caps.dom, "test runner should expose a document");
    assert!(caps.fetch, "test runner should expose fetch");
    // Resolved once, consumed as data: probing twice must agree
    assert_eq!(caps, CapabilityTable::probe());
}

// ===== Fingerprint Collectors =====

#[wasm_bindgen_test]
async fn canvas_detect_is_deterministic() {
    let caps = CapabilityTable::probe();
    let a = CanvasFingerprinter::detect(&caps).await;
    let b = CanvasFingerprinter::detect(&caps).await;
    assert_eq!(a.supported, b.supported);
    assert_eq!(a.hash, b.hash, "same environment must produce same hash");
}

#[wasm_bindgen_test]
async fn canvas_respects_capability_table() {
    // An empty table must short-circuit to the typed unsupported outcome
    let sample = CanvasFingerprinter::detect(&CapabilityTable::empty()).await;
    assert!(!sample.supported);
    assert!(sample.hash.is_empty());
}

#[wasm_bindgen_test]
async fn webgl_detect_never_throws() {
    let caps = CapabilityTable::probe();
    let sample = WebGlFingerprinter::detect(&caps).await;
    // Headless runners may lack a GL context; either way the outcome is typed
    if sample.supported {
        assert!(!sample.hash.is_empty());
        assert!(sample.raw_features.contains_key("renderer"));
    } else {
        assert!(sample.hash.is_empty());
    }
}

#[wasm_bindgen_test]
async fn audio_detect_is_deterministic() {
    let caps = CapabilityTable::probe();
    let a = AudioFingerprinter::detect(&caps).await;
    let b = AudioFingerprinter::detect(&caps).await;
    assert_eq!(a.hash, b.hash);
}

#[wasm_bindgen_test]
async fn fonts_detect_stays_within_reference_list() {
    let caps = CapabilityTable::probe();
    let sample = FontFingerprinter::detect(&caps).await;
    if sample.supported {
        let count = match sample.raw_features.get("fontCount") {
            Some(leakscope_wasm::FeatureValue::Int(n)) => *n,
            other => panic!("fontCount missing or mistyped: {:?}", other),
        };
        assert!(count >= 0 && count as usize <= REFERENCE_FONTS.len());
        assert!(sample.entropy_bits.is_some());
    }
}

// ===== WebRTC Probe =====

#[wasm_bindgen_test]
async fn webrtc_unsupported_capability_is_unknown_nat() {
    let detector = WebRtcLeakDetector::new();
    let report = detector.detect_all(&CapabilityTable::empty()).await;
    assert!(!report.supported);
    assert!(!report.is_leak);
    assert_eq!(report.nat_type, NatType::Unknown);
}

#[wasm_bindgen_test]
async fn webrtc_gathering_terminates_within_deadline() {
    // Unroutable STUN server: the probe must resolve via its own timeout,
    // with a typed inconclusive result
    let detector =
        WebRtcLeakDetector::with_config(vec!["stun:192.0.2.1:3478".to_string()], 1_500);
    let report = detector.detect_all(&CapabilityTable::probe()).await;
    assert!(report.supported);
    // Host candidates may still have surfaced; the point is termination
    // with a well-typed report
    let _ = report.nat_type;
}

// ===== Scan Orchestration =====

#[wasm_bindgen_test]
async fn offline_scan_reaches_terminal_states() {
    // No backend configured: six local probes, no IP/DNS records
    let scanner = Scanner::new();
    let run = scanner.run(CancelToken::new(), None).await;

    assert_eq!(run.records.len(), 6);
    assert!(run
        .records
        .values()
        .all(|r| matches!(r.status, ProbeStatus::Passed | ProbeStatus::Failed)));
    assert_eq!(run.progress, 100);
    assert!(!run.cancelled);

    let b = &run.score.breakdown;
    assert_eq!(
        run.score.total,
        b.ip_privacy + b.dns_privacy + b.webrtc_privacy + b.fingerprint_resistance
            + b.browser_config
    );
}

#[wasm_bindgen_test]
async fn progress_reports_monotonically() {
    let seen: Rc<RefCell<Vec<u32>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();

    let scanner = Scanner::new();
    let run = scanner
        .run(
            CancelToken::new(),
            Some(Box::new(move |percent| sink.borrow_mut().push(percent))),
        )
        .await;

    let seen = seen.borrow();
    assert!(!seen.is_empty());
    assert!(seen.windows(2).all(|w| w[0] <= w[1]), "progress regressed");
    assert_eq!(*seen.last().unwrap(), 100);
    assert_eq!(run.progress, 100);
}

#[wasm_bindgen_test]
async fn cancelled_scan_discards_all_updates() {
    let token = CancelToken::new();
    token.cancel();

    let scanner = Scanner::new();
    let run = scanner.run(token, None).await;

    assert!(run.cancelled);
    assert_eq!(run.progress, 0);
    assert!(run.results.canvas.is_none());
    assert!(run.results.webrtc.is_none());
    // Records stay frozen: nothing reached a terminal state after cancel
    assert!(run
        .records
        .values()
        .all(|r| !matches!(r.status, ProbeStatus::Passed | ProbeStatus::Failed)));
}
