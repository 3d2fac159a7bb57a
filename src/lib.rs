//! # leakscope
//!
//! A browser-side privacy diagnostic engine compiled to WebAssembly.
//!
//! The engine probes the visiting browser for information leaks and
//! re-identification surfaces, normalizes the findings into comparable
//! scores, and aggregates them into a single 0–100 privacy index.
//!
//! ## Architecture
//!
//! ```text
//! PrivacyScanner (WASM)
//!   ↓
//! Scanner / ScanRun (orchestration: fan-out, progress, cancellation)
//!   ↓                         ↓
//! Fingerprint collectors   Network probes
//! (canvas, WebGL, audio,   (WebRTC ICE gathering; IP/DNS via the
//!  fonts, browser config)   backend analysis service)
//!   ↓                         ↓
//! PrivacyScoreAggregator (pure, config-driven)
//! ```
//!
//! ## Properties
//!
//! - **Typed degradation**: a missing browser API is `supported: false`,
//!   never a thrown error, and is scored optimistically
//! - **Bounded waits**: ICE gathering and backend fetches carry hard
//!   timeouts and resolve to inconclusive results
//! - **Run isolation**: every scan allocates fresh canvas/audio/peer
//!   resources and releases them before its promise resolves
//! - **Cancellation safety**: probes resolving after `cancel()` are
//!   discarded without touching shared state

use wasm_bindgen::prelude::*;

// Modules
pub mod capability;
pub mod collectors;
mod error;
pub mod net;
pub mod sample;
pub mod scan;
pub mod score;
pub mod timing;

pub use capability::CapabilityTable;
pub use collectors::audio::AudioFingerprinter;
pub use collectors::browser_config::{BrowserConfigProbe, BrowserConfigReport};
pub use collectors::canvas::CanvasFingerprinter;
pub use collectors::fonts::{FontFingerprinter, REFERENCE_FONTS};
pub use collectors::webgl::WebGlFingerprinter;
pub use error::{ErrorCode, ErrorInfo, ProbeError, Result};
pub use net::backend::{
    AnalysisBackend, DnsLeakResult, DnsResolver, FetchTransport, GeoInfo, HttpTransport,
    IpLeakResult, LeakType, NetworkInfo, NetworkInsights, PrivacyFlags, WebRtcAnalysis,
};
pub use net::classify::{
    analyze_candidates, classify_address, nat_type_from_candidates, parse_candidate, AddressScope,
    CandidateType, IceCandidate, NatType, WebRtcLeakReport, WebRtcObservation,
};
pub use net::webrtc::{WebRtcLeakDetector, DEFAULT_GATHER_TIMEOUT_MS, DEFAULT_STUN_SERVERS};
pub use net::{Risk, Severity};
pub use sample::{approx_entropy_bits, FeatureValue, FingerprintFamily, FingerprintSample};
pub use scan::{
    CancelToken, ProbeId, ProbeRecord, ProbeStatus, ScanConfig, ScanResults, ScanRun, Scanner,
};
pub use score::{risk_level_for, score, PrivacyScore, RiskLevel, ScoreBreakdown, ScoreConfig};

/// Initialize the engine.
///
/// Sets up console logging; safe to call more than once.
#[wasm_bindgen(start)]
pub fn init() {
    let _ = console_log::init_with_level(log::Level::Info);
    log::info!("leakscope engine initialized");
}

fn to_js<T: serde::Serialize>(value: &T) -> std::result::Result<JsValue, JsValue> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|e| JsValue::from_str(&format!("serialization failed: {}", e)))
}

/// JS-facing scanner handle.
///
/// One handle can run many scans; each `scan()` call gets a fresh
/// cancellation token, so `cancel()` only affects the run in flight.
#[wasm_bindgen]
pub struct PrivacyScanner {
    scanner: Scanner,
    token: CancelToken,
}

#[wasm_bindgen]
impl PrivacyScanner {
    /// Create a scanner.
    ///
    /// `options` is an optional plain object mirroring [`ScanConfig`]:
    /// ```javascript
    /// new PrivacyScanner({ backendUrl: "https://analysis.example",
    ///                      claimsAnonymization: true });
    /// ```
    #[wasm_bindgen(constructor)]
    pub fn new(options: JsValue) -> std::result::Result<PrivacyScanner, JsValue> {
        let config: ScanConfig = if options.is_undefined() || options.is_null() {
            ScanConfig::default()
        } else {
            serde_wasm_bindgen::from_value(options)
                .map_err(|e| JsValue::from_str(&format!("invalid scan options: {}", e)))?
        };

        Ok(PrivacyScanner {
            scanner: Scanner::with_config(config),
            token: CancelToken::new(),
        })
    }

    /// Resolve the capability table for this environment
    pub fn capabilities(&self) -> std::result::Result<JsValue, JsValue> {
        to_js(&CapabilityTable::probe())
    }

    /// Run the full scan.
    ///
    /// `on_progress`, when given, receives a 0–100 percentage as probes
    /// complete. Resolves to the finished [`ScanRun`].
    pub async fn scan(
        &mut self,
        on_progress: Option<js_sys::Function>,
    ) -> std::result::Result<JsValue, JsValue> {
        self.token = CancelToken::new();

        let callback = on_progress.map(|f| {
            Box::new(move |percent: u32| {
                let _ = f.call1(&JsValue::NULL, &JsValue::from_f64(percent as f64));
            }) as scan::ProgressCallback
        });

        let run = self.scanner.run(self.token.clone(), callback).await;
        to_js(&run)
    }

    /// Cancel the scan in flight; late probe results are discarded
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Run only the canvas fingerprint probe
    pub async fn detect_canvas(&self) -> std::result::Result<JsValue, JsValue> {
        to_js(&CanvasFingerprinter::detect(&CapabilityTable::probe()).await)
    }

    /// Run only the WebGL fingerprint probe
    pub async fn detect_webgl(&self) -> std::result::Result<JsValue, JsValue> {
        to_js(&WebGlFingerprinter::detect(&CapabilityTable::probe()).await)
    }

    /// Run only the audio fingerprint probe
    pub async fn detect_audio(&self) -> std::result::Result<JsValue, JsValue> {
        to_js(&AudioFingerprinter::detect(&CapabilityTable::probe()).await)
    }

    /// Run only the font enumeration probe
    pub async fn detect_fonts(&self) -> std::result::Result<JsValue, JsValue> {
        to_js(&FontFingerprinter::detect(&CapabilityTable::probe()).await)
    }

    /// Run only the WebRTC leak probe
    pub async fn detect_webrtc(&self) -> std::result::Result<JsValue, JsValue> {
        let detector = WebRtcLeakDetector::with_config(
            DEFAULT_STUN_SERVERS.iter().map(|s| s.to_string()).collect(),
            self.scanner.config().gather_timeout_ms,
        );
        to_js(&detector.detect_all(&CapabilityTable::probe()).await)
    }
}
