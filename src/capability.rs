//! Per-run browser capability table
//!
//! Feature presence is resolved once at scan start and consumed everywhere
//! else as plain data. Probes never repeat `typeof`-style runtime checks;
//! they branch on this table, which keeps the feature matrix testable
//! without a live browser per check.

use js_sys::Reflect;
use serde::{Deserialize, Serialize};
use wasm_bindgen::JsValue;

/// Which probe-relevant browser APIs exist in this environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityTable {
    pub dom: bool,
    pub canvas_2d: bool,
    pub webgl: bool,
    pub offline_audio: bool,
    pub webrtc: bool,
    pub fetch: bool,
}

impl CapabilityTable {
    /// Resolve the table against the live browser global.
    ///
    /// Absence of any API is a normal outcome, never an error.
    pub fn probe() -> Self {
        let global = js_sys::global();
        let has = |name: &str| {
            Reflect::get(&global, &JsValue::from_str(name))
                .map(|v| !v.is_undefined() && !v.is_null())
                .unwrap_or(false)
        };

        let dom = web_sys::window()
            .and_then(|w| w.document())
            .is_some();

        CapabilityTable {
            dom,
            canvas_2d: dom && has("CanvasRenderingContext2D"),
            webgl: dom && has("WebGLRenderingContext"),
            offline_audio: has("OfflineAudioContext") || has("webkitOfflineAudioContext"),
            webrtc: has("RTCPeerConnection")
                || has("webkitRTCPeerConnection")
                || has("mozRTCPeerConnection"),
            fetch: has("fetch"),
        }
    }

    /// Table with every capability present (test environments)
    pub fn full() -> Self {
        CapabilityTable {
            dom: true,
            canvas_2d: true,
            webgl: true,
            offline_audio: true,
            webrtc: true,
            fetch: true,
        }
    }

    /// Table with every capability absent (headless / locked-down)
    pub fn empty() -> Self {
        CapabilityTable {
            dom: false,
            canvas_2d: false,
            webgl: false,
            offline_audio: false,
            webrtc: false,
            fetch: false,
        }
    }

    /// Number of probe-relevant APIs present, for log lines
    pub fn present_count(&self) -> u32 {
        [
            self.dom,
            self.canvas_2d,
            self.webgl,
            self.offline_audio,
            self.webrtc,
            self.fetch,
        ]
        .iter()
        .filter(|&&b| b)
        .count() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors() {
        assert_eq!(CapabilityTable::full().present_count(), 6);
        assert_eq!(CapabilityTable::empty().present_count(), 0);
    }

    #[test]
    fn test_serialization_shape() {
        let json = serde_json::to_string(&CapabilityTable::full()).unwrap();
        assert!(json.contains("\"canvas2d\":true"));
        assert!(json.contains("\"offlineAudio\":true"));
    }
}
