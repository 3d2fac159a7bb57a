//! Browser configuration disclosure surface
//!
//! Reads the navigator/screen fields a page can see without any rendering
//! trick. Unlike the fingerprint collectors this produces no hash: each
//! field is a disclosure signal consumed directly by the browser-config
//! score category.

use js_sys::Reflect;
use serde::{Deserialize, Serialize};
use wasm_bindgen::JsValue;

/// What the navigator/screen surface discloses to any page
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserConfigReport {
    /// Do-Not-Track actively enabled by the user
    pub do_not_track: bool,
    pub cookies_enabled: bool,
    pub language_count: u32,
    pub primary_language: String,
    /// `navigator.hardwareConcurrency`; `None` when the field is hidden
    pub hardware_concurrency: Option<u32>,
    /// `navigator.deviceMemory` (Chromium only); `None` when absent
    pub device_memory_gb: Option<f64>,
    pub plugin_count: u32,
    pub platform: String,
    pub user_agent: String,
    pub screen_width: u32,
    pub screen_height: u32,
    pub color_depth: u32,
}

pub struct BrowserConfigProbe;

impl BrowserConfigProbe {
    /// Read the disclosure surface. `None` outside a browser page.
    pub async fn detect() -> Option<BrowserConfigReport> {
        let window = web_sys::window()?;
        let navigator = window.navigator();

        let languages = navigator.languages();
        let do_not_track = dnt_enabled(
            Reflect::get(&navigator, &JsValue::from_str("doNotTrack"))
                .ok()
                .and_then(|v| v.as_string())
                .as_deref(),
        );
        let device_memory_gb = Reflect::get(&navigator, &JsValue::from_str("deviceMemory"))
            .ok()
            .and_then(|v| v.as_f64());
        let plugin_count = Reflect::get(&navigator, &JsValue::from_str("plugins"))
            .ok()
            .and_then(|plugins| Reflect::get(&plugins, &JsValue::from_str("length")).ok())
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0) as u32;

        let hardware_concurrency = match navigator.hardware_concurrency() {
            c if c > 0.0 => Some(c as u32),
            _ => None,
        };

        let (screen_width, screen_height, color_depth) = match window.screen() {
            Ok(screen) => (
                screen.width().unwrap_or(0).max(0) as u32,
                screen.height().unwrap_or(0).max(0) as u32,
                screen.color_depth().unwrap_or(0).max(0) as u32,
            ),
            Err(_) => (0, 0, 0),
        };

        Some(BrowserConfigReport {
            do_not_track,
            cookies_enabled: Reflect::get(&navigator, &JsValue::from_str("cookieEnabled"))
                .ok()
                .and_then(|v| v.as_bool())
                .unwrap_or(false),
            language_count: languages.length(),
            primary_language: navigator.language().unwrap_or_default(),
            hardware_concurrency,
            device_memory_gb,
            plugin_count,
            platform: navigator.platform().unwrap_or_default(),
            user_agent: navigator.user_agent().unwrap_or_default(),
            screen_width,
            screen_height,
            color_depth,
        })
    }
}

/// `navigator.doNotTrack` is a string with legacy spellings
fn dnt_enabled(value: Option<&str>) -> bool {
    matches!(value, Some("1") | Some("yes"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dnt_spellings() {
        assert!(dnt_enabled(Some("1")));
        assert!(dnt_enabled(Some("yes")));
        assert!(!dnt_enabled(Some("0")));
        assert!(!dnt_enabled(Some("unspecified")));
        assert!(!dnt_enabled(None));
    }
}
