//! Network leak probes
//!
//! Client-side halves of the leak detection surface: WebRTC ICE gathering
//! with local classification, plus the fetch client for the backend
//! analysis service (IP, DNS, cross-checks). The pure classification logic
//! lives in [`classify`] so it stays testable off-browser.

pub mod backend;
pub mod classify;
pub mod webrtc;

use serde::{Deserialize, Serialize};

/// Severity of one reported risk
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// One adverse finding attached to a leak probe result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Risk {
    pub severity: Severity,
    pub title: String,
    pub description: String,
}

impl Risk {
    pub fn new(severity: Severity, title: &str, description: &str) -> Self {
        Self {
            severity,
            title: title.to_string(),
            description: description.to_string(),
        }
    }
}
