//! Composite privacy scoring
//!
//! Pure aggregation over whatever probe results exist: each weighted
//! category starts at its maximum and takes fixed, independent, additive
//! deductions, clamped to `[0, category_max]`. Missing inputs score at
//! full credit — "unknown" is optimistic — so the function is total over
//! any subset of inputs, and trivially order-independent.
//!
//! All deduction values and uniqueness thresholds live in [`ScoreConfig`];
//! the defaults are illustrative, not calibrated entropy estimates.

use serde::{Deserialize, Serialize};

use crate::collectors::browser_config::BrowserConfigReport;
use crate::net::backend::{DnsLeakResult, IpLeakResult, LeakType};
use crate::net::classify::WebRtcLeakReport;
use crate::sample::FingerprintSample;

/// Discrete risk tier derived from the score ratio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

/// Per-category scores; sums to `total` by construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBreakdown {
    pub ip_privacy: u32,
    pub dns_privacy: u32,
    pub webrtc_privacy: u32,
    pub fingerprint_resistance: u32,
    pub browser_config: u32,
}

/// The composite 0–100 privacy index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivacyScore {
    pub total: u32,
    pub risk_level: RiskLevel,
    pub breakdown: ScoreBreakdown,
}

/// Category maxima, deduction table and uniqueness thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScoreConfig {
    pub ip_max: u32,
    pub dns_max: u32,
    pub webrtc_max: u32,
    pub fingerprint_max: u32,
    pub browser_max: u32,

    pub ip_no_anonymization: u32,
    pub ip_claimed_ineffective: u32,
    pub ip_blacklisted: u32,

    pub dns_full_leak: u32,
    pub dns_partial_leak: u32,
    pub dns_plain_transport: u32,

    pub webrtc_local_ip: u32,
    pub webrtc_public_ip: u32,
    pub webrtc_mdns: u32,
    pub webrtc_ipv6: u32,

    pub canvas_deduction: u32,
    pub webgl_deduction: u32,
    pub audio_deduction: u32,
    pub fonts_deduction: u32,

    /// Entropy cutoffs (bits) above which a fingerprint counts as
    /// high-uniqueness. Heuristic approximations.
    pub canvas_entropy_threshold: f64,
    pub webgl_entropy_threshold: f64,
    pub audio_entropy_threshold: f64,
    pub fonts_entropy_threshold: f64,

    pub browser_dnt_disabled: u32,
    pub browser_hardware_disclosure: u32,
    pub browser_device_memory: u32,
    pub browser_plugins: u32,
    pub browser_languages: u32,
}

impl Default for ScoreConfig {
    fn default() -> Self {
        Self {
            ip_max: 20,
            dns_max: 15,
            webrtc_max: 15,
            fingerprint_max: 30,
            browser_max: 20,

            ip_no_anonymization: 10,
            ip_claimed_ineffective: 5,
            ip_blacklisted: 5,

            dns_full_leak: 15,
            dns_partial_leak: 8,
            dns_plain_transport: 3,

            webrtc_local_ip: 3,
            webrtc_public_ip: 5,
            webrtc_mdns: 4,
            webrtc_ipv6: 3,

            canvas_deduction: 5,
            webgl_deduction: 5,
            audio_deduction: 3,
            fonts_deduction: 2,

            canvas_entropy_threshold: 6.0,
            webgl_entropy_threshold: 8.0,
            audio_entropy_threshold: 4.0,
            fonts_entropy_threshold: 8.0,

            browser_dnt_disabled: 4,
            browser_hardware_disclosure: 4,
            browser_device_memory: 4,
            browser_plugins: 4,
            browser_languages: 4,
        }
    }
}

impl ScoreConfig {
    pub fn max_total(&self) -> u32 {
        self.ip_max + self.dns_max + self.webrtc_max + self.fingerprint_max + self.browser_max
    }
}

/// Everything the aggregator may consume; every field optional
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreInputs<'a> {
    pub canvas: Option<&'a FingerprintSample>,
    pub webgl: Option<&'a FingerprintSample>,
    pub audio: Option<&'a FingerprintSample>,
    pub fonts: Option<&'a FingerprintSample>,
    pub webrtc: Option<&'a WebRtcLeakReport>,
    pub ip: Option<&'a IpLeakResult>,
    pub dns: Option<&'a DnsLeakResult>,
    pub browser: Option<&'a BrowserConfigReport>,
    /// The user's declared expectation (VPN/proxy/Tor active)
    pub claims_anonymization: bool,
}

/// Map a total onto its tier. Breakpoints are percentages of the maximum;
/// exact boundary values resolve to the better tier.
pub fn risk_level_for(total: u32, max_total: u32) -> RiskLevel {
    let ratio = total as f64 / max_total.max(1) as f64;
    if ratio >= 0.80 {
        RiskLevel::Low
    } else if ratio >= 0.60 {
        RiskLevel::Medium
    } else if ratio >= 0.40 {
        RiskLevel::High
    } else {
        RiskLevel::Critical
    }
}

/// Compute the composite score for whatever inputs are present
pub fn score(inputs: &ScoreInputs<'_>, config: &ScoreConfig) -> PrivacyScore {
    let breakdown = ScoreBreakdown {
        ip_privacy: ip_category(inputs, config),
        dns_privacy: dns_category(inputs.dns, config),
        webrtc_privacy: webrtc_category(inputs.webrtc, config),
        fingerprint_resistance: fingerprint_category(inputs, config),
        browser_config: browser_category(inputs.browser, config),
    };

    let total = breakdown.ip_privacy
        + breakdown.dns_privacy
        + breakdown.webrtc_privacy
        + breakdown.fingerprint_resistance
        + breakdown.browser_config;

    PrivacyScore {
        total,
        risk_level: risk_level_for(total, config.max_total()),
        breakdown,
    }
}

fn ip_category(inputs: &ScoreInputs<'_>, config: &ScoreConfig) -> u32 {
    let ip = match inputs.ip {
        Some(ip) => ip,
        None => return config.ip_max,
    };

    let mut deductions = 0;
    if !ip.privacy.any_anonymization() {
        deductions += config.ip_no_anonymization;
        if inputs.claims_anonymization {
            // Claimed VPN/proxy/Tor, but the exit address shows none of it
            deductions += config.ip_claimed_ineffective;
        }
    }
    if ip.privacy.is_blacklisted {
        deductions += config.ip_blacklisted;
    }
    config.ip_max.saturating_sub(deductions)
}

fn dns_category(dns: Option<&DnsLeakResult>, config: &ScoreConfig) -> u32 {
    let dns = match dns {
        Some(dns) => dns,
        None => return config.dns_max,
    };

    let mut deductions = 0;
    match dns.leak_type {
        LeakType::Full => deductions += config.dns_full_leak,
        LeakType::Partial => deductions += config.dns_partial_leak,
        LeakType::None => {}
    }
    if !dns.uses_doh && !dns.uses_dot {
        deductions += config.dns_plain_transport;
    }
    config.dns_max.saturating_sub(deductions)
}

fn webrtc_category(webrtc: Option<&WebRtcLeakReport>, config: &ScoreConfig) -> u32 {
    let report = match webrtc {
        Some(r) if r.supported => r,
        // Missing WebRTC cannot leak; unknown scores optimistically
        _ => return config.webrtc_max,
    };

    let mut deductions = 0;
    if !report.local_addresses.is_empty() {
        deductions += config.webrtc_local_ip;
    }
    if !report.public_addresses.is_empty() {
        deductions += config.webrtc_public_ip;
    }
    if !report.mdns_hostnames.is_empty() {
        deductions += config.webrtc_mdns;
    }
    if !report.ipv6_addresses.is_empty() {
        deductions += config.webrtc_ipv6;
    }
    config.webrtc_max.saturating_sub(deductions)
}

fn fingerprint_category(inputs: &ScoreInputs<'_>, config: &ScoreConfig) -> u32 {
    let mut deductions = 0;
    let families = [
        (inputs.canvas, config.canvas_deduction, config.canvas_entropy_threshold),
        (inputs.webgl, config.webgl_deduction, config.webgl_entropy_threshold),
        (inputs.audio, config.audio_deduction, config.audio_entropy_threshold),
        (inputs.fonts, config.fonts_deduction, config.fonts_entropy_threshold),
    ];

    for (sample, deduction, threshold) in families {
        if high_uniqueness(sample, threshold) {
            deductions += deduction;
        }
    }
    config.fingerprint_max.saturating_sub(deductions)
}

/// A supported sample is high-uniqueness unless its entropy estimate came
/// in below the cutoff; absent or unsupported samples never deduct.
fn high_uniqueness(sample: Option<&FingerprintSample>, threshold: f64) -> bool {
    match sample {
        Some(s) if s.supported => s.entropy_bits.map_or(true, |bits| bits >= threshold),
        _ => false,
    }
}

fn browser_category(browser: Option<&BrowserConfigReport>, config: &ScoreConfig) -> u32 {
    let report = match browser {
        Some(r) => r,
        None => return config.browser_max,
    };

    let mut deductions = 0;
    if !report.do_not_track {
        deductions += config.browser_dnt_disabled;
    }
    if report.hardware_concurrency.is_some() {
        deductions += config.browser_hardware_disclosure;
    }
    if report.device_memory_gb.is_some() {
        deductions += config.browser_device_memory;
    }
    if report.plugin_count > 0 {
        deductions += config.browser_plugins;
    }
    if report.language_count > 2 {
        deductions += config.browser_languages;
    }
    config.browser_max.saturating_sub(deductions)
}
