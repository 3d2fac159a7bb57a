//! Scan orchestration
//!
//! One [`ScanRun`] per engine invocation: per-probe lifecycle records,
//! aggregated progress, and the composite score recomputed after every
//! completed probe. Independent probes fan out concurrently; DNS is
//! strictly ordered after IP because it consumes the IP/country anchor.
//!
//! Cancellation uses a shared token: probes that resolve after
//! `cancel()` are discarded without mutating the run, so an abandoned
//! consumer never observes late state updates.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::capability::CapabilityTable;
use crate::collectors::audio::AudioFingerprinter;
use crate::collectors::browser_config::{BrowserConfigProbe, BrowserConfigReport};
use crate::collectors::canvas::CanvasFingerprinter;
use crate::collectors::fonts::FontFingerprinter;
use crate::collectors::webgl::WebGlFingerprinter;
use crate::error::ProbeError;
use crate::net::backend::{
    AnalysisBackend, DnsLeakResult, FetchTransport, IpLeakResult, NetworkInsights, WebRtcAnalysis,
    DEFAULT_FETCH_TIMEOUT_MS,
};
use crate::net::classify::WebRtcLeakReport;
use crate::net::webrtc::{WebRtcLeakDetector, DEFAULT_GATHER_TIMEOUT_MS};
use crate::sample::FingerprintSample;
use crate::score::{score, PrivacyScore, ScoreConfig, ScoreInputs};
use crate::timing::now_ms;

/// Every probe the orchestrator can schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProbeId {
    Canvas,
    WebGl,
    Audio,
    Fonts,
    BrowserConfig,
    WebRtc,
    Ip,
    Dns,
}

/// Probe lifecycle; every started probe reaches Passed or Failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProbeStatus {
    Idle,
    Running,
    Passed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeRecord {
    pub status: ProbeStatus,
    pub error: Option<String>,
    pub started_at_ms: Option<u64>,
    pub duration_ms: Option<u64>,
}

impl ProbeRecord {
    fn idle() -> Self {
        Self {
            status: ProbeStatus::Idle,
            error: None,
            started_at_ms: None,
            duration_ms: None,
        }
    }
}

/// Everything the probes produced this run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResults {
    pub canvas: Option<FingerprintSample>,
    pub webgl: Option<FingerprintSample>,
    pub audio: Option<FingerprintSample>,
    pub fonts: Option<FingerprintSample>,
    pub browser: Option<BrowserConfigReport>,
    pub webrtc: Option<WebRtcLeakReport>,
    pub ip: Option<IpLeakResult>,
    pub dns: Option<DnsLeakResult>,
    /// Server-side cross-check of the WebRTC classification
    pub webrtc_analysis: Option<WebRtcAnalysis>,
    /// Server-side cross-check of the score; authoritative when present
    pub server_score: Option<PrivacyScore>,
    pub insights: Option<NetworkInsights>,
}

impl ScanResults {
    fn score_inputs(&self, claims_anonymization: bool) -> ScoreInputs<'_> {
        ScoreInputs {
            canvas: self.canvas.as_ref(),
            webgl: self.webgl.as_ref(),
            audio: self.audio.as_ref(),
            fonts: self.fonts.as_ref(),
            webrtc: self.webrtc.as_ref(),
            ip: self.ip.as_ref(),
            dns: self.dns.as_ref(),
            browser: self.browser.as_ref(),
            claims_anonymization,
        }
    }
}

/// The transient aggregate for one scan
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRun {
    pub capabilities: CapabilityTable,
    pub records: BTreeMap<ProbeId, ProbeRecord>,
    pub results: ScanResults,
    pub score: PrivacyScore,
    /// 0–100, counts completed probes
    pub progress: u32,
    pub cancelled: bool,
}

impl ScanRun {
    fn new(capabilities: CapabilityTable, probes: &[ProbeId], config: &ScoreConfig) -> Self {
        let records = probes.iter().map(|id| (*id, ProbeRecord::idle())).collect();
        Self {
            capabilities,
            records,
            results: ScanResults::default(),
            score: score(&ScoreInputs::default(), config),
            progress: 0,
            cancelled: false,
        }
    }
}

/// Shared cancellation flag; cloning shares the flag
#[derive(Clone, Default)]
pub struct CancelToken {
    flag: Rc<Cell<bool>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.set(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.get()
    }
}

/// Scan configuration; `backend_url: None` runs offline (no IP/DNS probes)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScanConfig {
    pub backend_url: Option<String>,
    /// The user's declared expectation of an active VPN/proxy/Tor path
    pub claims_anonymization: bool,
    /// Ask the backend to cross-check WebRTC classification and score
    pub server_cross_check: bool,
    pub gather_timeout_ms: u32,
    pub fetch_timeout_ms: u32,
    pub score: ScoreConfig,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            backend_url: None,
            claims_anonymization: false,
            server_cross_check: true,
            gather_timeout_ms: DEFAULT_GATHER_TIMEOUT_MS,
            fetch_timeout_ms: DEFAULT_FETCH_TIMEOUT_MS,
            score: ScoreConfig::default(),
        }
    }
}

pub type ProgressCallback = Box<dyn Fn(u32)>;

/// Run-scoped bookkeeping shared between the fanned-out probe tasks
struct ScanContext {
    run: RefCell<ScanRun>,
    token: CancelToken,
    score_config: ScoreConfig,
    claims_anonymization: bool,
    on_progress: Option<ProgressCallback>,
    active_probes: u32,
    completed: Cell<u32>,
}

impl ScanContext {
    fn mark_running(&self, id: ProbeId) {
        if self.token.is_cancelled() {
            return;
        }
        let mut run = self.run.borrow_mut();
        if let Some(record) = run.records.get_mut(&id) {
            record.status = ProbeStatus::Running;
            record.started_at_ms = Some(now_ms());
        }
    }

    /// Terminal transition: store the result, stamp the duration, rescore,
    /// bump progress. Discarded silently after cancellation.
    fn commit<F>(&self, id: ProbeId, error: Option<String>, store: F)
    where
        F: FnOnce(&mut ScanResults),
    {
        if self.token.is_cancelled() {
            log::debug!("discarding late {:?} result after cancellation", id);
            return;
        }

        let progress = {
            let mut run = self.run.borrow_mut();
            if let Some(record) = run.records.get_mut(&id) {
                record.status = if error.is_none() {
                    ProbeStatus::Passed
                } else {
                    ProbeStatus::Failed
                };
                record.duration_ms = record.started_at_ms.map(|t| now_ms().saturating_sub(t));
                record.error = error;
            }
            store(&mut run.results);

            // Last-write-wins: the score always reflects the latest
            // complete input set
            run.score = score(
                &run.results.score_inputs(self.claims_anonymization),
                &self.score_config,
            );

            self.completed.set(self.completed.get() + 1);
            let progress = self.completed.get() * 100 / self.active_probes.max(1);
            run.progress = progress;
            progress
        };

        if let Some(cb) = &self.on_progress {
            cb(progress);
        }
    }

    fn into_run(self) -> ScanRun {
        let mut run = self.run.into_inner();
        run.cancelled = self.token.is_cancelled();
        run
    }
}

/// The engine entry point: owns nothing between runs
pub struct Scanner {
    config: ScanConfig,
}

impl Default for Scanner {
    fn default() -> Self {
        Self::new()
    }
}

impl Scanner {
    pub fn new() -> Self {
        Self::with_config(ScanConfig::default())
    }

    pub fn with_config(config: ScanConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Run every applicable probe and aggregate the results.
    ///
    /// Always returns a run in which every started probe reached a
    /// terminal state; a cancelled run is returned frozen at the point
    /// the token fired.
    pub async fn run(
        &self,
        token: CancelToken,
        on_progress: Option<ProgressCallback>,
    ) -> ScanRun {
        let caps = CapabilityTable::probe();
        log::info!(
            "starting privacy scan ({}/6 probe APIs present)",
            caps.present_count()
        );

        let has_backend = self.config.backend_url.is_some();
        let mut probes = vec![
            ProbeId::Canvas,
            ProbeId::WebGl,
            ProbeId::Audio,
            ProbeId::Fonts,
            ProbeId::BrowserConfig,
            ProbeId::WebRtc,
        ];
        if has_backend {
            probes.push(ProbeId::Ip);
            probes.push(ProbeId::Dns);
        }

        let ctx = ScanContext {
            run: RefCell::new(ScanRun::new(caps, &probes, &self.config.score)),
            token: token.clone(),
            score_config: self.config.score.clone(),
            claims_anonymization: self.config.claims_anonymization,
            on_progress,
            active_probes: probes.len() as u32,
            completed: Cell::new(0),
        };

        let backend = self.config.backend_url.as_ref().map(|url| {
            AnalysisBackend::with_transport(
                url,
                Box::new(FetchTransport::new(self.config.fetch_timeout_ms)),
            )
        });

        let canvas_task = async {
            ctx.mark_running(ProbeId::Canvas);
            let sample = CanvasFingerprinter::detect(&caps).await;
            ctx.commit(ProbeId::Canvas, None, |r| r.canvas = Some(sample));
        };
        let webgl_task = async {
            ctx.mark_running(ProbeId::WebGl);
            let sample = WebGlFingerprinter::detect(&caps).await;
            ctx.commit(ProbeId::WebGl, None, |r| r.webgl = Some(sample));
        };
        let audio_task = async {
            ctx.mark_running(ProbeId::Audio);
            let sample = AudioFingerprinter::detect(&caps).await;
            ctx.commit(ProbeId::Audio, None, |r| r.audio = Some(sample));
        };
        let fonts_task = async {
            ctx.mark_running(ProbeId::Fonts);
            let sample = FontFingerprinter::detect(&caps).await;
            ctx.commit(ProbeId::Fonts, None, |r| r.fonts = Some(sample));
        };
        let browser_task = async {
            ctx.mark_running(ProbeId::BrowserConfig);
            match BrowserConfigProbe::detect().await {
                Some(report) => {
                    ctx.commit(ProbeId::BrowserConfig, None, |r| r.browser = Some(report))
                }
                None => ctx.commit(
                    ProbeId::BrowserConfig,
                    Some(ProbeError::NoWindow.to_string()),
                    |_| {},
                ),
            }
        };
        let webrtc_task = async {
            ctx.mark_running(ProbeId::WebRtc);
            let detector = WebRtcLeakDetector::with_config(
                crate::net::webrtc::DEFAULT_STUN_SERVERS
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                self.config.gather_timeout_ms,
            );
            let report = detector.detect_all(&caps).await;
            ctx.commit(ProbeId::WebRtc, None, |r| r.webrtc = Some(report));
        };
        // IP strictly precedes DNS: the leak correlation needs the
        // claimed IP/country as its anchor
        let network_task = async {
            if let Some(backend) = &backend {
                ctx.mark_running(ProbeId::Ip);
                let ip_result = backend.detect_ip(None).await;
                let anchor = ip_result
                    .as_ref()
                    .ok()
                    .map(|r| (r.ip.clone(), r.geo.country_code.clone()));
                match ip_result {
                    Ok(ip) => ctx.commit(ProbeId::Ip, None, |r| r.ip = Some(ip)),
                    Err(e) => {
                        log::warn!("ip probe failed: {}", e);
                        ctx.commit(ProbeId::Ip, Some(e.to_string()), |_| {});
                    }
                }

                ctx.mark_running(ProbeId::Dns);
                let (ip, country) = match &anchor {
                    Some((ip, country)) => (Some(ip.as_str()), country.as_deref()),
                    None => (None, None),
                };
                match backend.detect_dns_leak(ip, country).await {
                    Ok(dns) => ctx.commit(ProbeId::Dns, None, |r| r.dns = Some(dns)),
                    Err(e) => {
                        log::warn!("dns probe failed: {}", e);
                        ctx.commit(ProbeId::Dns, Some(e.to_string()), |_| {});
                    }
                }

                // Telemetry only; failures are invisible to the run
                if !token.is_cancelled() {
                    match backend.network_insights().await {
                        Ok(insights) => {
                            if !token.is_cancelled() {
                                ctx.run.borrow_mut().results.insights = Some(insights);
                            }
                        }
                        Err(e) => log::debug!("network insights unavailable: {}", e),
                    }
                }
            }
        };

        futures::join!(
            canvas_task,
            webgl_task,
            audio_task,
            fonts_task,
            browser_task,
            webrtc_task,
            network_task
        );

        if let Some(backend) = &backend {
            if self.config.server_cross_check && !token.is_cancelled() {
                self.cross_check(&ctx, backend).await;
            }
        }

        let mut run = ctx.into_run();
        if !run.cancelled {
            run.progress = 100;
            log::info!(
                "scan complete: score {}/100 ({:?})",
                run.score.total,
                run.score.risk_level
            );
        } else {
            log::info!("scan cancelled at {}%", run.progress);
        }
        run
    }

    /// Non-blocking server-side cross-checks; errors are logged, never
    /// surfaced, and never degrade the locally computed score.
    async fn cross_check(&self, ctx: &ScanContext, backend: &AnalysisBackend) {
        let (webrtc, ip, dns) = {
            let run = ctx.run.borrow();
            (
                run.results.webrtc.clone(),
                run.results.ip.clone(),
                run.results.dns.clone(),
            )
        };

        if let Some(report) = &webrtc {
            if report.supported {
                match backend
                    .detect_webrtc_leak(&report.local_addresses, &report.candidates)
                    .await
                {
                    Ok(analysis) => {
                        if !ctx.token.is_cancelled() {
                            ctx.run.borrow_mut().results.webrtc_analysis = Some(analysis);
                        }
                    }
                    Err(e) => log::debug!("webrtc cross-check unavailable: {}", e),
                }
            }
        }

        match backend
            .calculate_privacy_score(ip.as_ref(), dns.as_ref(), webrtc.as_ref())
            .await
        {
            Ok(server_score) => {
                if !ctx.token.is_cancelled() {
                    ctx.run.borrow_mut().results.server_score = Some(server_score);
                }
            }
            Err(e) => log::debug!("score cross-check unavailable: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::{FingerprintFamily, SampleBuilder};

    fn context(probes: &[ProbeId]) -> ScanContext {
        ScanContext {
            run: RefCell::new(ScanRun::new(
                CapabilityTable::full(),
                probes,
                &ScoreConfig::default(),
            )),
            token: CancelToken::new(),
            score_config: ScoreConfig::default(),
            claims_anonymization: false,
            on_progress: None,
            active_probes: probes.len() as u32,
            completed: Cell::new(0),
        }
    }

    #[test]
    fn test_records_start_idle() {
        let ctx = context(&[ProbeId::Canvas, ProbeId::WebRtc]);
        let run = ctx.run.borrow();
        assert_eq!(run.records.len(), 2);
        assert!(run
            .records
            .values()
            .all(|r| r.status == ProbeStatus::Idle));
        assert_eq!(run.progress, 0);
        // Empty inputs score at the maximum
        assert_eq!(run.score.total, ScoreConfig::default().max_total());
    }

    #[test]
    fn test_commit_reaches_terminal_state_and_rescores() {
        let ctx = context(&[ProbeId::Canvas, ProbeId::WebGl]);
        ctx.mark_running(ProbeId::Canvas);

        let sample = SampleBuilder::new(FingerprintFamily::Canvas)
            .payload(&[1])
            .entropy_bits(12.0)
            .finish();
        ctx.commit(ProbeId::Canvas, None, |r| r.canvas = Some(sample));

        let run = ctx.run.borrow();
        let record = &run.records[&ProbeId::Canvas];
        assert_eq!(record.status, ProbeStatus::Passed);
        assert!(record.duration_ms.is_some());
        assert_eq!(run.progress, 50);
        // High-uniqueness canvas costs its deduction
        assert_eq!(
            run.score.breakdown.fingerprint_resistance,
            ScoreConfig::default().fingerprint_max - ScoreConfig::default().canvas_deduction
        );
    }

    #[test]
    fn test_failed_probe_records_error_and_scores_optimistically() {
        let ctx = context(&[ProbeId::Ip]);
        ctx.mark_running(ProbeId::Ip);
        ctx.commit(ProbeId::Ip, Some("backend unreachable".into()), |_| {});

        let run = ctx.run.borrow();
        let record = &run.records[&ProbeId::Ip];
        assert_eq!(record.status, ProbeStatus::Failed);
        assert_eq!(record.error.as_deref(), Some("backend unreachable"));
        // No IP data: category keeps full credit
        assert_eq!(
            run.score.breakdown.ip_privacy,
            ScoreConfig::default().ip_max
        );
        assert_eq!(run.progress, 100);
    }

    #[test]
    fn test_cancellation_discards_late_commits() {
        let ctx = context(&[ProbeId::Canvas]);
        ctx.mark_running(ProbeId::Canvas);
        ctx.token.cancel();

        let sample = SampleBuilder::new(FingerprintFamily::Canvas).finish();
        ctx.commit(ProbeId::Canvas, None, |r| r.canvas = Some(sample));

        let run = ctx.run.borrow();
        assert!(run.results.canvas.is_none());
        assert_eq!(run.records[&ProbeId::Canvas].status, ProbeStatus::Running);
        assert_eq!(run.progress, 0);
    }

    #[test]
    fn test_progress_is_monotonic_across_commits() {
        let probes = [ProbeId::Canvas, ProbeId::WebGl, ProbeId::Audio];
        let ctx = context(&probes);
        let mut last = 0;
        for id in probes {
            ctx.mark_running(id);
            ctx.commit(id, None, |_| {});
            let progress = ctx.run.borrow().progress;
            assert!(progress >= last);
            last = progress;
        }
        assert_eq!(last, 100);
    }

    #[test]
    fn test_cancel_token_is_shared_across_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
