//! Client for the backend analysis service
//!
//! The service is an external collaborator reached over REST/JSON; it is
//! authoritative for DNS leak classification and IP reputation. Every call
//! carries a hard timeout, and every response travels in a
//! `{ success, data, error }` envelope. The transport sits behind a trait
//! so tests drive the client with canned responses.

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{Request, RequestInit, RequestMode, Response};

use crate::error::{ProbeError, Result};
use crate::net::classify::{IceCandidate, NatType, WebRtcLeakReport};
use crate::net::Risk;
use crate::score::PrivacyScore;
use crate::timing::with_timeout;

/// Hard deadline for one backend round-trip
pub const DEFAULT_FETCH_TIMEOUT_MS: u32 = 8_000;

// ===== Response DTOs =====

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GeoInfo {
    pub country: Option<String>,
    pub country_code: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NetworkInfo {
    pub asn: Option<u32>,
    pub isp: Option<String>,
    pub organization: Option<String>,
}

/// Reputation/privacy flags the service derives for an address
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PrivacyFlags {
    pub is_vpn: bool,
    pub is_proxy: bool,
    pub is_tor: bool,
    pub is_datacenter: bool,
    pub is_relay: bool,
    pub is_blacklisted: bool,
}

impl PrivacyFlags {
    /// Any recognized anonymization path active
    pub fn any_anonymization(&self) -> bool {
        self.is_vpn || self.is_proxy || self.is_tor || self.is_relay
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IpLeakResult {
    pub ip: String,
    pub geo: GeoInfo,
    pub network: NetworkInfo,
    pub privacy: PrivacyFlags,
    pub risks: Vec<Risk>,
    pub recommendations: Vec<String>,
}

/// DNS leak classification, as returned by the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeakType {
    None,
    Partial,
    Full,
}

impl Default for LeakType {
    fn default() -> Self {
        LeakType::None
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DnsResolver {
    pub ip: String,
    pub country: Option<String>,
    pub isp: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DnsLeakResult {
    pub is_leak: bool,
    pub leak_type: LeakType,
    pub resolvers: Vec<DnsResolver>,
    pub uses_doh: bool,
    pub uses_dot: bool,
    pub risks: Vec<Risk>,
    pub recommendations: Vec<String>,
}

/// Server-side cross-check of the client's WebRTC classification
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebRtcAnalysis {
    pub is_leak: bool,
    pub nat_type: NatType,
    #[serde(default)]
    pub risks: Vec<Risk>,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

/// Latency/speed telemetry; informational, never scored
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NetworkInsights {
    pub latency_ms: Option<f64>,
    pub jitter_ms: Option<f64>,
    pub download_mbps: Option<f64>,
    pub upload_mbps: Option<f64>,
}

// ===== Request DTOs =====

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DnsLeakRequest<'a> {
    user_ip: Option<&'a str>,
    user_country: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WebRtcLeakRequest<'a> {
    local_ips: &'a BTreeSet<String>,
    candidates: Vec<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ScoreRequest<'a> {
    ip_leak: Option<&'a IpLeakResult>,
    dns_leak: Option<&'a DnsLeakResult>,
    webrtc_leak: Option<&'a WebRtcLeakReport>,
}

/// Wire envelope every endpoint answers with
#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
}

// ===== Transport seam =====

/// One HTTP round-trip: `(status, body)` on transport success.
///
/// `?Send` because wasm futures are single-threaded.
#[async_trait(?Send)]
pub trait HttpTransport {
    async fn request(&self, method: &str, url: &str, body: Option<String>)
        -> Result<(u16, String)>;
}

/// Browser fetch transport with a hard per-request deadline
pub struct FetchTransport {
    timeout_ms: u32,
}

impl FetchTransport {
    pub fn new(timeout_ms: u32) -> Self {
        Self { timeout_ms }
    }
}

impl Default for FetchTransport {
    fn default() -> Self {
        Self::new(DEFAULT_FETCH_TIMEOUT_MS)
    }
}

#[async_trait(?Send)]
impl HttpTransport for FetchTransport {
    async fn request(
        &self,
        method: &str,
        url: &str,
        body: Option<String>,
    ) -> Result<(u16, String)> {
        let opts = RequestInit::new();
        opts.set_method(method);
        opts.set_mode(RequestMode::Cors);
        if let Some(body) = &body {
            opts.set_body(&JsValue::from_str(body));
        }

        let request = Request::new_with_str_and_init(url, &opts)
            .map_err(|e| ProbeError::FetchFailed(format!("Request::new failed: {:?}", e)))?;
        let headers = request.headers();
        headers
            .set("Accept", "application/json")
            .map_err(|e| ProbeError::FetchFailed(format!("set header failed: {:?}", e)))?;
        if body.is_some() {
            headers
                .set("Content-Type", "application/json")
                .map_err(|e| ProbeError::FetchFailed(format!("set header failed: {:?}", e)))?;
        }

        let window = web_sys::window().ok_or(ProbeError::NoWindow)?;
        let response = with_timeout(
            JsFuture::from(window.fetch_with_request(&request)),
            self.timeout_ms,
        )
        .await
        .ok_or(ProbeError::FetchTimeout(self.timeout_ms))?
        .map_err(|e| ProbeError::FetchFailed(format!("fetch rejected: {:?}", e)))?;

        let response: Response = response
            .dyn_into()
            .map_err(|_| ProbeError::FetchFailed("fetch resolved to a non-Response".into()))?;
        let status = response.status();

        let text_promise = response
            .text()
            .map_err(|e| ProbeError::FetchFailed(format!("text() failed: {:?}", e)))?;
        let text = with_timeout(JsFuture::from(text_promise), self.timeout_ms)
            .await
            .ok_or(ProbeError::FetchTimeout(self.timeout_ms))?
            .map_err(|e| ProbeError::FetchFailed(format!("body read failed: {:?}", e)))?
            .as_string()
            .unwrap_or_default();

        Ok((status, text))
    }
}

// ===== Client =====

/// Typed client over the analysis service's logical operations
pub struct AnalysisBackend {
    base_url: String,
    transport: Box<dyn HttpTransport>,
}

impl AnalysisBackend {
    pub fn new(base_url: &str) -> Self {
        Self::with_transport(base_url, Box::new(FetchTransport::default()))
    }

    pub fn with_transport(base_url: &str, transport: Box<dyn HttpTransport>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            transport,
        }
    }

    /// Detect the caller's own public IP (POST) or analyze a specific
    /// address (GET).
    pub async fn detect_ip(&self, ip: Option<&str>) -> Result<IpLeakResult> {
        match ip {
            Some(ip) => self.get(&format!("/api/ip/{}", ip)).await,
            None => self.post("/api/ip/detect", &serde_json::json!({})).await,
        }
    }

    /// Correlate the resolvers actually used against the claimed IP's
    /// country. The service's verdict is authoritative.
    pub async fn detect_dns_leak(
        &self,
        user_ip: Option<&str>,
        user_country: Option<&str>,
    ) -> Result<DnsLeakResult> {
        self.post(
            "/api/dns-leak",
            &DnsLeakRequest {
                user_ip,
                user_country,
            },
        )
        .await
    }

    /// Submit client-gathered ICE candidates for server-side analysis
    pub async fn detect_webrtc_leak(
        &self,
        local_ips: &BTreeSet<String>,
        candidates: &[IceCandidate],
    ) -> Result<WebRtcAnalysis> {
        self.post(
            "/api/webrtc-leak",
            &WebRtcLeakRequest {
                local_ips,
                candidates: candidates.iter().map(|c| c.raw.as_str()).collect(),
            },
        )
        .await
    }

    /// Server-side cross-check of the locally computed score. Treated as
    /// the source of truth when both exist, but never blocks a scan.
    pub async fn calculate_privacy_score(
        &self,
        ip: Option<&IpLeakResult>,
        dns: Option<&DnsLeakResult>,
        webrtc: Option<&WebRtcLeakReport>,
    ) -> Result<PrivacyScore> {
        self.post(
            "/api/privacy-score",
            &ScoreRequest {
                ip_leak: ip,
                dns_leak: dns,
                webrtc_leak: webrtc,
            },
        )
        .await
    }

    /// Latency/speed telemetry; not part of the privacy score
    pub async fn network_insights(&self) -> Result<NetworkInsights> {
        self.get("/api/network-insights").await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let (status, body) = self.transport.request("GET", &url, None).await?;
        decode_envelope(status, &body, path)
    }

    async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let payload = serde_json::to_string(body)
            .map_err(|e| ProbeError::Internal(format!("request encoding failed: {}", e)))?;
        let (status, body) = self.transport.request("POST", &url, Some(payload)).await?;
        decode_envelope(status, &body, path)
    }
}

/// Unwrap the `{ success, data, error }` envelope.
///
/// Non-2xx status, `success: false` and undecodable bodies all surface as
/// transport-class errors; the caller's probe result stays `None`.
fn decode_envelope<T: DeserializeOwned>(status: u16, body: &str, endpoint: &str) -> Result<T> {
    if !(200..300).contains(&status) {
        return Err(ProbeError::HttpStatus {
            status,
            endpoint: endpoint.to_string(),
        });
    }

    let envelope: ApiEnvelope<T> = serde_json::from_str(body)
        .map_err(|e| ProbeError::MalformedResponse(format!("{}: {}", endpoint, e)))?;

    if !envelope.success {
        return Err(ProbeError::EnvelopeRejected(
            envelope.error.unwrap_or_else(|| "no error detail".to_string()),
        ));
    }

    envelope.data.ok_or_else(|| {
        ProbeError::MalformedResponse(format!("{}: success envelope without data", endpoint))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use std::cell::RefCell;
    use std::rc::Rc;

    type RequestLog = Rc<RefCell<Vec<(String, String, Option<String>)>>>;

    /// Canned transport: records requests, replays queued responses
    struct FakeTransport {
        responses: RefCell<Vec<Result<(u16, String)>>>,
        requests: RequestLog,
    }

    impl FakeTransport {
        fn replying(responses: Vec<Result<(u16, String)>>) -> Self {
            Self {
                responses: RefCell::new(responses),
                requests: Rc::new(RefCell::new(Vec::new())),
            }
        }
    }

    #[async_trait(?Send)]
    impl HttpTransport for FakeTransport {
        async fn request(
            &self,
            method: &str,
            url: &str,
            body: Option<String>,
        ) -> Result<(u16, String)> {
            self.requests
                .borrow_mut()
                .push((method.to_string(), url.to_string(), body));
            self.responses.borrow_mut().remove(0)
        }
    }

    fn backend_with(responses: Vec<Result<(u16, String)>>) -> AnalysisBackend {
        AnalysisBackend::with_transport(
            "https://analysis.example",
            Box::new(FakeTransport::replying(responses)),
        )
    }

    #[test]
    fn test_detect_ip_self_posts() {
        let body = r#"{"success":true,"data":{"ip":"73.158.42.218",
            "privacy":{"isVpn":false,"isTor":false},
            "geo":{"country":"United States","countryCode":"US"}}}"#;
        let backend = backend_with(vec![Ok((200, body.to_string()))]);

        let result = block_on(backend.detect_ip(None)).unwrap();
        assert_eq!(result.ip, "73.158.42.218");
        assert_eq!(result.geo.country_code.as_deref(), Some("US"));
        assert!(!result.privacy.any_anonymization());
    }

    #[test]
    fn test_detect_ip_specific_gets() {
        let body = r#"{"success":true,"data":{"ip":"1.2.3.4"}}"#;
        let transport = FakeTransport::replying(vec![Ok((200, body.to_string()))]);
        let log = transport.requests.clone();
        let backend =
            AnalysisBackend::with_transport("https://analysis.example/", Box::new(transport));

        block_on(backend.detect_ip(Some("1.2.3.4"))).unwrap();
        let (method, url, body) = log.borrow()[0].clone();
        assert_eq!(method, "GET");
        assert_eq!(url, "https://analysis.example/api/ip/1.2.3.4");
        assert!(body.is_none());
    }

    #[test]
    fn test_http_error_is_typed() {
        let backend = backend_with(vec![Ok((502, String::new()))]);
        let err = block_on(backend.network_insights()).unwrap_err();
        assert!(matches!(err, ProbeError::HttpStatus { status: 502, .. }));
        assert!(err.is_transport());
    }

    #[test]
    fn test_rejected_envelope_is_typed() {
        let body = r#"{"success":false,"error":"rate limited"}"#;
        let backend = backend_with(vec![Ok((200, body.to_string()))]);
        let err = block_on(backend.detect_dns_leak(Some("1.2.3.4"), Some("US"))).unwrap_err();
        assert!(matches!(err, ProbeError::EnvelopeRejected(ref msg) if msg == "rate limited"));
    }

    #[test]
    fn test_malformed_body_is_transport_class() {
        let backend = backend_with(vec![Ok((200, "<html>not json</html>".to_string()))]);
        let err = block_on(backend.network_insights()).unwrap_err();
        assert!(matches!(err, ProbeError::MalformedResponse(_)));
        assert!(err.is_transport());
    }

    #[test]
    fn test_success_without_data_is_malformed() {
        let backend = backend_with(vec![Ok((200, r#"{"success":true}"#.to_string()))]);
        let err = block_on(backend.network_insights()).unwrap_err();
        assert!(matches!(err, ProbeError::MalformedResponse(_)));
    }

    #[test]
    fn test_dns_leak_decodes_partial_fields() {
        let body = r#"{"success":true,"data":{"isLeak":true,"leakType":"full",
            "resolvers":[{"ip":"8.8.8.8","country":"United States"}]}}"#;
        let backend = backend_with(vec![Ok((200, body.to_string()))]);
        let result = block_on(backend.detect_dns_leak(Some("73.158.42.218"), Some("NL"))).unwrap();
        assert!(result.is_leak);
        assert_eq!(result.leak_type, LeakType::Full);
        assert_eq!(result.resolvers.len(), 1);
        assert!(!result.uses_doh);
    }
}
