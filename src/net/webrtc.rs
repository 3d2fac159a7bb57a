//! WebRTC ICE gathering leak probe
//!
//! Opens a peer connection against public STUN servers, forces gathering
//! with a dummy data channel, and collects every candidate until the
//! gathering-complete event or a hard timeout. Classification of the
//! gathered lines is pure and lives in [`super::classify`].
//!
//! The peer connection is exclusively owned by one `detect_all()` call and
//! closed before the result resolves. Nothing here throws: missing WebRTC
//! and construction failures are the `supported: false` observation.

use std::cell::RefCell;
use std::rc::Rc;
use std::task::{Poll, Waker};

use futures::future::poll_fn;
use js_sys::{Array, Object, Reflect};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;
use web_sys::{RtcConfiguration, RtcPeerConnection, RtcSessionDescriptionInit};

use crate::capability::CapabilityTable;
use crate::error::{ProbeError, Result};
use crate::net::classify::{analyze_candidates, parse_candidate, WebRtcLeakReport, WebRtcObservation};
use crate::timing::with_timeout;

/// Public STUN servers queried for server-reflexive candidates
pub const DEFAULT_STUN_SERVERS: &[&str] = &[
    "stun:stun.l.google.com:19302",
    "stun:stun1.l.google.com:19302",
    "stun:stun.cloudflare.com:3478",
];

/// Hard deadline for ICE gathering
pub const DEFAULT_GATHER_TIMEOUT_MS: u32 = 5_000;

/// Candidate lines and completion state shared with the ICE callback
struct GatherState {
    lines: Vec<String>,
    complete: bool,
    waker: Option<Waker>,
}

pub struct WebRtcLeakDetector {
    stun_servers: Vec<String>,
    gather_timeout_ms: u32,
}

impl Default for WebRtcLeakDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl WebRtcLeakDetector {
    pub fn new() -> Self {
        Self::with_config(
            DEFAULT_STUN_SERVERS.iter().map(|s| s.to_string()).collect(),
            DEFAULT_GATHER_TIMEOUT_MS,
        )
    }

    pub fn with_config(stun_servers: Vec<String>, gather_timeout_ms: u32) -> Self {
        Self {
            stun_servers,
            gather_timeout_ms,
        }
    }

    /// Gather and classify. Always resolves to a well-typed report.
    pub async fn detect_all(&self, caps: &CapabilityTable) -> WebRtcLeakReport {
        if !caps.webrtc {
            return analyze_candidates(&WebRtcObservation::unsupported());
        }

        let observation = match self.gather().await {
            Ok(observation) => observation,
            Err(e) => {
                log::warn!("webrtc probe degraded to unsupported: {}", e);
                WebRtcObservation::unsupported()
            }
        };

        if observation.timed_out {
            log::debug!(
                "ICE gathering hit the {} ms deadline with {} candidates",
                self.gather_timeout_ms,
                observation.candidates.len()
            );
        }

        analyze_candidates(&observation)
    }

    async fn gather(&self) -> Result<WebRtcObservation> {
        let config = RtcConfiguration::new();
        let ice_servers = Array::new();
        for url in &self.stun_servers {
            let server = Object::new();
            Reflect::set(&server, &"urls".into(), &JsValue::from_str(url))
                .map_err(|e| ProbeError::WebRtc(format!("ice server config: {:?}", e)))?;
            ice_servers.push(&server);
        }
        config.set_ice_servers(&ice_servers);

        let pc = RtcPeerConnection::new_with_configuration(&config)
            .map_err(|e| ProbeError::WebRtc(format!("RTCPeerConnection::new failed: {:?}", e)))?;

        let state = Rc::new(RefCell::new(GatherState {
            lines: Vec::new(),
            complete: false,
            waker: None,
        }));

        // Candidate events; a null candidate marks gathering complete
        let onicecandidate = {
            let state = state.clone();
            Closure::wrap(Box::new(move |event: JsValue| {
                let event: web_sys::RtcPeerConnectionIceEvent = event.unchecked_into();
                let mut st = state.borrow_mut();
                match event.candidate() {
                    Some(candidate) => st.lines.push(candidate.candidate()),
                    None => {
                        st.complete = true;
                        if let Some(waker) = st.waker.take() {
                            waker.wake();
                        }
                    }
                }
            }) as Box<dyn FnMut(JsValue)>)
        };
        pc.set_onicecandidate(Some(onicecandidate.as_ref().unchecked_ref()));

        // A data channel is enough to force ICE gathering without media
        let _channel = pc.create_data_channel("probe");

        let offer = JsFuture::from(pc.create_offer())
            .await
            .map_err(|e| ProbeError::WebRtc(format!("createOffer failed: {:?}", e)))?;
        let desc: RtcSessionDescriptionInit = offer.unchecked_into();
        JsFuture::from(pc.set_local_description(&desc))
            .await
            .map_err(|e| ProbeError::WebRtc(format!("setLocalDescription failed: {:?}", e)))?;

        let completion = poll_fn(|cx| {
            let mut st = state.borrow_mut();
            if st.complete {
                Poll::Ready(())
            } else {
                st.waker = Some(cx.waker().clone());
                Poll::Pending
            }
        });
        let timed_out = with_timeout(completion, self.gather_timeout_ms)
            .await
            .is_none();

        pc.set_onicecandidate(None);
        pc.close();
        drop(onicecandidate);

        let lines = state.borrow().lines.clone();
        let candidates = lines.iter().filter_map(|l| parse_candidate(l)).collect();

        Ok(WebRtcObservation {
            supported: true,
            timed_out,
            candidates,
        })
    }
}
