//! ICE candidate parsing and address classification
//!
//! Pure functions over candidate SDP lines: no browser types in sight, so
//! the whole leak-classification path runs under plain `cargo test`. The
//! WebRTC probe feeds gathered candidate strings through [`parse_candidate`]
//! and hands the batch to [`analyze_candidates`].

use std::collections::BTreeSet;
use std::net::{IpAddr, Ipv6Addr};

use serde::{Deserialize, Serialize};

use super::{Risk, Severity};

/// Candidate discovery method, from the `typ` field of the SDP line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateType {
    Host,
    Srflx,
    Prflx,
    Relay,
}

/// Best-available NAT classification, inferred from observed candidate types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NatType {
    Host,
    Srflx,
    Prflx,
    Relay,
    Unknown,
}

/// One parsed ICE candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate_type: CandidateType,
    pub address: String,
    pub port: u16,
    pub protocol: String,
    /// Original SDP line, kept for the backend cross-check
    pub raw: String,
}

/// Where an address sits in the exposure taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressScope {
    /// RFC1918 / link-local / unique-local — discloses LAN topology
    Local,
    /// Globally routable — discloses the real network identity
    Public,
    /// Loopback — no exposure
    Loopback,
    /// Obfuscated `.local` mDNS hostname — discloses a device name
    Mdns,
    /// Unparseable address
    Opaque,
}

/// Parse one ICE candidate SDP line.
///
/// Accepts both bare `candidate:…` lines and `a=candidate:…` attribute form.
/// Returns `None` for anything that does not carry the mandatory fields —
/// end-of-candidates markers and malformed lines are simply skipped.
pub fn parse_candidate(line: &str) -> Option<IceCandidate> {
    let line = line.trim();
    let body = line
        .strip_prefix("a=candidate:")
        .or_else(|| line.strip_prefix("candidate:"))?;

    // foundation component protocol priority address port "typ" type [...]
    let fields: Vec<&str> = body.split_whitespace().collect();
    if fields.len() < 8 || fields[6] != "typ" {
        return None;
    }

    let candidate_type = match fields[7] {
        "host" => CandidateType::Host,
        "srflx" => CandidateType::Srflx,
        "prflx" => CandidateType::Prflx,
        "relay" => CandidateType::Relay,
        _ => return None,
    };

    let port = fields[5].parse::<u16>().ok()?;

    Some(IceCandidate {
        candidate_type,
        address: fields[4].to_string(),
        port,
        protocol: fields[2].to_ascii_lowercase(),
        raw: line.to_string(),
    })
}

fn is_unique_local_v6(addr: &Ipv6Addr) -> bool {
    (addr.segments()[0] & 0xfe00) == 0xfc00
}

fn is_link_local_v6(addr: &Ipv6Addr) -> bool {
    (addr.segments()[0] & 0xffc0) == 0xfe80
}

/// Classify a candidate address into its exposure scope
pub fn classify_address(address: &str) -> AddressScope {
    if address.ends_with(".local") {
        return AddressScope::Mdns;
    }

    match address.parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => {
            if v4.is_loopback() {
                AddressScope::Loopback
            } else if v4.is_private() || v4.is_link_local() {
                AddressScope::Local
            } else {
                AddressScope::Public
            }
        }
        Ok(IpAddr::V6(v6)) => {
            if v6.is_loopback() {
                AddressScope::Loopback
            } else if is_unique_local_v6(&v6) || is_link_local_v6(&v6) {
                AddressScope::Local
            } else {
                AddressScope::Public
            }
        }
        Err(_) => AddressScope::Opaque,
    }
}

/// NAT-type precedence for reporting: relay is the best case (real address
/// hidden), host the worst, unknown when nothing arrived before timeout.
pub fn nat_type_from_candidates(candidates: &[IceCandidate]) -> NatType {
    let mut seen_srflx = false;
    let mut seen_prflx = false;
    let mut seen_host = false;

    for c in candidates {
        match c.candidate_type {
            CandidateType::Relay => return NatType::Relay,
            CandidateType::Srflx => seen_srflx = true,
            CandidateType::Prflx => seen_prflx = true,
            CandidateType::Host => seen_host = true,
        }
    }

    if seen_srflx {
        NatType::Srflx
    } else if seen_prflx {
        NatType::Prflx
    } else if seen_host {
        NatType::Host
    } else {
        NatType::Unknown
    }
}

/// What the gathering phase observed, before classification
#[derive(Debug, Clone)]
pub struct WebRtcObservation {
    /// Whether RTCPeerConnection exists at all
    pub supported: bool,
    /// Whether the gathering deadline expired before completion
    pub timed_out: bool,
    pub candidates: Vec<IceCandidate>,
}

impl WebRtcObservation {
    pub fn unsupported() -> Self {
        Self {
            supported: false,
            timed_out: false,
            candidates: Vec::new(),
        }
    }
}

/// Fully classified WebRTC leak result
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebRtcLeakReport {
    pub supported: bool,
    pub is_leak: bool,
    pub nat_type: NatType,
    pub local_addresses: BTreeSet<String>,
    pub public_addresses: BTreeSet<String>,
    pub mdns_hostnames: BTreeSet<String>,
    pub ipv6_addresses: BTreeSet<String>,
    pub candidates: Vec<IceCandidate>,
    pub risks: Vec<Risk>,
    pub recommendations: Vec<String>,
}

/// Classify a batch of gathered candidates into the leak report.
///
/// Relay candidates carry the TURN server's address, not the user's, so
/// they set the NAT type but never count as exposure. Everything else is
/// partitioned by [`classify_address`]; `is_leak` fires when any disclosed
/// address is inconsistent with a fully-relayed topology.
pub fn analyze_candidates(observation: &WebRtcObservation) -> WebRtcLeakReport {
    let mut local_addresses = BTreeSet::new();
    let mut public_addresses = BTreeSet::new();
    let mut mdns_hostnames = BTreeSet::new();
    let mut ipv6_addresses = BTreeSet::new();

    if !observation.supported {
        // Missing WebRTC cannot leak: a low-risk finding, not a failure.
        return WebRtcLeakReport {
            supported: false,
            is_leak: false,
            nat_type: NatType::Unknown,
            local_addresses,
            public_addresses,
            mdns_hostnames,
            ipv6_addresses,
            candidates: Vec::new(),
            risks: Vec::new(),
            recommendations: Vec::new(),
        };
    }

    for c in &observation.candidates {
        if c.candidate_type == CandidateType::Relay {
            continue;
        }
        match classify_address(&c.address) {
            AddressScope::Local => {
                local_addresses.insert(c.address.clone());
            }
            AddressScope::Public => {
                public_addresses.insert(c.address.clone());
            }
            AddressScope::Mdns => {
                mdns_hostnames.insert(c.address.clone());
            }
            AddressScope::Loopback | AddressScope::Opaque => {}
        }
        if c.address.parse::<Ipv6Addr>().is_ok() && classify_address(&c.address) != AddressScope::Loopback {
            ipv6_addresses.insert(c.address.clone());
        }
    }

    let nat_type = nat_type_from_candidates(&observation.candidates);
    let is_leak =
        !local_addresses.is_empty() || !public_addresses.is_empty() || !mdns_hostnames.is_empty();

    let mut risks = Vec::new();
    let mut recommendations = Vec::new();

    if !public_addresses.is_empty() && !local_addresses.is_empty() {
        risks.push(Risk::new(
            Severity::Critical,
            "Real network identity exposed",
            "Both your public IP and local network addresses are visible through \
             WebRTC, which identifies your machine and your network.",
        ));
    }
    if !public_addresses.is_empty() {
        risks.push(Risk::new(
            Severity::High,
            "Public IP exposed via STUN",
            "A server-reflexive candidate disclosed your public IP address, \
             bypassing any proxy configured at the browser level.",
        ));
    }
    if !local_addresses.is_empty() {
        risks.push(Risk::new(
            Severity::Medium,
            "Local network address exposed",
            "A host candidate disclosed a private-range address, revealing \
             LAN topology even behind a VPN.",
        ));
    }
    if !mdns_hostnames.is_empty() {
        risks.push(Risk::new(
            Severity::Medium,
            "mDNS hostname exposed",
            "An obfuscated .local hostname was disclosed; it can identify \
             this device across sites.",
        ));
    }
    if !ipv6_addresses.is_empty() {
        risks.push(Risk::new(
            Severity::Medium,
            "IPv6 address exposed",
            "An IPv6 candidate was disclosed. Many VPNs tunnel only IPv4, \
             leaving IPv6 traffic outside the tunnel.",
        ));
    }

    if is_leak {
        recommendations
            .push("Disable WebRTC or install an extension that blocks ICE candidate gathering.".to_string());
        recommendations
            .push("Prefer a VPN client that enforces WebRTC leak protection.".to_string());
        if !ipv6_addresses.is_empty() {
            recommendations
                .push("Disable IPv6 on this interface unless your VPN tunnels it.".to_string());
        }
    }

    WebRtcLeakReport {
        supported: true,
        is_leak,
        nat_type,
        local_addresses,
        public_addresses,
        mdns_hostnames,
        ipv6_addresses,
        candidates: observation.candidates.clone(),
        risks,
        recommendations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(typ: &str, addr: &str) -> IceCandidate {
        parse_candidate(&format!(
            "candidate:842163049 1 udp 1677729535 {} 58692 typ {} generation 0",
            addr, typ
        ))
        .expect("candidate should parse")
    }

    fn observed(candidates: Vec<IceCandidate>) -> WebRtcObservation {
        WebRtcObservation {
            supported: true,
            timed_out: false,
            candidates,
        }
    }

    #[test]
    fn test_parse_candidate_fields() {
        let c = parse_candidate(
            "candidate:842163049 1 udp 1677729535 192.168.1.5 58692 typ srflx \
             raddr 0.0.0.0 rport 0 generation 0",
        )
        .unwrap();
        assert_eq!(c.candidate_type, CandidateType::Srflx);
        assert_eq!(c.address, "192.168.1.5");
        assert_eq!(c.port, 58692);
        assert_eq!(c.protocol, "udp");
    }

    #[test]
    fn test_parse_candidate_attribute_form() {
        let c = parse_candidate("a=candidate:1 1 UDP 2122252543 10.0.0.7 51000 typ host").unwrap();
        assert_eq!(c.candidate_type, CandidateType::Host);
        assert_eq!(c.protocol, "udp");
    }

    #[test]
    fn test_parse_candidate_rejects_garbage() {
        assert!(parse_candidate("").is_none());
        assert!(parse_candidate("a=end-of-candidates").is_none());
        assert!(parse_candidate("candidate:1 1 udp 99 1.2.3.4 notaport typ host").is_none());
        assert!(parse_candidate("candidate:1 1 udp 99 1.2.3.4 5000 typo host").is_none());
    }

    #[test]
    fn test_address_scopes() {
        assert_eq!(classify_address("192.168.1.105"), AddressScope::Local);
        assert_eq!(classify_address("10.20.30.40"), AddressScope::Local);
        assert_eq!(classify_address("172.16.0.9"), AddressScope::Local);
        assert_eq!(classify_address("169.254.1.1"), AddressScope::Local);
        assert_eq!(classify_address("127.0.0.1"), AddressScope::Loopback);
        assert_eq!(classify_address("73.158.42.218"), AddressScope::Public);
        assert_eq!(classify_address("2001:db8::1"), AddressScope::Public);
        assert_eq!(classify_address("fe80::1"), AddressScope::Local);
        assert_eq!(classify_address("fd00::1"), AddressScope::Local);
        assert_eq!(classify_address("::1"), AddressScope::Loopback);
        assert_eq!(
            classify_address("03f2b1e4-1a2b.local"),
            AddressScope::Mdns
        );
        assert_eq!(classify_address("not-an-ip"), AddressScope::Opaque);
    }

    #[test]
    fn test_nat_precedence_relay_wins() {
        let nat = nat_type_from_candidates(&[
            cand("host", "192.168.1.5"),
            cand("srflx", "73.158.42.218"),
            cand("relay", "198.51.100.7"),
        ]);
        assert_eq!(nat, NatType::Relay);
    }

    #[test]
    fn test_nat_precedence_host_only() {
        let nat = nat_type_from_candidates(&[cand("host", "192.168.1.5")]);
        assert_eq!(nat, NatType::Host);
    }

    #[test]
    fn test_nat_precedence_empty_is_unknown() {
        assert_eq!(nat_type_from_candidates(&[]), NatType::Unknown);
    }

    #[test]
    fn test_private_address_is_leak_regardless_of_nat() {
        let report = analyze_candidates(&observed(vec![
            cand("host", "192.168.1.105"),
            cand("relay", "198.51.100.7"),
        ]));
        assert_eq!(report.nat_type, NatType::Relay);
        assert!(report.is_leak);
        assert!(report.local_addresses.contains("192.168.1.105"));
    }

    #[test]
    fn test_relay_address_never_counts_as_exposure() {
        let report = analyze_candidates(&observed(vec![cand("relay", "198.51.100.7")]));
        assert_eq!(report.nat_type, NatType::Relay);
        assert!(!report.is_leak);
        assert!(report.public_addresses.is_empty());
    }

    #[test]
    fn test_srflx_is_public_exposure() {
        let report = analyze_candidates(&observed(vec![cand("srflx", "73.158.42.218")]));
        assert!(report.is_leak);
        assert!(report.public_addresses.contains("73.158.42.218"));
        assert!(report
            .risks
            .iter()
            .any(|r| r.severity == Severity::High));
    }

    #[test]
    fn test_both_exposures_escalate_to_critical() {
        let report = analyze_candidates(&observed(vec![
            cand("host", "192.168.1.5"),
            cand("srflx", "73.158.42.218"),
        ]));
        assert!(report.is_leak);
        assert_eq!(report.risks[0].severity, Severity::Critical);
    }

    #[test]
    fn test_mdns_and_ipv6_categories() {
        let report = analyze_candidates(&observed(vec![
            cand("host", "03f2b1e4-1a2b.local"),
            cand("host", "2001:db8::5"),
        ]));
        assert!(report.is_leak);
        assert!(report.mdns_hostnames.contains("03f2b1e4-1a2b.local"));
        assert!(report.ipv6_addresses.contains("2001:db8::5"));
        // mDNS names are not local IPs
        assert!(report.local_addresses.is_empty());
    }

    #[test]
    fn test_unsupported_is_clean_unknown() {
        let report = analyze_candidates(&WebRtcObservation::unsupported());
        assert!(!report.supported);
        assert!(!report.is_leak);
        assert_eq!(report.nat_type, NatType::Unknown);
        assert!(report.risks.is_empty());
    }

    #[test]
    fn test_timeout_with_no_candidates_is_unknown() {
        let report = analyze_candidates(&WebRtcObservation {
            supported: true,
            timed_out: true,
            candidates: Vec::new(),
        });
        assert_eq!(report.nat_type, NatType::Unknown);
        assert!(!report.is_leak);
    }
}
