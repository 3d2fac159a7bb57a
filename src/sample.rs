//! Fingerprint samples and digest plumbing
//!
//! One [`FingerprintSample`] per collector family. The hash is a SHA-256
//! digest over the raw measurement payload plus a canonical rendering of the
//! feature map, so it is deterministic for a fixed environment and changes
//! whenever any contributing feature changes. It is a pseudo-identifier, not
//! a security hash.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Collector family that produced a sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FingerprintFamily {
    Canvas,
    WebGl,
    Audio,
    Fonts,
}

impl FingerprintFamily {
    pub fn name(&self) -> &'static str {
        match self {
            FingerprintFamily::Canvas => "canvas",
            FingerprintFamily::WebGl => "webgl",
            FingerprintFamily::Audio => "audio",
            FingerprintFamily::Fonts => "fonts",
        }
    }
}

/// A single collector-specific scalar feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl FeatureValue {
    /// Canonical text rendering used as digest input.
    ///
    /// Prefixed by kind so `Int(1)` and `Text("1")` digest differently.
    fn canonical(&self) -> String {
        match self {
            FeatureValue::Bool(b) => format!("b:{}", b),
            FeatureValue::Int(i) => format!("i:{}", i),
            FeatureValue::Float(f) => format!("f:{}", f),
            FeatureValue::Text(s) => format!("t:{}", s),
        }
    }
}

impl From<bool> for FeatureValue {
    fn from(v: bool) -> Self {
        FeatureValue::Bool(v)
    }
}

impl From<i64> for FeatureValue {
    fn from(v: i64) -> Self {
        FeatureValue::Int(v)
    }
}

impl From<u32> for FeatureValue {
    fn from(v: u32) -> Self {
        FeatureValue::Int(v as i64)
    }
}

impl From<f64> for FeatureValue {
    fn from(v: f64) -> Self {
        FeatureValue::Float(v)
    }
}

impl From<&str> for FeatureValue {
    fn from(v: &str) -> Self {
        FeatureValue::Text(v.to_string())
    }
}

impl From<String> for FeatureValue {
    fn from(v: String) -> Self {
        FeatureValue::Text(v)
    }
}

/// Output of one fingerprint collector.
///
/// Created fresh on each detection run, never mutated after construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FingerprintSample {
    pub family: FingerprintFamily,
    pub supported: bool,
    /// Stable hex digest of the measurement output; empty when unsupported
    pub hash: String,
    pub raw_features: BTreeMap<String, FeatureValue>,
    /// Rough information-theoretic uniqueness estimate, in bits.
    ///
    /// An approximation for tiering, not a calibrated entropy measurement.
    pub entropy_bits: Option<f64>,
}

impl FingerprintSample {
    /// The typed outcome for an absent browser API: a finding, not an error.
    pub fn unsupported(family: FingerprintFamily) -> Self {
        Self {
            family,
            supported: false,
            hash: String::new(),
            raw_features: BTreeMap::new(),
            entropy_bits: None,
        }
    }
}

/// Accumulates a measurement payload and feature map, then digests both.
///
/// `BTreeMap` ordering keeps the digest input canonical regardless of the
/// order features were recorded in.
pub struct SampleBuilder {
    family: FingerprintFamily,
    features: BTreeMap<String, FeatureValue>,
    payload: Vec<u8>,
    entropy_bits: Option<f64>,
}

impl SampleBuilder {
    pub fn new(family: FingerprintFamily) -> Self {
        Self {
            family,
            features: BTreeMap::new(),
            payload: Vec::new(),
            entropy_bits: None,
        }
    }

    pub fn feature(mut self, key: &str, value: impl Into<FeatureValue>) -> Self {
        self.features.insert(key.to_string(), value.into());
        self
    }

    /// Append raw measurement bytes (pixel buffer, sample buffer, …)
    pub fn payload(mut self, bytes: &[u8]) -> Self {
        self.payload.extend_from_slice(bytes);
        self
    }

    pub fn entropy_bits(mut self, bits: f64) -> Self {
        self.entropy_bits = Some(bits);
        self
    }

    pub fn finish(self) -> FingerprintSample {
        let mut hasher = Sha256::new();
        hasher.update(self.family.name().as_bytes());
        hasher.update([0u8]);
        hasher.update(&self.payload);
        for (key, value) in &self.features {
            hasher.update([0u8]);
            hasher.update(key.as_bytes());
            hasher.update([b'=']);
            hasher.update(value.canonical().as_bytes());
        }
        let hash = hex::encode(hasher.finalize());

        FingerprintSample {
            family: self.family,
            supported: true,
            hash,
            raw_features: self.features,
            entropy_bits: self.entropy_bits,
        }
    }
}

/// `log2(observed + 1) + log2(universe)` — the rough uniqueness estimate
/// reported alongside enumeration-style fingerprints.
///
/// Illustrative only; the `+1` keeps an empty observation finite.
pub fn approx_entropy_bits(observed: usize, universe: usize) -> f64 {
    let universe = universe.max(1);
    ((observed + 1) as f64).log2() + (universe as f64).log2()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_builder() -> SampleBuilder {
        SampleBuilder::new(FingerprintFamily::Canvas)
            .payload(&[1, 2, 3, 4])
            .feature("width", 280u32)
            .feature("winding", true)
    }

    #[test]
    fn test_hash_deterministic() {
        let a = base_builder().finish();
        let b = base_builder().finish();
        assert_eq!(a.hash, b.hash);
        assert!(!a.hash.is_empty());
    }

    #[test]
    fn test_hash_sensitive_to_payload() {
        let a = base_builder().finish();
        let b = SampleBuilder::new(FingerprintFamily::Canvas)
            .payload(&[1, 2, 3, 5])
            .feature("width", 280u32)
            .feature("winding", true)
            .finish();
        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn test_hash_sensitive_to_any_feature() {
        let a = base_builder().finish();
        let b = base_builder().feature("winding", false).finish();
        let c = base_builder().feature("extra", "x").finish();
        assert_ne!(a.hash, b.hash);
        assert_ne!(a.hash, c.hash);
        assert_ne!(b.hash, c.hash);
    }

    #[test]
    fn test_feature_order_does_not_matter() {
        let a = SampleBuilder::new(FingerprintFamily::WebGl)
            .feature("vendor", "WebKit")
            .feature("renderer", "ANGLE")
            .finish();
        let b = SampleBuilder::new(FingerprintFamily::WebGl)
            .feature("renderer", "ANGLE")
            .feature("vendor", "WebKit")
            .finish();
        assert_eq!(a.hash, b.hash);
    }

    #[test]
    fn test_family_contributes_to_hash() {
        let a = SampleBuilder::new(FingerprintFamily::Canvas).finish();
        let b = SampleBuilder::new(FingerprintFamily::Audio).finish();
        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn test_unsupported_shape() {
        let s = FingerprintSample::unsupported(FingerprintFamily::WebGl);
        assert!(!s.supported);
        assert!(s.hash.is_empty());
        assert!(s.raw_features.is_empty());
        assert!(s.entropy_bits.is_none());
    }

    #[test]
    fn test_entropy_approximation() {
        // 31 fonts out of a 70-font reference list: log2(32) + log2(70)
        let bits = approx_entropy_bits(31, 70);
        assert!((bits - (5.0 + 70f64.log2())).abs() < 1e-9);

        // Empty observation stays finite
        assert!(approx_entropy_bits(0, 70).is_finite());
    }
}
