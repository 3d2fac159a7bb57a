//! Audio stack fingerprint
//!
//! Renders a fixed oscillator → dynamics-compressor graph through an
//! OfflineAudioContext and digests the float sample buffer. The compressor
//! curve is where DSP implementations diverge, so the tail of the render is
//! what actually identifies the stack. Offline contexts don't count against
//! the browser's live-context budget and are released on drop.

use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;
use web_sys::{AudioBuffer, OfflineAudioContext, OscillatorType};

use crate::capability::CapabilityTable;
use crate::error::{ProbeError, Result};
use crate::sample::{FingerprintFamily, FingerprintSample, SampleBuilder};
use crate::timing;

const SAMPLE_RATE: f32 = 44_100.0;
const RENDER_FRAMES: u32 = 5_000;
const OSCILLATOR_HZ: f32 = 10_000.0;

pub struct AudioFingerprinter;

impl AudioFingerprinter {
    pub async fn detect(caps: &CapabilityTable) -> FingerprintSample {
        if !caps.offline_audio {
            return FingerprintSample::unsupported(FingerprintFamily::Audio);
        }

        timing::sleep_ms(0).await;

        match Self::render().await {
            Ok(sample) => sample,
            Err(e) => {
                log::warn!("audio probe degraded to unsupported: {}", e);
                FingerprintSample::unsupported(FingerprintFamily::Audio)
            }
        }
    }

    async fn render() -> Result<FingerprintSample> {
        let ctx = OfflineAudioContext::new_with_number_of_channels_and_length_and_sample_rate(
            1,
            RENDER_FRAMES,
            SAMPLE_RATE,
        )
        .map_err(|e| ProbeError::Audio(format!("OfflineAudioContext: {:?}", e)))?;

        let oscillator = ctx
            .create_oscillator()
            .map_err(|e| ProbeError::Audio(format!("createOscillator: {:?}", e)))?;
        oscillator.set_type(OscillatorType::Triangle);
        oscillator.frequency().set_value(OSCILLATOR_HZ);

        let compressor = ctx
            .create_dynamics_compressor()
            .map_err(|e| ProbeError::Audio(format!("createDynamicsCompressor: {:?}", e)))?;
        compressor.threshold().set_value(-50.0);
        compressor.knee().set_value(40.0);
        compressor.ratio().set_value(12.0);
        compressor.attack().set_value(0.0);
        compressor.release().set_value(0.25);

        oscillator
            .connect_with_audio_node(&compressor)
            .map_err(|e| ProbeError::Audio(format!("connect: {:?}", e)))?;
        compressor
            .connect_with_audio_node(&ctx.destination())
            .map_err(|e| ProbeError::Audio(format!("connect: {:?}", e)))?;

        oscillator
            .start()
            .map_err(|e| ProbeError::Audio(format!("start: {:?}", e)))?;

        let rendering = ctx
            .start_rendering()
            .map_err(|e| ProbeError::Audio(format!("startRendering: {:?}", e)))?;
        let buffer: AudioBuffer = JsFuture::from(rendering)
            .await
            .map_err(|e| ProbeError::Audio(format!("rendering failed: {:?}", e)))?
            .dyn_into()
            .map_err(|_| ProbeError::Audio("render result is not an AudioBuffer".into()))?;

        let samples = buffer
            .get_channel_data(0)
            .map_err(|e| ProbeError::Audio(format!("getChannelData: {:?}", e)))?;

        Ok(Self::reduce(&samples))
    }

    /// Digest the rendered buffer; the compressor tail (last ~500 frames)
    /// drives the summary features.
    fn reduce(samples: &[f32]) -> FingerprintSample {
        let mut payload = Vec::with_capacity(samples.len() * 4);
        for s in samples {
            payload.extend_from_slice(&s.to_le_bytes());
        }

        let tail_start = samples.len().saturating_sub(500);
        let tail_sum: f64 = samples[tail_start..].iter().map(|s| s.abs() as f64).sum();
        let non_zero = samples.iter().filter(|s| **s != 0.0).count();
        let distinct = Self::distinct_magnitudes(samples);

        SampleBuilder::new(FingerprintFamily::Audio)
            .payload(&payload)
            .feature("sampleRate", SAMPLE_RATE as f64)
            .feature("frames", samples.len() as i64)
            .feature("tailSum", tail_sum)
            .feature("nonZeroFrames", non_zero as i64)
            .entropy_bits(((distinct + 1) as f64).log2())
            .finish()
    }

    fn distinct_magnitudes(samples: &[f32]) -> usize {
        let mut seen = std::collections::BTreeSet::new();
        for s in samples {
            seen.insert(s.to_bits());
        }
        seen.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reduce_deterministic() {
        let samples: Vec<f32> = (0..1000).map(|i| (i as f32 * 0.001).sin()).collect();
        let a = AudioFingerprinter::reduce(&samples);
        let b = AudioFingerprinter::reduce(&samples);
        assert_eq!(a.hash, b.hash);
        assert!(a.supported);
    }

    #[test]
    fn test_reduce_sensitive_to_one_sample() {
        let samples: Vec<f32> = (0..1000).map(|i| (i as f32 * 0.001).sin()).collect();
        let mut tweaked = samples.clone();
        tweaked[999] += 1.0e-6;
        let a = AudioFingerprinter::reduce(&samples);
        let b = AudioFingerprinter::reduce(&tweaked);
        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn test_silent_buffer_has_low_entropy() {
        let silent = vec![0.0f32; 1000];
        let sample = AudioFingerprinter::reduce(&silent);
        // one distinct bit pattern → log2(2) = 1 bit
        assert!(sample.entropy_bits.unwrap() <= 1.0);
    }
}
