//! Installed-font inference
//!
//! Browsers refuse to enumerate installed fonts, so presence is inferred
//! from layout: render a probe string with the candidate stacked over a
//! known generic family and compare the measured width against the
//! baseline widths of the generics alone. A candidate counts as installed
//! when, for at least one probe string, its measured width differs from
//! every baseline width.

use crate::capability::CapabilityTable;
use crate::collectors::{document, OffscreenCanvas2d};
use crate::error::{ProbeError, Result};
use crate::sample::{approx_entropy_bits, FingerprintFamily, FingerprintSample, SampleBuilder};
use crate::timing;

const PROBE_SIZE: &str = "72px";
const PROBE_STRINGS: &[&str] = &["mmMwWLliI0O&1", "@#$%^*()_+=~<>"];
const BASELINE_FAMILIES: &[&str] = &["monospace", "serif", "sans-serif"];

/// measureText returns identical f64s for identical layouts; the epsilon
/// only guards against sub-pixel rounding on zoomed displays
const WIDTH_EPSILON: f64 = 0.001;

/// Candidates yield to the event loop in batches of this many
const MEASURE_BATCH: usize = 24;

/// Common system/office/design fonts probed for presence
pub const REFERENCE_FONTS: &[&str] = &[
    "American Typewriter",
    "Andale Mono",
    "Apple Chancery",
    "Arial",
    "Arial Black",
    "Arial Narrow",
    "Arial Rounded MT Bold",
    "Avant Garde",
    "Baskerville",
    "Big Caslon",
    "Book Antiqua",
    "Bookman Old Style",
    "Brush Script MT",
    "Calibri",
    "Cambria",
    "Cambria Math",
    "Cantarell",
    "Century",
    "Century Gothic",
    "Century Schoolbook",
    "Comic Sans MS",
    "Consolas",
    "Copperplate",
    "Courier",
    "Courier New",
    "DejaVu Sans",
    "Didot",
    "Futura",
    "Garamond",
    "Geneva",
    "Georgia",
    "Gill Sans",
    "Helvetica",
    "Herculanum",
    "Hoefler Text",
    "Impact",
    "Liberation Sans",
    "Lucida Bright",
    "Lucida Calligraphy",
    "Lucida Console",
    "Lucida Fax",
    "Lucida Handwriting",
    "Lucida Sans",
    "Lucida Sans Typewriter",
    "Lucida Sans Unicode",
    "Marker Felt",
    "Microsoft Sans Serif",
    "Monaco",
    "Monotype Corsiva",
    "MS Gothic",
    "MS PGothic",
    "MS Reference Sans Serif",
    "MS Sans Serif",
    "MS Serif",
    "Noto Sans",
    "Optima",
    "Palatino Linotype",
    "Papyrus",
    "Rockwell",
    "Rockwell Extra Bold",
    "Segoe Print",
    "Segoe Script",
    "Segoe UI",
    "Segoe UI Light",
    "Segoe UI Semibold",
    "Segoe UI Symbol",
    "Skia",
    "Tahoma",
    "Times",
    "Times New Roman",
    "Trebuchet MS",
    "Ubuntu",
    "Verdana",
    "Wingdings",
    "Wingdings 2",
    "Wingdings 3",
    "Zapfino",
];

pub struct FontFingerprinter;

impl FontFingerprinter {
    pub async fn detect(caps: &CapabilityTable) -> FingerprintSample {
        if !caps.canvas_2d {
            return FingerprintSample::unsupported(FingerprintFamily::Fonts);
        }

        match Self::enumerate().await {
            Ok(sample) => sample,
            Err(e) => {
                log::warn!("font probe degraded to unsupported: {}", e);
                FingerprintSample::unsupported(FingerprintFamily::Fonts)
            }
        }
    }

    async fn enumerate() -> Result<FingerprintSample> {
        let document = document()?;
        let surface = match OffscreenCanvas2d::create(&document, 600, 100)? {
            Some(s) => s,
            None => return Ok(FingerprintSample::unsupported(FingerprintFamily::Fonts)),
        };

        // Fallback-only baseline widths, one row per probe string
        let mut baselines: Vec<Vec<f64>> = Vec::with_capacity(PROBE_STRINGS.len());
        for probe in PROBE_STRINGS {
            let mut row = Vec::with_capacity(BASELINE_FAMILIES.len());
            for family in BASELINE_FAMILIES {
                row.push(Self::measure(&surface, &format!("{} {}", PROBE_SIZE, family), probe)?);
            }
            baselines.push(row);
        }

        let mut detected: Vec<String> = Vec::new();
        for (i, candidate) in REFERENCE_FONTS.iter().enumerate() {
            if i > 0 && i % MEASURE_BATCH == 0 {
                // Let the UI paint between measurement batches
                timing::sleep_ms(0).await;
            }

            let mut present = false;
            for (probe, baseline_row) in PROBE_STRINGS.iter().zip(&baselines) {
                let font = format!("{} \"{}\", monospace", PROBE_SIZE, candidate);
                let width = Self::measure(&surface, &font, probe)?;
                if differs_from_all(width, baseline_row) {
                    present = true;
                    break;
                }
            }
            if present {
                detected.push(candidate.to_string());
            }
        }

        surface.release();

        detected.sort_unstable();
        let count = detected.len();
        let joined = detected.join("\n");

        Ok(SampleBuilder::new(FingerprintFamily::Fonts)
            .payload(joined.as_bytes())
            .feature("fontCount", count as i64)
            .feature("referenceListSize", REFERENCE_FONTS.len() as i64)
            .feature("fonts", joined.replace('\n', " "))
            .entropy_bits(approx_entropy_bits(count, REFERENCE_FONTS.len()))
            .finish())
    }

    fn measure(surface: &OffscreenCanvas2d, font: &str, text: &str) -> Result<f64> {
        surface.ctx.set_font(font);
        let metrics = surface
            .ctx
            .measure_text(text)
            .map_err(|e| ProbeError::Canvas(format!("measureText: {:?}", e)))?;
        Ok(metrics.width())
    }
}

/// A measured width indicates a real (non-fallback) face only when it
/// matches none of the generic baseline widths.
fn differs_from_all(measured: f64, baselines: &[f64]) -> bool {
    baselines
        .iter()
        .all(|b| (measured - b).abs() > WIDTH_EPSILON)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_list_size() {
        // The entropy estimate quotes the reference list size; keep it 70+.
        assert!(REFERENCE_FONTS.len() >= 70);
    }

    #[test]
    fn test_reference_list_has_no_duplicates() {
        let mut sorted: Vec<&str> = REFERENCE_FONTS.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), REFERENCE_FONTS.len());
    }

    #[test]
    fn test_fallback_width_is_not_presence() {
        // Candidate fell back to monospace: equals the first baseline.
        assert!(!differs_from_all(240.0, &[240.0, 251.5, 248.25]));
    }

    #[test]
    fn test_distinct_width_is_presence() {
        assert!(differs_from_all(233.109375, &[240.0, 251.5, 248.25]));
    }

    #[test]
    fn test_coincidental_baseline_match_is_conservative() {
        // Width collides with the serif baseline: treated as absent.
        assert!(!differs_from_all(251.5, &[240.0, 251.5, 248.25]));
    }
}
