//! Canvas rendering fingerprint
//!
//! Draws a fixed scene (text, emoji, gradient, composited circles) onto an
//! off-DOM canvas and reduces the raw RGBA buffer to a digest. Two machines
//! with identical GPU/driver/font-rasterizer stacks produce the same hash;
//! any difference in anti-aliasing, hinting or color handling moves it.

use std::f64::consts::PI;

use crate::capability::CapabilityTable;
use crate::collectors::{document, OffscreenCanvas2d};
use crate::error::Result;
use crate::sample::{FingerprintFamily, FingerprintSample, SampleBuilder};
use crate::timing;

const CANVAS_WIDTH: u32 = 280;
const CANVAS_HEIGHT: u32 = 60;

/// Pangram plus emoji, the classic probe string: exercises kerning,
/// subpixel AA and the color-emoji pipeline in one draw.
const PROBE_TEXT: &str = "Cwm fjordbank glyphs vext quiz, \u{1F603}";

pub struct CanvasFingerprinter;

impl CanvasFingerprinter {
    /// Render the probe scene and digest the pixel buffer.
    ///
    /// Never throws: a missing or blocked 2D context yields
    /// `supported: false` with an empty hash.
    pub async fn detect(caps: &CapabilityTable) -> FingerprintSample {
        if !caps.canvas_2d {
            return FingerprintSample::unsupported(FingerprintFamily::Canvas);
        }

        // Yield once so the UI gets a frame before the raster work
        timing::sleep_ms(0).await;

        match Self::render() {
            Ok(sample) => sample,
            Err(e) => {
                log::warn!("canvas probe degraded to unsupported: {}", e);
                FingerprintSample::unsupported(FingerprintFamily::Canvas)
            }
        }
    }

    fn render() -> Result<FingerprintSample> {
        let document = document()?;
        let surface = match OffscreenCanvas2d::create(&document, CANVAS_WIDTH, CANVAS_HEIGHT)? {
            Some(s) => s,
            None => return Ok(FingerprintSample::unsupported(FingerprintFamily::Canvas)),
        };
        let ctx = &surface.ctx;

        ctx.set_text_baseline("alphabetic");

        // Phase 0: emoji fidelity. Drawn alone with the default black fill:
        // a color-emoji font produces chromatic pixels, a tofu box stays
        // grayscale. Cleared before the scene proper.
        ctx.set_font("24px Arial");
        let _ = ctx.fill_text("\u{1F603}", 10.0, 30.0);
        let emoji_rendering = Self::colored_pixels(&surface)? > 0;
        ctx.clear_rect(0.0, 0.0, CANVAS_WIDTH as f64, CANVAS_HEIGHT as f64);

        // Phase 1: text in two sizes over a colored rect
        ctx.set_fill_style_str("#f60");
        ctx.fill_rect(125.0, 1.0, 62.0, 20.0);
        ctx.set_fill_style_str("#069");
        ctx.set_font("11pt Arial");
        let _ = ctx.fill_text(PROBE_TEXT, 2.0, 15.0);
        ctx.set_fill_style_str("rgba(102, 204, 0, 0.2)");
        ctx.set_font("18pt Arial");
        let _ = ctx.fill_text(PROBE_TEXT, 4.0, 45.0);
        let after_text = Self::lit_pixels(&surface)?;

        // Phase 2: gradient band
        let gradient = ctx.create_linear_gradient(0.0, 50.0, CANVAS_WIDTH as f64, 50.0);
        let _ = gradient.add_color_stop(0.0, "#ff0000");
        let _ = gradient.add_color_stop(0.5, "#00ff00");
        let _ = gradient.add_color_stop(1.0, "#0000ff");
        ctx.set_fill_style_canvas_gradient(&gradient);
        ctx.fill_rect(0.0, 50.0, CANVAS_WIDTH as f64, 10.0);
        let after_gradient = Self::lit_pixels(&surface)?;

        // Phase 3: composited circles (blend-mode quirks)
        let _ = ctx.set_global_composite_operation("multiply");
        for (color, x) in [("#f2f", 40.0), ("#2ff", 80.0), ("#ff2", 60.0)] {
            ctx.set_fill_style_str(color);
            ctx.begin_path();
            let _ = ctx.arc(x, 30.0, 20.0, 0.0, PI * 2.0);
            ctx.fill();
        }

        let pixels = Self::pixel_buffer(&surface)?;
        let distinct = Self::distinct_colors(&pixels);
        let text_rendering = after_text > 0;
        let gradient_rendering = after_gradient > after_text;

        // log2(distinct colors): a blank or normalized canvas scores near
        // zero, a real AA'd render scores well above the uniqueness cutoff
        let entropy_bits = ((distinct + 1) as f64).log2();

        surface.release();

        Ok(SampleBuilder::new(FingerprintFamily::Canvas)
            .payload(&pixels)
            .feature("width", CANVAS_WIDTH)
            .feature("height", CANVAS_HEIGHT)
            .feature("textRendering", text_rendering)
            .feature("emojiRendering", emoji_rendering)
            .feature("gradientRendering", gradient_rendering)
            .feature("litPixels", after_gradient as i64)
            .feature("distinctColors", distinct as i64)
            .entropy_bits(entropy_bits)
            .finish())
    }

    fn pixel_buffer(surface: &OffscreenCanvas2d) -> Result<Vec<u8>> {
        let image = surface
            .ctx
            .get_image_data(0.0, 0.0, CANVAS_WIDTH as f64, CANVAS_HEIGHT as f64)
            .map_err(|e| crate::error::ProbeError::Canvas(format!("getImageData: {:?}", e)))?;
        Ok(image.data().0)
    }

    fn lit_pixels(surface: &OffscreenCanvas2d) -> Result<u32> {
        let pixels = Self::pixel_buffer(surface)?;
        Ok(pixels.chunks_exact(4).filter(|px| px[3] != 0).count() as u32)
    }

    fn colored_pixels(surface: &OffscreenCanvas2d) -> Result<u32> {
        let pixels = Self::pixel_buffer(surface)?;
        Ok(pixels
            .chunks_exact(4)
            .filter(|px| px[3] != 0 && !(px[0] == px[1] && px[1] == px[2]))
            .count() as u32)
    }

    fn distinct_colors(pixels: &[u8]) -> usize {
        let mut seen = std::collections::BTreeSet::new();
        for px in pixels.chunks_exact(4) {
            seen.insert(u32::from_be_bytes([px[0], px[1], px[2], px[3]]));
        }
        seen.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distinct_colors() {
        // 2 distinct RGBA values across 3 pixels
        let pixels = [255, 0, 0, 255, 255, 0, 0, 255, 0, 255, 0, 255];
        assert_eq!(CanvasFingerprinter::distinct_colors(&pixels), 2);
        assert_eq!(CanvasFingerprinter::distinct_colors(&[]), 0);
    }
}
