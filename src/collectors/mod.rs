//! Passive fingerprint collectors
//!
//! Each collector family renders or measures something deterministic and
//! reduces it to a [`FingerprintSample`](crate::sample::FingerprintSample).
//! Collectors are stateless across calls: `detect()` allocates fresh
//! browser resources, releases them before resolving, and is idempotent for
//! a fixed environment.

pub mod audio;
pub mod browser_config;
pub mod canvas;
pub mod fonts;
pub mod webgl;

use wasm_bindgen::JsCast;
use web_sys::{CanvasRenderingContext2d, Document, HtmlCanvasElement};

use crate::error::{ProbeError, Result};

/// Shared plumbing: an off-DOM canvas with its 2D context.
///
/// The element is never attached to the document; dropping the struct is
/// enough to release it, `release()` just shrinks it to 0×0 first so the
/// backing store goes away immediately.
pub(crate) struct OffscreenCanvas2d {
    pub canvas: HtmlCanvasElement,
    pub ctx: CanvasRenderingContext2d,
}

impl OffscreenCanvas2d {
    pub fn create(document: &Document, width: u32, height: u32) -> Result<Option<Self>> {
        let canvas: HtmlCanvasElement = document
            .create_element("canvas")
            .map_err(|e| ProbeError::Canvas(format!("createElement failed: {:?}", e)))?
            .dyn_into()
            .map_err(|_| ProbeError::Canvas("element is not a canvas".into()))?;

        canvas.set_width(width);
        canvas.set_height(height);

        let ctx = match canvas.get_context("2d") {
            Ok(Some(obj)) => match obj.dyn_into::<CanvasRenderingContext2d>() {
                Ok(ctx) => ctx,
                Err(_) => return Ok(None),
            },
            // Null context and throwing getContext both mean "no 2D canvas"
            Ok(None) | Err(_) => return Ok(None),
        };

        Ok(Some(Self { canvas, ctx }))
    }

    pub fn release(self) {
        self.canvas.set_width(0);
        self.canvas.set_height(0);
    }
}

pub(crate) fn document() -> Result<Document> {
    web_sys::window()
        .ok_or(ProbeError::NoWindow)?
        .document()
        .ok_or(ProbeError::NoDocument)
}
