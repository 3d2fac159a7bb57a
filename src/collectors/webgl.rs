//! WebGL capability fingerprint
//!
//! Reads vendor/renderer strings (masked and, where the debug extension is
//! exposed, unmasked), the supported extension list and a fixed set of
//! numeric capability limits, then digests the canonical concatenation.
//! Context-creation failure is the `supported: false` outcome, not an error.

use js_sys::{Float32Array, Function, Int32Array, Reflect};
use wasm_bindgen::{JsCast, JsValue};
use web_sys::WebGlRenderingContext as Gl;

use crate::capability::CapabilityTable;
use crate::collectors::document;
use crate::error::{ProbeError, Result};
use crate::sample::{FingerprintFamily, FingerprintSample, SampleBuilder};
use crate::timing;

// WEBGL_debug_renderer_info constants; the extension object itself is the
// only way to learn them, so they are spelled out here.
const UNMASKED_VENDOR_WEBGL: u32 = 0x9245;
const UNMASKED_RENDERER_WEBGL: u32 = 0x9246;

/// Numeric capability limits read in fixed order
const NUMERIC_LIMITS: &[(&str, u32)] = &[
    ("maxTextureSize", Gl::MAX_TEXTURE_SIZE),
    ("maxCubeMapTextureSize", Gl::MAX_CUBE_MAP_TEXTURE_SIZE),
    ("maxRenderbufferSize", Gl::MAX_RENDERBUFFER_SIZE),
    ("maxVertexAttribs", Gl::MAX_VERTEX_ATTRIBS),
    ("maxVaryingVectors", Gl::MAX_VARYING_VECTORS),
    ("maxVertexUniformVectors", Gl::MAX_VERTEX_UNIFORM_VECTORS),
    ("maxFragmentUniformVectors", Gl::MAX_FRAGMENT_UNIFORM_VECTORS),
    ("maxCombinedTextureImageUnits", Gl::MAX_COMBINED_TEXTURE_IMAGE_UNITS),
    ("maxTextureImageUnits", Gl::MAX_TEXTURE_IMAGE_UNITS),
    ("maxVertexTextureImageUnits", Gl::MAX_VERTEX_TEXTURE_IMAGE_UNITS),
    ("maxViewportDims", Gl::MAX_VIEWPORT_DIMS),
    ("aliasedLineWidthRange", Gl::ALIASED_LINE_WIDTH_RANGE),
    ("aliasedPointSizeRange", Gl::ALIASED_POINT_SIZE_RANGE),
    ("depthBits", Gl::DEPTH_BITS),
    ("stencilBits", Gl::STENCIL_BITS),
];

pub struct WebGlFingerprinter;

impl WebGlFingerprinter {
    pub async fn detect(caps: &CapabilityTable) -> FingerprintSample {
        if !caps.webgl {
            return FingerprintSample::unsupported(FingerprintFamily::WebGl);
        }

        timing::sleep_ms(0).await;

        match Self::probe() {
            Ok(sample) => sample,
            Err(e) => {
                log::warn!("webgl probe degraded to unsupported: {}", e);
                FingerprintSample::unsupported(FingerprintFamily::WebGl)
            }
        }
    }

    fn probe() -> Result<FingerprintSample> {
        let document = document()?;
        let canvas: web_sys::HtmlCanvasElement = document
            .create_element("canvas")
            .map_err(|e| ProbeError::WebGl(format!("createElement failed: {:?}", e)))?
            .dyn_into()
            .map_err(|_| ProbeError::WebGl("element is not a canvas".into()))?;

        let gl = match Self::context(&canvas) {
            Some(gl) => gl,
            None => return Ok(FingerprintSample::unsupported(FingerprintFamily::WebGl)),
        };

        let vendor = Self::string_parameter(&gl, Gl::VENDOR);
        let renderer = Self::string_parameter(&gl, Gl::RENDERER);
        let version = Self::string_parameter(&gl, Gl::VERSION);
        let shading = Self::string_parameter(&gl, Gl::SHADING_LANGUAGE_VERSION);

        // Unmasked strings need the debug extension; absence is normal
        let debug_ext = gl
            .get_extension("WEBGL_debug_renderer_info")
            .ok()
            .flatten();
        let (unmasked_vendor, unmasked_renderer) = if debug_ext.is_some() {
            (
                Self::string_parameter(&gl, UNMASKED_VENDOR_WEBGL),
                Self::string_parameter(&gl, UNMASKED_RENDERER_WEBGL),
            )
        } else {
            (String::new(), String::new())
        };

        let mut extensions: Vec<String> = gl
            .get_supported_extensions()
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_string())
                    .collect()
            })
            .unwrap_or_default();
        extensions.sort_unstable();

        let mut builder = SampleBuilder::new(FingerprintFamily::WebGl)
            .feature("vendor", vendor.as_str())
            .feature("renderer", renderer.as_str())
            .feature("unmaskedVendor", unmasked_vendor.as_str())
            .feature("unmaskedRenderer", unmasked_renderer.as_str())
            .feature("version", version.as_str())
            .feature("shadingLanguageVersion", shading.as_str())
            .feature("extensionCount", extensions.len() as i64)
            .feature("extensions", extensions.join(" "));

        for (name, pname) in NUMERIC_LIMITS {
            builder = builder.feature(name, Self::parameter_string(&gl, *pname));
        }

        // Identity strength estimate: a spoofed/normalized stack shortens
        // both the renderer string and the extension list
        let effective_renderer = if unmasked_renderer.is_empty() {
            &renderer
        } else {
            &unmasked_renderer
        };
        let entropy_bits = ((extensions.len() + 1) as f64).log2()
            + ((effective_renderer.len() + 1) as f64).log2();

        Self::release(&gl);

        Ok(builder.entropy_bits(entropy_bits).finish())
    }

    fn context(canvas: &web_sys::HtmlCanvasElement) -> Option<Gl> {
        for name in ["webgl", "experimental-webgl"] {
            if let Ok(Some(obj)) = canvas.get_context(name) {
                if let Ok(gl) = obj.dyn_into::<Gl>() {
                    return Some(gl);
                }
            }
        }
        None
    }

    fn string_parameter(gl: &Gl, pname: u32) -> String {
        gl.get_parameter(pname)
            .ok()
            .and_then(|v| v.as_string())
            .unwrap_or_default()
    }

    /// Canonical text for any parameter shape: string, number, or the
    /// Int32Array/Float32Array pairs used by viewport/aliased ranges
    fn parameter_string(gl: &Gl, pname: u32) -> String {
        let value = match gl.get_parameter(pname) {
            Ok(v) => v,
            Err(_) => return String::new(),
        };
        if let Some(s) = value.as_string() {
            return s;
        }
        if let Some(n) = value.as_f64() {
            return format!("{}", n);
        }
        if let Some(arr) = value.dyn_ref::<Int32Array>() {
            let vals: Vec<String> = arr.to_vec().iter().map(|v| v.to_string()).collect();
            return vals.join(",");
        }
        if let Some(arr) = value.dyn_ref::<Float32Array>() {
            let vals: Vec<String> = arr.to_vec().iter().map(|v| v.to_string()).collect();
            return vals.join(",");
        }
        String::new()
    }

    /// Hand the context back to the browser instead of waiting for GC
    fn release(gl: &Gl) {
        if let Ok(Some(ext)) = gl.get_extension("WEBGL_lose_context") {
            if let Ok(lose) = Reflect::get(&ext, &JsValue::from_str("loseContext")) {
                if let Some(func) = lose.dyn_ref::<Function>() {
                    let _ = func.call0(&ext);
                }
            }
        }
    }
}
