#![forbid(unsafe_code)]

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use wetcheck_contracts::record::EncodedImage;

/// Resolution/quality bound applied by the capture pipeline before an
/// image ever reaches the record. The pixel codec itself lives in the
/// host shell; this crate owns the envelope and the dimension math.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundedImageSpec {
    pub max_dimension: u32,
    pub quality_pct: u8,
}

impl BoundedImageSpec {
    /// Field photos: 800px bound, 70% quality.
    pub fn photo_v1() -> Self {
        Self {
            max_dimension: 800,
            quality_pct: 70,
        }
    }

    /// Company logos: 400px bound, 90% quality.
    pub fn logo_v1() -> Self {
        Self {
            max_dimension: 400,
            quality_pct: 90,
        }
    }
}

/// Aspect-preserving fit into a square bound. Never upscales.
pub fn fit_within(width: u32, height: u32, max: u32) -> (u32, u32) {
    if width <= max && height <= max {
        return (width, height);
    }
    if width >= height {
        let scaled = ((height as f64) * (max as f64) / (width as f64)).round() as u32;
        (max, scaled.max(1))
    } else {
        let scaled = ((width as f64) * (max as f64) / (height as f64)).round() as u32;
        (scaled.max(1), max)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageEncodingFailure {
    pub detail: String,
}

impl ImageEncodingFailure {
    fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

pub fn to_data_uri(image: &EncodedImage) -> String {
    format!("data:{};base64,{}", image.media_type, image.base64_data)
}

pub fn from_data_uri(
    uri: &str,
    width: u32,
    height: u32,
) -> Result<EncodedImage, ImageEncodingFailure> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| ImageEncodingFailure::new("missing data: scheme"))?;
    let (media_type, payload) = rest
        .split_once(";base64,")
        .ok_or_else(|| ImageEncodingFailure::new("missing ;base64, separator"))?;
    BASE64
        .decode(payload)
        .map_err(|e| ImageEncodingFailure::new(format!("invalid base64 payload: {e}")))?;
    EncodedImage::new(media_type, payload, width, height)
        .map_err(|_| ImageEncodingFailure::new("malformed image envelope"))
}

/// Raw encoded bytes (e.g. the JPEG stream) of a normalized image.
pub fn decode_payload(image: &EncodedImage) -> Result<Vec<u8>, ImageEncodingFailure> {
    BASE64
        .decode(&image.base64_data)
        .map_err(|e| ImageEncodingFailure::new(format!("invalid base64 payload: {e}")))
}

pub fn encode_payload(
    media_type: &str,
    bytes: &[u8],
    width: u32,
    height: u32,
) -> Result<EncodedImage, ImageEncodingFailure> {
    if bytes.is_empty() {
        return Err(ImageEncodingFailure::new("empty image payload"));
    }
    EncodedImage::new(media_type, BASE64.encode(bytes), width, height)
        .map_err(|_| ImageEncodingFailure::new("malformed image envelope"))
}
