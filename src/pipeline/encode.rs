//! Image encoding: `DynamicImage` ⇄ base64 PNG.
//!
//! Every backend ships pictures as base64 inside a JSON body: OpenAI-style
//! endpoints want a `data:` URI, llama-stack wants the bare payload, and
//! edgequake-llm providers take an [`ImageData`]. PNG is used throughout
//! because it is lossless; charts and diagrams lose legibility under JPEG
//! artefacts.

use crate::error::PicDescError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode a picture as base64 PNG (no data-URI prefix).
pub fn encode_png_base64(img: &DynamicImage) -> Result<String, PicDescError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| PicDescError::ImageEncode(e.to_string()))?;

    let b64 = STANDARD.encode(&buf);
    debug!(
        "Encoded {}x{} picture → {} bytes base64",
        img.width(),
        img.height(),
        b64.len()
    );
    Ok(b64)
}

/// Encode a picture as a `data:image/png;base64,…` URI.
pub fn to_data_uri(img: &DynamicImage) -> Result<String, PicDescError> {
    Ok(format!("data:image/png;base64,{}", encode_png_base64(img)?))
}

/// Encode a picture for an edgequake-llm provider.
///
/// `detail: "high"` keeps small chart labels readable on OpenAI-class models.
pub fn to_image_data(img: &DynamicImage) -> Result<ImageData, PicDescError> {
    Ok(ImageData::new(encode_png_base64(img)?, "image/png").with_detail("high"))
}

/// Decode a `data:<mime>;base64,<payload>` URI into a picture.
///
/// A bare base64 payload without the `data:` prefix is accepted too.
pub fn decode_data_uri(uri: &str) -> Result<DynamicImage, PicDescError> {
    let payload = match uri.strip_prefix("data:") {
        Some(rest) => rest
            .split_once(";base64,")
            .map(|(_, data)| data)
            .ok_or_else(|| PicDescError::ImageDecode("data URI is not base64-encoded".into()))?,
        None => uri,
    };

    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|e| PicDescError::ImageDecode(format!("invalid base64: {e}")))?;

    image::load_from_memory(&bytes).map_err(|e| PicDescError::ImageDecode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn red_square() -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])))
    }

    #[test]
    fn encode_small_image() {
        let b64 = encode_png_base64(&red_square()).expect("encode should succeed");
        let decoded = STANDARD.decode(&b64).expect("valid base64");
        assert_eq!(&decoded[1..4], b"PNG");
    }

    #[test]
    fn data_uri_decodes_back_to_same_dimensions() {
        let uri = to_data_uri(&red_square()).unwrap();
        assert!(uri.starts_with("data:image/png;base64,"));
        let img = decode_data_uri(&uri).unwrap();
        assert_eq!((img.width(), img.height()), (10, 10));
    }

    #[test]
    fn image_data_is_png_high_detail() {
        let data = to_image_data(&red_square()).unwrap();
        assert_eq!(data.mime_type, "image/png");
        assert!(!data.data.is_empty());
    }

    #[test]
    fn rejects_non_base64_data_uri() {
        let err = decode_data_uri("data:image/png,rawbytes").unwrap_err();
        assert!(matches!(err, PicDescError::ImageDecode(_)));
    }

    #[test]
    fn rejects_garbage_payload() {
        let err = decode_data_uri("data:image/png;base64,bm90IGFuIGltYWdl").unwrap_err();
        assert!(matches!(err, PicDescError::ImageDecode(_)));
    }
}
