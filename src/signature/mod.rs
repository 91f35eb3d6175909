//! Signature images: the single value type both signature providers produce.
//!
//! A signature reaches a record in exactly one way: a provider (the
//! [`auto::SignatureRenderer`] or the [`capture::SignaturePad`]) produces a
//! [`SignatureImage`] and the caller assigns it with
//! [`crate::record::PersonInput::set_signature`]. There is no placeholder
//! image, so an unsigned record stays unsigned and fails validation.
//!
//! Browsers hand signatures around as `data:image/png;base64,…` URLs, so that
//! is also the serialised form used in drafts and in the uploaded metadata.

pub mod auto;
pub mod capture;

use crate::error::FormError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::RgbaImage;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::io::Cursor;
use tracing::debug;

pub use auto::SignatureRenderer;
pub use capture::SignaturePad;

/// Raster encodings the stamping engine can embed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
}

impl ImageFormat {
    pub fn mime_type(self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
        }
    }

    fn from_mime(mime: &str) -> Option<Self> {
        match mime.to_ascii_lowercase().as_str() {
            "image/png" => Some(ImageFormat::Png),
            "image/jpeg" | "image/jpg" => Some(ImageFormat::Jpeg),
            _ => None,
        }
    }

    /// Detect the format from magic bytes.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
            Some(ImageFormat::Png)
        } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(ImageFormat::Jpeg)
        } else {
            None
        }
    }

    fn as_image_format(self) -> image::ImageFormat {
        match self {
            ImageFormat::Png => image::ImageFormat::Png,
            ImageFormat::Jpeg => image::ImageFormat::Jpeg,
        }
    }
}

/// An encoded signature image plus the MIME type it was declared with.
///
/// The declared type is kept as-is (it may name an encoding the stamping
/// engine cannot embed); [`SignatureImage::format`] resolves the usable
/// format when the image is about to be drawn.
#[derive(Clone, PartialEq, Eq)]
pub struct SignatureImage {
    mime_type: String,
    bytes: Vec<u8>,
}

impl SignatureImage {
    /// Wrap raw encoded bytes, taking the MIME type from the magic bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, FormError> {
        if bytes.is_empty() {
            return Err(FormError::UnsupportedImage {
                detail: "empty image".into(),
            });
        }
        let mime_type = ImageFormat::sniff(&bytes)
            .map(|f| f.mime_type().to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string());
        Ok(Self { mime_type, bytes })
    }

    /// Parse a `data:<mime>;base64,<payload>` URL.
    pub fn from_data_url(url: &str) -> Result<Self, FormError> {
        let rest = url
            .strip_prefix("data:")
            .ok_or_else(|| FormError::UnsupportedImage {
                detail: "not a data URL".into(),
            })?;
        let (header, payload) = rest.split_once(',').ok_or_else(|| FormError::UnsupportedImage {
            detail: "data URL has no payload".into(),
        })?;
        let mime_type = header
            .strip_suffix(";base64")
            .ok_or_else(|| FormError::UnsupportedImage {
                detail: "data URL is not base64-encoded".into(),
            })?;
        let bytes = STANDARD
            .decode(payload.trim())
            .map_err(|e| FormError::UnsupportedImage {
                detail: format!("invalid base64 payload: {e}"),
            })?;
        if bytes.is_empty() {
            return Err(FormError::UnsupportedImage {
                detail: "empty image".into(),
            });
        }
        Ok(Self {
            mime_type: mime_type.to_string(),
            bytes,
        })
    }

    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, STANDARD.encode(&self.bytes))
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Resolve the embeddable format: declared MIME type first, magic bytes second.
    pub fn format(&self) -> Result<ImageFormat, FormError> {
        ImageFormat::from_mime(&self.mime_type)
            .or_else(|| ImageFormat::sniff(&self.bytes))
            .ok_or_else(|| FormError::UnsupportedImage {
                detail: format!("'{}' is neither PNG nor JPEG", self.mime_type),
            })
    }

    /// Pixel size, read from the image header.
    pub fn dimensions(&self) -> Result<(u32, u32), FormError> {
        let format = self.format()?;
        image::ImageReader::with_format(Cursor::new(&self.bytes), format.as_image_format())
            .into_dimensions()
            .map_err(|e| FormError::UnsupportedImage {
                detail: format!("cannot read {} header: {e}", format.mime_type()),
            })
    }

    /// Decode the image into RGBA pixels.
    pub fn decode(&self) -> Result<RgbaImage, FormError> {
        let format = self.format()?;
        image::load_from_memory_with_format(&self.bytes, format.as_image_format())
            .map(|img| img.to_rgba8())
            .map_err(|e| FormError::UnsupportedImage {
                detail: format!("cannot decode {}: {e}", format.mime_type()),
            })
    }
}

impl fmt::Debug for SignatureImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignatureImage")
            .field("mime_type", &self.mime_type)
            .field("bytes", &format_args!("<{} bytes>", self.bytes.len()))
            .finish()
    }
}

impl Serialize for SignatureImage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_data_url())
    }
}

impl<'de> Deserialize<'de> for SignatureImage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let url = String::deserialize(deserializer)?;
        SignatureImage::from_data_url(&url).map_err(serde::de::Error::custom)
    }
}

/// Encode a rendered signature surface as PNG.
///
/// PNG keeps the transparent background, so the stamped signature does not
/// paint a white box over the form's signature line.
pub fn encode_png(img: &RgbaImage) -> Result<SignatureImage, FormError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| FormError::Internal(format!("PNG encoding failed: {e}")))?;
    debug!("Encoded signature → {} bytes PNG", buf.len());

    Ok(SignatureImage {
        mime_type: ImageFormat::Png.mime_type().to_string(),
        bytes: buf,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn tiny_png() -> SignatureImage {
        encode_png(&RgbaImage::from_pixel(4, 2, Rgba([0, 0, 0, 255]))).expect("encode")
    }

    #[test]
    fn data_url_round_trip_preserves_bytes() {
        let img = tiny_png();
        let url = img.to_data_url();
        assert!(url.starts_with("data:image/png;base64,"));
        let back = SignatureImage::from_data_url(&url).expect("parse");
        assert_eq!(back, img);
    }

    #[test]
    fn format_prefers_declared_type() {
        let img = tiny_png();
        assert_eq!(img.format().unwrap(), ImageFormat::Png);
        let decoded = img.decode().expect("decode");
        assert_eq!((decoded.width(), decoded.height()), (4, 2));
        assert_eq!(img.dimensions().unwrap(), (4, 2));
    }

    #[test]
    fn unknown_encoding_is_rejected_at_format_time() {
        let gif = SignatureImage::from_data_url("data:image/gif;base64,R0lGODlhAQABAAAAACw=")
            .expect("data URL itself is well-formed");
        assert!(matches!(
            gif.format(),
            Err(FormError::UnsupportedImage { .. })
        ));
    }

    #[test]
    fn malformed_data_urls_are_rejected() {
        assert!(SignatureImage::from_data_url("image/png;base64,AAAA").is_err());
        assert!(SignatureImage::from_data_url("data:image/png,AAAA").is_err());
        assert!(SignatureImage::from_data_url("data:image/png;base64,").is_err());
        assert!(SignatureImage::from_data_url("data:image/png;base64,***").is_err());
    }

    #[test]
    fn sniff_detects_jpeg_magic() {
        assert_eq!(
            ImageFormat::sniff(&[0xFF, 0xD8, 0xFF, 0xE0, 0, 0]),
            Some(ImageFormat::Jpeg)
        );
        assert_eq!(ImageFormat::sniff(b"GIF89a"), None);
    }

    #[test]
    fn serde_uses_data_url_string() {
        let img = tiny_png();
        let json = serde_json::to_string(&img).unwrap();
        assert!(json.starts_with("\"data:image/png;base64,"));
        let back: SignatureImage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, img);
    }
}
