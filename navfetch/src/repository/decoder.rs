//! Decoders turning fetched bytes into a repository's resource type.
//!
//! A decoder returning `None` means the payload is unusable: the repository
//! reports [`FetchError::NoData`](crate::fetch::FetchError::NoData) and does
//! not cache the bytes.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use bytes::Bytes;
use image::{DynamicImage, ImageFormat};
use serde::de::DeserializeOwned;
use tracing::debug;

/// Validates and decodes fetched bytes.
///
/// Decoding may be CPU heavy; repositories run it on the blocking pool.
pub trait ResourceDecoder: Send + Sync + 'static {
    type Output: Clone + Send + Sync + 'static;

    fn decode(&self, bytes: &Bytes) -> Option<Self::Output>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// A decoded image together with the bytes it came from.
#[derive(Clone)]
pub struct DecodedImage {
    /// Encoded bytes as fetched, suitable for caching or writing out
    pub data: Bytes,
    pub format: ImageFormat,
    pub image: Arc<DynamicImage>,
}

impl DecodedImage {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

impl fmt::Debug for DecodedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodedImage")
            .field("bytes", &self.data.len())
            .field("format", &self.format)
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}

/// Accepts any image format the `image` crate was built with.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageDecoder;

impl ResourceDecoder for ImageDecoder {
    type Output = DecodedImage;

    fn decode(&self, bytes: &Bytes) -> Option<DecodedImage> {
        let format = image::guess_format(bytes).ok()?;
        match image::load_from_memory_with_format(bytes, format) {
            Ok(image) => Some(DecodedImage {
                data: bytes.clone(),
                format,
                image: Arc::new(image),
            }),
            Err(e) => {
                debug!(error = %e, format = ?format, "Image decode failed");
                None
            }
        }
    }

    fn name(&self) -> &'static str {
        "image"
    }
}

/// Parses a JSON document into `T`.
pub struct JsonDecoder<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonDecoder<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonDecoder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for JsonDecoder<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> ResourceDecoder for JsonDecoder<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    type Output = T;

    fn decode(&self, bytes: &Bytes) -> Option<T> {
        match serde_json::from_slice(bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!(error = %e, "JSON decode failed");
                None
            }
        }
    }

    fn name(&self) -> &'static str {
        "json"
    }
}

/// Passes bytes through; only empty payloads are rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawDecoder;

impl ResourceDecoder for RawDecoder {
    type Output = Bytes;

    fn decode(&self, bytes: &Bytes) -> Option<Bytes> {
        (!bytes.is_empty()).then(|| bytes.clone())
    }

    fn name(&self) -> &'static str {
        "raw"
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use image::{ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;

    /// Encode a solid-colour PNG of the given size.
    pub fn png(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba(color));
        let mut cursor = Cursor::new(Vec::new());
        img.write_to(&mut cursor, ImageFormat::Png).unwrap();
        cursor.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::collections::HashMap;

    #[test]
    fn test_image_decoder_accepts_png() {
        let bytes = Bytes::from(testing::png(4, 3, [255, 0, 0, 255]));
        let decoded = ImageDecoder.decode(&bytes).unwrap();

        assert_eq!(decoded.format, ImageFormat::Png);
        assert_eq!((decoded.width(), decoded.height()), (4, 3));
        assert_eq!(decoded.data, bytes);
    }

    #[test]
    fn test_image_decoder_rejects_garbage() {
        assert!(ImageDecoder.decode(&Bytes::from_static(b"not an image")).is_none());
        assert!(ImageDecoder.decode(&Bytes::new()).is_none());
    }

    #[test]
    fn test_image_decoder_rejects_truncated_png() {
        let mut bytes = testing::png(16, 16, [0, 0, 255, 255]);
        bytes.truncate(bytes.len() / 2);
        assert!(ImageDecoder.decode(&Bytes::from(bytes)).is_none());
    }

    #[derive(Debug, Clone, Deserialize, PartialEq)]
    struct Entry {
        width: u32,
    }

    #[test]
    fn test_json_decoder() {
        let decoder = JsonDecoder::<HashMap<String, Entry>>::new();
        let decoded = decoder
            .decode(&Bytes::from_static(br#"{"a": {"width": 7}}"#))
            .unwrap();
        assert_eq!(decoded["a"], Entry { width: 7 });

        assert!(decoder.decode(&Bytes::from_static(b"{oops")).is_none());
    }

    #[test]
    fn test_raw_decoder() {
        assert_eq!(
            RawDecoder.decode(&Bytes::from_static(b"x")),
            Some(Bytes::from_static(b"x"))
        );
        assert_eq!(RawDecoder.decode(&Bytes::new()), None);
    }
}
