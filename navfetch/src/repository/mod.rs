//! Cache-backed repositories of decoded resources.

mod decoder;
mod resource;

pub use decoder::{DecodedImage, ImageDecoder, JsonDecoder, RawDecoder, ResourceDecoder};
pub use resource::{ResourceCompletion, ResourceRepository};

#[cfg(test)]
pub(crate) use decoder::testing;

/// Repository of validated images.
pub type ImageRepository = ResourceRepository<ImageDecoder>;
