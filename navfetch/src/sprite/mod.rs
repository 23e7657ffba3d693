//! Style sprite sheets and road shields.
//!
//! A sprite generation pairs a sheet image with the JSON document describing
//! where each sprite sits in it. [`SpriteRepository`] fetches both, installs
//! them together and answers shield lookups from memory.

mod generation;
mod metadata;
mod repository;
mod shield;

pub use generation::{Generation, GenerationPhase};
pub use metadata::{SpriteInfo, SpriteMetadata};
pub use repository::{
    InstalledSprite, SpriteCompletion, SpriteError, SpriteMetadataRepository, SpriteRepository,
};
pub use shield::{ShieldKey, MAX_SHIELD_WIDTH_BUCKET};
