//! Road shield lookup keys.
//!
//! Shield sprites come in width variants named `{name}-{bucket}`, where the
//! bucket is the number of characters the shield was drawn for.

/// Widest shield variant a sprite sheet carries.
pub const MAX_SHIELD_WIDTH_BUCKET: usize = 6;

/// Semantic shield lookup: network name plus the length of the route text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShieldKey {
    pub name: String,
    pub text_len: usize,
}

impl ShieldKey {
    pub fn new(name: impl Into<String>, text_len: usize) -> Self {
        Self {
            name: name.into(),
            text_len,
        }
    }

    /// Key for a shield displaying `text`.
    pub fn for_text(name: impl Into<String>, text: &str) -> Self {
        Self::new(name, text.chars().count())
    }

    /// Preferred width bucket.
    pub fn bucket(&self) -> usize {
        self.text_len.clamp(1, MAX_SHIELD_WIDTH_BUCKET)
    }

    /// Sprite names to try, preferred first, narrowing to bucket 1.
    pub fn candidates(&self) -> impl Iterator<Item = String> + '_ {
        (1..=self.bucket())
            .rev()
            .map(move |bucket| format!("{}-{}", self.name, bucket))
    }
}
