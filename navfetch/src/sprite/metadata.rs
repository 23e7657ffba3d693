//! Sprite sheet metadata document.

use std::collections::HashMap;

use serde::Deserialize;

/// Placement of one sprite within the sheet, in sheet pixels.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpriteInfo {
    pub width: u32,
    pub height: u32,
    pub x: u32,
    pub y: u32,
    #[serde(default = "default_pixel_ratio")]
    pub pixel_ratio: u32,
    #[serde(default)]
    pub visible: Option<bool>,
}

fn default_pixel_ratio() -> u32 {
    1
}

impl SpriteInfo {
    /// True if the rectangle lies inside a `sheet_width` × `sheet_height` sheet.
    pub fn fits_within(&self, sheet_width: u32, sheet_height: u32) -> bool {
        self.width > 0
            && self.height > 0
            && self.x.checked_add(self.width).is_some_and(|r| r <= sheet_width)
            && self.y.checked_add(self.height).is_some_and(|b| b <= sheet_height)
    }

    /// Sprites are visible unless the document says otherwise.
    pub fn is_visible(&self) -> bool {
        self.visible.unwrap_or(true)
    }
}

/// Sprite name → placement.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct SpriteMetadata {
    sprites: HashMap<String, SpriteInfo>,
}

impl SpriteMetadata {
    pub fn get(&self, name: &str) -> Option<&SpriteInfo> {
        self.sprites.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sprites.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.sprites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sprites.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sprites.keys().map(String::as_str)
    }

    /// Names whose rectangle falls outside the sheet.
    pub fn out_of_bounds(&self, sheet_width: u32, sheet_height: u32) -> Vec<&str> {
        self.sprites
            .iter()
            .filter(|(_, info)| !info.fits_within(sheet_width, sheet_height))
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

impl FromIterator<(String, SpriteInfo)> for SpriteMetadata {
    fn from_iter<I: IntoIterator<Item = (String, SpriteInfo)>>(iter: I) -> Self {
        Self {
            sprites: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"{
        "us-interstate-2": {"width": 40, "height": 38, "x": 0, "y": 0, "pixelRatio": 2},
        "default-3": {"width": 52, "height": 38, "x": 40, "y": 0, "pixelRatio": 2, "visible": false}
    }"#;

    #[test]
    fn test_parse_document() {
        let metadata: SpriteMetadata = serde_json::from_str(DOC).unwrap();

        assert_eq!(metadata.len(), 2);
        let info = metadata.get("us-interstate-2").unwrap();
        assert_eq!((info.width, info.height, info.pixel_ratio), (40, 38, 2));
        assert!(info.is_visible());
        assert!(!metadata.get("default-3").unwrap().is_visible());
    }

    #[test]
    fn test_pixel_ratio_defaults_to_one() {
        let metadata: SpriteMetadata =
            serde_json::from_str(r#"{"a": {"width": 1, "height": 1, "x": 0, "y": 0}}"#).unwrap();
        assert_eq!(metadata.get("a").unwrap().pixel_ratio, 1);
    }

    #[test]
    fn test_bounds() {
        let metadata: SpriteMetadata = serde_json::from_str(DOC).unwrap();
        assert!(metadata.out_of_bounds(92, 38).is_empty());
        assert_eq!(metadata.out_of_bounds(80, 38), vec!["default-3"]);

        let overflow = SpriteInfo {
            width: 10,
            height: 10,
            x: u32::MAX,
            y: 0,
            pixel_ratio: 1,
            visible: None,
        };
        assert!(!overflow.fits_within(100, 100));
    }
}
