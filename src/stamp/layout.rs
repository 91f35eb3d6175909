//! Field coordinates for a form template.
//!
//! A layout maps field names to [`FieldPosition`]s in three namespaces,
//! one per block of the form. Layouts are plain JSON so a new revision of
//! the template only needs a new layout file; the built-in layout targets
//! the current membership form.

use crate::error::FormError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

const BUILTIN_LAYOUT: &str = include_str!("../../layouts/membership_v1.json");

fn default_size() -> f32 {
    10.0
}

fn default_page() -> u32 {
    1
}

/// Text direction of a field. Right-to-left fields are right-aligned at `x`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Rtl,
    Ltr,
}

/// Where one field is drawn, in PDF points from the bottom-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldPosition {
    pub x: f32,
    /// Text baseline, or the bottom edge of an image.
    pub y: f32,
    #[serde(default = "default_size")]
    pub size: f32,
    pub max_width: f32,
    #[serde(default)]
    pub direction: Direction,
}

/// The three blocks of the form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Block {
    Primary,
    Spouse,
    Payment,
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Block::Primary => "primary",
            Block::Spouse => "spouse",
            Block::Payment => "payment",
        })
    }
}

/// All field positions for one template revision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldLayout {
    pub name: String,
    /// 1-indexed page the fields live on.
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default)]
    pub primary: BTreeMap<String, FieldPosition>,
    #[serde(default)]
    pub spouse: BTreeMap<String, FieldPosition>,
    #[serde(default)]
    pub payment: BTreeMap<String, FieldPosition>,
}

impl FieldLayout {
    /// The layout for the current membership form template.
    pub fn builtin() -> Result<Self, FormError> {
        Self::from_json(BUILTIN_LAYOUT.as_bytes())
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, FormError> {
        let layout: FieldLayout = serde_json::from_slice(bytes)
            .map_err(|e| FormError::InvalidConfig(format!("invalid field layout: {e}")))?;
        layout.check()?;
        Ok(layout)
    }

    pub fn block(&self, block: Block) -> &BTreeMap<String, FieldPosition> {
        match block {
            Block::Primary => &self.primary,
            Block::Spouse => &self.spouse,
            Block::Payment => &self.payment,
        }
    }

    pub fn position(&self, block: Block, field: &str) -> Option<&FieldPosition> {
        self.block(block).get(field)
    }

    fn check(&self) -> Result<(), FormError> {
        if self.page == 0 {
            return Err(FormError::InvalidConfig(format!(
                "layout '{}': pages are numbered from 1",
                self.name
            )));
        }
        for block in [Block::Primary, Block::Spouse, Block::Payment] {
            for (field, pos) in self.block(block) {
                let finite = [pos.x, pos.y, pos.size, pos.max_width]
                    .iter()
                    .all(|v| v.is_finite());
                if !finite || pos.size <= 0.0 || pos.max_width < 0.0 {
                    return Err(FormError::InvalidConfig(format!(
                        "layout '{}': bad position for {block}.{field}",
                        self.name
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_layout_parses() {
        let layout = FieldLayout::builtin().unwrap();
        assert_eq!(layout.page, 1);
        for field in ["id_number", "first_name", "email_user", "email_domain", "signature"] {
            assert!(layout.position(Block::Primary, field).is_some(), "primary.{field}");
            assert!(layout.position(Block::Spouse, field).is_some(), "spouse.{field}");
        }
        for field in ["cardholder_name", "cardholder_id", "card_number", "expiry", "signature"] {
            assert!(layout.position(Block::Payment, field).is_some(), "payment.{field}");
        }
        assert!(layout.position(Block::Spouse, "marital_status").is_none());
    }

    #[test]
    fn defaults_apply() {
        let layout = FieldLayout::from_json(
            br#"{"name": "t", "primary": {"city": {"x": 500, "y": 600, "max_width": 80}}}"#,
        )
        .unwrap();
        let city = layout.position(Block::Primary, "city").unwrap();
        assert_eq!(city.direction, Direction::Rtl);
        assert_eq!(city.size, 10.0);
        assert_eq!(layout.page, 1);
        assert!(layout.spouse.is_empty());
    }

    #[test]
    fn rejects_nonsense_positions() {
        assert!(FieldLayout::from_json(
            br#"{"name": "t", "payment": {"cvv": {"x": 1, "y": 1, "size": 0, "max_width": 10}}}"#
        )
        .is_err());
        assert!(FieldLayout::from_json(br#"{"name": "t", "page": 0}"#).is_err());
        assert!(FieldLayout::from_json(b"[]").is_err());
    }
}
