use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::core::geometry::Rect;

/// One rendered PDF page.
#[derive(Debug, Clone)]
pub struct PageImage {
    pub page_idx: usize,
    pub image: RgbImage,
}

/// A quadrilateral on a page believed to bound one voter card.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CardRegion {
    pub page_idx: usize,
    pub bbox: Rect,
    pub vertices: usize,
    pub area: f64,
}

/// The two OCR targets cut from one card.
#[derive(Debug, Clone)]
pub struct CardSplit {
    /// Left part of the card, sharpened.
    pub primary: RgbImage,
    /// Right part of the card, untouched.
    pub secondary: RgbImage,
    /// Column in card coordinates where `secondary` begins.
    pub split_x: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecognizedLine {
    /// Four corners, clockwise from top-left, in sub-image pixels.
    pub polygon: [[f32; 2]; 4],
    pub text: String,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
}

fn default_confidence() -> f32 {
    0.0
}

impl RecognizedLine {
    pub fn new(text: impl Into<String>, polygon: [[f32; 2]; 4], confidence: f32) -> Self {
        Self {
            polygon,
            text: text.into(),
            confidence,
        }
    }
}

/// The ordered lines of one card: the first secondary line, then every primary line.
///
/// Position 0 holds the serial number and position 1 the EPIC number.
#[derive(Debug, Clone, PartialEq)]
pub struct CardTextLines {
    pub page_idx: usize,
    pub card_idx: usize,
    pub lines: Vec<RecognizedLine>,
}

impl CardTextLines {
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(|line| line.text.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Gender {
    M,
    F,
}

impl Gender {
    pub fn code(&self) -> &'static str {
        match self {
            Gender::M => "M",
            Gender::F => "F",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum RelationType {
    Fthr,
    Hsbn,
    Othr,
}

impl RelationType {
    pub fn code(&self) -> &'static str {
        match self {
            RelationType::Fthr => "FTHR",
            RelationType::Hsbn => "HSBN",
            RelationType::Othr => "OTHR",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Profile {
    pub age: Option<u32>,
    pub gender: Option<Gender>,
    pub address: Option<String>,
    pub name: Option<String>,
    pub relative_name: Option<String>,
    pub relation_type: Option<RelationType>,
    pub sl_no: Option<String>,
    pub epic_no: Option<String>,
}

/// Export row. Field order is the spreadsheet column order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VoterRecord {
    #[serde(rename = "Part S.No")]
    pub sl_no: Option<String>,
    #[serde(rename = "Voter Full Name")]
    pub name: Option<String>,
    #[serde(rename = "Relative's Name")]
    pub relative_name: Option<String>,
    #[serde(rename = "Relation Type")]
    pub relation_type: Option<String>,
    #[serde(rename = "Age")]
    pub age: Option<u32>,
    #[serde(rename = "Gender")]
    pub gender: Option<String>,
    #[serde(rename = "House No")]
    pub house_no: Option<String>,
    #[serde(rename = "EPIC No")]
    pub epic_no: Option<String>,
}

impl VoterRecord {
    pub const COLUMNS: [&'static str; 8] = [
        "Part S.No",
        "Voter Full Name",
        "Relative's Name",
        "Relation Type",
        "Age",
        "Gender",
        "House No",
        "EPIC No",
    ];

    /// Cell values in `COLUMNS` order; `None` marks a missing value.
    pub fn cells(&self) -> [Option<String>; 8] {
        [
            self.sl_no.clone(),
            self.name.clone(),
            self.relative_name.clone(),
            self.relation_type.clone(),
            self.age.map(|age| age.to_string()),
            self.gender.clone(),
            self.house_no.clone(),
            self.epic_no.clone(),
        ]
    }

    /// Serial number as a number, if it parses as one.
    pub fn serial_key(&self) -> Option<f64> {
        self.sl_no
            .as_deref()
            .and_then(|s| s.trim().parse::<f64>().ok())
            .filter(|value| value.is_finite())
    }
}

impl From<Profile> for VoterRecord {
    fn from(profile: Profile) -> Self {
        Self {
            sl_no: profile.sl_no,
            name: profile.name,
            relative_name: profile.relative_name,
            relation_type: profile.relation_type.map(|r| r.code().to_string()),
            age: profile.age,
            gender: profile.gender.map(|g| g.code().to_string()),
            house_no: profile.address,
            epic_no: profile.epic_no,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn record_serializes_with_export_column_names() {
        let record = VoterRecord::from(Profile {
            age: Some(45),
            gender: Some(Gender::F),
            relation_type: Some(RelationType::Hsbn),
            sl_no: Some("7".to_string()),
            ..Profile::default()
        });
        let value = serde_json::to_value(&record).unwrap();
        let keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        let mut expected: Vec<_> = VoterRecord::COLUMNS.iter().map(|c| c.to_string()).collect();
        expected.sort();
        let mut keys_sorted = keys.clone();
        keys_sorted.sort();
        assert_eq!(keys_sorted, expected);
        assert_eq!(value["Relation Type"], "HSBN");
        assert_eq!(value["Gender"], "F");
        assert_eq!(value["Age"], 45);
    }

    #[test]
    fn serial_key_ignores_non_numeric() {
        let mut record = VoterRecord::from(Profile::default());
        assert_eq!(record.serial_key(), None);
        record.sl_no = Some(" 12 ".to_string());
        assert_eq!(record.serial_key(), Some(12.0));
        record.sl_no = Some("I2".to_string());
        assert_eq!(record.serial_key(), None);
    }
}
