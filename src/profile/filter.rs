use unicode_normalization::UnicodeNormalization;

/// Cleans raw card lines before parsing and rejects deleted entries.
///
/// Deleted cards carry a watermark whose glyph OCR reads as a lone `E` or `S`.
#[derive(Debug, Clone)]
pub struct ProfileFilter {
    void_markers: Vec<String>,
    boilerplate: Vec<String>,
}

impl Default for ProfileFilter {
    fn default() -> Self {
        Self {
            void_markers: vec!["E".to_string(), "S".to_string()],
            boilerplate: vec!["PHOTO".to_string(), "AVAILABLE".to_string()],
        }
    }
}

impl ProfileFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uppercased lines ready for parsing, or `None` for a deleted card.
    pub fn apply<'a, I>(&self, lines: I) -> Option<Vec<String>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let normalized: Vec<String> = lines.into_iter().map(normalize).collect();
        if normalized
            .iter()
            .any(|line| self.void_markers.iter().any(|marker| marker == line))
        {
            return None;
        }
        Some(
            normalized
                .into_iter()
                .filter(|line| !self.boilerplate.iter().any(|word| word == line))
                .collect(),
        )
    }
}

fn normalize(line: &str) -> String {
    line.nfkc().collect::<String>().trim().to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn rejects_watermarked_cards() {
        let filter = ProfileFilter::new();
        assert_eq!(filter.apply(["12", "ABC1234567", "e", "NAME : X"]), None);
        assert_eq!(filter.apply(["S", "ABC1234567"]), None);
        assert_eq!(filter.apply([" E "]), None);
    }

    #[test]
    fn keeps_lines_that_merely_contain_markers() {
        let filter = ProfileFilter::new();
        let lines = filter.apply(["es", "Name : Sese"]).unwrap();
        assert_eq!(lines, vec!["ES", "NAME : SESE"]);
    }

    #[test]
    fn strips_photo_boilerplate() {
        let filter = ProfileFilter::new();
        let lines = filter
            .apply(["7", "Photo", "XYZ0001", "Available", "Photo Available"])
            .unwrap();
        assert_eq!(lines, vec!["7", "XYZ0001", "PHOTO AVAILABLE"]);
    }

    #[test]
    fn folds_compatibility_glyphs() {
        let filter = ProfileFilter::new();
        let lines = filter.apply(["ＡＧＥ：４５"]).unwrap();
        assert_eq!(lines, vec!["AGE:45"]);
    }
}
