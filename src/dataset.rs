use std::cmp::Ordering;

use crate::core::model::{Profile, VoterRecord};

/// Accumulates accepted profiles and produces the export table.
#[derive(Debug, Clone, Default)]
pub struct DatasetAssembler {
    rows: Vec<VoterRecord>,
}

impl DatasetAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, profile: Profile) {
        self.rows.push(VoterRecord::from(profile));
    }

    /// Rows in ascending numeric serial order. Serials that are not numbers go
    /// last, keeping the order they arrived in.
    pub fn finish(self) -> Vec<VoterRecord> {
        let mut keyed: Vec<(Option<f64>, VoterRecord)> = self
            .rows
            .into_iter()
            .map(|row| (row.serial_key(), row))
            .collect();
        keyed.sort_by(|(a, _), (b, _)| compare_serials(*a, *b));
        keyed.into_iter().map(|(_, row)| row).collect()
    }
}

fn compare_serials(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn profile(sl_no: Option<&str>, epic: &str) -> Profile {
        Profile {
            sl_no: sl_no.map(str::to_string),
            epic_no: Some(epic.to_string()),
            ..Profile::default()
        }
    }

    #[test]
    fn orders_numerically_with_anomalies_last() {
        let mut assembler = DatasetAssembler::new();
        assembler.push(profile(Some("10"), "a"));
        assembler.push(profile(Some("I7"), "b"));
        assembler.push(profile(Some("9"), "c"));
        assembler.push(profile(None, "d"));
        assembler.push(profile(Some("100"), "e"));
        assembler.push(profile(Some("?"), "f"));
        assembler.push(profile(Some("9"), "g"));

        let epics: Vec<_> = assembler
            .finish()
            .into_iter()
            .map(|row| row.epic_no.unwrap())
            .collect();
        assert_eq!(epics, vec!["c", "g", "a", "e", "b", "d", "f"]);
    }

    #[test]
    fn blank_profiles_still_produce_rows() {
        let mut assembler = DatasetAssembler::new();
        assembler.push(Profile::default());
        let rows = assembler.finish();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].cells().iter().all(Option::is_none));
    }
}
