use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use rust_xlsxwriter::{Format, Workbook};

use crate::core::model::VoterRecord;
use crate::export::Exporter;

const AGE_COLUMN: u16 = 4;

/// Writes `voter_data.xlsx`, one header row and one row per voter. Missing
/// values are left as empty cells.
#[derive(Debug, Clone)]
pub struct XlsxExporter {
    out_dir: PathBuf,
}

impl XlsxExporter {
    pub fn new(out_dir: PathBuf) -> Self {
        Self { out_dir }
    }
}

impl Exporter for XlsxExporter {
    fn export(&self, rows: &[VoterRecord]) -> Result<PathBuf> {
        fs::create_dir_all(&self.out_dir)?;
        let path = self.out_dir.join("voter_data.xlsx");

        let mut workbook = Workbook::new();
        let header = Format::new().set_bold();
        let sheet = workbook.add_worksheet();
        sheet.set_name("Voters")?;

        for (col, name) in VoterRecord::COLUMNS.iter().enumerate() {
            sheet.write_string_with_format(0, col as u16, *name, &header)?;
            sheet.set_column_width(col as u16, 18)?;
        }

        for (idx, record) in rows.iter().enumerate() {
            let row = idx as u32 + 1;
            for (col, cell) in record.cells().into_iter().enumerate() {
                let col = col as u16;
                match (col, cell) {
                    (_, None) => {}
                    (AGE_COLUMN, Some(_)) => {
                        if let Some(age) = record.age {
                            sheet.write_number(row, col, age as f64)?;
                        }
                    }
                    (_, Some(text)) => {
                        sheet.write_string(row, col, text)?;
                    }
                }
            }
        }
        sheet.set_freeze_panes(1, 0)?;

        workbook
            .save(&path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::Profile;

    #[test]
    fn writes_workbook() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let rows = vec![
            VoterRecord::from(Profile {
                sl_no: Some("1".to_string()),
                age: Some(30),
                ..Profile::default()
            }),
            VoterRecord::from(Profile::default()),
        ];
        let path = XlsxExporter::new(dir.path().to_path_buf()).export(&rows)?;

        assert_eq!(path, dir.path().join("voter_data.xlsx"));
        // xlsx files are zip archives
        let bytes = fs::read(&path)?;
        assert!(bytes.starts_with(b"PK"));
        Ok(())
    }
}
