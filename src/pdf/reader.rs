use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

#[derive(Debug, Clone)]
pub struct PdfReader {
    path: PathBuf,
}

impl PdfReader {
    pub fn new(path: PathBuf) -> Result<Self> {
        if !path.is_file() {
            anyhow::bail!("not a file: {}", path.display());
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn page_count(&self) -> Result<usize> {
        let output = Command::new("pdfinfo")
            .arg(&self.path)
            .output()
            .with_context(|| format!("failed to invoke pdfinfo on {}", self.path.display()))?;

        if !output.status.success() {
            anyhow::bail!("pdfinfo failed with status: {}", output.status);
        }

        parse_page_count(&String::from_utf8_lossy(&output.stdout)).with_context(|| {
            format!(
                "pdfinfo output did not report a page count for {}",
                self.path.display()
            )
        })
    }
}

fn parse_page_count(stdout: &str) -> Result<usize> {
    for line in stdout.lines() {
        if let Some(rest) = line.strip_prefix("Pages:") {
            let num_str = rest.trim();
            return num_str
                .parse()
                .with_context(|| format!("failed to parse page count from 'Pages:' line: {num_str}"));
        }
    }
    anyhow::bail!("no 'Pages:' line")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_pages_line() {
        let stdout = "Producer:       scanner\nPages:          14\nEncrypted:      no\n";
        assert_eq!(parse_page_count(stdout).unwrap(), 14);
    }

    #[test]
    fn rejects_missing_or_garbled_pages_line() {
        assert!(parse_page_count("Producer: x\n").is_err());
        assert!(parse_page_count("Pages: many\n").is_err());
    }
}
