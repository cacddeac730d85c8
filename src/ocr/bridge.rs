use anyhow::{Context, Result};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use tempfile::TempDir;
use tracing::{debug, warn};

use crate::core::error::ScanError;
use crate::core::model::RecognizedLine;
use crate::ocr::{RecognizerFactory, TextRecognizer};

/// Settings for the PaddleOCR helper script. Each `create` call starts a new
/// helper process that serves one worker.
#[derive(Debug, Clone)]
pub struct OcrBridge {
    python: PathBuf,
    script_path: PathBuf,
    lang: String,
}

impl OcrBridge {
    pub fn new() -> Self {
        Self {
            python: PathBuf::from("python3"),
            script_path: PathBuf::from("ocr/bridge/paddle_bridge.py"),
            lang: "en".to_string(),
        }
    }

    pub fn with_python(mut self, python: PathBuf) -> Self {
        self.python = python;
        self
    }

    pub fn with_script(mut self, script_path: PathBuf) -> Self {
        self.script_path = script_path;
        self
    }

    pub fn with_lang(mut self, lang: String) -> Self {
        self.lang = lang;
        self
    }

    pub fn spawn(&self) -> Result<BridgeProcess> {
        if !self.script_path.exists() {
            anyhow::bail!(
                "OCR bridge script not found: {}",
                self.script_path.display()
            );
        }
        let mut child = Command::new(&self.python)
            .arg(&self.script_path)
            .arg("--lang")
            .arg(&self.lang)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| "failed to invoke python OCR bridge")?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow::anyhow!("OCR bridge stdin unavailable"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow::anyhow!("OCR bridge stdout unavailable"))?;
        let scratch = tempfile::Builder::new()
            .prefix("rollscan-ocr-")
            .tempdir()
            .with_context(|| "failed to create OCR scratch directory")?;

        debug!(pid = child.id(), "started OCR bridge");
        Ok(BridgeProcess {
            child,
            stdin,
            stdout: BufReader::new(stdout),
            scratch,
            requests: 0,
        })
    }
}

impl Default for OcrBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl RecognizerFactory for OcrBridge {
    fn create(&self) -> Result<Box<dyn TextRecognizer>> {
        Ok(Box::new(self.spawn()?))
    }
}

#[derive(Debug, Serialize)]
struct BridgeRequest<'a> {
    image: &'a Path,
}

#[derive(Debug, Deserialize)]
struct BridgeResponse {
    #[serde(default)]
    lines: Vec<RecognizedLine>,
    #[serde(default)]
    error: Option<String>,
}

/// A running helper process. The OCR model is loaded once when it starts and
/// the process is killed when this value is dropped.
#[derive(Debug)]
pub struct BridgeProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    scratch: TempDir,
    requests: usize,
}

impl TextRecognizer for BridgeProcess {
    fn recognize(&mut self, image: &RgbImage) -> Result<Vec<RecognizedLine>> {
        if image.width() == 0 || image.height() == 0 {
            return Ok(Vec::new());
        }

        self.requests += 1;
        let path = self
            .scratch
            .path()
            .join(format!("crop_{:05}.png", self.requests));
        image
            .save(&path)
            .with_context(|| format!("failed to write {}", path.display()))?;

        let request = serde_json::to_string(&BridgeRequest { image: &path })?;
        writeln!(self.stdin, "{request}").with_context(|| "failed to write to OCR bridge")?;
        self.stdin.flush()?;

        let mut reply = String::new();
        let read = self
            .stdout
            .read_line(&mut reply)
            .with_context(|| "failed to read from OCR bridge")?;
        let _ = std::fs::remove_file(&path);
        if read == 0 {
            return Err(ScanError::OcrBridge(
                "bridge process exited; its stderr is printed above".to_string(),
            )
            .into());
        }

        parse_response(&reply)
    }
}

impl Drop for BridgeProcess {
    fn drop(&mut self) {
        if let Err(err) = self.child.kill() {
            warn!(error = %err, "failed to stop OCR bridge");
        }
        let _ = self.child.wait();
    }
}

fn parse_response(reply: &str) -> Result<Vec<RecognizedLine>> {
    let response: BridgeResponse = serde_json::from_str(reply.trim())
        .with_context(|| "failed to parse OCR JSON response")?;
    if let Some(error) = response.error {
        return Err(ScanError::OcrBridge(error).into());
    }
    Ok(response
        .lines
        .into_iter()
        .filter(|line| !line.text.trim().is_empty())
        .collect())
}
