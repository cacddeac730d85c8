use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use image::RgbImage;
use tracing::{debug, info, warn};

use crate::core::error::PipelineWarning;
use crate::core::model::{CardSplit, PageImage, VoterRecord};
use crate::dataset::DatasetAssembler;
use crate::export::{DebugAnnotator, Exporter, JsonExporter, XlsxExporter};
use crate::ocr::{assemble_cards, OcrBridge, OcrOrchestrator, PagePasses};
use crate::pdf::{PageRenderer, PageSource, PdfReader};
use crate::profile::{ProfileFilter, ProfileParser};
use crate::vision::{CardDetector, CardSplitter};

#[derive(Debug, Clone)]
pub struct OcrSettings {
    pub python: PathBuf,
    pub script: PathBuf,
    pub lang: String,
    /// Bound on waiting for both concurrent passes of one page.
    pub timeout: Duration,
    pub parallel: bool,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            python: PathBuf::from("python3"),
            script: PathBuf::from("ocr/bridge/paddle_bridge.py"),
            lang: "en".to_string(),
            timeout: Duration::from_secs(120),
            parallel: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    pub dpi: u32,
    /// Leading pages without cards (cover and summary pages).
    pub skip_pages: usize,
    pub debug: bool,
    pub ocr: OcrSettings,
}

impl PipelineConfig {
    pub fn new(input: PathBuf, output: PathBuf, dpi: u32) -> Self {
        Self {
            input,
            output,
            dpi,
            skip_pages: 2,
            debug: false,
            ocr: OcrSettings::default(),
        }
    }

    pub fn with_skip_pages(mut self, skip_pages: usize) -> Self {
        self.skip_pages = skip_pages;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_ocr(mut self, ocr: OcrSettings) -> Self {
        self.ocr = ocr;
        self
    }

    pub fn debug_dir(&self) -> PathBuf {
        self.output.join("debug")
    }
}

/// Outcome of one document.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub rows: Vec<VoterRecord>,
    pub warnings: Vec<PipelineWarning>,
    pub pages_processed: usize,
    pub cards_seen: usize,
    pub cards_rejected: usize,
    pub cards_dropped: usize,
}

pub struct Pipeline<S: PageSource> {
    source: S,
    detector: CardDetector,
    splitter: CardSplitter,
    orchestrator: OcrOrchestrator,
    filter: ProfileFilter,
    parser: ProfileParser,
    skip_pages: usize,
    annotator: Option<DebugAnnotator>,
}

impl<S: PageSource> Pipeline<S> {
    pub fn new(source: S, orchestrator: OcrOrchestrator) -> Self {
        Self {
            source,
            detector: CardDetector::new(),
            splitter: CardSplitter::new(),
            orchestrator,
            filter: ProfileFilter::new(),
            parser: ProfileParser::new(),
            skip_pages: 2,
            annotator: None,
        }
    }

    pub fn with_skip_pages(mut self, skip_pages: usize) -> Self {
        self.skip_pages = skip_pages;
        self
    }

    pub fn with_annotator(mut self, annotator: DebugAnnotator) -> Self {
        self.annotator = Some(annotator);
        self
    }

    pub fn run(mut self) -> Result<RunReport> {
        let page_count = self.source.page_count()?;
        let mut dataset = DatasetAssembler::new();
        let mut report = RunReport::default();

        info!(pages = page_count, skipped = self.skip_pages, "scanning document");
        for page_idx in self.skip_pages..page_count {
            let page = self
                .source
                .render_page(page_idx)
                .with_context(|| format!("failed to render page {page_idx}"))?;
            self.process_page(page, &mut dataset, &mut report)?;
        }

        report.rows = dataset.finish();
        info!(
            rows = report.rows.len(),
            warnings = report.warnings.len(),
            "document scanned"
        );
        Ok(report)
    }

    fn process_page(
        &mut self,
        page: PageImage,
        dataset: &mut DatasetAssembler,
        report: &mut RunReport,
    ) -> Result<()> {
        let page_idx = page.page_idx;
        let regions = match self.detector.detect(&page) {
            Ok(regions) => regions,
            Err(err) => {
                warn!(page = page_idx, "{err}; page skipped");
                report.warnings.extend(err.as_warning());
                return Ok(());
            }
        };
        report.cards_seen += regions.len();
        debug!(page = page_idx, cards = regions.len(), "cards detected");

        if let Some(annotator) = &self.annotator {
            annotator.page(&page, &regions)?;
        }
        let cards: Vec<RgbImage> = regions
            .iter()
            .map(|region| CardDetector::crop(&page, region))
            .collect();
        drop(page);

        let splits: Vec<CardSplit> = cards.iter().map(|card| self.splitter.split(card)).collect();
        let passes = match self.orchestrator.recognize_page(page_idx, &splits) {
            Ok(passes) => passes,
            Err(err) => {
                warn!(page = page_idx, "{err:#}; page skipped");
                report.warnings.push(PipelineWarning::OcrFailed {
                    page_idx,
                    reason: format!("{err:#}"),
                });
                return Ok(());
            }
        };
        report.pages_processed += 1;
        if passes.timed_out {
            report.warnings.push(PipelineWarning::WorkerTimeout {
                page_idx,
                timeout: self.orchestrator.timeout(),
            });
        }
        if let Some(annotator) = &self.annotator {
            annotate_cards(annotator, page_idx, &cards, &splits, &passes)?;
        }

        for card in assemble_cards(page_idx, &passes) {
            let card = match card {
                Ok(card) => card,
                Err(err) => {
                    warn!(page = page_idx, "{err}");
                    report.warnings.extend(err.as_warning());
                    report.cards_dropped += 1;
                    continue;
                }
            };
            match self.filter.apply(card.texts()) {
                Some(lines) => dataset.push(self.parser.parse(&lines)),
                None => {
                    debug!(page = page_idx, card = card.card_idx, "deleted entry skipped");
                    report.cards_rejected += 1;
                    report.warnings.push(PipelineWarning::RejectedCard {
                        page_idx,
                        card_idx: card.card_idx,
                    });
                }
            }
        }
        Ok(())
    }
}

fn annotate_cards(
    annotator: &DebugAnnotator,
    page_idx: usize,
    cards: &[RgbImage],
    splits: &[CardSplit],
    passes: &PagePasses,
) -> Result<()> {
    for (card_idx, (card, split)) in cards.iter().zip(splits).enumerate() {
        let primary = passes
            .primary
            .get(card_idx)
            .and_then(|lines| lines.as_deref())
            .unwrap_or_default();
        let secondary = passes
            .secondary
            .get(card_idx)
            .and_then(|lines| lines.as_deref())
            .unwrap_or_default();
        annotator.card(page_idx, card_idx, card, split.split_x, primary, secondary)?;
    }
    Ok(())
}

/// Runs the full scan of `config.input` with poppler rendering and the PaddleOCR bridge.
pub fn build_dataset(config: &PipelineConfig) -> Result<RunReport> {
    let reader = PdfReader::new(config.input.clone())?;
    let renderer = PageRenderer::new(reader, config.dpi)?;
    let bridge = OcrBridge::new()
        .with_python(config.ocr.python.clone())
        .with_script(config.ocr.script.clone())
        .with_lang(config.ocr.lang.clone());
    let orchestrator = OcrOrchestrator::new(Arc::new(bridge), config.ocr.timeout, config.ocr.parallel)?;

    let mut pipeline = Pipeline::new(renderer, orchestrator).with_skip_pages(config.skip_pages);
    let debug_dir = config.debug_dir();
    if config.debug {
        pipeline = pipeline.with_annotator(DebugAnnotator::new(debug_dir)?);
    } else if debug_dir.exists() {
        // annotations from an earlier run would not match this one
        fs::remove_dir_all(&debug_dir)
            .with_context(|| format!("failed to clear {}", debug_dir.display()))?;
    }
    pipeline.run()
}

pub fn export_dataset(rows: &[VoterRecord], output: &Path) -> Result<Vec<PathBuf>> {
    let xlsx_exporter = XlsxExporter::new(output.to_path_buf());
    let json_exporter = JsonExporter::new(output.to_path_buf());
    Ok(vec![
        xlsx_exporter.export(rows)?,
        json_exporter.export(rows)?,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::Profile;
    use pretty_assertions::assert_eq;

    #[test]
    fn config_defaults_skip_cover_pages() {
        let config = PipelineConfig::new(PathBuf::from("roll.pdf"), PathBuf::from("out"), 200);
        assert_eq!(config.skip_pages, 2);
        assert!(config.ocr.parallel);
        assert_eq!(config.debug_dir(), PathBuf::from("out/debug"));

        let config = config.with_skip_pages(0).with_debug(true);
        assert_eq!(config.skip_pages, 0);
        assert!(config.debug);
    }

    #[test]
    fn export_dataset_writes_outputs() -> Result<()> {
        let output = tempfile::tempdir()?;
        let rows = vec![VoterRecord::from(Profile {
            sl_no: Some("4".to_string()),
            name: Some("ANIL".to_string()),
            ..Profile::default()
        })];

        let written = export_dataset(&rows, output.path())?;

        assert_eq!(written.len(), 2);
        assert!(output.path().join("voter_data.xlsx").exists());
        let json = fs::read_to_string(output.path().join("voter_data.json"))?;
        assert!(json.contains("\"Voter Full Name\": \"ANIL\""));
        Ok(())
    }
}
