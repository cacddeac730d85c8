use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use image::RgbImage;
use tokio::runtime::Runtime;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::error::ScanError;
use crate::core::model::{CardSplit, CardTextLines, RecognizedLine};
use crate::ocr::{RecognizerFactory, TextRecognizer};

/// Lines per input image, in input order. `None` marks an image with no text.
pub type PassLines = Vec<Option<Vec<RecognizedLine>>>;

/// Both OCR passes over the cards of one page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PagePasses {
    pub primary: PassLines,
    pub secondary: PassLines,
    /// The concurrent run missed its deadline and both passes were redone in-process.
    pub timed_out: bool,
}

type EngineSlot = Arc<Mutex<Option<Box<dyn TextRecognizer>>>>;

/// One OCR lane. Its engine is created by the first job and kept until the
/// orchestrator is dropped; jobs on the same lane run one at a time.
struct Worker {
    name: &'static str,
    engine: EngineSlot,
}

impl Worker {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            engine: Arc::new(Mutex::new(None)),
        }
    }

    /// `Ok(None)` means the job was cancelled before it finished.
    fn submit(
        &self,
        runtime: &Runtime,
        factory: Arc<dyn RecognizerFactory>,
        images: Arc<Vec<RgbImage>>,
        cancel: CancellationToken,
    ) -> JoinHandle<Result<Option<PassLines>>> {
        let name = self.name;
        let engine = self.engine.clone();
        runtime.spawn_blocking(move || {
            let mut slot = engine.blocking_lock();
            if cancel.is_cancelled() {
                return Ok(None);
            }
            if slot.is_none() {
                debug!(worker = name, "creating OCR engine");
                *slot = Some(factory.create()?);
            }
            let Some(recognizer) = slot.as_mut() else {
                anyhow::bail!("{name} has no OCR engine");
            };
            let result = run_pass(recognizer.as_mut(), &images, &cancel);
            if result.is_err() {
                // start from a fresh engine on the next job
                *slot = None;
            }
            result
        })
    }
}

/// The two worker lanes and the runtime that drives them.
struct WorkerPair {
    runtime: Option<Runtime>,
    primary: Worker,
    secondary: Worker,
    shutdown: CancellationToken,
}

impl WorkerPair {
    fn start() -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .thread_name("ocr-worker")
            .build()
            .context("failed to start OCR runtime")?;
        Ok(Self {
            runtime: Some(runtime),
            primary: Worker::new("ocr-primary"),
            secondary: Worker::new("ocr-secondary"),
            shutdown: CancellationToken::new(),
        })
    }

    /// Both passes on the worker lanes. `Ok(None)` when they did not finish in time.
    fn run(
        &self,
        factory: &Arc<dyn RecognizerFactory>,
        limit: Duration,
        page_idx: usize,
        primary: Arc<Vec<RgbImage>>,
        secondary: Arc<Vec<RgbImage>>,
    ) -> Result<Option<PagePasses>> {
        let Some(runtime) = self.runtime.as_ref() else {
            return Ok(None);
        };
        let cancel = self.shutdown.child_token();
        let primary_task = self.primary.submit(runtime, factory.clone(), primary, cancel.clone());
        let secondary_task = self
            .secondary
            .submit(runtime, factory.clone(), secondary, cancel.clone());

        let joined = runtime.block_on(async move {
            timeout(limit, async { tokio::join!(primary_task, secondary_task) }).await
        });
        let (primary_lines, secondary_lines) = match joined {
            Ok((Ok(primary_lines), Ok(secondary_lines))) => (primary_lines, secondary_lines),
            Ok(_) => {
                warn!(page = page_idx, "OCR worker exited without a result");
                cancel.cancel();
                return Ok(None);
            }
            Err(_) => {
                warn!(
                    page = page_idx,
                    timeout_ms = limit.as_millis() as u64,
                    "OCR workers did not finish in time; re-running both passes in-process"
                );
                cancel.cancel();
                return Ok(None);
            }
        };

        let primary_lines =
            primary_lines.with_context(|| format!("page {page_idx}: primary OCR pass failed"))?;
        let secondary_lines =
            secondary_lines.with_context(|| format!("page {page_idx}: secondary OCR pass failed"))?;
        Ok(primary_lines
            .zip(secondary_lines)
            .map(|(primary, secondary)| PagePasses {
                primary,
                secondary,
                timed_out: false,
            }))
    }
}

impl Drop for WorkerPair {
    fn drop(&mut self) {
        self.shutdown.cancel();
        if let Some(runtime) = self.runtime.take() {
            // a lane may still be inside a cancelled job; it stops after its current image
            runtime.shutdown_background();
        }
    }
}

/// `Ok(None)` when `cancel` fired between images.
fn run_pass(
    recognizer: &mut dyn TextRecognizer,
    images: &[RgbImage],
    cancel: &CancellationToken,
) -> Result<Option<PassLines>> {
    let mut out = Vec::with_capacity(images.len());
    for image in images {
        if cancel.is_cancelled() {
            return Ok(None);
        }
        let lines = recognizer.recognize(image)?;
        out.push((!lines.is_empty()).then_some(lines));
    }
    Ok(Some(out))
}

/// Runs the primary and secondary OCR passes for each page.
pub struct OcrOrchestrator {
    factory: Arc<dyn RecognizerFactory>,
    timeout: Duration,
    workers: Option<WorkerPair>,
    local: Option<Box<dyn TextRecognizer>>,
}

impl OcrOrchestrator {
    /// With `parallel` set, the two passes of a page run on separate worker
    /// lanes; each lane creates its engine on first use.
    pub fn new(factory: Arc<dyn RecognizerFactory>, timeout: Duration, parallel: bool) -> Result<Self> {
        let workers = if parallel { Some(WorkerPair::start()?) } else { None };
        Ok(Self {
            factory,
            timeout,
            workers,
            local: None,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn recognize_page(&mut self, page_idx: usize, splits: &[CardSplit]) -> Result<PagePasses> {
        let primary: Arc<Vec<RgbImage>> =
            Arc::new(splits.iter().map(|split| split.primary.clone()).collect());
        let secondary: Arc<Vec<RgbImage>> =
            Arc::new(splits.iter().map(|split| split.secondary.clone()).collect());

        let Some(workers) = &self.workers else {
            return self.run_local(&primary, &secondary);
        };
        if let Some(passes) =
            workers.run(&self.factory, self.timeout, page_idx, primary.clone(), secondary.clone())?
        {
            return Ok(passes);
        }

        let mut passes = self.run_local(&primary, &secondary)?;
        passes.timed_out = true;
        Ok(passes)
    }

    /// Both passes, one after the other, on the in-process engine.
    fn run_local(&mut self, primary: &[RgbImage], secondary: &[RgbImage]) -> Result<PagePasses> {
        if self.local.is_none() {
            self.local = Some(self.factory.create()?);
        }
        let Some(recognizer) = self.local.as_mut() else {
            anyhow::bail!("in-process OCR engine unavailable");
        };
        let never = CancellationToken::new();
        let passes = run_pass(recognizer.as_mut(), secondary, &never).and_then(|secondary_lines| {
            let primary_lines = run_pass(recognizer.as_mut(), primary, &never)?;
            Ok(PagePasses {
                primary: primary_lines.unwrap_or_default(),
                secondary: secondary_lines.unwrap_or_default(),
                timed_out: false,
            })
        });
        if passes.is_err() {
            self.local = None;
        }
        passes
    }
}

/// Builds the per-card line lists: first secondary line, then all primary lines.
///
/// A card whose secondary pass found nothing has no serial number and comes back
/// as `ScanError::EmptyCard`.
pub fn assemble_cards(page_idx: usize, passes: &PagePasses) -> Vec<Result<CardTextLines, ScanError>> {
    passes
        .secondary
        .iter()
        .enumerate()
        .map(|(card_idx, secondary)| {
            let first = secondary
                .as_ref()
                .and_then(|lines| lines.first())
                .ok_or(ScanError::EmptyCard { page_idx, card_idx })?;
            let mut lines = vec![first.clone()];
            if let Some(Some(primary)) = passes.primary.get(card_idx) {
                lines.extend(primary.iter().cloned());
            }
            Ok(CardTextLines {
                page_idx,
                card_idx,
                lines,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    const QUAD: [[f32; 2]; 4] = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];

    /// Reports the image width; all-white images have no text.
    struct WidthReader {
        delay_on_workers: Duration,
    }

    impl TextRecognizer for WidthReader {
        fn recognize(&mut self, image: &RgbImage) -> Result<Vec<RecognizedLine>> {
            let on_worker = thread::current()
                .name()
                .is_some_and(|name| name.starts_with("ocr-"));
            if on_worker {
                thread::sleep(self.delay_on_workers);
            }
            if image.pixels().all(|p| *p == Rgb([255, 255, 255])) {
                return Ok(Vec::new());
            }
            Ok(vec![
                RecognizedLine::new(format!("W{}", image.width()), QUAD, 0.9),
                RecognizedLine::new("SECOND", QUAD, 0.9),
            ])
        }
    }

    fn factory(delay: Duration) -> Arc<dyn RecognizerFactory> {
        Arc::new(move || -> Result<Box<dyn TextRecognizer>> {
            Ok(Box::new(WidthReader {
                delay_on_workers: delay,
            }))
        })
    }

    fn split(primary_width: u32, secondary_width: u32, blank_secondary: bool) -> CardSplit {
        let ink = Rgb([0, 0, 0]);
        let paper = Rgb([255, 255, 255]);
        CardSplit {
            primary: RgbImage::from_pixel(primary_width, 4, ink),
            secondary: RgbImage::from_pixel(secondary_width, 4, if blank_secondary { paper } else { ink }),
            split_x: primary_width,
        }
    }

    #[test]
    fn parallel_passes_keep_card_order() {
        let mut orchestrator =
            OcrOrchestrator::new(factory(Duration::ZERO), Duration::from_secs(10), true).unwrap();
        let passes = orchestrator
            .recognize_page(3, &[split(70, 30, false), split(35, 15, false)])
            .unwrap();

        assert!(!passes.timed_out);
        let cards: Vec<_> = assemble_cards(3, &passes)
            .into_iter()
            .map(|card| card.unwrap().texts().map(str::to_string).collect::<Vec<_>>())
            .collect();
        assert_eq!(
            cards,
            vec![
                vec!["W30", "W70", "SECOND"],
                vec!["W15", "W35", "SECOND"],
            ]
        );
    }

    #[test]
    fn timeout_falls_back_to_sequential_run() {
        let mut orchestrator =
            OcrOrchestrator::new(factory(Duration::from_millis(500)), Duration::from_millis(20), true)
                .unwrap();
        let splits = [split(70, 30, false)];
        let passes = orchestrator.recognize_page(0, &splits).unwrap();

        assert!(passes.timed_out);
        let expected = OcrOrchestrator::new(factory(Duration::ZERO), Duration::from_secs(1), false)
            .unwrap()
            .recognize_page(0, &splits)
            .unwrap();
        assert_eq!(passes.primary, expected.primary);
        assert_eq!(passes.secondary, expected.secondary);
    }

    #[test]
    fn empty_secondary_drops_card() {
        let mut orchestrator =
            OcrOrchestrator::new(factory(Duration::ZERO), Duration::from_secs(10), false).unwrap();
        let passes = orchestrator
            .recognize_page(5, &[split(70, 30, true), split(70, 30, false)])
            .unwrap();

        assert_eq!(passes.secondary[0], None);
        let cards = assemble_cards(5, &passes);
        assert!(matches!(
            cards[0],
            Err(ScanError::EmptyCard {
                page_idx: 5,
                card_idx: 0
            })
        ));
        assert_eq!(cards[1].as_ref().unwrap().card_idx, 1);
    }

    #[test]
    fn empty_primary_keeps_serial_line() {
        let passes = PagePasses {
            primary: vec![None],
            secondary: vec![Some(vec![RecognizedLine::new("17", QUAD, 0.8)])],
            timed_out: false,
        };
        let card = assemble_cards(0, &passes).remove(0).unwrap();
        assert_eq!(card.texts().collect::<Vec<_>>(), vec!["17"]);
    }

    #[test]
    fn timeouts_keep_worker_engines() {
        let created = Arc::new(AtomicUsize::new(0));
        let counter = created.clone();
        let counting: Arc<dyn RecognizerFactory> =
            Arc::new(move || -> Result<Box<dyn TextRecognizer>> {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Box::new(WidthReader {
                    delay_on_workers: Duration::from_millis(150),
                }))
            });
        let mut orchestrator =
            OcrOrchestrator::new(counting, Duration::from_millis(20), true).unwrap();

        for page_idx in 0..3 {
            let passes = orchestrator
                .recognize_page(page_idx, &[split(70, 30, false)])
                .unwrap();
            assert!(passes.timed_out);
        }
        // one engine per worker lane plus the in-process one
        assert_eq!(created.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn failing_engine_fails_the_page() {
        struct Broken;
        impl TextRecognizer for Broken {
            fn recognize(&mut self, _image: &RgbImage) -> Result<Vec<RecognizedLine>> {
                anyhow::bail!("model crashed")
            }
        }
        let broken: Arc<dyn RecognizerFactory> =
            Arc::new(|| -> Result<Box<dyn TextRecognizer>> { Ok(Box::new(Broken)) });
        let mut orchestrator = OcrOrchestrator::new(broken, Duration::from_secs(10), true).unwrap();

        let err = orchestrator
            .recognize_page(6, &[split(70, 30, false)])
            .unwrap_err();
        assert!(format!("{err:#}").contains("page 6"), "{err:#}");
    }
}
