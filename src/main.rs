use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use rollscan::pdf::PdfReader;
use rollscan::pipeline::{build_dataset, export_dataset, OcrSettings, PipelineConfig, RunReport};

#[derive(Parser, Debug)]
#[command(name = "rollscan")]
#[command(version, about = "Extract voter records from scanned electoral roll PDFs", long_about = None)]
struct Cli {
    /// Default log filter; RUST_LOG takes precedence
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Extract the voter table from one PDF
    Convert {
        /// Input PDF file path
        input: PathBuf,

        /// Output directory (default: ./<input_name>_output)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        scan: ScanArgs,

        /// Suppress progress output
        #[arg(short, long)]
        quiet: bool,
    },

    /// Extract voter tables from several PDFs
    Batch {
        /// Input PDF files
        inputs: Vec<PathBuf>,

        /// Output directory for all results
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        scan: ScanArgs,
    },

    /// Show information about a PDF file
    Info {
        /// Input PDF file path
        input: PathBuf,
    },
}

#[derive(Args, Debug, Clone)]
struct ScanArgs {
    /// Rendering DPI for page images
    #[arg(long, default_value_t = 200)]
    dpi: u32,

    /// Number of leading pages without voter cards
    #[arg(long, default_value_t = 2)]
    skip_pages: usize,

    /// Write annotated page and card images to <output>/debug
    #[arg(short, long)]
    debug: bool,

    /// Python interpreter for the OCR bridge
    #[arg(long, env = "ROLLSCAN_PYTHON", default_value = "python3")]
    python: PathBuf,

    /// PaddleOCR bridge script
    #[arg(long, env = "ROLLSCAN_OCR_SCRIPT", default_value = "ocr/bridge/paddle_bridge.py")]
    ocr_script: PathBuf,

    /// PaddleOCR language code
    #[arg(long, default_value = "en")]
    lang: String,

    /// Seconds to wait for both OCR passes of a page
    #[arg(long, default_value_t = 120)]
    ocr_timeout: u64,

    /// Run both OCR passes in-process, one after the other
    #[arg(long)]
    sequential: bool,
}

impl ScanArgs {
    fn to_config(&self, input: PathBuf, output: PathBuf) -> PipelineConfig {
        PipelineConfig::new(input, output, self.dpi)
            .with_skip_pages(self.skip_pages)
            .with_debug(self.debug)
            .with_ocr(OcrSettings {
                python: self.python.clone(),
                script: self.ocr_script.clone(),
                lang: self.lang.clone(),
                timeout: Duration::from_secs(self.ocr_timeout),
                parallel: !self.sequential,
            })
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_level.clone().into()),
        )
        .init();

    match cli.command {
        Commands::Convert {
            input,
            output,
            scan,
            quiet,
        } => convert_single(input, output, &scan, quiet),
        Commands::Batch {
            inputs,
            output,
            scan,
        } => convert_batch(inputs, output, &scan),
        Commands::Info { input } => show_info(input),
    }
}

fn input_stem(input: &Path) -> String {
    input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string())
}

fn convert_single(input: PathBuf, output: Option<PathBuf>, scan: &ScanArgs, quiet: bool) -> Result<()> {
    if !input.exists() {
        anyhow::bail!("Input file does not exist: {}", input.display());
    }
    if !input.is_file() {
        anyhow::bail!("Input is not a file: {}", input.display());
    }

    let output_dir = output.unwrap_or_else(|| PathBuf::from(format!("{}_output", input_stem(&input))));

    if !quiet {
        println!("[*] Processing: {}", input.display());
        println!("[*] Output: {}", output_dir.display());
        println!("[*] DPI: {}", scan.dpi);
    }

    let config = scan.to_config(input.clone(), output_dir.clone());

    if !quiet {
        println!("\n[+] Scanning voter cards...");
    }

    let report = build_dataset(&config)
        .with_context(|| format!("Failed to process PDF: {}", input.display()))?;

    if !quiet {
        println!("[+] Exporting results...");
    }

    let written = export_dataset(&report.rows, &config.output)
        .with_context(|| format!("Failed to export to: {}", output_dir.display()))?;

    if !quiet {
        print_summary(&report);
        for path in &written {
            println!("    {}", path.display());
        }
        println!("\n[✓] Done! Results saved to: {}", output_dir.display());
    }

    Ok(())
}

fn print_summary(report: &RunReport) {
    println!("\n[*] Pages processed: {}", report.pages_processed);
    println!("[*] Cards seen: {}", report.cards_seen);
    println!("[*] Cards rejected: {}", report.cards_rejected);
    println!("[*] Cards dropped: {}", report.cards_dropped);
    println!("[*] Rows exported: {}", report.rows.len());
    if !report.warnings.is_empty() {
        println!("[!] {} warning(s):", report.warnings.len());
        for warning in &report.warnings {
            println!("    - {warning}");
        }
    }
}

fn convert_batch(inputs: Vec<PathBuf>, output: Option<PathBuf>, scan: &ScanArgs) -> Result<()> {
    if inputs.is_empty() {
        anyhow::bail!("No input files specified");
    }

    let base_output = output.unwrap_or_else(|| PathBuf::from("batch_output"));

    println!("[*] Batch processing {} file(s)", inputs.len());
    println!("[*] Base output: {}\n", base_output.display());

    let mut success = 0;
    let mut failed = 0;

    for (i, input) in inputs.iter().enumerate() {
        println!("[{}/{}] Processing: {}", i + 1, inputs.len(), input.display());

        if !input.exists() {
            eprintln!("  [!] Skipped: file does not exist");
            failed += 1;
            continue;
        }

        let output_dir = base_output.join(input_stem(input));

        match convert_single(input.clone(), Some(output_dir), scan, true) {
            Ok(()) => {
                println!("  [✓] Success");
                success += 1;
            }
            Err(e) => {
                eprintln!("  [✗] Failed: {e:#}");
                failed += 1;
            }
        }
        println!();
    }

    println!("\n[*] Summary: {} succeeded, {} failed", success, failed);

    if failed > 0 {
        anyhow::bail!("{} file(s) failed to process", failed);
    }

    Ok(())
}

fn show_info(input: PathBuf) -> Result<()> {
    if !input.exists() {
        anyhow::bail!("Input file does not exist: {}", input.display());
    }

    let reader = PdfReader::new(input.clone())
        .with_context(|| format!("Failed to open PDF: {}", input.display()))?;

    let page_count = reader.page_count()?;

    println!("PDF Information");
    println!("===============");
    println!("File: {}", input.display());
    println!("Pages: {}", page_count);

    Ok(())
}
