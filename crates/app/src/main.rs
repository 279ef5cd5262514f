use chrono::Utc;
use clap::{Args, Parser, Subcommand, ValueEnum};
use pdf_qa_core::{
    ChatModelConfig, ChatSession, ChunkingConfig, Document, Embedder, ExtractionError,
    ExtractionMethod, ExtractionPipeline, ExtractionReport, GroqChatModel, HashingEmbedder,
    InMemoryStore, Indexer, OcrLayout, OcrSettings, PipelineConfig, QdrantStore, SessionError,
    StrategyAvailability, StrategyOutcome, ToolPaths, VectorIndex,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "pdf-qa", version, about = "Ask questions about a PDF, scanned or not.")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    pipeline: PipelineArgs,
}

#[derive(Args)]
struct PipelineArgs {
    /// Tesseract executable
    #[arg(long, global = true, env = "PDF_QA_TESSERACT", default_value = "tesseract")]
    tesseract: PathBuf,

    /// MuPDF `mutool` executable used by the primary rasterizer
    #[arg(long, global = true, env = "PDF_QA_MUTOOL", default_value = "mutool")]
    mutool: PathBuf,

    /// Poppler `pdftoppm` executable used by the secondary rasterizer
    #[arg(long, global = true, env = "PDF_QA_PDFTOPPM", default_value = "pdftoppm")]
    pdftoppm: PathBuf,

    /// OCR language set, e.g. `eng` or `ara+eng`
    #[arg(long, global = true, env = "PDF_QA_OCR_LANG", default_value = "eng")]
    ocr_lang: String,

    /// Zoom factor for the primary rasterizer (72 dpi times this)
    #[arg(long, global = true, default_value_t = 3.0, value_parser = parse_magnification)]
    magnification: f32,

    /// Resolution for the secondary rasterizer
    #[arg(long, global = true, default_value_t = 200)]
    secondary_dpi: u32,

    /// Tesseract page segmentation mode
    #[arg(long, global = true, default_value_t = 6)]
    psm: u8,

    /// Contrast factor applied before OCR; 0 disables enhancement
    #[arg(long, global = true, default_value_t = 1.8)]
    contrast: f32,

    /// How OCR pages are handed to the indexer
    #[arg(long, global = true, value_enum, default_value_t = LayoutArg::Delimited)]
    ocr_layout: LayoutArg,

    /// Skip a strategy entirely (repeatable)
    #[arg(long = "disable-strategy", global = true, value_parser = parse_method)]
    disabled: Vec<ExtractionMethod>,
}

#[derive(Clone, Copy, ValueEnum)]
enum LayoutArg {
    Delimited,
    PerPage,
}

#[derive(Subcommand)]
enum Command {
    /// Report which extraction strategies can run on this machine.
    Doctor,
    /// Extract text from a PDF and print it.
    Extract {
        #[arg(long)]
        pdf: PathBuf,
        /// Print the full extraction result as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Index a PDF and answer questions about it.
    Chat {
        #[arg(long)]
        pdf: PathBuf,
        /// Question to ask; repeat for several. Reads stdin when omitted.
        #[arg(long = "question")]
        questions: Vec<String>,
        #[arg(long, default_value_t = pdf_qa_core::DEFAULT_TOP_K)]
        top_k: usize,
        #[arg(long, env = "PDF_QA_MODEL", default_value = pdf_qa_core::chat::DEFAULT_MODEL)]
        model: String,
        #[arg(long, env = "GROQ_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
        #[arg(long, env = "PDF_QA_API_BASE", default_value = pdf_qa_core::chat::DEFAULT_API_BASE)]
        api_base: String,
        /// Qdrant base URL; the in-memory store is used when omitted
        #[arg(long, env = "QDRANT_URL")]
        qdrant_url: Option<String>,
        #[arg(long, default_value = "pdf_qa")]
        qdrant_collection: String,
    },
}

fn parse_method(value: &str) -> Result<ExtractionMethod, String> {
    ExtractionMethod::parse(value).ok_or_else(|| {
        let known = ExtractionMethod::ALL
            .iter()
            .map(ExtractionMethod::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        format!("unknown strategy `{value}` (expected one of: {known})")
    })
}

fn parse_magnification(value: &str) -> Result<f32, String> {
    let factor = value
        .parse::<f32>()
        .map_err(|error| format!("`{value}` is not a number: {error}"))?;
    if factor.is_finite() && factor > 0.0 {
        Ok(factor)
    } else {
        Err(format!("magnification must be greater than 0, got {value}"))
    }
}

impl PipelineArgs {
    fn to_config(&self) -> PipelineConfig {
        let mut config = PipelineConfig {
            magnification: self.magnification,
            secondary_dpi: self.secondary_dpi,
            ocr: OcrSettings {
                languages: self.ocr_lang.clone(),
                page_segmentation_mode: self.psm,
                contrast: (self.contrast > 0.0).then_some(self.contrast),
            },
            ocr_layout: match self.ocr_layout {
                LayoutArg::Delimited => OcrLayout::Delimited,
                LayoutArg::PerPage => OcrLayout::PerPage,
            },
            tools: ToolPaths {
                tesseract: self.tesseract.clone(),
                mutool: self.mutool.clone(),
                pdftoppm: self.pdftoppm.clone(),
            },
            ..PipelineConfig::default()
        };
        for method in &self.disabled {
            config = config.disable(*method);
        }
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    if let Err(error) = dotenvy::dotenv() {
        if !error.not_found() {
            eprintln!("ignoring unreadable .env: {error}");
        }
    }

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = cli.pipeline.to_config();

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "pdf-qa boot"
    );

    let availability = StrategyAvailability::detect(&config.tools).await;

    match cli.command {
        Command::Doctor => print_doctor(&config, &availability),
        Command::Extract { pdf, json } => {
            let pipeline = ExtractionPipeline::new(config);
            let result = tokio::task::spawn_blocking(move || {
                let document = Document::open(&pdf)?;
                pipeline.extract(&document, &availability)
            })
            .await?
            .map_err(|error| anyhow::anyhow!(describe_extraction_error(&error)))?;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("method: {}", result.method);
                println!("characters: {}", result.total_chars());
                for segment in &result.segments {
                    match segment.page {
                        Some(page) => println!("[page {page}]"),
                        None => println!("[document]"),
                    }
                    println!("{}", segment.content);
                }
            }
        }
        Command::Chat {
            pdf,
            questions,
            top_k,
            model,
            api_key,
            api_base,
            qdrant_url,
            qdrant_collection,
        } => {
            let chat_model = GroqChatModel::new(ChatModelConfig {
                api_base,
                api_key: api_key.unwrap_or_default(),
                model,
                temperature: pdf_qa_core::chat::DEFAULT_TEMPERATURE,
            })
            .map_err(|error| anyhow::anyhow!("{error} (set GROQ_API_KEY or pass --api-key)"))?;

            let embedder = HashingEmbedder::default();
            let pipeline = Arc::new(ExtractionPipeline::new(config));
            let chat = ChatRun {
                pipeline,
                availability,
                model: chat_model,
                pdf,
                questions,
                top_k,
            };

            match qdrant_url {
                Some(url) => {
                    let store = QdrantStore::new(url, qdrant_collection, embedder.dimensions());
                    chat.run(embedder, store).await?;
                }
                None => {
                    let store = InMemoryStore::new(embedder.dimensions());
                    chat.run(embedder, store).await?;
                }
            }
        }
    }

    Ok(())
}

struct ChatRun {
    pipeline: Arc<ExtractionPipeline>,
    availability: StrategyAvailability,
    model: GroqChatModel,
    pdf: PathBuf,
    questions: Vec<String>,
    top_k: usize,
}

impl ChatRun {
    async fn run<V>(self, embedder: HashingEmbedder, store: V) -> anyhow::Result<()>
    where
        V: VectorIndex + Send + Sync,
    {
        let indexer = Indexer::new(embedder, store, ChunkingConfig::default());
        let mut session = ChatSession::new(self.pipeline, self.availability, indexer, self.model)
            .with_top_k(self.top_k);

        let loaded = session
            .upload(&self.pdf)
            .await
            .map_err(|error| anyhow::anyhow!(describe_session_error(&error)))?;
        println!(
            "Loaded {} via {} ({} chunks)",
            loaded.document.source, loaded.method, loaded.chunk_count
        );

        if !self.questions.is_empty() {
            for question in &self.questions {
                answer(&mut session, question).await;
            }
            return Ok(());
        }

        let mut stdout = tokio::io::stdout();
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            stdout.write_all(b"> ").await?;
            stdout.flush().await?;
            let Some(line) = lines.next_line().await? else {
                break;
            };
            let question = line.trim();
            if question.is_empty() {
                continue;
            }
            answer(&mut session, question).await;
        }

        Ok(())
    }
}

async fn answer<M, E, V>(session: &mut ChatSession<M, E, V>, question: &str)
where
    M: pdf_qa_core::ChatModel + Send + Sync,
    E: Embedder + Send + Sync,
    V: VectorIndex + Send + Sync,
{
    match session.ask(question).await {
        Ok(reply) => println!("{reply}"),
        Err(error) => {
            warn!(%error, "question failed");
            println!("{}", describe_session_error(&error));
        }
    }
}

fn print_doctor(config: &PipelineConfig, availability: &StrategyAvailability) {
    for method in ExtractionMethod::ALL {
        let status = if !config.is_enabled(method) {
            "disabled".to_string()
        } else {
            match availability.missing_for(method) {
                Some(missing) => format!("unavailable (missing {missing})"),
                None => "ready".to_string(),
            }
        };
        println!("{method}: {status}");
    }

    if availability.ocr_languages.is_empty() {
        println!("ocr languages: unknown");
    } else {
        println!("ocr languages: {}", availability.ocr_languages.join(", "));
    }

    let missing = availability.missing_languages(&config.ocr);
    if !missing.is_empty() {
        println!("warning: requested OCR languages not installed: {}", missing.join(", "));
    }
}

fn describe_session_error(error: &SessionError) -> String {
    match error {
        SessionError::NoDocument => "Please upload a valid PDF first!".to_string(),
        SessionError::Extraction(error) => describe_extraction_error(error),
        other => format!("Error: {other}"),
    }
}

fn describe_extraction_error(error: &ExtractionError) -> String {
    match error {
        ExtractionError::Exhausted(report) => exhaustion_hint(report),
        other => format!("Error processing PDF: {other}"),
    }
}

fn exhaustion_hint(report: &ExtractionReport) -> String {
    let mut missing = report
        .attempts
        .iter()
        .filter_map(|attempt| match &attempt.outcome {
            StrategyOutcome::Unavailable { missing } => Some(missing.split(" + ")),
            _ => None,
        })
        .flatten()
        .map(str::to_string)
        .collect::<Vec<_>>();
    missing.sort();
    missing.dedup();

    let mut message = format!("Could not extract any text from {}.", report.source);
    if !missing.is_empty() {
        message.push_str(&format!(
            " This looks like a scanned PDF; install {} to enable OCR.",
            missing.join(" and ")
        ));
    }
    message.push_str(&format!("\nAttempts: {}", report.summary()));
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhaustion_hint_names_missing_tools_once() {
        let mut report = ExtractionReport::new("scan.pdf");
        report.record(ExtractionMethod::TextLayerPrimary, StrategyOutcome::Empty);
        report.record(ExtractionMethod::TextLayerSecondary, StrategyOutcome::Empty);
        report.record(
            ExtractionMethod::ImageOcrPrimary,
            StrategyOutcome::Unavailable {
                missing: "mutool + tesseract".to_string(),
            },
        );
        report.record(
            ExtractionMethod::ImageOcrSecondary,
            StrategyOutcome::Unavailable {
                missing: "pdftoppm + tesseract".to_string(),
            },
        );

        let hint = exhaustion_hint(&report);

        assert!(hint.starts_with("Could not extract any text from scan.pdf."));
        assert!(hint.contains("install mutool and pdftoppm and tesseract"));
        assert!(hint.contains("image-ocr-secondary: skipped, unavailable"));
    }

    #[test]
    fn missing_document_message_is_user_facing() {
        assert_eq!(
            describe_session_error(&SessionError::NoDocument),
            "Please upload a valid PDF first!"
        );
    }

    #[test]
    fn cli_flags_build_pipeline_config() {
        let cli = Cli::parse_from([
            "pdf-qa",
            "--contrast",
            "0",
            "--ocr-lang",
            "ara+eng",
            "--disable-strategy",
            "image-ocr-primary",
            "--ocr-layout",
            "per-page",
            "doctor",
        ]);
        let config = cli.pipeline.to_config();

        assert_eq!(config.ocr.contrast, None);
        assert_eq!(config.ocr.language_codes(), vec!["ara", "eng"]);
        assert!(!config.is_enabled(ExtractionMethod::ImageOcrPrimary));
        assert_eq!(config.ocr_layout, OcrLayout::PerPage);
        assert_eq!(config.primary_dpi(), 216);
    }

    #[test]
    fn non_positive_magnification_is_rejected() {
        for bad in ["0", "-2", "NaN"] {
            let parsed = Cli::try_parse_from(["pdf-qa", "--magnification", bad, "doctor"]);
            assert!(parsed.is_err(), "accepted magnification {bad}");
        }

        let cli = Cli::parse_from(["pdf-qa", "--magnification", "1.5", "doctor"]);
        assert_eq!(cli.pipeline.to_config().primary_dpi(), 108);
    }

    #[test]
    fn unknown_strategy_is_rejected() {
        assert!(parse_method("pdfplumber").is_err());
    }
}
