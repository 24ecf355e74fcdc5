use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};

use matchcard::{
    DeliveryChain, ExportEvent, ExportEvents, ExportOptions, Exporter, ImageFormat, RecordSet,
    Template,
};

#[derive(Parser, Debug)]
#[command(name = "matchcard", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Bind a template against game records and export the raster image.
    Export(ExportArgs),
    /// Parse and validate a template JSON without rendering.
    Validate(ValidateArgs),
}

#[derive(Parser, Debug)]
struct ExportArgs {
    /// Input template JSON.
    #[arg(long)]
    template: PathBuf,

    /// Game records JSON array (first record is primary).
    #[arg(long)]
    records: PathBuf,

    /// Output directory.
    #[arg(long, default_value = "out")]
    out: PathBuf,

    /// Output pixels per logical pixel.
    #[arg(long, default_value_t = 2.0)]
    scale: f32,

    /// Output format (png, jpeg, webp).
    #[arg(long, default_value = "png")]
    format: ImageFormat,

    /// Filename category prefix.
    #[arg(long, default_value = "matchday")]
    category: String,

    /// Pipe the encoded image to this program's stdin instead of writing
    /// a file, falling back to the output directory if it fails.
    #[arg(long)]
    share_command: Option<String>,
}

#[derive(Parser, Debug)]
struct ValidateArgs {
    /// Input template JSON.
    #[arg(long)]
    template: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Export(args) => cmd_export(args).await,
        Command::Validate(args) => cmd_validate(args),
    }
}

fn read_template(path: &Path) -> anyhow::Result<Template> {
    let f = File::open(path).with_context(|| format!("open template '{}'", path.display()))?;
    let template: Template =
        serde_json::from_reader(BufReader::new(f)).with_context(|| "parse template JSON")?;
    Ok(template)
}

fn read_records(path: &Path) -> anyhow::Result<RecordSet> {
    let f = File::open(path).with_context(|| format!("open records '{}'", path.display()))?;
    let records: RecordSet =
        serde_json::from_reader(BufReader::new(f)).with_context(|| "parse records JSON")?;
    Ok(records)
}

async fn cmd_export(args: ExportArgs) -> anyhow::Result<()> {
    let template = read_template(&args.template)?;
    let records = read_records(&args.records)?;

    let chain = match &args.share_command {
        Some(program) => DeliveryChain::share_then_download(program.as_str(), Vec::new(), &args.out),
        None => DeliveryChain::download_to(&args.out),
    };
    let exporter = Exporter::new(chain);

    let opts = ExportOptions {
        scale: args.scale,
        format: args.format,
        category: args.category,
    };

    let (events, mut rx) = ExportEvents::channel();
    let progress = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                ExportEvent::Progress { percent, message } => {
                    eprintln!("[{percent:>3}%] {message}");
                }
                ExportEvent::Resources(statuses) => {
                    for s in statuses {
                        tracing::debug!(id = %s.identifier, state = ?s.state, "resource");
                    }
                }
                ExportEvent::Completed(_) | ExportEvent::Failed { .. } => {}
            }
        }
    });

    let outcome = exporter.export(&template, &records, &opts, &events).await?;
    drop(events);
    let _ = progress.await;

    for warning in &outcome.warnings {
        eprintln!("warning: {warning}");
    }
    eprintln!(
        "wrote {} ({}x{}) via {:?}",
        outcome.filename, outcome.width, outcome.height, outcome.delivered
    );
    Ok(())
}

fn cmd_validate(args: ValidateArgs) -> anyhow::Result<()> {
    let template = read_template(&args.template)?;
    template.validate()?;
    let (width, height) = template.format.dimensions();
    eprintln!(
        "'{}' ok: {} elements, {}x{}",
        template.name,
        template.elements.len(),
        width,
        height
    );
    Ok(())
}
