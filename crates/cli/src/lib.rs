use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use pageview_core::{
    page_file_path, DocumentLoader, ExportFormat, RasterImage, Surface, ViewMode, ViewerConfig,
    ViewerStateMachine,
};
use serde::Serialize;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Parser)]
#[command(name = "pageview")]
#[command(about = "Render, inspect and export documents")]
pub struct Cli {
    /// Raise log verbosity (-v info, -vv debug). RUST_LOG takes precedence.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print machine-readable document metadata.
    Info {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Render one page to a PNG.
    Render {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// 1-based page number.
        #[arg(long)]
        page: u32,
        #[arg(long)]
        dpi: Option<u32>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Fill the thumbnail grid and print its layout.
    Thumbnails {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// Width reserved for one thumbnail cell, in pixels.
        #[arg(long)]
        width: Option<u32>,
    },
    /// Export the document as PDF, per-page PNG/JPEG, or text.
    Export {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long)]
        output: PathBuf,
        /// Inferred from the output extension when omitted.
        #[arg(long)]
        format: Option<ExportFormat>,
        #[arg(long)]
        dpi: Option<u32>,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, Serialize)]
struct InfoOutput {
    path: String,
    page_count: u32,
}

#[derive(Debug, Serialize)]
struct ThumbnailsOutput {
    page_count: u32,
    rendered: usize,
    columns: usize,
    rows: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    errors: Vec<String>,
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);
    init_logging(cli.verbose);

    match cli.command {
        Commands::Info { file } => run_info(&file),
        Commands::Render { file, page, dpi, output } => {
            run_render(&file, page, dpi, output.as_deref())
        }
        Commands::Thumbnails { file, width } => run_thumbnails(&file, width),
        Commands::Export { file, output, format, dpi } => run_export(&file, &output, format, dpi),
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };

    // A second call in the same process keeps the first logger.
    let env = env_logger::Env::default().default_filter_or(default_level);
    let _ = env_logger::Builder::from_env(env).try_init();
}

fn run_info(file: &Path) -> Result<()> {
    ensure_document_exists(file)?;

    let document = loader().load(file).context("failed to open document")?;

    let payload =
        InfoOutput { path: file.display().to_string(), page_count: document.page_count() };

    let json = serde_json::to_string_pretty(&payload)?;
    println!("{json}");

    Ok(())
}

fn run_render(file: &Path, page: u32, dpi: Option<u32>, output: Option<&Path>) -> Result<()> {
    ensure_document_exists(file)?;

    if page == 0 {
        anyhow::bail!("--page is 1-based and must be >= 1");
    }

    let mut config = load_config()?;
    if let Some(dpi) = dpi {
        config = config.with_display_dpi(dpi);
    }

    let image = render_requested_page(loader().as_ref(), file, page, config.display_dpi)?;

    let output = output.map(ToOwned::to_owned).unwrap_or_else(|| default_page_output(file, page));

    if let Some(parent) = output.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    image
        .save(&output)
        .with_context(|| format!("failed to write image to {}", output.display()))?;

    println!("{}", output.display());

    Ok(())
}

/// Renders the 1-based `page` of `file` once, at `dpi`.
fn render_requested_page(
    loader: &dyn DocumentLoader,
    file: &Path,
    page: u32,
    dpi: u32,
) -> Result<RasterImage> {
    let document = loader.load(file).context("failed to open document")?;

    if page > document.page_count() {
        anyhow::bail!(
            "page {page} is out of range (document has {} pages)",
            document.page_count()
        );
    }

    document.render_page(page - 1, dpi).context("failed to render page")
}

fn run_thumbnails(file: &Path, width: Option<u32>) -> Result<()> {
    ensure_document_exists(file)?;

    let mut config = load_config()?;
    if let Some(width) = width {
        config = config.with_thumbnail_item_width(width);
    }

    let mut viewer = ViewerStateMachine::new(loader(), config);
    let document = viewer.open_document(file).context("failed to open document")?;
    viewer.take_notices();

    viewer.enter_mode(ViewMode::Thumbnails);
    viewer.wait_for_background();

    let errors = viewer
        .take_notices()
        .into_iter()
        .filter(|notice| notice.is_error())
        .map(|notice| notice.message)
        .collect();

    let payload = match viewer.surface() {
        Surface::Thumbnails(grid) => ThumbnailsOutput {
            page_count: document.page_count(),
            rendered: grid.len(),
            columns: grid.columns(),
            rows: grid.rows(),
            errors,
        },
        _ => anyhow::bail!("thumbnail grid was not mounted"),
    };

    let json = serde_json::to_string_pretty(&payload)?;
    println!("{json}");

    Ok(())
}

fn run_export(
    file: &Path,
    output: &Path,
    format: Option<ExportFormat>,
    dpi: Option<u32>,
) -> Result<()> {
    ensure_document_exists(file)?;

    let format = match format.or_else(|| ExportFormat::from_path(output)) {
        Some(format) => format,
        None => anyhow::bail!(
            "cannot infer export format from {}; pass --format",
            output.display()
        ),
    };

    let mut config = load_config()?;
    if let Some(dpi) = dpi {
        config = config.with_export_dpi(dpi);
    }

    let mut viewer = ViewerStateMachine::new(loader(), config);
    let document = viewer.open_document(file).context("failed to open document")?;
    // Only failures from the export itself matter below.
    viewer.take_notices();

    viewer
        .export(format, output)
        .with_context(|| format!("failed to export {format} to {}", output.display()))?;
    viewer.wait_for_background();

    if let Some(notice) = viewer.take_notices().into_iter().find(|notice| notice.is_error()) {
        anyhow::bail!("{}", notice.message);
    }

    if format.is_image() {
        for page_index in document.all_pages() {
            println!("{}", page_file_path(output, page_index, format).display());
        }
    } else {
        println!("{}", output.display());
    }

    Ok(())
}

fn load_config() -> Result<ViewerConfig> {
    ViewerConfig::from_env().context("invalid viewer configuration")
}

fn loader() -> Box<dyn DocumentLoader> {
    #[cfg(feature = "pdfium")]
    {
        match pageview_engine::pdfium::PdfiumEngine::bind() {
            Ok(engine) => return Box::new(engine),
            Err(err) => log::warn!("{err}; falling back to page frames"),
        }
    }

    Box::new(pageview_engine::default_engine())
}

fn ensure_document_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("file does not exist: {}", path.display());
    }

    if !path.is_file() {
        anyhow::bail!("path is not a file: {}", path.display());
    }

    Ok(())
}

fn default_page_output(file: &Path, page: u32) -> PathBuf {
    let stem = file.file_stem().and_then(|name| name.to_str()).unwrap_or("page");

    file.with_file_name(format!("{stem}-page-{page}.png"))
}
