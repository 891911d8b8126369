//! CLI command definitions, routing, and tracing setup.

use std::io::Read;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use darwin_core::{DocumentService, GeneratedDocument, ProgressReporter, Stage};
use darwin_shared::{
    AppConfig, ConverterKind, DarwinError, DocumentRequest, OutputFormat, init_config,
    load_config, load_config_from,
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Darwin: generate technical architecture dossiers.
#[derive(Parser)]
#[command(
    name = "darwin",
    version,
    about = "Generate technical architecture dossiers as DOCX, PDF or ODT.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.darwin/darwin.toml.
    #[arg(long, global = true, env = "DARWIN_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Output format selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub(crate) enum FormatArg {
    Docx,
    Pdf,
    Odt,
}

impl From<FormatArg> for OutputFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Docx => OutputFormat::Docx,
            FormatArg::Pdf => OutputFormat::Pdf,
            FormatArg::Odt => OutputFormat::Odt,
        }
    }
}

/// Converter backend selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub(crate) enum ConverterArg {
    Local,
    Remote,
    Disabled,
}

impl From<ConverterArg> for ConverterKind {
    fn from(arg: ConverterArg) -> Self {
        match arg {
            ConverterArg::Local => ConverterKind::Local,
            ConverterArg::Remote => ConverterKind::Remote,
            ConverterArg::Disabled => ConverterKind::Disabled,
        }
    }
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Generate a dossier from a JSON request.
    Generate(GenerateArgs),

    /// Template management.
    Template {
        #[command(subcommand)]
        action: TemplateAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Args, Debug)]
pub(crate) struct GenerateArgs {
    /// Request payload: a JSON file, or `-` for stdin.
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output format.
    #[arg(short, long, value_enum, default_value = "docx")]
    pub format: FormatArg,

    /// Directory receiving the artifacts.
    #[arg(long)]
    pub out_dir: Option<PathBuf>,

    /// Template to render.
    #[arg(long)]
    pub template: Option<PathBuf>,

    /// Conversion time limit in seconds.
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Converter backend.
    #[arg(long, value_enum)]
    pub converter: Option<ConverterArg>,

    /// Print the result as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Template subcommands.
#[derive(Subcommand)]
pub(crate) enum TemplateAction {
    /// Write the built-in dossier template.
    Init {
        /// Destination (defaults to the configured template path).
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "darwin=info",
        1 => "darwin=debug",
        _ => "darwin=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    // Logs go to stderr; stdout carries the command result.
    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Generate(args) => cmd_generate(config_path, &args).await,
        Command::Template { action } => match action {
            TemplateAction::Init { path } => cmd_template_init(config_path, path.as_deref()),
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(config_path),
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    Ok(match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    })
}

/// Apply command-line overrides on top of the loaded config.
fn apply_overrides(config: &mut AppConfig, args: &GenerateArgs) -> Result<()> {
    if let Some(dir) = &args.out_dir {
        config.paths.output_dir = dir.clone();
    }
    if let Some(template) = &args.template {
        config.paths.template_path = template.clone();
    }
    if let Some(secs) = args.timeout_secs {
        config.converter.timeout_secs = secs;
    }
    if let Some(kind) = args.converter {
        config.converter.kind = kind.into();
    }
    config.validate()?;
    Ok(())
}

fn read_request(input: &Path) -> Result<DocumentRequest> {
    let payload = if input == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .map_err(|e| eyre!("cannot read request from stdin: {e}"))?;
        buf
    } else {
        std::fs::read_to_string(input).map_err(|e| DarwinError::io(input, e))?
    };
    Ok(DocumentRequest::from_json(&payload)?)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_generate(config_path: Option<&Path>, args: &GenerateArgs) -> Result<()> {
    let mut config = resolve_config(config_path)?;
    apply_overrides(&mut config, args)?;

    let request = read_request(&args.input)?;
    let format = OutputFormat::from(args.format);
    let service = DocumentService::from_config(&config)?;

    info!(
        title = %request.titre_projet,
        %format,
        converter = service.converter_name(),
        "generating dossier"
    );

    let reporter = CliProgress::new();
    let document = match service.generate(request, format, &reporter).await {
        Ok(document) => document,
        Err(e) => {
            if args.json {
                let error = serde_json::json!({
                    "error": { "kind": e.kind().as_str(), "message": e.to_string() }
                });
                println!("{}", serde_json::to_string_pretty(&error)?);
            }
            return Err(eyre!("[{}] {e}", e.kind()));
        }
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&document)?);
        return Ok(());
    }

    println!();
    println!("  Document generated.");
    println!("  Path:       {}", document.path.display());
    println!("  Format:     {}", document.format);
    println!("  Media type: {}", document.media_type);
    println!("  Request:    {}", document.request_id);
    println!("  Time:       {:.1}s", document.elapsed.as_secs_f64());
    println!();

    Ok(())
}

fn cmd_template_init(config_path: Option<&Path>, path: Option<&Path>) -> Result<()> {
    let target = match path {
        Some(path) => path.to_path_buf(),
        None => resolve_config(config_path)?.paths.template_path,
    };
    darwin_render::write_default_template(&target)?;
    println!("Template written to: {}", target.display());
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn stage(&self, stage: Stage) {
        self.spinner.set_message(stage.label());
    }

    fn done(&self, _document: &GeneratedDocument) {
        self.spinner.finish_and_clear();
    }

    fn failed(&self, _error: &DarwinError) {
        self.spinner.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> std::result::Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("darwin").chain(args.iter().copied()))
    }

    fn generate_args(cli: Cli) -> GenerateArgs {
        match cli.command {
            Command::Generate(args) => args,
            _ => panic!("expected generate"),
        }
    }

    #[test]
    fn generate_defaults_to_docx() {
        let args = generate_args(parse(&["generate", "--input", "req.json"]).unwrap());
        assert_eq!(args.format, FormatArg::Docx);
        assert!(!args.json);
    }

    #[test]
    fn unknown_format_is_rejected() {
        assert!(parse(&["generate", "--input", "req.json", "--format", "rtf"]).is_err());
    }

    #[test]
    fn flags_override_config() {
        let args = generate_args(
            parse(&[
                "generate",
                "-i",
                "-",
                "-f",
                "pdf",
                "--out-dir",
                "/tmp/out",
                "--timeout-secs",
                "5",
                "--converter",
                "disabled",
            ])
            .unwrap(),
        );
        let mut config = AppConfig::default();
        apply_overrides(&mut config, &args).unwrap();

        assert_eq!(OutputFormat::from(args.format), OutputFormat::Pdf);
        assert_eq!(config.paths.output_dir, PathBuf::from("/tmp/out"));
        assert_eq!(config.converter.timeout_secs, 5);
        assert_eq!(config.converter.kind, ConverterKind::Disabled);
        assert_eq!(config.converter.program, "soffice");
    }

    #[test]
    fn invalid_override_is_rejected() {
        let args = generate_args(
            parse(&["generate", "-i", "r.json", "--converter", "remote"]).unwrap(),
        );
        let mut config = AppConfig::default();
        assert!(apply_overrides(&mut config, &args).is_err());
    }

    #[test]
    fn reads_request_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("req.json");
        std::fs::write(&path, r#"{"titre_projet": "Darwin", "acteurs": []}"#).unwrap();

        let request = read_request(&path).unwrap();
        assert_eq!(request.titre_projet, "Darwin");
        assert_eq!(request.segmentation_dr, "Non");
    }

    #[test]
    fn template_init_writes_to_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.docx");
        cmd_template_init(None, Some(&path)).unwrap();
        assert!(path.is_file());
    }
}
