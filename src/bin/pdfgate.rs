//! CLI binary for pdfgate.
//!
//! A thin shim over the library crate: loads the command configuration,
//! maps subcommands to `convert_and_merge` / `merge`, and prints results.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pdfgate::{registry, CommandsConfig, ConvertError, Converter, SourceFile};
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert one document next to a scratch directory
  pdfgate convert report.docx -w /tmp/job

  # Convert several documents and merge them, in order, into one PDF
  pdfgate convert cover.html body.docx annex.pdf -o bundle.pdf

  # Merge existing PDFs
  pdfgate merge a.pdf b.pdf c.pdf -o merged.pdf

  # Show which file types are configured
  pdfgate commands

CONFIGURATION (pdfgate.toml):
  [commands.html]
  template = "wkhtmltopdf --quiet {source} {output}"
  timeout = 30
  aliases = ["htm"]

  [commands.docx]
  template = "libreoffice --headless --convert-to pdf --outdir {outdir} {source}"
  timeout = 60
  aliases = ["doc", "odt", "xlsx", "pptx"]

  [commands.merge]
  template = "pdfunite {inputs} {output}"
  timeout = 30

PLACEHOLDERS:
  {source}   source document          {output}   destination PDF
  {outdir}   working directory        {inputs}   merge inputs, one argument each

EXIT STATUS:
  0 success, 1 command failed, 2 unsupported file type, 124 timeout, 3 other errors
"#;

/// Convert documents to PDF and merge PDFs through external tools.
#[derive(Parser, Debug)]
#[command(
    name = "pdfgate",
    version,
    about = "Convert documents to PDF and merge PDFs through external tools",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Command configuration file (TOML, or JSON with a .json extension).
    #[arg(short, long, env = "PDFGATE_CONFIG", default_value = "pdfgate.toml", global = true)]
    config: PathBuf,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDFGATE_VERBOSE", global = true)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDFGATE_QUIET", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Convert documents to PDF; several inputs are merged in order.
    Convert {
        /// Documents to convert. PDFs are passed through.
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Scratch directory for outputs. A temporary one is used if omitted.
        #[arg(short, long, env = "PDFGATE_WORKDIR")]
        workdir: Option<PathBuf>,

        /// Copy the final PDF here.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Treat every input as this file type, whatever its name.
        #[arg(long = "as", value_name = "EXT")]
        as_type: Option<String>,

        /// Concurrent conversions.
        #[arg(long, env = "PDFGATE_CONCURRENCY", default_value_t = 4)]
        concurrency: usize,
    },

    /// Merge PDFs, in the order given, into one file.
    Merge {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        #[arg(short, long, env = "PDFGATE_WORKDIR")]
        workdir: Option<PathBuf>,

        #[arg(short, long)]
        output: PathBuf,
    },

    /// List configured commands.
    Commands {
        /// Print the configuration as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {:#}", red("✘"), e);
            exit_code_for(&e)
        }
    }
}

async fn run(cli: &Cli) -> Result<()> {
    let config = CommandsConfig::from_file(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;

    match &cli.command {
        Cmd::Commands { json } => {
            print_commands(&config, *json)?;
            return Ok(());
        }
        Cmd::Convert { .. } | Cmd::Merge { .. } => {}
    }

    registry::load(&config).context("Invalid command configuration")?;

    match &cli.command {
        Cmd::Convert {
            files,
            workdir,
            output,
            as_type,
            concurrency,
        } => {
            let scratch = Scratch::new(workdir.as_deref(), output.is_some())?;
            let converter = Converter::global().with_concurrency(*concurrency);
            let sources: Vec<SourceFile> = files
                .iter()
                .map(|f| {
                    let src = SourceFile::new(absolute(f));
                    match as_type {
                        Some(ext) => src.with_extension(ext),
                        None => src,
                    }
                })
                .collect();

            let pdf = converter
                .convert_and_merge(scratch.path(), &sources)
                .await
                .context("Conversion failed")?;
            deliver(&pdf, output.as_deref(), cli.quiet).await
        }
        Cmd::Merge {
            files,
            workdir,
            output,
        } => {
            let scratch = Scratch::new(workdir.as_deref(), true)?;
            let inputs: Vec<PathBuf> = files.iter().map(|f| absolute(f)).collect();
            let pdf = Converter::global()
                .merge(scratch.path(), &inputs)
                .await
                .context("Merge failed")?;
            deliver(&pdf, Some(output), cli.quiet).await
        }
        Cmd::Commands { .. } => Ok(()),
    }
}

/// The working directory: caller-supplied, or a temp dir removed on drop.
enum Scratch {
    Given(PathBuf),
    Temp(TempDir),
}

impl Scratch {
    fn new(dir: Option<&Path>, has_output: bool) -> Result<Self> {
        match dir {
            Some(d) => {
                std::fs::create_dir_all(d)
                    .with_context(|| format!("Failed to create {}", d.display()))?;
                Ok(Scratch::Given(absolute(d)))
            }
            None => {
                anyhow::ensure!(
                    has_output,
                    "--output is required when no --workdir is given"
                );
                Ok(Scratch::Temp(
                    TempDir::new().context("Failed to create a temporary directory")?,
                ))
            }
        }
    }

    fn path(&self) -> &Path {
        match self {
            Scratch::Given(p) => p,
            Scratch::Temp(t) => t.path(),
        }
    }
}

async fn deliver(pdf: &Path, output: Option<&Path>, quiet: bool) -> Result<()> {
    let final_path = match output {
        Some(out) => {
            if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            tokio::fs::copy(pdf, out)
                .await
                .with_context(|| format!("Failed to write {}", out.display()))?;
            out.to_path_buf()
        }
        None => pdf.to_path_buf(),
    };

    println!("{}", final_path.display());
    if !quiet {
        eprintln!("{} {}", green("✔"), bold(&final_path.display().to_string()));
    }
    Ok(())
}

fn print_commands(config: &CommandsConfig, json: bool) -> Result<()> {
    config.validate().context("Invalid command configuration")?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(config).context("Failed to serialise configuration")?
        );
        return Ok(());
    }

    for row in command_rows(config) {
        println!("{row}");
    }
    Ok(())
}

/// One line per configured command. Padding is applied before styling.
fn command_rows(config: &CommandsConfig) -> Vec<String> {
    config
        .commands
        .iter()
        .map(|(key, spec)| {
            let aliases = if spec.aliases.is_empty() {
                String::new()
            } else {
                format!(" (+{})", spec.aliases.join(", "))
            };
            format!(
                "{}{}  {}  {}",
                bold(&format!("{key:<8}")),
                aliases,
                dim(&format!("{}s", spec.timeout)),
                spec.template
            )
        })
        .collect()
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

fn exit_code_for(err: &anyhow::Error) -> ExitCode {
    match err.downcast_ref::<ConvertError>() {
        Some(ConvertError::CommandExecution { .. }) => ExitCode::from(1),
        Some(ConvertError::ImpossibleConversion) => ExitCode::from(2),
        Some(ConvertError::CommandTimeout { .. }) => ExitCode::from(124),
        _ => ExitCode::from(3),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_rows_pad_the_key_not_the_escapes() {
        let config = CommandsConfig::builder()
            .command("docx", "cp {source} {output}", 30)
            .merge("pdfunite {inputs} {output}", 60)
            .build()
            .unwrap();
        let rows = command_rows(&config);
        assert_eq!(rows.len(), 2);
        assert!(rows[0].starts_with(&bold("docx    ")), "got {:?}", rows[0]);
        assert!(rows[1].starts_with(&bold("merge   ")), "got {:?}", rows[1]);
    }

    #[test]
    fn commands_rejects_an_invalid_configuration() {
        let mut config = CommandsConfig::default();
        config.commands.insert(
            "html".into(),
            pdfgate::CommandSpec {
                template: "wkhtmltopdf 'unterminated".into(),
                timeout: 30,
                aliases: vec![],
            },
        );
        assert!(print_commands(&config, false).is_err());
        assert!(print_commands(&config, true).is_err());
    }
}
