//! Conversion entry points: one document to PDF, or a batch to one PDF.
//!
//! [`Converter`] owns a registry snapshot and does the work. The free
//! functions ([`unconv`], [`convert_and_merge`], …) use the process-wide
//! registry populated by [`crate::registry::load`].
//!
//! ## Failure policy
//!
//! The destination must not exist yet ([`ConvertError::OutputExists`]).
//! Runner errors are returned unchanged, never retried, and the destination
//! file is deleted on every error path. A tool that exits 0 without writing
//! the destination is reported as [`ConvertError::MissingOutput`].

use crate::config::CommandsConfig;
use crate::error::ConvertError;
use crate::registry::{self, normalize_extension, CommandRegistry};
use crate::runner;
use crate::template::{Bindings, CommandLine};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Extension of the target format. Never accepted as a conversion source.
pub const PDF_EXTENSION: &str = "pdf";

/// Default number of concurrent conversions in [`Converter::convert_and_merge`].
pub const DEFAULT_CONCURRENCY: usize = 4;

/// A source document: something with a path and an extension.
///
/// The converter only reads these; it never moves or deletes the source.
pub trait Document: Send + Sync {
    /// Where the document is stored.
    fn path(&self) -> &Path;

    /// Lower-case extension without the dot. Defaults to the path's.
    fn extension(&self) -> Option<String> {
        self.path()
            .extension()
            .and_then(|e| e.to_str())
            .map(normalize_extension)
    }
}

impl Document for Path {
    fn path(&self) -> &Path {
        self
    }
}

impl Document for PathBuf {
    fn path(&self) -> &Path {
        self.as_path()
    }
}

/// A stored document whose type may differ from its on-disk name.
///
/// Uploads are often saved under a generated name; `with_extension` keeps
/// the type the client declared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    path: PathBuf,
    extension: Option<String>,
}

impl SourceFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            extension: None,
        }
    }

    /// Override the extension derived from the path.
    pub fn with_extension(mut self, extension: impl AsRef<str>) -> Self {
        self.extension = Some(normalize_extension(extension.as_ref()));
        self
    }
}

impl Document for SourceFile {
    fn path(&self) -> &Path {
        &self.path
    }

    fn extension(&self) -> Option<String> {
        self.extension.clone().or_else(|| {
            self.path
                .as_path()
                .extension()
                .and_then(|e| e.to_str())
                .map(normalize_extension)
        })
    }
}

/// Runs conversions and merges against one registry snapshot.
#[derive(Debug, Clone)]
pub struct Converter {
    registry: Arc<CommandRegistry>,
    concurrency: usize,
}

impl Converter {
    pub fn new(registry: impl Into<Arc<CommandRegistry>>) -> Self {
        Self {
            registry: registry.into(),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Build a converter with its own registry, leaving global state alone.
    pub fn from_config(config: &CommandsConfig) -> Result<Self, ConvertError> {
        Ok(Self::new(CommandRegistry::from_config(config)?))
    }

    /// A converter over the current process-wide registry.
    pub fn global() -> Self {
        Self::new(registry::current())
    }

    /// Maximum concurrent conversions in a batch (at least 1).
    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    /// Convert `file` to `working_dir/<stem>.pdf`.
    ///
    /// # Errors
    /// - [`ConvertError::ImpossibleConversion`] if the file is already a PDF,
    ///   has no extension, or its extension has no command. Nothing is run.
    /// - [`ConvertError::OutputExists`] if `working_dir/<stem>.pdf` is already
    ///   there. Nothing is run and the file is left alone.
    /// - Runner errors ([`ConvertError::CommandTimeout`],
    ///   [`ConvertError::CommandExecution`]) unchanged.
    pub async fn unconv<D>(&self, working_dir: &Path, file: &D) -> Result<PathBuf, ConvertError>
    where
        D: Document + ?Sized,
    {
        let source = file.path();
        let extension = file
            .extension()
            .filter(|e| !e.is_empty())
            .ok_or(ConvertError::ImpossibleConversion)?;

        if extension == PDF_EXTENSION {
            debug!("Refusing to convert '{}': already a PDF", source.display());
            return Err(ConvertError::ImpossibleConversion);
        }

        let entry = self.registry.resolve(&extension).ok_or_else(|| {
            debug!("No command configured for '.{}'", extension);
            ConvertError::ImpossibleConversion
        })?;

        let output = destination_for(working_dir, source)?;
        let command = entry.template.render(&Bindings {
            source: Some(source),
            output: &output,
            outdir: working_dir,
            inputs: &[],
        });

        info!("Converting '{}' ({})", source.display(), extension);
        let start = Instant::now();
        run_to_file(&command, entry.timeout_secs, &output).await?;
        info!(
            "Converted '{}' → '{}' in {}ms",
            source.display(),
            output.display(),
            start.elapsed().as_millis()
        );

        Ok(output)
    }

    /// Convert every document and merge the results, in input order.
    ///
    /// PDFs are passed through as-is. Each conversion writes into its own
    /// numbered subdirectory of `working_dir`, so `a.docx` and `a.html` do not
    /// collide. A single input yields its PDF without a merge.
    pub async fn convert_and_merge<D: Document>(
        &self,
        working_dir: &Path,
        files: &[D],
    ) -> Result<PathBuf, ConvertError> {
        if files.is_empty() {
            return Err(ConvertError::NoInputs);
        }
        info!("Processing {} document(s)", files.len());

        let pdfs: Vec<PathBuf> = stream::iter(files.iter().enumerate().map(|(i, file)| async move {
            if file.extension().as_deref() == Some(PDF_EXTENSION) {
                return Ok(file.path().to_path_buf());
            }
            let staging = working_dir.join(format!("{i:04}"));
            tokio::fs::create_dir_all(&staging)
                .await
                .map_err(|e| ConvertError::WorkingDir {
                    path: staging.clone(),
                    source: e,
                })?;
            self.unconv(&staging, file).await
        }))
        .buffered(self.concurrency)
        .try_collect()
        .await?;

        match pdfs.as_slice() {
            [single] => Ok(single.clone()),
            _ => self.merge(working_dir, &pdfs).await,
        }
    }
}

/// `working_dir/<stem>.pdf`, keeping dots inside the stem.
fn destination_for(working_dir: &Path, source: &Path) -> Result<PathBuf, ConvertError> {
    let stem = source
        .file_stem()
        .ok_or(ConvertError::ImpossibleConversion)?;
    let mut name = OsString::from(stem);
    name.push(".");
    name.push(PDF_EXTENSION);
    Ok(working_dir.join(name))
}

/// Run `command` and make sure `output` exists afterwards, or not at all.
///
/// `output` must not exist beforehand, so a failed run only ever removes a
/// file this call created.
pub(crate) async fn run_to_file(
    command: &CommandLine,
    timeout_secs: u64,
    output: &Path,
) -> Result<(), ConvertError> {
    match tokio::fs::try_exists(output).await {
        Ok(false) => {}
        Ok(true) => {
            debug!("Refusing to overwrite '{}'", output.display());
            return Err(ConvertError::OutputExists {
                path: output.to_path_buf(),
            });
        }
        Err(e) => {
            return Err(ConvertError::WorkingDir {
                path: output.to_path_buf(),
                source: e,
            })
        }
    }

    match runner::run(command, timeout_secs).await {
        Ok(_) => {
            if tokio::fs::try_exists(output).await.unwrap_or(false) {
                Ok(())
            } else {
                Err(ConvertError::MissingOutput {
                    command: command.to_string(),
                    path: output.to_path_buf(),
                })
            }
        }
        Err(e) => {
            remove_partial(output).await;
            Err(e)
        }
    }
}

async fn remove_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Removed partial output '{}'", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove partial output '{}': {}", path.display(), e),
    }
}

// ── Process-wide entry points ────────────────────────────────────────────

/// Convert `file` using the process-wide registry. See [`Converter::unconv`].
pub async fn unconv<D>(working_dir: &Path, file: &D) -> Result<PathBuf, ConvertError>
where
    D: Document + ?Sized,
{
    Converter::global().unconv(working_dir, file).await
}

/// Convert and merge using the process-wide registry.
/// See [`Converter::convert_and_merge`].
pub async fn convert_and_merge<D: Document>(
    working_dir: &Path,
    files: &[D],
) -> Result<PathBuf, ConvertError> {
    Converter::global().convert_and_merge(working_dir, files).await
}

/// Synchronous wrapper around [`unconv`].
///
/// Creates a temporary tokio runtime internally.
pub fn unconv_sync<D>(working_dir: &Path, file: &D) -> Result<PathBuf, ConvertError>
where
    D: Document + ?Sized,
{
    tokio::runtime::Runtime::new()
        .map_err(|e| ConvertError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(unconv(working_dir, file))
}
