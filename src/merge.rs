//! Merge entry points: several PDFs into one, in caller order.

use crate::convert::{run_to_file, Converter, PDF_EXTENSION};
use crate::error::ConvertError;
use crate::template::Bindings;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

impl Converter {
    /// Merge `paths` into `working_dir/<uuid>.pdf`.
    ///
    /// `{inputs}` expands to the paths in exactly the order given; the output
    /// page order follows it.
    ///
    /// # Errors
    /// - [`ConvertError::NoInputs`] for an empty list. Nothing is run.
    /// - [`ConvertError::ImpossibleConversion`] when no merge command is
    ///   configured.
    /// - Runner errors unchanged.
    pub async fn merge(
        &self,
        working_dir: &Path,
        paths: &[PathBuf],
    ) -> Result<PathBuf, ConvertError> {
        if paths.is_empty() {
            return Err(ConvertError::NoInputs);
        }

        let entry = self.registry().merge_entry().ok_or_else(|| {
            debug!("No merge command configured");
            ConvertError::ImpossibleConversion
        })?;

        let output = working_dir.join(format!("{}.{}", uuid::Uuid::new_v4(), PDF_EXTENSION));
        let command = entry.template.render(&Bindings {
            source: None,
            output: &output,
            outdir: working_dir,
            inputs: paths,
        });

        info!("Merging {} PDF(s)", paths.len());
        let start = Instant::now();
        run_to_file(&command, entry.timeout_secs, &output).await?;
        info!(
            "Merged {} PDF(s) → '{}' in {}ms",
            paths.len(),
            output.display(),
            start.elapsed().as_millis()
        );

        Ok(output)
    }
}

/// Merge using the process-wide registry. See [`Converter::merge`].
pub async fn merge(working_dir: &Path, paths: &[PathBuf]) -> Result<PathBuf, ConvertError> {
    Converter::global().merge(working_dir, paths).await
}

/// Synchronous wrapper around [`merge`].
///
/// Creates a temporary tokio runtime internally.
pub fn merge_sync(working_dir: &Path, paths: &[PathBuf]) -> Result<PathBuf, ConvertError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ConvertError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(merge(working_dir, paths))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CommandsConfig;

    #[test]
    fn empty_input_is_rejected_before_lookup() {
        let c = Converter::from_config(&CommandsConfig::default()).unwrap();
        let err = tokio_test::block_on(c.merge(Path::new("/tmp"), &[])).unwrap_err();
        assert!(matches!(err, ConvertError::NoInputs));
    }

    #[test]
    fn missing_merge_command_is_impossible() {
        let c = Converter::from_config(
            &CommandsConfig::builder()
                .command("docx", "cp {source} {output}", 30)
                .build()
                .unwrap(),
        )
        .unwrap();
        let err = tokio_test::block_on(c.merge(Path::new("/tmp"), &[PathBuf::from("/tmp/a.pdf")]))
            .unwrap_err();
        assert!(err.is_impossible());
    }
}
