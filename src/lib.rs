//! # pdfgate
//!
//! Convert documents (HTML, Office formats, anything a command-line tool can
//! turn into PDF) to PDF, and merge PDFs, by driving external tools.
//!
//! ## Why this crate?
//!
//! Rendering Office documents or HTML faithfully is a job for LibreOffice,
//! Chromium or wkhtmltopdf, not for a reimplementation. What those tools lack
//! is a safe harness: they hang on malformed input, fork helpers that outlive
//! them, and are usually invoked through `sh -c` with file names pasted into a
//! command string. pdfgate gives each file type a configured command template
//! and a timeout, substitutes paths without a shell, and kills the whole
//! process group when the deadline passes.
//!
//! ## Pipeline Overview
//!
//! ```text
//! file
//!  │
//!  ├─ 1. Registry  extension → {template, timeout}   (pdf and unknown → ImpossibleConversion)
//!  ├─ 2. Template  substitute {source} {output} {outdir} {inputs}, no shell
//!  ├─ 3. Runner    spawn in own process group, race exit vs. deadline
//!  └─ 4. Result    output path, or CommandTimeout / CommandExecution
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdfgate::{registry, unconv, CommandsConfig};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = CommandsConfig::builder()
//!         .command_with_aliases(
//!             "docx",
//!             "libreoffice --headless --convert-to pdf --outdir {outdir} {source}",
//!             30,
//!             ["doc", "odt"],
//!         )
//!         .merge("pdfunite {inputs} {output}", 30)
//!         .build()?;
//!     registry::load(&config)?;
//!
//!     let pdf = unconv(Path::new("/tmp/job"), Path::new("/tmp/job/report.docx")).await?;
//!     println!("{}", pdf.display());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdfgate` binary (clap + anyhow + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod merge;
pub mod registry;
pub mod runner;
pub mod template;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{CommandSpec, CommandsConfig, CommandsConfigBuilder, MERGE_KEY};
pub use convert::{convert_and_merge, unconv, unconv_sync, Converter, Document, SourceFile};
pub use error::ConvertError;
pub use merge::{merge, merge_sync};
pub use registry::{load, CommandEntry, CommandRegistry};
pub use runner::{run, run_command_line, ProcessOutcome};
pub use template::{CommandLine, CommandTemplate};
