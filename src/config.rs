//! Command configuration: which tool handles which file type.
//!
//! A [`CommandsConfig`] maps a file extension (plus the reserved key
//! [`MERGE_KEY`]) to a [`CommandSpec`]: a command template and a timeout.
//! It is plain serde data so it can come from a TOML or JSON file, or be built
//! in code with [`CommandsConfig::builder()`].
//!
//! ```toml
//! [commands.html]
//! template = "wkhtmltopdf --quiet {source} {output}"
//! timeout = 30
//! aliases = ["htm"]
//!
//! [commands.merge]
//! template = "pdfunite {inputs} {output}"
//! timeout = 30
//! ```

use crate::error::ConvertError;
use crate::registry::CommandRegistry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Registry key reserved for the merge command.
pub const MERGE_KEY: &str = "merge";

/// Timeout applied when a command entry omits `timeout`.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Command configuration, keyed by extension.
///
/// # Example
/// ```rust
/// use pdfgate::CommandsConfig;
///
/// let config = CommandsConfig::builder()
///     .command("html", "wkhtmltopdf --quiet {source} {output}", 30)
///     .merge("pdfunite {inputs} {output}", 60)
///     .build()
///     .unwrap();
/// assert_eq!(config.commands.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandsConfig {
    #[serde(default)]
    pub commands: BTreeMap<String, CommandSpec>,
}

/// One configured command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Command template; see [`crate::template`] for placeholder tokens.
    pub template: String,

    /// Seconds before the process group is killed. `0` always times out.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Further extensions handled by the same command.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

#[derive(Debug, Clone, Copy)]
enum Format {
    Toml,
    Json,
}

impl CommandsConfig {
    /// Create a new builder for `CommandsConfig`.
    pub fn builder() -> CommandsConfigBuilder {
        CommandsConfigBuilder {
            config: Self::default(),
        }
    }

    /// Read a configuration file. `.json` files are parsed as JSON, anything
    /// else as TOML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConvertError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConvertError::ConfigRead {
            path: path.to_path_buf(),
            source: e,
        })?;

        let format = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Format::Json,
            _ => Format::Toml,
        };
        Self::parse(&text, format, path)
    }

    /// Parse TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConvertError> {
        Self::parse(text, Format::Toml, Path::new("<toml>"))
    }

    /// Parse JSON text.
    pub fn from_json_str(text: &str) -> Result<Self, ConvertError> {
        Self::parse(text, Format::Json, Path::new("<json>"))
    }

    fn parse(text: &str, format: Format, origin: &Path) -> Result<Self, ConvertError> {
        let parsed = match format {
            Format::Toml => toml::from_str::<Self>(text).map_err(|e| e.to_string()),
            Format::Json => serde_json::from_str::<Self>(text).map_err(|e| e.to_string()),
        };
        parsed.map_err(|detail| ConvertError::ConfigParse {
            path: PathBuf::from(origin),
            detail,
        })
    }

    /// Check that every template parses and no extension is claimed twice.
    pub fn validate(&self) -> Result<(), ConvertError> {
        CommandRegistry::from_config(self).map(|_| ())
    }
}

/// Builder for [`CommandsConfig`].
#[derive(Debug)]
pub struct CommandsConfigBuilder {
    config: CommandsConfig,
}

impl CommandsConfigBuilder {
    pub fn command(
        self,
        extension: impl Into<String>,
        template: impl Into<String>,
        timeout: u64,
    ) -> Self {
        self.command_with_aliases(extension, template, timeout, std::iter::empty::<String>())
    }

    pub fn command_with_aliases<I, S>(
        mut self,
        extension: impl Into<String>,
        template: impl Into<String>,
        timeout: u64,
        aliases: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.commands.insert(
            extension.into(),
            CommandSpec {
                template: template.into(),
                timeout,
                aliases: aliases.into_iter().map(Into::into).collect(),
            },
        );
        self
    }

    pub fn merge(self, template: impl Into<String>, timeout: u64) -> Self {
        self.command(MERGE_KEY, template, timeout)
    }

    /// Build the configuration, validating every template.
    pub fn build(self) -> Result<CommandsConfig, ConvertError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[commands.html]
template = "wkhtmltopdf --quiet {source} {output}"
timeout = 30
aliases = ["htm"]

[commands.docx]
template = "libreoffice --headless --convert-to pdf --outdir {outdir} {source}"

[commands.merge]
template = "pdfunite {inputs} {output}"
timeout = 60
"#;

    #[test]
    fn parses_toml() {
        let c = CommandsConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(c.commands.len(), 3);
        assert_eq!(c.commands["html"].aliases, vec!["htm"]);
        assert_eq!(c.commands["docx"].timeout, DEFAULT_TIMEOUT_SECS);
        assert_eq!(c.commands[MERGE_KEY].timeout, 60);
        c.validate().unwrap();
    }

    #[test]
    fn parses_json() {
        let c = CommandsConfig::from_json_str(
            r#"{"commands": {"txt": {"template": "cp {source} {output}", "timeout": 5}}}"#,
        )
        .unwrap();
        assert_eq!(c.commands["txt"].timeout, 5);
        assert!(c.commands["txt"].aliases.is_empty());
    }

    #[test]
    fn negative_timeout_is_a_parse_error() {
        let err = CommandsConfig::from_toml_str(
            "[commands.html]\ntemplate = \"x {source}\"\ntimeout = -1\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConvertError::ConfigParse { .. }), "got {err:?}");
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = CommandsConfig::from_file("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, ConvertError::ConfigRead { .. }));
    }

    #[test]
    fn from_file_picks_format_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let json = dir.path().join("commands.json");
        std::fs::write(
            &json,
            r#"{"commands": {"merge": {"template": "pdfunite {inputs} {output}"}}}"#,
        )
        .unwrap();
        let toml_path = dir.path().join("commands.toml");
        std::fs::write(&toml_path, SAMPLE).unwrap();

        assert!(CommandsConfig::from_file(&json).unwrap().commands.contains_key(MERGE_KEY));
        assert_eq!(CommandsConfig::from_file(&toml_path).unwrap().commands.len(), 3);
    }

    #[test]
    fn builder_rejects_bad_templates() {
        let err = CommandsConfig::builder()
            .command("html", "wkhtmltopdf 'unterminated", 30)
            .build()
            .unwrap_err();
        assert!(matches!(err, ConvertError::InvalidTemplate { .. }));

        let err = CommandsConfig::builder()
            .merge("pdfunite {output}", 30)
            .build()
            .unwrap_err();
        assert!(matches!(err, ConvertError::InvalidTemplate { .. }));
    }

    #[test]
    fn builder_accepts_zero_timeout() {
        let c = CommandsConfig::builder()
            .command("docx", "cp {source} {output}", 0)
            .build()
            .unwrap();
        assert_eq!(c.commands["docx"].timeout, 0);
    }

    #[test]
    fn serialises_round_trip_shape() {
        let c = CommandsConfig::builder()
            .command_with_aliases("docx", "cp {source} {output}", 10, ["doc", "odt"])
            .build()
            .unwrap();
        let text = toml::to_string(&c).unwrap();
        assert!(text.contains("[commands.docx]"), "got: {text}");
        assert!(text.contains("aliases"), "got: {text}");
    }
}
