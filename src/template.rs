//! Command templates: parse once, substitute paths without a shell.
//!
//! A template such as
//!
//! ```text
//! libreoffice --headless --convert-to pdf --outdir {outdir} "{source}"
//! ```
//!
//! is split into words with POSIX shell quoting rules *before* any path is
//! substituted. Placeholders are then replaced inside each word, so a file
//! called `a b; rm -rf ~.docx` becomes exactly one argument and is never seen
//! by a shell.
//!
//! | Token | Replaced by |
//! |-------|-------------|
//! | `{source}` | source document path |
//! | `{output}` | destination PDF path |
//! | `{outdir}` | working directory |
//! | `{inputs}` | ordered merge inputs, one argument each (whole word only) |

use crate::error::ConvertError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};

static RE_PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{(source|output|outdir|inputs)\}").unwrap());

/// A substitution point inside a template word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    Source,
    Output,
    OutDir,
    Inputs,
}

impl Placeholder {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "source" => Some(Placeholder::Source),
            "output" => Some(Placeholder::Output),
            "outdir" => Some(Placeholder::OutDir),
            "inputs" => Some(Placeholder::Inputs),
            _ => None,
        }
    }

    /// The literal token as written in templates.
    pub fn token(self) -> &'static str {
        match self {
            Placeholder::Source => "{source}",
            Placeholder::Output => "{output}",
            Placeholder::OutDir => "{outdir}",
            Placeholder::Inputs => "{inputs}",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Slot(Placeholder),
}

/// One shell word of a template; a sequence of literals and placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Word(Vec<Segment>);

impl Word {
    fn parse(text: &str) -> Self {
        let mut segments = Vec::new();
        let mut last = 0;
        for caps in RE_PLACEHOLDER.captures_iter(text) {
            let Some(whole) = caps.get(0) else { continue };
            if whole.start() > last {
                segments.push(Segment::Literal(text[last..whole.start()].to_string()));
            }
            if let Some(p) = Placeholder::from_name(&caps[1]) {
                segments.push(Segment::Slot(p));
            }
            last = whole.end();
        }
        if last < text.len() || segments.is_empty() {
            segments.push(Segment::Literal(text[last..].to_string()));
        }
        Word(segments)
    }

    fn uses(&self, p: Placeholder) -> bool {
        self.0.iter().any(|s| *s == Segment::Slot(p))
    }

    fn is_exactly(&self, p: Placeholder) -> bool {
        self.0.len() == 1 && self.0[0] == Segment::Slot(p)
    }
}

/// Values bound to placeholders for one invocation.
#[derive(Debug, Clone, Copy)]
pub struct Bindings<'a> {
    pub source: Option<&'a Path>,
    pub output: &'a Path,
    pub outdir: &'a Path,
    pub inputs: &'a [PathBuf],
}

/// A parsed command template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    raw: String,
    words: Vec<Word>,
}

impl CommandTemplate {
    /// Parse a template string.
    ///
    /// Fails on an empty template, unbalanced quotes, or `{inputs}` used
    /// anywhere but as a whole argument.
    pub fn parse(raw: &str) -> Result<Self, ConvertError> {
        let invalid = |reason: &str| ConvertError::InvalidTemplate {
            template: raw.to_string(),
            reason: reason.to_string(),
        };

        let words: Vec<Word> = split_words(raw)
            .map_err(|reason| invalid(&reason))?
            .iter()
            .map(|w| Word::parse(w))
            .collect();

        if words.is_empty() {
            return Err(invalid("template is empty"));
        }
        if words[0].uses(Placeholder::Inputs) {
            return Err(invalid("{inputs} cannot be the program"));
        }
        if words
            .iter()
            .any(|w| w.uses(Placeholder::Inputs) && !w.is_exactly(Placeholder::Inputs))
        {
            return Err(invalid("{inputs} must be a whole argument"));
        }

        Ok(Self {
            raw: raw.to_string(),
            words,
        })
    }

    /// The template as configured.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether any word references `p`.
    pub fn uses(&self, p: Placeholder) -> bool {
        self.words.iter().any(|w| w.uses(p))
    }

    /// Reject placeholders that make no sense for a single-file conversion.
    pub fn validate_for_conversion(&self) -> Result<(), ConvertError> {
        if self.uses(Placeholder::Inputs) {
            return Err(ConvertError::InvalidTemplate {
                template: self.raw.clone(),
                reason: "{inputs} is only valid in the merge command".into(),
            });
        }
        Ok(())
    }

    /// A merge command must consume `{inputs}` and has no single source.
    pub fn validate_for_merge(&self) -> Result<(), ConvertError> {
        let reason = if !self.uses(Placeholder::Inputs) {
            "the merge command must reference {inputs}"
        } else if self.uses(Placeholder::Source) {
            "{source} is not valid in the merge command"
        } else {
            return Ok(());
        };
        Err(ConvertError::InvalidTemplate {
            template: self.raw.clone(),
            reason: reason.into(),
        })
    }

    /// Substitute `bindings` and produce a ready-to-spawn command.
    pub fn render(&self, bindings: &Bindings<'_>) -> CommandLine {
        let capacity = self.words.len() + bindings.inputs.len();
        let mut argv: Vec<OsString> = Vec::with_capacity(capacity);

        for word in &self.words {
            if word.is_exactly(Placeholder::Inputs) {
                argv.extend(bindings.inputs.iter().map(|p| p.as_os_str().to_os_string()));
                continue;
            }
            let mut arg = OsString::new();
            for segment in &word.0 {
                match segment {
                    Segment::Literal(s) => arg.push(s),
                    Segment::Slot(Placeholder::Source) => {
                        if let Some(source) = bindings.source {
                            arg.push(source);
                        }
                    }
                    Segment::Slot(Placeholder::Output) => arg.push(bindings.output),
                    Segment::Slot(Placeholder::OutDir) => arg.push(bindings.outdir),
                    // Rejected by `parse` when not a whole word.
                    Segment::Slot(Placeholder::Inputs) => {}
                }
            }
            argv.push(arg);
        }

        let mut argv = argv.into_iter();
        let program = argv.next().unwrap_or_default();
        CommandLine {
            program,
            args: argv.collect(),
        }
    }
}

impl fmt::Display for CommandTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// A fully rendered command: program plus arguments, no shell involved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: OsString,
    pub args: Vec<OsString>,
}

impl CommandLine {
    /// Split a literal command line with shell-word rules. No substitution.
    pub fn parse(line: &str) -> Result<Self, ConvertError> {
        let mut words = split_words(line)
            .map_err(|reason| ConvertError::InvalidTemplate {
                template: line.to_string(),
                reason,
            })?
            .into_iter()
            .map(OsString::from);

        let program = words.next().ok_or_else(|| ConvertError::InvalidTemplate {
            template: line.to_string(),
            reason: "command is empty".into(),
        })?;

        Ok(Self {
            program,
            args: words.collect(),
        })
    }
}

impl fmt::Display for CommandLine {
    /// Shell-quoted rendering, for logs and error messages only.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", quote(&self.program))?;
        for arg in &self.args {
            write!(f, " {}", quote(arg))?;
        }
        Ok(())
    }
}

fn quote(word: &OsStr) -> String {
    let s = word.to_string_lossy();
    let plain = !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c));
    if plain {
        s.into_owned()
    } else {
        format!("'{}'", s.replace('\'', r"'\''"))
    }
}

/// Split `input` into words the way a POSIX shell would, minus expansion.
///
/// Single quotes are fully literal. Inside double quotes a backslash only
/// escapes `"`, `\`, `$`, `` ` `` and newline. Outside quotes a backslash
/// escapes any character.
pub(crate) fn split_words(input: &str) -> Result<Vec<String>, String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            '\'' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(c) => current.push(c),
                        None => return Err("unterminated single quote".into()),
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(c @ ('"' | '\\' | '$' | '`')) => current.push(c),
                            Some('\n') => {}
                            Some(c) => {
                                current.push('\\');
                                current.push(c);
                            }
                            None => return Err("unterminated double quote".into()),
                        },
                        Some(c) => current.push(c),
                        None => return Err("unterminated double quote".into()),
                    }
                }
            }
            '\\' => match chars.next() {
                Some('\n') => {}
                Some(c) => {
                    in_word = true;
                    current.push(c);
                }
                None => return Err("trailing backslash".into()),
            },
            c => {
                in_word = true;
                current.push(c);
            }
        }
    }

    if in_word {
        words.push(current);
    }
    Ok(words)
}
