// SPDX-FileCopyrightText: 2026 Coffer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Config diagnostics: turns figment failures into miette reports that point
//! at the offending line of `coffer.toml` and suggest the closest valid key.

#![allow(unused_assignments)] // miette's Diagnostic derive generates code triggering this lint

use figment::error::Kind;
use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// Jaro-Winkler score a candidate must beat to be offered as a correction.
const SUGGESTION_THRESHOLD: f64 = 0.75;

/// A single problem found while loading or validating the configuration.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("unknown key `{key}` in coffer config")]
    #[diagnostic(
        code(coffer::config::unknown_key),
        help("{}", unknown_key_help(suggestion.as_deref(), valid_keys))
    )]
    UnknownKey {
        key: String,
        /// Closest valid key, when one is similar enough.
        suggestion: Option<String>,
        valid_keys: String,
        #[label("not a recognized key")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("`{key}` has the wrong type: {detail}")]
    #[diagnostic(code(coffer::config::invalid_type), help("use a value of type {expected}"))]
    InvalidType {
        key: String,
        detail: String,
        expected: String,
        #[label("this value")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("required key `{key}` is not set")]
    #[diagnostic(code(coffer::config::missing_key))]
    MissingKey { key: String },

    /// A value parsed fine but is outside what the store accepts.
    #[error("invalid configuration: {message}")]
    #[diagnostic(code(coffer::config::validation))]
    Validation { message: String },

    #[error("configuration error: {0}")]
    #[diagnostic(code(coffer::config::other))]
    Other(String),
}

fn unknown_key_help(suggestion: Option<&str>, valid_keys: &str) -> String {
    let mut help = String::new();
    if let Some(s) = suggestion {
        help.push_str(&format!("did you mean `{s}`? "));
    }
    help.push_str(&format!("expected one of: {valid_keys}"));
    help
}

/// The TOML files that fed a figment, as `(path, contents)` pairs.
struct Sources<'a>(&'a [(String, String)]);

impl Sources<'_> {
    /// Locate `field` inside the file the error came from.
    fn locate(
        &self,
        error: &figment::Error,
        field: &str,
    ) -> (Option<SourceSpan>, Option<NamedSource<String>>) {
        let Some(figment::Source::File(origin)) =
            error.metadata.as_ref().and_then(|m| m.source.as_ref())
        else {
            return (None, None);
        };
        let origin = origin.display().to_string();
        let Some((path, content)) = self.0.iter().find(|(p, _)| *p == origin) else {
            return (None, None);
        };

        let section: Vec<String> = error.path.iter().map(ToString::to_string).collect();
        match find_key_offset(content, &section, field) {
            Some(offset) => (
                Some(SourceSpan::new(offset.into(), field.len())),
                Some(NamedSource::new(path, content.clone())),
            ),
            None => (None, None),
        }
    }
}

/// Convert every error carried by a `figment::Error` into a [`ConfigError`].
pub fn figment_to_config_errors(
    err: figment::Error,
    toml_sources: &[(String, String)],
) -> Vec<ConfigError> {
    let sources = Sources(toml_sources);
    err.into_iter()
        .map(|error| match &error.kind {
            Kind::UnknownField(field, expected) => {
                let (span, src) = sources.locate(&error, field);
                ConfigError::UnknownKey {
                    key: field.clone(),
                    suggestion: suggest_key(field, expected),
                    valid_keys: expected.join(", "),
                    span,
                    src,
                }
            }
            Kind::MissingField(field) => ConfigError::MissingKey {
                key: field.to_string(),
            },
            Kind::InvalidType(actual, expected) => {
                let key = error.path.join(".");
                let leaf = error.path.last().cloned().unwrap_or_default();
                let mut parent = error.clone();
                parent.path.pop();
                let (span, src) = sources.locate(&parent, &leaf);
                ConfigError::InvalidType {
                    key,
                    detail: format!("found {actual}"),
                    expected: expected.to_string(),
                    span,
                    src,
                }
            }
            _ => ConfigError::Other(error.to_string()),
        })
        .collect()
}

/// Byte offset of `field` written as `field = ...` under the `[section]`
/// named by the first element of `path` (or at top level when `path` is empty).
pub fn find_key_offset(content: &str, path: &[String], field: &str) -> Option<usize> {
    let start = match path.first() {
        Some(section) => {
            let header = format!("[{section}]");
            content.find(&header)? + header.len()
        }
        None => 0,
    };

    let mut line_start = start;
    for line in content[start..].split_inclusive('\n') {
        let indent = line.len() - line.trim_start().len();
        let rest = &line[indent..];
        if rest.starts_with('[') && line_start > start {
            return None;
        }
        if let Some(after) = rest.strip_prefix(field)
            && after.trim_start().starts_with('=')
        {
            return Some(line_start + indent);
        }
        line_start += line.len();
    }
    None
}

/// The valid key most similar to `unknown`, if any clears the threshold.
pub fn suggest_key(unknown: &str, valid_keys: &[&str]) -> Option<String> {
    valid_keys
        .iter()
        .map(|key| (strsim::jaro_winkler(unknown, key), *key))
        .filter(|(score, _)| *score > SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, key)| key.to_string())
}

/// Print each error to stderr through miette's graphical handler.
pub fn render_errors(errors: &[ConfigError]) {
    let handler = miette::GraphicalReportHandler::new();
    for error in errors {
        let mut rendered = String::new();
        match handler.render_report(&mut rendered, error as &dyn Diagnostic) {
            Ok(()) => eprint!("{rendered}"),
            Err(_) => eprintln!("Error: {error}"),
        }
    }
}
