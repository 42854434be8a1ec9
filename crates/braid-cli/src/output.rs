//! Shared output layer for pretty/text/JSON rendering.
//!
//! # Output mode resolution
//!
//! Precedence (highest wins):
//! 1. `--json`
//! 2. `BRAID_FORMAT` env var → `"pretty"` | `"text"` | `"json"`
//! 3. `[output] format` in `braid.toml`, then the user config
//! 4. Default: [`OutputMode::Pretty`] if stdout is a TTY; [`OutputMode::Text`] if piped.
//!
//! Resolution itself lives in `braid_core::config::resolve_config`; this
//! module maps the resolved name onto an [`OutputMode`] and renders.

use braid_core::ErrorCode;
use serde::Serialize;
use std::io::{self, Write};

/// Shared width for human pretty separators.
pub const PRETTY_RULE_WIDTH: usize = 72;

/// Write a horizontal separator used by pretty human output.
pub fn pretty_rule(w: &mut dyn Write) -> io::Result<()> {
    writeln!(w, "{:-<width$}", "", width = PRETTY_RULE_WIDTH)
}

/// Write a section heading followed by a separator.
pub fn pretty_section(w: &mut dyn Write, heading: &str) -> io::Result<()> {
    writeln!(w, "{heading}")?;
    pretty_rule(w)
}

/// The three output modes supported by the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-optimized output (sections, visual framing).
    Pretty,
    /// Tab-separated rows for pipes and scripts.
    Text,
    /// Machine-readable JSON.
    Json,
}

impl OutputMode {
    /// Map a resolved mode name. Unknown names render as text.
    pub fn from_resolved(name: &str) -> Self {
        match name {
            "json" => Self::Json,
            "pretty" => Self::Pretty,
            _ => Self::Text,
        }
    }
}

/// Render a serializable value with explicit pretty/text renderers.
pub fn render_mode<T: Serialize>(
    mode: OutputMode,
    value: &T,
    text_fn: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
    pretty_fn: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
) -> anyhow::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match mode {
        OutputMode::Json => {
            serde_json::to_writer_pretty(&mut out, value)?;
            writeln!(out)?;
        }
        OutputMode::Text => text_fn(value, &mut out)?,
        OutputMode::Pretty => pretty_fn(value, &mut out)?,
    }
    Ok(())
}

/// A structured error with optional suggestion and error code.
#[derive(Debug, Serialize)]
pub struct CliError {
    /// Human-readable error message.
    pub message: String,
    /// Optional suggestion for how to fix the error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// Machine-readable error code (e.g. "E2002").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl CliError {
    /// Build from any error, pulling code and hint from a
    /// [`braid_core::FusionError`] when one is inside.
    pub fn from_error(err: &anyhow::Error) -> Self {
        let fusion = err.downcast_ref::<braid_core::FusionError>();
        Self {
            message: format!("{err:#}"),
            suggestion: fusion
                .and_then(|e| e.code().hint())
                .map(str::to_string),
            error_code: fusion.map(|e| e.code().code().to_string()),
        }
    }

    /// Build from `err` under an explicit `code`.
    pub fn with_code(err: &anyhow::Error, code: ErrorCode) -> Self {
        Self {
            message: format!("{err:#}"),
            suggestion: code.hint().map(str::to_string),
            error_code: Some(code.code().to_string()),
        }
    }
}

/// Render an error to stderr in the requested format.
pub fn render_error(mode: OutputMode, error: &CliError) -> anyhow::Result<()> {
    let stderr = io::stderr();
    let mut out = stderr.lock();
    match mode {
        OutputMode::Json => {
            let wrapper = serde_json::json!({
                "error": error,
            });
            serde_json::to_writer_pretty(&mut out, &wrapper)?;
            writeln!(out)?;
        }
        OutputMode::Pretty | OutputMode::Text => {
            match &error.error_code {
                Some(code) => writeln!(out, "error[{code}]: {}", error.message)?,
                None => writeln!(out, "error: {}", error.message)?,
            }
            if let Some(suggestion) = &error.suggestion {
                writeln!(out, "  hint: {suggestion}")?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use braid_core::FusionError;

    #[test]
    fn resolved_names_map_to_modes() {
        assert_eq!(OutputMode::from_resolved("json"), OutputMode::Json);
        assert_eq!(OutputMode::from_resolved("pretty"), OutputMode::Pretty);
        assert_eq!(OutputMode::from_resolved("text"), OutputMode::Text);
        assert_eq!(OutputMode::from_resolved("bogus"), OutputMode::Text);
    }

    #[test]
    fn fusion_errors_carry_code_and_hint() {
        let err = anyhow::Error::new(FusionError::MissingKeyField { family: "union" });
        let cli = CliError::from_error(&err);
        assert_eq!(cli.error_code.as_deref(), Some("E2003"));
        assert!(cli.suggestion.is_some());
        assert!(cli.message.contains("union"));
    }

    #[test]
    fn explicit_code_overrides_detection() {
        let err = anyhow::anyhow!("bad toml");
        let cli = CliError::with_code(&err, ErrorCode::ConfigParseError);
        assert_eq!(cli.error_code.as_deref(), Some("E1001"));
        assert!(cli.suggestion.is_some());
    }

    #[test]
    fn other_errors_have_no_code() {
        let err = anyhow::anyhow!("disk on fire");
        let cli = CliError::from_error(&err);
        assert_eq!(cli.message, "disk on fire");
        assert!(cli.error_code.is_none());
        assert!(cli.suggestion.is_none());
    }

    #[test]
    fn pretty_rule_has_fixed_width() {
        let mut buf = Vec::new();
        pretty_section(&mut buf, "heading").expect("write");
        let text = String::from_utf8(buf).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "heading");
        assert_eq!(lines[1].len(), PRETTY_RULE_WIDTH);
    }
}
