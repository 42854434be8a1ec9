use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::io::IsTerminal;
use std::path::Path;

/// How a vote scores the documents it ranks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteScoring {
    /// Softmax-normalize each operand's reported similarity, then average
    /// across operands. Queries with any unscored document fall back to
    /// [`VoteScoring::Rank`].
    #[default]
    Softmax,
    /// Occurrence count times summed reciprocal rank.
    Rank,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub fusion: FusionConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FusionConfig {
    /// Default cutoff applied when a call does not pass `k`.
    #[serde(default)]
    pub k: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub vote_scoring: VoteScoring,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            k: None,
            batch_size: default_batch_size(),
            vote_scoring: VoteScoring::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserConfig {
    #[serde(default)]
    pub output: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub project: ProjectConfig,
    pub user: UserConfig,
    pub resolved_output: String,
}

/// Load `braid.toml` from `project_root`, or defaults when it is absent.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_project_config(project_root: &Path) -> Result<ProjectConfig> {
    let path = project_root.join("braid.toml");
    if !path.exists() {
        return Ok(ProjectConfig::default());
    }
    load_config_file(&path)
}

/// Load an explicit config file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_config_file(path: &Path) -> Result<ProjectConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<ProjectConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Load `braid/config.toml` from the OS config directory.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_user_config() -> Result<UserConfig> {
    let Some(config_dir) = dirs::config_dir() else {
        return Ok(UserConfig::default());
    };

    let path = config_dir.join("braid/config.toml");
    if !path.exists() {
        return Ok(UserConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<UserConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Combine project config (or `explicit`, when given), user config and
/// environment into the settings a command runs with.
///
/// # Errors
///
/// Returns an error when any config file fails to load.
pub fn resolve_config(
    project_root: &Path,
    explicit: Option<&Path>,
    cli_json: bool,
) -> Result<EffectiveConfig> {
    let project = match explicit {
        Some(path) => load_config_file(path)?,
        None => load_project_config(project_root)?,
    };
    let user = load_user_config()?;

    let env_format = env::var("BRAID_FORMAT").ok();
    let file_output = project.output.format.clone().or_else(|| user.output.clone());
    let resolved_output = resolve_output(
        cli_json,
        file_output,
        env_format,
        std::io::stdout().is_terminal(),
    );

    Ok(EffectiveConfig {
        project,
        user,
        resolved_output,
    })
}

fn resolve_output(
    cli_json: bool,
    file_output: Option<String>,
    env_format: Option<String>,
    is_tty: bool,
) -> String {
    fn normalize_output_mode(raw: &str) -> Option<&'static str> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pretty" | "human" => Some("pretty"),
            "text" | "table" => Some("text"),
            "json" => Some("json"),
            _ => None,
        }
    }

    if cli_json {
        return "json".to_string();
    }

    if let Some(mode) = env_format.as_deref().and_then(normalize_output_mode) {
        return mode.to_string();
    }

    if let Some(mode) = file_output.as_deref().and_then(normalize_output_mode) {
        return mode.to_string();
    }

    if is_tty { "pretty" } else { "text" }.to_string()
}

const fn default_batch_size() -> usize {
    64
}
