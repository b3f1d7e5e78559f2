//! Runtime configuration: upstream endpoint parameters and per-session
//! research settings.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default endpoint base for the generative API.
pub const DEFAULT_ENDPOINT_BASE: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/";

/// Default model identifier.
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Default per-branch deadline for fan-out calls.
pub const DEFAULT_BRANCH_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Default fan-out width: a plan is truncated to this many sub-queries.
pub const DEFAULT_MAX_PARALLEL: usize = 3;

/// Engine configuration: all externally supplied, nothing persisted.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Endpoint base URL; the model name and action are appended.
    pub endpoint_base: String,
    /// Model identifier (e.g. `gemini-2.0-flash`).
    pub model: String,
    /// API key passed as a query parameter.
    pub api_key: String,
    /// Deadline applied to each fan-out branch.
    pub branch_timeout: Duration,
    /// Maximum number of concurrent sub-queries per orchestrated call.
    pub max_parallel: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            endpoint_base: std::env::var("RESEARCH_ENDPOINT_BASE")
                .unwrap_or_else(|_| DEFAULT_ENDPOINT_BASE.into()),
            model: std::env::var("RESEARCH_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.into()),
            api_key: std::env::var("RESEARCH_API_KEY").unwrap_or_default(),
            branch_timeout: DEFAULT_BRANCH_TIMEOUT,
            max_parallel: DEFAULT_MAX_PARALLEL,
        }
    }
}

impl EngineConfig {
    /// Check that the configuration can reach an upstream at all.
    pub fn validate(&self) -> Result<(), String> {
        if self.api_key.is_empty() {
            return Err("API key not set (RESEARCH_API_KEY)".into());
        }
        if self.model.is_empty() {
            return Err("model identifier is empty".into());
        }
        if self.max_parallel == 0 {
            return Err("max_parallel must be at least 1".into());
        }
        Ok(())
    }
}

/// Tone preset applied to every prompt a session builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    NeutralObjective,
    FormalAcademic,
    CasualConversational,
    PersuasiveArgumentative,
    SkepticalQuestioning,
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NeutralObjective => write!(f, "Neutral/Objective"),
            Self::FormalAcademic => write!(f, "Formal/Academic"),
            Self::CasualConversational => write!(f, "Casual/Conversational"),
            Self::PersuasiveArgumentative => write!(f, "Persuasive/Argumentative"),
            Self::SkepticalQuestioning => write!(f, "Skeptical/Questioning"),
        }
    }
}

impl Default for Tone {
    fn default() -> Self {
        Self::NeutralObjective
    }
}

/// Per-session research settings, immutable for the duration of a call and
/// rendered into the guideline block embedded in every prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchSettings {
    pub tone: Tone,
    /// Whether significant opposing viewpoints should be presented and
    /// analyzed, or only briefly acknowledged.
    pub opposing_views: bool,
    /// Free-text user focus woven into the guidelines when present.
    pub custom_focus: Option<String>,
}

impl Default for ResearchSettings {
    fn default() -> Self {
        Self {
            tone: Tone::default(),
            opposing_views: true,
            custom_focus: None,
        }
    }
}
