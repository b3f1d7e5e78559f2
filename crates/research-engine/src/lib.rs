//! Plan → fan-out → synthesize orchestration engine for grounded research
//! reports.
//!
//! One logical request is decomposed into a bounded set of sub-queries,
//! executed concurrently against the generative upstream with per-branch
//! timeouts, and recombined into a single answer; a direct call serves as
//! the last-resort fallback. A session controller sequences the
//! scan → deep-dive → final-report research flow on top.
//!
//! ## Modules
//!
//! | Module         | Purpose                                              |
//! |----------------|------------------------------------------------------|
//! | `client`       | Upstream trait + `generateContent` HTTP client       |
//! | `timeout`      | Deadline guard for upstream calls                    |
//! | `fanout`       | Bounded parallel fan-out over sub-queries            |
//! | `orchestrator` | Decompose → Execute → Synthesize with fallback       |
//! | `session`      | Research session controller (history, process log)   |
//! | `prompts`      | Prompt builders for every stage                      |
//! | `extract`      | Suggestion/refinement text-extraction contract       |
//! | `config`       | Engine configuration and research settings           |
//! | `error`        | Error taxonomy                                       |

pub mod client;
pub mod config;
pub mod error;
pub mod extract;
pub mod fanout;
pub mod orchestrator;
pub mod prompts;
pub mod session;
pub mod timeout;

pub use client::{GenerativeClient, Upstream};
pub use config::{EngineConfig, ResearchSettings, Tone};
pub use error::{BranchError, EngineError, OrchestratorError, UpstreamError};
pub use fanout::SubQueryOutcome;
pub use orchestrator::{Orchestrator, StatusSink, TracingStatus};
pub use session::{
    ContextFile, DiveOutcome, HistoryEntry, ProcessLogEntry, ResearchSession, ScanOutcome,
};
pub use timeout::{with_timeout, TimeoutError};
