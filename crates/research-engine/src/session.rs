//! Research session controller: sequences the scan → dive → synthesize flow
//! and owns all per-session state.
//!
//! One session covers one research topic. State is in-memory only and lives
//! for the session: accumulated history entries feed forward as context into
//! later calls, and a process log records each stage for the user-facing
//! "how we got here" summary. No ambient globals; callers hold the session
//! object.
//!
//! Calls into the session are serialized by construction (one scan, dive, or
//! synthesis in flight at a time), so history is only ever mutated between
//! orchestration calls. A failed operation surfaces a scoped [`EngineError`]
//! and leaves previously accumulated history intact.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::client::Upstream;
use crate::config::{EngineConfig, ResearchSettings};
use crate::error::EngineError;
use crate::extract;
use crate::orchestrator::{Orchestrator, StatusSink, TracingStatus};
use crate::prompts;

/// History title of the seeding entry produced by the initial scan.
pub const INITIAL_SCAN_TITLE: &str = "Initial Scan & Plan";

/// History title of the final synthesized report.
pub const FINAL_REPORT_TITLE: &str = "Final Report";

/// One accumulated research result. Append-only; never edited once added.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub title: String,
    pub content: String,
    pub recorded_at: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            recorded_at: Utc::now(),
        }
    }
}

/// One audit-trail record of a research stage.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessLogEntry {
    pub step: String,
    pub reasoning: String,
    pub details: String,
    pub at: DateTime<Utc>,
}

/// An opaque context document supplied by the caller for the initial scan.
#[derive(Debug, Clone)]
pub struct ContextFile {
    pub name: String,
    pub content: String,
}

/// Result of the initial scan: the overview text plus the sub-topics
/// extracted from it.
#[derive(Debug)]
pub struct ScanOutcome {
    pub overview: String,
    pub suggestions: Vec<String>,
}

/// Result of one deep dive: the dive text plus extracted refinement topics
/// for further sub-dives.
#[derive(Debug)]
pub struct DiveOutcome {
    pub content: String,
    pub refinements: Vec<String>,
}

/// Per-topic research session.
pub struct ResearchSession {
    topic: String,
    settings: ResearchSettings,
    context_files: Vec<ContextFile>,
    history: Vec<HistoryEntry>,
    process_log: Vec<ProcessLogEntry>,
    upstream: Arc<dyn Upstream>,
    config: EngineConfig,
    status: Arc<dyn StatusSink>,
}

impl ResearchSession {
    pub fn new(upstream: Arc<dyn Upstream>, config: EngineConfig) -> Self {
        Self {
            topic: String::new(),
            settings: ResearchSettings::default(),
            context_files: Vec::new(),
            history: Vec::new(),
            process_log: Vec::new(),
            upstream,
            config,
            status: Arc::new(TracingStatus),
        }
    }

    pub fn with_settings(mut self, settings: ResearchSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_context_files(mut self, files: Vec<ContextFile>) -> Self {
        self.context_files = files;
        self
    }

    pub fn with_status(mut self, status: Arc<dyn StatusSink>) -> Self {
        self.status = status;
        self
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn settings(&self) -> &ResearchSettings {
        &self.settings
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn process_log(&self) -> &[ProcessLogEntry] {
        &self.process_log
    }

    /// Perform the initial grounded scan for `topic`, seeding history and
    /// returning the overview plus extracted dive suggestions.
    ///
    /// Starting a new scan clears any prior research state for the session
    /// (settings and context files are kept).
    pub async fn scan_topic(&mut self, topic: &str) -> Result<ScanOutcome, EngineError> {
        self.clear_research_state();
        self.topic = topic.trim().to_string();

        self.status.update("Performing initial grounded scan...", true);
        self.log_step(
            "Initiation",
            format!("Starting research for topic: \"{}\"", self.topic),
            "User input topic.",
        );

        let guidelines = prompts::tone_focus_guidelines(&self.settings);
        let prompt = prompts::initial_scan_prompt(&self.topic, &self.context_files, &guidelines);
        let overview = self
            .orchestrator(&guidelines)
            .run(&prompt, true)
            .await
            .map_err(|e| EngineError::new("initial scan", e))?;

        self.history
            .push(HistoryEntry::new(INITIAL_SCAN_TITLE, overview.clone()));
        self.log_step(
            "Initial Scan",
            "Performed grounded search for overview and suggestions.",
            extract::summarize(&overview, 150),
        );

        let suggestions = extract::extract_suggestions(&overview);
        if suggestions.is_empty() {
            warn!("no sub-topic suggestions extracted from the initial scan");
            self.log_step(
                "Initial Scan Warning",
                "No specific sub-topics extracted.",
                "Custom dives remain available.",
            );
        }

        self.status
            .update("Initial scan complete. Review overview and suggestions.", false);
        Ok(ScanOutcome {
            overview,
            suggestions,
        })
    }

    /// Explore one sub-topic in depth. For a sub-dive, `parent` names the
    /// dive whose content should be threaded in as immediate context.
    pub async fn deep_dive(
        &mut self,
        topic: &str,
        parent: Option<&str>,
    ) -> Result<DiveOutcome, EngineError> {
        let is_sub = parent.is_some();
        let level = if is_sub { "sub-topic" } else { "topic" };
        self.status
            .update(&format!("Exploring {level}: \"{topic}\"..."), true);

        let parent_content = parent.and_then(|p| self.find_parent_content(p));
        if is_sub && parent_content.is_none() {
            warn!(parent = parent.unwrap_or_default(), "parent dive content not found in history");
        }

        let parent_info = parent
            .map(|p| format!(" (refining \"{p}\")"))
            .unwrap_or_default();
        self.log_step(
            "Deep Dive Start",
            format!("Exploring {level}{parent_info}."),
            format!("Topic: \"{topic}\""),
        );

        let guidelines = prompts::tone_focus_guidelines(&self.settings);
        let initial_scan = self
            .history
            .iter()
            .find(|entry| entry.title == INITIAL_SCAN_TITLE)
            .map(|entry| entry.content.clone());
        let prompt = prompts::deep_dive_prompt(
            &self.topic,
            topic,
            initial_scan.as_deref(),
            parent_content.as_deref(),
            &guidelines,
        );

        let content = self
            .orchestrator(&guidelines)
            .run(&prompt, true)
            .await
            .map_err(|e| EngineError::new(format!("deep dive \"{topic}\""), e))?;

        let title = if is_sub {
            format!("Sub-Dive{parent_info}: {topic}")
        } else {
            format!("Deep Dive: {topic}")
        };
        self.history.push(HistoryEntry::new(title, content.clone()));
        self.log_step(
            "Deep Dive Complete",
            "Completed deep dive.",
            format!("Topic: \"{topic}\", Summary: {}", extract::summarize(&content, 100)),
        );

        let refinements = extract::extract_refinements(&content);
        self.status
            .update(&format!("Completed exploration for: \"{topic}\"."), false);
        Ok(DiveOutcome {
            content,
            refinements,
        })
    }

    /// Synthesize every accumulated history entry into the final report.
    pub async fn synthesize_final(&mut self) -> Result<String, EngineError> {
        self.status.update("Synthesizing final report...", true);
        self.log_step(
            "Synthesis Start",
            "Final report synthesis requested.",
            "Based on initial scan and accumulated deep dives.",
        );

        let guidelines = prompts::tone_focus_guidelines(&self.settings);
        let prompt = prompts::final_report_prompt(&self.topic, &self.history, &guidelines);
        let raw = self
            .orchestrator(&guidelines)
            .run(&prompt, false)
            .await
            .map_err(|e| EngineError::new("final synthesis", e))?;

        // Models occasionally wrap the whole report in a code fence.
        let report = extract::strip_code_fence(&raw);

        self.history
            .push(HistoryEntry::new(FINAL_REPORT_TITLE, report.clone()));
        self.log_step(
            "Synthesis Complete",
            "Generated final comprehensive report.",
            format!("Report length: {} chars", report.len()),
        );
        self.status.update("Final report generated.", false);
        Ok(report)
    }

    /// Clear all accumulated research state atomically. With `clear_inputs`,
    /// also drop the topic and restore default settings.
    pub fn reset(&mut self, clear_inputs: bool) {
        self.clear_research_state();
        if clear_inputs {
            self.topic.clear();
            self.settings = ResearchSettings::default();
        }
        self.status.update("Idle", false);
        info!(clear_inputs, "research state reset");
    }

    fn clear_research_state(&mut self) {
        self.history.clear();
        self.process_log.clear();
    }

    /// One orchestrator per call, with the current guideline text baked in.
    fn orchestrator(&self, guidelines: &str) -> Orchestrator {
        Orchestrator::new(self.upstream.clone(), self.config.clone())
            .with_guidelines(guidelines)
            .with_status(self.status.clone())
    }

    /// Most recent dive entry whose title mentions `parent`, skipping the
    /// initial scan and any final report.
    fn find_parent_content(&self, parent: &str) -> Option<String> {
        self.history
            .iter()
            .rev()
            .find(|entry| {
                entry.title.contains(parent)
                    && entry.title != INITIAL_SCAN_TITLE
                    && entry.title != FINAL_REPORT_TITLE
            })
            .map(|entry| entry.content.clone())
    }

    fn log_step(
        &mut self,
        step: impl Into<String>,
        reasoning: impl Into<String>,
        details: impl Into<String>,
    ) {
        let entry = ProcessLogEntry {
            step: step.into(),
            reasoning: reasoning.into(),
            details: details.into(),
            at: Utc::now(),
        };
        info!(step = %entry.step, "{}", entry.reasoning);
        self.process_log.push(entry);
    }
}
