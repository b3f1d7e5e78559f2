//! Decompose → Execute → Synthesize orchestration with a direct-call
//! fallback.
//!
//! ```text
//! run(prompt, grounding)
//!   ├─ Plan:       planning call (grounding off), parse JSON array of
//!   │              sub-queries; parse failure / empty plan → Fallback
//!   ├─ Execute:    fan-out over ≤ max_parallel sub-queries, each branch
//!   │              guarded by the per-branch timeout; partial failure ok
//!   ├─ Synthesize: merge successful results (grounding off); failure →
//!   │              Fallback
//!   └─ Fallback:   one direct call with the original prompt/grounding;
//!                  failure here is the only error surfaced to the caller
//! ```
//!
//! Decomposition increases grounding coverage and spreads token pressure
//! over several calls; parallel execution keeps latency near one round trip;
//! the fallback guarantees the caller always gets either a real answer or
//! one clear terminal error.
//!
//! Which path produced the result (multi-step synthesis vs. direct fallback)
//! is observable through logs and status updates, not through the return
//! type.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::client::Upstream;
use crate::config::EngineConfig;
use crate::error::OrchestratorError;
use crate::extract::summarize;
use crate::fanout::{self, SubQueryOutcome};
use crate::prompts;

/// Receiver for coarse, user-facing progress strings.
///
/// The default forwards to the tracing stream; UI adapters install their
/// own sink.
pub trait StatusSink: Send + Sync {
    fn update(&self, message: &str, busy: bool);
}

/// Default sink: status lines become tracing events.
pub struct TracingStatus;

impl StatusSink for TracingStatus {
    fn update(&self, message: &str, busy: bool) {
        info!(busy, "{message}");
    }
}

/// Why the multi-step pipeline was abandoned in favor of the fallback.
/// Internal only; never surfaced to callers.
#[derive(Debug)]
enum StageFailure {
    Plan(String),
    Synthesis(crate::error::UpstreamError),
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plan(reason) => write!(f, "planning failed: {reason}"),
            Self::Synthesis(err) => write!(f, "synthesis failed: {err}"),
        }
    }
}

/// One logical "answer this" request, decomposed and recombined internally.
pub struct Orchestrator {
    upstream: Arc<dyn Upstream>,
    config: EngineConfig,
    guidelines: String,
    status: Arc<dyn StatusSink>,
}

impl Orchestrator {
    pub fn new(upstream: Arc<dyn Upstream>, config: EngineConfig) -> Self {
        Self {
            upstream,
            config,
            guidelines: String::new(),
            status: Arc::new(TracingStatus),
        }
    }

    /// Attach the tone/focus guideline text the caller baked into `prompt`,
    /// so the synthesis stage can restate it.
    pub fn with_guidelines(mut self, guidelines: impl Into<String>) -> Self {
        self.guidelines = guidelines.into();
        self
    }

    pub fn with_status(mut self, status: Arc<dyn StatusSink>) -> Self {
        self.status = status;
        self
    }

    /// Answer `prompt`, decomposing internally and falling back to a single
    /// direct call when planning or synthesis fails.
    ///
    /// # Errors
    ///
    /// Only [`OrchestratorError::TotalFailure`], when the fallback call
    /// itself fails. Plan, branch, and synthesis failures are recovered
    /// internally.
    pub async fn run(
        &self,
        prompt: &str,
        use_grounding: bool,
    ) -> Result<String, OrchestratorError> {
        debug!(
            prompt = %summarize(prompt, 50),
            use_grounding,
            "orchestrated call starting"
        );

        match self.decompose_and_synthesize(prompt, use_grounding).await {
            Ok(text) => {
                info!(path = "synthesized", len = text.len(), "orchestrated call complete");
                self.status.update("Task complete.", false);
                Ok(text)
            }
            Err(reason) => {
                warn!(%reason, "multi-step strategy failed, falling back to direct call");
                self.status.update("Falling back to direct request...", true);
                match self.upstream.call(prompt, use_grounding).await {
                    Ok(text) => {
                        info!(path = "fallback", len = text.len(), "direct call complete");
                        self.status.update("Direct request complete.", false);
                        Ok(text)
                    }
                    Err(cause) => {
                        self.status.update("Fallback direct call failed.", false);
                        Err(OrchestratorError::TotalFailure { cause })
                    }
                }
            }
        }
    }

    async fn decompose_and_synthesize(
        &self,
        prompt: &str,
        use_grounding: bool,
    ) -> Result<String, StageFailure> {
        let plan = self.plan(prompt).await?;
        let outcomes = self.execute(prompt, &plan, use_grounding).await;
        self.synthesize(prompt, &outcomes)
            .await
            .map_err(StageFailure::Synthesis)
    }

    // ── Stage 1: Plan ─────────────────────────────────────────────────────

    async fn plan(&self, prompt: &str) -> Result<Vec<String>, StageFailure> {
        self.status.update("Planning research strategy...", true);

        let planning = prompts::planning_prompt(prompt, self.config.max_parallel, &self.guidelines);
        let raw = self
            .upstream
            .call(&planning, false)
            .await
            .map_err(|e| StageFailure::Plan(format!("planning call failed: {e}")))?;

        let plan = parse_plan(&raw, self.config.max_parallel).map_err(StageFailure::Plan)?;
        debug!(count = plan.len(), "plan parsed");
        Ok(plan)
    }

    // ── Stage 2: Execute (fan-out) ────────────────────────────────────────

    async fn execute(
        &self,
        original: &str,
        plan: &[String],
        use_grounding: bool,
    ) -> Vec<SubQueryOutcome> {
        self.status.update(
            &format!("Executing {} parallel research tasks...", plan.len()),
            true,
        );

        let summary = summarize(original, 30);
        let upstream = self.upstream.clone();
        let outcomes = fanout::execute_all(plan, self.config.branch_timeout, move |query| {
            let prompt = prompts::sub_query_prompt(&query, &summary);
            let upstream = upstream.clone();
            async move { upstream.call(&prompt, use_grounding).await }
        })
        .await;

        let successes = outcomes.iter().filter(|o| o.is_success()).count();
        info!(
            total = outcomes.len(),
            successes, "parallel execution settled"
        );
        for outcome in outcomes.iter().filter(|o| !o.is_success()) {
            warn!(query = %outcome.query, error = %outcome.result.as_ref().unwrap_err(), "branch failed");
        }
        outcomes
    }

    // ── Stage 3: Synthesize ───────────────────────────────────────────────

    async fn synthesize(
        &self,
        original: &str,
        outcomes: &[SubQueryOutcome],
    ) -> Result<String, crate::error::UpstreamError> {
        self.status.update("Synthesizing results...", true);

        if outcomes.iter().all(|o| !o.is_success()) {
            warn!("no branch produced a result; synthesizing from general knowledge");
        }

        let prompt = prompts::synthesis_prompt(original, outcomes, &self.guidelines);
        self.upstream.call(&prompt, false).await
    }
}

// ── Plan parsing ──────────────────────────────────────────────────────────────

/// Parse the planning response into at most `max` sub-queries.
///
/// The response must be a JSON array of strings, possibly wrapped in a
/// markdown code fence. Anything else (malformed JSON, non-string entries,
/// an empty array) is a planning failure.
fn parse_plan(raw: &str, max: usize) -> Result<Vec<String>, String> {
    let json = extract_json_array(raw);
    let entries: Vec<String> = serde_json::from_str(&json)
        .map_err(|e| format!("planning response is not a JSON array of strings: {e}"))?;

    if entries.is_empty() {
        return Err("planning resulted in zero sub-queries".to_string());
    }

    Ok(entries.into_iter().take(max).collect())
}

/// Slice the planning response down to its JSON array: strip a surrounding
/// code fence when present, then take the outermost `[` … `]` span.
fn extract_json_array(raw: &str) -> String {
    let stripped = raw
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    match (stripped.find('['), stripped.rfind(']')) {
        (Some(start), Some(end)) if start < end => stripped[start..=end].to_string(),
        _ => stripped.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::error::UpstreamError;

    // ── Scripted upstream ─────────────────────────────────────────────────
    //
    // Routes each call by the prompt's stage marker, recording every call so
    // tests can assert fan-out width and grounding flags.

    #[derive(Debug, Clone)]
    struct Call {
        prompt: String,
        grounding: bool,
    }

    struct ScriptedUpstream {
        plan: Result<String, UpstreamError>,
        branch: Result<String, UpstreamError>,
        synthesis: Result<String, UpstreamError>,
        direct: Result<String, UpstreamError>,
        calls: Mutex<Vec<Call>>,
    }

    impl ScriptedUpstream {
        fn new() -> Self {
            Self {
                plan: Ok(r#"["What is X?", "Why does X matter?", "Who studies X?"]"#.into()),
                branch: Ok("branch answer".into()),
                synthesis: Ok("synthesized answer".into()),
                direct: Ok("direct answer".into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn branch_calls(&self) -> Vec<Call> {
            self.calls()
                .into_iter()
                .filter(|c| c.prompt.starts_with("Answer the following specific query"))
                .collect()
        }

        fn synthesis_calls(&self) -> Vec<Call> {
            self.calls()
                .into_iter()
                .filter(|c| c.prompt.starts_with("You are tasked with synthesizing"))
                .collect()
        }
    }

    #[async_trait]
    impl Upstream for ScriptedUpstream {
        async fn call(&self, prompt: &str, grounding: bool) -> Result<String, UpstreamError> {
            self.calls.lock().unwrap().push(Call {
                prompt: prompt.to_string(),
                grounding,
            });
            if prompt.starts_with("Based on the user's request") {
                self.plan.clone()
            } else if prompt.starts_with("Answer the following specific query") {
                self.branch.clone()
            } else if prompt.starts_with("You are tasked with synthesizing") {
                self.synthesis.clone()
            } else {
                self.direct.clone()
            }
        }
    }

    fn orchestrator(upstream: Arc<ScriptedUpstream>) -> Orchestrator {
        let config = EngineConfig {
            branch_timeout: Duration::from_secs(30),
            max_parallel: 3,
            ..EngineConfig::default()
        };
        Orchestrator::new(upstream, config).with_guidelines("test guidelines")
    }

    #[tokio::test]
    async fn full_pipeline_returns_the_synthesized_text() {
        let upstream = Arc::new(ScriptedUpstream::new());
        let result = orchestrator(upstream.clone())
            .run("Explain X", true)
            .await
            .unwrap();

        assert_eq!(result, "synthesized answer");
        // Exactly three branches, one per planned sub-query.
        let branches = upstream.branch_calls();
        assert_eq!(branches.len(), 3);
        // Branches inherit the caller's grounding flag; planning and
        // synthesis run ungrounded.
        assert!(branches.iter().all(|c| c.grounding));
        let all = upstream.calls();
        assert!(!all[0].grounding, "planning call must be ungrounded");
        assert!(!upstream.synthesis_calls()[0].grounding);
    }

    #[tokio::test]
    async fn empty_plan_falls_back_to_direct_call() {
        let upstream = Arc::new(ScriptedUpstream {
            plan: Ok("[]".into()),
            ..ScriptedUpstream::new()
        });
        let result = orchestrator(upstream.clone())
            .run("Explain X", true)
            .await
            .unwrap();

        assert_eq!(result, "direct answer");
        assert!(upstream.branch_calls().is_empty());
        assert!(upstream.synthesis_calls().is_empty());
        // The fallback call carries the unmodified original prompt and flag.
        let last = upstream.calls().pop().unwrap();
        assert_eq!(last.prompt, "Explain X");
        assert!(last.grounding);
    }

    #[tokio::test]
    async fn malformed_plan_falls_back_without_executing() {
        let upstream = Arc::new(ScriptedUpstream {
            plan: Ok("here are three ideas: one, two, three".into()),
            ..ScriptedUpstream::new()
        });
        let result = orchestrator(upstream.clone())
            .run("Explain X", false)
            .await
            .unwrap();

        assert_eq!(result, "direct answer");
        assert!(upstream.branch_calls().is_empty());
    }

    #[tokio::test]
    async fn non_string_plan_entries_fall_back() {
        let upstream = Arc::new(ScriptedUpstream {
            plan: Ok("[1, 2, 3]".into()),
            ..ScriptedUpstream::new()
        });
        let result = orchestrator(upstream.clone())
            .run("Explain X", false)
            .await
            .unwrap();
        assert_eq!(result, "direct answer");
    }

    #[tokio::test]
    async fn planning_call_failure_falls_back() {
        let upstream = Arc::new(ScriptedUpstream {
            plan: Err(UpstreamError::Http {
                status: 500,
                message: "planner down".into(),
            }),
            ..ScriptedUpstream::new()
        });
        let result = orchestrator(upstream).run("Explain X", false).await.unwrap();
        assert_eq!(result, "direct answer");
    }

    #[tokio::test]
    async fn oversized_plan_is_truncated_to_the_fan_out_width() {
        let upstream = Arc::new(ScriptedUpstream {
            plan: Ok(r#"["a", "b", "c", "d", "e"]"#.into()),
            ..ScriptedUpstream::new()
        });
        orchestrator(upstream.clone())
            .run("Explain X", false)
            .await
            .unwrap();
        assert_eq!(upstream.branch_calls().len(), 3);
    }

    #[tokio::test]
    async fn all_branches_failing_still_synthesizes_with_the_marker() {
        let upstream = Arc::new(ScriptedUpstream {
            branch: Err(UpstreamError::Http {
                status: 503,
                message: "overloaded".into(),
            }),
            ..ScriptedUpstream::new()
        });
        let result = orchestrator(upstream.clone())
            .run("Explain X", true)
            .await
            .unwrap();

        assert_eq!(result, "synthesized answer");
        let synthesis = upstream.synthesis_calls();
        assert_eq!(synthesis.len(), 1);
        assert!(synthesis[0]
            .prompt
            .contains("No results gathered from parallel execution."));
    }

    #[tokio::test]
    async fn synthesis_failure_falls_back_to_the_direct_answer() {
        // Fallback determinism: the result equals what a direct single call
        // with the original prompt returns.
        let upstream = Arc::new(ScriptedUpstream {
            synthesis: Err(UpstreamError::MalformedResponse),
            ..ScriptedUpstream::new()
        });
        let result = orchestrator(upstream.clone())
            .run("Explain X", true)
            .await
            .unwrap();

        assert_eq!(result, "direct answer");
        let last = upstream.calls().pop().unwrap();
        assert_eq!(last.prompt, "Explain X");
    }

    #[tokio::test]
    async fn total_failure_surfaces_only_when_the_fallback_also_fails() {
        let upstream = Arc::new(ScriptedUpstream {
            plan: Err(UpstreamError::MalformedResponse),
            direct: Err(UpstreamError::Http {
                status: 429,
                message: "quota".into(),
            }),
            ..ScriptedUpstream::new()
        });
        let err = orchestrator(upstream)
            .run("Explain X", false)
            .await
            .unwrap_err();

        match err {
            OrchestratorError::TotalFailure { cause } => match cause {
                UpstreamError::Http { status, .. } => assert_eq!(status, 429),
                other => panic!("expected the fallback's cause, got {other:?}"),
            },
        }
    }

    #[tokio::test]
    async fn identical_inputs_produce_identical_output() {
        let upstream = Arc::new(ScriptedUpstream::new());
        let orch = orchestrator(upstream);
        let first = orch.run("Explain X", true).await.unwrap();
        let second = orch.run("Explain X", true).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn sub_query_prompts_embed_a_short_summary_of_the_original() {
        let upstream = Arc::new(ScriptedUpstream::new());
        let long_prompt = "Explain the entire history of computing in detail please";
        orchestrator(upstream.clone())
            .run(long_prompt, false)
            .await
            .unwrap();

        let branches = upstream.branch_calls();
        // 30-char summary of the original request, ellipsized.
        assert!(branches[0]
            .prompt
            .contains("Explain the entire history of ..."));
    }

    // ── parse_plan ────────────────────────────────────────────────────────

    #[test]
    fn parse_plan_accepts_a_bare_array() {
        let plan = parse_plan(r#"["a", "b"]"#, 3).unwrap();
        assert_eq!(plan, ["a", "b"]);
    }

    #[test]
    fn parse_plan_strips_code_fences() {
        let plan = parse_plan("```json\n[\"a\", \"b\", \"c\"]\n```", 3).unwrap();
        assert_eq!(plan.len(), 3);
    }

    #[test]
    fn parse_plan_tolerates_surrounding_prose() {
        let plan = parse_plan("Here is the plan: [\"a\", \"b\"] (good luck)", 3).unwrap();
        assert_eq!(plan, ["a", "b"]);
    }

    #[test]
    fn parse_plan_rejects_empty_and_malformed_input() {
        assert!(parse_plan("[]", 3).is_err());
        assert!(parse_plan("not json", 3).is_err());
        assert!(parse_plan(r#"{"a": 1}"#, 3).is_err());
        assert!(parse_plan("[1, 2]", 3).is_err());
    }

    #[test]
    fn parse_plan_truncates_to_max() {
        let plan = parse_plan(r#"["a", "b", "c", "d"]"#, 3).unwrap();
        assert_eq!(plan, ["a", "b", "c"]);
    }
}
