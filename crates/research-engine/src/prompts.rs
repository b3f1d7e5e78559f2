//! Prompt builders for every stage of the research flow.
//!
//! The wording here is part of the system's behavior: the planning prompt
//! demands a bare JSON array, the scan and dive prompts demand the exact
//! header lines that [`crate::extract`] looks for, and every prompt carries
//! the session's tone/focus guideline block.

use crate::config::ResearchSettings;
use crate::extract::{REFINEMENTS_HEADER, SUGGESTIONS_HEADER};
use crate::fanout::SubQueryOutcome;
use crate::session::{ContextFile, HistoryEntry};

/// Render the tone/focus guideline block embedded in every prompt.
pub fn tone_focus_guidelines(settings: &ResearchSettings) -> String {
    let mut instructions = String::from("--- Tone and Focus Guidelines ---");
    instructions.push_str(&format!(
        "\nAdopt a primarily \"{}\" tone throughout your response.",
        settings.tone
    ));

    if settings.opposing_views {
        instructions.push_str(
            "\nIt is important to identify, present, and objectively analyze significant \
             opposing viewpoints or counter-arguments related to the topic where applicable.",
        );
    } else {
        instructions.push_str(
            "\nFocus mainly on the primary findings and evidence for the main perspective. \
             Briefly mention alternative views only if essential for context, but do not \
             elaborate extensively on them.",
        );
    }

    if let Some(focus) = settings
        .custom_focus
        .as_deref()
        .map(str::trim)
        .filter(|f| !f.is_empty())
    {
        // Backticks would close the quoting in the prompt; soften them.
        let safe_focus = focus.replace('`', "'");
        instructions.push_str(&format!(
            "\nPay special attention to aspects related to the following user instructions: \
             \"{safe_focus}\". Integrate this focus naturally where relevant."
        ));
    }

    instructions.push_str("\n--- End Guidelines ---");
    instructions
}

/// Planning prompt: decompose a request into at most `max_queries`
/// sub-queries, answered as a bare JSON array of strings.
pub fn planning_prompt(request: &str, max_queries: usize, guidelines: &str) -> String {
    format!(
        "Based on the user's request below, break it down into {max_queries} specific, \
         concise sub-queries that, when answered individually, will provide the necessary \
         information to comprehensively address the original request. Balance critical \
         areas (may require some overlap) and auxiliary areas for breadth. Consider the \
         user's tone/focus guidelines provided for context.\n\
         \n\
         User's Request:\n\
         \"{request}\"\n\
         \n\
         User's Tone/Focus Guidelines:\n\
         {guidelines}\n\
         \n\
         Output ONLY a valid JSON array of strings, where each string is a sub-query. Example:\n\
         [\"Sub-query 1 about aspect X\", \"Sub-query 2 comparing Y and Z\", \
         \"Sub-query 3 asking for details on A\"]"
    )
}

/// Prompt for one fan-out branch: the sub-query plus a short summary of the
/// original request for context.
pub fn sub_query_prompt(query: &str, original_summary: &str) -> String {
    format!(
        "Answer the following specific query comprehensively: \"{query}\"\n\
         \n\
         (Context: This is part of a larger request about \"{original_summary}\". Provide \
         detailed information relevant *only* to this specific query. Include citations \
         if possible.)"
    )
}

/// Synthesis prompt: merge the successful sub-query results into one answer
/// to the original request, tolerating insufficient results.
pub fn synthesis_prompt(request: &str, outcomes: &[SubQueryOutcome], guidelines: &str) -> String {
    let context = synthesis_context(outcomes);
    format!(
        "You are tasked with synthesizing information to answer a user's original request. \
         You previously planned sub-queries, and the results from executing those queries \
         are provided below.\n\
         \n\
         User's Original Request:\n\
         \"{request}\"\n\
         \n\
         Results from Parallel Sub-Query Execution:\n\
         {context}\n\
         \n\
         Your Task:\n\
         Synthesize the provided results into a single, coherent, comprehensive response \
         that directly addresses the **User's Original Request**.\n\
         - Integrate information smoothly.\n\
         - Resolve any minor contradictions logically, noting significant discrepancies if necessary.\n\
         - Ensure the final output strictly adheres to the user's original tone and focus \
         guidelines provided below.\n\
         - Format the final output in clean Markdown.\n\
         - If the provided results are insufficient or empty, state that you couldn't gather \
         enough specific information but attempt to answer the original request based on your \
         general knowledge, while still adhering to the tone/focus guidelines.\n\
         \n\
         User's Tone/Focus Guidelines:\n\
         {guidelines}\n\
         \n\
         Generate ONLY the final synthesized Markdown response for the original request."
    )
}

/// Labeled sections for the successful outcomes, or the explicit no-results
/// marker when every branch failed.
pub fn synthesis_context(outcomes: &[SubQueryOutcome]) -> String {
    let sections: Vec<String> = outcomes
        .iter()
        .filter_map(|outcome| outcome.response().map(|response| (outcome, response)))
        .enumerate()
        .map(|(i, (outcome, response))| {
            format!(
                "--- Result for Sub-Query {n}: \"{query}\" ---\n{response}\n--- End Result {n} ---",
                n = i + 1,
                query = outcome.query,
            )
        })
        .collect();

    if sections.is_empty() {
        "No results gathered from parallel execution.".to_string()
    } else {
        sections.join("\n\n")
    }
}

/// Initial grounded scan: overview, debates, suggested sub-topics under the
/// exact suggestions header, citations inline, optional context files.
pub fn initial_scan_prompt(
    topic: &str,
    context_files: &[ContextFile],
    guidelines: &str,
) -> String {
    let mut context_block = String::new();
    if !context_files.is_empty() {
        context_block.push_str("\nConsider the following context provided in these files:\n");
        for file in context_files {
            context_block.push_str(&format!(
                "--- File: {name} ---\n{content}\n--- End File: {name} ---\n\n",
                name = file.name,
                content = file.content,
            ));
        }
    }

    format!(
        "Act as a senior researcher initiating a deep dive into the topic: \"{topic}\".\n\
         \n\
         {guidelines}\n\
         \n\
         Your first task is to perform an initial, **up-to-date, grounded analysis** using \
         Google Search, adhering to the tone and focus guidelines above. Provide:\n\
         1.  A comprehensive overview of the current state of the topic.\n\
         2.  Mention major ongoing debates or controversies (considering the guideline on \
         opposing views).\n\
         3.  Identify and list 3-5 specific, actionable sub-topics or key questions for \
         deeper investigation (formatted as a numbered list starting after \
         \"{SUGGESTIONS_HEADER}\").\n\
         4.  Provide verifiable URL links as citations **within the overview text** using \
         Markdown format `[source text](URL)`.\n\
         {context_block}\n\
         Ensure the entire output is in Markdown format."
    )
}

/// Deep-dive prompt: grounded exploration of one sub-topic, with the
/// initial-scan content (and, for sub-dives, the parent dive's content) as
/// reference context, plus the trailing refinement list.
pub fn deep_dive_prompt(
    main_topic: &str,
    sub_topic: &str,
    initial_scan: Option<&str>,
    parent_content: Option<&str>,
    guidelines: &str,
) -> String {
    let mut previous_context = String::new();
    if let Some(scan) = initial_scan {
        previous_context.push_str(&format!("--- Initial Scan Context ---\n{scan}\n\n"));
    }
    if let Some(parent) = parent_content {
        previous_context.push_str(&format!(
            "--- Context from Immediate Parent Dive ---\n{parent}\n\n"
        ));
    }

    let dive_type = if parent_content.is_some() {
        "specific sub-question/topic derived from previous exploration"
    } else {
        "sub-topic or question identified in the initial scan"
    };

    format!(
        "Continuing the research on the main topic: \"{main_topic}\".\n\
         \n\
         Focus **specifically** on this {dive_type}: \"{sub_topic}\"\n\
         \n\
         {guidelines}\n\
         \n\
         Your primary goal is to:\n\
         1.  Perform a **detailed, grounded exploration** of \"{sub_topic}\" using Google \
         Search, using the context provided below and adhering to the tone and focus \
         guidelines above.\n\
         2.  Provide in-depth information, evidence, examples, data points, and nuances \
         related *only* to \"{sub_topic}\".\n\
         3.  Discuss different perspectives or arguments concerning it, if relevant \
         (considering the guideline on opposing views).\n\
         4.  Provide verifiable URL citations as Markdown links `[source text](URL)` within \
         your response for significant claims.\n\
         \n\
         **Secondary Goal:** Based *only* on the information you generate *in this response* \
         about \"{sub_topic}\", identify and list 2-3 potential **further refinement \
         questions or more granular sub-topics**.\n\
         - Format this list clearly at the end of your main response.\n\
         - Start the list section *EXACTLY* with the line: \"{REFINEMENTS_HEADER}\"\n\
         - Below that line, list the suggestions, each prefixed with \"- \" (hyphen space).\n\
         \n\
         Use the context below for reference, concentrating your new findings on \
         \"{sub_topic}\".\n\
         \n\
         {previous_context}\n\
         Present your findings and the refinement suggestions in well-structured Markdown \
         format. The main content about \"{sub_topic}\" should come first, followed by the \
         '{REFINEMENTS_HEADER}' section if applicable."
    )
}

/// Final report prompt: synthesize every accumulated history entry into one
/// Markdown report.
pub fn final_report_prompt(topic: &str, history: &[HistoryEntry], guidelines: &str) -> String {
    let full_context: Vec<String> = history
        .iter()
        .map(|entry| format!("--- {} ---\n{}", entry.title, entry.content))
        .collect();
    let full_context = full_context.join("\n\n---\n");

    format!(
        "Synthesize all the information gathered in the previous research stages (provided \
         below) into a single, comprehensive, well-structured report in **Markdown format** \
         on the topic: \"{topic}\".\n\
         \n\
         **IMPORTANT: Adhere strictly to the following Tone and Focus Guidelines for this \
         final report:**\n\
         {guidelines}\n\
         \n\
         Your final report should:\n\
         1.  Start with a clear introduction defining the topic, its scope, and the report's \
         structure.\n\
         2.  Logically integrate the overview and detailed findings from all previous stages, \
         organizing thematically.\n\
         3.  Objectively discuss differing viewpoints or controversies as per the guidelines.\n\
         4.  Conclude with a summary of key takeaways or the current state of understanding, \
         reflecting the specified tone.\n\
         5.  Ensure claims are supported by citations (`[source text](URL)`) present in the \
         context below.\n\
         6.  Format the entire output as clean, readable Markdown.\n\
         7.  Maintain the specified overall tone and focus throughout the synthesized report.\n\
         \n\
         Full context from previous research steps:\n\
         {full_context}\n\
         \n\
         Generate the final Markdown report based *only* on the context provided above and \
         the specified guidelines."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Tone;
    use crate::error::UpstreamError;

    fn settings() -> ResearchSettings {
        ResearchSettings::default()
    }

    #[test]
    fn guidelines_reflect_tone_and_stance() {
        let text = tone_focus_guidelines(&settings());
        assert!(text.contains("\"Neutral/Objective\" tone"));
        assert!(text.contains("opposing viewpoints"));

        let narrow = tone_focus_guidelines(&ResearchSettings {
            tone: Tone::FormalAcademic,
            opposing_views: false,
            custom_focus: None,
        });
        assert!(narrow.contains("\"Formal/Academic\" tone"));
        assert!(narrow.contains("do not elaborate extensively"));
    }

    #[test]
    fn custom_focus_is_embedded_with_backticks_softened() {
        let text = tone_focus_guidelines(&ResearchSettings {
            custom_focus: Some("focus on `cost` data".into()),
            ..settings()
        });
        assert!(text.contains("focus on 'cost' data"));
        assert!(!text.contains('`'));
    }

    #[test]
    fn blank_custom_focus_is_ignored() {
        let text = tone_focus_guidelines(&ResearchSettings {
            custom_focus: Some("   ".into()),
            ..settings()
        });
        assert!(!text.contains("special attention"));
    }

    #[test]
    fn planning_prompt_demands_bare_json_array() {
        let prompt = planning_prompt("Explain X", 3, "guidelines here");
        assert!(prompt.contains("break it down into 3"));
        assert!(prompt.contains("\"Explain X\""));
        assert!(prompt.contains("Output ONLY a valid JSON array of strings"));
    }

    #[test]
    fn sub_query_prompt_embeds_query_and_summary() {
        let prompt = sub_query_prompt("What is X?", "Explain X");
        assert!(prompt.starts_with("Answer the following specific query"));
        assert!(prompt.contains("\"What is X?\""));
        assert!(prompt.contains("larger request about \"Explain X\""));
    }

    #[test]
    fn synthesis_context_labels_successes_and_skips_failures() {
        let outcomes = vec![
            SubQueryOutcome {
                query: "q1".into(),
                result: Ok("r1".into()),
            },
            SubQueryOutcome {
                query: "q2".into(),
                result: Err(UpstreamError::MalformedResponse.into()),
            },
            SubQueryOutcome {
                query: "q3".into(),
                result: Ok("r3".into()),
            },
        ];
        let context = synthesis_context(&outcomes);
        assert!(context.contains("--- Result for Sub-Query 1: \"q1\" ---"));
        assert!(context.contains("--- Result for Sub-Query 2: \"q3\" ---"));
        assert!(!context.contains("q2"));
    }

    #[test]
    fn synthesis_context_marks_total_failure() {
        let outcomes = vec![SubQueryOutcome {
            query: "q1".into(),
            result: Err(UpstreamError::MalformedResponse.into()),
        }];
        assert_eq!(
            synthesis_context(&outcomes),
            "No results gathered from parallel execution."
        );
    }

    #[test]
    fn scan_prompt_demands_the_suggestions_header() {
        let prompt = initial_scan_prompt("Topic T", &[], "guidelines");
        assert!(prompt.contains(SUGGESTIONS_HEADER));
        assert!(!prompt.contains("--- File:"));
    }

    #[test]
    fn scan_prompt_embeds_context_files() {
        let files = vec![ContextFile {
            name: "notes.md".into(),
            content: "prior notes".into(),
        }];
        let prompt = initial_scan_prompt("Topic T", &files, "guidelines");
        assert!(prompt.contains("--- File: notes.md ---"));
        assert!(prompt.contains("prior notes"));
    }

    #[test]
    fn dive_prompt_distinguishes_sub_dives() {
        let top = deep_dive_prompt("Main", "Sub", Some("scan text"), None, "g");
        assert!(top.contains("identified in the initial scan"));
        assert!(top.contains("--- Initial Scan Context ---"));
        assert!(!top.contains("Immediate Parent Dive"));

        let nested = deep_dive_prompt("Main", "Deeper", Some("scan text"), Some("parent text"), "g");
        assert!(nested.contains("derived from previous exploration"));
        assert!(nested.contains("--- Context from Immediate Parent Dive ---\nparent text"));
        assert!(nested.contains(REFINEMENTS_HEADER));
    }

    #[test]
    fn report_prompt_concatenates_history() {
        let history = vec![
            HistoryEntry::new("Initial Scan & Plan", "scan body"),
            HistoryEntry::new("Deep Dive: A", "dive body"),
        ];
        let prompt = final_report_prompt("Topic T", &history, "g");
        assert!(prompt.contains("--- Initial Scan & Plan ---\nscan body"));
        assert!(prompt.contains("--- Deep Dive: A ---\ndive body"));
    }
}
