//! CLI driver for the research engine.
//!
//! A thin adapter over [`ResearchSession`]: scan the topic, offer the
//! suggested dives (interactively or via `--auto-dives`), then synthesize
//! the final report.

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::info;

use research_engine::{
    ContextFile, EngineConfig, GenerativeClient, ResearchSession, ResearchSettings, StatusSink,
    Tone,
};

#[derive(Parser)]
#[command(name = "research-engine", about = "Grounded research report generator")]
struct Args {
    /// Research topic to scan.
    #[arg(long)]
    topic: String,

    /// Model identifier (overrides RESEARCH_MODEL).
    #[arg(long)]
    model: Option<String>,

    /// Tone preset for the whole session.
    #[arg(long, value_enum, default_value_t = Tone::NeutralObjective)]
    tone: Tone,

    /// Skip presenting and analyzing opposing viewpoints.
    #[arg(long)]
    no_opposing_views: bool,

    /// Free-text focus instructions woven into every prompt.
    #[arg(long)]
    focus: Option<String>,

    /// Context files included in the initial scan.
    #[arg(long)]
    context: Vec<PathBuf>,

    /// Dive into the first N suggested sub-topics automatically, then
    /// synthesize without prompting.
    #[arg(long)]
    auto_dives: Option<usize>,
}

/// Status sink that prints progress lines to stderr.
struct ConsoleStatus;

impl StatusSink for ConsoleStatus {
    fn update(&self, message: &str, busy: bool) {
        if busy {
            eprintln!("... {message}");
        } else {
            eprintln!("    {message}");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "research_engine=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = EngineConfig::default();
    if let Some(model) = args.model {
        config.model = model;
    }
    if let Err(reason) = config.validate() {
        bail!("configuration error: {reason}");
    }

    let mut context_files = Vec::new();
    for path in &args.context {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read context file {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        context_files.push(ContextFile { name, content });
    }
    if !context_files.is_empty() {
        info!(count = context_files.len(), "loaded context files");
    }

    let settings = ResearchSettings {
        tone: args.tone,
        opposing_views: !args.no_opposing_views,
        custom_focus: args.focus,
    };

    let upstream = Arc::new(GenerativeClient::new(&config));
    let mut session = ResearchSession::new(upstream, config)
        .with_settings(settings)
        .with_context_files(context_files)
        .with_status(Arc::new(ConsoleStatus));

    let scan = session
        .scan_topic(&args.topic)
        .await
        .context("initial scan failed")?;

    println!("\n===== Initial Scan =====\n");
    println!("{}\n", scan.overview);

    if let Some(count) = args.auto_dives {
        for topic in scan.suggestions.iter().take(count) {
            match session.deep_dive(topic, None).await {
                Ok(dive) => {
                    println!("\n===== Deep Dive: {topic} =====\n");
                    println!("{}\n", dive.content);
                }
                Err(e) => eprintln!("error: {e}"),
            }
        }
    } else {
        run_interactive(&mut session, scan.suggestions).await?;
    }

    let report = session
        .synthesize_final()
        .await
        .context("final synthesis failed")?;
    println!("\n===== Final Report =====\n");
    println!("{report}");

    println!("\n===== Research Stages =====\n");
    for (i, entry) in session.process_log().iter().enumerate() {
        println!("{}. {}: {}", i + 1, entry.step, entry.reasoning);
    }

    Ok(())
}

/// Interactive dive loop: pick suggestions by number, follow refinements,
/// or ask custom questions, until the user requests synthesis.
async fn run_interactive(
    session: &mut ResearchSession,
    mut suggestions: Vec<String>,
) -> Result<()> {
    let stdin = std::io::stdin();
    let mut last_dive: Option<(String, Vec<String>)> = None;

    loop {
        print_choices(&suggestions, last_dive.as_ref());
        print!("> ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break; // EOF: go straight to synthesis
        }
        let input = line.trim();

        if input.is_empty() {
            continue;
        }
        if input == "s" {
            break;
        }
        if input == "q" {
            bail!("session aborted before synthesis");
        }

        let (topic, parent) = if let Ok(n) = input.parse::<usize>() {
            match suggestions.get(n.saturating_sub(1)) {
                Some(topic) => (topic.clone(), None),
                None => {
                    eprintln!("no suggestion #{n}");
                    continue;
                }
            }
        } else if let Some(rest) = input.strip_prefix("f ") {
            let Some((parent_topic, refinements)) = last_dive.as_ref() else {
                eprintln!("no dive to refine yet");
                continue;
            };
            match rest
                .parse::<usize>()
                .ok()
                .and_then(|n| refinements.get(n.saturating_sub(1)))
            {
                Some(topic) => (topic.clone(), Some(parent_topic.clone())),
                None => {
                    eprintln!("no refinement #{rest}");
                    continue;
                }
            }
        } else if let Some(question) = input.strip_prefix("d ") {
            (question.trim().to_string(), None)
        } else {
            eprintln!("enter a suggestion number, 'f N', 'd <question>', 's', or 'q'");
            continue;
        };

        match session.deep_dive(&topic, parent.as_deref()).await {
            Ok(dive) => {
                println!("\n===== Exploration: {topic} =====\n");
                println!("{}\n", dive.content);
                // Completed suggestions drop out of the menu.
                suggestions.retain(|s| s != &topic);
                last_dive = Some((topic, dive.refinements));
            }
            Err(e) => eprintln!("error: {e}"),
        }
    }

    Ok(())
}

fn print_choices(suggestions: &[String], last_dive: Option<&(String, Vec<String>)>) {
    if !suggestions.is_empty() {
        println!("Suggested dives:");
        for (i, topic) in suggestions.iter().enumerate() {
            println!("  {}. {topic}", i + 1);
        }
    }
    if let Some((parent, refinements)) = last_dive {
        if !refinements.is_empty() {
            println!("Refinements of \"{parent}\" (choose with 'f N'):");
            for (i, topic) in refinements.iter().enumerate() {
                println!("  {}. {topic}", i + 1);
            }
        }
    }
    println!("Commands: <number> dive, 'f N' refine last dive, 'd <question>' custom dive, 's' synthesize, 'q' quit");
}
