//! REPL – Read-Eval-Print Loop over the memory service.
//!
//! Supported slash-commands:
//!   /rules                               – list active project rules
//!   /search <text>                       – find similar past experiences
//!   /remember <pattern> | <cause> | <solution>
//!                                        – record an experience explicitly
//!   /ingest <transcript.json>            – run a conversation through ingestion
//!   /context <text>                      – rules plus relevant experiences
//!   /help                                – show this list
//!   /quit | /exit                        – exit the CLI

use std::path::{Path, PathBuf};

use colored::Colorize;
use hunter_memory::{IngestOutcome, MemoryError, MemoryService};
use hunter_types::{Experience, Turn};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// A parsed REPL line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Rules,
    Search(String),
    Remember { pattern: String, cause: String, solution: String },
    Ingest(PathBuf),
    Context(String),
    Help,
    Quit,
}

impl Command {
    /// Parse one input line. Errors are user-facing usage messages.
    pub fn parse(line: &str) -> Result<Self, String> {
        let line = line.trim();
        let (name, rest) = match line.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (line, ""),
        };
        let required = |usage: &str| {
            if rest.is_empty() { Err(format!("usage: {usage}")) } else { Ok(rest.to_string()) }
        };
        match name {
            "/rules" => Ok(Command::Rules),
            "/search" => required("/search <text>").map(Command::Search),
            "/context" => required("/context <text>").map(Command::Context),
            "/ingest" => required("/ingest <transcript.json>").map(|p| Command::Ingest(PathBuf::from(p))),
            "/remember" => {
                let fields: Vec<&str> = rest.splitn(3, '|').map(str::trim).collect();
                match fields.as_slice() {
                    [pattern, cause, solution] => Ok(Command::Remember {
                        pattern: pattern.to_string(),
                        cause: cause.to_string(),
                        solution: solution.to_string(),
                    }),
                    _ => Err("usage: /remember <pattern> | <cause> | <solution>".to_string()),
                }
            }
            "/help" => Ok(Command::Help),
            "/quit" | "/exit" => Ok(Command::Quit),
            other => Err(format!("Unknown command: '{other}'")),
        }
    }
}

/// Run the interactive loop until `/quit`, EOF, or `shutdown` is cancelled.
///
/// Each command runs under a child of `shutdown`, so Ctrl-C also aborts any
/// in-flight database query or embedding request.
pub async fn run(service: &MemoryService, shutdown: CancellationToken) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(format!("{} ", "hunter>".bold().cyan()).as_bytes()).await.ok();
        stdout.flush().await.ok();

        let line = tokio::select! {
            _ = shutdown.cancelled() => break,
            line = lines.next_line() => line,
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let command = match Command::parse(&line) {
            Ok(command) => command,
            Err(msg) => {
                println!("{} Type {} for available commands.", msg.red(), "/help".bold());
                continue;
            }
        };
        if command == Command::Quit {
            println!("{}", "Goodbye.".green());
            break;
        }

        let cancel = shutdown.child_token();
        if let Err(e) = execute(service, command, &cancel).await {
            match e {
                MemoryError::Cancelled => println!("{}", "Cancelled.".yellow()),
                other => {
                    warn!(error = %other, "command failed");
                    println!("{}: {}", "Error".red(), other);
                }
            }
        }
    }
}

async fn execute(service: &MemoryService, command: Command, cancel: &CancellationToken) -> Result<(), MemoryError> {
    match command {
        Command::Rules => {
            let rules = service.active_rules(cancel).await?;
            print_rules(&rules);
        }
        Command::Search(text) => {
            if !service.has_embedder() {
                println!("{}", "No embedder configured; search is unavailable.".yellow());
                return Ok(());
            }
            let hits = service.recall(&text, cancel).await?;
            print_experiences(&hits);
        }
        Command::Remember { pattern, cause, solution } => {
            service.remember(&pattern, &cause, &solution, cancel).await?;
            println!("  {} Experience saved.", "✓".green().bold());
        }
        Command::Ingest(path) => {
            let turns = match read_transcript(&path).await {
                Ok(turns) => turns,
                Err(msg) => {
                    println!("{}: {}", "Transcript error".red(), msg);
                    return Ok(());
                }
            };
            match service.ingest(&turns, cancel).await? {
                IngestOutcome::Persisted => println!("  {} Conversation stored as an experience.", "✓".green().bold()),
                IngestOutcome::Skipped(reason) => {
                    println!("  {} {:?}", "Not stored:".yellow(), reason)
                }
            }
        }
        Command::Context(text) => {
            let ctx = service.context(&text, cancel).await?;
            print_rules(&ctx.rules);
            print_experiences(&ctx.relevant);
        }
        Command::Help => cmd_help(),
        Command::Quit => {}
    }
    Ok(())
}

/// Read a JSON array of turns.
async fn read_transcript(path: &Path) -> Result<Vec<Turn>, String> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    serde_json::from_str(&raw).map_err(|e| format!("Failed to parse {}: {}", path.display(), e))
}

// ─────────────────────────────────────────────────────────────────────────────
// Output
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_help() {
    println!();
    println!("{}", "Hunter Commands".bold().underline());
    println!("  {}                  – list active project rules", "/rules".bold().cyan());
    println!("  {}          – find similar past experiences", "/search <text>".bold().cyan());
    println!("  {} – record an experience", "/remember p | c | s".bold().cyan());
    println!("  {}   – ingest a JSON transcript", "/ingest <file.json>".bold().cyan());
    println!("  {}         – rules plus relevant experiences", "/context <text>".bold().cyan());
    println!("  {}            – exit the CLI", "/quit  /exit".bold().cyan());
    println!();
}

fn print_rules(rules: &[String]) {
    println!("{}", "Project rules".bold().underline());
    if rules.is_empty() {
        println!("  {}", "(none)".dimmed());
    }
    for (i, rule) in rules.iter().enumerate() {
        println!("  {}. {}", i + 1, rule);
    }
}

fn print_experiences(experiences: &[Experience]) {
    println!("{}", "Relevant experiences".bold().underline());
    if experiences.is_empty() {
        println!("  {}", "No related past issues found.".dimmed());
        return;
    }
    for exp in experiences {
        let score = exp.similarity.map(|s| format!("{:.2}%", s * 100.0)).unwrap_or_default();
        println!("  {} {} {}", format!("#{}", exp.id).bold(), exp.task_signature, score.dimmed());
        if !exp.root_cause.is_empty() {
            println!("      {} {}", "cause:".yellow(), exp.root_cause);
        }
        println!("      {} {}", "fix:".green(), exp.solution_summary);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_commands() {
        assert_eq!(Command::parse("/rules"), Ok(Command::Rules));
        assert_eq!(Command::parse("  /help  "), Ok(Command::Help));
        assert_eq!(Command::parse("/exit"), Ok(Command::Quit));
    }

    #[test]
    fn parses_text_arguments() {
        assert_eq!(
            Command::parse("/search   cannot borrow as mutable"),
            Ok(Command::Search("cannot borrow as mutable".into()))
        );
        assert_eq!(Command::parse("/context linker"), Ok(Command::Context("linker".into())));
        assert_eq!(Command::parse("/ingest chat.json"), Ok(Command::Ingest(PathBuf::from("chat.json"))));
    }

    #[test]
    fn missing_argument_is_a_usage_error() {
        assert!(Command::parse("/search").unwrap_err().starts_with("usage:"));
        assert!(Command::parse("/ingest   ").unwrap_err().starts_with("usage:"));
    }

    #[test]
    fn remember_splits_on_pipes() {
        assert_eq!(
            Command::parse("/remember E0499 two mutable borrows | overlapping &mut | scope the first borrow"),
            Ok(Command::Remember {
                pattern: "E0499 two mutable borrows".into(),
                cause: "overlapping &mut".into(),
                solution: "scope the first borrow".into(),
            })
        );
        // Extra pipes stay in the solution.
        match Command::parse("/remember a | b | c | d").unwrap() {
            Command::Remember { solution, .. } => assert_eq!(solution, "c | d"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(Command::parse("/remember only pattern").is_err());
    }

    #[test]
    fn unknown_command_is_reported() {
        assert_eq!(Command::parse("/start"), Err("Unknown command: '/start'".to_string()));
    }

    #[tokio::test]
    async fn transcript_is_read_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat.json");
        std::fs::write(
            &path,
            r#"[{"role": "user", "parts": [{"text": "q"}]}, {"role": "model", "parts": [{"text": "a"}]}]"#,
        )
        .unwrap();
        let turns = read_transcript(&path).await.unwrap();
        assert_eq!(turns.len(), 2);

        let missing = read_transcript(&dir.path().join("nope.json")).await.unwrap_err();
        assert!(missing.contains("Failed to read"));
    }
}
