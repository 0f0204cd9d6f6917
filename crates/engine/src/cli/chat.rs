//! `sibyl chat` — interactive REPL command.
//!
//! Opens a readline loop that runs each line through the engine as one
//! conversational turn. Reply text prints to stdout; prompts, suggestions
//! and diagnostics go to stderr so output stays pipeable.

use std::sync::Arc;

use sibyl_domain::config::Config;
use sibyl_domain::message::InboundMessage;

use crate::bootstrap;
use crate::state::AppState;

/// Run the interactive chat REPL.
pub async fn chat(config: Arc<Config>, mut user_id: String) -> anyhow::Result<()> {
    // 1. Boot the engine.
    let state = bootstrap::build_app_state(config, true)?;

    // 2. Initialize rustyline with persistent history.
    let history_path = dirs::home_dir()
        .unwrap_or_default()
        .join(".sibyl")
        .join("chat_history.txt");
    if let Some(parent) = history_path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let mut rl = rustyline::DefaultEditor::new()?;
    let _ = rl.load_history(&history_path);

    // 3. Welcome goes to stderr; stdout carries reply text only.
    eprintln!("Sibyl interactive chat");
    eprintln!("User: {user_id}  |  Type /help for commands, Ctrl+D to exit");
    eprintln!("Say \"menu\" to see what readings are available.");
    eprintln!();

    // 4. REPL loop.
    loop {
        match rl.readline("you> ") {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }

                rl.add_history_entry(&line).ok();

                // ── Slash commands ────────────────────────────────
                if trimmed.starts_with('/') {
                    if handle_slash_command(trimmed, &mut user_id, &state) {
                        break;
                    }
                    continue;
                }

                // ── User message → engine turn ───────────────────
                let message = InboundMessage::new(user_id.as_str(), trimmed);
                match state.engine.handle_message(message).await {
                    Ok(reply) => {
                        println!("{}", reply.text);
                        println!();
                        if !reply.suggested_replies.is_empty() {
                            eprintln!(
                                "\x1B[2m[try: {}]\x1B[0m",
                                reply.suggested_replies.join(" | ")
                            );
                        }
                    }
                    Err(e) => eprintln!("\x1B[31merror: {e}\x1B[0m"),
                }
            }
            Err(rustyline::error::ReadlineError::Interrupted) => {
                eprintln!("(Use Ctrl+D or /exit to quit)");
                continue;
            }
            Err(rustyline::error::ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("\x1B[31mreadline error: {e}\x1B[0m");
                break;
            }
        }
    }

    // 5. Save history.
    rl.save_history(&history_path).ok();

    eprintln!("Goodbye!");
    Ok(())
}

/// Process a slash command. Returns `true` if the REPL should exit.
fn handle_slash_command(input: &str, user_id: &mut String, state: &AppState) -> bool {
    let parts: Vec<&str> = input.splitn(2, ' ').collect();
    let cmd = parts[0];
    let arg = parts.get(1).map(|s| s.trim());

    match cmd {
        "/exit" | "/quit" => return true,

        "/user" => {
            if let Some(id) = arg.filter(|s| !s.is_empty()) {
                *user_id = id.to_string();
                eprintln!("Talking as: {user_id}");
            } else {
                eprintln!("Current user: {user_id}");
                eprintln!("Usage: /user <id>");
            }
        }

        "/stats" => {
            let counts = state.invocations.status_counts();
            if counts.is_empty() {
                eprintln!("No invocations yet.");
            } else {
                let mut entries: Vec<_> = counts.into_iter().collect();
                entries.sort();
                for (status, count) in entries {
                    eprintln!("{status:>8}: {count}");
                }
            }
        }

        "/invocation" => match arg.and_then(|s| uuid::Uuid::parse_str(s).ok()) {
            Some(id) => match state.invocations.get(&id) {
                Some(record) => {
                    eprintln!("action:   {}", record.action_id);
                    eprintln!("user:     {}", record.user_id);
                    eprintln!("status:   {}", record.status.as_str());
                    eprintln!("started:  {}", record.started_at.format("%Y-%m-%d %H:%M:%S"));
                    if let Some(ms) = record.duration_ms {
                        eprintln!("duration: {ms} ms");
                    }
                    if let Some(kind) = record.error_kind {
                        eprintln!("error:    {kind}");
                    }
                    if let Some(result) = &record.result {
                        eprintln!("result:   {result}");
                    }
                }
                None => eprintln!("No record with that id (the log keeps recent entries only)."),
            },
            None => eprintln!("Usage: /invocation <uuid>"),
        },

        "/clear" => {
            // ANSI escape: clear screen and move cursor to top-left.
            eprint!("\x1B[2J\x1B[1;1H");
        }

        "/help" => {
            eprintln!("Commands:");
            eprintln!("  /user <id>         Switch to another user id");
            eprintln!("  /stats             Invocation counts by status");
            eprintln!("  /invocation <id>   Inspect one invocation record");
            eprintln!("  /clear             Clear the screen");
            eprintln!("  /exit, /quit       Exit the chat");
            eprintln!("  /help              Show this help");
            eprintln!();
            eprintln!("Anything else is sent to the engine as a message.");
        }

        other => {
            eprintln!("Unknown command: {other}  (type /help for a list)");
        }
    }

    false
}
