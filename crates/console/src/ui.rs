use anyhow::Result;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::io::{self, Write};
use steward_shared::{Message, Role, ToolCall};

use crate::client::ApiClient;
use crate::session::{ChatSession, Phase, SendOutcome};
use crate::store::{Credentials, LocalStore};
use crate::tasks::TaskBoard;

/// Badge icon + label per tool name. Unknown tools fall back to a wrench
/// with the raw name; the badge is display-only either way.
static TOOL_BADGES: Lazy<HashMap<&'static str, (&'static str, &'static str)>> = Lazy::new(|| {
    HashMap::from([
        ("add_task", ("📝", "Task added")),
        ("update_task", ("✏️", "Task updated")),
        ("delete_task", ("🗑", "Task deleted")),
        ("complete_task", ("✅", "Task completed")),
    ])
});

pub async fn dashboard(
    client: ApiClient,
    creds: Credentials,
    store: &mut LocalStore,
) -> Result<()> {
    let mut board = TaskBoard::new();
    board.refresh(&client, &creds.user_id, &creds.token).await;

    let mut session = ChatSession::new(&creds.user_id, &creds.token, store);

    println!("Steward dashboard. Type 'help' for commands, 'quit' to exit.\n");
    render_tasks(&board);

    loop {
        print!("\nsteward> ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        let (command, rest) = match input.split_once(' ') {
            Some((command, rest)) => (command, rest.trim()),
            None => (input, ""),
        };

        match command {
            "quit" | "exit" => break,
            "help" => print_help(),
            "tasks" | "list" => {
                board.refresh(&client, &creds.user_id, &creds.token).await;
                render_tasks(&board);
            }
            "add" => {
                if rest.is_empty() {
                    println!("Usage: add TITLE");
                } else if let Err(e) = board.add(&client, &creds.user_id, &creds.token, rest).await {
                    println!("❌ {}", e.user_message());
                } else {
                    render_tasks(&board);
                }
            }
            "done" => match rest.parse::<usize>() {
                Ok(n) if n >= 1 => {
                    if let Err(e) = board.toggle(&client, &creds.user_id, &creds.token, n - 1).await
                    {
                        println!("❌ {}", e.user_message());
                    } else {
                        render_tasks(&board);
                    }
                }
                _ => println!("Usage: done NUMBER"),
            },
            "rm" => match rest.parse::<usize>() {
                Ok(n) if n >= 1 => {
                    if let Err(e) = board.remove(&client, &creds.user_id, &creds.token, n - 1).await
                    {
                        println!("❌ {}", e.user_message());
                    } else {
                        render_tasks(&board);
                    }
                }
                _ => println!("Usage: rm NUMBER"),
            },
            "edit" => {
                let parsed = rest.split_once(' ').and_then(|(n, title)| {
                    let title = title.trim();
                    match n.parse::<usize>() {
                        Ok(n) if n >= 1 && !title.is_empty() => Some((n, title)),
                        _ => None,
                    }
                });
                match parsed {
                    Some((n, title)) => {
                        if let Err(e) = board
                            .edit(&client, &creds.user_id, &creds.token, n - 1, title)
                            .await
                        {
                            println!("❌ {}", e.user_message());
                        } else {
                            render_tasks(&board);
                        }
                    }
                    None => println!("Usage: edit NUMBER NEW TITLE"),
                }
            }
            "chat" => {
                chat_panel(&client, &creds, store, &mut session, &mut board).await?;
            }
            _ => println!("Unknown command '{}'. Type 'help'.", command),
        }
    }

    Ok(())
}

/// The chat sub-loop. Everything shown here derives from `ChatSession`;
/// the loop only turns input lines into session intents.
async fn chat_panel(
    client: &ApiClient,
    creds: &Credentials,
    store: &mut LocalStore,
    session: &mut ChatSession,
    board: &mut TaskBoard,
) -> Result<()> {
    session.open(client, store).await;
    println!("\nChat panel open. 'close' returns to the dashboard, 'reload' refetches history, 'clear' starts over.");
    if let Some(cid) = session.conversation_id() {
        println!("(conversation {})", cid);
    }
    println!();
    for message in session.messages() {
        render_message(message);
    }

    while session.is_open() {
        print!("You: ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            session.close();
            break;
        }
        let input = input.trim();

        match input {
            "" => continue,
            "close" => session.close(),
            "reload" => {
                session.load_history(client, store, true).await;
                for message in session.messages() {
                    render_message(message);
                }
            }
            "clear" => {
                session.clear(store);
                println!("Conversation cleared.");
            }
            text => {
                if session.phase() == Phase::Error {
                    session.clear_error();
                }
                match session.send(client, store, text).await {
                    SendOutcome::Sent { tasks_changed } => {
                        if let Some(reply) = session.messages().last() {
                            render_message(reply);
                        }
                        if tasks_changed {
                            board.refresh(client, &creds.user_id, &creds.token).await;
                            println!();
                            render_tasks(board);
                        }
                    }
                    SendOutcome::Failed => {
                        if let Some(error) = session.error() {
                            eprintln!("❌ {}", error);
                        }
                    }
                    SendOutcome::Ignored => {}
                }
            }
        }
    }

    Ok(())
}

pub async fn single_message(
    client: ApiClient,
    creds: Credentials,
    store: &mut LocalStore,
    message: String,
) -> Result<()> {
    let mut session = ChatSession::new(&creds.user_id, &creds.token, store);

    match session.send(&client, store, &message).await {
        SendOutcome::Sent { .. } => {
            if let Some(reply) = session.messages().last() {
                render_message(reply);
            }
        }
        SendOutcome::Failed => {
            if let Some(error) = session.error() {
                eprintln!("❌ {}", error);
            }
        }
        SendOutcome::Ignored => {}
    }

    Ok(())
}

fn render_tasks(board: &TaskBoard) {
    if !board.backend_connected() {
        println!("⚠ Service temporarily unavailable. We're working to restore connection; your data is safe.");
    }

    let (total, completed, pending) = board.summary();
    println!("Tasks: {} total, {} completed, {} pending", total, completed, pending);

    if board.tasks().is_empty() {
        println!("  (no tasks yet)");
        return;
    }
    for (i, task) in board.tasks().iter().enumerate() {
        let mark = if task.completed { "x" } else { " " };
        println!("  {}. [{}] {}", i + 1, mark, task.title);
    }
}

fn render_message(message: &Message) {
    let speaker = match message.role {
        Role::User => "You",
        Role::Assistant => "Steward",
    };
    println!("[{}] {}: {}", message.timestamp, speaker, message.content);

    for call in message.tool_calls.as_deref().unwrap_or(&[]) {
        println!("   {}", tool_badge(call));
    }
}

fn tool_badge(call: &ToolCall) -> String {
    match TOOL_BADGES.get(call.tool.as_str()) {
        Some((icon, label)) => format!("{} {}", icon, label),
        None => format!("🔧 {}", call.tool),
    }
}

fn print_help() {
    println!("Commands:");
    println!("  tasks                 Refresh and show the task list");
    println!("  add TITLE             Create a task");
    println!("  done NUMBER           Toggle a task's completed flag");
    println!("  edit NUMBER TITLE     Rename a task");
    println!("  rm NUMBER             Delete a task");
    println!("  chat                  Open the assistant chat panel");
    println!("  quit                  Exit");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn known_tools_get_their_badge_label() {
        let call = ToolCall {
            tool: "add_task".to_string(),
            params: json!({}),
            result: json!({}),
        };
        assert_eq!(tool_badge(&call), "📝 Task added");
    }

    #[test]
    fn unknown_tools_fall_back_to_the_raw_name() {
        let call = ToolCall {
            tool: "reticulate_splines".to_string(),
            params: json!({}),
            result: json!({}),
        };
        assert_eq!(tool_badge(&call), "🔧 reticulate_splines");
    }
}
