//! Interactive chat against a completion server.

use std::collections::HashSet;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use parlor_core::engine::ServerAdapter;
use parlor_core::{Assistant, EngineKind, Message, Role, TokenSet};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};
use uuid::Uuid;

/// Read lines from stdin and stream each reply to stdout.
///
/// `/reset` clears the conversation, `/quit` (or end of input) leaves.
pub async fn run(
    data_dir: PathBuf,
    server_url: Option<String>,
    system_prompt: Option<String>,
    template: Option<EngineKind>,
) -> Result<()> {
    let mut builder = Assistant::builder(data_dir);
    if let Some(prompt) = system_prompt {
        builder = builder.system_prompt(prompt);
    }
    let assistant = builder.build().await?;

    let saved = assistant.settings().load()?;
    let url = server_url.unwrap_or_else(|| saved.server_url.clone());
    let tokens = TokenSet::for_engine(template.unwrap_or_else(|| saved.engine_kind()));
    let adapter = ServerAdapter::new(url.clone())?.with_tokens(tokens);
    assistant
        .activate(Box::new(adapter), std::path::Path::new(&url))
        .await
        .with_context(|| format!("Could not reach completion server at {}", url))?;

    if let Some(greeting) = assistant.conversation().first().and_then(Message::as_text) {
        println!("{}", greeting);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" => break,
            "/reset" => {
                assistant.reset_chat().await;
                println!("(conversation cleared)");
                continue;
            }
            _ => {}
        }

        let known = ids_of(&assistant.conversation());
        let mut updates = assistant.subscribe_conversation();
        assistant.send_text(line)?;

        let mut printed = 0;
        let idle = assistant.wait_idle();
        tokio::pin!(idle);
        loop {
            tokio::select! {
                _ = &mut idle => {
                    print_delta(&updates.borrow(), &known, &mut printed);
                    break;
                }
                changed = updates.changed() => {
                    if changed.is_err() {
                        warn!("Conversation closed");
                        break;
                    }
                    print_delta(&updates.borrow_and_update(), &known, &mut printed);
                }
            }
        }
        println!();
    }

    debug!("Leaving chat");
    assistant.shutdown().await;
    Ok(())
}

/// Print the part of the newest reply that has not been printed yet.
fn print_delta(conversation: &[Message], known: &HashSet<Uuid>, printed: &mut usize) {
    let reply = conversation
        .iter()
        .find(|m| m.role() == Role::Assistant && !known.contains(&m.id()))
        .and_then(Message::as_text);
    let Some(text) = reply else { return };

    // A reconciled reply may be shorter than what streamed in.
    if text.len() < *printed || !text.is_char_boundary(*printed) {
        return;
    }
    print!("{}", &text[*printed..]);
    let _ = std::io::stdout().flush();
    *printed = text.len();
}

fn ids_of(conversation: &[Message]) -> HashSet<Uuid> {
    conversation.iter().map(Message::id).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_print_delta_skips_known_messages() {
        let old = Message::assistant("hello");
        let known = ids_of(&[old.clone()]);
        let mut printed = 0;
        print_delta(&[old], &known, &mut printed);
        assert_eq!(printed, 0);

        let fresh = Message::assistant("new reply");
        print_delta(&[fresh], &known, &mut printed);
        assert_eq!(printed, "new reply".len());
    }
}
