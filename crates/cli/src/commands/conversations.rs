//! `memloop conversations`: browse stored conversations.

use super::{load_config, open_stores};
use memloop_core::conversation::{ConversationId, Turn, TurnContent, UserId};

pub async fn list(user: &UserId) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let stores = open_stores(&config).await?;
    let records = stores.conversations.list_conversations(user).await?;

    if records.is_empty() {
        println!("No conversations for {user} yet. Start one with `memloop chat`.");
        return Ok(());
    }

    println!("Conversations for {user}");
    println!("========================");
    for record in &records {
        println!(
            "  {}  {}  {}",
            record.id,
            record.updated_at.format("%Y-%m-%d %H:%M"),
            record.title
        );
    }
    Ok(())
}

pub async fn show(user: &UserId, id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let stores = open_stores(&config).await?;
    let id = ConversationId::from(id);

    let record = stores
        .conversations
        .get_conversation(user, &id)
        .await?
        .ok_or_else(|| format!("Conversation {id} not found for {user}"))?;
    let turns = stores.conversations.turns(user, &id).await?;

    println!("{} ({})", record.title, record.id);
    println!("Started {}", record.created_at.format("%Y-%m-%d %H:%M:%S"));
    println!();
    for turn in &turns {
        println!("{}", render_turn(turn));
    }
    Ok(())
}

/// One line per turn; tool turns show the call and its result.
pub fn render_turn(turn: &Turn) -> String {
    match &turn.content {
        TurnContent::User { text } => format!("[{}] user: {text}", turn.sequence),
        TurnContent::Assistant { text } => format!("[{}] assistant: {text}", turn.sequence),
        TurnContent::Tool { call, result } => {
            let status = if result.success { "" } else { " (failed)" };
            format!(
                "[{}] tool {}({}){status}: {}",
                turn.sequence, call.name, call.arguments, result.output
            )
        }
    }
}
