//! `memloop chat`: interactive or single-message chat mode.

use super::{Stores, load_config, open_stores};
use memloop_agent::{
    AgentLoop, AgentStreamEvent, AssemblerConfig, CancellationToken, ContextAssembler,
    ExchangeSummary, LoopConfig, Terminal,
};
use memloop_config::AppConfig;
use memloop_core::conversation::{ConversationId, UserId};
use memloop_core::event::EventBus;
use memloop_memory::MemoryRetriever;
use memloop_providers::AnthropicProvider;
use memloop_tools::{MemoryTools, default_registry};
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::debug;

pub struct ChatArgs {
    pub message: Option<String>,
    pub conversation: Option<String>,
    pub title: Option<String>,
    pub stream: bool,
}

/// Longest tool output echoed to the terminal.
const TOOL_PREVIEW_CHARS: usize = 120;

/// Build the agent exactly as `chat` runs it.
pub fn build_agent(config: &AppConfig, stores: &Stores, event_bus: Arc<EventBus>) -> Result<AgentLoop, Box<dyn std::error::Error>> {
    let provider = Arc::new(AnthropicProvider::from_config(config)?);

    let retriever = MemoryRetriever::new(stores.memory.clone(), config.memory.lookback)
        .with_min_score(config.memory.min_score);
    let tools = default_registry(Some(MemoryTools {
        store: stores.memory.clone(),
        retriever: retriever.clone(),
    }))?;

    let assembler = ContextAssembler::new(
        stores.conversations.clone(),
        retriever,
        AssemblerConfig::from_config(config),
    );

    let mut agent = AgentLoop::new(
        provider,
        Arc::new(tools),
        stores.conversations.clone(),
        Arc::new(assembler),
        LoopConfig::from_config(config),
    )
    .with_event_bus(event_bus);
    if config.memory.auto_save {
        agent = agent.with_auto_save(stores.memory.clone(), Arc::new(ExchangeSummary));
    }
    Ok(agent)
}

pub async fn run(user: UserId, args: ChatArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;

    // Check for API key early: give a clear error
    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    MEMLOOP_API_KEY=sk-ant-...");
        eprintln!("    ANTHROPIC_API_KEY=sk-ant-...");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let stores = open_stores(&config).await?;
    let event_bus = Arc::new(EventBus::default());
    let _events = log_events(&event_bus);
    let agent = build_agent(&config, &stores, event_bus)?;

    let mut conversation = match (args.conversation, args.title) {
        (Some(id), _) => Some(ConversationId::from(id.as_str())),
        (None, Some(title)) => Some(stores.conversations.create_conversation(&user, Some(title.as_str())).await?.id),
        (None, None) => None,
    };

    if let Some(msg) = args.message {
        send(&agent, &user, &mut conversation, msg, args.stream).await?;
        return Ok(());
    }

    // Interactive mode
    println!();
    println!("  memloop: interactive mode");
    println!();
    println!("  User:     {user}");
    println!("  Model:    {}", config.agent.model);
    println!("  Memory:   {} ({})", config.memory.backend, if config.memory.auto_save { "auto-save on" } else { "auto-save off" });
    if let Some(id) = &conversation {
        println!("  Session:  {id}");
    }
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'exit' or 'quit' to leave; Ctrl+C cancels the current answer.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "exit" || line == "quit" {
            break;
        }

        if let Err(e) = send(&agent, &user, &mut conversation, line.to_string(), args.stream).await {
            eprintln!("  [Error] {e}");
        }
        println!();
    }

    println!();
    if let Some(id) = &conversation {
        println!("  Conversation saved as {id}");
    }
    println!("  Goodbye!");
    println!();
    Ok(())
}

/// Send one message; on success `conversation` points at the conversation
/// it was stored in.
async fn send(
    agent: &AgentLoop,
    user: &UserId,
    conversation: &mut Option<ConversationId>,
    message: String,
    stream: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let cancel = CancellationToken::new();
    let interrupt = cancel_on_ctrl_c(cancel.clone());

    let result = if stream {
        stream_answer(agent, user, conversation, message, cancel).await
    } else {
        eprint!("  Thinking...");
        let outcome = agent.run(user, conversation.clone(), &message, &cancel).await;
        eprint!("\r              \r");
        match outcome {
            Ok(outcome) => {
                *conversation = Some(outcome.conversation_id.clone());
                match &outcome.terminal {
                    Terminal::Done { answer } => {
                        for line in answer.lines() {
                            println!("  Assistant > {line}");
                        }
                    }
                    Terminal::Aborted { notice, .. } => println!("  [Stopped] {notice}"),
                }
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    };

    interrupt.abort();
    result
}

async fn stream_answer(
    agent: &AgentLoop,
    user: &UserId,
    conversation: &mut Option<ConversationId>,
    message: String,
    cancel: CancellationToken,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut rx = agent.run_stream(user.clone(), conversation.clone(), message, cancel);
    let mut at_line_start = true;

    while let Some(event) = rx.recv().await {
        match event {
            AgentStreamEvent::Chunk { content } => {
                if at_line_start {
                    print!("  Assistant > ");
                    at_line_start = false;
                }
                print!("{content}");
                std::io::stdout().flush()?;
            }
            AgentStreamEvent::ToolCall { name, input, .. } => {
                if !at_line_start {
                    println!();
                    at_line_start = true;
                }
                eprintln!("  [tool] {name}({input})");
            }
            AgentStreamEvent::ToolResult { name, output, success, .. } => {
                let status = if success { "ok" } else { "failed" };
                eprintln!("  [tool] {name} {status}: {}", preview(&output));
            }
            AgentStreamEvent::Done { conversation_id, .. } => {
                if !at_line_start {
                    println!();
                }
                *conversation = Some(ConversationId::from(conversation_id.as_str()));
            }
            AgentStreamEvent::Aborted { conversation_id, notice, .. } => {
                if !at_line_start {
                    println!();
                }
                println!("  [Stopped] {notice}");
                *conversation = Some(ConversationId::from(conversation_id.as_str()));
            }
            AgentStreamEvent::Error { message } => {
                if !at_line_start {
                    println!();
                }
                return Err(message.into());
            }
        }
    }
    Ok(())
}

fn preview(text: &str) -> String {
    let flat = text.replace('\n', " ");
    if flat.chars().count() <= TOOL_PREVIEW_CHARS {
        return flat;
    }
    let cut: String = flat.chars().take(TOOL_PREVIEW_CHARS).collect();
    format!("{cut}...")
}

/// Cancel `token` on Ctrl+C until the returned task is aborted.
fn cancel_on_ctrl_c(token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    })
}

/// Forward domain events to the debug log.
fn log_events(event_bus: &EventBus) -> JoinHandle<()> {
    let mut rx = event_bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => debug!(event = ?event, "Domain event"),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Domain event log lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
