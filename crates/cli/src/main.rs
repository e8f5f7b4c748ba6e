//! memloop CLI, the main entry point.
//!
//! Commands:
//! - `chat`           Interactive chat or single-message mode
//! - `conversations`  List and inspect stored conversations
//! - `memory`         Remember, search and count memory snippets
//! - `config`         Create or print the configuration file

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "memloop",
    about = "memloop: a tool-calling agent that remembers across conversations",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Whose conversations and memories to use
    #[arg(short, long, global = true, env = "MEMLOOP_USER")]
    user: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the agent
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Continue an existing conversation
        #[arg(short, long)]
        conversation: Option<String>,

        /// Title for a new conversation
        #[arg(long, conflicts_with = "conversation")]
        title: Option<String>,

        /// Print the answer as it is generated
        #[arg(long)]
        stream: bool,
    },

    /// Inspect stored conversations
    Conversations {
        #[command(subcommand)]
        action: ConversationsAction,
    },

    /// Manage memory snippets
    Memory {
        #[command(subcommand)]
        action: MemoryAction,
    },

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConversationsAction {
    /// List conversations, most recently updated first
    List,
    /// Print the turns of one conversation
    Show { id: String },
}

#[derive(Subcommand)]
enum MemoryAction {
    /// Store a fact
    Remember {
        text: String,
        /// Importance between 0 and 1
        #[arg(long)]
        importance: Option<f32>,
    },
    /// Show the snippets that would be injected for a query
    Search {
        query: String,
        /// Character budget for the result
        #[arg(long, default_value_t = memloop_tools::memory_search::DEFAULT_SEARCH_BUDGET)]
        budget: usize,
    },
    /// Show memory settings and snippet count
    Stats,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a default config file if none exists
    Init,
    /// Print the effective configuration
    Show,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr so answers can be piped
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let user = commands::resolve_user(cli.user)?;

    match cli.command {
        Commands::Chat {
            message,
            conversation,
            title,
            stream,
        } => {
            let args = commands::chat::ChatArgs {
                message,
                conversation,
                title,
                stream,
            };
            commands::chat::run(user, args).await?
        }
        Commands::Conversations { action } => match action {
            ConversationsAction::List => commands::conversations::list(&user).await?,
            ConversationsAction::Show { id } => commands::conversations::show(&user, &id).await?,
        },
        Commands::Memory { action } => match action {
            MemoryAction::Remember { text, importance } => {
                commands::memory::remember(&user, &text, importance).await?
            }
            MemoryAction::Search { query, budget } => commands::memory::search(&user, &query, budget).await?,
            MemoryAction::Stats => commands::memory::stats(&user).await?,
        },
        Commands::Config { action } => match action {
            ConfigAction::Init => commands::config_cmd::init().await?,
            ConfigAction::Show => commands::config_cmd::show().await?,
        },
    }

    Ok(())
}
