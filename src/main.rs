use anyhow::{Context, Result};
use chatstream_client::build_provider;
use chatstream_completion::{
    ChatCompletionConfigInput, ChatCompletionInput, ChatCompletionOutput, CompletionOrchestrator,
    PartialResult,
};
use chatstream_config::AppConfig;
use chatstream_conversation::FileConversationStore;
use chatstream_core::{CompletionProvider, ConversationStore};
use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "chatstream")]
#[command(about = "Streaming chat completions with persistent conversations", long_about = None)]
struct Cli {
    #[arg(short, long, value_name = "FILE", default_value = "config.yaml")]
    config: PathBuf,

    #[arg(short, long, action = clap::ArgAction::SetTrue)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send messages to a conversation, creating it if needed
    Chat {
        /// Conversation id (a new one is generated when omitted)
        #[arg(long, default_value = "")]
        conversation: String,

        /// User the conversation belongs to
        #[arg(short, long)]
        user: String,

        /// Send a single message instead of starting an interactive session
        #[arg(short, long)]
        message: Option<String>,
    },

    /// List stored conversations
    List,

    /// Print the messages of a conversation
    Show {
        id: String,
    },

    /// Mark a conversation as ended
    End {
        id: String,
    },

    /// Delete a stored conversation
    Delete {
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose)?;

    let config = if cli.config.exists() {
        info!("Loading configuration from: {:?}", cli.config);
        AppConfig::from_yaml(&cli.config)?
    } else {
        info!("Using default configuration");
        let config = AppConfig::default();
        config.validate()?;
        config
    };

    let store = Arc::new(FileConversationStore::new(&config.storage.data_dir));

    match cli.command {
        Commands::Chat { conversation, user, message } => {
            chat(&config, store, conversation, user, message).await?;
        }
        Commands::List => {
            list_conversations(&store).await?;
        }
        Commands::Show { id } => {
            show_conversation(&store, &id).await?;
        }
        Commands::End { id } => {
            let mut conversation = store.find_by_id(&id).await?;
            conversation.end();
            store.save(&conversation).await?;
            println!("Conversation {id} ended");
        }
        Commands::Delete { id } => {
            store.delete_conversation(&id).await?;
            println!("Conversation {id} deleted");
        }
    }

    Ok(())
}

/// Print each partial result's new suffix as it arrives
fn spawn_printer(mut rx: mpsc::Receiver<PartialResult>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut printed = 0usize;
        while let Some(partial) = rx.recv().await {
            print!("{}", &partial.content[printed..]);
            io::stdout().flush().ok();
            printed = partial.content.len();
        }
    })
}

/// One completion round with its own sink and printer task
async fn run_round(
    config: &AppConfig,
    store: Arc<FileConversationStore>,
    provider: Arc<dyn CompletionProvider>,
    input: ChatCompletionInput,
) -> Result<ChatCompletionOutput> {
    let (tx, rx) = mpsc::channel(config.stream.buffer);
    let printer = spawn_printer(rx);

    let orchestrator = CompletionOrchestrator::new(store, provider, tx);
    let result = orchestrator.execute(input).await;
    drop(orchestrator);

    printer.await.context("partial result printer failed")?;
    Ok(result?)
}

async fn chat(
    config: &AppConfig,
    store: Arc<FileConversationStore>,
    conversation_id: String,
    user_id: String,
    message: Option<String>,
) -> Result<()> {
    let provider = build_provider(&config.provider).await?;
    let conversation_id = session_conversation_id(conversation_id);
    let chat_config = ChatCompletionConfigInput::from(&config.chat);

    let input = |conversation_id: String, user_message: String| ChatCompletionInput {
        conversation_id,
        user_id: user_id.clone(),
        user_message,
        config: chat_config.clone(),
    };

    if let Some(text) = message {
        let output = run_round(config, store, provider, input(conversation_id, text)).await?;
        println!();
        info!("Conversation {}", output.conversation_id);
        return Ok(());
    }

    println!("chatstream interactive chat");
    println!("Type 'exit' or 'quit' to end the session");
    println!("═══════════════════════════════════════\n");

    let stdin = io::stdin();
    loop {
        print!("You> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
            println!("Goodbye!");
            break;
        }

        print!("\nAssistant> ");
        io::stdout().flush()?;

        let round = input(conversation_id.clone(), line.to_string());
        match run_round(config, store.clone(), provider.clone(), round).await {
            Ok(_) => println!("\n"),
            Err(e) => eprintln!("\n{e:#}\n"),
        }
    }

    Ok(())
}

/// Every round of a session targets one id, even when an earlier round
/// created the conversation and then failed
fn session_conversation_id(requested: String) -> String {
    if requested.is_empty() {
        Uuid::new_v4().to_string()
    } else {
        requested
    }
}

async fn list_conversations(store: &FileConversationStore) -> Result<()> {
    let conversations = store.list_conversations().await?;
    if conversations.is_empty() {
        println!("No conversations stored in {:?}", store.base_dir());
        return Ok(());
    }

    println!("\nConversations:");
    println!("═══════════════════════════════════════");
    for summary in conversations {
        println!(
            "{}  user={}  model={}  status={:?}  messages={}  updated={}",
            summary.id,
            summary.user_id,
            summary.model,
            summary.status,
            summary.message_count,
            summary.updated_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

async fn show_conversation(store: &FileConversationStore, id: &str) -> Result<()> {
    let conversation = store.find_by_id(id).await?;

    println!("\nConversation {} ({:?})", conversation.id, conversation.status);
    println!("Model: {}  Tokens in window: {}", conversation.config.model.name, conversation.token_usage);
    println!("═══════════════════════════════════════");
    for message in conversation.messages() {
        println!("[{}]: {}\n", message.role, message.content);
    }
    if !conversation.erased_messages().is_empty() {
        println!("({} earlier messages left the context window)", conversation.erased_messages().len());
    }
    Ok(())
}

fn init_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        "debug"
    } else {
        "info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter))
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_generated_once_when_omitted() {
        let id = session_conversation_id(String::new());
        assert!(Uuid::parse_str(&id).is_ok());
        assert_eq!(session_conversation_id(id.clone()), id);
    }

    #[test]
    fn test_session_id_keeps_requested() {
        assert_eq!(session_conversation_id("chat-1".into()), "chat-1");
    }
}
