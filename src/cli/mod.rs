//! Command-line interface parsing and handling
//!
//! This module parses command-line arguments and wires a [`Session`]
//! over the platform keyring and a shared HTTP transport.

pub mod model_list;
pub mod provider_list;
pub mod say;

use std::error::Error;
use std::io::{self, BufRead, Write};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::cli::model_list::list_models;
use crate::cli::provider_list::list_providers;
use crate::cli::say::run_say;
use crate::core::config::Config;
use crate::core::credentials::KeyringStore;
use crate::core::session::Session;
use crate::core::transport::ReqwestTransport;
use crate::core::validation::ValidationState;

fn version_string() -> &'static str {
    use std::sync::OnceLock;
    static VERSION: OnceLock<String> = OnceLock::new();
    VERSION
        .get_or_init(|| {
            format!(
                "{} ({})",
                env!("CARGO_PKG_VERSION"),
                option_env!("VERGEN_GIT_DESCRIBE").unwrap_or("unknown")
            )
        })
        .as_str()
}

#[derive(Parser)]
#[command(name = "palaver")]
#[command(version = version_string())]
#[command(about = "A conversation gateway for remote AI APIs")]
#[command(
    long_about = "Palaver routes chat messages to the provider behind the selected model, \
validates stored API keys against each provider's probe endpoint, archives \
conversations under generated titles, and forwards audio recordings to a \
transcription-capable provider.\n\n\
Authentication:\n\
  Use 'palaver auth <provider>' to store an API key securely in your system keyring.\n\
  Built-in providers: google, openai, openrouter, cerebras, lemonfox."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Store an API key for a provider
    Auth {
        /// Provider id (see `palaver providers`)
        provider: String,
    },
    /// Remove a stored API key
    Deauth {
        /// Provider id
        provider: String,
    },
    /// List providers with credential and validation status
    Providers,
    /// List registered models
    Models {
        /// Only show quick-access models, in selector order
        #[arg(long)]
        quick: bool,
    },
    /// Send a one-shot message and print the reply
    Say {
        /// Model id to route through
        #[arg(short, long)]
        model: Option<String>,
        /// The message to send
        prompt: Vec<String>,
    },
}

pub fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    tokio::runtime::Runtime::new()?.block_on(async_main())
}

async fn async_main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let config = Config::load()?;
    let transport = Arc::new(ReqwestTransport::new()?);
    let session = Session::new(config, Box::new(KeyringStore::new()), transport)
        .with_history_path(Config::history_path());
    if let Err(err) = session.load_history().await {
        eprintln!("⚠️  Could not load conversation history: {err}");
    }

    match args.command {
        Commands::Auth { provider } => run_auth(&session, &provider).await,
        Commands::Deauth { provider } => {
            session.clear_credential(&provider)?;
            println!("✓ Credential removed for {provider}");
            Ok(())
        }
        Commands::Providers => list_providers(&session).await,
        Commands::Models { quick } => {
            session.validate_all().await;
            list_models(&session, quick);
            Ok(())
        }
        Commands::Say { model, prompt } => run_say(&session, model, prompt).await,
    }
}

async fn run_auth(session: &Session, provider_id: &str) -> Result<(), Box<dyn Error>> {
    let provider = session
        .catalog()
        .find(provider_id)
        .ok_or_else(|| format!("unknown provider '{provider_id}'"))?;

    print!("Enter API key for {}: ", provider.display_name);
    io::stdout().flush()?;
    let mut secret = String::new();
    io::stdin().lock().read_line(&mut secret)?;
    let secret = secret.trim();
    if secret.is_empty() {
        return Err("API key cannot be empty".into());
    }

    let display_name = provider.display_name.clone();
    match session.set_credential(provider_id, secret).await? {
        ValidationState::Valid => {
            println!("✓ Key stored and validated for {display_name}");
        }
        _ => {
            println!(
                "⚠️  Key stored for {display_name}, but the provider rejected it. \
Models of this provider stay unselectable until a valid key is stored."
            );
        }
    }
    Ok(())
}
