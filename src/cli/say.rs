//! TUI-less one-shot send.

use std::error::Error;

use crate::core::gateway::SendPhase;
use crate::core::session::Session;

/// Model routed to when neither the flag nor the config picks one.
const DEFAULT_MODEL_ID: &str = "gemini-2.0-flash-exp";

pub async fn run_say(
    session: &Session,
    model: Option<String>,
    prompt: Vec<String>,
) -> Result<(), Box<dyn Error>> {
    let prompt = prompt.join(" ");
    if prompt.trim().is_empty() {
        eprintln!("Usage: palaver say <prompt>");
        std::process::exit(1);
    }

    let model_id = model
        .or_else(|| session.config().selected_model.clone())
        .unwrap_or_else(|| DEFAULT_MODEL_ID.to_string());

    session.validate_all().await;

    let outcome = session.send(&model_id, &prompt).await?;
    println!("{}", outcome.message.text);

    if outcome.phase == SendPhase::Failed {
        std::process::exit(1);
    }
    Ok(())
}
