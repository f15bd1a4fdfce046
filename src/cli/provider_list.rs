//! `palaver providers` — provider table with validation states.

use std::error::Error;

use crate::core::session::Session;
use crate::core::validation::ValidationState;

fn state_label(state: ValidationState) -> &'static str {
    match state {
        ValidationState::Unknown => "unknown",
        ValidationState::Valid => "valid",
        ValidationState::Invalid => "invalid",
    }
}

pub async fn list_providers(session: &Session) -> Result<(), Box<dyn Error>> {
    session.validate_all().await;

    println!("Available providers:");
    for provider in session.catalog().iter() {
        let state = session.validation_state(&provider.id);
        let mut capabilities = Vec::new();
        if provider.supports_chat() {
            capabilities.push("chat");
        }
        if provider.supports_transcription() {
            capabilities.push("transcription");
        }
        println!(
            "  {:<12} {:<12} key: {:<8} [{}]",
            provider.id,
            provider.display_name,
            state_label(state),
            capabilities.join(", ")
        );
    }
    println!();
    println!("Run 'palaver auth <provider>' to store an API key.");
    Ok(())
}
