//! `palaver models` — registered model listing.

use crate::core::registry::ModelFilter;
use crate::core::session::Session;
use crate::core::validation::ValidationState;

pub fn list_models(session: &Session, quick_only: bool) {
    let filter = ModelFilter {
        quick_access_only: quick_only,
        ..Default::default()
    };
    let models = session.registry().list(&filter);

    if models.is_empty() {
        println!("No models registered.");
        return;
    }

    println!("Registered models:");
    for model in models {
        let selectable =
            session.validation_state(&model.provider_id) == ValidationState::Valid;
        println!(
            "  [{:^3}] {:<32} {:<40} provider: {:<12}{}",
            model.short_label,
            model.display_label,
            model.id,
            model.provider_id,
            if selectable { "" } else { " (no valid key)" }
        );
    }
}
