// HTTP APIs for the integration core

mod dead_letter;
mod ingestion;

pub use dead_letter::{create_dead_letter_router, DeadLetterAppState};
pub use ingestion::{create_router, AppState};
