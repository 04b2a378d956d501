pub mod postgres_dead_letter_store;
pub mod postgres_scored_application_store;

pub use postgres_dead_letter_store::PostgresDeadLetterStore;
pub use postgres_scored_application_store::PostgresScoredApplicationStore;
