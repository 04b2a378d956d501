pub mod postgres;

pub use postgres::{PostgresDeadLetterStore, PostgresScoredApplicationStore};
