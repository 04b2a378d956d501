pub mod database;
pub mod factory;
pub mod in_memory_queue;
pub mod memory_ledger;
pub mod memory_store;
pub mod message_queue;
pub mod redis_ledger;

pub use database::*;
pub use factory::{LedgerFactory, QueueFactory};
pub use in_memory_queue::InMemoryApplicationQueue;
pub use memory_ledger::InMemoryLedger;
pub use memory_store::{InMemoryDeadLetterSink, InMemoryScoredApplicationStore};
pub use message_queue::RabbitMqApplicationQueue;
pub use redis_ledger::RedisLedger;
