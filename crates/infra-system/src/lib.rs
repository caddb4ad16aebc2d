// Harvest Infrastructure - System Adapters
// Implements: ProducerSource (external scraper process, JSONL export file)

pub mod command_producer;
pub mod jsonl_producer;

pub use command_producer::{CommandProducerSource, CommandSpec};
pub use jsonl_producer::JsonlFileSource;
