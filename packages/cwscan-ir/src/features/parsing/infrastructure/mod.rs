//! Syntax tree producer adapters

mod external_producer;
mod json_tree;
mod syn_producer;

pub use external_producer::{ExternalProducer, DEFAULT_PRODUCER_TIMEOUT};
pub use json_tree::decode_syntax_tree;
pub use syn_producer::{lower_file, SynProducer};
