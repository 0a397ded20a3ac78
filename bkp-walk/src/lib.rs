//! Recursive filesystem traversal producing typed [`Node`](bkp_api_types::Node)
//! records with platform attributes, plus the timestamp formatting shared
//! with the backup engine's mtime comparison.

mod attrs;
mod node_builder;
mod time;
mod walker;

pub use attrs::read_attributes;
pub use node_builder::build_node;
pub use time::{format_us, parse_us};
pub use walker::{WalkOutcome, Walker};
