//! Data model shared between the chunker, datastore, vault, walker and
//! engine crates: recovery points, nodes, indexes, directives and the
//! error taxonomy used to drive retry/refresh decisions.

pub mod activity;
pub mod config;
pub mod credential;
pub mod directive;
pub mod error;
pub mod index;
pub mod node;
pub mod recovery_point;

pub use activity::{ActionState, Activity};
pub use config::AgentConfig;
pub use credential::{AuthRestore, CredentialBundle};
pub use directive::Directive;
pub use error::EngineError;
pub use index::{ChunkManifest, Index};
pub use node::{ChunkRef, Node, NodeAttributes, NodeType};
pub use recovery_point::{RecoveryPoint, RecoveryPointStatus, RecoveryPointType};
