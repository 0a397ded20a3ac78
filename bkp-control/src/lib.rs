//! Control-plane client contract the engine consumes: recovery-point CRUD,
//! activity updates, credential issuance and restore-session-key rotation.
//! The HTTP implementation signs every request with the `VBS` scheme in
//! `signing::sign`.

mod contract;
mod credential_refresher;
mod http_client;
mod signing;

pub use contract::{
    ControlPlaneClient, CreateRecoveryPointRequest, CreateRecoveryPointResponse, VaultDescriptor,
};
pub use credential_refresher::ControlPlaneCredentialRefresher;
pub use http_client::HttpControlPlaneClient;
pub use signing::sign;
