//! Object vault client: put/get/head of opaque byte blobs keyed by content
//! digest, wrapped in retry/backoff, credential refresh, integrity-by-ETag
//! and bandwidth shaping.

mod credential;
mod http_vault;
mod rate_limit;
mod retry;
mod vault;

pub use credential::{CredentialCell, CredentialRefresher};
pub use http_vault::HttpObjectVault;
pub use rate_limit::{RateLimiter, ThrottledReader, ThrottledWriter};
pub use retry::{default_backoff, with_retry};
pub use vault::{put_chunk_with_verify, put_metadata, ObjectVault, MULTIPART_THRESHOLD};
