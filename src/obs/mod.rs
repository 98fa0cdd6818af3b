//! OBS websocket (v5) client
//!
//! One authenticated connection is shared by every caller. Requests are
//! correlated with their responses by request id; unsolicited events are
//! dropped.

mod client;
mod error;
mod protocol;
mod requests;

#[cfg(test)]
pub mod testing;

use async_trait::async_trait;
use serde_json::Value;

pub use client::{ObsClient, ObsSettings};
pub use error::ObsError;
pub use requests::*;

/// Anything that can issue an OBS request and hand back its `responseData`.
///
/// `id_prefix` names the caller; implementations may decorate it to keep ids
/// unique on the wire.
#[async_trait]
pub trait Requester: Send + Sync {
    async fn request(
        &self,
        request_type: &str,
        request_data: Option<Value>,
        id_prefix: &str,
    ) -> Result<Value, ObsError>;
}
