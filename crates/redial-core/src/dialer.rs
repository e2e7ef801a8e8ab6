//! Outbound call initiation
//!
//! The core never speaks a telephony protocol. A [`Dialer`] hands the number
//! to whatever call-initiation facility the host provides and returns as soon
//! as the request has been issued. The orchestrator does not retry a failed
//! invocation; a [`RedialError::CapabilityMissing`] is reported once as a
//! notice and the run carries on without the dialer.

use async_trait::async_trait;

use crate::error::RedialResult;

#[cfg(doc)]
use crate::error::RedialError;

/// Host facility that places outgoing calls
#[async_trait]
pub trait Dialer: Send + Sync {
    /// Request a call to `number`
    ///
    /// Fire-and-forget: success only means the request was handed over.
    async fn place_call(&self, number: &str) -> RedialResult<()>;
}
