//! Bounded body collection.

use crate::upstream::{UpstreamError, UpstreamResponse};

/// Result of reading a body up to a limit.
#[derive(Debug, PartialEq)]
pub enum Collected {
    Complete(Vec<u8>),
    /// The limit was crossed; holds what was read so far. The rest is still
    /// in the response stream.
    Overflow(Vec<u8>),
}

pub async fn collect_bounded(response: &mut UpstreamResponse, limit: usize) -> Result<Collected, UpstreamError> {
    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        body.extend_from_slice(&chunk);
        if body.len() > limit {
            return Ok(Collected::Overflow(body));
        }
    }
    Ok(Collected::Complete(body))
}
