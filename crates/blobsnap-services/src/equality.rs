//! Pluggable equivalence checks.
//!
//! The decision engine only consults a strategy after the MD5 comparison has
//! already found the candidate and the latest content to differ byte-wise.

use async_trait::async_trait;
use blobsnap_storage::StorageResult;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Decides whether two differing contents should still count as the same.
#[async_trait]
pub trait EqualityStrategy: Send + Sync {
    /// `candidate` is positioned at its start; `latest` is the current latest
    /// object's content, unread.
    async fn equivalent(
        &self,
        candidate: &mut (dyn AsyncRead + Send + Unpin),
        latest: &mut (dyn AsyncRead + Send + Unpin),
    ) -> StorageResult<bool>;
}

async fn read_both(
    candidate: &mut (dyn AsyncRead + Send + Unpin),
    latest: &mut (dyn AsyncRead + Send + Unpin),
) -> StorageResult<(Vec<u8>, Vec<u8>)> {
    let mut candidate_bytes = Vec::new();
    candidate.read_to_end(&mut candidate_bytes).await?;
    let mut latest_bytes = Vec::new();
    latest.read_to_end(&mut latest_bytes).await?;
    Ok((candidate_bytes, latest_bytes))
}

/// Treats two JSON documents as equivalent when they parse to the same value,
/// ignoring formatting and object key order. Content that is not valid JSON
/// is never equivalent to anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonEquality;

#[async_trait]
impl EqualityStrategy for JsonEquality {
    async fn equivalent(
        &self,
        candidate: &mut (dyn AsyncRead + Send + Unpin),
        latest: &mut (dyn AsyncRead + Send + Unpin),
    ) -> StorageResult<bool> {
        let (candidate, latest) = read_both(candidate, latest).await?;

        let parsed = (
            serde_json::from_slice::<serde_json::Value>(&candidate),
            serde_json::from_slice::<serde_json::Value>(&latest),
        );
        match parsed {
            (Ok(candidate), Ok(latest)) => Ok(candidate == latest),
            (candidate, latest) => {
                tracing::debug!(
                    candidate_valid = candidate.is_ok(),
                    latest_valid = latest.is_ok(),
                    "JSON equality skipped: content is not valid JSON"
                );
                Ok(false)
            }
        }
    }
}

/// Adapts a closure over the two complete contents into a strategy.
///
/// Both contents are buffered in memory before the closure runs.
pub struct FnEquality<F>(pub F);

#[async_trait]
impl<F> EqualityStrategy for FnEquality<F>
where
    F: Fn(&[u8], &[u8]) -> bool + Send + Sync,
{
    async fn equivalent(
        &self,
        candidate: &mut (dyn AsyncRead + Send + Unpin),
        latest: &mut (dyn AsyncRead + Send + Unpin),
    ) -> StorageResult<bool> {
        let (candidate, latest) = read_both(candidate, latest).await?;
        Ok((self.0)(&candidate, &latest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn check(strategy: &dyn EqualityStrategy, a: &str, b: &str) -> bool {
        let mut a = a.as_bytes();
        let mut b = b.as_bytes();
        strategy.equivalent(&mut a, &mut b).await.unwrap()
    }

    #[tokio::test]
    async fn json_ignores_formatting_and_key_order() {
        assert!(check(&JsonEquality, r#"{"a":1,"b":[1,2]}"#, "{ \"b\": [1, 2],\n  \"a\": 1 }").await);
        assert!(!check(&JsonEquality, r#"{"a":1}"#, r#"{"a":2}"#).await);
        assert!(!check(&JsonEquality, r#"{"b":[2,1]}"#, r#"{"b":[1,2]}"#).await);
    }

    #[tokio::test]
    async fn invalid_json_is_never_equivalent() {
        assert!(!check(&JsonEquality, "not json", "not json").await);
        assert!(!check(&JsonEquality, "{}", "{").await);
    }

    #[tokio::test]
    async fn closure_strategy_sees_full_contents() {
        let ignore_case = FnEquality(|a: &[u8], b: &[u8]| a.eq_ignore_ascii_case(b));
        assert!(check(&ignore_case, "Hello", "hELLO").await);
        assert!(!check(&ignore_case, "Hello", "world").await);
    }
}
