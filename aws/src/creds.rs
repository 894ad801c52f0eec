//! Assume-role credential cache (spec.md §6 `--aws-role-arn`, §9): refreshes
//! cross-account credentials ahead of their expiry and de-duplicates
//! concurrent refreshes for the same role ARN so a burst of reconciler
//! calls doesn't fan out into a burst of `sts:AssumeRole` calls.

use aws_sdk_sts::config::Credentials;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// How far ahead of the STS-reported expiry we consider credentials stale.
/// Refreshing early absorbs clock skew and in-flight request latency so a
/// call never starts with credentials that expire mid-request.
const EARLY_EXPIRY: Duration = Duration::from_secs(30);

struct Cached {
    credentials: Credentials,
    expires_at: Instant,
}

/// One cache slot per role ARN. The `Mutex` itself is the single-flight
/// guard: whoever holds it either finds a still-fresh value or performs the
/// one refresh everyone else is waiting on.
#[derive(Default)]
pub struct AssumeRoleCache {
    slots: Mutex<HashMap<String, Arc<Mutex<Option<Cached>>>>>,
}

impl AssumeRoleCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns cached credentials for `role_arn` if they won't expire within
    /// [`EARLY_EXPIRY`], otherwise calls `assume` to refresh them. `assume`
    /// is only invoked by the single caller that wins the per-ARN lock; every
    /// concurrent caller for the same ARN waits on that result instead of
    /// issuing its own `AssumeRole` call.
    pub async fn get_or_refresh<F, Fut>(&self, role_arn: &str, assume: F) -> Result<Credentials, crate::error::ClientError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<(Credentials, Instant), crate::error::ClientError>>,
    {
        let slot = {
            let mut slots = self.slots.lock().await;
            slots.entry(role_arn.to_string()).or_insert_with(|| Arc::new(Mutex::new(None))).clone()
        };

        let mut guard = slot.lock().await;
        if let Some(cached) = guard.as_ref() {
            if cached.expires_at.saturating_duration_since(Instant::now()) > EARLY_EXPIRY {
                return Ok(cached.credentials.clone());
            }
        }

        let (credentials, expires_at) = assume().await?;
        *guard = Some(Cached {
            credentials: credentials.clone(),
            expires_at,
        });
        Ok(credentials)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn creds() -> Credentials {
        Credentials::new("AKIA", "secret", None, None, "test")
    }

    #[tokio::test]
    async fn refreshes_once_when_cache_empty() {
        let cache = AssumeRoleCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let result = cache
            .get_or_refresh("arn:aws:iam::123:role/x", || async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok((creds(), Instant::now() + Duration::from_secs(900)))
            })
            .await;
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn serves_from_cache_when_fresh() {
        let cache = AssumeRoleCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let c = calls.clone();
            cache
                .get_or_refresh("arn:aws:iam::123:role/x", || async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok((creds(), Instant::now() + Duration::from_secs(900)))
                })
                .await
                .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn refreshes_again_once_near_expiry() {
        let cache = AssumeRoleCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        cache
            .get_or_refresh("arn", || async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok((creds(), Instant::now() + Duration::from_secs(1)))
            })
            .await
            .unwrap();
        let c = calls.clone();
        cache
            .get_or_refresh("arn", || async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok((creds(), Instant::now() + Duration::from_secs(900)))
            })
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
