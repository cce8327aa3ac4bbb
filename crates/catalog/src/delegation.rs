//! One-time link registry.
//!
//! A link token grants downloads of a single catalog entry until it expires
//! or runs out of uses. Tokens hold only the entry identifier; resolving the
//! entry again at download time is the caller's job.
//!
//! ## Lifecycle
//!
//! `Valid` on issue, `Expired` once the clock passes `expires_at`, `Exhausted`
//! once `remaining_uses` reaches zero. Expiry is checked lazily on validation.
//! Spent tokens stay in the registry as inert records.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::error::{CatalogError, Result};
use crate::ids::generate_link_token;
use crate::store::CatalogStore;

/// An issued one-time link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegationToken {
    pub token: String,
    pub entry_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub remaining_uses: i64,
}

impl DelegationToken {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining_uses <= 0
    }
}

/// Registry of issued links.
#[derive(Debug, Default)]
pub struct DelegationRegistry {
    tokens: Mutex<HashMap<String, DelegationToken>>,
}

impl DelegationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues a link for `entry_id` valid for `ttl_minutes` and `max_uses`.
    pub fn issue(
        &self,
        catalog: &CatalogStore,
        entry_id: Uuid,
        ttl_minutes: i64,
        max_uses: i64,
    ) -> Result<String> {
        self.issue_at(catalog, entry_id, ttl_minutes, max_uses, Utc::now())
    }

    /// Issues a link as if the current time were `now`.
    pub fn issue_at(
        &self,
        catalog: &CatalogStore,
        entry_id: Uuid,
        ttl_minutes: i64,
        max_uses: i64,
        now: DateTime<Utc>,
    ) -> Result<String> {
        if ttl_minutes <= 0 {
            return Err(CatalogError::InvalidArgument(format!(
                "expires must be a positive number of minutes, got {ttl_minutes}"
            )));
        }
        if max_uses <= 0 {
            return Err(CatalogError::InvalidArgument(format!(
                "maxdownloads must be a positive integer, got {max_uses}"
            )));
        }
        let ttl = Duration::try_minutes(ttl_minutes).ok_or_else(|| {
            CatalogError::InvalidArgument(format!("expires is out of range: {ttl_minutes}"))
        })?;
        let expires_at = now.checked_add_signed(ttl).ok_or_else(|| {
            CatalogError::InvalidArgument(format!("expires is out of range: {ttl_minutes}"))
        })?;

        catalog.by_id(entry_id)?;

        let mut tokens = self.tokens.lock();
        let token = loop {
            let candidate = generate_link_token();
            if !tokens.contains_key(&candidate) {
                break candidate;
            }
        };
        tokens.insert(
            token.clone(),
            DelegationToken {
                token: token.clone(),
                entry_id,
                created_at: now,
                expires_at,
                remaining_uses: max_uses,
            },
        );

        log::debug!(
            "issued link for entry {entry_id} expires_at={expires_at} max_uses={max_uses}"
        );
        Ok(token)
    }

    /// Consumes one use of `token` and returns the bound entry id.
    pub fn validate(&self, token: &str) -> Result<Uuid> {
        self.validate_at(token, Utc::now())
    }

    /// Consumes one use of `token` as if the current time were `now`.
    ///
    /// The checks and the decrement happen under one lock, so a token with a
    /// single use left admits exactly one caller.
    pub fn validate_at(&self, token: &str, now: DateTime<Utc>) -> Result<Uuid> {
        let mut tokens = self.tokens.lock();
        let record = tokens
            .get_mut(token)
            .ok_or_else(|| CatalogError::NotFound("link".to_string()))?;

        if record.is_expired_at(now) {
            return Err(CatalogError::Expired);
        }
        if record.is_exhausted() {
            return Err(CatalogError::Exhausted);
        }
        record.remaining_uses -= 1;

        log::debug!(
            "consumed link for entry {} remaining_uses={}",
            record.entry_id,
            record.remaining_uses
        );
        Ok(record.entry_id)
    }

    /// Returns a copy of the record for `token`, if any.
    pub fn get(&self, token: &str) -> Option<DelegationToken> {
        self.tokens.lock().get(token).cloned()
    }

    /// Number of tokens held, spent ones included.
    pub fn len(&self) -> usize {
        self.tokens.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Barrier;
    use tempfile::TempDir;

    fn catalog_with_file() -> (TempDir, CatalogStore, Uuid) {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("drive");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("a.txt"), b"hello").unwrap();
        let catalog = CatalogStore::new(root);
        catalog.scan();
        let id = catalog
            .all()
            .into_iter()
            .find(|entry| entry.name == "a.txt")
            .expect("indexed")
            .id;
        (temp, catalog, id)
    }

    #[test]
    fn exactly_max_uses_validations_succeed() {
        let (_temp, catalog, id) = catalog_with_file();
        let registry = DelegationRegistry::new();
        let token = registry.issue(&catalog, id, 60, 3).expect("issue");

        for _ in 0..3 {
            assert_eq!(registry.validate(&token).expect("valid"), id);
        }
        let error = registry.validate(&token).expect_err("spent");
        assert!(matches!(error, CatalogError::Exhausted));
        assert_eq!(registry.get(&token).unwrap().remaining_uses, 0);
    }

    #[test]
    fn validation_after_ttl_is_expired() {
        let (_temp, catalog, id) = catalog_with_file();
        let registry = DelegationRegistry::new();
        let issued = Utc::now();
        let token = registry
            .issue_at(&catalog, id, 60, 5, issued)
            .expect("issue");

        let inside = issued + Duration::minutes(59);
        assert_eq!(registry.validate_at(&token, inside).unwrap(), id);

        let after = issued + Duration::minutes(61);
        let error = registry.validate_at(&token, after).expect_err("expired");
        assert!(matches!(error, CatalogError::Expired));
        assert_eq!(registry.get(&token).unwrap().remaining_uses, 4);
    }

    #[test]
    fn expiry_wins_over_exhaustion() {
        let (_temp, catalog, id) = catalog_with_file();
        let registry = DelegationRegistry::new();
        let issued = Utc::now();
        let token = registry.issue_at(&catalog, id, 1, 1, issued).unwrap();
        registry.validate_at(&token, issued).unwrap();

        let error = registry
            .validate_at(&token, issued + Duration::minutes(2))
            .expect_err("spent and expired");
        assert!(matches!(error, CatalogError::Expired));
    }

    #[test]
    fn unknown_token_is_not_found() {
        let registry = DelegationRegistry::new();
        let error = registry.validate("nope").expect_err("unknown");
        assert!(matches!(error, CatalogError::NotFound(_)));
    }

    #[test]
    fn issue_rejects_bad_arguments() {
        let (_temp, catalog, id) = catalog_with_file();
        let registry = DelegationRegistry::new();

        for (ttl, uses) in [(0, 1), (-5, 1), (60, 0), (60, -1)] {
            let error = registry.issue(&catalog, id, ttl, uses).expect_err("bad args");
            assert!(matches!(error, CatalogError::InvalidArgument(_)));
        }
        let error = registry
            .issue(&catalog, id, i64::MAX, 1)
            .expect_err("ttl overflow");
        assert!(matches!(error, CatalogError::InvalidArgument(_)));

        let error = registry
            .issue(&catalog, Uuid::new_v4(), 60, 1)
            .expect_err("unknown entry");
        assert!(matches!(error, CatalogError::NotFound(_)));
        assert!(registry.is_empty());
    }

    #[test]
    fn issued_tokens_are_unique() {
        let (_temp, catalog, id) = catalog_with_file();
        let registry = DelegationRegistry::new();
        let first = registry.issue(&catalog, id, 60, 1).unwrap();
        let second = registry.issue(&catalog, id, 60, 1).unwrap();
        assert_ne!(first, second);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn concurrent_validation_admits_one_caller() {
        let (_temp, catalog, id) = catalog_with_file();
        let registry = DelegationRegistry::new();

        for _ in 0..50 {
            let token = registry.issue(&catalog, id, 60, 1).unwrap();
            let barrier = Barrier::new(2);
            let results: Vec<Result<Uuid>> = std::thread::scope(|scope| {
                let handles: Vec<_> = (0..2)
                    .map(|_| {
                        scope.spawn(|| {
                            barrier.wait();
                            registry.validate(&token)
                        })
                    })
                    .collect();
                handles.into_iter().map(|h| h.join().unwrap()).collect()
            });

            let admitted = results.iter().filter(|r| r.is_ok()).count();
            assert_eq!(admitted, 1);
            assert!(results
                .iter()
                .any(|r| matches!(r, Err(CatalogError::Exhausted))));
        }
    }
}
