//! Expiring session state
//!
//! [`TtlCache`] is a concurrent map whose entries disappear once their time to
//! live has elapsed. [`SessionStore`] layers typed accessors on top of it so
//! handlers never deal with untyped cached values.

use dashmap::DashMap;
use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::types::BusinessGroup;

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// Concurrent map with per-entry expiry.
///
/// Expired entries are never returned. They are dropped lazily on read and in
/// bulk by [`TtlCache::purge_expired`].
pub struct TtlCache<K, V> {
    entries: DashMap<K, Entry<V>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Store `value` until `now + ttl`, replacing any previous entry
    pub fn put(&self, key: K, value: V, ttl: Duration) {
        let expires_at = Instant::now() + ttl;
        self.entries.insert(key, Entry { value, expires_at });
    }

    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = Instant::now();
        {
            let entry = self.entries.get(key)?;
            if entry.expires_at > now {
                return Some(entry.value.clone());
            }
        }
        // Only drop it if nobody refreshed the key in the meantime.
        self.entries.remove_if(key, |_, entry| entry.expires_at <= now);
        None
    }

    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.remove(key).map(|(_, entry)| entry.value)
    }

    /// Remove every expired entry, returning how many were dropped
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let keep = entry.expires_at > now;
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    /// Number of stored entries, including expired ones not yet purged
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> Default for TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum SessionKey {
    AccessToken,
    BusinessGroup,
    Environments,
}

#[derive(Clone)]
enum SessionValue {
    Token(String),
    BusinessGroup(BusinessGroup),
    Environments {
        org_id: String,
        map: Arc<HashMap<String, String>>,
    },
}

/// Lifetimes of the cached session values
#[derive(Debug, Clone, Copy)]
pub struct SessionTtl {
    pub token: Duration,
    pub selection: Duration,
}

impl Default for SessionTtl {
    fn default() -> Self {
        Self {
            token: Duration::from_secs(3600),
            selection: Duration::from_secs(10 * 3600),
        }
    }
}

/// Process-wide session: access token, selected business group and the
/// environment name to id mapping of one organization. Last write wins on
/// every field.
pub struct SessionStore {
    cache: TtlCache<SessionKey, SessionValue>,
    ttl: SessionTtl,
}

impl SessionStore {
    pub fn new(ttl: SessionTtl) -> Self {
        Self {
            cache: TtlCache::new(),
            ttl,
        }
    }

    pub fn set_access_token(&self, token: String) {
        debug!("Caching access token for {:?}", self.ttl.token);
        self.cache
            .put(SessionKey::AccessToken, SessionValue::Token(token), self.ttl.token);
    }

    /// Cache a fresh login's token and forget the previous login's business
    /// group and environments.
    pub fn start_session(&self, token: String) {
        self.set_access_token(token);
        self.cache.remove(&SessionKey::BusinessGroup);
        self.cache.remove(&SessionKey::Environments);
    }

    pub fn access_token(&self) -> Option<String> {
        match self.cache.get(&SessionKey::AccessToken)? {
            SessionValue::Token(token) => Some(token),
            _ => None,
        }
    }

    pub fn select_business_group(&self, group: BusinessGroup) {
        debug!("Caching business group {} ({})", group.name, group.id);
        self.cache.put(
            SessionKey::BusinessGroup,
            SessionValue::BusinessGroup(group),
            self.ttl.selection,
        );
    }

    pub fn business_group(&self) -> Option<BusinessGroup> {
        match self.cache.get(&SessionKey::BusinessGroup)? {
            SessionValue::BusinessGroup(group) => Some(group),
            _ => None,
        }
    }

    /// Replace the whole environment mapping with `org_id`'s; names from an
    /// earlier listing that are absent now are forgotten.
    pub fn replace_environments(&self, org_id: &str, environments: HashMap<String, String>) {
        debug!("Caching {} environment id(s) of {}", environments.len(), org_id);
        self.cache.put(
            SessionKey::Environments,
            SessionValue::Environments {
                org_id: org_id.to_string(),
                map: Arc::new(environments),
            },
            self.ttl.selection,
        );
    }

    /// Cached mapping of `org_id`. A mapping listed for another organization
    /// counts as absent.
    pub fn environments(&self, org_id: &str) -> Option<Arc<HashMap<String, String>>> {
        match self.cache.get(&SessionKey::Environments)? {
            SessionValue::Environments { org_id: owner, map } if owner == org_id => Some(map),
            _ => None,
        }
    }

    pub fn environment_id(&self, org_id: &str, name: &str) -> Option<String> {
        self.environments(org_id)?.get(name).cloned()
    }

    pub fn purge_expired(&self) -> usize {
        self.cache.purge_expired()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(SessionTtl::default())
    }
}

/// Purge expired session entries every `interval` until `cancel` fires
pub fn spawn_janitor(
    store: Arc<SessionStore>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let removed = store.purge_expired();
                    if removed > 0 {
                        debug!("Purged {} expired session entries", removed);
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_get_returns_value_before_expiry() {
        let cache = TtlCache::new();
        cache.put("access_token", "t1".to_string(), Duration::from_secs(10));

        tokio::time::advance(Duration::from_secs(9)).await;
        assert_eq!(cache.get("access_token"), Some("t1".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_key_is_not_found_despite_other_writes() {
        let cache = TtlCache::new();
        cache.put("first".to_string(), 1, Duration::from_secs(5));

        for i in 0..50 {
            cache.put(format!("other-{}", i), i, Duration::from_secs(60));
            tokio::time::advance(Duration::from_millis(100)).await;
        }

        assert_eq!(cache.get("first"), None);
        assert_eq!(cache.get("other-49"), Some(49));
    }

    #[tokio::test(start_paused = true)]
    async fn test_put_overwrites_and_extends_expiry() {
        let cache = TtlCache::new();
        cache.put("k", "old", Duration::from_secs(5));
        tokio::time::advance(Duration::from_secs(4)).await;
        cache.put("k", "new", Duration::from_secs(5));
        tokio::time::advance(Duration::from_secs(3)).await;

        assert_eq!(cache.get("k"), Some("new"));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired_drops_only_stale_entries() {
        let cache = TtlCache::new();
        cache.put("short", 1, Duration::from_secs(1));
        cache.put("long", 2, Duration::from_secs(100));
        tokio::time::advance(Duration::from_secs(2)).await;

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("long"), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_expires_before_selection() {
        let store = SessionStore::new(SessionTtl {
            token: Duration::from_secs(60),
            selection: Duration::from_secs(600),
        });
        store.set_access_token("tok".to_string());
        store.select_business_group(BusinessGroup {
            id: "org-1".to_string(),
            name: "Ops".to_string(),
        });

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(store.access_token(), None);
        assert_eq!(store.business_group().map(|g| g.id), Some("org-1".to_string()));
    }

    #[tokio::test]
    async fn test_replace_environments_overwrites_instead_of_merging() {
        let store = SessionStore::default();
        store.replace_environments(
            "org-1",
            HashMap::from([
                ("prod".to_string(), "env-1".to_string()),
                ("sqa".to_string(), "env-2".to_string()),
            ]),
        );
        store.replace_environments(
            "org-1",
            HashMap::from([("prod".to_string(), "env-9".to_string())]),
        );

        assert_eq!(store.environment_id("org-1", "prod"), Some("env-9".to_string()));
        assert_eq!(store.environment_id("org-1", "sqa"), None);
        assert_eq!(store.environments("org-1").map(|m| m.len()), Some(1));
    }

    #[tokio::test]
    async fn test_environments_of_another_org_are_a_miss() {
        let store = SessionStore::default();
        store.replace_environments(
            "org-1",
            HashMap::from([("prod".to_string(), "env-org1-prod".to_string())]),
        );

        assert_eq!(store.environment_id("org-2", "prod"), None);
        assert!(store.environments("org-2").is_none());
        assert_eq!(
            store.environment_id("org-1", "prod"),
            Some("env-org1-prod".to_string())
        );
    }

    #[tokio::test]
    async fn test_start_session_forgets_previous_selection() {
        let store = SessionStore::default();
        store.set_access_token("old".to_string());
        store.select_business_group(BusinessGroup {
            id: "org-1".to_string(),
            name: "Ops".to_string(),
        });
        store.replace_environments(
            "org-1",
            HashMap::from([("prod".to_string(), "env-1".to_string())]),
        );

        store.start_session("new".to_string());

        assert_eq!(store.access_token(), Some("new".to_string()));
        assert_eq!(store.business_group(), None);
        assert!(store.environments("org-1").is_none());
    }

    #[tokio::test]
    async fn test_concurrent_writers_last_write_wins() {
        let store = Arc::new(SessionStore::default());
        let mut tasks = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store.set_access_token(format!("token-{}", i));
                store.access_token()
            }));
        }
        for task in tasks {
            assert!(task.await.unwrap().is_some());
        }
        assert!(store.access_token().unwrap().starts_with("token-"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_janitor_purges_on_interval_and_stops_on_cancel() {
        let store = Arc::new(SessionStore::new(SessionTtl {
            token: Duration::from_secs(1),
            selection: Duration::from_secs(600),
        }));
        store.set_access_token("tok".to_string());
        store.select_business_group(BusinessGroup {
            id: "org-1".to_string(),
            name: "Ops".to_string(),
        });
        let cancel = CancellationToken::new();
        let janitor = spawn_janitor(store.clone(), Duration::from_secs(10), cancel.clone());

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(store.cache.len(), 1);

        cancel.cancel();
        janitor.await.unwrap();
    }
}
