use crate::error::StoreError;
use crate::model::DomainId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tracing::warn;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Source of stable domain identifiers.
///
/// Implementations must be idempotent (the same domain always maps to the
/// same id, including under concurrent first-time assignment) and must never
/// hand out an id already bound to another domain.
pub trait DomainIdStore: Send + Sync {
    fn get_domain_id(&self, domain: &str) -> StoreResult<DomainId>;

    /// Resolve many domains at once. The result is order-corresponding to
    /// `domains`.
    fn get_domain_ids(&self, domains: &[&str]) -> StoreResult<Vec<DomainId>> {
        domains
            .iter()
            .map(|domain| self.get_domain_id(domain))
            .collect()
    }
}

impl<S: DomainIdStore + ?Sized> DomainIdStore for Arc<S> {
    fn get_domain_id(&self, domain: &str) -> StoreResult<DomainId> {
        (**self).get_domain_id(domain)
    }

    fn get_domain_ids(&self, domains: &[&str]) -> StoreResult<Vec<DomainId>> {
        (**self).get_domain_ids(domains)
    }
}

/// Process-local identifier store. Ids start at 1 and grow monotonically.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    ids: HashMap<String, DomainId>,
    last_id: DomainId,
}

impl MemoryState {
    fn assign(&mut self, domain: &str) -> DomainId {
        if let Some(id) = self.ids.get(domain) {
            return *id;
        }
        self.last_id += 1;
        self.ids.insert(domain.to_string(), self.last_id);
        self.last_id
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, domain: &str) -> StoreResult<Option<DomainId>> {
        let state = self.state.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(state.ids.get(domain).copied())
    }

    pub fn domain_count(&self) -> StoreResult<usize> {
        let state = self.state.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(state.ids.len())
    }
}

impl DomainIdStore for MemoryStore {
    fn get_domain_id(&self, domain: &str) -> StoreResult<DomainId> {
        let mut state = self.state.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(state.assign(domain))
    }

    fn get_domain_ids(&self, domains: &[&str]) -> StoreResult<Vec<DomainId>> {
        let mut state = self.state.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(domains.iter().map(|domain| state.assign(domain)).collect())
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total tries per request, including the first.
    pub attempts: u32,
    /// Delay before the first retry; doubled after every failed retry.
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, backoff: Duration) -> Self {
        Self { attempts, backoff }
    }

    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(100))
    }
}

/// Retries transient store failures with exponential backoff.
///
/// Non-transient errors and the error of the last attempt are returned
/// unchanged.
pub struct Retrying<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: DomainIdStore> Retrying<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn run<T>(&self, op: &str, f: impl Fn(&S) -> StoreResult<T>) -> StoreResult<T> {
        let attempts = self.policy.attempts.max(1);
        let mut delay = self.policy.backoff;
        let mut attempt = 1;

        loop {
            match f(&self.inner) {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < attempts => {
                    warn!(
                        "{} failed (attempt {}/{}), retrying in {:?}: {}",
                        op, attempt, attempts, delay, e
                    );
                    thread::sleep(delay);
                    delay = delay.saturating_mul(2);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl<S: DomainIdStore> DomainIdStore for Retrying<S> {
    fn get_domain_id(&self, domain: &str) -> StoreResult<DomainId> {
        self.run("Domain id lookup", |store| store.get_domain_id(domain))
    }

    fn get_domain_ids(&self, domains: &[&str]) -> StoreResult<Vec<DomainId>> {
        self.run("Batch domain id lookup", |store| store.get_domain_ids(domains))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails with a transient error for the first `failures` calls.
    struct FlakyStore {
        failures: u32,
        calls: AtomicU32,
        inner: MemoryStore,
    }

    impl FlakyStore {
        fn new(failures: u32) -> Self {
            Self {
                failures,
                calls: AtomicU32::new(0),
                inner: MemoryStore::new(),
            }
        }
    }

    impl DomainIdStore for FlakyStore {
        fn get_domain_id(&self, domain: &str) -> StoreResult<DomainId> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(StoreError::Unavailable("connection reset".to_string()));
            }
            self.inner.get_domain_id(domain)
        }
    }

    struct BrokenStore;

    impl DomainIdStore for BrokenStore {
        fn get_domain_id(&self, _domain: &str) -> StoreResult<DomainId> {
            Err(StoreError::BatchMismatch {
                requested: 1,
                returned: 0,
            })
        }
    }

    fn fast_policy(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::from_millis(1))
    }

    #[test]
    fn test_memory_store_is_idempotent() {
        let store = MemoryStore::new();
        let a = store.get_domain_id("a.com").unwrap();
        let b = store.get_domain_id("b.com").unwrap();

        assert_ne!(a, b);
        assert_eq!(store.get_domain_id("a.com").unwrap(), a);
        assert_eq!(store.domain_count().unwrap(), 2);
    }

    #[test]
    fn test_memory_store_batch_is_order_corresponding() {
        let store = MemoryStore::new();
        let c = store.get_domain_id("c.com").unwrap();

        let ids = store.get_domain_ids(&["a.com", "c.com", "b.com", "a.com"]).unwrap();

        assert_eq!(ids.len(), 4);
        assert_eq!(ids[1], c);
        assert_eq!(ids[0], ids[3]);
        assert_eq!(store.lookup("b.com").unwrap(), Some(ids[2]));
        assert!(ids.iter().all(|id| *id >= 0));
    }

    #[test]
    fn test_memory_store_concurrent_assignment() {
        let store = Arc::new(MemoryStore::new());

        let results: Vec<Vec<DomainId>> = thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let store = store.clone();
                    scope.spawn(move || {
                        store
                            .get_domain_ids(&["x.com", "y.com", "z.com"])
                            .unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(results.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(store.domain_count().unwrap(), 3);
    }

    #[test]
    fn test_memory_store_reports_poisoned_lock() {
        let store = Arc::new(MemoryStore::new());
        store.get_domain_id("a.com").unwrap();

        let holder = store.clone();
        let _ = thread::spawn(move || {
            let _state = holder.state.lock().unwrap();
            panic!("worker died holding the store lock");
        })
        .join();

        assert!(matches!(store.domain_count(), Err(StoreError::Poisoned)));
        assert!(matches!(store.lookup("a.com"), Err(StoreError::Poisoned)));
    }

    #[test]
    fn test_retrying_recovers_from_transient_errors() {
        let store = Retrying::new(FlakyStore::new(2), fast_policy(3));

        let id = store.get_domain_id("a.com").unwrap();

        assert_eq!(store.inner().calls.load(Ordering::SeqCst), 3);
        assert_eq!(store.get_domain_id("a.com").unwrap(), id);
    }

    #[test]
    fn test_retrying_gives_up_after_last_attempt() {
        let store = Retrying::new(FlakyStore::new(10), fast_policy(3));

        let result = store.get_domain_id("a.com");

        assert!(matches!(result, Err(StoreError::Unavailable(_))));
        assert_eq!(store.inner().calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_retrying_does_not_retry_permanent_errors() {
        let store = Retrying::new(BrokenStore, fast_policy(5));
        let result = store.get_domain_ids(&["a.com"]);

        assert!(matches!(result, Err(StoreError::BatchMismatch { .. })));
    }

    #[test]
    fn test_retry_policy_zero_attempts_still_tries_once() {
        let store = Retrying::new(MemoryStore::new(), fast_policy(0));
        assert!(store.get_domain_id("a.com").is_ok());
    }
}
