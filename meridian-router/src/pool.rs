//! Per-provider connection slot accounting.
//!
//! The Dispatcher acquires a slot before calling a provider and releases it
//! when the call finishes (success or failure). This is just the
//! `{active, max}` counter the Dispatcher needs to skip a provider whose
//! outstanding requests are already at capacity — the underlying HTTP
//! client already does its own connection pooling.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

struct ProviderSlots {
    active: AtomicUsize,
    max: usize,
}

/// An acquired slot. Releases automatically on drop so a panicking or
/// early-returning call path can never leak a permanently-held slot.
pub struct PoolGuard {
    slots: Arc<ProviderSlots>,
}

impl Drop for PoolGuard {
    fn drop(&mut self) {
        self.slots.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Tracks in-flight request counts per provider, bounded by each provider's
/// configured `max_pool_size`.
#[derive(Default)]
pub struct ProviderConnectionPool {
    providers: RwLock<HashMap<String, Arc<ProviderSlots>>>,
}

impl ProviderConnectionPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, provider_name: &str, max: usize) {
        let mut providers = self.providers.write().await;
        providers
            .entry(provider_name.to_string())
            .or_insert_with(|| {
                Arc::new(ProviderSlots {
                    active: AtomicUsize::new(0),
                    max,
                })
            });
    }

    /// Active count for a provider, or 0 if it hasn't been registered.
    pub async fn active(&self, provider_name: &str) -> usize {
        let providers = self.providers.read().await;
        providers
            .get(provider_name)
            .map(|s| s.active.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// True when the provider has at least one free slot. An unregistered
    /// provider is treated as unbounded.
    pub async fn has_capacity(&self, provider_name: &str) -> bool {
        let providers = self.providers.read().await;
        match providers.get(provider_name) {
            Some(slots) => slots.active.load(Ordering::SeqCst) < slots.max,
            None => true,
        }
    }

    /// Acquire a slot non-blockingly. Returns `None` if the provider is at
    /// capacity; the caller should treat that as a skip condition, not wait.
    /// An unregistered provider always succeeds (treated as unbounded).
    pub async fn acquire(&self, provider_name: &str) -> Option<PoolGuard> {
        let slots = {
            let providers = self.providers.read().await;
            providers.get(provider_name)?.clone()
        };

        loop {
            let current = slots.active.load(Ordering::SeqCst);
            if current >= slots.max {
                return None;
            }
            if slots
                .active
                .compare_exchange(current, current + 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return Some(PoolGuard { slots });
            }
        }
    }
}
