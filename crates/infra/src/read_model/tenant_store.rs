use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, RwLock};

use strata_core::TenantId;

/// Tenant-isolated key/value store for disposable read models.
///
/// Every operation is scoped by an explicit tenant; keys of different tenants
/// never collide.
pub trait TenantStore<K, V>: Send + Sync {
    fn get(&self, tenant_id: &TenantId, key: &K) -> Option<V>;

    fn upsert(&self, tenant_id: &TenantId, key: K, value: V);

    /// Atomically replace the value under `key` with `f(current)`.
    ///
    /// `None` from `f` leaves the entry untouched. Returns whether it changed.
    fn modify(
        &self,
        tenant_id: &TenantId,
        key: K,
        f: &mut dyn FnMut(Option<&V>) -> Option<V>,
    ) -> bool;

    fn list(&self, tenant_id: &TenantId) -> Vec<V>;

    /// Drop every record of a tenant (rebuild support).
    fn clear_tenant(&self, tenant_id: &TenantId);
}

impl<K, V, S> TenantStore<K, V> for Arc<S>
where
    S: TenantStore<K, V> + ?Sized,
{
    fn get(&self, tenant_id: &TenantId, key: &K) -> Option<V> {
        (**self).get(tenant_id, key)
    }

    fn upsert(&self, tenant_id: &TenantId, key: K, value: V) {
        (**self).upsert(tenant_id, key, value)
    }

    fn modify(
        &self,
        tenant_id: &TenantId,
        key: K,
        f: &mut dyn FnMut(Option<&V>) -> Option<V>,
    ) -> bool {
        (**self).modify(tenant_id, key, f)
    }

    fn list(&self, tenant_id: &TenantId) -> Vec<V> {
        (**self).list(tenant_id)
    }

    fn clear_tenant(&self, tenant_id: &TenantId) {
        (**self).clear_tenant(tenant_id)
    }
}

/// In-memory tenant-isolated store for tests/dev (and the default read side).
#[derive(Debug)]
pub struct InMemoryTenantStore<K, V> {
    inner: RwLock<HashMap<(TenantId, K), V>>,
}

impl<K, V> InMemoryTenantStore<K, V> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> Default for InMemoryTenantStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> TenantStore<K, V> for InMemoryTenantStore<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, tenant_id: &TenantId, key: &K) -> Option<V> {
        let map = self.inner.read().ok()?;
        map.get(&(tenant_id.clone(), key.clone())).cloned()
    }

    fn upsert(&self, tenant_id: &TenantId, key: K, value: V) {
        if let Ok(mut map) = self.inner.write() {
            map.insert((tenant_id.clone(), key), value);
        }
    }

    fn modify(
        &self,
        tenant_id: &TenantId,
        key: K,
        f: &mut dyn FnMut(Option<&V>) -> Option<V>,
    ) -> bool {
        let Ok(mut map) = self.inner.write() else {
            return false;
        };
        let key = (tenant_id.clone(), key);
        match f(map.get(&key)) {
            Some(next) => {
                map.insert(key, next);
                true
            }
            None => false,
        }
    }

    fn list(&self, tenant_id: &TenantId) -> Vec<V> {
        let map = match self.inner.read() {
            Ok(m) => m,
            Err(_) => return vec![],
        };

        map.iter()
            .filter_map(|((t, _k), v)| (t == tenant_id).then(|| v.clone()))
            .collect()
    }

    fn clear_tenant(&self, tenant_id: &TenantId) {
        if let Ok(mut map) = self.inner.write() {
            map.retain(|(t, _k), _v| t != tenant_id);
        }
    }
}
