//! Typed attribute keys and scoped attribute maps.
//!
//! An [`AttributeKey<T>`] is process-unique (identity, not name or type,
//! decides equality) and carries an optional default. Values live in an
//! [`AttributeMap`] keyed by the key's stable string identity token so
//! that a plan can be serialized and its attributes rebound by name on
//! another host. Because the map must hold values of heterogeneous
//! types behind one concrete type, it stores each value as `serde_json`
//! rather than reaching for a `dyn Any` registry, since the plan is
//! already `serde`-based end to end.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::PlanError;
use crate::ordered_map::OrderedMap;

static NEXT_KEY_ID: AtomicU64 = AtomicU64::new(0);

/// A typed, process-unique attribute identifier.
///
/// Two keys are equal only if they are the exact same allocation (identity
/// equality), even if they share a name and type. The name exists purely
/// to give values a stable serialization token.
#[derive(Debug)]
pub struct AttributeKey<T> {
    id: u64,
    name: &'static str,
    default: Option<T>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> AttributeKey<T> {
    /// Allocates a new key with no default value.
    pub fn new(name: &'static str) -> Self {
        AttributeKey { id: NEXT_KEY_ID.fetch_add(1, Ordering::Relaxed), name, default: None, _marker: PhantomData }
    }

    /// Allocates a new key whose lookups fall back to `default` when unset.
    pub fn with_default(name: &'static str, default: T) -> Self {
        AttributeKey { id: NEXT_KEY_ID.fetch_add(1, Ordering::Relaxed), name, default: Some(default), _marker: PhantomData }
    }

    /// The key's stable serialization identity token.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> PartialEq for AttributeKey<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for AttributeKey<T> {}

impl<T> std::hash::Hash for AttributeKey<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// A scoped store of attribute values, keyed by [`AttributeKey::name`].
///
/// Insertion order is preserved so two plans built with identical calls
/// serialize identically.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AttributeMap {
    values: OrderedMap<String, serde_json::Value>,
}

impl AttributeMap {
    /// An empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under `key`, checking that it deserializes back to `T`.
    ///
    /// `AttributeMap` is otherwise untyped storage, so this is the runtime
    /// type check that keeps it honest: a value that fails to round-trip
    /// through `T`'s `Deserialize` impl is rejected rather than stored.
    pub fn put<T: Serialize + DeserializeOwned>(&mut self, key: &AttributeKey<T>, value: T) -> Result<(), PlanError> {
        let json = serde_json::to_value(&value).map_err(|_| PlanError::AttributeTypeMismatch(key.name.to_string()))?;
        serde_json::from_value::<T>(json.clone()).map_err(|_| PlanError::AttributeTypeMismatch(key.name.to_string()))?;
        self.values.insert(key.name.to_string(), json);
        Ok(())
    }

    /// Looks up `key`'s own stored value, ignoring the key's default.
    pub fn get_own<T: DeserializeOwned>(&self, key: &AttributeKey<T>) -> Option<T> {
        self.values.get(key.name).and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Looks up `key`: stored value, else the key's default, else `None`.
    pub fn get<T: DeserializeOwned + Clone>(&self, key: &AttributeKey<T>) -> Option<T> {
        self.get_own(key).or_else(|| key.default.clone())
    }

    /// Removes any stored value for `key`.
    pub fn remove<T>(&mut self, key: &AttributeKey<T>) {
        self.values.remove(key.name);
    }

    /// True if `key` has an explicitly stored value (the default does not count).
    pub fn contains_own<T>(&self, key: &AttributeKey<T>) -> bool {
        self.values.contains_key(key.name)
    }
}

/// Two-level attribute lookup: operator scope falls back to plan scope
/// before the key's own default. Port-level lookup never chains like
/// this; see [`crate::port::PortDescriptor::attributes`].
pub fn get_scoped<T: DeserializeOwned + Clone>(operator: &AttributeMap, plan: &AttributeMap, key: &AttributeKey<T>) -> Option<T> {
    operator.get_own(key).or_else(|| plan.get_own(key)).or_else(|| key.default.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_round_trip() {
        let key: AttributeKey<i64> = AttributeKey::new("COUNT");
        let mut map = AttributeMap::new();
        map.put(&key, 42).unwrap();
        assert_eq!(map.get(&key), Some(42));
    }

    #[test]
    fn falls_back_to_default() {
        let key: AttributeKey<bool> = AttributeKey::with_default("FAST", false);
        let map = AttributeMap::new();
        assert_eq!(map.get(&key), Some(false));
    }

    #[test]
    fn missing_without_default_is_none() {
        let key: AttributeKey<String> = AttributeKey::new("NAME");
        let map = AttributeMap::new();
        assert_eq!(map.get(&key), None);
    }

    #[test]
    fn keys_are_identity_not_name_equal() {
        let a: AttributeKey<i64> = AttributeKey::new("X");
        let b: AttributeKey<i64> = AttributeKey::new("X");
        assert_ne!(a, b);
    }

    #[test]
    fn scoped_lookup_falls_back_operator_then_plan_then_default() {
        let key: AttributeKey<i64> = AttributeKey::with_default("WINDOW", 1);
        let mut plan_attrs = AttributeMap::new();
        let operator_attrs = AttributeMap::new();
        assert_eq!(get_scoped(&operator_attrs, &plan_attrs, &key), Some(1));

        plan_attrs.put(&key, 5).unwrap();
        assert_eq!(get_scoped(&operator_attrs, &plan_attrs, &key), Some(5));

        let mut operator_attrs = operator_attrs;
        operator_attrs.put(&key, 9).unwrap();
        assert_eq!(get_scoped(&operator_attrs, &plan_attrs, &key), Some(9));
    }

    #[test]
    fn insertion_order_preserved_across_serialization() {
        let k1: AttributeKey<i64> = AttributeKey::new("A");
        let k2: AttributeKey<i64> = AttributeKey::new("B");
        let mut map = AttributeMap::new();
        map.put(&k1, 1).unwrap();
        map.put(&k2, 2).unwrap();
        let bytes = serde_json::to_string(&map).unwrap();
        let back: AttributeMap = serde_json::from_str(&bytes).unwrap();
        assert_eq!(back.values.keys().collect::<Vec<_>>(), vec![&"A".to_string(), &"B".to_string()]);
    }
}
