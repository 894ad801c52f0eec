use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;

/// A stable, content-derived identifier for a [`crate::Node`].
///
/// `LogicalId` never depends on wall-clock time or on the order in which
/// resources were observed (P1/P2 in spec.md §8): it is the hex-encoded
/// SHA-256 digest of a canonical JSON encoding of the tuple of values that
/// define the node's identity. Two Model Builder runs over the same
/// snapshot, or over snapshots that differ only in object ordering or in
/// fields the node's kind declares irrelevant, always produce the same
/// `LogicalId` for "the same" node.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct LogicalId(String);

impl LogicalId {
    /// Derives a `LogicalId` from a `kind` discriminant and an ordered list
    /// of canonicalized components. Callers are responsible for sorting any
    /// unordered component (e.g. a set of header matches) before it reaches
    /// this function; `LogicalId` itself never reorders its inputs, since
    /// doing so would hide genuine ordering bugs in canonicalization.
    pub fn derive(kind: &str, components: &[&dyn erased_serde_json::ToJson]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(kind.as_bytes());
        for component in components {
            hasher.update(b"\0");
            hasher.update(component.to_canonical_json().as_bytes());
        }
        Self(hex::encode(hasher.finalize()))
    }

    /// Derives a `LogicalId` from any serializable value, prefixed with a
    /// `kind` discriminant so that two different node kinds never collide
    /// even if their serialized payloads happen to match.
    pub fn of<T: Serialize>(kind: &str, value: &T) -> Self {
        let json = canonical_json(value);
        let mut hasher = Sha256::new();
        hasher.update(kind.as_bytes());
        hasher.update(b"\0");
        hasher.update(json.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LogicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for LogicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LogicalId({})", self.0)
    }
}

/// Serializes `value` to JSON with map keys sorted, so that the resulting
/// byte string is independent of struct field declaration order or of
/// `HashMap` iteration order. `serde_json::to_value` followed by
/// `BTreeMap`-based re-serialization gives us this for free because
/// `serde_json::Value::Object` is backed by a `BTreeMap` when the
/// `preserve_order` feature is disabled, which this workspace never enables.
fn canonical_json<T: Serialize>(value: &T) -> String {
    let value = serde_json::to_value(value).expect("logical id components must serialize");
    serde_json::to_string(&value).expect("serialized json must restringify")
}

/// A tiny shim so [`LogicalId::derive`] can accept a heterogeneous slice of
/// already-serializable components without boxing each one into
/// `serde_json::Value` at the call site.
pub mod erased_serde_json {
    use super::canonical_json;
    use serde::Serialize;

    pub trait ToJson {
        fn to_canonical_json(&self) -> String;
    }

    impl<T: Serialize> ToJson for T {
        fn to_canonical_json(&self) -> String {
            canonical_json(self)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_components_same_id() {
        let a = LogicalId::derive("LoadBalancer", &[&"cluster-a", &"ns", &"gw"]);
        let b = LogicalId::derive("LoadBalancer", &[&"cluster-a", &"ns", &"gw"]);
        assert_eq!(a, b);
    }

    #[test]
    fn different_kind_different_id() {
        let a = LogicalId::derive("LoadBalancer", &[&"x"]);
        let b = LogicalId::derive("Listener", &[&"x"]);
        assert_ne!(a, b);
    }

    #[test]
    fn field_order_irrelevant() {
        #[derive(Serialize)]
        struct A {
            b: u32,
            a: u32,
        }
        #[derive(Serialize)]
        struct B {
            a: u32,
            b: u32,
        }
        let a = LogicalId::of("X", &A { a: 1, b: 2 });
        let b = LogicalId::of("X", &B { a: 1, b: 2 });
        assert_eq!(a, b);
    }
}
