//! Patches Gateway and Route status conditions (spec.md §4.5 step 6): the
//! only crate in this workspace that writes to the Kubernetes API, so that
//! every other crate (`k8s-index`, `reconcile`) stays pure with respect to
//! cluster state.

mod index;

pub use self::index::Controller;
