//! Derived registries reconstructed from the sealed chain.
//!
//! Both registries here play the same role as rishy2211-mlsnitch's
//! `BaseValidity` duplicate-`Aid` check: a conflict check that must happen before an
//! entry is allowed into the pending pool, except here the conflict is
//! stateful (ownership, DAG membership) rather than a same-block duplicate
//! scan.

pub mod asset;
pub mod derivative;

pub use asset::AssetRegistry;
pub use derivative::DerivativeRegistry;
