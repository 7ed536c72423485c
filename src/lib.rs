//! Closure-table hierarchy maintenance for SeaORM (PostgreSQL).
//!
//! A tree lives in two tables: a node table carrying the parent pointer and
//! a cached `level`, and an ancestor table holding one row per (node, proper
//! ancestor) pair — the full transitive closure of the parent edges. Ancestor
//! and descendant lookups never recurse; the price is that insert, move and
//! reparent-or-cascade delete must keep the closure rows and levels
//! consistent, which [`engine::TreeEngine`] does with fixed sequences of
//! set-based statements inside one transaction per mutation.
//!
//! Tables and column names are plain configuration ([`config::TreeConfig`]),
//! so any number of trees share the same engine. PostgreSQL only.

pub mod config;
pub mod engine;
pub mod error;
pub mod links;
pub mod lock;
pub mod records;

pub mod prelude {
    //! Convenient re-exports for consumers.
    pub use crate::config::{AdvisoryLockStrategy, SiblingScope, TreeConfig, TreeOptions};
    pub use crate::engine::{SubtreePolicy, TreeEngine};
    pub use crate::records::NodeRow;
}

pub use config::{AdvisoryLockKey, AdvisoryLockStrategy, SiblingScope, TreeConfig, TreeOptions};
pub use engine::{SubtreePolicy, TreeEngine};
pub use error::TreeError;
pub use links::AncestorLinkStore;
pub use lock::LockedTransaction;
pub use records::{NodeRow, NodeStore};
