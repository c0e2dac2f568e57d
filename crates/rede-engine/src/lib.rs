//! Rede Engine - Leader Hierarchy Management
//!
//! Reconstructs coordinator trees from the flat node store, applies
//! structural changes only after the invariant guard accepts them, and
//! computes network statistics.
//!
//! # Architecture
//!
//! - **Reconstruct**: drains the paged closure query and builds trees
//! - **Mutation**: lock, re-read, validate, commit one versioned batch
//! - **Aggregate**: coordinator summaries and branch totals
//! - **Service**: [`HierarchyService`], the facade over all of the above
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use rede_engine::{EngineConfig, HierarchyService};
//! use rede_store::MemoryStore;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let service = HierarchyService::new(Arc::new(MemoryStore::new()), EngineConfig::default());
//!     for summary in service.list_coordinators_with_stats().await? {
//!         println!("{}: {} leaders", summary.coordinator.name, summary.total_leaders);
//!     }
//!     Ok(())
//! }
//! ```

pub mod aggregate;
pub mod config;
pub mod error;
pub mod locks;
pub mod mutation;
pub mod reconstruct;
pub mod service;

pub use aggregate::{AggregationEngine, DetachedBranch};
pub use config::{EngineConfig, RetryPolicy};
pub use error::{Error, ErrorKind, Result};
pub use locks::{TreeGuard, TreeLocks};
pub use mutation::{MutationEngine, PromotionReport};
pub use reconstruct::TreeReconstructor;
pub use service::{HierarchyService, ROLE_EVENTS};
