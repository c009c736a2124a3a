//! Storage traits for grant sessions, policies, groups and clients.
//!
//! This module defines storage interfaces for:
//!
//! - Grant sessions (authorization codes, access, refresh and OIDC sessions)
//! - Access-control policies
//! - Subject groups
//! - OAuth client lookup
//!
//! # Implementations
//!
//! - [`memory`] - in-process maps, used by tests and single-node setups
//! - `warden-auth-postgres` - PostgreSQL storage backend

pub mod client;
pub mod grant;
pub mod group;
pub mod memory;
pub mod policy;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use client::ClientRegistry;
pub use grant::{GrantStorage, hydrate, sweep_cutoff};
pub use group::GroupStorage;
pub use memory::{MemoryClientRegistry, MemoryGrantStorage, MemoryGroupStorage, MemoryPolicyStorage};
pub use policy::PolicyStorage;
