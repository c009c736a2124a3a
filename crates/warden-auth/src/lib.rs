//! # warden-auth
//!
//! Authorization core for an OAuth 2.0 / OpenID Connect provider.
//!
//! This crate provides:
//! - A grant session store for authorization codes, access, refresh and
//!   OIDC sessions, including the code exchange and refresh rotation
//!   transitions
//! - Access-control policies with a `<...>` pattern dialect and named
//!   conditions, evaluated deny-over-allow
//! - Subject groups
//! - The warden, which combines token validation, group expansion and
//!   policy evaluation into a single decision
//!
//! ## Modules
//!
//! - [`config`] - Issuer, secret, lifespans and registered clients
//! - [`types`] - Sessions, grant requests, clients and groups
//! - [`token`] - HMAC token strategy
//! - [`policy`] - Policy model, pattern matcher, conditions and engine
//! - [`storage`] - Storage traits and in-memory implementations
//! - [`warden`] - The decision component
//! - [`http`] - Axum handlers for the warden, policy and group endpoints
//! - [`context`] - Cancellation and deadlines for storage calls
//! - [`clock`] - Injectable time source

pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod http;
pub mod policy;
pub mod storage;
pub mod token;
pub mod types;
pub mod warden;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{ConfigError, PaginationConfig, WardenConfig};
pub use context::RequestContext;
pub use error::{AuthError, ErrorKind};
pub use http::{WardenState, router};
pub use policy::{AccessDecision, AccessRequest, Effect, Policy, PolicyEngine};
pub use storage::{ClientRegistry, GrantStorage, GroupStorage, PolicyStorage};
pub use token::HmacStrategy;
pub use types::{Client, GrantRequest, Group, Session, SessionCodec, SessionKind};
pub use warden::{AuthContext, Firewall, LocalWarden, TokenRequest};

/// Type alias for authorization results.
pub type AuthResult<T> = Result<T, AuthError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use warden_auth::prelude::*;
/// ```
pub mod prelude {
    pub use crate::AuthResult;
    pub use crate::context::RequestContext;
    pub use crate::error::{AuthError, ErrorKind};
    pub use crate::policy::{AccessRequest, Effect, Policy};
    pub use crate::storage::{ClientRegistry, GrantStorage, GroupStorage, PolicyStorage};
    pub use crate::types::{Client, GrantRequest, Group, Session, SessionKind};
    pub use crate::warden::{AuthContext, Firewall, TokenRequest};
}
