//! HTTP handlers for the warden, policy and group endpoints.
//!
//! # Available Handlers
//!
//! - [`warden`] - `/warden/allowed` and `/warden/token/allowed`
//! - [`policies`] - policy CRUD at `/policies`
//! - [`groups`] - group CRUD at `/warden/groups`
//!
//! [`router`] wires all of them onto one [`WardenState`].

pub mod bearer;
pub mod error;
pub mod groups;
pub mod guard;
pub mod policies;
pub mod warden;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};

use crate::config::PaginationConfig;
use crate::storage::{GroupStorage, PolicyStorage};
use crate::warden::Firewall;

pub use bearer::token_from_headers;

// =============================================================================
// State Types
// =============================================================================

/// State shared by every warden endpoint.
#[derive(Clone)]
pub struct WardenState {
    /// Decision engine.
    pub firewall: Arc<dyn Firewall>,

    /// Policy manager.
    pub policies: Arc<dyn PolicyStorage>,

    /// Group manager.
    pub groups: Arc<dyn GroupStorage>,

    /// Page size limits for policy listing.
    pub pagination: PaginationConfig,

    /// When set, every endpoint requires a bearer token that is itself
    /// allowed to make the call.
    pub guard: bool,
}

impl WardenState {
    /// Creates state with default pagination and no caller guard.
    pub fn new(
        firewall: Arc<dyn Firewall>,
        policies: Arc<dyn PolicyStorage>,
        groups: Arc<dyn GroupStorage>,
    ) -> Self {
        Self {
            firewall,
            policies,
            groups,
            pagination: PaginationConfig::default(),
            guard: false,
        }
    }

    /// Sets the pagination limits.
    #[must_use]
    pub fn with_pagination(mut self, pagination: PaginationConfig) -> Self {
        self.pagination = pagination;
        self
    }

    /// Enables or disables the caller guard.
    #[must_use]
    pub fn with_guard(mut self, guard: bool) -> Self {
        self.guard = guard;
        self
    }
}

// =============================================================================
// Router
// =============================================================================

/// Builds the router for every warden endpoint.
pub fn router(state: WardenState) -> Router {
    Router::new()
        .route("/warden/allowed", post(warden::allowed_handler))
        .route("/warden/token/allowed", post(warden::token_allowed_handler))
        .route(
            "/policies",
            get(policies::list_policies).post(policies::create_policy),
        )
        .route(
            "/policies/{id}",
            get(policies::get_policy)
                .put(policies::update_policy)
                .delete(policies::delete_policy),
        )
        .route(
            "/warden/groups",
            get(groups::find_groups).post(groups::create_group),
        )
        .route(
            "/warden/groups/{id}",
            get(groups::get_group).delete(groups::delete_group),
        )
        .route(
            "/warden/groups/{id}/members",
            post(groups::add_members).delete(groups::remove_members),
        )
        .with_state(state)
}
