//! Data types shared by the stores, the warden and the HTTP handlers.

pub mod client;
pub mod grant;
pub mod group;
pub mod session;

pub use client::Client;
pub use grant::{GrantRequest, GrantRow, join_scopes, split_scopes, truncate_to_micros};
pub use group::Group;
pub use session::{JsonSessionCodec, Session, SessionCodec, SessionKind};
