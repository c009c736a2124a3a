//! Group storage trait.

use async_trait::async_trait;

use crate::AuthResult;
use crate::types::Group;

/// Storage trait for subject groups.
///
/// Membership is a set: adding a present member or removing an absent one
/// is a no-op.
#[async_trait]
pub trait GroupStorage: Send + Sync {
    /// Stores a new group with its initial members.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidArgument` if the id is empty and
    /// `AuthError::Duplicate` if the group exists.
    async fn create_group(&self, group: &Group) -> AuthResult<()>;

    /// Fetches a group with its members.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::NotFound` if there is no such group.
    async fn get_group(&self, id: &str) -> AuthResult<Group>;

    /// Deletes a group and its memberships.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::NotFound` if there is no such group.
    async fn delete_group(&self, id: &str) -> AuthResult<()>;

    /// Adds members to a group.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::NotFound` if there is no such group.
    async fn add_members(&self, id: &str, members: &[String]) -> AuthResult<()>;

    /// Removes members from a group.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::NotFound` if there is no such group.
    async fn remove_members(&self, id: &str, members: &[String]) -> AuthResult<()>;

    /// Returns the ids of every group containing `member`, sorted.
    ///
    /// A subject in no group yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_group_names(&self, member: &str) -> AuthResult<Vec<String>>;
}
