//! Cloud Identity groups integration.
//!
//! This module provides functionality for:
//! - Listing the memberships of a group
//! - Creating time-bounded memberships
//! - Extending the expiry of an existing membership
//! - Waiting on the long-running operations returned by mutations

pub mod client;
pub mod models;
pub mod poll;

pub use client::{CloudIdentityClient, RequestMetadata};
pub use models::{Membership, ModifyMembershipRolesRequest, Operation};
pub use poll::{wait_for_operation, PollPolicy};

use crate::error::ApiError;

/// The remote calls the grant flow depends on.
///
/// Implemented over HTTPS by [`CloudIdentityClient`]; tests substitute an
/// in-memory directory.
pub trait DirectoryApi {
    /// All memberships under `parent` (`groups/{id}`), across every page.
    async fn list_memberships(&self, parent: &str) -> Result<Vec<Membership>, ApiError>;

    async fn create_membership(
        &self,
        parent: &str,
        membership: &Membership,
    ) -> Result<Operation, ApiError>;

    /// Re-fetch an operation by resource name.
    async fn get_operation(&self, name: &str) -> Result<Operation, ApiError>;

    /// Returns the updated membership.
    async fn modify_membership_roles(
        &self,
        name: &str,
        request: &ModifyMembershipRolesRequest,
    ) -> Result<Membership, ApiError>;
}
