//! Just-in-time group membership grants.
//!
//! Lists the group, adds the user with an expiring MEMBER role, and either
//! waits for the create operation or, when the user is already a member and
//! auto-extend is on, pushes the existing role's expiry out instead.

use std::future::Future;
use std::io::Write;

use tracing::{debug, info, warn};

use crate::error::GrantError;
use crate::identity::models::{expiry_after, MEMBER_ROLE};
use crate::identity::{
    wait_for_operation, DirectoryApi, Membership, ModifyMembershipRolesRequest, PollPolicy,
};

/// Upper bound accepted for `--expireIn` (one week).
pub const MAX_EXPIRE_MINUTES: u32 = 7 * 24 * 60;

/// What to grant, to whom, for how long.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantRequest {
    pub group_id: String,
    pub user_id: String,
    pub expire_in_minutes: u32,
    pub auto_extend: bool,
}

impl GrantRequest {
    /// Parent resource name of the group's memberships.
    pub fn parent(&self) -> String {
        format!("groups/{}", self.group_id)
    }
}

/// Result of a successful grant.
#[derive(Debug, Clone, PartialEq)]
pub enum GrantOutcome {
    /// A new membership was created.
    Added { member_id: String },
    /// An existing membership had its expiry extended.
    Extended { membership: Membership },
}

/// Run the list / add-or-extend sequence, writing progress lines to `out`.
pub async fn run<A, W, C>(
    api: &A,
    request: &GrantRequest,
    poll: &PollPolicy,
    out: &mut W,
    cancel: C,
) -> Result<GrantOutcome, GrantError>
where
    A: DirectoryApi,
    W: Write,
    C: Future<Output = ()>,
{
    let parent = request.parent();

    let memberships = api
        .list_memberships(&parent)
        .await
        .map_err(GrantError::List)?;

    for membership in &memberships {
        writeln!(out, "Members: {}", membership.member_id().unwrap_or_default())?;
        if let Some(expires_at) = membership.role(MEMBER_ROLE).and_then(|r| r.expires_at()) {
            debug!(
                "{} ({}) expires at {}",
                membership.name,
                membership.kind.as_deref().unwrap_or("USER"),
                expires_at
            );
        }
    }
    let member_path = membership_path(&memberships, &request.user_id);

    let membership = Membership::expiring_member(
        &request.user_id,
        &expiry_after(request.expire_in_minutes),
    );

    let created = api.create_membership(&parent, &membership).await;
    let operation = match created {
        Ok(operation) => operation,
        Err(err) if err.is_conflict() && request.auto_extend => {
            return extend(api, request, &parent, member_path, out).await;
        }
        Err(err) if err.is_conflict() => {
            return Err(GrantError::AlreadyMember {
                user_id: request.user_id.clone(),
                parent,
                source: err,
            });
        }
        Err(err) => return Err(GrantError::Create(err)),
    };

    let operation = wait_for_operation(api, operation, poll, cancel).await?;

    if let Some(status) = &operation.error {
        return Err(GrantError::OperationFailed {
            code: status.code,
            message: status.message.clone(),
        });
    }

    let added = operation
        .membership()
        .map_err(|e| GrantError::Decode(e.to_string()))?;
    let member_id = added
        .member_id()
        .ok_or_else(|| GrantError::Decode("membership has no member key".to_string()))?
        .to_string();

    writeln!(out, "Added {}", member_id)?;
    info!("Added {} to {} for {} minutes", member_id, parent, request.expire_in_minutes);

    Ok(GrantOutcome::Added { member_id })
}

/// Extend the MEMBER role's expiry on an existing membership.
///
/// The path comes from the earlier listing; if the user was not seen there the
/// group is listed once more before giving up.
async fn extend<A, W>(
    api: &A,
    request: &GrantRequest,
    parent: &str,
    member_path: Option<String>,
    out: &mut W,
) -> Result<GrantOutcome, GrantError>
where
    A: DirectoryApi,
    W: Write,
{
    writeln!(
        out,
        "User is already member of group.  Extending membership duration"
    )?;

    let path = match member_path {
        Some(path) => path,
        None => {
            warn!(
                "{} conflicted but was not in the listing, listing {} again",
                request.user_id, parent
            );
            let memberships = api
                .list_memberships(parent)
                .await
                .map_err(GrantError::List)?;
            membership_path(&memberships, &request.user_id).ok_or_else(|| {
                GrantError::MembershipPathUnknown {
                    user_id: request.user_id.clone(),
                    parent: parent.to_string(),
                }
            })?
        }
    };

    let modify = ModifyMembershipRolesRequest::extend_member(&expiry_after(
        request.expire_in_minutes,
    ));
    let updated = api
        .modify_membership_roles(&path, &modify)
        .await
        .map_err(GrantError::Modify)?;

    writeln!(out, "Updated existing Membership: {}", updated.name)?;
    match updated.role(MEMBER_ROLE).and_then(|r| r.expires_at()) {
        Some(expires_at) => info!("Extended {} in {} until {}", request.user_id, parent, expires_at),
        None => info!(
            "Extended {} in {} by {} minutes",
            request.user_id, parent, request.expire_in_minutes
        ),
    }

    Ok(GrantOutcome::Extended {
        membership: updated,
    })
}

/// Resource name of `user_id`'s membership, if listed and named.
fn membership_path(memberships: &[Membership], user_id: &str) -> Option<String> {
    memberships
        .iter()
        .find(|m| m.member_id() == Some(user_id))
        .map(|m| m.name.clone())
        .filter(|name| !name.is_empty())
}
