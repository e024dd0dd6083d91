//! Cloud Identity wire models for groups, memberships and operations.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// The only role this tool grants.
pub const MEMBER_ROLE: &str = "MEMBER";

/// Field mask that restricts a role update to the expiry timestamp.
pub const EXPIRY_FIELD_MASK: &str = "expiry_detail.expire_time";

/// Identifies a member (user, group or service account) in the directory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityKey {
    /// Email address or other identifier of the entity.
    #[serde(default)]
    pub id: String,

    /// Namespace for non-Google identities; empty for Google accounts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// When a membership role expires.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpiryDetail {
    /// RFC3339 timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expire_time: Option<String>,
}

/// A named role within a membership, optionally time-bounded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipRole {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_detail: Option<ExpiryDetail>,
}

impl MembershipRole {
    /// A MEMBER role that expires at `expire_time`.
    pub fn member_until(expire_time: &str) -> Self {
        Self {
            name: MEMBER_ROLE.to_string(),
            expiry_detail: Some(ExpiryDetail {
                expire_time: Some(expire_time.to_string()),
            }),
        }
    }

    /// Parsed expiry, if present and well-formed.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let raw = self.expiry_detail.as_ref()?.expire_time.as_deref()?;
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }
}

/// Relation between a member and a group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Membership {
    /// Resource name assigned by the service:
    /// `groups/{group_id}/memberships/{membership_id}`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    /// Deprecated upstream but still returned by v1beta1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member_key: Option<EntityKey>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_member_key: Option<EntityKey>,

    #[serde(default)]
    pub roles: Vec<MembershipRole>,

    /// USER, SERVICE_ACCOUNT, GROUP, ...
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl Membership {
    /// New membership for `user_id` holding a MEMBER role that expires at `expire_time`.
    pub fn expiring_member(user_id: &str, expire_time: &str) -> Self {
        Self {
            preferred_member_key: Some(EntityKey {
                id: user_id.to_string(),
                namespace: None,
            }),
            roles: vec![MembershipRole::member_until(expire_time)],
            ..Default::default()
        }
    }

    /// Member identifier, preferring `preferredMemberKey` over the legacy `memberKey`.
    pub fn member_id(&self) -> Option<&str> {
        self.preferred_member_key
            .as_ref()
            .or(self.member_key.as_ref())
            .map(|k| k.id.as_str())
            .filter(|id| !id.is_empty())
    }

    /// Look up a role by name.
    pub fn role(&self, name: &str) -> Option<&MembershipRole> {
        self.roles.iter().find(|r| r.name == name)
    }
}

/// One page of `groups.memberships.list`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListMembershipsResponse {
    #[serde(default)]
    pub memberships: Vec<Membership>,

    #[serde(default)]
    pub next_page_token: Option<String>,
}

impl ListMembershipsResponse {
    /// Token for the next page, treating an empty string as the last page.
    pub fn next_page(&self) -> Option<&str> {
        self.next_page_token.as_deref().filter(|t| !t.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMembershipRolesParams {
    pub field_mask: String,
    pub membership_role: MembershipRole,
}

/// Body of `groups.memberships.modifyMembershipRoles`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModifyMembershipRolesRequest {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub update_roles_params: Vec<UpdateMembershipRolesParams>,
}

impl ModifyMembershipRolesRequest {
    /// Update only the expiry of the MEMBER role.
    pub fn extend_member(expire_time: &str) -> Self {
        Self {
            update_roles_params: vec![UpdateMembershipRolesParams {
                field_mask: EXPIRY_FIELD_MASK.to_string(),
                membership_role: MembershipRole::member_until(expire_time),
            }],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModifyMembershipRolesResponse {
    pub membership: Membership,
}

/// `google.rpc.Status` as carried in a failed operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Status {
    #[serde(default)]
    pub code: i32,

    #[serde(default)]
    pub message: String,
}

/// Long-running operation returned by mutating calls.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub done: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Status>,

    /// Opaque success payload; for membership creation this is a Membership
    /// plus an `@type` discriminator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<serde_json::Value>,
}

impl Operation {
    /// Decode the success payload into a Membership.
    pub fn membership(&self) -> Result<Membership, serde_json::Error> {
        let payload = self.response.clone().unwrap_or(serde_json::Value::Null);
        serde_json::from_value(payload)
    }
}

/// RFC3339 (UTC, whole seconds, `Z` suffix) rendering used for expiries.
pub fn format_expiry(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Expiry `minutes` from now, computed at call time.
pub fn expiry_after(minutes: u32) -> String {
    format_expiry(Utc::now() + Duration::minutes(i64::from(minutes)))
}
