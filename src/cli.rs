//! Command-line flags.

use std::time::Duration;

use clap::Parser;

use crate::config::PollConfig;
use crate::error::AppError;
use crate::grant::{GrantRequest, MAX_EXPIRE_MINUTES};
use crate::identity::{PollPolicy, RequestMetadata};

/// Message printed when the required identifiers are missing.
pub const MISSING_IDS: &str = "groupID and userID must be set";

#[derive(Debug, Clone, Parser)]
#[command(
    name = "groupjit",
    about = "Grant time-bounded Cloud Identity group membership",
    version
)]
pub struct Cli {
    /// Group Parent
    #[arg(long = "groupID", env = "GROUPJIT_GROUP_ID", default_value = "")]
    pub group_id: String,

    /// User to add
    #[arg(long = "userID", env = "GROUPJIT_USER_ID", default_value = "")]
    pub user_id: String,

    /// Automatically extend if the user is already a member
    #[arg(long = "autoExtend")]
    pub auto_extend: bool,

    /// Request Reason to add for auditlogs
    #[arg(long = "requestReason", default_value = "")]
    pub request_reason: String,

    /// Expire membership at (mins)
    #[arg(
        long = "expireIn",
        default_value_t = 5,
        value_parser = clap::value_parser!(u32).range(1..=i64::from(MAX_EXPIRE_MINUTES))
    )]
    pub expire_in: u32,

    /// Project to apply quota usage towards
    #[arg(long = "quotaProject", default_value = "")]
    pub quota_project: String,

    /// Seconds between operation polls [default: from config]
    #[arg(long = "pollInterval", value_parser = clap::value_parser!(u64).range(1..))]
    pub poll_interval: Option<u64>,

    /// Seconds to wait for the operation before giving up [default: from config]
    #[arg(long = "pollTimeout", value_parser = clap::value_parser!(u64).range(1..))]
    pub poll_timeout: Option<u64>,
}

impl Cli {
    /// The grant to perform, or a usage error if an identifier is missing.
    pub fn grant_request(&self) -> Result<GrantRequest, AppError> {
        let group_id = self.group_id.trim();
        let user_id = self.user_id.trim();

        if group_id.is_empty() || user_id.is_empty() {
            return Err(AppError::Usage(MISSING_IDS.to_string()));
        }

        Ok(GrantRequest {
            group_id: group_id.to_string(),
            user_id: user_id.to_string(),
            expire_in_minutes: self.expire_in,
            auto_extend: self.auto_extend,
        })
    }

    pub fn request_metadata(&self) -> RequestMetadata {
        RequestMetadata {
            request_reason: self.request_reason.clone(),
            quota_project: self.quota_project.clone(),
        }
    }

    /// Poll policy from config, with flag overrides applied.
    ///
    /// The effective timeout must not be shorter than the effective interval.
    pub fn poll_policy(&self, config: &PollConfig) -> Result<PollPolicy, AppError> {
        let mut policy = PollPolicy::from(config);
        if let Some(secs) = self.poll_interval {
            policy.interval = Duration::from_secs(secs);
        }
        if let Some(secs) = self.poll_timeout {
            policy.timeout = Duration::from_secs(secs);
        }

        if policy.timeout < policy.interval {
            return Err(AppError::Usage(format!(
                "pollTimeout ({}s) must not be shorter than pollInterval ({}s)",
                policy.timeout.as_secs(),
                policy.interval.as_secs()
            )));
        }

        Ok(policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("groupjit").chain(args.iter().copied()))
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&["--groupID", "g1", "--userID", "u1"]).unwrap();

        assert_eq!(cli.expire_in, 5);
        assert!(!cli.auto_extend);
        assert_eq!(cli.request_metadata(), RequestMetadata::default());

        let request = cli.grant_request().unwrap();
        assert_eq!(
            request,
            GrantRequest {
                group_id: "g1".into(),
                user_id: "u1".into(),
                expire_in_minutes: 5,
                auto_extend: false,
            }
        );
    }

    #[test]
    fn test_all_flags() {
        let cli = parse(&[
            "--groupID",
            "g1",
            "--userID",
            "u1@example.com",
            "--autoExtend",
            "--expireIn",
            "10",
            "--requestReason",
            "INC-42",
            "--quotaProject",
            "billing",
            "--pollInterval",
            "2",
        ])
        .unwrap();

        let request = cli.grant_request().unwrap();
        assert!(request.auto_extend);
        assert_eq!(request.expire_in_minutes, 10);

        let metadata = cli.request_metadata();
        assert_eq!(metadata.request_reason, "INC-42");
        assert_eq!(metadata.quota_project, "billing");

        let policy = cli
            .poll_policy(&PollConfig {
                interval_seconds: 1,
                timeout_seconds: 300,
            })
            .unwrap();
        assert_eq!(policy.interval, Duration::from_secs(2));
        assert_eq!(policy.timeout, Duration::from_secs(300));
    }

    #[test]
    fn test_poll_timeout_shorter_than_interval_is_usage_error() {
        let config = PollConfig {
            interval_seconds: 1,
            timeout_seconds: 300,
        };

        let cli = parse(&["--pollInterval", "10", "--pollTimeout", "5"]).unwrap();
        let err = cli.poll_policy(&config).unwrap_err();
        assert!(matches!(err, AppError::Usage(ref msg) if msg.contains("pollTimeout (5s)")));
        assert_eq!(err.exit_code(), 2);

        // An interval override alone is checked against the configured timeout
        let cli = parse(&["--pollInterval", "301"]).unwrap();
        assert!(cli.poll_policy(&config).is_err());

        let cli = parse(&["--pollInterval", "5", "--pollTimeout", "5"]).unwrap();
        let policy = cli.poll_policy(&config).unwrap();
        assert_eq!(policy.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_missing_ids_is_usage_error() {
        let cli = parse(&["--groupID", "g1"]).unwrap();
        let err = cli.grant_request().unwrap_err();
        assert!(matches!(err, AppError::Usage(ref msg) if msg == MISSING_IDS));
        assert_eq!(err.exit_code(), 2);

        let cli = parse(&["--groupID", "  ", "--userID", "u1"]).unwrap();
        assert!(cli.grant_request().is_err());
    }

    #[test]
    fn test_expire_in_bounds() {
        assert!(parse(&["--expireIn", "0"]).is_err());
        assert!(parse(&["--expireIn", "-5"]).is_err());
        assert!(parse(&["--expireIn", "10081"]).is_err());
        assert!(parse(&["--expireIn", "10080"]).is_ok());
    }
}
