//! Waiting on long-running operations.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use super::models::Operation;
use super::DirectoryApi;
use crate::config::PollConfig;
use crate::error::GrantError;

/// How often and for how long to poll an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollPolicy {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

impl From<&PollConfig> for PollPolicy {
    fn from(config: &PollConfig) -> Self {
        Self::new(
            Duration::from_secs(config.interval_seconds),
            Duration::from_secs(config.timeout_seconds),
        )
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(300))
    }
}

/// Block until `operation` reports `done`, re-fetching it every `policy.interval`.
///
/// Returns the completed operation without inspecting its error or payload.
/// Fails with [`GrantError::PollTimeout`] once `policy.timeout` has elapsed and
/// with [`GrantError::Cancelled`] as soon as `cancel` resolves.
pub async fn wait_for_operation<A, C>(
    api: &A,
    operation: Operation,
    policy: &PollPolicy,
    cancel: C,
) -> Result<Operation, GrantError>
where
    A: DirectoryApi,
    C: Future<Output = ()>,
{
    let started = Instant::now();
    let deadline = started + policy.timeout;
    let mut operation = operation;
    let mut attempts: u32 = 0;

    tokio::pin!(cancel);

    while !operation.done {
        if operation.name.is_empty() {
            return Err(GrantError::OperationUnnamed);
        }

        if Instant::now() >= deadline {
            return Err(GrantError::PollTimeout {
                name: operation.name,
                waited_secs: started.elapsed().as_secs(),
            });
        }

        tokio::select! {
            _ = &mut cancel => {
                info!("Cancelled while waiting for {}", operation.name);
                return Err(GrantError::Cancelled);
            }
            _ = tokio::time::sleep(policy.interval) => {}
        }

        attempts += 1;
        debug!("Operation {} not done, poll attempt {}", operation.name, attempts);

        operation = api
            .get_operation(&operation.name)
            .await
            .map_err(GrantError::Poll)?;
    }

    if attempts > 0 {
        info!(
            "Operation {} completed after {} polls",
            operation.name, attempts
        );
    }

    Ok(operation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use crate::identity::models::{Membership, ModifyMembershipRolesRequest};
    use std::cell::Cell;

    /// Reports `done` after a fixed number of polls.
    struct SlowOperation {
        polls_until_done: u32,
        polls: Cell<u32>,
    }

    impl SlowOperation {
        fn new(polls_until_done: u32) -> Self {
            Self {
                polls_until_done,
                polls: Cell::new(0),
            }
        }
    }

    impl DirectoryApi for SlowOperation {
        async fn list_memberships(&self, _parent: &str) -> Result<Vec<Membership>, ApiError> {
            unreachable!("poll never lists")
        }

        async fn create_membership(
            &self,
            _parent: &str,
            _membership: &Membership,
        ) -> Result<Operation, ApiError> {
            unreachable!("poll never creates")
        }

        async fn get_operation(&self, name: &str) -> Result<Operation, ApiError> {
            let polls = self.polls.get() + 1;
            self.polls.set(polls);
            Ok(Operation {
                name: name.to_string(),
                done: polls >= self.polls_until_done,
                ..Default::default()
            })
        }

        async fn modify_membership_roles(
            &self,
            _name: &str,
            _request: &ModifyMembershipRolesRequest,
        ) -> Result<Membership, ApiError> {
            unreachable!("poll never modifies")
        }
    }

    fn pending_op() -> Operation {
        Operation {
            name: "operations/op-1".into(),
            done: false,
            ..Default::default()
        }
    }

    fn fast_policy() -> PollPolicy {
        PollPolicy::new(Duration::from_millis(1), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_done_operation_returns_immediately() {
        let api = SlowOperation::new(1);
        let op = Operation {
            done: true,
            ..Default::default()
        };

        let result = wait_for_operation(&api, op, &fast_policy(), std::future::pending())
            .await
            .unwrap();
        assert!(result.done);
        assert_eq!(api.polls.get(), 0);
    }

    #[tokio::test]
    async fn test_polls_until_done() {
        let api = SlowOperation::new(3);

        let result = wait_for_operation(&api, pending_op(), &fast_policy(), std::future::pending())
            .await
            .unwrap();

        assert!(result.done);
        assert_eq!(result.name, "operations/op-1");
        assert_eq!(api.polls.get(), 3);
    }

    #[tokio::test]
    async fn test_times_out() {
        let api = SlowOperation::new(u32::MAX);
        let policy = PollPolicy::new(Duration::from_millis(5), Duration::from_millis(20));

        let err = wait_for_operation(&api, pending_op(), &policy, std::future::pending())
            .await
            .unwrap_err();

        assert!(matches!(err, GrantError::PollTimeout { ref name, .. } if name == "operations/op-1"));
        assert!(api.polls.get() >= 1);
    }

    #[tokio::test]
    async fn test_cancellation_stops_polling() {
        let api = SlowOperation::new(u32::MAX);
        let policy = PollPolicy::new(Duration::from_secs(60), Duration::from_secs(600));

        let err = wait_for_operation(&api, pending_op(), &policy, async {})
            .await
            .unwrap_err();

        assert!(matches!(err, GrantError::Cancelled));
        assert_eq!(api.polls.get(), 0);
    }

    #[tokio::test]
    async fn test_unnamed_pending_operation_fails() {
        let api = SlowOperation::new(1);
        let op = Operation::default();

        let err = wait_for_operation(&api, op, &fast_policy(), std::future::pending())
            .await
            .unwrap_err();
        assert!(matches!(err, GrantError::OperationUnnamed));
    }

    #[test]
    fn test_policy_from_config() {
        let config = PollConfig {
            interval_seconds: 2,
            timeout_seconds: 30,
        };
        let policy = PollPolicy::from(&config);
        assert_eq!(policy.interval, Duration::from_secs(2));
        assert_eq!(policy.timeout, Duration::from_secs(30));
    }
}
