//! Back-off computation for throttled requests.

use super::Response;
use std::time::Duration;

/// What to do after sleeping off a throttled request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThrottlePolicy {
    /// Sleep for the computed back-off, then return the throttled error.
    ///
    /// The caller decides whether to resubmit.
    #[default]
    SleepThenFail,
    /// Sleep for the computed back-off, then resend the request, at most
    /// `max_retries` times before returning the throttled error.
    SleepThenRetry {
        /// Upper bound on resends for a single call.
        max_retries: u32,
    },
}

impl ThrottlePolicy {
    /// Returns true if another resend is allowed after `retries` resends.
    pub(crate) fn allows_retry(self, retries: u32) -> bool {
        match self {
            ThrottlePolicy::SleepThenFail => false,
            ThrottlePolicy::SleepThenRetry { max_retries } => retries < max_retries,
        }
    }
}

/// Computes how long to wait before the budget covers a throttled request.
///
/// Returns `None` unless the first error is `"Throttled"` and a cost envelope
/// is present. The delay is `ceil((requested - available) / restore_rate)`
/// whole seconds, and is only produced when the budget is actually short and
/// the restore rate is positive.
///
/// ```
/// use shopify_core::graphql::{throttle_delay, Response};
/// use std::time::Duration;
///
/// let response: Response = serde_json::from_str(r#"{
///     "errors": [{"message": "Throttled"}],
///     "extensions": {"cost": {
///         "requestedQueryCost": 10.0,
///         "throttleStatus": {"maximumAvailable": 1000.0, "currentlyAvailable": 4.0, "restoreRate": 2.0}
///     }}
/// }"#).unwrap();
///
/// assert_eq!(throttle_delay(&response), Some(Duration::from_secs(3)));
/// ```
pub fn throttle_delay(response: &Response) -> Option<Duration> {
    if !response.is_throttled() {
        return None;
    }
    let cost = response.cost()?;
    backoff_secs(
        cost.requested_query_cost,
        cost.throttle_status.currently_available,
        cost.throttle_status.restore_rate,
    )
    .map(Duration::from_secs)
}

fn backoff_secs(requested: f64, available: f64, restore_rate: f64) -> Option<u64> {
    if !(available < requested) || !(restore_rate > 0.0) {
        return None;
    }
    let secs = ((requested - available) / restore_rate).ceil();
    // Saturating float-to-int cast keeps absurd envelopes finite.
    Some(secs as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphql::tests::throttled_response;
    use crate::graphql::{Extensions, GraphQLError};

    #[test]
    fn test_backoff_exact_ceiling() {
        assert_eq!(backoff_secs(10.0, 4.0, 2.0), Some(3));
        assert_eq!(backoff_secs(10.0, 5.0, 2.0), Some(3));
        assert_eq!(backoff_secs(10.0, 6.0, 2.0), Some(2));
        assert_eq!(backoff_secs(1000.0, 0.5, 50.0), Some(20));
    }

    #[test]
    fn test_backoff_when_budget_suffices() {
        assert_eq!(backoff_secs(10.0, 10.0, 2.0), None);
        assert_eq!(backoff_secs(10.0, 50.0, 2.0), None);
    }

    #[test]
    fn test_backoff_rejects_bad_restore_rate() {
        assert_eq!(backoff_secs(10.0, 4.0, 0.0), None);
        assert_eq!(backoff_secs(10.0, 4.0, -1.0), None);
        assert_eq!(backoff_secs(10.0, 4.0, f64::NAN), None);
    }

    #[test]
    fn test_throttle_delay_from_response() {
        let response = throttled_response(10.0, 4.0, 2.0);
        assert_eq!(throttle_delay(&response), Some(Duration::from_secs(3)));
    }

    #[test]
    fn test_no_delay_without_cost_envelope() {
        let mut response = throttled_response(10.0, 4.0, 2.0);
        response.extensions = Some(Extensions { cost: None });
        assert_eq!(throttle_delay(&response), None);

        response.extensions = None;
        assert_eq!(throttle_delay(&response), None);
    }

    #[test]
    fn test_no_delay_for_other_errors() {
        let mut response = throttled_response(10.0, 4.0, 2.0);
        response.errors = vec![GraphQLError {
            message: "Internal error".to_string(),
            locations: vec![],
        }];
        assert_eq!(throttle_delay(&response), None);
    }

    #[test]
    fn test_only_first_error_counts() {
        let mut response = throttled_response(10.0, 4.0, 2.0);
        response.errors.insert(
            0,
            GraphQLError {
                message: "Something else".to_string(),
                locations: vec![],
            },
        );
        assert_eq!(throttle_delay(&response), None);
    }

    #[test]
    fn test_policy_allows_retry() {
        assert!(!ThrottlePolicy::SleepThenFail.allows_retry(0));
        let policy = ThrottlePolicy::SleepThenRetry { max_retries: 2 };
        assert!(policy.allows_retry(0));
        assert!(policy.allows_retry(1));
        assert!(!policy.allows_retry(2));
    }
}
