//! Drift detection against freshly observed remote state
//!
//! Classification is a pure function of an observation and the expected
//! values; [`check`] only adds the fetch. Fields the remote does not expose
//! are never reported as drift.

use std::collections::BTreeSet;

use crate::context::ReconcileContext;
use crate::error::Result;
use crate::types::{DriftReason, DriftVerdict, RemoteObservation, is_meaningful_id};

/// Classify an observation. Reasons accumulate; `Match` requires the object
/// to exist with no reason triggered.
pub fn classify(
    observed: &RemoteObservation,
    expected_schedule: Option<&str>,
    expected_source_id: Option<&str>,
) -> DriftVerdict {
    if !observed.exists {
        return DriftVerdict::Missing;
    }

    let mut reasons = BTreeSet::new();

    if let Some(expected) = expected_schedule.filter(|s| !s.is_empty()) {
        match observed.schedule.as_deref() {
            None => {
                reasons.insert(DriftReason::ScheduleMissing);
            }
            Some(actual) if actual != expected => {
                reasons.insert(DriftReason::ScheduleMismatch);
            }
            Some(_) => {}
        }
    }

    if let Some(expected) = expected_source_id.filter(|id| is_meaningful_id(id))
        && let Some(actual) = observed.source_id.as_deref()
        && actual != expected
    {
        reasons.insert(DriftReason::LinkedResourceMismatch);
    }

    if reasons.is_empty() {
        DriftVerdict::Match
    } else {
        DriftVerdict::Drift { reasons }
    }
}

/// Check a materialized view by full qualified name
///
/// A remote that does not return a view's schedule yields
/// `Drift{ScheduleMissing}` on every check whenever a schedule is declared.
pub fn check(
    full_name: &str,
    expected_schedule: Option<&str>,
    expected_source_id: Option<&str>,
    ctx: &ReconcileContext<'_>,
) -> Result<DriftVerdict> {
    let Ok(client) = ctx.require_client() else {
        return Ok(DriftVerdict::Unknown);
    };

    let observed = match ctx.call(|| client.read_dependent(full_name)) {
        Ok(view) => RemoteObservation {
            exists: true,
            source_id: view.source_id,
            schedule: view.schedule,
        },
        Err(e) if e.is_not_found() => RemoteObservation::missing(),
        Err(e) => return Err(e.into()),
    };

    if observed.exists
        && observed.schedule.is_none()
        && expected_schedule.is_some_and(|s| !s.is_empty())
    {
        log::debug!(
            "{}: remote returned no schedule, reporting schedule_missing",
            full_name
        );
    }

    let verdict = classify(&observed, expected_schedule, expected_source_id);
    log::debug!("{}: drift check {}", full_name, verdict);
    Ok(verdict)
}

/// Check that a query exists and is not archived
pub fn check_query(remote_id: &str, ctx: &ReconcileContext<'_>) -> Result<DriftVerdict> {
    let Ok(client) = ctx.require_client() else {
        return Ok(DriftVerdict::Unknown);
    };

    match ctx.call(|| client.read_query(remote_id)) {
        Ok(query) if query.archived => Ok(DriftVerdict::Missing),
        Ok(_) => Ok(DriftVerdict::Match),
        Err(e) if e.is_not_found() => Ok(DriftVerdict::Missing),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, RemoteError};
    use crate::mock::{MockClient, Op};
    use crate::types::{Namespace, RetryConfig};

    const SCHEDULE: &str = "0 */1 * * *";
    const SOURCE: &str = "1001";

    fn observed(schedule: Option<&str>, source_id: Option<&str>) -> RemoteObservation {
        RemoteObservation {
            exists: true,
            schedule: schedule.map(str::to_string),
            source_id: source_id.map(str::to_string),
        }
    }

    fn drift(reasons: &[DriftReason]) -> DriftVerdict {
        DriftVerdict::Drift {
            reasons: reasons.iter().copied().collect(),
        }
    }

    #[test]
    fn test_classification_is_complete() {
        use DriftReason::*;

        // (schedule observed, schedule matches, source matches, expected)
        let cases = [
            (true, true, true, DriftVerdict::Match),
            (true, true, false, drift(&[LinkedResourceMismatch])),
            (true, false, true, drift(&[ScheduleMismatch])),
            (true, false, false, drift(&[ScheduleMismatch, LinkedResourceMismatch])),
            (false, true, true, drift(&[ScheduleMissing])),
            (false, true, false, drift(&[ScheduleMissing, LinkedResourceMismatch])),
            (false, false, true, drift(&[ScheduleMissing])),
            (false, false, false, drift(&[ScheduleMissing, LinkedResourceMismatch])),
        ];

        for (present, schedule_matches, source_matches, expected) in cases {
            let schedule = match (present, schedule_matches) {
                (false, _) => None,
                (true, true) => Some(SCHEDULE),
                (true, false) => Some("0 0 * * *"),
            };
            let source = if source_matches { SOURCE } else { "2002" };

            let existing = observed(schedule, Some(source));
            assert_eq!(
                classify(&existing, Some(SCHEDULE), Some(SOURCE)),
                expected,
                "schedule={schedule:?} source={source}"
            );

            let gone = RemoteObservation {
                exists: false,
                ..existing
            };
            assert_eq!(
                classify(&gone, Some(SCHEDULE), Some(SOURCE)),
                DriftVerdict::Missing
            );
        }
    }

    #[test]
    fn test_unobservable_source_is_not_drift() {
        let verdict = classify(&observed(Some(SCHEDULE), None), Some(SCHEDULE), Some(SOURCE));
        assert_eq!(verdict, DriftVerdict::Match);
    }

    #[test]
    fn test_empty_or_zero_expectations_are_ignored() {
        let view = observed(None, Some("2002"));
        assert_eq!(classify(&view, None, None), DriftVerdict::Match);
        assert_eq!(classify(&view, Some(""), Some("0")), DriftVerdict::Match);
        assert_eq!(classify(&view, None, Some("")), DriftVerdict::Match);
    }

    #[test]
    fn test_schedule_compare_is_exact() {
        let view = observed(Some("0  */1 * * *"), Some(SOURCE));
        assert_eq!(
            classify(&view, Some(SCHEDULE), Some(SOURCE)),
            drift(&[DriftReason::ScheduleMismatch])
        );
    }

    fn ctx(mock: &MockClient) -> ReconcileContext<'_> {
        ReconcileContext::new(Some(mock), Namespace::new("dune", "team"))
            .with_retry(RetryConfig::no_retry())
    }

    #[test]
    fn test_check_fetches_fresh_observation() {
        let mock = MockClient::default();
        mock.insert_view("dune.team.mv1", Some(SCHEDULE), Some(SOURCE));

        let first = check("dune.team.mv1", Some(SCHEDULE), Some(SOURCE), &ctx(&mock)).unwrap();
        assert!(first.is_match());

        mock.insert_view("dune.team.mv1", Some("0 0 * * *"), Some(SOURCE));
        let second = check("dune.team.mv1", Some(SCHEDULE), Some(SOURCE), &ctx(&mock)).unwrap();
        assert_eq!(second, drift(&[DriftReason::ScheduleMismatch]));
        assert_eq!(mock.count(Op::ReadDependent), 2);
    }

    #[test]
    fn test_check_view_without_exposed_schedule() {
        let mock = MockClient::default();
        mock.insert_view("dune.team.mv1", None, Some(SOURCE));

        let verdict = check("dune.team.mv1", Some(SCHEDULE), Some(SOURCE), &ctx(&mock)).unwrap();
        assert_eq!(verdict, drift(&[DriftReason::ScheduleMissing]));

        let undeclared = check("dune.team.mv1", None, Some(SOURCE), &ctx(&mock)).unwrap();
        assert!(undeclared.is_match());
    }

    #[test]
    fn test_check_missing_view() {
        let mock = MockClient::default();
        let verdict = check("dune.team.mv1", Some(SCHEDULE), None, &ctx(&mock)).unwrap();
        assert_eq!(verdict, DriftVerdict::Missing);
    }

    #[test]
    fn test_check_without_credentials_is_unknown() {
        let ctx = ReconcileContext::new(None, Namespace::new("dune", "team"));
        let verdict = check("dune.team.mv1", Some(SCHEDULE), Some(SOURCE), &ctx).unwrap();
        assert!(verdict.is_unknown());
        assert!(!verdict.is_match());
        assert!(check_query(SOURCE, &ctx).unwrap().is_unknown());
    }

    #[test]
    fn test_check_surfaces_transport_errors() {
        let mock = MockClient::default();
        mock.fail_next(Op::ReadDependent, RemoteError::transport("reset", None));
        let err = check("dune.team.mv1", Some(SCHEDULE), None, &ctx(&mock)).unwrap_err();
        assert!(matches!(err, Error::Remote(RemoteError::Transport { .. })));
    }

    #[test]
    fn test_check_query_states() {
        let mock = MockClient::default();
        let live = mock.insert_query("live", "SELECT 1");
        let archived = mock.insert_query("archived", "SELECT 1");
        mock.set_archived(&archived, true);

        assert_eq!(check_query(&live, &ctx(&mock)).unwrap(), DriftVerdict::Match);
        assert_eq!(check_query(&archived, &ctx(&mock)).unwrap(), DriftVerdict::Missing);
        assert_eq!(check_query("999", &ctx(&mock)).unwrap(), DriftVerdict::Missing);
    }
}
