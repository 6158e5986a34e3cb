//! Pure derivation of enrollment progress, status, and lifecycle timestamps
//! from completion counts. No IO happens here; the engine feeds this with the
//! required-lesson set and the completed count and persists the outcome.

use time::OffsetDateTime;

use crate::db::{Enrollment, EnrollmentStatus};

/// Everything a recalculation wants persisted, in one atomic write.
///
/// `started_at` / `completed_at` carry a value only when that timestamp is
/// being set for the first time; an already-set timestamp is never rewritten.
#[derive(Debug, Clone, PartialEq)]
pub struct RecalcOutcome {
    pub progress: f64,
    pub status: EnrollmentStatus,
    pub started_at: Option<OffsetDateTime>,
    pub completed_at: Option<OffsetDateTime>,
    /// True exactly when this recalculation is the one that drove the
    /// enrollment to 100% (the certificate-issuance trigger).
    pub newly_completed: bool,
}

/// Completion percentage over required lessons, rounded to two decimals.
/// A course with zero required lessons is pinned at 0.
pub fn percentage(completed: usize, required: usize) -> f64 {
    if required == 0 {
        return 0.0;
    }
    let completed = completed.min(required);
    let raw = completed as f64 / required as f64 * 100.0;
    (raw * 100.0).round() / 100.0
}

/// Derive the post-recalculation state for an enrollment.
///
/// `required` is the size of the course's required-lesson set, `completed`
/// the number of those lessons with a completed progress row. Completion is
/// judged on the counts, never on float equality.
pub fn derive(
    enrollment: &Enrollment,
    required: usize,
    completed: usize,
    now: OffsetDateTime,
) -> RecalcOutcome {
    let completed = completed.min(required);
    let progress = percentage(completed, required);
    let all_done = required > 0 && completed == required;
    let any_done = required > 0 && completed > 0;

    // Dropped/Suspended are never overwritten by recalculation.
    let status = if enrollment.status.is_terminal() {
        enrollment.status
    } else if all_done {
        EnrollmentStatus::Completed
    } else if any_done {
        EnrollmentStatus::InProgress
    } else {
        EnrollmentStatus::Enrolled
    };

    let started_at = if any_done && enrollment.started_at.is_none() {
        Some(now)
    } else {
        None
    };

    let newly_completed = all_done && enrollment.completed_at.is_none();
    let completed_at = if newly_completed { Some(now) } else { None };

    RecalcOutcome {
        progress,
        status,
        started_at,
        completed_at,
        newly_completed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn enrollment(status: EnrollmentStatus) -> Enrollment {
        let now = OffsetDateTime::now_utc();
        Enrollment {
            id: Uuid::new_v4(),
            learner_id: Uuid::new_v4(),
            course_id: Uuid::new_v4(),
            status,
            progress: 0.0,
            time_spent_secs: 0,
            enrolled_at: now,
            started_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn percentage_rounds_to_two_decimals() {
        assert_eq!(percentage(1, 3), 33.33);
        assert_eq!(percentage(2, 3), 66.67);
        assert_eq!(percentage(2, 5), 40.0);
        assert_eq!(percentage(5, 5), 100.0);
    }

    #[test]
    fn zero_required_lessons_never_divides() {
        assert_eq!(percentage(0, 0), 0.0);
        assert_eq!(percentage(7, 0), 0.0);
    }

    #[test]
    fn status_follows_progress_lattice() {
        let e = enrollment(EnrollmentStatus::Enrolled);
        let now = OffsetDateTime::now_utc();

        assert_eq!(derive(&e, 5, 0, now).status, EnrollmentStatus::Enrolled);
        assert_eq!(derive(&e, 5, 2, now).status, EnrollmentStatus::InProgress);
        assert_eq!(derive(&e, 5, 5, now).status, EnrollmentStatus::Completed);
    }

    #[test]
    fn zero_required_course_never_completes() {
        let e = enrollment(EnrollmentStatus::Enrolled);
        let out = derive(&e, 0, 0, OffsetDateTime::now_utc());
        assert_eq!(out.progress, 0.0);
        assert_eq!(out.status, EnrollmentStatus::Enrolled);
        assert!(out.started_at.is_none());
        assert!(!out.newly_completed);
    }

    #[test]
    fn terminal_statuses_are_untouched() {
        let now = OffsetDateTime::now_utc();
        for status in [EnrollmentStatus::Dropped, EnrollmentStatus::Suspended] {
            let e = enrollment(status);
            let out = derive(&e, 5, 5, now);
            assert_eq!(out.status, status);
            // Progress and timestamps still advance.
            assert_eq!(out.progress, 100.0);
            assert!(out.newly_completed);
        }
    }

    #[test]
    fn started_at_only_offered_while_unset() {
        let now = OffsetDateTime::now_utc();
        let mut e = enrollment(EnrollmentStatus::InProgress);
        assert!(derive(&e, 5, 1, now).started_at.is_some());

        e.started_at = Some(now);
        assert!(derive(&e, 5, 3, now).started_at.is_none());
    }

    #[test]
    fn completed_at_only_offered_while_unset() {
        let now = OffsetDateTime::now_utc();
        let mut e = enrollment(EnrollmentStatus::InProgress);
        let first = derive(&e, 5, 5, now);
        assert!(first.completed_at.is_some());
        assert!(first.newly_completed);

        e.completed_at = Some(now);
        let again = derive(&e, 5, 5, now);
        assert!(again.completed_at.is_none());
        assert!(!again.newly_completed);
    }
}
