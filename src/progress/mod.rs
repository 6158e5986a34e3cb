//! The enrollment progress engine: creating enrollments, recording lesson
//! completions, and recalculating aggregate progress, status, and lifecycle
//! timestamps over the set of required lessons in a course.

pub mod recalc;

use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info};
use uuid::Uuid;

use crate::db::{DatabaseError, Enrollment};

use recalc::RecalcOutcome;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("learner {learner_id} is already enrolled in course {course_id}")]
    AlreadyEnrolled { learner_id: Uuid, course_id: Uuid },

    #[error("course {0} does not exist or is not active")]
    CourseNotFound(Uuid),

    #[error("enrollment {0} not found")]
    EnrollmentNotFound(Uuid),

    #[error("lesson {lesson_id} does not belong to the enrollment's course")]
    LessonNotInCourse { lesson_id: Uuid },

    #[error("persistence failure: {0}")]
    Persistence(#[from] DatabaseError),
}

/// Published whenever a recalculation first drives an enrollment to 100%.
/// Certificate issuance subscribes to this; the engine itself does not issue.
#[derive(Debug, Clone, Copy)]
pub struct CompletionEvent {
    pub enrollment_id: Uuid,
    pub learner_id: Uuid,
    pub course_id: Uuid,
}

/// Storage seam for the engine. Backed by Postgres in production
/// (`db::repositories::PgProgressStore`) and by an in-memory map in tests.
pub trait ProgressStore {
    /// True when the course exists and is active.
    async fn course_active(&self, course_id: Uuid) -> Result<bool, DatabaseError>;

    /// Insert a new enrollment; `None` when the (learner, course) pair is
    /// already enrolled.
    async fn insert_enrollment(
        &self,
        learner_id: Uuid,
        course_id: Uuid,
        now: OffsetDateTime,
    ) -> Result<Option<Enrollment>, DatabaseError>;

    async fn enrollment(&self, enrollment_id: Uuid) -> Result<Option<Enrollment>, DatabaseError>;

    /// The course a lesson belongs to, through its module.
    async fn lesson_course(&self, lesson_id: Uuid) -> Result<Option<Uuid>, DatabaseError>;

    /// Mark a lesson completed for an enrollment. Idempotent: re-marking an
    /// already-completed lesson keeps the original completion timestamp.
    async fn upsert_completion(
        &self,
        enrollment_id: Uuid,
        lesson_id: Uuid,
        now: OffsetDateTime,
    ) -> Result<(), DatabaseError>;

    /// Ids of all required lessons in the course, flattened across modules.
    async fn required_lessons(&self, course_id: Uuid) -> Result<Vec<Uuid>, DatabaseError>;

    /// How many of the given lessons have a completed progress row for this
    /// enrollment.
    async fn count_completed(
        &self,
        enrollment_id: Uuid,
        lesson_ids: &[Uuid],
    ) -> Result<i64, DatabaseError>;

    /// Persist a recalculation outcome in a single atomic write. Existing
    /// `started_at` / `completed_at` values must never be overwritten.
    async fn apply_recalculation(
        &self,
        enrollment_id: Uuid,
        outcome: &RecalcOutcome,
    ) -> Result<Enrollment, DatabaseError>;
}

pub struct EnrollmentProgressEngine<S> {
    store: S,
    completion_tx: broadcast::Sender<CompletionEvent>,
    // Serializes recompute-and-write per enrollment so two concurrent lesson
    // completions cannot lose an update. Enrollments are independent, so no
    // cross-enrollment ordering is needed.
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl<S: ProgressStore> EnrollmentProgressEngine<S> {
    pub fn new(store: S, completion_tx: broadcast::Sender<CompletionEvent>) -> Self {
        Self {
            store,
            completion_tx,
            locks: DashMap::new(),
        }
    }

    /// Enroll a learner in an active course. Rejects duplicate enrollments
    /// for the same (learner, course) pair.
    pub async fn create_enrollment(
        &self,
        learner_id: Uuid,
        course_id: Uuid,
    ) -> Result<Enrollment, EngineError> {
        if !self.store.course_active(course_id).await? {
            return Err(EngineError::CourseNotFound(course_id));
        }

        let now = OffsetDateTime::now_utc();
        match self
            .store
            .insert_enrollment(learner_id, course_id, now)
            .await?
        {
            Some(enrollment) => {
                info!(
                    enrollment_id = %enrollment.id,
                    %learner_id,
                    %course_id,
                    "Enrollment created"
                );
                Ok(enrollment)
            }
            None => Err(EngineError::AlreadyEnrolled {
                learner_id,
                course_id,
            }),
        }
    }

    /// Mark a lesson completed for an enrollment and recalculate. Idempotent:
    /// re-marking an already-completed lesson succeeds and changes nothing.
    pub async fn record_lesson_completion(
        &self,
        enrollment_id: Uuid,
        lesson_id: Uuid,
    ) -> Result<Enrollment, EngineError> {
        let lock = self.enrollment_lock(enrollment_id);
        let _guard = lock.lock().await;

        let enrollment = self
            .store
            .enrollment(enrollment_id)
            .await?
            .ok_or(EngineError::EnrollmentNotFound(enrollment_id))?;

        match self.store.lesson_course(lesson_id).await? {
            Some(course_id) if course_id == enrollment.course_id => {}
            _ => return Err(EngineError::LessonNotInCourse { lesson_id }),
        }

        let now = OffsetDateTime::now_utc();
        self.store
            .upsert_completion(enrollment_id, lesson_id, now)
            .await?;

        self.recalculate_locked(&enrollment).await
    }

    /// Re-derive progress/status/timestamps from the current completion set.
    /// A no-op when nothing new has been completed.
    pub async fn recalculate(&self, enrollment_id: Uuid) -> Result<Enrollment, EngineError> {
        let lock = self.enrollment_lock(enrollment_id);
        let _guard = lock.lock().await;

        let enrollment = self
            .store
            .enrollment(enrollment_id)
            .await?
            .ok_or(EngineError::EnrollmentNotFound(enrollment_id))?;

        self.recalculate_locked(&enrollment).await
    }

    // Caller must hold the per-enrollment lock.
    async fn recalculate_locked(&self, enrollment: &Enrollment) -> Result<Enrollment, EngineError> {
        let required = self.store.required_lessons(enrollment.course_id).await?;
        let completed = if required.is_empty() {
            0
        } else {
            self.store
                .count_completed(enrollment.id, &required)
                .await?
                .max(0) as usize
        };

        let outcome = recalc::derive(
            enrollment,
            required.len(),
            completed,
            OffsetDateTime::now_utc(),
        );
        debug!(
            enrollment_id = %enrollment.id,
            progress = outcome.progress,
            status = ?outcome.status,
            "Recalculated enrollment progress"
        );

        let updated = self
            .store
            .apply_recalculation(enrollment.id, &outcome)
            .await?;

        if outcome.newly_completed {
            info!(enrollment_id = %enrollment.id, "Enrollment completed");
            // Nobody listening is fine; issuance is an external concern.
            let _ = self.completion_tx.send(CompletionEvent {
                enrollment_id: enrollment.id,
                learner_id: enrollment.learner_id,
                course_id: enrollment.course_id,
            });
        }

        Ok(updated)
    }

    fn enrollment_lock(&self, enrollment_id: Uuid) -> Arc<Mutex<()>> {
        self.locks
            .entry(enrollment_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::EnrollmentStatus;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    struct LessonDef {
        course_id: Uuid,
        is_required: bool,
    }

    #[derive(Default)]
    struct InMemoryState {
        // course id -> is_active
        courses: HashMap<Uuid, bool>,
        lessons: HashMap<Uuid, LessonDef>,
        enrollments: HashMap<Uuid, Enrollment>,
        // (enrollment, lesson) -> completed_at
        completions: HashMap<(Uuid, Uuid), OffsetDateTime>,
    }

    #[derive(Default)]
    struct InMemoryStore {
        state: StdMutex<InMemoryState>,
    }

    impl InMemoryStore {
        fn add_course(&self, active: bool) -> Uuid {
            let id = Uuid::new_v4();
            self.state.lock().unwrap().courses.insert(id, active);
            id
        }

        fn add_lesson(&self, course_id: Uuid, is_required: bool) -> Uuid {
            let id = Uuid::new_v4();
            self.state.lock().unwrap().lessons.insert(
                id,
                LessonDef {
                    course_id,
                    is_required,
                },
            );
            id
        }

        fn set_status(&self, enrollment_id: Uuid, status: EnrollmentStatus) {
            let mut state = self.state.lock().unwrap();
            state.enrollments.get_mut(&enrollment_id).unwrap().status = status;
        }
    }

    impl ProgressStore for InMemoryStore {
        async fn course_active(&self, course_id: Uuid) -> Result<bool, DatabaseError> {
            Ok(self
                .state
                .lock()
                .unwrap()
                .courses
                .get(&course_id)
                .copied()
                .unwrap_or(false))
        }

        async fn insert_enrollment(
            &self,
            learner_id: Uuid,
            course_id: Uuid,
            now: OffsetDateTime,
        ) -> Result<Option<Enrollment>, DatabaseError> {
            let mut state = self.state.lock().unwrap();
            let duplicate = state
                .enrollments
                .values()
                .any(|e| e.learner_id == learner_id && e.course_id == course_id);
            if duplicate {
                return Ok(None);
            }
            let enrollment = Enrollment {
                id: Uuid::new_v4(),
                learner_id,
                course_id,
                status: EnrollmentStatus::Enrolled,
                progress: 0.0,
                time_spent_secs: 0,
                enrolled_at: now,
                started_at: None,
                completed_at: None,
                created_at: now,
                updated_at: now,
            };
            state.enrollments.insert(enrollment.id, enrollment.clone());
            Ok(Some(enrollment))
        }

        async fn enrollment(
            &self,
            enrollment_id: Uuid,
        ) -> Result<Option<Enrollment>, DatabaseError> {
            Ok(self
                .state
                .lock()
                .unwrap()
                .enrollments
                .get(&enrollment_id)
                .cloned())
        }

        async fn lesson_course(&self, lesson_id: Uuid) -> Result<Option<Uuid>, DatabaseError> {
            Ok(self
                .state
                .lock()
                .unwrap()
                .lessons
                .get(&lesson_id)
                .map(|l| l.course_id))
        }

        async fn upsert_completion(
            &self,
            enrollment_id: Uuid,
            lesson_id: Uuid,
            now: OffsetDateTime,
        ) -> Result<(), DatabaseError> {
            self.state
                .lock()
                .unwrap()
                .completions
                .entry((enrollment_id, lesson_id))
                .or_insert(now);
            Ok(())
        }

        async fn required_lessons(&self, course_id: Uuid) -> Result<Vec<Uuid>, DatabaseError> {
            Ok(self
                .state
                .lock()
                .unwrap()
                .lessons
                .iter()
                .filter(|(_, l)| l.course_id == course_id && l.is_required)
                .map(|(id, _)| *id)
                .collect())
        }

        async fn count_completed(
            &self,
            enrollment_id: Uuid,
            lesson_ids: &[Uuid],
        ) -> Result<i64, DatabaseError> {
            let state = self.state.lock().unwrap();
            Ok(lesson_ids
                .iter()
                .filter(|id| state.completions.contains_key(&(enrollment_id, **id)))
                .count() as i64)
        }

        async fn apply_recalculation(
            &self,
            enrollment_id: Uuid,
            outcome: &RecalcOutcome,
        ) -> Result<Enrollment, DatabaseError> {
            let mut state = self.state.lock().unwrap();
            let enrollment = state
                .enrollments
                .get_mut(&enrollment_id)
                .ok_or(DatabaseError::NotFound)?;
            enrollment.progress = outcome.progress;
            enrollment.status = outcome.status;
            if enrollment.started_at.is_none() {
                enrollment.started_at = outcome.started_at;
            }
            if enrollment.completed_at.is_none() {
                enrollment.completed_at = outcome.completed_at;
            }
            enrollment.updated_at = OffsetDateTime::now_utc();
            Ok(enrollment.clone())
        }
    }

    fn engine() -> EnrollmentProgressEngine<InMemoryStore> {
        let (tx, _) = broadcast::channel(16);
        EnrollmentProgressEngine::new(InMemoryStore::default(), tx)
    }

    #[tokio::test]
    async fn completing_all_required_lessons_reaches_exactly_100() {
        let engine = engine();
        let course = engine.store.add_course(true);
        let lessons: Vec<_> = (0..3).map(|_| engine.store.add_lesson(course, true)).collect();

        let enrollment = engine
            .create_enrollment(Uuid::new_v4(), course)
            .await
            .unwrap();

        let mut latest = enrollment.clone();
        for lesson in &lessons {
            latest = engine
                .record_lesson_completion(enrollment.id, *lesson)
                .await
                .unwrap();
        }

        assert_eq!(latest.progress, 100.0);
        assert_eq!(latest.status, EnrollmentStatus::Completed);
        assert!(latest.completed_at.is_some());
    }

    #[tokio::test]
    async fn progress_tracks_required_lesson_ratio() {
        // 5 required lessons plus 1 optional. Module nesting is irrelevant to
        // the count, so lessons attach to the course directly here.
        let engine = engine();
        let course = engine.store.add_course(true);
        let required: Vec<_> = (0..5).map(|_| engine.store.add_lesson(course, true)).collect();
        let _optional = engine.store.add_lesson(course, false);

        let enrollment = engine
            .create_enrollment(Uuid::new_v4(), course)
            .await
            .unwrap();

        let after_two = {
            engine
                .record_lesson_completion(enrollment.id, required[0])
                .await
                .unwrap();
            engine
                .record_lesson_completion(enrollment.id, required[1])
                .await
                .unwrap()
        };
        assert_eq!(after_two.progress, 40.0);
        assert_eq!(after_two.status, EnrollmentStatus::InProgress);
        assert!(after_two.started_at.is_some());
        assert!(after_two.completed_at.is_none());

        let mut latest = after_two;
        for lesson in &required[2..] {
            latest = engine
                .record_lesson_completion(enrollment.id, *lesson)
                .await
                .unwrap();
        }
        assert_eq!(latest.progress, 100.0);
        assert_eq!(latest.status, EnrollmentStatus::Completed);
        assert!(latest.completed_at.is_some());
    }

    #[tokio::test]
    async fn optional_lessons_do_not_count() {
        let engine = engine();
        let course = engine.store.add_course(true);
        let required = engine.store.add_lesson(course, true);
        let optional = engine.store.add_lesson(course, false);

        let enrollment = engine
            .create_enrollment(Uuid::new_v4(), course)
            .await
            .unwrap();

        let after_optional = engine
            .record_lesson_completion(enrollment.id, optional)
            .await
            .unwrap();
        assert_eq!(after_optional.progress, 0.0);
        assert_eq!(after_optional.status, EnrollmentStatus::Enrolled);

        let after_required = engine
            .record_lesson_completion(enrollment.id, required)
            .await
            .unwrap();
        assert_eq!(after_required.progress, 100.0);
    }

    #[tokio::test]
    async fn zero_required_lessons_stays_at_zero() {
        let engine = engine();
        let course = engine.store.add_course(true);
        let optional = engine.store.add_lesson(course, false);

        let enrollment = engine
            .create_enrollment(Uuid::new_v4(), course)
            .await
            .unwrap();
        let latest = engine
            .record_lesson_completion(enrollment.id, optional)
            .await
            .unwrap();

        assert_eq!(latest.progress, 0.0);
        assert_ne!(latest.status, EnrollmentStatus::Completed);
        assert!(latest.completed_at.is_none());
    }

    #[tokio::test]
    async fn re_marking_a_lesson_is_idempotent() {
        let engine = engine();
        let course = engine.store.add_course(true);
        let a = engine.store.add_lesson(course, true);
        let _b = engine.store.add_lesson(course, true);

        let enrollment = engine
            .create_enrollment(Uuid::new_v4(), course)
            .await
            .unwrap();

        let once = engine
            .record_lesson_completion(enrollment.id, a)
            .await
            .unwrap();
        let twice = engine
            .record_lesson_completion(enrollment.id, a)
            .await
            .unwrap();

        assert_eq!(once.progress, 50.0);
        assert_eq!(twice.progress, 50.0);
        assert_eq!(once.started_at, twice.started_at);
    }

    #[tokio::test]
    async fn recalculate_without_new_completions_is_a_noop() {
        let engine = engine();
        let course = engine.store.add_course(true);
        let a = engine.store.add_lesson(course, true);
        let _b = engine.store.add_lesson(course, true);

        let enrollment = engine
            .create_enrollment(Uuid::new_v4(), course)
            .await
            .unwrap();
        let first = engine
            .record_lesson_completion(enrollment.id, a)
            .await
            .unwrap();
        let second = engine.recalculate(enrollment.id).await.unwrap();

        assert_eq!(first.progress, second.progress);
        assert_eq!(first.status, second.status);
        assert_eq!(first.started_at, second.started_at);
        assert_eq!(first.completed_at, second.completed_at);
    }

    #[tokio::test]
    async fn completed_at_is_never_rewritten() {
        let engine = engine();
        let course = engine.store.add_course(true);
        let a = engine.store.add_lesson(course, true);

        let enrollment = engine
            .create_enrollment(Uuid::new_v4(), course)
            .await
            .unwrap();
        let done = engine
            .record_lesson_completion(enrollment.id, a)
            .await
            .unwrap();
        let again = engine.recalculate(enrollment.id).await.unwrap();

        assert_eq!(done.completed_at, again.completed_at);
    }

    #[tokio::test]
    async fn duplicate_enrollment_is_rejected() {
        let engine = engine();
        let course = engine.store.add_course(true);
        let learner = Uuid::new_v4();

        let first = engine.create_enrollment(learner, course).await.unwrap();
        let second = engine.create_enrollment(learner, course).await;

        assert!(matches!(second, Err(EngineError::AlreadyEnrolled { .. })));
        // The original enrollment is unaffected.
        let still_there = engine.store.enrollment(first.id).await.unwrap().unwrap();
        assert_eq!(still_there.status, EnrollmentStatus::Enrolled);
    }

    #[tokio::test]
    async fn inactive_or_missing_course_is_rejected() {
        let engine = engine();
        let inactive = engine.store.add_course(false);

        let err = engine.create_enrollment(Uuid::new_v4(), inactive).await;
        assert!(matches!(err, Err(EngineError::CourseNotFound(_))));

        let err = engine
            .create_enrollment(Uuid::new_v4(), Uuid::new_v4())
            .await;
        assert!(matches!(err, Err(EngineError::CourseNotFound(_))));
    }

    #[tokio::test]
    async fn cross_course_lesson_is_rejected_without_side_effects() {
        let engine = engine();
        let course = engine.store.add_course(true);
        let _own = engine.store.add_lesson(course, true);
        let other_course = engine.store.add_course(true);
        let foreign = engine.store.add_lesson(other_course, true);

        let enrollment = engine
            .create_enrollment(Uuid::new_v4(), course)
            .await
            .unwrap();
        let err = engine
            .record_lesson_completion(enrollment.id, foreign)
            .await;
        assert!(matches!(err, Err(EngineError::LessonNotInCourse { .. })));

        // No completion row, no recalculation.
        let unchanged = engine.store.enrollment(enrollment.id).await.unwrap().unwrap();
        assert_eq!(unchanged.progress, 0.0);
        assert_eq!(unchanged.status, EnrollmentStatus::Enrolled);
        assert!(engine.store.state.lock().unwrap().completions.is_empty());
    }

    #[tokio::test]
    async fn missing_enrollment_is_rejected() {
        let engine = engine();
        let course = engine.store.add_course(true);
        let lesson = engine.store.add_lesson(course, true);

        let err = engine.record_lesson_completion(Uuid::new_v4(), lesson).await;
        assert!(matches!(err, Err(EngineError::EnrollmentNotFound(_))));
    }

    #[tokio::test]
    async fn dropped_enrollment_keeps_its_status() {
        let engine = engine();
        let course = engine.store.add_course(true);
        let lesson = engine.store.add_lesson(course, true);

        let enrollment = engine
            .create_enrollment(Uuid::new_v4(), course)
            .await
            .unwrap();
        engine.store.set_status(enrollment.id, EnrollmentStatus::Dropped);

        let latest = engine
            .record_lesson_completion(enrollment.id, lesson)
            .await
            .unwrap();
        assert_eq!(latest.status, EnrollmentStatus::Dropped);
        assert_eq!(latest.progress, 100.0);
    }

    #[tokio::test]
    async fn completion_event_is_published_exactly_once() {
        let (tx, mut rx) = broadcast::channel(16);
        let engine = EnrollmentProgressEngine::new(InMemoryStore::default(), tx);
        let course = engine.store.add_course(true);
        let lesson = engine.store.add_lesson(course, true);

        let enrollment = engine
            .create_enrollment(Uuid::new_v4(), course)
            .await
            .unwrap();
        engine
            .record_lesson_completion(enrollment.id, lesson)
            .await
            .unwrap();
        engine.recalculate(enrollment.id).await.unwrap();

        let event = rx.try_recv().unwrap();
        assert_eq!(event.enrollment_id, enrollment.id);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn progress_is_monotonic_across_completions() {
        let engine = engine();
        let course = engine.store.add_course(true);
        let lessons: Vec<_> = (0..4).map(|_| engine.store.add_lesson(course, true)).collect();

        let enrollment = engine
            .create_enrollment(Uuid::new_v4(), course)
            .await
            .unwrap();

        let mut previous = 0.0;
        for lesson in &lessons {
            let latest = engine
                .record_lesson_completion(enrollment.id, *lesson)
                .await
                .unwrap();
            assert!(latest.progress >= previous);
            previous = latest.progress;
        }
        assert_eq!(previous, 100.0);
    }
}
