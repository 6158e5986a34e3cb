mod course_repository;
mod enrollment_repository;
mod progress_store;

pub use course_repository::CourseRepository;
pub use enrollment_repository::EnrollmentRepository;
pub use progress_store::PgProgressStore;
