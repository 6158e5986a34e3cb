mod certificate;
mod course;
mod enrollment;
mod lesson;
mod lesson_progress;

pub use certificate::*;
pub use course::*;
pub use enrollment::*;
pub use lesson::*;
pub use lesson_progress::*;
