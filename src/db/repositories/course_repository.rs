use sqlx::PgPool;
use uuid::Uuid;

use crate::db::{
    Course, CourseModule, CourseTree, DatabaseError, Lesson, ModuleWithLessons, NewCourse,
    NewCourseModule, NewLesson,
};

pub struct CourseRepository;

impl CourseRepository {
    pub async fn create_course(pool: &PgPool, data: &NewCourse) -> Result<Course, DatabaseError> {
        let course = sqlx::query_as::<_, Course>(
            r#"
            INSERT INTO courses (id, title, description, is_active)
            VALUES ($1, $2, $3, $4)
            RETURNING id, title, description, is_active, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&data.title)
        .bind(&data.description)
        .bind(data.is_active.unwrap_or(true))
        .fetch_one(pool)
        .await?;
        Ok(course)
    }

    pub async fn list_courses(pool: &PgPool) -> Result<Vec<Course>, DatabaseError> {
        let courses = sqlx::query_as::<_, Course>(
            "SELECT id, title, description, is_active, created_at, updated_at \
             FROM courses ORDER BY created_at DESC",
        )
        .fetch_all(pool)
        .await?;
        Ok(courses)
    }

    pub async fn get_course(pool: &PgPool, course_id: Uuid) -> Result<Option<Course>, DatabaseError> {
        let course = sqlx::query_as::<_, Course>(
            "SELECT id, title, description, is_active, created_at, updated_at \
             FROM courses WHERE id = $1",
        )
        .bind(course_id)
        .fetch_optional(pool)
        .await?;
        Ok(course)
    }

    /// Load a course with its full module -> lesson tree, ordered by position.
    pub async fn get_course_tree(
        pool: &PgPool,
        course_id: Uuid,
    ) -> Result<Option<CourseTree>, DatabaseError> {
        let Some(course) = Self::get_course(pool, course_id).await? else {
            return Ok(None);
        };

        let modules = sqlx::query_as::<_, CourseModule>(
            "SELECT id, course_id, title, position, created_at, updated_at \
             FROM course_modules WHERE course_id = $1 ORDER BY position, created_at",
        )
        .bind(course_id)
        .fetch_all(pool)
        .await?;

        let lessons = sqlx::query_as::<_, Lesson>(
            r#"
            SELECT l.id, l.module_id, l.title, l.position, l.is_required, l.video_url,
                   l.created_at, l.updated_at
            FROM lessons l
            JOIN course_modules cm ON cm.id = l.module_id
            WHERE cm.course_id = $1
            ORDER BY l.position, l.created_at
            "#,
        )
        .bind(course_id)
        .fetch_all(pool)
        .await?;

        let lesson_count = lessons.len();
        let required_lesson_count = lessons.iter().filter(|l| l.is_required).count();

        let modules = modules
            .into_iter()
            .map(|module| {
                let lessons = lessons
                    .iter()
                    .filter(|l| l.module_id == module.id)
                    .cloned()
                    .collect();
                ModuleWithLessons { module, lessons }
            })
            .collect();

        Ok(Some(CourseTree {
            course,
            modules,
            lesson_count,
            required_lesson_count,
        }))
    }

    pub async fn create_module(
        pool: &PgPool,
        course_id: Uuid,
        data: &NewCourseModule,
    ) -> Result<Option<CourseModule>, DatabaseError> {
        if Self::get_course(pool, course_id).await?.is_none() {
            return Ok(None);
        }
        let module = sqlx::query_as::<_, CourseModule>(
            r#"
            INSERT INTO course_modules (id, course_id, title, position)
            VALUES ($1, $2, $3, $4)
            RETURNING id, course_id, title, position, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(course_id)
        .bind(&data.title)
        .bind(data.position.unwrap_or(0))
        .fetch_one(pool)
        .await?;
        Ok(Some(module))
    }

    pub async fn create_lesson(
        pool: &PgPool,
        module_id: Uuid,
        data: &NewLesson,
    ) -> Result<Option<Lesson>, DatabaseError> {
        let module_exists =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM course_modules WHERE id = $1")
                .bind(module_id)
                .fetch_one(pool)
                .await?;
        if module_exists == 0 {
            return Ok(None);
        }

        let lesson = sqlx::query_as::<_, Lesson>(
            r#"
            INSERT INTO lessons (id, module_id, title, position, is_required, video_url)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, module_id, title, position, is_required, video_url, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(module_id)
        .bind(&data.title)
        .bind(data.position.unwrap_or(0))
        .bind(data.is_required.unwrap_or(true))
        .bind(&data.video_url)
        .fetch_one(pool)
        .await?;
        Ok(Some(lesson))
    }
}
