use deadpool_postgres::Pool;
use tokio_postgres::{types::Json, Row};
use uuid::Uuid;
use crate::{
    error::{AppError, Result},
    models::{
        course::{discounted_price, Course, CourseChanges, CourseModeration, Level, Milestone, NewCourse},
        pagination::Page,
        user::UserSummary,
    },
};

/// Course columns joined with the owning instructor. Expects the course
/// relation aliased `c` and the instructor `u`.
const COURSE_SELECT: &str = r#"
    c.id, c.title, c.description, c.price, c.discount, c.category, c.level,
    c.thumbnail, c.milestones, c.students_enrolled, c.rating, c.total_reviews,
    c.is_published, c.featured, c.requirements, c.learning_outcomes,
    c.created_at, c.updated_at,
    u.id AS instructor_id, u.name AS instructor_name,
    u.email AS instructor_email, u.avatar AS instructor_avatar
"#;

/// Public listing filters. `None` means "any".
#[derive(Debug, Default, Clone)]
pub struct CourseFilter {
    pub category: Option<String>,
    pub level: Option<Level>,
    pub instructor: Option<Uuid>,
}

/// Result of an enrollment attempt.
#[derive(Debug)]
pub enum EnrollOutcome {
    Enrolled(Course),
    AlreadyEnrolled,
    NotFound,
}

/// A helper function to map a joined row to a `Course`.
fn row_to_course(row: &Row) -> Result<Course> {
    let price: f64 = row.try_get("price").map_err(|_| AppError::MissingData("price".to_string()))?;
    let discount: f64 = row.try_get("discount").map_err(|_| AppError::MissingData("discount".to_string()))?;
    let milestones: Json<Vec<Milestone>> = row.try_get("milestones").map_err(|_| AppError::MissingData("milestones".to_string()))?;

    Ok(Course {
        id: row.try_get("id").map_err(|_| AppError::MissingData("id".to_string()))?,
        title: row.try_get("title").map_err(|_| AppError::MissingData("title".to_string()))?,
        description: row.try_get("description").map_err(|_| AppError::MissingData("description".to_string()))?,
        instructor: UserSummary {
            id: row.try_get("instructor_id").map_err(|_| AppError::MissingData("instructor_id".to_string()))?,
            name: row.try_get("instructor_name").map_err(|_| AppError::MissingData("instructor_name".to_string()))?,
            email: row.try_get("instructor_email").map_err(|_| AppError::MissingData("instructor_email".to_string()))?,
            avatar: row.try_get("instructor_avatar").map_err(|_| AppError::MissingData("instructor_avatar".to_string()))?,
        },
        price,
        discount,
        discounted_price: discounted_price(price, discount),
        category: row.try_get("category").map_err(|_| AppError::MissingData("category".to_string()))?,
        level: row.try_get("level").map_err(|_| AppError::MissingData("level".to_string()))?,
        thumbnail: row.try_get("thumbnail").map_err(|_| AppError::MissingData("thumbnail".to_string()))?,
        milestones: milestones.0,
        students_enrolled: row.try_get("students_enrolled").map_err(|_| AppError::MissingData("students_enrolled".to_string()))?,
        rating: row.try_get("rating").map_err(|_| AppError::MissingData("rating".to_string()))?,
        total_reviews: row.try_get("total_reviews").map_err(|_| AppError::MissingData("total_reviews".to_string()))?,
        is_published: row.try_get("is_published").map_err(|_| AppError::MissingData("is_published".to_string()))?,
        featured: row.try_get("featured").map_err(|_| AppError::MissingData("featured".to_string()))?,
        requirements: row.try_get("requirements").map_err(|_| AppError::MissingData("requirements".to_string()))?,
        learning_outcomes: row.try_get("learning_outcomes").map_err(|_| AppError::MissingData("learning_outcomes".to_string()))?,
        created_at: row.try_get("created_at").map_err(|_| AppError::MissingData("created_at".to_string()))?,
        updated_at: row.try_get("updated_at").map_err(|_| AppError::MissingData("updated_at".to_string()))?,
    })
}

fn rows_to_courses(rows: &[Row]) -> Result<Vec<Course>> {
    rows.iter().map(row_to_course).collect()
}

fn count_from(row: &Row) -> Result<i64> {
    row.try_get(0)
        .map_err(|_| AppError::MissingData("count".to_string()))
}

/// Creates a course owned by `instructor_id`.
pub async fn create_course(pool: &Pool, instructor_id: &Uuid, course: &NewCourse) -> Result<Course> {
    let client = pool.get().await?;
    let row = client
        .query_one(
            &format!(
                r#"
                WITH c AS (
                    INSERT INTO courses (
                        instructor_id, title, description, price, discount,
                        category, level, thumbnail, requirements, learning_outcomes
                    )
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                    RETURNING *
                )
                SELECT {COURSE_SELECT}
                FROM c JOIN users u ON u.id = c.instructor_id
                "#
            ),
            &[
                instructor_id,
                &course.title,
                &course.description,
                &course.price,
                &course.discount,
                &course.category,
                &course.level,
                &course.thumbnail,
                &course.requirements,
                &course.learning_outcomes,
            ],
        )
        .await?;
    row_to_course(&row)
}

/// Finds a course by its ID, published or not.
pub async fn find_by_id(pool: &Pool, course_id: &Uuid) -> Result<Option<Course>> {
    let client = pool.get().await?;
    let row = client
        .query_opt(
            &format!(
                r#"
                SELECT {COURSE_SELECT}
                FROM courses c JOIN users u ON u.id = c.instructor_id
                WHERE c.id = $1
                "#
            ),
            &[course_id],
        )
        .await?;
    row.map(|r| row_to_course(&r)).transpose()
}

/// Published courses matching `filter`, newest first, with the total count.
pub async fn list_published(
    pool: &Pool,
    filter: &CourseFilter,
    page: Page,
) -> Result<(Vec<Course>, i64)> {
    const PUBLISHED_FILTER: &str = r#"
        c.is_published = true
        AND ($1::text IS NULL OR c.category = $1)
        AND ($2::course_level IS NULL OR c.level = $2)
        AND ($3::uuid IS NULL OR c.instructor_id = $3)
    "#;

    let client = pool.get().await?;
    let rows = client
        .query(
            &format!(
                r#"
                SELECT {COURSE_SELECT}
                FROM courses c JOIN users u ON u.id = c.instructor_id
                WHERE {PUBLISHED_FILTER}
                ORDER BY c.created_at DESC
                LIMIT $4 OFFSET $5
                "#
            ),
            &[
                &filter.category,
                &filter.level,
                &filter.instructor,
                &page.limit,
                &page.offset(),
            ],
        )
        .await?;
    let total = client
        .query_one(
            &format!("SELECT COUNT(*) FROM courses c WHERE {PUBLISHED_FILTER}"),
            &[&filter.category, &filter.level, &filter.instructor],
        )
        .await?;

    Ok((rows_to_courses(&rows)?, count_from(&total)?))
}

/// Courses `student_id` is enrolled in, newest first, with the total count.
pub async fn list_enrolled(
    pool: &Pool,
    student_id: &Uuid,
    page: Page,
) -> Result<(Vec<Course>, i64)> {
    let client = pool.get().await?;
    let rows = client
        .query(
            &format!(
                r#"
                SELECT {COURSE_SELECT}
                FROM courses c JOIN users u ON u.id = c.instructor_id
                WHERE $1 = ANY(c.students_enrolled)
                ORDER BY c.created_at DESC
                LIMIT $2 OFFSET $3
                "#
            ),
            &[student_id, &page.limit, &page.offset()],
        )
        .await?;
    let total = client
        .query_one(
            "SELECT COUNT(*) FROM courses WHERE $1 = ANY(students_enrolled)",
            &[student_id],
        )
        .await?;

    Ok((rows_to_courses(&rows)?, count_from(&total)?))
}

/// Applies `changes` when `owner_id` owns the course.
///
/// Returns `None` when the course is missing or owned by someone else.
pub async fn update_owned(
    pool: &Pool,
    course_id: &Uuid,
    owner_id: &Uuid,
    changes: &CourseChanges,
) -> Result<Option<Course>> {
    let client = pool.get().await?;
    let row = client
        .query_opt(
            &format!(
                r#"
                WITH c AS (
                    UPDATE courses
                    SET
                        title = COALESCE($3, title),
                        description = COALESCE($4, description),
                        price = COALESCE($5, price),
                        discount = COALESCE($6, discount),
                        category = COALESCE($7, category),
                        level = COALESCE($8, level),
                        thumbnail = COALESCE($9, thumbnail),
                        is_published = COALESCE($10, is_published),
                        updated_at = NOW()
                    WHERE id = $1 AND instructor_id = $2
                    RETURNING *
                )
                SELECT {COURSE_SELECT}
                FROM c JOIN users u ON u.id = c.instructor_id
                "#
            ),
            &[
                course_id,
                owner_id,
                &changes.title,
                &changes.description,
                &changes.price,
                &changes.discount,
                &changes.category,
                &changes.level,
                &changes.thumbnail,
                &changes.is_published,
            ],
        )
        .await?;
    row.map(|r| row_to_course(&r)).transpose()
}

/// Deletes the course when `owner_id` owns it. Returns whether a row went.
pub async fn delete_owned(pool: &Pool, course_id: &Uuid, owner_id: &Uuid) -> Result<bool> {
    let client = pool.get().await?;
    let removed = client
        .execute(
            "DELETE FROM courses WHERE id = $1 AND instructor_id = $2",
            &[course_id, owner_id],
        )
        .await?;
    Ok(removed > 0)
}

/// Ids of the courses `user_id` teaches or is enrolled in.
pub async fn ids_touching_user(pool: &Pool, user_id: &Uuid) -> Result<Vec<Uuid>> {
    let client = pool.get().await?;
    let rows = client
        .query(
            "SELECT id FROM courses WHERE instructor_id = $1 OR $1 = ANY(students_enrolled)",
            &[user_id],
        )
        .await?;
    rows.iter()
        .map(|row| row.try_get("id").map_err(|_| AppError::MissingData("id".to_string())))
        .collect()
}

/// Adds `student_id` to the roster.
///
/// The membership test and the append run as one statement, so two
/// concurrent requests cannot both enroll the same student.
pub async fn enroll(pool: &Pool, course_id: &Uuid, student_id: &Uuid) -> Result<EnrollOutcome> {
    let client = pool.get().await?;
    let row = client
        .query_opt(
            &format!(
                r#"
                WITH c AS (
                    UPDATE courses
                    SET
                        students_enrolled = array_append(students_enrolled, $2),
                        updated_at = NOW()
                    WHERE id = $1 AND NOT ($2 = ANY(students_enrolled))
                    RETURNING *
                )
                SELECT {COURSE_SELECT}
                FROM c JOIN users u ON u.id = c.instructor_id
                "#
            ),
            &[course_id, student_id],
        )
        .await?;

    if let Some(row) = row {
        return Ok(EnrollOutcome::Enrolled(row_to_course(&row)?));
    }

    let exists = client
        .query_one("SELECT EXISTS(SELECT 1 FROM courses WHERE id = $1)", &[course_id])
        .await?;
    let exists: bool = exists
        .try_get(0)
        .map_err(|_| AppError::MissingData("exists".to_string()))?;

    Ok(if exists {
        EnrollOutcome::AlreadyEnrolled
    } else {
        EnrollOutcome::NotFound
    })
}

/// Rewrites the milestone list of an owned course inside a transaction.
///
/// The row is locked while `edit` runs. `edit` may reject the change, in
/// which case nothing is written. Returns `None` when the course is missing
/// or owned by someone else.
pub async fn edit_milestones<F, T>(
    pool: &Pool,
    course_id: &Uuid,
    owner_id: &Uuid,
    edit: F,
) -> Result<Option<(Course, T)>>
where
    F: FnOnce(&mut Vec<Milestone>) -> Result<T>,
{
    let mut client = pool.get().await?;
    let transaction = client.transaction().await?;

    let locked = transaction
        .query_opt(
            "SELECT milestones FROM courses WHERE id = $1 AND instructor_id = $2 FOR UPDATE",
            &[course_id, owner_id],
        )
        .await?;
    let Some(locked) = locked else {
        return Ok(None);
    };

    let Json(mut milestones): Json<Vec<Milestone>> = locked
        .try_get("milestones")
        .map_err(|_| AppError::MissingData("milestones".to_string()))?;
    let output = edit(&mut milestones)?;

    let row = transaction
        .query_one(
            &format!(
                r#"
                WITH c AS (
                    UPDATE courses
                    SET milestones = $2, updated_at = NOW()
                    WHERE id = $1
                    RETURNING *
                )
                SELECT {COURSE_SELECT}
                FROM c JOIN users u ON u.id = c.instructor_id
                "#
            ),
            &[course_id, &Json(&milestones)],
        )
        .await?;
    let course = row_to_course(&row)?;

    transaction.commit().await?;
    Ok(Some((course, output)))
}

/// Every course regardless of status, newest first, with the total count.
///
/// `published` narrows to published (`Some(true)`) or unpublished courses.
pub async fn list_all(
    pool: &Pool,
    published: Option<bool>,
    page: Page,
) -> Result<(Vec<Course>, i64)> {
    let client = pool.get().await?;
    let rows = client
        .query(
            &format!(
                r#"
                SELECT {COURSE_SELECT}
                FROM courses c JOIN users u ON u.id = c.instructor_id
                WHERE ($1::boolean IS NULL OR c.is_published = $1)
                ORDER BY c.created_at DESC
                LIMIT $2 OFFSET $3
                "#
            ),
            &[&published, &page.limit, &page.offset()],
        )
        .await?;
    let total = client
        .query_one(
            "SELECT COUNT(*) FROM courses WHERE ($1::boolean IS NULL OR is_published = $1)",
            &[&published],
        )
        .await?;

    Ok((rows_to_courses(&rows)?, count_from(&total)?))
}

/// Admin moderation of publication and featuring.
pub async fn moderate(
    pool: &Pool,
    course_id: &Uuid,
    moderation: &CourseModeration,
) -> Result<Option<Course>> {
    let client = pool.get().await?;
    let row = client
        .query_opt(
            &format!(
                r#"
                WITH c AS (
                    UPDATE courses
                    SET
                        is_published = COALESCE($2, is_published),
                        featured = COALESCE($3, featured),
                        updated_at = NOW()
                    WHERE id = $1
                    RETURNING *
                )
                SELECT {COURSE_SELECT}
                FROM c JOIN users u ON u.id = c.instructor_id
                "#
            ),
            &[course_id, &moderation.is_published, &moderation.featured],
        )
        .await?;
    row.map(|r| row_to_course(&r)).transpose()
}

/// Total number of courses.
pub async fn count(pool: &Pool) -> Result<i64> {
    let client = pool.get().await?;
    let row = client.query_one("SELECT COUNT(*) FROM courses", &[]).await?;
    count_from(&row)
}

/// The `n` most recently created courses.
pub async fn recent(pool: &Pool, n: i64) -> Result<Vec<Course>> {
    let client = pool.get().await?;
    let rows = client
        .query(
            &format!(
                r#"
                SELECT {COURSE_SELECT}
                FROM courses c JOIN users u ON u.id = c.instructor_id
                ORDER BY c.created_at DESC
                LIMIT $1
                "#
            ),
            &[&n],
        )
        .await?;
    rows_to_courses(&rows)
}

/// Name and email of each listed user, in the order given.
///
/// Ids without a matching user are skipped.
pub async fn student_summaries(pool: &Pool, ids: &[Uuid]) -> Result<Vec<UserSummary>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let client = pool.get().await?;
    let rows = client
        .query(
            r#"
            SELECT id, name, email
            FROM users
            WHERE id = ANY($1)
            ORDER BY array_position($1, id)
            "#,
            &[&ids],
        )
        .await?;

    rows.iter()
        .map(|row| {
            Ok(UserSummary {
                id: row.try_get("id").map_err(|_| AppError::MissingData("id".to_string()))?,
                name: row.try_get("name").map_err(|_| AppError::MissingData("name".to_string()))?,
                email: row.try_get("email").map_err(|_| AppError::MissingData("email".to_string()))?,
                avatar: None,
            })
        })
        .collect()
}
