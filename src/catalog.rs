use serde::Deserialize;
use uuid::Uuid;

use crate::backend::{BackendError, BackendState};
use crate::models::Course;

/// CourseCatalog
///
/// Course and enrollment data access over the backend capability, scoped to
/// the current identity by its callers. Every failure is converted here into
/// an empty state or a boolean; nothing propagates to the view tree as an
/// uncaught error.
#[derive(Clone)]
pub struct CourseCatalog {
    backend: BackendState,
}

/// EnrollmentRow
///
/// The relation row as the backend returns it.
#[derive(Debug, Deserialize)]
struct EnrollmentRow {
    course_id: Uuid,
}

impl CourseCatalog {
    pub fn new(backend: BackendState) -> Self {
        Self { backend }
    }

    /// list_courses
    ///
    /// All courses, for the public landing page. A remote failure renders as
    /// an empty listing and is logged.
    pub async fn list_courses(&self) -> Vec<Course> {
        match self.backend.query_many("courses", &[]).await {
            Ok(rows) => rows
                .into_iter()
                .filter_map(|row| match serde_json::from_value::<Course>(row) {
                    Ok(course) => Some(course),
                    Err(e) => {
                        tracing::warn!("skipping malformed course row: {e}");
                        None
                    }
                })
                .collect(),
            Err(e) => {
                tracing::error!("course listing failed: {e}");
                vec![]
            }
        }
    }

    /// fetch_course
    ///
    /// One course by id. `None` covers both "no such course" and a failed
    /// query; the caller renders the not-found state either way.
    pub async fn fetch_course(&self, id: Uuid) -> Option<Course> {
        let row = match self
            .backend
            .query_one("courses", &[("id", id.to_string())])
            .await
        {
            Ok(row) => row,
            Err(BackendError::NotFound) => return None,
            Err(e) => {
                tracing::error!(course = %id, "course fetch failed: {e}");
                return None;
            }
        };
        match serde_json::from_value(row) {
            Ok(course) => Some(course),
            Err(e) => {
                tracing::error!(course = %id, "malformed course row: {e}");
                None
            }
        }
    }

    /// fetch_enrollment_status
    ///
    /// Whether an enrollment row exists for (user, course). Row existence is
    /// the sole enrollment truth.
    ///
    /// Known imprecision, kept deliberately: "no row" and "query error" both
    /// come out as `false` — they are not distinguished. The conflation is
    /// isolated behind this one function so a future correction is a one-line
    /// change.
    pub async fn fetch_enrollment_status(&self, user_id: Uuid, course_id: Uuid) -> bool {
        match self
            .backend
            .query_one(
                "enrollments",
                &[
                    ("user_id", user_id.to_string()),
                    ("course_id", course_id.to_string()),
                ],
            )
            .await
        {
            Ok(_) => true,
            Err(BackendError::NotFound) => false,
            Err(e) => {
                tracing::warn!(user = %user_id, course = %course_id, "enrollment check failed, treating as not enrolled: {e}");
                false
            }
        }
    }

    /// fetch_enrollments
    ///
    /// The courses the user is enrolled in, in the backend's default order
    /// (not guaranteed). An enrollment row pointing at a vanished course is
    /// skipped.
    pub async fn fetch_enrollments(&self, user_id: Uuid) -> Vec<Course> {
        let rows = match self
            .backend
            .query_many("enrollments", &[("user_id", user_id.to_string())])
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                tracing::error!(user = %user_id, "enrollment listing failed: {e}");
                return vec![];
            }
        };

        let mut courses = Vec::with_capacity(rows.len());
        for row in rows {
            let enrollment: EnrollmentRow = match serde_json::from_value(row) {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!("skipping malformed enrollment row: {e}");
                    continue;
                }
            };
            if let Some(course) = self.fetch_course(enrollment.course_id).await {
                courses.push(course);
            }
        }
        courses
    }

    /// enroll
    ///
    /// Creates one enrollment row. `false` means the backend rejected the
    /// insert (duplicate pair, constraint) or the call failed; callers
    /// surface that as a user-visible notice rather than an error.
    pub async fn enroll(&self, user_id: Uuid, course_id: Uuid) -> bool {
        let row = serde_json::json!({ "user_id": user_id, "course_id": course_id });
        match self.backend.insert("enrollments", row).await {
            Ok(()) => true,
            Err(BackendError::Rejected(reason)) => {
                tracing::info!(user = %user_id, course = %course_id, "enrollment rejected: {reason}");
                false
            }
            Err(e) => {
                tracing::error!(user = %user_id, course = %course_id, "enrollment failed: {e}");
                false
            }
        }
    }
}
