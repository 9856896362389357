//! # Course Store
//!
//! SQLite-backed storage for courses, their points and testing sessions.
//!
//! ## Tables
//!
//! 1. **courses**: classification metadata plus the derived metrics,
//!    flattened into columns so listings never touch the points.
//! 2. **points**: one row per point, keyed by `(course_id, point_id)`,
//!    cascade-deleted with their course.
//! 3. **testing_sessions**: graded answers from testing mode.
//!
//! ## Metric consistency
//!
//! Every operation that changes a course's point set rewrites the points and
//! the course's metrics in the same transaction, recomputing the metrics from
//! the complete stored point set. A course row never carries metrics computed
//! from a partial or stale set of points.

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Result as SqlResult, Row};

use crate::metrics::chronological_cmp;
use crate::testing::{summarize_sessions, TestingChallenge};
use crate::validation::{
    normalize_point, truncate_to_millis, validate_course_update, validate_new_course,
    validate_point,
};
use crate::{
    compute_course_metrics, Course, CourseError, CourseFilter, CourseMetrics, CourseMode,
    CoursePoint, CourseUpdate, CourseWithPoints, GeoPoint, LatLon, NewCourse, OptionExt,
    PointPatch, Result, SessionOutcome, SessionSubmission, StoreConfig, TestingSession,
    TestingStats,
};

const DEFAULT_CREATOR: &str = "anonymous";

const COURSE_COLUMNS: &str = "id, object_type, mode, created_by, noise_level,
    total_distance, avg_speed, total_speed_changes, total_direction_changes,
    total_altitude_changes, start_lat, start_lon, end_lat, end_lon, created_at, updated_at";

// ============================================================================
// SQL conversions
// ============================================================================

impl ToSql for CourseMode {
    fn to_sql(&self) -> SqlResult<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for CourseMode {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|_| FromSqlError::InvalidType)
    }
}

fn millis_to_datetime(idx: usize, millis: i64) -> SqlResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, millis))
}

fn course_from_row(row: &Row<'_>) -> SqlResult<Course> {
    Ok(Course {
        id: row.get(0)?,
        object_type: row.get(1)?,
        mode: row.get(2)?,
        created_by: row.get(3)?,
        noise_level: row.get(4)?,
        metrics: CourseMetrics {
            total_distance: row.get(5)?,
            avg_speed: row.get(6)?,
            total_speed_changes: row.get(7)?,
            total_direction_changes: row.get(8)?,
            total_altitude_changes: row.get(9)?,
            starting_point: LatLon::new(row.get(10)?, row.get(11)?),
            ending_point: LatLon::new(row.get(12)?, row.get(13)?),
        },
        created_at: millis_to_datetime(14, row.get(14)?)?,
        updated_at: millis_to_datetime(15, row.get(15)?)?,
    })
}

fn point_from_row(row: &Row<'_>) -> SqlResult<CoursePoint> {
    Ok(CoursePoint {
        point_id: row.get(0)?,
        point: GeoPoint {
            latitude: row.get(1)?,
            longitude: row.get(2)?,
            altitude: row.get(3)?,
            timestamp: millis_to_datetime(4, row.get(4)?)?,
        },
    })
}

// ============================================================================
// Course Store
// ============================================================================

/// SQLite course store.
///
/// Owns a single connection. Wrap it in a `Mutex` to share it between
/// threads; every mutating method takes `&mut self` and runs in a transaction.
#[derive(Debug)]
pub struct CourseStore {
    db: Connection,
    config: StoreConfig,
}

impl CourseStore {
    // ========================================================================
    // Initialization
    // ========================================================================

    /// Open (or create) the store described by `config`.
    pub fn open(config: &StoreConfig) -> Result<Self> {
        let db = Connection::open(&config.db_path)?;
        Self::init_schema(&db)?;
        log::info!("[CourseStore] Opened database at {}", config.db_path);

        Ok(Self {
            db,
            config: config.clone(),
        })
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> Result<Self> {
        Self::open(&StoreConfig::in_memory())
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Initialize the database schema.
    fn init_schema(conn: &Connection) -> SqlResult<()> {
        conn.execute_batch(
            r#"
            -- Course documents with their derived metrics
            CREATE TABLE IF NOT EXISTS courses (
                id TEXT PRIMARY KEY,
                object_type TEXT NOT NULL,
                mode TEXT NOT NULL,
                created_by TEXT NOT NULL,
                noise_level REAL NOT NULL DEFAULT 0,
                total_distance REAL NOT NULL,
                avg_speed REAL NOT NULL,
                total_speed_changes INTEGER NOT NULL,
                total_direction_changes INTEGER NOT NULL,
                total_altitude_changes REAL NOT NULL,
                start_lat REAL NOT NULL,
                start_lon REAL NOT NULL,
                end_lat REAL NOT NULL,
                end_lon REAL NOT NULL,
                created_at INTEGER NOT NULL,  -- Unix millis
                updated_at INTEGER NOT NULL   -- Unix millis
            );

            -- Points of each course
            CREATE TABLE IF NOT EXISTS points (
                course_id TEXT NOT NULL,
                point_id TEXT NOT NULL,
                seq INTEGER NOT NULL,         -- numeric suffix of point_id
                lat REAL NOT NULL,
                lon REAL NOT NULL,
                altitude REAL NOT NULL,
                timestamp INTEGER NOT NULL,   -- Unix millis
                PRIMARY KEY (course_id, point_id),
                FOREIGN KEY (course_id) REFERENCES courses(id) ON DELETE CASCADE
            );

            -- Graded testing-mode answers
            CREATE TABLE IF NOT EXISTS testing_sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                course_id TEXT NOT NULL,
                selected_object_type TEXT NOT NULL,
                correct_object_type TEXT NOT NULL,
                is_correct INTEGER NOT NULL,
                answered_at INTEGER NOT NULL
            );

            -- Indexes
            CREATE INDEX IF NOT EXISTS idx_courses_mode ON courses(mode);
            CREATE INDEX IF NOT EXISTS idx_courses_object_type ON courses(object_type);
            CREATE INDEX IF NOT EXISTS idx_courses_created ON courses(created_at);
            CREATE INDEX IF NOT EXISTS idx_points_course_time ON points(course_id, timestamp);

            -- Enable foreign keys
            PRAGMA foreign_keys = ON;
        "#,
        )?;
        Ok(())
    }

    // ========================================================================
    // Courses
    // ========================================================================

    /// Validate and store a new course, computing its metrics.
    ///
    /// Points get ids `p1..pn` in request order.
    pub fn create_course(&mut self, request: NewCourse) -> Result<CourseWithPoints> {
        validate_new_course(&request)?;

        let now = now_millis();
        let points: Vec<CoursePoint> = request
            .points
            .iter()
            .enumerate()
            .map(|(i, p)| CoursePoint::new(format!("p{}", i + 1), normalize_point(p)))
            .collect();
        let geo: Vec<GeoPoint> = points.iter().map(|p| p.point).collect();
        let metrics = compute_course_metrics(&geo);

        let course = Course {
            id: uuid::Uuid::new_v4().to_string(),
            object_type: request.object_type,
            mode: request.mode,
            created_by: request
                .created_by
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_CREATOR.to_string()),
            noise_level: request.noise_level,
            metrics,
            created_at: now,
            updated_at: now,
        };

        let tx = self.db.transaction()?;
        tx.execute(
            "INSERT INTO courses (id, object_type, mode, created_by, noise_level,
                total_distance, avg_speed, total_speed_changes, total_direction_changes,
                total_altitude_changes, start_lat, start_lon, end_lat, end_lon,
                created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                course.id,
                course.object_type,
                course.mode,
                course.created_by,
                course.noise_level,
                metrics.total_distance,
                metrics.avg_speed,
                metrics.total_speed_changes,
                metrics.total_direction_changes,
                metrics.total_altitude_changes,
                metrics.starting_point.latitude,
                metrics.starting_point.longitude,
                metrics.ending_point.latitude,
                metrics.ending_point.longitude,
                course.created_at.timestamp_millis(),
                course.updated_at.timestamp_millis(),
            ],
        )?;
        insert_points(&tx, &course.id, &points)?;
        tx.commit()?;

        log::info!(
            "[CourseStore] Created course {} ({}, {} points, {:.2}m)",
            course.id,
            course.object_type,
            points.len(),
            metrics.total_distance
        );

        Ok(CourseWithPoints {
            course,
            points: sort_chronologically(points),
        })
    }

    /// Get a course with its points ordered by timestamp.
    pub fn get_course(&self, id: &str) -> Result<CourseWithPoints> {
        let course = load_course(&self.db, id)?.ok_or_not_found("Course", id)?;
        let points = load_points(&self.db, id)?;
        Ok(CourseWithPoints { course, points })
    }

    /// Check if a course exists.
    pub fn has_course(&self, id: &str) -> Result<bool> {
        Ok(load_course(&self.db, id)?.is_some())
    }

    /// List courses, newest first.
    pub fn list_courses(&self, filter: &CourseFilter) -> Result<Vec<Course>> {
        let limit = self.config.effective_limit(filter.limit) as i64;
        let mut stmt = self.db.prepare(&format!(
            "SELECT {} FROM courses
             WHERE (?1 IS NULL OR mode = ?1)
               AND (?2 IS NULL OR object_type = ?2)
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?3",
            COURSE_COLUMNS
        ))?;

        let courses = stmt
            .query_map(params![filter.mode, filter.object_type, limit], course_from_row)?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(courses)
    }

    /// Get course count.
    pub fn course_count(&self) -> Result<usize> {
        let count: i64 = self
            .db
            .query_row("SELECT COUNT(*) FROM courses", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Apply a partial update. A non-empty point list replaces all points and
    /// recomputes the metrics.
    pub fn update_course(&mut self, id: &str, update: CourseUpdate) -> Result<CourseWithPoints> {
        validate_course_update(&update)?;

        let tx = self.db.transaction()?;
        let mut course = load_course(&tx, id)?.ok_or_not_found("Course", id)?;

        if let Some(object_type) = update.object_type.as_ref() {
            course.object_type = object_type.clone();
        }
        if let Some(mode) = update.mode {
            course.mode = mode;
        }
        if let Some(noise_level) = update.noise_level {
            course.noise_level = noise_level;
        }
        course.updated_at = now_millis();

        tx.execute(
            "UPDATE courses SET object_type = ?, mode = ?, noise_level = ?, updated_at = ?
             WHERE id = ?",
            params![
                course.object_type,
                course.mode,
                course.noise_level,
                course.updated_at.timestamp_millis(),
                id
            ],
        )?;

        if let Some(replacement) = update.replacement_points() {
            let points: Vec<CoursePoint> = replacement
                .iter()
                .enumerate()
                .map(|(i, p)| CoursePoint::new(format!("p{}", i + 1), normalize_point(p)))
                .collect();
            tx.execute("DELETE FROM points WHERE course_id = ?", params![id])?;
            insert_points(&tx, id, &points)?;
            course.metrics = recompute_metrics(&tx, id, course.updated_at)?;
            log::info!(
                "[CourseStore] Replaced points of course {} ({} points)",
                id,
                points.len()
            );
        }

        let points = load_points(&tx, id)?;
        tx.commit()?;

        Ok(CourseWithPoints { course, points })
    }

    /// Delete a course and all of its points.
    pub fn delete_course(&mut self, id: &str) -> Result<()> {
        let deleted = self
            .db
            .execute("DELETE FROM courses WHERE id = ?", params![id])?;
        if deleted == 0 {
            return Err(CourseError::not_found("Course", id));
        }
        log::info!("[CourseStore] Deleted course {}", id);
        Ok(())
    }

    /// All courses with their points, oldest first (for export).
    pub fn all_courses_with_points(&self) -> Result<Vec<CourseWithPoints>> {
        let mut stmt = self.db.prepare(&format!(
            "SELECT {} FROM courses ORDER BY created_at ASC, rowid ASC",
            COURSE_COLUMNS
        ))?;
        let courses = stmt
            .query_map([], course_from_row)?
            .collect::<SqlResult<Vec<_>>>()?;

        courses
            .into_iter()
            .map(|course| {
                let points = load_points(&self.db, &course.id)?;
                Ok(CourseWithPoints { course, points })
            })
            .collect()
    }

    // ========================================================================
    // Points
    // ========================================================================

    /// Points of a course ordered by timestamp.
    pub fn list_points(&self, course_id: &str) -> Result<Vec<CoursePoint>> {
        if !self.has_course(course_id)? {
            return Err(CourseError::not_found("Course", course_id));
        }
        Ok(load_points(&self.db, course_id)?)
    }

    /// Append a point to a course and recompute its metrics.
    pub fn add_point(&mut self, course_id: &str, point: GeoPoint) -> Result<CoursePoint> {
        validate_point(&point, "point")?;

        let tx = self.db.transaction()?;
        load_course(&tx, course_id)?.ok_or_not_found("Course", course_id)?;

        let next_seq: i64 = tx.query_row(
            "SELECT COALESCE(MAX(seq), 0) + 1 FROM points WHERE course_id = ?",
            params![course_id],
            |row| row.get(0),
        )?;
        let stored = CoursePoint::new(format!("p{}", next_seq), normalize_point(&point));
        insert_points(&tx, course_id, std::slice::from_ref(&stored))?;
        recompute_metrics(&tx, course_id, now_millis())?;
        tx.commit()?;

        log::debug!(
            "[CourseStore] Added point {} to course {}",
            stored.point_id,
            course_id
        );
        Ok(stored)
    }

    /// Patch a single point and recompute the course's metrics.
    pub fn update_point(
        &mut self,
        course_id: &str,
        point_id: &str,
        patch: PointPatch,
    ) -> Result<CoursePoint> {
        let tx = self.db.transaction()?;
        let existing = load_point(&tx, course_id, point_id)?.ok_or_not_found("Point", point_id)?;

        let updated = CoursePoint::new(point_id, normalize_point(&patch.apply(&existing.point)));
        validate_point(&updated.point, "point")?;

        if !patch.is_empty() {
            tx.execute(
                "UPDATE points SET lat = ?, lon = ?, altitude = ?, timestamp = ?
                 WHERE course_id = ? AND point_id = ?",
                params![
                    updated.point.latitude,
                    updated.point.longitude,
                    updated.point.altitude,
                    updated.point.timestamp.timestamp_millis(),
                    course_id,
                    point_id
                ],
            )?;
            recompute_metrics(&tx, course_id, now_millis())?;
        }
        tx.commit()?;

        log::debug!(
            "[CourseStore] Updated point {} of course {}",
            point_id,
            course_id
        );
        Ok(updated)
    }

    /// Delete a single point and recompute the course's metrics.
    pub fn delete_point(&mut self, course_id: &str, point_id: &str) -> Result<()> {
        let tx = self.db.transaction()?;
        let deleted = tx.execute(
            "DELETE FROM points WHERE course_id = ? AND point_id = ?",
            params![course_id, point_id],
        )?;
        if deleted == 0 {
            return Err(CourseError::not_found("Point", point_id));
        }
        recompute_metrics(&tx, course_id, now_millis())?;
        tx.commit()?;

        log::debug!(
            "[CourseStore] Deleted point {} of course {}",
            point_id,
            course_id
        );
        Ok(())
    }

    // ========================================================================
    // Testing mode
    // ========================================================================

    /// Pick a random training course as a testing challenge.
    pub fn random_training_course<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
    ) -> Result<TestingChallenge> {
        let mut stmt = self
            .db
            .prepare("SELECT id FROM courses WHERE mode = ? ORDER BY created_at, rowid")?;
        let ids = stmt
            .query_map(params![CourseMode::Training], |row| row.get::<_, String>(0))?
            .collect::<SqlResult<Vec<_>>>()?;

        let id = ids
            .choose(rng)
            .ok_or_not_found("Training course", "random")?;
        let course = self.get_course(id)?;
        Ok(TestingChallenge::from_course(course))
    }

    /// Grade and record a player's answer against the course's stored object type.
    pub fn record_testing_session(
        &mut self,
        submission: SessionSubmission,
    ) -> Result<SessionOutcome> {
        if submission.course_id.trim().is_empty() {
            return Err(CourseError::invalid("course_id", "must not be empty"));
        }
        if submission.selected_object_type.trim().is_empty() {
            return Err(CourseError::invalid("selected_object_type", "must not be empty"));
        }

        let course = load_course(&self.db, &submission.course_id)?
            .ok_or_not_found("Course", &submission.course_id)?;
        let session = TestingSession::grade(&submission, &course.object_type, now_millis());

        self.db.execute(
            "INSERT INTO testing_sessions
                (course_id, selected_object_type, correct_object_type, is_correct, answered_at)
             VALUES (?, ?, ?, ?, ?)",
            params![
                session.course_id,
                session.selected_object_type,
                session.correct_object_type,
                session.is_correct,
                session.answered_at.timestamp_millis()
            ],
        )?;

        log::info!(
            "[CourseStore] Recorded testing session for course {} (correct: {})",
            session.course_id,
            session.is_correct
        );
        Ok(SessionOutcome::from(session))
    }

    /// All recorded sessions, oldest first.
    pub fn testing_sessions(&self) -> Result<Vec<TestingSession>> {
        let mut stmt = self.db.prepare(
            "SELECT course_id, selected_object_type, correct_object_type, is_correct, answered_at
             FROM testing_sessions ORDER BY id",
        )?;
        let sessions = stmt
            .query_map([], |row| {
                Ok(TestingSession {
                    course_id: row.get(0)?,
                    selected_object_type: row.get(1)?,
                    correct_object_type: row.get(2)?,
                    is_correct: row.get(3)?,
                    answered_at: millis_to_datetime(4, row.get(4)?)?,
                })
            })?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(sessions)
    }

    /// Overall and per-object-type accuracy across recorded sessions.
    pub fn testing_stats(&self) -> Result<TestingStats> {
        Ok(summarize_sessions(&self.testing_sessions()?))
    }
}

// ============================================================================
// Database helpers
// ============================================================================

fn now_millis() -> DateTime<Utc> {
    truncate_to_millis(Utc::now())
}

fn load_course(conn: &Connection, id: &str) -> SqlResult<Option<Course>> {
    conn.query_row(
        &format!("SELECT {} FROM courses WHERE id = ?", COURSE_COLUMNS),
        params![id],
        course_from_row,
    )
    .optional()
}

fn load_points(conn: &Connection, course_id: &str) -> SqlResult<Vec<CoursePoint>> {
    let mut stmt = conn.prepare(
        "SELECT point_id, lat, lon, altitude, timestamp FROM points
         WHERE course_id = ? ORDER BY timestamp ASC, seq ASC",
    )?;
    let points = stmt
        .query_map(params![course_id], point_from_row)?
        .collect::<SqlResult<Vec<_>>>()?;
    Ok(sort_chronologically(points))
}

fn load_point(
    conn: &Connection,
    course_id: &str,
    point_id: &str,
) -> SqlResult<Option<CoursePoint>> {
    conn.query_row(
        "SELECT point_id, lat, lon, altitude, timestamp FROM points
         WHERE course_id = ? AND point_id = ?",
        params![course_id, point_id],
        point_from_row,
    )
    .optional()
}

fn insert_points(conn: &Connection, course_id: &str, points: &[CoursePoint]) -> SqlResult<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO points (course_id, point_id, seq, lat, lon, altitude, timestamp)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )?;
    for p in points {
        stmt.execute(params![
            course_id,
            p.point_id,
            point_seq(&p.point_id),
            p.point.latitude,
            p.point.longitude,
            p.point.altitude,
            p.point.timestamp.timestamp_millis()
        ])?;
    }
    Ok(())
}

/// Recompute a course's metrics from its complete stored point set and save them.
fn recompute_metrics(
    conn: &Connection,
    course_id: &str,
    updated_at: DateTime<Utc>,
) -> SqlResult<CourseMetrics> {
    let points: Vec<GeoPoint> = load_points(conn, course_id)?
        .into_iter()
        .map(|p| p.point)
        .collect();
    let metrics = compute_course_metrics(&points);

    conn.execute(
        "UPDATE courses SET total_distance = ?, avg_speed = ?, total_speed_changes = ?,
            total_direction_changes = ?, total_altitude_changes = ?,
            start_lat = ?, start_lon = ?, end_lat = ?, end_lon = ?, updated_at = ?
         WHERE id = ?",
        params![
            metrics.total_distance,
            metrics.avg_speed,
            metrics.total_speed_changes,
            metrics.total_direction_changes,
            metrics.total_altitude_changes,
            metrics.starting_point.latitude,
            metrics.starting_point.longitude,
            metrics.ending_point.latitude,
            metrics.ending_point.longitude,
            updated_at.timestamp_millis(),
            course_id
        ],
    )?;

    log::debug!(
        "[CourseStore] Recomputed metrics for course {} from {} points",
        course_id,
        points.len()
    );
    Ok(metrics)
}

/// Numeric suffix of a `p<n>` point id (0 for foreign ids).
fn point_seq(point_id: &str) -> i64 {
    point_id
        .strip_prefix('p')
        .and_then(|n| n.parse().ok())
        .unwrap_or(0)
}

/// Points in the order the metrics walk them, exact duplicates by `seq`.
fn sort_chronologically(mut points: Vec<CoursePoint>) -> Vec<CoursePoint> {
    points.sort_by(|a, b| {
        chronological_cmp(&a.point, &b.point)
            .then_with(|| point_seq(&a.point_id).cmp(&point_seq(&b.point_id)))
    });
    points
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn t(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + seconds, 0).unwrap()
    }

    fn sample_points() -> Vec<GeoPoint> {
        vec![
            GeoPoint::new(0.0, 0.0, 0.0, t(0)),
            GeoPoint::new(0.0, 0.01, 5.0, t(100)),
            GeoPoint::new(0.01, 0.01, 2.0, t(200)),
        ]
    }

    fn create(store: &mut CourseStore, object_type: &str, mode: CourseMode) -> CourseWithPoints {
        store
            .create_course(NewCourse::new(object_type, mode, sample_points()))
            .unwrap()
    }

    #[test]
    fn test_create_store() {
        let store = CourseStore::in_memory().unwrap();
        assert_eq!(store.course_count().unwrap(), 0);
    }

    #[test]
    fn test_create_course() {
        let mut store = CourseStore::in_memory().unwrap();
        let created = create(&mut store, "car", CourseMode::Training);

        assert_eq!(created.course.created_by, "anonymous");
        assert_eq!(created.course.metrics, compute_course_metrics(&sample_points()));
        assert_eq!(created.course.metrics.total_direction_changes, 1);
        let ids: Vec<&str> = created.points.iter().map(|p| p.point_id.as_str()).collect();
        assert_eq!(ids, vec!["p1", "p2", "p3"]);

        let loaded = store.get_course(&created.course.id).unwrap();
        assert_eq!(loaded, created);
    }

    #[test]
    fn test_create_rejects_invalid_request() {
        let mut store = CourseStore::in_memory().unwrap();
        let request =
            NewCourse::new("car", CourseMode::Training, sample_points()).with_noise_level(101.0);
        assert!(matches!(
            store.create_course(request),
            Err(CourseError::InvalidInput { .. })
        ));
        assert_eq!(store.course_count().unwrap(), 0);
    }

    #[test]
    fn test_points_returned_in_time_order() {
        let mut store = CourseStore::in_memory().unwrap();
        let mut points = sample_points();
        points.reverse();
        let created = store
            .create_course(NewCourse::new("boat", CourseMode::Testing, points))
            .unwrap();

        // p1 was given last in time
        let ids: Vec<&str> = created.points.iter().map(|p| p.point_id.as_str()).collect();
        assert_eq!(ids, vec!["p3", "p2", "p1"]);
        assert_eq!(created.course.metrics, compute_course_metrics(&sample_points()));
    }

    #[test]
    fn test_get_unknown_course() {
        let store = CourseStore::in_memory().unwrap();
        assert!(matches!(
            store.get_course("missing"),
            Err(CourseError::NotFound { entity: "Course", .. })
        ));
    }

    #[test]
    fn test_list_filters_and_order() {
        let mut store = CourseStore::in_memory().unwrap();
        let first = create(&mut store, "car", CourseMode::Training);
        let second = create(&mut store, "plane", CourseMode::Training);
        let third = create(&mut store, "car", CourseMode::Testing);

        let all = store.list_courses(&CourseFilter::default()).unwrap();
        let ids: Vec<&str> = all.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                third.course.id.as_str(),
                second.course.id.as_str(),
                first.course.id.as_str()
            ]
        );

        let training = store
            .list_courses(&CourseFilter::default().mode(CourseMode::Training))
            .unwrap();
        assert_eq!(training.len(), 2);

        let cars = store
            .list_courses(&CourseFilter::default().object_type("car").mode(CourseMode::Testing))
            .unwrap();
        assert_eq!(cars.len(), 1);
        assert_eq!(cars[0].id, third.course.id);

        let limited = store.list_courses(&CourseFilter::default().limit(1)).unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn test_update_metadata_keeps_metrics() {
        let mut store = CourseStore::in_memory().unwrap();
        let created = create(&mut store, "car", CourseMode::Training);

        let updated = store
            .update_course(
                &created.course.id,
                CourseUpdate {
                    object_type: Some("truck".to_string()),
                    mode: Some(CourseMode::Testing),
                    noise_level: Some(30.0),
                    points: Some(vec![]),
                },
            )
            .unwrap();

        assert_eq!(updated.course.object_type, "truck");
        assert_eq!(updated.course.mode, CourseMode::Testing);
        assert_eq!(updated.course.noise_level, 30.0);
        assert_eq!(updated.course.metrics, created.course.metrics);
        assert_eq!(updated.points.len(), 3);
    }

    #[test]
    fn test_update_replaces_points_and_recomputes() {
        let mut store = CourseStore::in_memory().unwrap();
        let created = create(&mut store, "car", CourseMode::Training);

        let replacement = vec![
            GeoPoint::new(0.0, 0.0, 0.0, t(0)),
            GeoPoint::new(0.0, 1.0, 10.0, t(3600)),
        ];
        let updated = store
            .update_course(
                &created.course.id,
                CourseUpdate {
                    points: Some(replacement.clone()),
                    ..CourseUpdate::default()
                },
            )
            .unwrap();

        assert_eq!(updated.points.len(), 2);
        assert_eq!(updated.course.metrics.avg_speed, 30.89);
        assert_eq!(updated.course.metrics, compute_course_metrics(&replacement));

        let reloaded = store.get_course(&created.course.id).unwrap();
        assert_eq!(reloaded.course.metrics, updated.course.metrics);
    }

    #[test]
    fn test_update_rejects_bad_noise_level() {
        let mut store = CourseStore::in_memory().unwrap();
        let created = create(&mut store, "car", CourseMode::Training);
        let result = store.update_course(
            &created.course.id,
            CourseUpdate {
                noise_level: Some(-1.0),
                ..CourseUpdate::default()
            },
        );
        assert!(matches!(result, Err(CourseError::InvalidInput { .. })));
    }

    #[test]
    fn test_delete_course_cascades() {
        let mut store = CourseStore::in_memory().unwrap();
        let created = create(&mut store, "car", CourseMode::Training);

        store.delete_course(&created.course.id).unwrap();
        assert_eq!(store.course_count().unwrap(), 0);

        let orphans: i64 = store
            .db
            .query_row("SELECT COUNT(*) FROM points", [], |row| row.get(0))
            .unwrap();
        assert_eq!(orphans, 0);

        assert!(matches!(
            store.delete_course(&created.course.id),
            Err(CourseError::NotFound { .. })
        ));
    }

    #[test]
    fn test_add_point_recomputes_metrics() {
        let mut store = CourseStore::in_memory().unwrap();
        let created = create(&mut store, "car", CourseMode::Training);
        let id = created.course.id.clone();

        let extra = GeoPoint::new(0.02, 0.01, 2.0, t(300));
        let point = store.add_point(&id, extra).unwrap();
        assert_eq!(point.point_id, "p4");

        let mut expected = sample_points();
        expected.push(extra);
        let reloaded = store.get_course(&id).unwrap();
        assert_eq!(reloaded.course.metrics, compute_course_metrics(&expected));
        assert_eq!(reloaded.course.metrics.ending_point, LatLon::new(0.02, 0.01));
    }

    #[test]
    fn test_point_ids_do_not_collide_after_delete() {
        let mut store = CourseStore::in_memory().unwrap();
        let id = create(&mut store, "car", CourseMode::Training).course.id;

        store.delete_point(&id, "p2").unwrap();
        let point = store
            .add_point(&id, GeoPoint::new(0.03, 0.01, 0.0, t(400)))
            .unwrap();
        assert_eq!(point.point_id, "p4");
        assert_eq!(store.list_points(&id).unwrap().len(), 3);
    }

    #[test]
    fn test_update_point_recomputes_metrics() {
        let mut store = CourseStore::in_memory().unwrap();
        let id = create(&mut store, "car", CourseMode::Training).course.id;

        // Straighten the course: move p3 onto the eastward line
        let patch = PointPatch {
            latitude: Some(0.0),
            longitude: Some(0.02),
            ..PointPatch::default()
        };
        let updated = store.update_point(&id, "p3", patch).unwrap();
        assert_eq!(updated.point.longitude, 0.02);
        assert_eq!(updated.point.altitude, 2.0);

        let metrics = store.get_course(&id).unwrap().course.metrics;
        assert_eq!(metrics.total_direction_changes, 0);
        assert_eq!(metrics.ending_point, LatLon::new(0.0, 0.02));
    }

    #[test]
    fn test_update_point_rejects_out_of_range() {
        let mut store = CourseStore::in_memory().unwrap();
        let id = create(&mut store, "car", CourseMode::Training).course.id;
        let before = store.get_course(&id).unwrap();

        let patch = PointPatch {
            latitude: Some(123.0),
            ..PointPatch::default()
        };
        assert!(store.update_point(&id, "p1", patch).is_err());
        assert_eq!(store.get_course(&id).unwrap(), before);
    }

    #[test]
    fn test_delete_point_down_to_one() {
        let mut store = CourseStore::in_memory().unwrap();
        let id = create(&mut store, "car", CourseMode::Training).course.id;

        store.delete_point(&id, "p1").unwrap();
        store.delete_point(&id, "p3").unwrap();

        let metrics = store.get_course(&id).unwrap().course.metrics;
        assert_eq!(metrics.total_distance, 0.0);
        assert_eq!(metrics.starting_point, LatLon::new(0.0, 0.01));
        assert_eq!(metrics.ending_point, LatLon::new(0.0, 0.01));

        assert!(matches!(
            store.delete_point(&id, "p1"),
            Err(CourseError::NotFound { entity: "Point", .. })
        ));
    }

    #[test]
    fn test_sub_millisecond_timestamps_are_normalized() {
        let mut store = CourseStore::in_memory().unwrap();
        let points = vec![
            GeoPoint::new(0.0, 0.0, 0.0, t(0) + Duration::nanoseconds(400_000)),
            GeoPoint::new(0.0, 0.001, 0.0, t(10) + Duration::nanoseconds(900_000)),
        ];
        let created = store
            .create_course(NewCourse::new("bike", CourseMode::Training, points))
            .unwrap();
        let reloaded = store.get_course(&created.course.id).unwrap();
        assert_eq!(reloaded, created);
    }

    #[test]
    fn test_random_training_course() {
        let mut store = CourseStore::in_memory().unwrap();
        let mut rng = StdRng::seed_from_u64(7);

        assert!(matches!(
            store.random_training_course(&mut rng),
            Err(CourseError::NotFound { .. })
        ));

        create(&mut store, "car", CourseMode::Testing);
        let training = create(&mut store, "plane", CourseMode::Training);

        for _ in 0..5 {
            let challenge = store.random_training_course(&mut rng).unwrap();
            assert_eq!(challenge.course.id, training.course.id);
            assert_eq!(challenge.answer.correct_object_type, "plane");
            assert_eq!(challenge.course.points.len(), 3);
        }
    }

    #[test]
    fn test_testing_sessions_and_stats() {
        let mut store = CourseStore::in_memory().unwrap();
        let car = create(&mut store, "car", CourseMode::Training).course.id;
        let plane = create(&mut store, "plane", CourseMode::Training).course.id;

        let answer = |course_id: &str, selected: &str| SessionSubmission {
            course_id: course_id.to_string(),
            selected_object_type: selected.to_string(),
        };

        let outcome = store.record_testing_session(answer(&car, "car")).unwrap();
        assert!(outcome.session.is_correct);
        assert_eq!(outcome.message, "Correct!");

        let outcome = store.record_testing_session(answer(&plane, "car")).unwrap();
        assert!(!outcome.session.is_correct);
        assert_eq!(outcome.session.correct_object_type, "plane");

        store.record_testing_session(answer(&plane, "plane")).unwrap();

        let stats = store.testing_stats().unwrap();
        assert_eq!(stats.total_sessions, 3);
        assert_eq!(stats.correct_answers, 2);
        assert_eq!(stats.accuracy, 66.67);
        assert_eq!(stats.by_object_type["plane"].accuracy, 50.0);
        assert_eq!(stats.by_object_type["car"].total, 1);

        assert!(matches!(
            store.record_testing_session(answer("nope", "car")),
            Err(CourseError::NotFound { .. })
        ));
        assert!(matches!(
            store.record_testing_session(answer(&car, " ")),
            Err(CourseError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_tied_timestamps_list_in_metric_order() {
        let mut store = CourseStore::in_memory().unwrap();
        let points = vec![
            GeoPoint::new(0.01, 0.0, 0.0, t(0)),
            GeoPoint::new(0.0, 0.0, 0.0, t(0)),
            GeoPoint::new(0.0, 0.01, 0.0, t(60)),
        ];
        let created = store
            .create_course(NewCourse::new("car", CourseMode::Training, points))
            .unwrap();

        let metrics = created.course.metrics;
        assert_eq!(metrics.starting_point, LatLon::new(0.0, 0.0));
        assert_eq!(created.points[0].point_id, "p2");
        assert_eq!(created.points[0].point.position(), metrics.starting_point);

        let loaded = store.get_course(&created.course.id).unwrap();
        assert_eq!(loaded.points, created.points);
        let last = &loaded.points[loaded.points.len() - 1];
        assert_eq!(last.point.position(), metrics.ending_point);

        // A later insert that ties with the start keeps the same rule
        store
            .add_point(&created.course.id, GeoPoint::new(-0.01, 0.0, 0.0, t(0)))
            .unwrap();
        let listed = store.list_points(&created.course.id).unwrap();
        let metrics = store.get_course(&created.course.id).unwrap().course.metrics;
        assert_eq!(listed[0].point_id, "p4");
        assert_eq!(listed[0].point.position(), metrics.starting_point);
    }

    #[test]
    fn test_point_seq() {
        assert_eq!(point_seq("p12"), 12);
        assert_eq!(point_seq("custom"), 0);
    }
}
