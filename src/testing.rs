//! Testing mode: challenges, answer checking and accuracy statistics.
//!
//! A challenge shows a player a training course without its object type.
//! The correct answer travels separately as an [`AnswerKey`], so serializing
//! the challenge's course never reveals it.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo_utils::round2;
use crate::{Course, CourseMetrics, CourseMode, CoursePoint, CourseWithPoints};

/// A course as shown to a player in testing mode (object type withheld).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HiddenCourse {
    pub id: String,
    pub mode: CourseMode,
    pub created_by: String,
    pub noise_level: f64,
    #[serde(flatten)]
    pub metrics: CourseMetrics,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub points: Vec<CoursePoint>,
}

/// The correct object type of a challenge course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnswerKey {
    pub course_id: String,
    pub correct_object_type: String,
}

/// A testing-mode challenge: the hidden course and, separately, its answer.
///
/// Deliberately not `Serialize`; callers choose which half to send where.
#[derive(Debug, Clone, PartialEq)]
pub struct TestingChallenge {
    pub course: HiddenCourse,
    pub answer: AnswerKey,
}

impl TestingChallenge {
    /// Split a stored course into its player-facing view and its answer key.
    pub fn from_course(course: CourseWithPoints) -> Self {
        let CourseWithPoints { course, points } = course;
        let Course {
            id,
            object_type,
            mode,
            created_by,
            noise_level,
            metrics,
            created_at,
            updated_at,
        } = course;

        Self {
            answer: AnswerKey {
                course_id: id.clone(),
                correct_object_type: object_type,
            },
            course: HiddenCourse {
                id,
                mode,
                created_by,
                noise_level,
                metrics,
                created_at,
                updated_at,
                points,
            },
        }
    }
}

/// A player's answer for a challenge course.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSubmission {
    pub course_id: String,
    pub selected_object_type: String,
}

/// A recorded answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestingSession {
    pub course_id: String,
    pub selected_object_type: String,
    pub correct_object_type: String,
    pub is_correct: bool,
    pub answered_at: DateTime<Utc>,
}

impl TestingSession {
    /// Grade a submission against the course's actual object type.
    pub fn grade(
        submission: &SessionSubmission,
        correct_object_type: &str,
        answered_at: DateTime<Utc>,
    ) -> Self {
        Self {
            course_id: submission.course_id.clone(),
            selected_object_type: submission.selected_object_type.clone(),
            correct_object_type: correct_object_type.to_string(),
            is_correct: submission.selected_object_type == correct_object_type,
            answered_at,
        }
    }
}

/// A graded session plus the message shown to the player.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionOutcome {
    #[serde(flatten)]
    pub session: TestingSession,
    pub message: String,
}

impl From<TestingSession> for SessionOutcome {
    fn from(session: TestingSession) -> Self {
        let message = if session.is_correct {
            "Correct!"
        } else {
            "Incorrect. Try again!"
        };
        Self {
            session,
            message: message.to_string(),
        }
    }
}

/// Accuracy for one object type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectTypeStats {
    pub total: u32,
    pub correct: u32,
    /// Percent, 2 decimals
    pub accuracy: f64,
}

/// Aggregate accuracy across all recorded sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestingStats {
    pub total_sessions: u32,
    pub correct_answers: u32,
    /// Percent, 2 decimals; 0 when there are no sessions
    pub accuracy: f64,
    /// Keyed by the correct object type
    pub by_object_type: BTreeMap<String, ObjectTypeStats>,
}

/// Summarize sessions into overall and per-object-type accuracy.
pub fn summarize_sessions(sessions: &[TestingSession]) -> TestingStats {
    let mut by_object_type: BTreeMap<String, ObjectTypeStats> = BTreeMap::new();

    for session in sessions {
        let entry = by_object_type
            .entry(session.correct_object_type.clone())
            .or_insert(ObjectTypeStats {
                total: 0,
                correct: 0,
                accuracy: 0.0,
            });
        entry.total += 1;
        if session.is_correct {
            entry.correct += 1;
        }
    }

    for stats in by_object_type.values_mut() {
        stats.accuracy = accuracy_percent(stats.correct, stats.total);
    }

    let total_sessions = sessions.len() as u32;
    let correct_answers = sessions.iter().filter(|s| s.is_correct).count() as u32;

    TestingStats {
        total_sessions,
        correct_answers,
        accuracy: accuracy_percent(correct_answers, total_sessions),
        by_object_type,
    }
}

fn accuracy_percent(correct: u32, total: u32) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round2(correct as f64 / total as f64 * 100.0)
}
