//! crates/tutor_core/src/domain.rs
//!
//! Defines the core data structures for the application: the learner profile, the
//! learning path and its modules, quizzes, and tutoring messages.
//!
//! The profile and the path are persisted as JSON, so their serde shapes are part of
//! the storage contract. Every update helper returns a complete new value; nothing
//! here mutates a record in place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use uuid::Uuid;

/// Number of questions every generated quiz is expected to carry.
pub const QUESTIONS_PER_QUIZ: u32 = 5;

/// Fraction of correct answers needed to pass a quiz.
pub const PASS_THRESHOLD: f64 = 0.8;

//=========================================================================================
// Profile Enumerations
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KnowledgeLevel {
    Beginner,
    Intermediate,
    Advanced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LearningGoal {
    ExamPrep,
    ConceptUnderstanding,
    SkillBuilding,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LearningStyle {
    Text,
    Video,
    Quizzes,
    Mixed,
}

/// How hard the learner found a finished tutoring session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionFeedback {
    Easy,
    Medium,
    Hard,
}

impl fmt::Display for KnowledgeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            KnowledgeLevel::Beginner => "beginner",
            KnowledgeLevel::Intermediate => "intermediate",
            KnowledgeLevel::Advanced => "advanced",
        };
        f.write_str(label)
    }
}

impl fmt::Display for LearningGoal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LearningGoal::ExamPrep => "exam preparation",
            LearningGoal::ConceptUnderstanding => "concept understanding",
            LearningGoal::SkillBuilding => "skill building",
        };
        f.write_str(label)
    }
}

impl fmt::Display for LearningStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LearningStyle::Text => "text",
            LearningStyle::Video => "video",
            LearningStyle::Quizzes => "quizzes",
            LearningStyle::Mixed => "mixed",
        };
        f.write_str(label)
    }
}

//=========================================================================================
// Performance Data
//=========================================================================================

/// Accumulated learning statistics for one learner.
///
/// Fields are private: the accuracy percentage is derived from the score history and
/// can only change through [`PerformanceData::with_quiz_result`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "PerformanceRecord")]
pub struct PerformanceData {
    quiz_scores: Vec<u32>,
    /// Question count of each scored quiz, parallel to `quiz_scores`.
    quiz_totals: Vec<u32>,
    #[serde(rename = "timeSpent")]
    time_spent_minutes: u32,
    last_feedback: Option<SessionFeedback>,
    completed_topics: Vec<String>,
    average_accuracy: u32,
}

/// Serde shape of stored or submitted performance data. A decoded
/// `averageAccuracy` is ignored and recomputed from the score history.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PerformanceRecord {
    #[serde(default)]
    quiz_scores: Vec<u32>,
    #[serde(default)]
    quiz_totals: Vec<u32>,
    #[serde(default, rename = "timeSpent")]
    time_spent_minutes: u32,
    #[serde(default)]
    last_feedback: Option<SessionFeedback>,
    #[serde(default)]
    completed_topics: Vec<String>,
}

impl From<PerformanceRecord> for PerformanceData {
    fn from(record: PerformanceRecord) -> Self {
        let average_accuracy = accuracy_percent(&record.quiz_scores, &record.quiz_totals);
        Self {
            quiz_scores: record.quiz_scores,
            quiz_totals: record.quiz_totals,
            time_spent_minutes: record.time_spent_minutes,
            last_feedback: record.last_feedback,
            completed_topics: record.completed_topics,
            average_accuracy,
        }
    }
}

impl PerformanceData {
    pub fn quiz_scores(&self) -> &[u32] {
        &self.quiz_scores
    }

    pub fn quiz_totals(&self) -> &[u32] {
        &self.quiz_totals
    }

    pub fn time_spent_minutes(&self) -> u32 {
        self.time_spent_minutes
    }

    pub fn last_feedback(&self) -> Option<SessionFeedback> {
        self.last_feedback
    }

    pub fn completed_topics(&self) -> &[String] {
        &self.completed_topics
    }

    pub fn average_accuracy(&self) -> u32 {
        self.average_accuracy
    }

    /// Records one scored quiz and recomputes the average accuracy.
    pub fn with_quiz_result(&self, score: u32, total: u32) -> Self {
        let mut quiz_scores = self.quiz_scores.clone();
        quiz_scores.push(score);

        // Scores recorded before totals were tracked count as full-length quizzes.
        let mut quiz_totals = self.quiz_totals.clone();
        quiz_totals.resize(self.quiz_scores.len(), QUESTIONS_PER_QUIZ);
        quiz_totals.push(total);

        let average_accuracy = accuracy_percent(&quiz_scores, &quiz_totals);
        Self {
            quiz_scores,
            quiz_totals,
            average_accuracy,
            ..self.clone()
        }
    }

    pub fn with_time_spent(&self, minutes: u32) -> Self {
        Self {
            time_spent_minutes: self.time_spent_minutes.saturating_add(minutes),
            ..self.clone()
        }
    }

    pub fn with_feedback(&self, feedback: SessionFeedback) -> Self {
        Self {
            last_feedback: Some(feedback),
            ..self.clone()
        }
    }

    /// Appends a completed topic. Repeated passes of the same module are kept as history.
    pub fn with_completed_topic(&self, title: &str) -> Self {
        let mut completed_topics = self.completed_topics.clone();
        completed_topics.push(title.to_string());
        Self {
            completed_topics,
            ..self.clone()
        }
    }
}

/// `round(sum(scores) / sum(totals) * 100)`, with missing totals counted as full quizzes.
fn accuracy_percent(scores: &[u32], totals: &[u32]) -> u32 {
    let earned: u64 = scores.iter().map(|&s| u64::from(s)).sum();
    let possible: u64 = (0..scores.len())
        .map(|i| u64::from(totals.get(i).copied().unwrap_or(QUESTIONS_PER_QUIZ)))
        .sum();
    if possible == 0 {
        return 0;
    }
    (earned as f64 / possible as f64 * 100.0).round() as u32
}

//=========================================================================================
// User Profile
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProfileError {
    #[error("Profile field '{0}' must not be empty")]
    MissingField(&'static str),
}

/// Identity and configuration for one learner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub name: String,
    /// Class or other context label (e.g. "Grade 10", "CS 101").
    #[serde(rename = "class")]
    pub class_name: String,
    pub subject: String,
    pub level: KnowledgeLevel,
    pub goal: LearningGoal,
    pub learning_style: LearningStyle,
    /// Daily study target in minutes.
    pub time_per_day: u32,
    pub topic: String,
    pub language: String,
    #[serde(default)]
    pub performance: PerformanceData,
}

impl UserProfile {
    /// Checks that an onboarding draft carries everything needed to build a path.
    pub fn validate_draft(&self) -> Result<(), ProfileError> {
        let required = [
            ("name", &self.name),
            ("class", &self.class_name),
            ("subject", &self.subject),
            ("topic", &self.topic),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ProfileError::MissingField(field));
            }
        }
        Ok(())
    }

    pub fn with_topic(&self, topic: &str) -> Self {
        Self {
            topic: topic.to_string(),
            ..self.clone()
        }
    }

    pub fn with_performance(&self, performance: PerformanceData) -> Self {
        Self {
            performance,
            ..self.clone()
        }
    }
}

//=========================================================================================
// Learning Path and Modules
//=========================================================================================

/// `Locked` is part of the stored vocabulary but no transition produces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleStatus {
    Locked,
    Current,
    Completed,
}

/// A citation backing a module's content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub uri: String,
    pub title: String,
}

/// One curriculum unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Module {
    pub id: String,
    pub title: String,
    pub description: String,
    pub status: ModuleStatus,
    pub topics: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<Source>,
}

impl Module {
    pub fn is_completed(&self) -> bool {
        self.status == ModuleStatus::Completed
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("A learning path needs at least one module")]
    Empty,
    #[error("Module id '{0}' appears more than once")]
    DuplicateModuleId(String),
}

/// An ordered curriculum. Module order is the mastery sequence and is never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "LearningPathRecord")]
pub struct LearningPath {
    modules: Vec<Module>,
    estimated_weeks: u32,
    personalization_reason: String,
}

/// Unvalidated serde shape; every decoded path goes through [`LearningPath::new`].
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LearningPathRecord {
    modules: Vec<Module>,
    estimated_weeks: u32,
    personalization_reason: String,
}

impl TryFrom<LearningPathRecord> for LearningPath {
    type Error = PathError;

    fn try_from(record: LearningPathRecord) -> Result<Self, Self::Error> {
        LearningPath::new(
            record.modules,
            record.estimated_weeks,
            record.personalization_reason,
        )
    }
}

impl LearningPath {
    pub fn new(
        modules: Vec<Module>,
        estimated_weeks: u32,
        personalization_reason: impl Into<String>,
    ) -> Result<Self, PathError> {
        if modules.is_empty() {
            return Err(PathError::Empty);
        }
        let mut seen = HashSet::new();
        for module in &modules {
            if !seen.insert(module.id.as_str()) {
                return Err(PathError::DuplicateModuleId(module.id.clone()));
            }
        }
        Ok(Self {
            modules,
            estimated_weeks,
            personalization_reason: personalization_reason.into(),
        })
    }

    /// A one-week path with a single module, which is always valid.
    pub fn single(module: Module, personalization_reason: impl Into<String>) -> Self {
        Self {
            modules: vec![module],
            estimated_weeks: 1,
            personalization_reason: personalization_reason.into(),
        }
    }

    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    pub fn estimated_weeks(&self) -> u32 {
        self.estimated_weeks
    }

    pub fn personalization_reason(&self) -> &str {
        &self.personalization_reason
    }

    /// The first module in mastery order. Paths are never empty.
    pub fn first_module(&self) -> &Module {
        &self.modules[0]
    }

    pub fn module(&self, id: &str) -> Option<&Module> {
        self.modules.iter().find(|m| m.id == id)
    }

    /// Returns a path whose modules sequence has `id` marked completed.
    pub fn with_module_completed(&self, id: &str) -> Self {
        let modules = self
            .modules
            .iter()
            .map(|m| {
                if m.id == id {
                    Module {
                        status: ModuleStatus::Completed,
                        ..m.clone()
                    }
                } else {
                    m.clone()
                }
            })
            .collect();
        Self {
            modules,
            ..self.clone()
        }
    }
}

//=========================================================================================
// Quizzes
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizQuestion {
    pub question: String,
    pub options: Vec<String>,
    /// Index into `options`.
    pub correct_answer: usize,
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuizError {
    #[error("A quiz needs at least one question")]
    NoQuestions,
    #[error("Question {0} has no answer options")]
    NoOptions(usize),
    #[error("Question {0} marks an answer that is not one of its options")]
    CorrectAnswerOutOfRange(usize),
}

/// A generated quiz for one module. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Quiz {
    title: String,
    questions: Vec<QuizQuestion>,
}

impl Quiz {
    pub fn new(title: impl Into<String>, questions: Vec<QuizQuestion>) -> Result<Self, QuizError> {
        if questions.is_empty() {
            return Err(QuizError::NoQuestions);
        }
        for (index, question) in questions.iter().enumerate() {
            if question.options.is_empty() {
                return Err(QuizError::NoOptions(index));
            }
            if question.correct_answer >= question.options.len() {
                return Err(QuizError::CorrectAnswerOutOfRange(index));
            }
        }
        Ok(Self {
            title: title.into(),
            questions,
        })
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn questions(&self) -> &[QuizQuestion] {
        &self.questions
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}

/// The graded result of a finished quiz run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizOutcome {
    pub score: u32,
    pub total: u32,
    pub passed: bool,
}

impl QuizOutcome {
    /// Counts positions where the answer matches the correct option.
    pub fn grade(quiz: &Quiz, answers: &[usize]) -> Self {
        let score = quiz
            .questions
            .iter()
            .zip(answers)
            .filter(|(question, answer)| question.correct_answer == **answer)
            .count() as u32;
        let total = quiz.questions.len() as u32;
        let passed = f64::from(score) / f64::from(total) >= PASS_THRESHOLD;
        Self {
            score,
            total,
            passed,
        }
    }
}

//=========================================================================================
// Tutoring Messages
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// One entry of a tutoring transcript. Transcripts live only for one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            created_at,
        }
    }
}
