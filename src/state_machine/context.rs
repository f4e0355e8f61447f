//! Immutable interview configuration consumed by the transition function

use super::state::Question;
use regex::Regex;
use std::time::Duration;

pub const DEFAULT_PHONE_PATTERN: &str = r"^\+7\d{10}$";
pub const DEFAULT_MAX_RESUME_BYTES: u64 = 5 * 1024 * 1024;
pub const DEFAULT_TIME_LIMIT_SECS: u64 = 60;

/// Where interview questions come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuestionSource {
    /// Fetched from the backend when the interview starts
    Live,
    /// Fixed list from configuration
    Static(Vec<Question>),
}

/// Context for every session (immutable configuration)
#[derive(Debug, Clone)]
pub struct InterviewContext {
    /// Lower-case file extensions accepted for resumes
    pub accepted_extensions: Vec<String>,
    pub max_resume_bytes: u64,
    phone_pattern: Regex,
    /// Used for static questions and live questions without a limit
    pub default_time_limit_secs: u64,
    pub question_source: QuestionSource,
    /// Pause between committing a slot and opening the next one
    pub pacing_delay: Duration,
    pub status_poll_interval: Duration,
    pub status_poll_max_attempts: u32,
    pub registration_timeout: Duration,
}

impl InterviewContext {
    pub fn new(phone_pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            accepted_extensions: vec!["pdf".to_string()],
            max_resume_bytes: DEFAULT_MAX_RESUME_BYTES,
            phone_pattern: Regex::new(phone_pattern)?,
            default_time_limit_secs: DEFAULT_TIME_LIMIT_SECS,
            question_source: QuestionSource::Live,
            pacing_delay: Duration::from_secs(1),
            status_poll_interval: Duration::from_secs(3),
            status_poll_max_attempts: 10,
            registration_timeout: Duration::from_secs(24 * 60 * 60),
        })
    }

    pub fn with_question_source(mut self, source: QuestionSource) -> Self {
        self.question_source = source;
        self
    }

    pub fn with_pacing_delay(mut self, delay: Duration) -> Self {
        self.pacing_delay = delay;
        self
    }

    pub fn with_max_resume_bytes(mut self, bytes: u64) -> Self {
        self.max_resume_bytes = bytes;
        self
    }

    pub fn with_status_polling(mut self, interval: Duration, max_attempts: u32) -> Self {
        self.status_poll_interval = interval;
        self.status_poll_max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_registration_timeout(mut self, timeout: Duration) -> Self {
        self.registration_timeout = timeout;
        self
    }

    pub fn with_default_time_limit(mut self, secs: u64) -> Self {
        self.default_time_limit_secs = secs;
        self
    }

    pub fn with_accepted_extensions(mut self, extensions: Vec<String>) -> Self {
        self.accepted_extensions = extensions
            .into_iter()
            .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        self
    }

    /// Check a phone number after stripping spaces, dashes and parentheses
    pub fn is_valid_phone(&self, raw: &str) -> bool {
        let cleaned: String = raw
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
            .collect();
        self.phone_pattern.is_match(&cleaned)
    }

    /// Whether a file name carries one of the accepted extensions
    pub fn accepts_file_name(&self, file_name: &str) -> bool {
        let lower = file_name.to_ascii_lowercase();
        self.accepted_extensions
            .iter()
            .any(|ext| lower.ends_with(&format!(".{ext}")))
    }

    /// Time limit applied to a live question that arrived without one
    pub fn normalize_question(&self, mut question: Question) -> Question {
        if question.time_limit_secs == 0 {
            question.time_limit_secs = self.default_time_limit_secs;
        }
        question
    }
}
