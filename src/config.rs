//! Environment-driven configuration

use crate::faq::{DEFAULT_CONTACT_INFO, DEFAULT_TIMING_INFO};
use crate::state_machine::context::{DEFAULT_MAX_RESUME_BYTES, DEFAULT_PHONE_PATTERN, DEFAULT_TIME_LIMIT_SECS};
use crate::state_machine::{InterviewContext, Question, QuestionSource};
use serde::Deserialize;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

const BUILTIN_QUESTIONS: [&str; 5] = [
    "Tell us about your experience in this field.",
    "Which technologies did you use on your most recent project?",
    "Describe the hardest problem you have had to solve.",
    "Why do you want to work for our company?",
    "What are your strengths and weaknesses?",
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{var} has an invalid value: {value}")]
    Invalid { var: &'static str, value: String },
    #[error("Invalid phone pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("Cannot read static questions from {path}: {reason}")]
    Questions { path: String, reason: String },
}

/// Where interview questions come from, before they are loaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuestionSourceConfig {
    Live,
    /// Optional JSON file; the built-in list is used without one
    Static(Option<PathBuf>),
}

/// Entry of a static questions file; id and limit may be omitted
#[derive(Debug, Deserialize)]
struct StaticQuestion {
    #[serde(default)]
    id: Option<String>,
    content: String,
    #[serde(default)]
    time_limit_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: String,
    pub port: u16,
    pub backend_base_url: String,
    pub backend_timeout: Duration,
    pub storage_endpoint: Option<String>,
    pub storage_bucket: Option<String>,
    pub storage_token: Option<String>,
    pub transport_outbound_url: Option<String>,
    pub transport_document_url: Option<String>,
    pub max_resume_bytes: u64,
    pub resume_extensions: Vec<String>,
    pub time_limit_secs: u64,
    pub question_source: QuestionSourceConfig,
    pub pacing_delay: Duration,
    pub status_poll_interval: Duration,
    pub status_poll_max_attempts: u32,
    pub registration_timeout: Duration,
    pub phone_pattern: String,
    pub contact_info: String,
    pub timing_info: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable source; blank values count as unset
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| lookup(var).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let db_path = get("INTERVIEW_BOT_DB_PATH").unwrap_or_else(|| {
            let home = get("HOME").unwrap_or_else(|| "/tmp".to_string());
            format!("{home}/.interview-bot/sessions.db")
        });

        let question_source = match get("QUESTION_SOURCE").as_deref() {
            None | Some("live") => QuestionSourceConfig::Live,
            Some("static") => QuestionSourceConfig::Static(get("STATIC_QUESTIONS_PATH").map(PathBuf::from)),
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "QUESTION_SOURCE",
                    value: other.to_string(),
                })
            }
        };

        let resume_extensions = get("RESUME_EXTENSIONS")
            .map(|raw| raw.split(',').map(str::to_string).collect())
            .unwrap_or_else(|| vec!["pdf".to_string()]);

        let max_resume_bytes = match parse::<u64>(&get, "MAX_RESUME_SIZE_MB")? {
            Some(mb) => mb.saturating_mul(1024 * 1024),
            None => DEFAULT_MAX_RESUME_BYTES,
        };

        Ok(Self {
            db_path,
            port: parse(&get, "INTERVIEW_BOT_PORT")?.unwrap_or(8000),
            backend_base_url: get("BACKEND_BASE_URL").ok_or(ConfigError::Missing("BACKEND_BASE_URL"))?,
            backend_timeout: Duration::from_secs(parse(&get, "BACKEND_TIMEOUT_SECS")?.unwrap_or(10)),
            storage_endpoint: get("STORAGE_ENDPOINT"),
            storage_bucket: get("STORAGE_BUCKET"),
            storage_token: get("STORAGE_TOKEN"),
            transport_outbound_url: get("TRANSPORT_OUTBOUND_URL"),
            transport_document_url: get("TRANSPORT_DOCUMENT_URL"),
            max_resume_bytes,
            resume_extensions,
            time_limit_secs: parse(&get, "INTERVIEW_TIME_LIMIT_SECS")?.unwrap_or(DEFAULT_TIME_LIMIT_SECS),
            question_source,
            pacing_delay: Duration::from_millis(parse(&get, "PACING_DELAY_MS")?.unwrap_or(1000)),
            status_poll_interval: Duration::from_secs(parse(&get, "STATUS_POLL_INTERVAL_SECS")?.unwrap_or(3)),
            status_poll_max_attempts: parse(&get, "STATUS_POLL_MAX_ATTEMPTS")?.unwrap_or(10),
            registration_timeout: Duration::from_secs(
                parse(&get, "REGISTRATION_TIMEOUT_SECS")?.unwrap_or(24 * 60 * 60),
            ),
            phone_pattern: get("PHONE_PATTERN").unwrap_or_else(|| DEFAULT_PHONE_PATTERN.to_string()),
            contact_info: get("CONTACT_INFO").unwrap_or_else(|| DEFAULT_CONTACT_INFO.to_string()),
            timing_info: get("TIMING_INFO").unwrap_or_else(|| DEFAULT_TIMING_INFO.to_string()),
        })
    }

    /// Immutable context for the transition function; loads static questions
    pub fn interview_context(&self) -> Result<InterviewContext, ConfigError> {
        let source = match &self.question_source {
            QuestionSourceConfig::Live => QuestionSource::Live,
            QuestionSourceConfig::Static(path) => QuestionSource::Static(self.static_questions(path.as_ref())?),
        };

        Ok(InterviewContext::new(&self.phone_pattern)?
            .with_question_source(source)
            .with_default_time_limit(self.time_limit_secs)
            .with_max_resume_bytes(self.max_resume_bytes)
            .with_accepted_extensions(self.resume_extensions.clone())
            .with_pacing_delay(self.pacing_delay)
            .with_status_polling(self.status_poll_interval, self.status_poll_max_attempts)
            .with_registration_timeout(self.registration_timeout))
    }

    fn static_questions(&self, path: Option<&PathBuf>) -> Result<Vec<Question>, ConfigError> {
        let Some(path) = path else {
            return Ok(BUILTIN_QUESTIONS
                .iter()
                .enumerate()
                .map(|(i, content)| Question::new(format!("q{}", i + 1), *content, self.time_limit_secs))
                .collect());
        };

        let questions_error = |reason: String| ConfigError::Questions {
            path: path.display().to_string(),
            reason,
        };
        let raw = std::fs::read_to_string(path).map_err(|e| questions_error(e.to_string()))?;
        let entries: Vec<StaticQuestion> = serde_json::from_str(&raw).map_err(|e| questions_error(e.to_string()))?;

        Ok(entries
            .into_iter()
            .enumerate()
            .map(|(i, entry)| {
                Question::new(
                    entry.id.unwrap_or_else(|| format!("q{}", i + 1)),
                    entry.content,
                    entry.time_limit_secs.filter(|&s| s > 0).unwrap_or(self.time_limit_secs),
                )
            })
            .collect())
    }
}

fn parse<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    get(var)
        .map(|value| value.parse().map_err(|_| ConfigError::Invalid { var, value }))
        .transpose()
}
