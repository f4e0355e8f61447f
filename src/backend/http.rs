//! HTTP implementation of the backend gateway

use super::{AnswerSubmission, BackendGateway, GatewayError};
use crate::state_machine::{CandidateProfile, CandidateStatus, Question, ScreeningKickoff};
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Backend gateway speaking the candidate service's JSON API
pub struct HttpBackendGateway {
    client: Client,
    base_url: Url,
}

impl HttpBackendGateway {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, GatewayError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| GatewayError::Unavailable(format!("Invalid backend URL {base_url}: {e}")))?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Unavailable(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client, base_url })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, GatewayError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| GatewayError::Unavailable(format!("Backend URL {} cannot be a base", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Send a request; `Ok(None)` when the backend has no such resource
    async fn request<B: Serialize + ?Sized>(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<&B>,
    ) -> Result<Option<Value>, GatewayError> {
        let url = self.endpoint(segments)?;
        tracing::debug!(%method, %url, "Backend request");

        let mut request = self.client.request(method, url);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await.map_err(classify_send_error)?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| GatewayError::Unavailable(format!("Failed to read response: {e}")))?;
        decode_body(status, &text)
    }
}

#[async_trait]
impl BackendGateway for HttpBackendGateway {
    async fn find_candidate(&self, participant_id: &str) -> Result<Option<String>, GatewayError> {
        let body = self
            .request::<()>(
                Method::GET,
                &["api", "v1", "candidates", "by-tg-id", participant_id],
                None,
            )
            .await?;
        Ok(body.as_ref().and_then(candidate_id))
    }

    async fn register_candidate(&self, profile: &CandidateProfile) -> Result<String, GatewayError> {
        let request = RegisterRequest {
            telegram_id: numeric_or_string(&profile.participant_id),
            full_name: profile.full_name.as_deref(),
            phone: &profile.phone,
            username: profile.handle.as_deref(),
            city: &profile.city,
        };
        let body = self
            .request(Method::POST, &["api", "v1", "candidate"], Some(&request))
            .await?;
        body.as_ref()
            .and_then(candidate_id)
            .ok_or_else(|| GatewayError::Decode("Registration response carries no candidate id".into()))
    }

    async fn start_screening(
        &self,
        candidate_ref: &str,
        vacancy_ref: &str,
    ) -> Result<ScreeningKickoff, GatewayError> {
        let request = CandidateVacancy {
            candidate_id: numeric_or_string(candidate_ref),
            vacancy_id: vacancy_ref,
        };
        let body = self
            .request(Method::POST, &["api", "v1", "screening", "process"], Some(&request))
            .await?;
        Ok(parse_kickoff(body.as_ref()))
    }

    async fn get_status(
        &self,
        candidate_ref: &str,
        vacancy_ref: &str,
    ) -> Result<CandidateStatus, GatewayError> {
        let body = self
            .request::<()>(
                Method::GET,
                &["api", "v1", "screening", "result", candidate_ref, vacancy_ref],
                None,
            )
            .await?;
        Ok(parse_status(body.as_ref()))
    }

    async fn list_questions(&self, vacancy_ref: &str) -> Result<Vec<Question>, GatewayError> {
        let body = self
            .request::<()>(
                Method::GET,
                &["api", "v1", "interview", "questions", vacancy_ref],
                None,
            )
            .await?;
        parse_questions(body)
    }

    async fn submit_answer(&self, submission: &AnswerSubmission) -> Result<(), GatewayError> {
        let request = AnswerRequest {
            candidate_id: numeric_or_string(&submission.candidate_ref),
            question_id: &submission.question_id,
            answer: &submission.content,
            elapsed_seconds: submission.elapsed_secs,
        };
        self.request(Method::POST, &["api", "v1", "interview", "answer"], Some(&request))
            .await?;
        Ok(())
    }

    async fn advance_interview(
        &self,
        candidate_ref: &str,
        vacancy_ref: &str,
    ) -> Result<(), GatewayError> {
        let request = CandidateVacancy {
            candidate_id: numeric_or_string(candidate_ref),
            vacancy_id: vacancy_ref,
        };
        self.request(
            Method::POST,
            &["api", "v1", "interview", "update-status"],
            Some(&request),
        )
        .await?;
        Ok(())
    }
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Serialize)]
struct RegisterRequest<'a> {
    telegram_id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    full_name: Option<&'a str>,
    phone: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<&'a str>,
    city: &'a str,
}

#[derive(Debug, Serialize)]
struct CandidateVacancy<'a> {
    candidate_id: Value,
    vacancy_id: &'a str,
}

#[derive(Debug, Serialize)]
struct AnswerRequest<'a> {
    candidate_id: Value,
    question_id: &'a str,
    answer: &'a str,
    elapsed_seconds: u64,
}

#[derive(Debug, Deserialize)]
struct WireQuestion {
    #[serde(default, alias = "question_id")]
    id: Option<Value>,
    #[serde(alias = "text", alias = "question")]
    content: String,
    #[serde(default, alias = "time_limit", alias = "time_limit_seconds")]
    time_limit_secs: u64,
}

// ============================================================================
// Decoding
// ============================================================================

fn classify_send_error(e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::Timeout
    } else if e.is_connect() {
        GatewayError::Unavailable(format!("Connection failed: {e}"))
    } else {
        GatewayError::Unavailable(format!("Request failed: {e}"))
    }
}

fn decode_body(status: StatusCode, body: &str) -> Result<Option<Value>, GatewayError> {
    match status {
        StatusCode::NOT_FOUND | StatusCode::NO_CONTENT => Ok(None),
        s if s.is_success() => {
            if body.trim().is_empty() {
                return Ok(Some(Value::Null));
            }
            serde_json::from_str(body)
                .map(Some)
                .map_err(|e| GatewayError::Decode(format!("{e} - body: {body}")))
        }
        s => Err(GatewayError::Status {
            status: s.as_u16(),
            body: body.to_string(),
        }),
    }
}

/// Ids travel as numbers when they look like numbers
fn numeric_or_string(id: &str) -> Value {
    id.parse::<i64>()
        .map_or_else(|_| Value::String(id.to_string()), Value::from)
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn candidate_id(body: &Value) -> Option<String> {
    body.get("id")
        .or_else(|| body.get("candidate_id"))
        .and_then(id_string)
}

/// A body carrying `passed` is a synchronous decision; anything else is polled
fn parse_kickoff(body: Option<&Value>) -> ScreeningKickoff {
    let Some(body) = body else {
        return ScreeningKickoff::Pending;
    };
    match body.get("passed").and_then(Value::as_bool) {
        Some(passed) => ScreeningKickoff::Decided {
            passed,
            feedback: body
                .get("feedback")
                .and_then(Value::as_str)
                .map(str::to_string),
        },
        None => ScreeningKickoff::Pending,
    }
}

fn parse_status(body: Option<&Value>) -> CandidateStatus {
    body.and_then(|b| b.get("status"))
        .and_then(Value::as_str)
        .map_or(CandidateStatus::Unknown, CandidateStatus::parse)
}

/// Accepts either a bare array or `{"questions": [...]}`
fn parse_questions(body: Option<Value>) -> Result<Vec<Question>, GatewayError> {
    let list = match body {
        None | Some(Value::Null) => return Ok(vec![]),
        Some(Value::Object(mut map)) => map.remove("questions").unwrap_or(Value::Array(vec![])),
        Some(list @ Value::Array(_)) => list,
        Some(other) => {
            return Err(GatewayError::Decode(format!(
                "Unexpected questions payload: {other}"
            )))
        }
    };

    let wire: Vec<WireQuestion> =
        serde_json::from_value(list).map_err(|e| GatewayError::Decode(e.to_string()))?;
    Ok(wire
        .into_iter()
        .enumerate()
        .map(|(i, q)| {
            let id = q
                .id
                .as_ref()
                .and_then(id_string)
                .unwrap_or_else(|| format!("q{}", i + 1));
            Question::new(id, q.content, q.time_limit_secs)
        })
        .collect())
}
