//! Quick-Question Responder
//!
//! Answers the fixed menu of out-of-band questions. It never reads or writes
//! session state: the status topic asks the backend, the rest is canned text.

use crate::backend::BackendGateway;
use crate::state_machine::CandidateStatus;
use serde::{Deserialize, Serialize};

pub const DEFAULT_TIMING_INFO: &str = "Approximate timelines:\n\n\
     - Resume screening: 1-2 business days\n\
     - Interview analysis: 2-3 business days\n\
     - Final HR decision: 3-5 business days\n\n\
     We process applications as quickly as we can and will notify you of any status change.";

pub const DEFAULT_CONTACT_INFO: &str = "Contact information:\n\n\
     - Email: hr@company.com\n\
     - Phone: +7 (495) 123-45-67\n\
     - Working hours: Mon-Fri, 9:00-18:00 (MSK)\n\n\
     If you have any questions, email us or call during working hours.";

const STATUS_UNAVAILABLE: &str = "We could not fetch your status right now. Please try again later.";

/// Topics offered by the quick-question menu
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuickTopic {
    Status,
    Timing,
    Contact,
    /// Dismisses the menu
    Close,
}

impl QuickTopic {
    pub fn parse(data: &str) -> Option<Self> {
        match data {
            "q_status" => Some(QuickTopic::Status),
            "q_timing" => Some(QuickTopic::Timing),
            "q_contact" => Some(QuickTopic::Contact),
            "q_close" => Some(QuickTopic::Close),
            _ => None,
        }
    }

    pub fn callback_data(&self) -> &'static str {
        match self {
            QuickTopic::Status => "q_status",
            QuickTopic::Timing => "q_timing",
            QuickTopic::Contact => "q_contact",
            QuickTopic::Close => "q_close",
        }
    }
}

/// Canned content and the backend used for status questions
pub struct QuickResponder {
    timing_info: String,
    contact_info: String,
}

impl Default for QuickResponder {
    fn default() -> Self {
        Self::new(DEFAULT_TIMING_INFO, DEFAULT_CONTACT_INFO)
    }
}

impl QuickResponder {
    pub fn new(timing_info: impl Into<String>, contact_info: impl Into<String>) -> Self {
        Self {
            timing_info: timing_info.into(),
            contact_info: contact_info.into(),
        }
    }

    /// Text answering `topic`, or `None` for topics with no content
    pub async fn respond(
        &self,
        backend: &dyn BackendGateway,
        topic: QuickTopic,
        candidate_ref: Option<&str>,
        vacancy_ref: Option<&str>,
    ) -> Option<String> {
        match topic {
            QuickTopic::Timing => Some(self.timing_info.clone()),
            QuickTopic::Contact => Some(self.contact_info.clone()),
            QuickTopic::Close => None,
            QuickTopic::Status => {
                let (Some(candidate_ref), Some(vacancy_ref)) = (candidate_ref, vacancy_ref) else {
                    return Some(describe_status(None));
                };
                match backend.get_status(candidate_ref, vacancy_ref).await {
                    Ok(status) => Some(describe_status(Some(status))),
                    Err(e) => {
                        tracing::warn!(candidate_ref, error = %e, "Status lookup for quick question failed");
                        Some(STATUS_UNAVAILABLE.to_string())
                    }
                }
            }
        }
    }
}

/// Stage description for the status topic; `None` means no candidate yet
pub fn describe_status(status: Option<CandidateStatus>) -> String {
    let (title, description) = match status {
        None => (
            "No active application",
            "Open the link from the recruiter to apply for a vacancy.",
        ),
        Some(CandidateStatus::Unknown) => (
            "Application registered",
            "Your application is registered; the selection process has not started yet.",
        ),
        Some(CandidateStatus::ScreeningOk) => (
            "Resume approved",
            "Your resume passed screening. The next step is the interview.",
        ),
        Some(CandidateStatus::ScreeningFailed) => (
            "Resume declined",
            "Unfortunately, your resume did not pass screening for this vacancy.",
        ),
        Some(CandidateStatus::InterviewOk) => (
            "Interview passed",
            "Congratulations! HR will contact you shortly.",
        ),
        Some(CandidateStatus::InterviewFailed) => (
            "Interview completed",
            "Unfortunately, we will not be moving forward with your application.",
        ),
    };
    format!("Your current status:\n\n- {title}\n\n{description}\n\nWe will notify you of any changes!")
}
