//! Participant-facing message texts

use super::state::{ProfileField, Question, Session};

pub const START_WITHOUT_VACANCY: &str = "Error: to get started, please open the link you received from the recruiter.\n\n\
     Ask your HR contact for a valid link if you don't have one.";

pub const ONE_MOMENT: &str = "One moment, we are looking up your application...";

pub const WELCOME: &str = "Welcome!\n\nI will guide you through the selection process.\n\n\
     Let's start with your details.\n\nPlease enter your full name:";

pub const ASK_NAME: &str = "Please enter your full name:";
pub const ASK_PHONE: &str = "Enter your phone number (for example: +79991234567):";
pub const ASK_HANDLE: &str = "Please enter your messenger handle (for example: @username):";
pub const ASK_CITY: &str = "Enter the city you live in:";
pub const SAVING_PROFILE: &str = "Saving your details, please wait...";

pub const INVALID_PHONE: &str = "Invalid phone number format!\n\n\
     Please enter the number as +79991234567.\n\
     The number must contain 10 digits after the country code.";

pub const CONNECTION_PROBLEM: &str = "Connection problems, please try again later.";

pub const RESUME_NOT_TEXT: &str = "Please send your resume as a file, not as text.\n\nAttach it with the paperclip.";
pub const UPLOAD_IN_PROGRESS: &str = "Your resume is being uploaded, please wait...";
pub const STORAGE_UNAVAILABLE: &str =
    "Resume storage is temporarily unavailable. Please send the file again later.";
pub const UPLOAD_FAILED: &str = "We could not save your resume. Please send the file again.";
pub const DOCUMENT_NOT_EXPECTED: &str = "We are not expecting a document right now.";
pub const FINISH_REGISTRATION_FIRST: &str = "Please finish entering your details first.";

pub const UPLOADING_RESUME: &str = "Uploading your resume to cloud storage...";
pub const SCREENING_IN_PROGRESS: &str = "Your resume is being reviewed. We will get back to you shortly.";
pub const SCREENING_KICKOFF_FAILED: &str = "Connection problems while submitting your resume for review.\n\n\
     Use /resume a bit later to continue.";
pub const SCREENING_RESTARTED: &str = "We have resubmitted your resume for review.";
pub const DECISION_PENDING: &str = "The decision is taking longer than usual.\n\n\
     Use /resume later to check again.";

pub const GOOD_NEWS: &str = "Good news!";
pub const PRESS_READY: &str = "Press the button below when you are ready to start the interview.";
pub const NOT_READY: &str = "Alright, you can take the interview later.\n\n\
     When you are ready, use the /resume command to continue.";
pub const WELCOME_BACK: &str = "Welcome back!\n\nYou have passed the resume screening.\nReady to start the interview?";

pub const PREPARING_QUESTIONS: &str = "Preparing your questions, one moment...";
pub const QUESTIONS_UNAVAILABLE: &str = "We could not load the interview questions. Connection problems, please try again later.";
pub const ANSWER_BY_TEXT: &str = "Answer with text messages.";
pub const ANSWER_ACCEPTED: &str = "Answer accepted!";
pub const ANSWER_TOO_LATE: &str = "Unfortunately, the time to answer has run out.\nThis answer will not be counted.";
pub const TIME_UP: &str = "Time is up!\n\nThe question was skipped. Moving on to the next one...";
pub const WAIT_FOR_NEXT_QUESTION: &str = "Please wait for the next question.";
pub const INTERVIEW_IN_PROGRESS: &str = "Your interview is in progress. Please answer the current question.";

pub const RESULTS_PENDING: &str = "Your interview is complete. Please wait for the results...";
pub const RESULTS_SUBMIT_FAILED: &str = "Connection problems while submitting your interview.\n\n\
     Use /resume a bit later to continue.";

pub const PASSED: &str = "Congratulations! You have passed the interview!\n\n\
     Our HR manager will contact you to discuss the next steps.\n\nThank you for taking part!";
pub const INTERVIEW_REJECTED: &str = "Unfortunately, you are not a fit for this vacancy.\n\n\
     We appreciate your time and interest in our company.\nGood luck with your career!";
pub const SCREENING_REJECTED: &str = "Unfortunately, you are not a fit for this vacancy.";
pub const ABANDONED: &str = "Your registration has expired.\n\n\
     Open the recruiter link again to start over.";

pub const NO_ACTIVE_PROCESS: &str = "You have no active interviews.\n\n\
     Use the link from the recruiter to start a new selection process.";

pub const QUICK_MENU: &str = "Frequently asked questions\n\nChoose a question:";
pub const MENU_CLOSED: &str = "Menu closed.\n\nUse /questions to open it again.";
pub const HELP: &str = "Available commands:\n\
     /start - begin with the link from the recruiter\n\
     /resume - continue where you left off\n\
     /questions - frequently asked questions";

pub fn ask_resume(max_bytes: u64) -> String {
    format!(
        "Details saved!\n\nNow send your resume as a PDF file\n(maximum size: {}).",
        format_megabytes(max_bytes)
    )
}

pub fn wrong_format(extensions: &[String]) -> String {
    let list = extensions
        .iter()
        .map(|e| e.to_ascii_uppercase())
        .collect::<Vec<_>>()
        .join(", ");
    format!("Please send the file in one of these formats: {list}")
}

pub fn too_large(size_bytes: u64, max_bytes: u64) -> String {
    format!(
        "The file is too large!\n\nMaximum resume size: {}\nYour file: {}\n\n\
         Please reduce the file size and send it again.",
        format_megabytes(max_bytes),
        format_megabytes(size_bytes)
    )
}

/// Acknowledge the previous sub-step and ask for the next one
pub fn accepted(prompt: &str) -> String {
    format!("Accepted!\n\n{prompt}")
}

pub fn registration_retry() -> String {
    format!("{CONNECTION_PROBLEM}\n\n{ASK_CITY}")
}

/// Confirmation of the collected profile once the resume is stored
pub fn profile_confirmed(session: &Session) -> String {
    let field = |f: ProfileField| session.profile_value(f).unwrap_or("not provided");
    format!(
        "Details received!\n\nName: {}\nPhone: {}\nHandle: {}\nCity: {}\n\n\
         Your resume has been saved to cloud storage.",
        field(ProfileField::Name),
        field(ProfileField::Phone),
        field(ProfileField::Handle),
        field(ProfileField::City),
    )
}

pub fn invitation(question_count: Option<usize>) -> String {
    match question_count {
        Some(n) => format!(
            "We invite you to an interview!\nQuestions: {n}\nThe time for each question is limited."
        ),
        None => "We invite you to an interview!\nThe time for each question is limited.".to_string(),
    }
}

pub fn interview_starting() -> String {
    format!("Starting the interview!\n\n{ANSWER_BY_TEXT}")
}

pub fn question(slot: usize, total: usize, question: &Question) -> String {
    format!(
        "Question {} of {}:\n\n{}\n\nNote: you have {} seconds to answer.",
        slot + 1,
        total,
        question.content,
        question.time_limit_secs
    )
}

pub fn interview_summary(session: &Session) -> String {
    format!(
        "The interview is complete!\n\nStatistics:\n- Total questions: {}\n- Answered: {}\n- Skipped: {}\n\n\
         All your answers have been saved and sent for analysis.\n\nPlease wait for the results...",
        session.questions.len(),
        session.answered_count(),
        session.skipped_count()
    )
}

pub fn screening_rejected(feedback: Option<&str>) -> String {
    match feedback {
        Some(text) if !text.trim().is_empty() => format!("{SCREENING_REJECTED}\n\n{}", text.trim()),
        _ => SCREENING_REJECTED.to_string(),
    }
}

/// Reminder shown when a closed session receives input
pub fn closed(session: &Session) -> String {
    let outcome = match session.state.name() {
        "passed" => "Your application was successful; HR will be in touch.",
        "abandoned" => "Your registration has expired.",
        _ => "Your application for this vacancy is closed.",
    };
    format!("{outcome}\n\nUse a new recruiter link to apply for another vacancy.")
}

fn format_megabytes(bytes: u64) -> String {
    // Sizes stay far below f64's exact integer range
    #[allow(clippy::cast_precision_loss)]
    let mb = bytes as f64 / (1024.0 * 1024.0);
    format!("{mb:.2} MB")
}
