//! Wire shapes for the HTTP API and the WebSocket (serde ready, camelCase).
//! Request bodies keep fields optional so handlers can answer with a precise 400.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analytics::{ModuleStatus, SessionStats};
use crate::domain::{Category, Course, Difficulty, Question, TestResult, User, UserStats};
use crate::llm::ReasoningEval;

// --- Auth ---

#[derive(Debug, Deserialize, Default)]
pub struct RegisterRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub token: String,
    pub user: User,
}

#[derive(Debug, Serialize)]
pub struct MessageOut {
    pub message: String,
}

// --- Training (chat) ---

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    #[serde(default)]
    pub category_id: Option<String>,
}

/// A question as shown during training: no answer, no explanation.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct QuestionOut {
    pub id: String,
    pub text: String,
    pub options: Vec<String>,
    pub difficulty: Difficulty,
}

impl From<&Question> for QuestionOut {
    fn from(q: &Question) -> Self {
        Self { id: q.id.clone(), text: q.text.clone(), options: q.options.clone(), difficulty: q.difficulty }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
    pub session_id: String,
    pub message: String,
    pub question: QuestionOut,
    pub stats: SessionStats,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRequest {
    pub session_id: Option<String>,
    pub question_id: Option<String>,
    pub selected_index: Option<i64>,
    #[serde(default)]
    pub free_text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionResult {
    pub correct: bool,
    pub explanation: String,
    pub ai_feedback: String,
    pub free_text_evaluation: Option<ReasoningEval>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerResponse {
    pub done: bool,
    pub current_question_result: QuestionResult,
    pub next_question: Option<QuestionOut>,
    pub stats: SessionStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ConversationResponse {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub content: String,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct CategoryOut {
    pub id: String,
    pub name: String,
    pub count: usize,
}

impl From<Category> for CategoryOut {
    fn from(c: Category) -> Self {
        Self { id: c.id, name: c.name, count: c.question_count }
    }
}

#[derive(Debug, Serialize)]
pub struct CategoriesResponse<T> {
    pub categories: Vec<T>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotesSource {
    Ai,
    Cache,
    Syllabus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotesResponse {
    pub category_id: String,
    pub category_name: String,
    pub notes: String,
    pub source: NotesSource,
}

#[derive(Debug, Serialize)]
pub struct ModulesResponse {
    pub modules: Vec<ModuleStatus>,
}

// --- Static tests (quiz) ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizCategory {
    pub id: String,
    pub name: String,
    pub description: String,
    pub question_count: usize,
}

#[derive(Debug, Deserialize, Default)]
pub struct QuizQuestionsQuery {
    pub difficulty: Option<i64>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct PublicQuestion {
    pub id: String,
    pub difficulty: Difficulty,
    pub question: String,
    pub options: Vec<String>,
}

impl From<&Question> for PublicQuestion {
    fn from(q: &Question) -> Self {
        Self { id: q.id.clone(), difficulty: q.difficulty, question: q.text.clone(), options: q.options.clone() }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizQuestionsResponse {
    pub category: String,
    pub questions: Vec<PublicQuestion>,
    pub total_questions: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedAnswer {
    pub question_id: String,
    pub selected_option: i64,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SubmitTestRequest {
    pub category_id: Option<String>,
    pub answers: Option<Vec<SubmittedAnswer>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerOutcome {
    pub question_id: String,
    pub question: String,
    pub selected_option: i64,
    pub correct_option: usize,
    pub is_correct: bool,
    pub explanation: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitTestResponse {
    pub score: i64,
    pub correct_count: i64,
    pub total_questions: i64,
    pub results: Vec<AnswerOutcome>,
    pub test_result_id: String,
    pub user_stats: UserStats,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub results: Vec<TestResult>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityItem {
    pub action: String,
    pub at: DateTime<Utc>,
    pub score: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardUser {
    pub id: String,
    pub name: String,
    pub email: String,
    pub level: &'static str,
    #[serde(flatten)]
    pub stats: UserStats,
    pub rank: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardResponse {
    pub user: DashboardUser,
    pub recent_activity: Vec<ActivityItem>,
    pub modules: Vec<ModuleStatus>,
}

// --- Admin ---

#[derive(Debug, Deserialize, Default)]
pub struct UsersQuery {
    pub role: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct CreateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CourseRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category_id: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct QuestionsQuery {
    pub category_id: Option<String>,
    pub difficulty: Option<i64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CreateQuestionRequest {
    pub external_id: Option<String>,
    pub category_id: Option<String>,
    pub category_name: Option<String>,
    pub difficulty: Option<i64>,
    pub question: Option<String>,
    #[serde(default)]
    pub options: Vec<String>,
    pub correct_index: Option<i64>,
    pub explanation: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GenerateQuestionRequest {
    pub difficulty: Option<i64>,
    pub category_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminCategory {
    pub id: String,
    pub name: String,
    pub question_count: usize,
}

#[derive(Debug, Serialize)]
pub struct UserOut {
    pub user: User,
}

#[derive(Debug, Serialize)]
pub struct UsersResponse {
    pub users: Vec<User>,
}

#[derive(Debug, Serialize)]
pub struct CourseOut {
    pub course: Course,
}

#[derive(Debug, Serialize)]
pub struct CoursesResponse {
    pub courses: Vec<Course>,
}

#[derive(Debug, Serialize)]
pub struct QuestionOutFull {
    pub question: Question,
}

#[derive(Debug, Serialize)]
pub struct QuestionsResponse {
    pub questions: Vec<Question>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminDashboardResponse {
    pub total_courses: usize,
    pub courses: Vec<Course>,
}

// --- WebSocket ---

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    StartSession {
        #[serde(default, rename = "categoryId")]
        category_id: Option<String>,
    },
    SubmitAnswer {
        #[serde(rename = "sessionId")]
        session_id: String,
        #[serde(rename = "questionId")]
        question_id: String,
        #[serde(rename = "selectedIndex")]
        selected_index: i64,
        #[serde(default, rename = "freeText")]
        free_text: Option<String>,
    },
    Conversation {
        #[serde(default, rename = "sessionId")]
        session_id: Option<String>,
        message: String,
    },
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    SessionStarted(StartResponse),
    AnswerResult(AnswerResponse),
    Message { content: String },
    Error { status: u16, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_messages_parse_from_tagged_json() {
        let m: ClientWsMessage = serde_json::from_str(
            r#"{"type":"submit_answer","sessionId":"s","questionId":"q","selectedIndex":2}"#,
        )
        .expect("parse");
        match m {
            ClientWsMessage::SubmitAnswer { selected_index, free_text, .. } => {
                assert_eq!(selected_index, 2);
                assert!(free_text.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
        let m: ClientWsMessage = serde_json::from_str(r#"{"type":"start_session"}"#).expect("parse");
        assert!(matches!(m, ClientWsMessage::StartSession { category_id: None }));
    }

    #[test]
    fn server_messages_are_tagged() {
        let out = serde_json::to_value(ServerWsMessage::Message { content: "hi".into() }).expect("json");
        assert_eq!(out["type"], "message");
        let out = serde_json::to_value(ServerWsMessage::Pong).expect("json");
        assert_eq!(out, serde_json::json!({ "type": "pong" }));
    }

    #[test]
    fn conversation_response_uses_type_key() {
        let out = serde_json::to_value(ConversationResponse { kind: "message", content: "x".into() }).expect("json");
        assert_eq!(out["type"], "message");
    }
}
