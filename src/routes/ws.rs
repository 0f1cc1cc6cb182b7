//! WebSocket upgrade + message loop. The token rides in the query string (`/ws?token=...`)
//! because browsers cannot set headers on the upgrade. Each client message is parsed as
//! JSON and forwarded to the training logic; one JSON reply per message.

use std::sync::Arc;

use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use serde::Deserialize;
use tracing::{debug, error, info, instrument};

use crate::auth::{verify_token, AuthError, AuthUser};
use crate::error::ApiError;
use crate::logic::{self, AnswerInput};
use crate::protocol::{ClientWsMessage, ServerWsMessage};
use crate::routes::ApiQuery;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
  pub token: Option<String>,
}

#[instrument(level = "info", skip(ws, state, q))]
pub async fn ws_upgrade(
  ws: WebSocketUpgrade,
  State(state): State<Arc<AppState>>,
  ApiQuery(q): ApiQuery<WsQuery>,
) -> Result<impl IntoResponse, ApiError> {
  let token = q.token.filter(|t| !t.is_empty()).ok_or(AuthError::MissingToken)?;
  let user: AuthUser = verify_token(&token, &state.auth)?.into();
  info!(target: "cyberlms_backend", user = %user.id, "WebSocket upgrade requested");
  Ok(ws.on_upgrade(move |socket| handle_ws(socket, state, user)))
}

#[instrument(level = "info", skip(socket, state, user), fields(user = %user.id))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>, user: AuthUser) {
  info!(target: "cyberlms_backend", "WebSocket connected");
  while let Some(Ok(msg)) = socket.recv().await {
    match msg {
      Message::Text(txt) => {
        let reply_msg = match serde_json::from_str::<ClientWsMessage>(&txt) {
          Ok(incoming) => {
            debug!(target: "cyberlms_backend", "WS received: {:?}", &incoming);
            handle_client_ws(incoming, &state, &user).await
          }
          Err(e) => ServerWsMessage::Error { status: 400, message: format!("Invalid JSON: {e}") },
        };

        let out = serde_json::to_string(&reply_msg).unwrap_or_else(|e| {
          serde_json::json!({ "type": "error", "status": 500, "message": format!("Serialization error: {e}") }).to_string()
        });

        if let Err(e) = socket.send(Message::Text(out)).await {
          error!(target: "cyberlms_backend", error = %e, "WS send error");
          break;
        }
      }
      Message::Ping(payload) => {
        let _ = socket.send(Message::Pong(payload)).await;
      }
      Message::Close(_) => break,
      _ => {}
    }
  }
  info!(target: "cyberlms_backend", "WebSocket disconnected");
}

fn ws_error(e: ApiError) -> ServerWsMessage {
  let status = e.status().as_u16();
  let message = match e {
    ApiError::Internal(detail) => {
      error!(target: "cyberlms_backend", error = %detail, "WS internal error");
      "Internal server error".to_string()
    }
    other => other.to_string(),
  };
  ServerWsMessage::Error { status, message }
}

#[instrument(level = "info", skip(state, user), fields(user = %user.id))]
async fn handle_client_ws(msg: ClientWsMessage, state: &AppState, user: &AuthUser) -> ServerWsMessage {
  match msg {
    ClientWsMessage::Ping => ServerWsMessage::Pong,

    ClientWsMessage::StartSession { category_id } => match logic::start_session(state, user, category_id).await {
      Ok(out) => {
        info!(target: "training", session = %out.session_id, question = %out.question.id, "WS start_session served");
        ServerWsMessage::SessionStarted(out)
      }
      Err(e) => ws_error(e),
    },

    ClientWsMessage::SubmitAnswer { session_id, question_id, selected_index, free_text } => {
      let input = AnswerInput { session_id, question_id, selected_index, free_text };
      match logic::submit_answer(state, user, input).await {
        Ok(out) => {
          info!(target: "training", correct = out.current_question_result.correct, done = out.done, "WS submit_answer evaluated");
          ServerWsMessage::AnswerResult(out)
        }
        Err(e) => ws_error(e),
      }
    }

    ClientWsMessage::Conversation { session_id, message } => {
      match logic::conversation(state, user, session_id.as_deref(), &message).await {
        Ok(out) => ServerWsMessage::Message { content: out.content },
        Err(e) => ws_error(e),
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::Role;

  fn learner() -> AuthUser {
    AuthUser { id: "ws-user".into(), role: Role::Learner, name: "Sam".into() }
  }

  #[tokio::test]
  async fn ping_pong() {
    let state = AppState::for_tests().await;
    assert!(matches!(handle_client_ws(ClientWsMessage::Ping, &state, &learner()).await, ServerWsMessage::Pong));
  }

  #[tokio::test]
  async fn start_then_answer_over_the_socket_protocol() {
    let state = AppState::for_tests().await;
    let user = learner();
    let started = handle_client_ws(ClientWsMessage::StartSession { category_id: None }, &state, &user).await;
    let ServerWsMessage::SessionStarted(start) = started else {
      panic!("expected session_started, got {started:?}");
    };

    let reply = handle_client_ws(
      ClientWsMessage::SubmitAnswer {
        session_id: start.session_id.clone(),
        question_id: start.question.id.clone(),
        selected_index: 0,
        free_text: None,
      },
      &state,
      &user,
    )
    .await;
    assert!(matches!(reply, ServerWsMessage::AnswerResult(_)), "{reply:?}");
  }

  #[tokio::test]
  async fn errors_carry_status() {
    let state = AppState::for_tests().await;
    let reply = handle_client_ws(
      ClientWsMessage::Conversation { session_id: None, message: "   ".into() },
      &state,
      &learner(),
    )
    .await;
    match reply {
      ServerWsMessage::Error { status, .. } => assert_eq!(status, 400),
      other => panic!("expected error, got {other:?}"),
    }

    let reply = handle_client_ws(
      ClientWsMessage::SubmitAnswer { session_id: "nope".into(), question_id: "q".into(), selected_index: 0, free_text: None },
      &state,
      &learner(),
    )
    .await;
    assert!(matches!(reply, ServerWsMessage::Error { status: 400, .. }));
  }
}
