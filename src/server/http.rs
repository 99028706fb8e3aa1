//! WHIP signaling routes
//!
//! | Method | Path                           | Action                       |
//! |--------|--------------------------------|------------------------------|
//! | POST   | `/whip/{mode}/{room}/{stream}` | offer in, answer out         |
//! | PATCH  | `/whip/{room}/{resource_id}`   | trickle ICE candidate        |
//! | DELETE | `/whip/{room}/{resource_id}`   | tear the session down        |
//! | GET    | `/whip/list`                   | JSON list of sessions        |

use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};

use crate::error::{Error, Result};
use crate::registry::SessionDescriptor;
use crate::session::{ResourceId, SessionMode};

use super::controller::Controller;

/// Content type of SDP offers and answers
pub const SDP_CONTENT_TYPE: &str = "application/sdp";

/// Content type of trickled candidates
pub const TRICKLE_ICE_CONTENT_TYPE: &str = "application/trickle-ice-sdpfrag";

/// Build the signaling router
pub fn router(controller: Controller) -> Router {
    Router::new()
        .route("/whip/list", get(list_sessions))
        // One parameter name per path position; handlers extract by position
        .route("/whip/:p1/:p2/:p3", post(create_session))
        .route("/whip/:p1/:p2", patch(add_candidate).delete(delete_session))
        .with_state(controller)
}

async fn create_session(
    State(controller): State<Controller>,
    Path((mode, room, stream)): Path<(String, String, String)>,
    offer: String,
) -> Result<Response> {
    let mode: SessionMode = mode.parse()?;

    tracing::info!(mode = %mode, room = %room, stream = %stream, "Session requested");
    let answer = controller
        .create_session(mode, &room, &stream, &offer)
        .await?;

    let location = format!("/whip/{}/{}", answer.key.room, answer.resource_id);
    Ok((
        StatusCode::CREATED,
        [
            (header::CONTENT_TYPE, SDP_CONTENT_TYPE.to_string()),
            (header::LOCATION, location),
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*".to_string()),
        ],
        answer.sdp,
    )
        .into_response())
}

async fn add_candidate(
    State(controller): State<Controller>,
    Path((_room, resource_id)): Path<(String, String)>,
    candidate: String,
) -> Result<Response> {
    controller
        .add_remote_candidate(&ResourceId::from(resource_id), candidate.trim())
        .await?;

    Ok((
        StatusCode::CREATED,
        [(header::CONTENT_TYPE, TRICKLE_ICE_CONTENT_TYPE)],
    )
        .into_response())
}

async fn delete_session(
    State(controller): State<Controller>,
    Path((_room, resource_id)): Path<(String, String)>,
) -> Result<String> {
    let resource_id = ResourceId::from(resource_id);
    controller.delete_session(&resource_id).await?;
    Ok(format!("{} deleted", resource_id))
}

async fn list_sessions(State(controller): State<Controller>) -> Json<Vec<SessionDescriptor>> {
    Json(controller.list_sessions().await)
}

impl Error {
    /// HTTP status reported for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::AdmissionConflict(_) => StatusCode::CONFLICT,
            Error::PublisherNotFound(_) | Error::SessionNotFound(_) => StatusCode::NOT_FOUND,
            Error::Mode(_) => StatusCode::BAD_REQUEST,
            Error::Negotiation(_)
            | Error::Transport(_)
            | Error::Sink(_)
            | Error::Config(_)
            | Error::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, status = %status, "Request rejected");
        }

        let mut response = (status, self.to_string()).into_response();
        response.headers_mut().insert(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        );
        response
    }
}
