use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use runbot_github::webhook::{EventPayload, GitHubEvent};
use tracing::Instrument;

use crate::AppState;

/// Webhook handler. Verification happens in the extractor; once a delivery is
/// accepted it is acknowledged right away and processed on its own task.
pub async fn webhook(
    State(state): State<AppState>,
    GitHubEvent { kind, delivery, payload }: GitHubEvent,
) -> Response {
    let delivery = delivery.unwrap_or_else(|| "[unknown]".to_string());
    let EventPayload::IssueComment(event) = payload else {
        tracing::info!("Ignoring webhook event {} (delivery {})", kind, delivery);
        return (StatusCode::OK, "Event ignored").into_response();
    };

    tracing::info!(
        "Received {} event from {}#{} by @{} (delivery {})",
        kind,
        event.repository,
        event.issue_number,
        event.sender.login,
        delivery
    );
    let span = tracing::info_span!("delivery", id = %delivery);
    let dispatcher = state.dispatcher.clone();
    state.tasks.spawn(
        async move {
            let disposition = dispatcher.dispatch(&event).await;
            tracing::info!("Finished: {:?}", disposition);
        }
        .instrument(span),
    );

    (StatusCode::ACCEPTED, "Event accepted").into_response()
}
