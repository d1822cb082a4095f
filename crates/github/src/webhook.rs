use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{FromRef, FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use hmac::{Hmac, Mac};
use runbot_core::{
    config::Config,
    models::{CommentAction, CommentEvent, PipelineError, RepositoryRef, Sender, SenderKind},
};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;

pub const EVENT_HEADER: &str = "X-GitHub-Event";
pub const SIGNATURE_HEADER: &str = "X-Hub-Signature-256";
pub const DELIVERY_HEADER: &str = "X-GitHub-Delivery";

const SIGNATURE_PREFIX: &str = "sha256=";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("X-Hub-Signature-256 missing")]
    Missing,
    #[error("X-Hub-Signature-256 sha256= prefix missing")]
    MissingPrefix,
    #[error("X-Hub-Signature-256 malformed")]
    Malformed,
    #[error("signature mismatch")]
    Mismatch,
}

/// Compute the `X-Hub-Signature-256` value GitHub sends for `body`.
pub fn sign(secret: &[u8], body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(body);
    format!("{SIGNATURE_PREFIX}{}", hex::encode(mac.finalize().into_bytes()))
}

/// Check `header` against an HMAC-SHA256 of the raw, unparsed request body.
/// The digest comparison is constant-time.
pub fn verify_signature(
    secret: &[u8],
    body: &[u8],
    header: Option<&str>,
) -> Result<(), SignatureError> {
    let hex_digest = header
        .ok_or(SignatureError::Missing)?
        .strip_prefix(SIGNATURE_PREFIX)
        .ok_or(SignatureError::MissingPrefix)?;
    let signature = hex::decode(hex_digest).map_err(|_| SignatureError::Malformed)?;
    let mut mac = Hmac::<Sha256>::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(body);
    mac.verify_slice(&signature).map_err(|_| SignatureError::Mismatch)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPayload {
    IssueComment(CommentEvent),
    /// Any event kind the agent does not act on.
    Other,
}

/// Verify and extract GitHub Event Payload.
#[derive(Debug, Clone)]
#[must_use]
pub struct GitHubEvent {
    pub kind: String,
    pub delivery: Option<String>,
    pub payload: EventPayload,
}

impl<S> FromRequest<S> for GitHubEvent
where
    Arc<Config>: FromRef<S>,
    S: Send + Sync + Clone,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        // Never tell the sender which check failed.
        fn reject(detail: impl std::fmt::Display) -> Response {
            tracing::warn!("Rejected webhook delivery: {detail}");
            (StatusCode::BAD_REQUEST, "Invalid signature").into_response()
        }
        // The request must not stay borrowed across the body read
        let (kind, delivery, signature) = {
            let header = |name: &str| {
                req.headers().get(name).and_then(|v| v.to_str().ok()).map(str::to_string)
            };
            (header(EVENT_HEADER), header(DELIVERY_HEADER), header(SIGNATURE_HEADER))
        };
        let kind = kind.ok_or_else(|| reject("X-GitHub-Event header missing"))?;
        let config = <Arc<Config>>::from_ref(state);
        let body =
            Bytes::from_request(req, state).await.map_err(|_| reject("error reading body"))?;
        if let Err(e) =
            verify_signature(config.github.webhook_secret.as_bytes(), &body, signature.as_deref())
        {
            return Err(reject(format_args!("{}: {e}", PipelineError::SignatureInvalid)));
        }
        let payload = match kind.as_str() {
            "issue_comment" => EventPayload::IssueComment(
                parse_comment_event(&body)
                    .map_err(|e| reject(format_args!("error parsing body: {e}")))?,
            ),
            _ => EventPayload::Other,
        };
        Ok(GitHubEvent { kind, delivery, payload })
    }
}

#[derive(Debug, Deserialize)]
struct IssueCommentPayload {
    action: String,
    sender: User,
    repository: Repository,
    issue: Issue,
    comment: Comment,
    #[serde(default)]
    installation: Option<Installation>,
}

#[derive(Debug, Deserialize)]
struct User {
    login: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct Owner {
    login: String,
}

#[derive(Debug, Deserialize)]
struct Repository {
    name: String,
    owner: Owner,
}

#[derive(Debug, Deserialize)]
struct Issue {
    number: u64,
}

#[derive(Debug, Deserialize)]
struct Comment {
    #[serde(default)]
    body: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Installation {
    id: u64,
}

impl From<IssueCommentPayload> for CommentEvent {
    fn from(value: IssueCommentPayload) -> Self {
        Self {
            action: CommentAction::from_github_action(&value.action),
            sender: Sender {
                kind: SenderKind::from_github_type(&value.sender.kind),
                login: value.sender.login,
            },
            repository: RepositoryRef {
                owner: value.repository.owner.login,
                name: value.repository.name,
            },
            issue_number: value.issue.number,
            body: value.comment.body.unwrap_or_default(),
            installation_id: value.installation.map(|i| i.id),
        }
    }
}

/// Parse an `issue_comment` payload. Only the fields the pipeline reads are required.
pub fn parse_comment_event(body: &[u8]) -> Result<CommentEvent, serde_json::Error> {
    serde_json::from_slice::<IssueCommentPayload>(body).map(CommentEvent::from)
}
