//! One-time link endpoints.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::Response;
use axum::Json;
use serde::{Deserialize, Serialize};

use catalog::parse_positive_int;

use crate::server::download::delivery_response;
use crate::server::error::ApiError;
use crate::server::files::{parse_id, IdQuery};
use crate::server::{blocking, ServerState};

#[derive(Debug, Default, Deserialize)]
pub struct IssueLinkQuery {
    pub id: Option<String>,
    /// Lifetime in minutes.
    pub expires: Option<String>,
    pub maxdownloads: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LinkResponse {
    pub token: String,
}

fn required<'a>(field: &str, raw: &'a Option<String>) -> Result<&'a str, ApiError> {
    raw.as_deref()
        .ok_or_else(|| ApiError::bad_request(format!("{field} not provided")))
}

pub async fn issue_link(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<IssueLinkQuery>,
) -> Result<Json<LinkResponse>, ApiError> {
    let id = parse_id(query.id.as_deref())?;
    let ttl_minutes = parse_positive_int("expires", required("expires", &query.expires)?)?;
    let max_uses = parse_positive_int(
        "maxdownloads",
        required("maxdownloads", &query.maxdownloads)?,
    )?;

    let token = state.drive.issue_link(id, ttl_minutes, max_uses)?;
    tracing::info!(%id, ttl_minutes, max_uses, "issued one-time link");
    Ok(Json(LinkResponse { token }))
}

/// Redeems one use of the token in `id` and streams the bound entry.
pub async fn consume_link(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<IdQuery>,
) -> Result<Response, ApiError> {
    let token = query
        .id
        .filter(|token| !token.is_empty())
        .ok_or_else(|| ApiError::bad_request("id not provided"))?;
    let delivery = blocking(&state, move |drive| drive.consume_link(&token)).await?;
    delivery_response(delivery).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::download::tests::body_bytes;
    use crate::server::test_support::{id_of, state_fixture};
    use axum::http::StatusCode;

    fn issue_query(id: &str, expires: &str, maxdownloads: &str) -> Query<IssueLinkQuery> {
        Query(IssueLinkQuery {
            id: Some(id.to_string()),
            expires: Some(expires.to_string()),
            maxdownloads: Some(maxdownloads.to_string()),
        })
    }

    fn token_query(token: &str) -> Query<IdQuery> {
        Query(IdQuery {
            id: Some(token.to_string()),
        })
    }

    #[tokio::test]
    async fn link_serves_exactly_max_downloads() {
        let (_temp, state) = state_fixture();
        let id = id_of(&state, "a.txt");

        let Json(link) = issue_link(State(state.clone()), issue_query(&id, "60", "2"))
            .await
            .expect("issue");
        assert_eq!(link.token.len(), 96);

        for _ in 0..2 {
            let response = consume_link(State(state.clone()), token_query(&link.token))
                .await
                .expect("within budget");
            assert_eq!(body_bytes(response).await, b"hello");
        }

        let err = consume_link(State(state), token_query(&link.token))
            .await
            .expect_err("spent");
        assert_eq!(err.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(err.code(), "exhausted");
    }

    #[tokio::test]
    async fn issue_rejects_bad_parameters() {
        let (_temp, state) = state_fixture();
        let id = id_of(&state, "a.txt");

        for (expires, maxdownloads) in [("0", "1"), ("60", "-1"), ("soon", "1"), ("60", "")] {
            let err = issue_link(State(state.clone()), issue_query(&id, expires, maxdownloads))
                .await
                .expect_err("invalid");
            assert_eq!(err.status(), StatusCode::BAD_REQUEST, "{expires} {maxdownloads}");
        }

        let err = issue_link(
            State(state.clone()),
            Query(IssueLinkQuery {
                id: Some(id),
                expires: None,
                maxdownloads: Some("1".to_string()),
            }),
        )
        .await
        .expect_err("missing expires");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let unknown = uuid::Uuid::new_v4().to_string();
        let err = issue_link(State(state.clone()), issue_query(&unknown, "60", "1"))
            .await
            .expect_err("unknown entry");
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert!(state.drive.links().is_empty());
    }

    #[tokio::test]
    async fn unknown_token_is_not_found() {
        let (_temp, state) = state_fixture();
        let err = consume_link(State(state.clone()), token_query("nope"))
            .await
            .expect_err("unknown");
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let err = consume_link(State(state), Query(IdQuery::default()))
            .await
            .expect_err("missing");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn directory_link_streams_an_archive() {
        let (_temp, state) = state_fixture();
        let id = id_of(&state, "docs");
        let Json(link) = issue_link(State(state.clone()), issue_query(&id, "5", "1"))
            .await
            .expect("issue");

        let response = consume_link(State(state), token_query(&link.token))
            .await
            .expect("consume");
        let disposition = response
            .headers()
            .get(axum::http::header::CONTENT_DISPOSITION)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        assert!(disposition.contains("filename=\"docs.tar.gz\""));
    }
}
