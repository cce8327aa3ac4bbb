//! Streaming delivery of prepared downloads.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use futures_util::Stream;
use tempfile::TempPath;
use tokio_util::io::ReaderStream;

use catalog::{CatalogError, Delivery};

use crate::server::error::ApiError;
use crate::server::files::{parse_id, IdQuery};
use crate::server::{blocking, ServerState};

/// Body stream that owns the temporary archive behind it, so the archive is
/// removed once the response finishes or the client goes away.
struct GuardedStream<S> {
    inner: S,
    _archive: Option<TempPath>,
}

impl<S: Stream + Unpin> Stream for GuardedStream<S> {
    type Item = S::Item;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// Turns a prepared delivery into an attachment response.
pub(crate) async fn delivery_response(delivery: Delivery) -> Result<Response, ApiError> {
    let (path, filename, archive) = delivery.into_parts();
    let file = tokio::fs::File::open(&path)
        .await
        .map_err(|error| CatalogError::io(&path, error))?;
    let length = file
        .metadata()
        .await
        .map_err(|error| CatalogError::io(&path, error))?
        .len();

    tracing::debug!(path = %path.display(), %filename, length, "streaming download");
    let body = Body::from_stream(GuardedStream {
        inner: ReaderStream::new(file),
        _archive: archive,
    });
    let headers = [
        (header::CONTENT_TYPE, "application/octet-stream".to_string()),
        (header::CONTENT_DISPOSITION, content_disposition(&filename)),
        (header::CONTENT_LENGTH, length.to_string()),
    ];
    Ok((headers, body).into_response())
}

/// `attachment` disposition with an ASCII fallback and an RFC 5987 encoded name.
pub(crate) fn content_disposition(filename: &str) -> String {
    let fallback: String = filename
        .chars()
        .map(|ch| match ch {
            '"' | '\\' => '_',
            ch if ch.is_ascii() && !ch.is_ascii_control() => ch,
            _ => '_',
        })
        .collect();
    format!(
        "attachment; filename=\"{fallback}\"; filename*=UTF-8''{}",
        urlencoding::encode(filename)
    )
}

/// Delivers an entry directly, without a one-time link.
pub async fn download(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<IdQuery>,
) -> Result<Response, ApiError> {
    let id = parse_id(query.id.as_deref())?;
    let delivery = blocking(&state, move |drive| drive.deliver(id)).await?;
    delivery_response(delivery).await
}
