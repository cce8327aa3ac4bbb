//! Catalog API endpoints.

use std::sync::Arc;

use axum::extract::{Multipart, Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use catalog::{parse_entry_id, CatalogError, Entry, ScanReport, SearchEntry, Upload};

use crate::server::error::ApiError;
use crate::server::{blocking, ServerState};

/// Query carrying an entry id.
#[derive(Debug, Default, Deserialize)]
pub struct IdQuery {
    pub id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RenameQuery {
    pub id: Option<String>,
    pub name: Option<String>,
}

/// List payload, keyed the way existing clients expect.
#[derive(Debug, Serialize)]
pub struct FilesResponse<T> {
    #[serde(rename = "Files")]
    pub files: Vec<T>,
}

impl<T> From<Vec<T>> for FilesResponse<T> {
    fn from(files: Vec<T>) -> Self {
        Self { files }
    }
}

/// Result of a rename or delete.
#[derive(Debug, Serialize)]
pub struct MutationResponse {
    pub message: String,
    pub file: Entry,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub message: String,
    pub path: String,
}

/// Parses an `id` parameter, rejecting a missing one.
pub(crate) fn parse_id(raw: Option<&str>) -> Result<Uuid, ApiError> {
    let raw = raw.ok_or_else(|| ApiError::bad_request("id not provided"))?;
    Ok(parse_entry_id(raw)?)
}

pub async fn list_files(State(state): State<Arc<ServerState>>) -> Json<FilesResponse<Entry>> {
    Json(state.drive.catalog().all().into())
}

pub async fn get_file(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<IdQuery>,
) -> Result<Json<Entry>, ApiError> {
    let id = parse_id(query.id.as_deref())?;
    Ok(Json(state.drive.catalog().by_id(id)?))
}

pub async fn root_files(State(state): State<Arc<ServerState>>) -> Json<FilesResponse<Entry>> {
    Json(state.drive.catalog().root().into())
}

pub async fn child_files(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<IdQuery>,
) -> Result<Json<FilesResponse<Entry>>, ApiError> {
    let id = parse_id(query.id.as_deref())?;
    Ok(Json(state.drive.catalog().children(id).into()))
}

pub async fn search_files(
    State(state): State<Arc<ServerState>>,
    Path(query): Path<String>,
) -> Json<FilesResponse<SearchEntry>> {
    Json(state.drive.catalog().search(&query).into())
}

pub async fn rename_file(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<RenameQuery>,
) -> Result<Json<MutationResponse>, ApiError> {
    let id = parse_id(query.id.as_deref())?;
    let name = query
        .name
        .filter(|name| !name.is_empty())
        .ok_or_else(|| ApiError::bad_request("name not provided"))?;

    let file = blocking(&state, move |drive| drive.catalog().rename(id, &name)).await?;
    tracing::info!(id = %file.id, path = %file.path.display(), "renamed entry");
    Ok(Json(MutationResponse {
        message: "file renamed".to_string(),
        file,
    }))
}

pub async fn delete_file(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<IdQuery>,
) -> Result<Json<MutationResponse>, ApiError> {
    let id = parse_id(query.id.as_deref())?;
    let file = blocking(&state, move |drive| drive.catalog().delete(id)).await?;
    tracing::info!(id = %file.id, path = %file.path.display(), "deleted entry");
    Ok(Json(MutationResponse {
        message: "file deleted".to_string(),
        file,
    }))
}

pub async fn scan(State(state): State<Arc<ServerState>>) -> Result<Json<ScanReport>, ApiError> {
    let report = blocking(&state, |drive| Ok(drive.scan())).await?;
    Ok(Json(report))
}

/// Accepts a multipart form with a `file` part and a `path` text field naming
/// the target directory. The file part is streamed to disk as it arrives.
pub async fn upload(
    State(state): State<Arc<ServerState>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut target: Option<String> = None;
    let mut received: Option<Upload> = None;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|error| ApiError::bad_request(format!("malformed upload: {error}")))?
    {
        match field.name() {
            Some("path") => {
                let text = field
                    .text()
                    .await
                    .map_err(|error| ApiError::bad_request(format!("malformed path: {error}")))?;
                target = Some(text);
            }
            Some("file") => {
                let filename = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| ApiError::bad_request("file name not provided"))?;
                let upload = blocking(&state, move |drive| drive.begin_upload(&filename)).await?;
                let mut writer = tokio::fs::File::from_std(upload.reopen()?);
                while let Some(chunk) = field
                    .chunk()
                    .await
                    .map_err(|error| ApiError::bad_request(format!("malformed file: {error}")))?
                {
                    writer
                        .write_all(&chunk)
                        .await
                        .map_err(|error| CatalogError::io(upload.path(), error))?;
                }
                writer
                    .flush()
                    .await
                    .map_err(|error| CatalogError::io(upload.path(), error))?;
                received = Some(upload);
            }
            _ => {}
        }
    }

    let target = target.ok_or_else(|| ApiError::bad_request("path not provided"))?;
    let upload = received.ok_or_else(|| ApiError::bad_request("file not provided"))?;
    let stored = blocking(&state, move |drive| drive.finish_upload(upload, &target)).await?;

    Ok(Json(UploadResponse {
        message: "file uploaded".to_string(),
        path: stored.display().to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::test_support::{id_of, state_fixture};
    use axum::http::StatusCode;

    fn id_query(id: &str) -> Query<IdQuery> {
        Query(IdQuery {
            id: Some(id.to_string()),
        })
    }

    #[tokio::test]
    async fn lists_root_and_children() {
        let (_temp, state) = state_fixture();

        let Json(all) = list_files(State(state.clone())).await;
        assert_eq!(all.files.len(), 4);

        let Json(root) = root_files(State(state.clone())).await;
        assert_eq!(root.files.len(), 1);
        assert_eq!(root.files[0].name, "drive");

        let drive_id = id_of(&state, "drive");
        let Json(children) = child_files(State(state.clone()), id_query(&drive_id))
            .await
            .expect("children");
        let mut names: Vec<_> = children.files.into_iter().map(|e| e.name).collect();
        names.sort();
        assert_eq!(names, vec!["docs", "readme.md"]);
    }

    #[tokio::test]
    async fn list_response_uses_files_key() {
        let (_temp, state) = state_fixture();
        let Json(root) = root_files(State(state)).await;
        let value = serde_json::to_value(&root).expect("serialize");
        assert!(value.get("Files").is_some_and(|files| files.is_array()));
    }

    #[tokio::test]
    async fn get_file_validates_the_id() {
        let (_temp, state) = state_fixture();

        let Json(entry) = get_file(State(state.clone()), id_query(&id_of(&state, "a.txt")))
            .await
            .expect("found");
        assert_eq!(entry.ext, ".txt");
        assert_eq!(entry.parent, "docs");

        let err = get_file(State(state.clone()), id_query("not-a-uuid"))
            .await
            .expect_err("malformed");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let err = get_file(State(state.clone()), Query(IdQuery::default()))
            .await
            .expect_err("missing");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let err = get_file(State(state), id_query(&Uuid::new_v4().to_string()))
            .await
            .expect_err("unknown");
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn search_matches_substrings() {
        let (_temp, state) = state_fixture();
        let Json(found) = search_files(State(state), Path("read".to_string())).await;
        assert_eq!(found.files.len(), 1);
        assert_eq!(found.files[0].name, "readme.md");
        assert_eq!(found.files[0].ext, ".md");
    }

    #[tokio::test]
    async fn rename_and_delete_update_the_catalog() {
        let (temp, state) = state_fixture();
        let id = id_of(&state, "readme.md");

        let Json(renamed) = rename_file(
            State(state.clone()),
            Query(RenameQuery {
                id: Some(id.clone()),
                name: Some("notes.md".to_string()),
            }),
        )
        .await
        .expect("rename");
        assert_eq!(renamed.file.name, "notes.md");
        assert!(temp.path().join("drive/notes.md").exists());

        let Json(deleted) = delete_file(State(state.clone()), id_query(&id))
            .await
            .expect("delete");
        assert_eq!(deleted.file.name, "notes.md");
        assert!(!temp.path().join("drive/notes.md").exists());

        let err = delete_file(State(state), id_query(&id))
            .await
            .expect_err("already gone");
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn rename_rejects_missing_name_and_root() {
        let (_temp, state) = state_fixture();

        let err = rename_file(
            State(state.clone()),
            Query(RenameQuery {
                id: Some(id_of(&state, "readme.md")),
                name: None,
            }),
        )
        .await
        .expect_err("no name");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let err = rename_file(
            State(state.clone()),
            Query(RenameQuery {
                id: Some(id_of(&state, "drive")),
                name: Some("elsewhere".to_string()),
            }),
        )
        .await
        .expect_err("root");
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
    }

    async fn multipart(body: &'static str) -> Multipart {
        use axum::extract::FromRequest;
        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/api/v1/upload")
            .header(
                axum::http::header::CONTENT_TYPE,
                "multipart/form-data; boundary=XBOUNDARY",
            )
            .body(axum::body::Body::from(body))
            .expect("request");
        Multipart::from_request(request, &()).await.expect("multipart")
    }

    #[tokio::test]
    async fn upload_stores_file_under_target() {
        let (temp, state) = state_fixture();
        let form = multipart(
            "--XBOUNDARY\r\n\
             Content-Disposition: form-data; name=\"path\"\r\n\r\n\
             docs\r\n\
             --XBOUNDARY\r\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"a.txt\"\r\n\
             Content-Type: text/plain\r\n\r\n\
             second\r\n\
             --XBOUNDARY--\r\n",
        )
        .await;

        let Json(uploaded) = upload(State(state.clone()), form).await.expect("upload");
        assert!(uploaded.path.ends_with("a(1).txt"), "{}", uploaded.path);
        let stored = std::fs::read(temp.path().join("drive/docs/a(1).txt")).expect("stored");
        assert_eq!(stored, b"second");
        assert!(state
            .drive
            .catalog()
            .all()
            .iter()
            .any(|entry| entry.name == "a(1).txt" && entry.parent == "docs"));
        assert_eq!(leftover_upload_temps(&temp.path().join("drive")), 0);
    }

    fn leftover_upload_temps(root: &std::path::Path) -> usize {
        std::fs::read_dir(root)
            .expect("root")
            .filter_map(|entry| entry.ok())
            .filter(|entry| {
                entry
                    .file_name()
                    .to_string_lossy()
                    .starts_with(catalog::UPLOAD_TEMP_PREFIX)
            })
            .count()
    }

    #[tokio::test]
    async fn upload_accepts_path_after_file_and_cleans_up_on_rejection() {
        let (temp, state) = state_fixture();
        let form = multipart(
            "--XBOUNDARY\r\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"c.txt\"\r\n\r\n\
             late path\r\n\
             --XBOUNDARY\r\n\
             Content-Disposition: form-data; name=\"path\"\r\n\r\n\
             ../outside\r\n\
             --XBOUNDARY--\r\n",
        )
        .await;

        let err = upload(State(state), form).await.expect_err("escapes root");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(leftover_upload_temps(&temp.path().join("drive")), 0);
        assert!(!temp.path().join("outside").exists());
    }

    #[tokio::test]
    async fn upload_requires_a_path() {
        let (temp, state) = state_fixture();
        let form = multipart(
            "--XBOUNDARY\r\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"b.txt\"\r\n\r\n\
             data\r\n\
             --XBOUNDARY--\r\n",
        )
        .await;

        let err = upload(State(state), form).await.expect_err("no path");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(leftover_upload_temps(&temp.path().join("drive")), 0);
    }

    #[tokio::test]
    async fn scan_picks_up_new_files() {
        let (temp, state) = state_fixture();
        std::fs::write(temp.path().join("drive/new.txt"), b"new").expect("write");

        let Json(report) = scan(State(state.clone())).await.expect("scan");
        assert_eq!(report.total, 5);
        assert_eq!(report.errors, 0);
        assert_eq!(state.drive.catalog().len(), 5);
    }
}
