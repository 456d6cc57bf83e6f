use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State, multipart::Field},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;
use serde::Deserialize;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

use deaddrop_engine::lifecycle::MAX_BLOB_SIZE;
use deaddrop_engine::{DiskStorage, DropError, LifecycleEngine, NewDrop};
use deaddrop_types::api::{CleanupResponse, DeleteResponse, DownloadResponse, UploadResponse};

/// Ciphertext ceiling plus room for the thumbnail and form fields.
const MAX_REQUEST_BODY: usize = MAX_BLOB_SIZE + 8 * 1024 * 1024;

const DELETE_TOKEN_HEADER: &str = "x-delete-token";

/// Shared application state for all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: LifecycleEngine,
    pub storage: Arc<DiskStorage>,
    pub cron_secret: Option<String>,
    pub http: reqwest::Client,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/upload", post(upload))
        .route("/api/file/{id}", get(file_info).delete(delete_file))
        .route("/api/download/{id}", get(download))
        .route("/api/preview/{id}", get(preview))
        .route("/api/cron/cleanup", get(cron_cleanup))
        .route("/blobs/{*key}", get(blob))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY))
        .with_state(state)
}

// ── Request types ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CronQuery {
    pub key: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BlobQuery {
    pub expires: i64,
    pub sig: String,
}

// ── Error mapping ───────────────────────────────────────────────────────

/// Expired and exhausted both come out as 410; crypto never reaches here.
fn into_status(err: DropError) -> StatusCode {
    match err {
        DropError::NotFound => StatusCode::NOT_FOUND,
        DropError::Gone => StatusCode::GONE,
        DropError::Forbidden => StatusCode::FORBIDDEN,
        DropError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        DropError::InvalidRequest(reason) => {
            debug!("Rejected request: {}", reason);
            StatusCode::BAD_REQUEST
        }
        err @ (DropError::Storage(_) | DropError::RecordStore(_)) => {
            warn!("{}", err);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

// ── Handlers ────────────────────────────────────────────────────────────

/// POST /api/upload — multipart upload of an already-encrypted file.
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, StatusCode> {
    let mut new_drop = NewDrop::default();
    let mut file_name = None;
    let mut file_type = None;
    let mut original_name = None;
    let mut original_type = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        warn!("Malformed multipart upload: {}", e);
        e.status()
    })? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                file_name = field.file_name().map(str::to_string);
                file_type = field.content_type().map(str::to_string);
                new_drop.blob = field.bytes().await.map_err(|e| e.status())?;
            }
            "thumbnail" => {
                new_drop.preview = Some(field.bytes().await.map_err(|e| e.status())?);
            }
            "originalName" => original_name = Some(text(field).await?),
            "originalType" => original_type = Some(text(field).await?),
            "originalSize" => new_drop.declared_size = Some(number(field).await?),
            "downloadLimit" => new_drop.download_limit = Some(number(field).await?),
            "isPasswordProtected" => new_drop.is_password_protected = text(field).await? == "true",
            "passwordSalt" => new_drop.password_salt = Some(text(field).await?),
            "webhookUrl" => new_drop.webhook_url = Some(text(field).await?),
            other => debug!("Ignoring unknown upload field {:?}", other),
        }
    }

    // Explicit metadata wins over whatever the multipart part claims.
    new_drop.original_name = present(original_name).or(file_name);
    new_drop.mime_type = present(original_type).or(file_type);

    let record = state.engine.create(new_drop).await.map_err(into_status)?;

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            id: record.id,
            name: record.original_name,
            size: record.declared_size,
            expires_at: record.expires_at,
            delete_token: record.delete_token,
        }),
    ))
}

/// GET /api/file/{id} — public metadata. Does not spend budget.
pub async fn file_info(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, StatusCode> {
    let view = state.engine.fetch_metadata(&id).map_err(into_status)?;
    Ok(Json(view))
}

/// GET /api/download/{id} — spend one download and return a signed URL.
pub async fn download(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, StatusCode> {
    let grant = state.engine.fetch_for_download(&id).await.map_err(into_status)?;

    if let Some(notice) = grant.notice {
        crate::webhook::deliver(state.http.clone(), notice);
    }

    Ok(Json(DownloadResponse {
        url: grant.access.url,
        name: grant.record.original_name,
        expires_at: grant.access.expires_at,
    }))
}

/// DELETE /api/file/{id} — early deletion with the uploader's token.
pub async fn delete_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, StatusCode> {
    let token = headers
        .get(DELETE_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    state
        .engine
        .delete_by_owner(&id, token)
        .await
        .map_err(into_status)?;

    Ok(Json(DeleteResponse { success: true }))
}

/// GET /api/preview/{id} — encrypted thumbnail bytes.
pub async fn preview(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, StatusCode> {
    let bytes = state.engine.fetch_preview(&id).await.map_err(into_status)?;
    Ok(([(header::CONTENT_TYPE, "application/octet-stream")], bytes))
}

/// GET /api/cron/cleanup — external scheduler hook for the sweep.
///
/// Accepts `Authorization: Bearer <secret>` or `?key=<secret>`.
pub async fn cron_cleanup(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<CronQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "));

    if !cron_authorized(state.cron_secret.as_deref(), bearer, query.key.as_deref()) {
        return Err(StatusCode::UNAUTHORIZED);
    }

    let deleted = state
        .engine
        .sweep_expired(Utc::now())
        .await
        .map_err(into_status)?;
    info!("Cron cleanup purged {} drops", deleted);

    let message = if deleted == 0 {
        "No files to cleanup"
    } else {
        "Cleanup successful"
    };
    Ok(Json(CleanupResponse {
        message: message.to_string(),
        deleted,
    }))
}

/// GET /blobs/{*key} — serve a blob to the holder of a valid signed grant.
pub async fn blob(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<BlobQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    if !state
        .storage
        .verify_access(&key, query.expires, &query.sig, Utc::now())
    {
        return Err(StatusCode::FORBIDDEN);
    }

    let file = state.storage.open_blob(&key).await.map_err(|e| {
        debug!("Blob {} unavailable: {}", key, e);
        StatusCode::NOT_FOUND
    })?;
    let len = file
        .metadata()
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .len();

    let headers = [
        (header::CONTENT_TYPE, "application/octet-stream".to_string()),
        (header::CONTENT_LENGTH, len.to_string()),
        (header::CACHE_CONTROL, "no-store".to_string()),
    ];
    Ok((headers, Body::from_stream(ReaderStream::new(file))))
}

/// GET /health — liveness check.
pub async fn health() -> &'static str {
    "ok"
}

// ── Helpers ─────────────────────────────────────────────────────────────

fn cron_authorized(secret: Option<&str>, bearer: Option<&str>, key: Option<&str>) -> bool {
    match secret {
        Some(secret) => bearer == Some(secret) || key == Some(secret),
        None => false,
    }
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

async fn text(field: Field<'_>) -> Result<String, StatusCode> {
    field.text().await.map_err(|e| e.status())
}

async fn number<T: std::str::FromStr>(field: Field<'_>) -> Result<T, StatusCode> {
    text(field)
        .await?
        .trim()
        .parse()
        .map_err(|_| StatusCode::BAD_REQUEST)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use axum::http::Request;
    use deaddrop_db::Database;
    use deaddrop_engine::EngineConfig;
    use deaddrop_types::DropRecordView;
    use tower::ServiceExt;

    const BOUNDARY: &str = "deaddrop-test-boundary";

    async fn app(cron_secret: Option<&str>) -> (tempfile::TempDir, Router) {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(Database::open(&dir.path().join("drops.db")).unwrap());
        let storage = Arc::new(
            DiskStorage::new(dir.path().join("blobs"), "route-secret", "http://drop.test")
                .await
                .unwrap(),
        );
        let config = EngineConfig {
            purge_grace: Duration::from_secs(3600),
            ..EngineConfig::default()
        };
        let state = AppState {
            engine: LifecycleEngine::new(db, storage.clone(), config),
            storage,
            cron_secret: cron_secret.map(str::to_string),
            http: reqwest::Client::new(),
        };
        (dir, router(state))
    }

    fn multipart(parts: &[(&str, &[u8])]) -> Request<Body> {
        let mut body = Vec::new();
        for (name, data) in parts {
            body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
            if *name == "file" {
                body.extend_from_slice(
                    b"Content-Disposition: form-data; name=\"file\"; filename=\"blob.bin\"\r\n\
                      Content-Type: application/octet-stream\r\n\r\n",
                );
            } else {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
                );
            }
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

        Request::builder()
            .method("POST")
            .uri("/api/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn json<T: serde::de::DeserializeOwned>(resp: axum::response::Response) -> T {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn upload_one(app: &Router, limit: &str) -> UploadResponse {
        let resp = app
            .clone()
            .oneshot(multipart(&[
                ("file", b"sealed-envelope-bytes"),
                ("originalName", b"plans.txt"),
                ("originalType", b"text/plain"),
                ("originalSize", b"9"),
                ("downloadLimit", limit.as_bytes()),
            ]))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        json(resp).await
    }

    #[tokio::test]
    async fn upload_download_and_fetch_blob() {
        let (_dir, app) = app(None).await;
        let uploaded = upload_one(&app, "1").await;
        assert_eq!(uploaded.name, "plans.txt");
        assert_eq!(uploaded.size, 9);

        let resp = app.clone().oneshot(get(&format!("/api/file/{}", uploaded.id))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let view: DropRecordView = json(resp).await;
        assert_eq!(view.mime_type, "text/plain");
        assert_eq!(view.downloads_remaining, Some(1));

        let resp = app
            .clone()
            .oneshot(get(&format!("/api/download/{}", uploaded.id)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let grant: DownloadResponse = json(resp).await;
        assert_eq!(grant.name, "plans.txt");

        let path = grant.url.strip_prefix("http://drop.test").unwrap();
        let resp = app.clone().oneshot(get(path)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"sealed-envelope-bytes");

        // Budget of one is spent.
        let resp = app
            .clone()
            .oneshot(get(&format!("/api/download/{}", uploaded.id)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::GONE);
    }

    #[tokio::test]
    async fn tampered_blob_grant_forbidden() {
        let (_dir, app) = app(None).await;
        let uploaded = upload_one(&app, "2").await;
        let resp = app
            .clone()
            .oneshot(get(&format!("/blobs/drops/{}?expires=9999999999&sig=00", uploaded.id)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn upload_without_file_is_bad_request() {
        let (_dir, app) = app(None).await;
        let resp = app
            .clone()
            .oneshot(multipart(&[("originalName", b"nothing.txt")]))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn delete_requires_matching_token() {
        let (_dir, app) = app(None).await;
        let uploaded = upload_one(&app, "1").await;
        let uri = format!("/api/file/{}", uploaded.id);
        let delete = |token: Option<&str>| {
            let mut req = Request::builder().method("DELETE").uri(&uri);
            if let Some(token) = token {
                req = req.header(DELETE_TOKEN_HEADER, token);
            }
            req.body(Body::empty()).unwrap()
        };

        let resp = app.clone().oneshot(delete(None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let resp = app.clone().oneshot(delete(Some("wrong"))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let resp = app
            .clone()
            .oneshot(delete(Some(uploaded.delete_token.as_str())))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = app.clone().oneshot(get(&uri)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn cron_cleanup_requires_secret() {
        let (_dir, app) = app(Some("cron-secret")).await;

        let resp = app.clone().oneshot(get("/api/cron/cleanup")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let resp = app
            .clone()
            .oneshot(get("/api/cron/cleanup?key=cron-secret"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body: CleanupResponse = json(resp).await;
        assert_eq!(body.deleted, 0);

        let req = Request::builder()
            .uri("/api/cron/cleanup")
            .header(header::AUTHORIZATION, "Bearer cron-secret")
            .body(Body::empty())
            .unwrap();
        assert_eq!(app.clone().oneshot(req).await.unwrap().status(), StatusCode::OK);
    }

    #[test]
    fn cron_disabled_without_secret() {
        assert!(!cron_authorized(None, Some(""), Some("")));
        assert!(!cron_authorized(Some("s"), Some("t"), None));
        assert!(cron_authorized(Some("s"), None, Some("s")));
    }

    #[test]
    fn gone_and_not_found_map_distinctly() {
        assert_eq!(into_status(DropError::Gone), StatusCode::GONE);
        assert_eq!(into_status(DropError::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(
            into_status(DropError::PayloadTooLarge { size: 2, limit: 1 }),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            into_status(DropError::Storage(anyhow::anyhow!("disk gone"))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
