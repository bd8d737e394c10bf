use crate::error::AppError;
use crate::models::backup::StartBackupRequest;
use crate::state::AppState;
use axum::body::Body;
use axum::extract::{Path as AxumPath, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get};
use axum::{Json, Router};
use std::sync::Arc;
use tokio_util::io::ReaderStream;

pub fn router(_state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_backups).post(start_backup))
        .route("/status", get(backup_status))
        .route("/download/{filename}", get(download_backup))
        .route("/{filename}", delete(delete_backup))
}

async fn start_backup(
    State(state): State<Arc<AppState>>,
    body: axum::body::Bytes,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    // An empty body means "use the configured defaults".
    let req: StartBackupRequest = if body.is_empty() {
        StartBackupRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::Validation(format!("invalid request body: {e}")))?
    };
    state.backup.start(req).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "message": "Backup started",
            "statusCheckPath": "/api/backups/status",
        })),
    ))
}

async fn backup_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<crate::models::backup::BackupStatus>, AppError> {
    Ok(Json(state.backup.status().await))
}

async fn list_backups(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, AppError> {
    let backups = state.backup.list().await?;
    let total_size: u64 = backups.iter().map(|b| b.size_bytes).sum();

    Ok(Json(serde_json::json!({
        "backups": backups,
        "totalSizeBytes": total_size,
        "totalCount": backups.len(),
    })))
}

async fn download_backup(
    State(state): State<Arc<AppState>>,
    AxumPath(filename): AxumPath<String>,
) -> Result<Response, AppError> {
    let (info, path) = state.backup.open_download(&filename).await?;

    let file = tokio::fs::File::open(&path)
        .await
        .map_err(|_| AppError::NotFound(format!("backup {filename} not found")))?;
    let body = Body::from_stream(ReaderStream::new(file));

    let headers = [
        (header::CONTENT_TYPE, info.format.content_type().to_string()),
        (header::CONTENT_LENGTH, info.size_bytes.to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", info.filename),
        ),
    ];
    Ok((headers, body).into_response())
}

async fn delete_backup(
    State(state): State<Arc<AppState>>,
    AxumPath(filename): AxumPath<String>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    let confirm = headers
        .get("x-confirm-delete")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if confirm != filename {
        return Err(AppError::Validation(
            "x-confirm-delete header must match the backup filename".into(),
        ));
    }

    state.backup.delete(&filename).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, DatabaseConfig};
    use crate::models::backup::BackupFormat;
    use crate::routes::create_router;
    use axum::http::Request;
    use std::path::Path;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;
    use tokio_util::task::TaskTracker;
    use tower::ServiceExt;

    fn test_state(tmp: &Path) -> Arc<AppState> {
        let config = AppConfig {
            port: 0,
            log_level: "info".into(),
            database: DatabaseConfig {
                host: "localhost".into(),
                port: 5432,
                user: "radiodb".into(),
                password: "pw".into(),
                dbname: "radiodb".into(),
                schema: None,
            },
            backup_dir: tmp.join("backups"),
            backup_prefix: "radiodb".into(),
            default_format: BackupFormat::Plain,
            default_compression: 0,
            operation_timeout: Duration::from_secs(5),
            retention_days: 0,
            max_backups: 0,
            retention_async: false,
            backup_schedule: None,
            maintenance_schedule: None,
            schedule_timezone: "UTC".into(),
            remote: None,
            pg_dump_bin: "pg_dump".into(),
            pg_restore_bin: "pg_restore".into(),
            vacuumdb_bin: "vacuumdb".into(),
        };
        Arc::new(
            AppState::new(
                config,
                TaskTracker::new(),
                CancellationToken::new(),
                None,
            )
            .unwrap(),
        )
    }

    fn seed_backup(state: &AppState, name: &str, body: &[u8]) {
        std::fs::write(state.backup.dir().root().join(name), body).unwrap();
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn delete_with_mismatched_confirmation_is_rejected_without_touching_files() {
        let tmp = tempfile::tempdir().unwrap();
        let state = test_state(tmp.path());
        seed_backup(&state, "radiodb-2024-06-01-120000.sql", b"x");
        let app = create_router(state.clone());

        let response = app
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/api/backups/radiodb-2024-06-01-120000.sql")
                    .header("x-confirm-delete", "something-else")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(state
            .backup
            .dir()
            .root()
            .join("radiodb-2024-06-01-120000.sql")
            .exists());
    }

    #[tokio::test]
    async fn delete_without_confirmation_header_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let state = test_state(tmp.path());
        seed_backup(&state, "radiodb-2024-06-01-120000.sql", b"x");
        let app = create_router(state.clone());

        let response = app
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/api/backups/radiodb-2024-06-01-120000.sql")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn delete_with_matching_confirmation_removes_the_file() {
        let tmp = tempfile::tempdir().unwrap();
        let state = test_state(tmp.path());
        seed_backup(&state, "radiodb-2024-06-01-120000.sql", b"x");
        let app = create_router(state.clone());

        let response = app
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/api/backups/radiodb-2024-06-01-120000.sql")
                    .header("x-confirm-delete", "radiodb-2024-06-01-120000.sql")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(!state
            .backup
            .dir()
            .root()
            .join("radiodb-2024-06-01-120000.sql")
            .exists());
    }

    #[tokio::test]
    async fn status_reports_idle_before_any_job() {
        let tmp = tempfile::tempdir().unwrap();
        let state = test_state(tmp.path());
        let app = create_router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/backups/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["running"], false);
        assert_eq!(json["success"], false);
    }

    #[tokio::test]
    async fn list_reports_totals_newest_first() {
        let tmp = tempfile::tempdir().unwrap();
        let state = test_state(tmp.path());
        seed_backup(&state, "radiodb-2024-06-01-120000.sql", b"aa");
        std::thread::sleep(Duration::from_millis(20));
        seed_backup(&state, "radiodb-2024-06-02-120000.sql", b"bbbb");
        let app = create_router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/backups")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["totalCount"], 2);
        assert_eq!(json["totalSizeBytes"], 6);
        assert_eq!(
            json["backups"][0]["filename"],
            "radiodb-2024-06-02-120000.sql"
        );
    }

    #[tokio::test]
    async fn download_sets_content_headers() {
        let tmp = tempfile::tempdir().unwrap();
        let state = test_state(tmp.path());
        seed_backup(&state, "radiodb-2024-06-01-120000.sql", b"SELECT 1;");
        let app = create_router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/backups/download/radiodb-2024-06-01-120000.sql")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/sql"
        );
        assert!(response.headers()[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .contains("radiodb-2024-06-01-120000.sql"));
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"SELECT 1;");
    }

    #[tokio::test]
    async fn download_of_unknown_backup_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let state = test_state(tmp.path());
        let app = create_router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/backups/download/radiodb-2024-06-01-120000.sql")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn download_of_unsafe_name_is_a_bad_request() {
        let tmp = tempfile::tempdir().unwrap();
        let state = test_state(tmp.path());
        let app = create_router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/backups/download/radiodb-notes.tar")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
