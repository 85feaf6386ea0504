use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, State},
    http::{HeaderName, HeaderValue, StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use chrono::Local;
use log::{error, info};
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::limit::RequestBodyLimitLayer;

use crate::batch::{FailureSummary, process_batch};
use crate::config::ServerConfig;
use crate::downloader::{Download, prepare_download};
use crate::loader::UploadedFile;
use crate::normalizer::{BracketMode, Normalizer};

/// Response header carrying the number of files that could not be processed.
pub const FAILED_FILES_HEADER: &str = "x-failed-files";

pub struct AppState {
    rule: Normalizer,
}

#[derive(Serialize)]
struct StatusResponse {
    status: String,
    message: Option<String>,
    /// Rule the batch was processed with.
    #[serde(skip_serializing_if = "Option::is_none")]
    mode: Option<BracketMode>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    failures: Vec<FailureSummary>,
}

impl StatusResponse {
    fn error(message: impl Into<String>) -> Self {
        StatusResponse {
            status: "error".to_string(),
            message: Some(message.into()),
            mode: None,
            failures: Vec::new(),
        }
    }
}

/// Build the router. Each request owns its uploads; nothing is shared
/// between requests apart from the configured rule.
pub fn router(config: &ServerConfig) -> Router {
    let app_state = Arc::new(AppState {
        rule: config.rule.normalizer(),
    });

    Router::new()
        .route("/", get(serve_landing))
        .route("/api/health", get(health))
        .route("/api/process", post(process_upload))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(config.max_upload_bytes()))
        .with_state(app_state)
}

pub async fn run(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let app = router(&config);

    let listener = TcpListener::bind(config.bind).await?;
    info!(
        "Listening on http://{} (mode {}, max upload {} MB)",
        config.bind, config.rule.mode, config.max_upload_mb
    );
    axum::serve(listener, app).await?;

    Ok(())
}

async fn serve_landing() -> Html<&'static str> {
    Html(include_str!("./static/landing.html"))
}

async fn health() -> impl IntoResponse {
    Json(StatusResponse {
        status: "ok".to_string(),
        message: None,
        mode: None,
        failures: Vec::new(),
    })
}

async fn process_upload(State(state): State<Arc<AppState>>, mut multipart: Multipart) -> Response {
    let mut rule = state.rule;
    let mut files = Vec::new();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return (e.status(), Json(StatusResponse::error(e.body_text()))).into_response(),
        };
        let field_name = field.name().map(str::to_string);

        if field_name.as_deref() == Some("mode") {
            let text = match field.text().await {
                Ok(text) => text,
                Err(e) => {
                    return (e.status(), Json(StatusResponse::error(e.body_text()))).into_response();
                }
            };
            match text.parse::<BracketMode>() {
                Ok(mode) => rule = Normalizer::new(mode),
                Err(message) => {
                    return (StatusCode::BAD_REQUEST, Json(StatusResponse::error(message)))
                        .into_response();
                }
            }
            continue;
        }

        let file_name = field.file_name().unwrap_or_default().to_string();
        let data: Bytes = match field.bytes().await {
            Ok(data) => data,
            Err(e) => {
                return (e.status(), Json(StatusResponse::error(e.body_text()))).into_response();
            }
        };
        // browsers send an empty part for an untouched file input
        if file_name.is_empty() && data.is_empty() {
            continue;
        }
        files.push(UploadedFile::new(file_name, data.to_vec()));
    }

    if files.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(StatusResponse::error("No file data received")),
        )
            .into_response();
    }

    info!("Processing {} uploaded file(s)", files.len());
    let report = match tokio::task::spawn_blocking(move || process_batch(&files, &rule)).await {
        Ok(report) => report,
        Err(e) => {
            error!("batch worker failed: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(StatusResponse::error("Processing failed")),
            )
                .into_response();
        }
    };

    match prepare_download(&report, Local::now()) {
        Ok(Some(download)) => download_response(download, report.failed().count()),
        Ok(None) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(StatusResponse {
                status: "error".to_string(),
                message: Some("None of the uploaded files could be processed".to_string()),
                mode: Some(rule.mode()),
                failures: report.failure_summaries(),
            }),
        )
            .into_response(),
        Err(e) => {
            error!("failed to package results: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(StatusResponse::error(format!("Failed to package results: {}", e))),
            )
                .into_response()
        }
    }
}

fn download_response(download: Download, failed: usize) -> Response {
    (
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static(download.content_type),
            ),
            (
                header::CONTENT_DISPOSITION,
                content_disposition(&download.file_name),
            ),
            (
                HeaderName::from_static(FAILED_FILES_HEADER),
                HeaderValue::from(failed),
            ),
        ],
        download.bytes,
    )
        .into_response()
}

/// `attachment` disposition with an ASCII fallback name and the exact
/// UTF-8 name in `filename*`.
fn content_disposition(file_name: &str) -> HeaderValue {
    let fallback: String = file_name
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let value = format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        urlencoding::encode(file_name)
    );
    HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}
