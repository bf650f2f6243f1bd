use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::{header, HeaderValue, Method},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use std::sync::Arc;
use crate::{
    AppState,
    error::AppError,
    models::BatchReport,
    services::{
        excel::{Upload, XLSX_MIME_TYPE},
        file_processor,
        grammar::GrammarChecker,
    },
};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use tower_http::cors::{CorsLayer, Any};

/// Most uploads a single request body is sized for. Each file is still held
/// to the per-file limit on its own.
pub const MAX_FILES_PER_REQUEST: usize = 20;

/// RFC 5987 `attr-char`: everything else in an extended parameter is escaped.
const ATTR_CHAR: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'!')
    .remove(b'#')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b'-')
    .remove(b'.')
    .remove(b'^')
    .remove(b'_')
    .remove(b'`')
    .remove(b'|')
    .remove(b'~');

pub fn routes<G>(max_file_size: usize) -> Router<Arc<AppState<G>>>
where
    G: GrammarChecker + 'static,
{
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .expose_headers([header::CONTENT_DISPOSITION])
        .max_age(std::time::Duration::from_secs(3600));

    Router::new()
        .route("/sheets/correct", post(correct_sheets::<G>))
        .route("/sheets/correct/download", post(download_corrected_sheet::<G>))
        .layer(DefaultBodyLimit::max(max_file_size.saturating_mul(MAX_FILES_PER_REQUEST)))
        .layer(cors)
}

async fn read_uploads(mut multipart: Multipart) -> Result<Vec<Upload>, AppError> {
    let mut uploads = Vec::new();
    while let Some(field) = multipart.next_field().await? {
        let file_name = match field.file_name() {
            Some(name) => name.to_string(),
            None => {
                tracing::debug!("Ignoring non-file form field {:?}", field.name());
                continue;
            }
        };
        let data = field.bytes().await?;
        tracing::info!("Received {}, size: {}KB", file_name, data.len() / 1024);
        uploads.push(Upload::new(file_name, data));
    }
    Ok(uploads)
}

async fn correct_sheets<G: GrammarChecker + 'static>(
    State(state): State<Arc<AppState<G>>>,
    multipart: Multipart,
) -> Result<Json<BatchReport>, AppError> {
    let uploads = read_uploads(multipart).await?;
    if uploads.is_empty() {
        return Err(AppError::InvalidInput("No file provided".to_string()));
    }

    let report = file_processor::process_batch(&state.corrector, uploads, state.config.max_file_size).await;
    Ok(Json(report))
}

async fn download_corrected_sheet<G: GrammarChecker + 'static>(
    State(state): State<Arc<AppState<G>>>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut uploads = read_uploads(multipart).await?;
    if uploads.len() != 1 {
        return Err(AppError::InvalidInput(format!(
            "Expected exactly one file, got {}",
            uploads.len()
        )));
    }
    let upload = uploads.remove(0);

    let corrected = file_processor::process_upload(&state.corrector, &upload, state.config.max_file_size).await?;
    let disposition = content_disposition(&corrected.file_name)?;

    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(XLSX_MIME_TYPE)),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        corrected.data,
    ))
}

/// Attachment header with an ASCII fallback name and the exact UTF-8 name.
fn content_disposition(file_name: &str) -> Result<HeaderValue, AppError> {
    HeaderValue::from_str(&format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        header_safe_file_name(file_name),
        utf8_percent_encode(file_name, ATTR_CHAR)
    ))
    .map_err(|e| AppError::HttpError(format!("Invalid file name header: {}", e)))
}

fn header_safe_file_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect()
}
