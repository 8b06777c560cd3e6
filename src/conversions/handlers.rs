use axum::{
    body::Body,
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tokio_util::io::ReaderStream;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    auth::extractors::MaybeUser,
    conversions::{
        dto::{ConvertResponse, ToolInfo},
        repo_types::Conversion,
    },
    convert::{ConversionError, Tool},
    intake::{self, extension_of, IncomingFile, IntakeError},
    state::AppState,
};

type Failure = (StatusCode, Json<ConvertResponse>);

pub fn convert_routes(max_body_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/convert", post(convert))
        .layer(DefaultBodyLimit::max(max_body_bytes))
}

pub fn download_routes() -> Router<AppState> {
    Router::new()
        .route("/download/:name", get(download))
        .route("/tools", get(list_tools))
}

fn fail(status: StatusCode, msg: impl Into<String>) -> Failure {
    (status, Json(ConvertResponse::failed(msg)))
}

fn multipart_failure(e: MultipartError) -> Failure {
    warn!(error = %e, "bad multipart body");
    fail(e.status(), e.body_text())
}

fn conversion_failure(e: ConversionError) -> Failure {
    let status = match &e {
        ConversionError::Validation(_) => StatusCode::BAD_REQUEST,
        ConversionError::Library(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ConversionError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!(error = %e, "conversion failed");
    } else {
        warn!(error = %e, "conversion rejected");
    }
    fail(status, e.to_string())
}

/// Fields of a `/convert` form: every `files` part in order plus the `tool` value.
struct ConvertForm {
    files: Vec<IncomingFile>,
    tool: Option<String>,
}

async fn read_form(multipart: &mut Multipart) -> Result<ConvertForm, Failure> {
    let mut form = ConvertForm {
        files: Vec::new(),
        tool: None,
    };
    while let Some(field) = multipart.next_field().await.map_err(multipart_failure)? {
        let name = field.name().map(|s| s.to_string());
        match name.as_deref() {
            Some("files") => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let body = field.bytes().await.map_err(multipart_failure)?;
                // browsers send one empty unnamed part when nothing was picked
                if file_name.is_empty() {
                    continue;
                }
                form.files.push(IncomingFile { file_name, body });
            }
            Some("tool") => {
                form.tool = Some(field.text().await.map_err(multipart_failure)?);
            }
            _ => {}
        }
    }
    Ok(form)
}

/// POST /convert (multipart: files[], tool)
#[instrument(skip(state, user, multipart), fields(user_id = tracing::field::Empty))]
pub async fn convert(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    mut multipart: Multipart,
) -> Result<Json<ConvertResponse>, Failure> {
    if let Some(user) = &user {
        tracing::Span::current().record("user_id", user.id);
    }

    let form = read_form(&mut multipart).await?;
    if form.files.is_empty() {
        return Err(fail(StatusCode::BAD_REQUEST, IntakeError::NoFiles.to_string()));
    }
    let tool: Tool = form
        .tool
        .as_deref()
        .map(str::trim)
        .unwrap_or_default()
        .parse()
        .map_err(|e| {
            warn!(tool = ?form.tool, "unknown tool requested");
            fail(StatusCode::BAD_REQUEST, format!("{}", e))
        })?;

    let saved = intake::save_files(state.converter.areas(), form.files)
        .await
        .map_err(|e| match &e {
            IntakeError::Io(_) => {
                error!(error = %e, "storing uploads failed");
                fail(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
            _ => fail(StatusCode::BAD_REQUEST, e.to_string()),
        })?;
    let original = saved[0].original.clone();

    let converter = state.converter.clone();
    let result = tokio::task::spawn_blocking(move || converter.convert(tool, &saved))
        .await
        .map_err(|e| {
            error!(error = %e, %tool, "conversion task aborted");
            fail(StatusCode::INTERNAL_SERVER_ERROR, "Conversion failed")
        })?
        .map_err(conversion_failure)?;

    if let Some(user) = &user {
        let entry = Conversion::record(&state.db, user.id, tool.id(), &original, &result.name)
            .await
            .map_err(|e| {
                error!(error = %e, user_id = user.id, "recording history failed");
                fail(StatusCode::INTERNAL_SERVER_ERROR, "Could not record conversion")
            })?;
        debug!(conversion_id = entry.id, "history recorded");
    }

    info!(%tool, output = %result.name, "convert request served");
    Ok(Json(ConvertResponse::done(result.name)))
}

fn content_type(name: &str) -> &'static str {
    match extension_of(name).as_deref() {
        Some("pdf") => "application/pdf",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("docx") => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        Some("xlsx") => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        Some("pptx") => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        Some("txt") => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

/// GET /download/:name
#[instrument(skip(state))]
pub async fn download(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, (StatusCode, String)> {
    let not_found = || (StatusCode::NOT_FOUND, "File not found".to_string());

    let path = state.converter.areas().find_output(&name).ok_or_else(not_found)?;
    let file = tokio::fs::File::open(&path).await.map_err(|e| {
        warn!(error = %e, %name, "output vanished before download");
        not_found()
    })?;

    let headers = [
        (header::CONTENT_TYPE, content_type(&name).to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", name),
        ),
    ];
    Ok((headers, Body::from_stream(ReaderStream::new(file))).into_response())
}

pub async fn list_tools() -> Json<Vec<ToolInfo>> {
    Json(Tool::ALL.into_iter().map(ToolInfo::from).collect())
}
