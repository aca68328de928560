use std::{path::Path as FsPath, time::Duration};

use axum::extract::{Json, Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::{DateTime, NaiveDateTime, Utc};
use diesel::{prelude::*, PgConnection};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::critique::{request_critique, CritiqueOutcome};
use crate::error::{AppError, AppResult};
use crate::jobs::{enqueue_job, JOB_ANALYZE_DOCUMENT};
use crate::models::{Document, NewDocument};
use crate::schema::documents;
use crate::state::AppState;
use crate::workers::analyze::{ANALYZE_COMPLETED, ANALYZE_PENDING};

pub const ALLOWED_EXTENSIONS: &[&str] = &["pdf", "doc", "docx", "txt"];

#[derive(Serialize)]
pub struct DocumentResponse {
    pub id: Uuid,
    pub title: String,
    pub file_name: String,
    pub file_type: String,
    pub file_size: i64,
    pub checksum: String,
    pub analyze_status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analyze_results: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analyze_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct DocumentDownloadResponse {
    pub url: String,
    pub expires_in: u64,
    pub file_name: String,
    pub file_type: String,
}

#[derive(Deserialize)]
pub struct UpdateDocumentRequest {
    pub title: Option<String>,
}

#[derive(Deserialize)]
pub struct CritiqueRequest {
    pub document_id: Uuid,
    #[serde(default)]
    pub force: bool,
}

pub(crate) fn to_utc(value: NaiveDateTime) -> DateTime<Utc> {
    DateTime::from_naive_utc_and_offset(value, Utc)
}

/// Extraction output is only exposed once analysis completed.
fn to_document_response(doc: Document) -> DocumentResponse {
    let analyze_results = if doc.analyze_status == ANALYZE_COMPLETED {
        doc.analyze_results
    } else {
        None
    };

    DocumentResponse {
        id: doc.id,
        title: doc.title,
        file_name: doc.file_name,
        file_type: doc.file_type,
        file_size: doc.file_size,
        checksum: doc.checksum,
        analyze_status: doc.analyze_status,
        analyze_results,
        analyze_error: doc.analyze_error,
        created_at: to_utc(doc.created_at),
        updated_at: to_utc(doc.updated_at),
    }
}

fn inline_content_disposition(filename: &str) -> Option<String> {
    if filename.is_empty() {
        return None;
    }

    let sanitized: String = filename
        .chars()
        .map(|ch| match ch {
            '"' | '\\' => '_',
            _ => ch,
        })
        .collect();

    let encoded =
        percent_encoding::utf8_percent_encode(&sanitized, percent_encoding::NON_ALPHANUMERIC);
    Some(format!(
        "inline; filename=\"{sanitized}\"; filename*=UTF-8''{encoded}"
    ))
}

fn file_extension(file_name: &str) -> Option<String> {
    FsPath::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

fn default_title(file_name: &str) -> String {
    FsPath::new(file_name)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.trim().is_empty())
        .unwrap_or(file_name)
        .to_string()
}

pub(crate) fn load_owned_document(
    conn: &mut PgConnection,
    document_id: Uuid,
    owner_id: Uuid,
) -> AppResult<Document> {
    Ok(documents::table
        .filter(documents::id.eq(document_id))
        .filter(documents::owner_id.eq(owner_id))
        .first(conn)?)
}

/// Queues analysis. Callers run this in the transaction that set the document
/// pending, so a document is never pending without a job.
fn schedule_analysis(conn: &mut PgConnection, document_id: Uuid) -> AppResult<()> {
    let job = enqueue_job(
        conn,
        JOB_ANALYZE_DOCUMENT,
        json!({ "document_id": document_id }),
        None,
    )?;
    info!(%document_id, job_id = %job.id, "analysis queued");
    Ok(())
}

pub async fn list_documents(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<DocumentResponse>>> {
    let mut conn = state.db()?;
    let rows: Vec<Document> = documents::table
        .filter(documents::owner_id.eq(user.user_id))
        .order(documents::created_at.desc())
        .load(&mut conn)?;

    Ok(Json(rows.into_iter().map(to_document_response).collect()))
}

pub async fn get_document(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<Json<DocumentResponse>> {
    let mut conn = state.db()?;
    let doc = load_owned_document(&mut conn, document_id, user.user_id)?;
    Ok(Json(to_document_response(doc)))
}

pub async fn upload_document(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<DocumentResponse>)> {
    let mut file_bytes: Option<Vec<u8>> = None;
    let mut file_name: Option<String> = None;
    let mut content_type: Option<String> = None;
    let mut title: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(|err| {
        warn!(error = %err, "invalid multipart data");
        AppError::bad_request(format!("invalid multipart data: {err}"))
    })? {
        match field.name() {
            Some("file") => {
                file_name = field.file_name().map(|name| name.to_string());
                content_type = field.content_type().map(|mime| mime.to_string());
                let data = field.bytes().await.map_err(|err| {
                    warn!(error = %err, "failed to read file bytes");
                    AppError::bad_request(format!("failed to read file bytes: {err}"))
                })?;
                file_bytes = Some(data.to_vec());
            }
            Some("title") => {
                let value = field
                    .text()
                    .await
                    .map_err(|err| AppError::bad_request(format!("invalid title: {err}")))?;
                let trimmed = value.trim();
                if !trimmed.is_empty() {
                    title = Some(trimmed.to_string());
                }
            }
            _ => {}
        }
    }

    let bytes = file_bytes.ok_or_else(|| AppError::bad_request("file field is required"))?;
    if bytes.is_empty() {
        return Err(AppError::bad_request("file field must not be empty"));
    }
    let file_name = file_name
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| AppError::bad_request("filename is required"))?;

    let extension = file_extension(&file_name).unwrap_or_default();
    if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(AppError::bad_request(format!(
            "unsupported file type; allowed: {}",
            ALLOWED_EXTENSIONS.join(", ")
        )));
    }

    let file_type = content_type
        .filter(|value| value != "application/octet-stream")
        .unwrap_or_else(|| {
            mime_guess::from_path(&file_name)
                .first_or_octet_stream()
                .essence_str()
                .to_string()
        });

    let document_id = Uuid::new_v4();
    let file_key = format!("documents/{}/{document_id}", user.user_id);
    let checksum = hex::encode(Sha256::digest(&bytes));
    let file_size = bytes.len() as i64;

    state
        .storage
        .put_object(
            &file_key,
            bytes,
            Some(file_type.clone()),
            inline_content_disposition(&file_name),
        )
        .await
        .map_err(|err| AppError::internal(format!("failed to store upload: {err:#}")))?;

    let new_document = NewDocument {
        id: document_id,
        owner_id: user.user_id,
        title: title.unwrap_or_else(|| default_title(&file_name)),
        file_name,
        file_key: file_key.clone(),
        file_type,
        file_size,
        checksum,
        analyze_status: ANALYZE_PENDING.to_string(),
    };

    let inserted = state.db().and_then(|mut conn| {
        conn.transaction::<_, AppError, _>(|conn| {
            let document = diesel::insert_into(documents::table)
                .values(&new_document)
                .get_result::<Document>(conn)?;
            schedule_analysis(conn, document.id)?;
            Ok(document)
        })
    });

    let document = match inserted {
        Ok(document) => document,
        Err(err) => {
            error!(%document_id, status = %err.status(), "failed to record upload");
            if let Err(cleanup_err) = state.storage.delete_object(&file_key).await {
                warn!(%document_id, error = %cleanup_err, "failed to remove orphaned upload");
            }
            return Err(err);
        }
    };

    info!(
        %document_id,
        owner_id = %user.user_id,
        file_name = %document.file_name,
        file_size,
        "document uploaded"
    );

    Ok((StatusCode::CREATED, Json(to_document_response(document))))
}

pub async fn update_document(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    user: AuthenticatedUser,
    Json(payload): Json<UpdateDocumentRequest>,
) -> AppResult<Json<DocumentResponse>> {
    let title = payload
        .title
        .as_deref()
        .map(str::trim)
        .ok_or_else(|| AppError::bad_request("no changes provided"))?;
    if title.is_empty() {
        return Err(AppError::bad_request("title must not be empty"));
    }

    let mut conn = state.db()?;
    load_owned_document(&mut conn, document_id, user.user_id)?;

    let document: Document = diesel::update(documents::table.find(document_id))
        .set((
            documents::title.eq(title),
            documents::updated_at.eq(Utc::now().naive_utc()),
        ))
        .get_result(&mut conn)?;

    Ok(Json(to_document_response(document)))
}

pub async fn delete_document(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<impl IntoResponse> {
    let document = {
        let mut conn = state.db()?;
        load_owned_document(&mut conn, document_id, user.user_id)?
    };

    if let Err(err) = state.storage.delete_object(&document.file_key).await {
        warn!(%document_id, file_key = %document.file_key, error = %err, "failed to delete stored file; removing record anyway");
    }

    let mut conn = state.db()?;
    diesel::delete(documents::table.find(document_id)).execute(&mut conn)?;
    info!(%document_id, "document deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn download_document(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<Json<DocumentDownloadResponse>> {
    let document = {
        let mut conn = state.db()?;
        load_owned_document(&mut conn, document_id, user.user_id)?
    };

    let expires_in = state.config.signed_url_ttl_minutes * 60;
    let url = state
        .storage
        .presign_get_object(&document.file_key, Duration::from_secs(expires_in))
        .await
        .map_err(|err| AppError::internal(format!("failed to generate download URL: {err:#}")))?;

    Ok(Json(DocumentDownloadResponse {
        url,
        expires_in,
        file_name: document.file_name,
        file_type: document.file_type,
    }))
}

pub async fn reanalyze_document(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<(StatusCode, Json<DocumentResponse>)> {
    let mut conn = state.db()?;
    load_owned_document(&mut conn, document_id, user.user_id)?;

    let document = conn.transaction::<_, AppError, _>(|conn| {
        let document: Document = diesel::update(documents::table.find(document_id))
            .set((
                documents::analyze_status.eq(ANALYZE_PENDING),
                documents::analyze_results.eq::<Option<Value>>(None),
                documents::analyze_error.eq::<Option<String>>(None),
                documents::updated_at.eq(Utc::now().naive_utc()),
            ))
            .get_result(conn)?;
        schedule_analysis(conn, document_id)?;
        Ok(document)
    })?;
    Ok((StatusCode::ACCEPTED, Json(to_document_response(document))))
}

pub async fn critique_document(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CritiqueRequest>,
) -> AppResult<Json<CritiqueOutcome>> {
    let outcome = request_critique(&state, payload.document_id, user.user_id, payload.force).await?;
    Ok(Json(outcome))
}
