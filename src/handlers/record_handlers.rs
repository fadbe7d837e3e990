//! JSON API over the record service.
//!
//! Every response that touched a backend reports endpoints in the body
//! (`dbSource`, `writeDb`) and as `X-Db-Source` / `X-Write-Db` headers.
//! `dbSource` is the endpoint that answered this request's read; `writeDb` is
//! the endpoint of this request's write, or on reads the configured write
//! target. Nothing is taken from shared per-request state.

use crate::{
    errors::AppError,
    models::{Record, RecordView},
    services::record_service::{DEFAULT_PAGE_LIMIT, NewUpload, RECENT_LIMIT},
    state::AppState,
};
use axum::{
    Json,
    extract::{Multipart, Path, Query, State},
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use tokio::net::UdpSocket;

pub const X_SERVER_NUMBER: HeaderName = HeaderName::from_static("x-server-number");
pub const X_DB_SOURCE: HeaderName = HeaderName::from_static("x-db-source");
pub const X_WRITE_DB: HeaderName = HeaderName::from_static("x-write-db");

/// Diagnostic metadata attached to record responses.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMeta {
    pub server_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write_db: Option<String>,
}

impl ResponseMeta {
    fn read(state: &AppState, descriptor: String) -> Self {
        Self {
            server_number: state.server_number.to_string(),
            db_source: Some(descriptor),
            write_db: Some(state.records.backend().write_target().to_string()),
        }
    }

    /// `read` is the descriptor of a lookup done as part of the write, if any.
    fn write(state: &AppState, descriptor: String, read: Option<String>) -> Self {
        Self {
            server_number: state.server_number.to_string(),
            db_source: read,
            write_db: Some(descriptor),
        }
    }
}

#[derive(Serialize)]
struct Envelope<T> {
    #[serde(flatten)]
    body: T,
    #[serde(flatten)]
    meta: ResponseMeta,
}

/// Serialize `body` with `meta` merged in and mirror the descriptors as headers.
fn respond<T: Serialize>(status: StatusCode, body: T, meta: ResponseMeta) -> Response {
    let db_source = meta.db_source.clone();
    let write_db = meta.write_db.clone();

    let mut response = (status, Json(Envelope { body, meta })).into_response();
    let headers = response.headers_mut();
    for (name, value) in [(X_DB_SOURCE, db_source), (X_WRITE_DB, write_db)] {
        if let Some(value) = value.and_then(|v| HeaderValue::from_str(&v).ok()) {
            headers.insert(name, value);
        }
    }
    response
}

#[derive(Serialize)]
struct LatestBody {
    item: Option<RecordView>,
}

#[derive(Serialize)]
struct ItemsBody {
    items: Vec<RecordView>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PageBody {
    items: Vec<RecordView>,
    total: i64,
    page: u32,
    limit: u32,
    total_pages: i64,
}

#[derive(Serialize)]
struct DeletedBody {
    deleted: bool,
    id: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InfoBody {
    ip: IpAddr,
    port: u16,
    server_number: String,
}

/// Query params accepted by `GET /api/images`. Values that do not parse fall
/// back to the defaults.
#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
}

fn views(records: &[Record]) -> Vec<RecordView> {
    records.iter().map(RecordView::from).collect()
}

fn parse_positive(value: Option<&str>, default: u32) -> u32 {
    value
        .and_then(|v| v.trim().parse::<i64>().ok())
        .map(|v| v.clamp(1, i64::from(u32::MAX)) as u32)
        .unwrap_or(default)
}

fn parse_id(raw: &str) -> Result<i64, AppError> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| AppError::bad_request(format!("invalid record id `{raw}`")))
}

/// `POST /api/upload`: multipart with a `name` field and an `image` file.
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    let mut upload = NewUpload::default();
    while let Some(field) = multipart.next_field().await? {
        let field_name = field.name().map(str::to_owned);
        match field_name.as_deref() {
            Some("name") => upload.name = field.text().await?,
            Some("image") => {
                upload.original_filename = field.file_name().map(str::to_owned);
                upload.content_type = field.content_type().map(str::to_owned);
                upload.payload = Some(field.bytes().await?);
            }
            _ => {}
        }
    }

    let record = state.records.insert(upload).await?;
    let meta = ResponseMeta::write(&state, record.descriptor(), None);
    Ok(respond(
        StatusCode::CREATED,
        RecordView::from(&record.value),
        meta,
    ))
}

/// `GET /api/latest`
pub async fn latest(State(state): State<AppState>) -> Result<Response, AppError> {
    let latest = state.records.latest().await?;
    let meta = ResponseMeta::read(&state, latest.descriptor());
    let body = LatestBody {
        item: latest.value.as_ref().map(RecordView::from),
    };
    Ok(respond(StatusCode::OK, body, meta))
}

/// `GET /api/latest-5`
pub async fn latest_five(State(state): State<AppState>) -> Result<Response, AppError> {
    let recent = state.records.recent(RECENT_LIMIT).await?;
    let meta = ResponseMeta::read(&state, recent.descriptor());
    let body = ItemsBody {
        items: views(&recent.value),
    };
    Ok(respond(StatusCode::OK, body, meta))
}

/// `GET /api/images?page=&limit=`
pub async fn list_images(
    State(state): State<AppState>,
    Query(q): Query<PageQuery>,
) -> Result<Response, AppError> {
    let page = parse_positive(q.page.as_deref(), 1);
    let limit = parse_positive(q.limit.as_deref(), DEFAULT_PAGE_LIMIT);

    let result = state.records.page(page, limit).await?;
    let meta = ResponseMeta::read(&state, result.descriptor());
    let page = result.value;
    let body = PageBody {
        items: views(&page.items),
        total: page.total,
        page: page.page,
        limit: page.limit,
        total_pages: page.total_pages(),
    };
    Ok(respond(StatusCode::OK, body, meta))
}

/// `DELETE /api/images/{id}`: removes the blob, then the row.
pub async fn delete_image(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let id = parse_id(&id)?;
    let deleted = state.records.delete(id).await?;
    if !deleted.value {
        return Err(AppError::not_found(format!("record {id} not found")));
    }
    let meta = ResponseMeta::write(
        &state,
        deleted.descriptor(),
        Some(deleted.lookup.to_string()),
    );
    Ok(respond(StatusCode::OK, DeletedBody { deleted: true, id }, meta))
}

/// `GET /api/info`: LAN address, port and server number of this instance.
pub async fn info(State(state): State<AppState>) -> impl IntoResponse {
    Json(InfoBody {
        ip: local_ip().await,
        port: state.port,
        server_number: state.server_number.to_string(),
    })
}

/// First non-loopback IPv4 address, found by asking the OS which source
/// address it would route from. No packet is sent.
async fn local_ip() -> IpAddr {
    let probe = async {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await.ok()?;
        socket.connect((Ipv4Addr::new(192, 0, 2, 1), 9)).await.ok()?;
        socket.local_addr().ok().map(|addr| addr.ip())
    };
    match probe.await {
        Some(ip) if !ip.is_loopback() && !ip.is_unspecified() => ip,
        _ => IpAddr::V4(Ipv4Addr::LOCALHOST),
    }
}
