//! HTTP surface for locshare.
//!
//! Every API route lives under `/api`. Handlers return
//! [`crate::Result`], so every failure leaves as a `{success: false, error}`
//! body with the status from [`Error::status_code`]. Extractor rejections,
//! unknown routes and unsupported methods are turned into the same body. CORS is permissive
//! everywhere: the sharing page may be opened from any origin, including a
//! local file with no origin at all.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::{BytesRejection, PathRejection};
use axum::extract::{Path, State};
use axum::handler::HandlerWithoutStateExt;
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE, HOST};
use axum::http::{HeaderMap, HeaderValue, Method};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::artifact::{self, Artifact, ArtifactRequest, ImageSource};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::ingest::{Ingestor, LocationReport};
use crate::lifecycle::{LinkService, LinkSummary, RequestOrigin};
use crate::link::{LinkId, LocationSample, TrackingLink};
use crate::storage::MemoryStore;

/// Application state available to all handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    links: LinkService,
    ingestor: Ingestor,
    config: Arc<Config>,
}

impl AppState {
    /// Build the state around a fresh in-memory store.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let store = Arc::new(MemoryStore::new(config.history.capacity));
        Self {
            links: LinkService::new(store.clone(), store.clone(), &config),
            ingestor: Ingestor::new(store.clone(), store),
            config: Arc::new(config),
        }
    }
}

/// Protocol and host of the request, as seen through any proxy in front of us.
fn request_origin(headers: &HeaderMap, port: u16) -> RequestOrigin {
    let first = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };
    let scheme = first("x-forwarded-proto").unwrap_or_else(|| "http".to_string());
    let host = first(HOST.as_str()).unwrap_or_else(|| format!("localhost:{port}"));
    RequestOrigin::new(scheme, host)
}

type PathParam = std::result::Result<Path<String>, PathRejection>;
type BodyBytes = std::result::Result<Bytes, BytesRejection>;

/// True when the request body is `application/x-www-form-urlencoded`.
fn is_form(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/x-www-form-urlencoded"))
}

fn malformed(e: impl std::fmt::Display) -> Error {
    Error::validation(format!("Malformed request body: {e}"))
}

fn parse_path_id(raw: &str) -> Result<LinkId> {
    LinkId::parse(raw).ok_or_else(|| Error::not_found("Link not found"))
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                          Link lifecycle                                        //
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    #[serde(alias = "userId")]
    owner_tag: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    success: bool,
    link_id: LinkId,
    shareable_link: String,
    media_file_url: String,
    download_url: String,
    created_at: DateTime<Utc>,
}

async fn generate(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: BodyBytes,
) -> Result<Json<GenerateResponse>> {
    let body = body?;
    let request: GenerateRequest = if body.iter().all(u8::is_ascii_whitespace) {
        GenerateRequest::default()
    } else if is_form(&headers) {
        serde_urlencoded::from_bytes(&body).map_err(malformed)?
    } else {
        serde_json::from_slice(&body)?
    };
    let origin = request_origin(&headers, state.config.server.port);
    let created = state.links.create(request.owner_tag.as_deref(), &origin)?;

    Ok(Json(GenerateResponse {
        success: true,
        link_id: created.link.link_id,
        shareable_link: created.shareable_link,
        media_file_url: created.media_url,
        download_url: created.download_url,
        created_at: created.link.created_at,
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LinkInfoResponse {
    success: bool,
    link: TrackingLink,
    location_count: usize,
}

async fn link_info(
    State(state): State<AppState>,
    path: PathParam,
) -> Result<Json<LinkInfoResponse>> {
    let Path(raw) = path?;
    let summary = state.links.summary(&parse_path_id(&raw)?)?;
    Ok(Json(LinkInfoResponse {
        success: true,
        link: summary.link,
        location_count: summary.location_count,
    }))
}

#[derive(Debug, Serialize)]
struct MessageResponse {
    success: bool,
    message: &'static str,
}

async fn deactivate(
    State(state): State<AppState>,
    path: PathParam,
) -> Result<Json<MessageResponse>> {
    let Path(raw) = path?;
    state.links.deactivate(&parse_path_id(&raw)?)?;
    Ok(Json(MessageResponse {
        success: true,
        message: "Link deactivated successfully",
    }))
}

#[derive(Debug, Serialize)]
struct UserLinksResponse {
    success: bool,
    links: Vec<LinkSummary>,
}

async fn user_links(
    State(state): State<AppState>,
    path: PathParam,
) -> Result<Json<UserLinksResponse>> {
    let Path(owner) = path?;
    Ok(Json(UserLinksResponse {
        success: true,
        links: state.links.list_by_owner(&owner)?,
    }))
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                          Sharing pages                                         //
////////////////////////////////////////////////////////////////////////////////////////////////////

fn artifact_response(artifact: Artifact) -> Result<Response> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(artifact.content_type));
    if let Some(disposition) = artifact.content_disposition {
        let value = HeaderValue::from_str(&disposition)
            .map_err(|e| Error::internal(format!("bad Content-Disposition: {e}")))?;
        headers.insert(CONTENT_DISPOSITION, value);
    }
    Ok((headers, artifact.body).into_response())
}

async fn media(
    State(state): State<AppState>,
    headers: HeaderMap,
    path: PathParam,
) -> Result<Response> {
    let Path(raw) = path?;
    let link = state.links.get(&parse_path_id(&raw)?)?;
    let origin = request_origin(&headers, state.config.server.port);
    artifact_response(artifact::render(&ArtifactRequest {
        link_id: link.link_id,
        api_base: state.links.api_base(&origin),
        image: ImageSource::Url(state.config.image_url()),
        attachment: false,
    }))
}

async fn download(
    State(state): State<AppState>,
    headers: HeaderMap,
    path: PathParam,
) -> Result<Response> {
    let Path(raw) = path?;
    if raw.trim().is_empty() {
        return Err(Error::validation("Link ID is required"));
    }
    let link = state.links.get(&parse_path_id(&raw)?)?;
    let origin = request_origin(&headers, state.config.server.port);

    let asset = state.config.asset_path();
    let limit = state.config.artifact.inline_limit;
    let bytes = match tokio::fs::metadata(&asset).await {
        Ok(meta) if ImageSource::fits_inline(meta.len(), limit) => {
            match tokio::fs::read(&asset).await {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    debug!("Not inlining {}: {e}", asset.display());
                    None
                }
            }
        }
        Ok(meta) => {
            debug!("Not inlining {}: {} bytes is over the limit", asset.display(), meta.len());
            None
        }
        Err(e) => {
            debug!("Not inlining {}: {e}", asset.display());
            None
        }
    };
    let image = ImageSource::inline_or_url(
        bytes.as_deref(),
        &state.config.artifact.asset_mime,
        limit,
        state.config.image_url(),
    );

    artifact_response(artifact::render(&ArtifactRequest {
        link_id: link.link_id,
        api_base: state.links.api_base(&origin),
        image,
        attachment: true,
    }))
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                            Locations                                           //
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Serialize)]
struct UpdateResponse {
    success: bool,
    message: &'static str,
    timestamp: DateTime<Utc>,
    count: usize,
}

async fn update_location(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: BodyBytes,
) -> Result<Json<UpdateResponse>> {
    let body = body?;
    let report = if is_form(&headers) {
        LocationReport::from_form(&body)?
    } else {
        LocationReport::from_slice(&body)?
    };
    let receipt = state.ingestor.ingest(&report)?;
    Ok(Json(UpdateResponse {
        success: true,
        message: "Location updated successfully",
        timestamp: receipt.sample.timestamp,
        count: receipt.count,
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HistoryResponse {
    success: bool,
    link_id: String,
    locations: Vec<LocationSample>,
    count: usize,
    latest: Option<LocationSample>,
}

async fn location_history(
    State(state): State<AppState>,
    path: PathParam,
) -> Result<Json<HistoryResponse>> {
    let Path(raw) = path?;
    let id = LinkId::parse(&raw);
    let history = state.links.history(id.as_ref())?;
    Ok(Json(HistoryResponse {
        success: true,
        link_id: raw,
        count: history.count(),
        latest: history.latest,
        locations: history.locations,
    }))
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                           Public API                                           //
////////////////////////////////////////////////////////////////////////////////////////////////////

async fn not_found() -> Error {
    Error::not_found("Not found")
}

async fn method_not_allowed(method: Method) -> Error {
    Error::method_not_allowed(&method)
}

/// Return the full service router.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/links/generate", post(generate))
        .route("/links/user/:user_id", get(user_links))
        .route("/links/:link_id", get(link_info))
        .route("/links/:link_id/deactivate", post(deactivate))
        .route("/media/:link_id", get(media))
        .route("/download/:link_id", get(download))
        .route("/location/update", post(update_location))
        .route("/location/:link_id", get(location_history))
        .method_not_allowed_fallback(method_not_allowed);

    let images = ServeDir::new(&state.config.artifact.asset_dir)
        .not_found_service(not_found.into_service());

    Router::new()
        .nest("/api", api)
        .nest_service("/images", images)
        .fallback(not_found)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;

    fn app_with(config: Config) -> Router {
        router(AppState::new(config))
    }

    fn app() -> Router {
        app_with(Config::default())
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, HeaderMap, Bytes) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, headers, body)
    }

    async fn send_json(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(HOST, "api.test:3001");
        let body = match body {
            Some(value) => {
                builder = builder.header(CONTENT_TYPE, "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };
        let (status, _, bytes) = send(app, builder.body(body).unwrap()).await;
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn send_body(
        app: &Router,
        uri: &str,
        content_type: &str,
        body: impl Into<Body>,
    ) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(HOST, "api.test:3001")
            .header(CONTENT_TYPE, content_type)
            .body(body.into())
            .unwrap();
        let (status, _, bytes) = send(app, request).await;
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn generate_link(app: &Router, owner: Option<&str>) -> String {
        let body = owner.map(|o| json!({ "ownerTag": o }));
        let (status, json) = send_json(app, Method::POST, "/api/links/generate", body).await;
        assert_eq!(status, StatusCode::OK);
        json["linkId"].as_str().unwrap().to_string()
    }

    async fn ingest(app: &Router, body: Value) -> (StatusCode, Value) {
        send_json(app, Method::POST, "/api/location/update", Some(body)).await
    }

    async fn get_page(app: &Router, uri: &str) -> (StatusCode, HeaderMap, String) {
        let request = Request::builder()
            .uri(uri)
            .header(HOST, "api.test:3001")
            .body(Body::empty())
            .unwrap();
        let (status, headers, body) = send(app, request).await;
        (status, headers, String::from_utf8(body.to_vec()).unwrap())
    }

    #[test]
    fn test_request_origin() {
        let mut headers = HeaderMap::new();
        assert_eq!(request_origin(&headers, 3001).base(), "http://localhost:3001");

        headers.insert(HOST, HeaderValue::from_static("api.example.com"));
        headers.insert("x-forwarded-proto", HeaderValue::from_static("https, http"));
        assert_eq!(request_origin(&headers, 3001).base(), "https://api.example.com");
    }

    #[tokio::test]
    async fn test_generate_returns_urls() {
        let app = app();
        let (status, json) = send_json(&app, Method::POST, "/api/links/generate", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], true);

        let id = json["linkId"].as_str().unwrap();
        assert_eq!(json["shareableLink"], format!("http://localhost:3000/track/{id}"));
        assert_eq!(json["mediaFileUrl"], format!("http://api.test:3001/api/media/{id}"));
        assert_eq!(json["downloadUrl"], format!("http://api.test:3001/api/download/{id}"));
        assert!(json["createdAt"].is_string());
    }

    #[tokio::test]
    async fn test_generate_accepts_user_id_alias() {
        let app = app();
        let (_, json) = send_json(
            &app,
            Method::POST,
            "/api/links/generate",
            Some(json!({ "userId": "alice" })),
        )
        .await;
        let id = json["linkId"].as_str().unwrap();
        let (_, info) = send_json(&app, Method::GET, &format!("/api/links/{id}"), None).await;
        assert_eq!(info["link"]["ownerTag"], "alice");
    }

    #[tokio::test]
    async fn test_link_info() {
        let app = app();
        let id = generate_link(&app, None).await;
        let (status, json) = send_json(&app, Method::GET, &format!("/api/links/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["link"]["active"], true);
        assert_eq!(json["link"]["ownerTag"], "anonymous");
        assert_eq!(json["locationCount"], 0);
    }

    #[tokio::test]
    async fn test_link_info_unknown_is_404() {
        let app = app();
        for uri in ["/api/links/unknown-id".to_string(), format!("/api/links/{}", LinkId::generate())] {
            let (status, json) = send_json(&app, Method::GET, &uri, None).await;
            assert_eq!(status, StatusCode::NOT_FOUND);
            assert_eq!(json, json!({ "success": false, "error": "Link not found" }));
        }
    }

    #[tokio::test]
    async fn test_two_reports_in_order() {
        let app = app();
        let id = generate_link(&app, None).await;

        let (status, first) = ingest(
            &app,
            json!({ "linkId": id, "latitude": 40.7128, "longitude": -74.0060, "deviceId": "dev1" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["success"], true);
        assert_eq!(first["count"], 1);
        assert!(first["timestamp"].is_string());

        let (_, second) = ingest(
            &app,
            json!({ "linkId": id, "latitude": 40.71, "longitude": -74.00, "deviceId": "dev1" }),
        )
        .await;
        assert_eq!(second["count"], 2);

        let (status, history) =
            send_json(&app, Method::GET, &format!("/api/location/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(history["count"], 2);
        assert_eq!(history["linkId"], id);
        let locations = history["locations"].as_array().unwrap();
        assert_eq!(locations[0]["latitude"], 40.7128);
        assert_eq!(locations[1]["latitude"], 40.71);
        assert_eq!(history["latest"], locations[1]);
        assert_eq!(history["latest"]["deviceId"], "dev1");
    }

    #[tokio::test]
    async fn test_history_unknown_is_empty_not_404() {
        let app = app();
        let (status, json) = send_json(&app, Method::GET, "/api/location/unknown-id", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            json,
            json!({
                "success": true,
                "linkId": "unknown-id",
                "locations": [],
                "count": 0,
                "latest": null
            })
        );
    }

    #[tokio::test]
    async fn test_missing_latitude_is_400_and_records_nothing() {
        let app = app();
        let id = generate_link(&app, None).await;
        let (status, json) = ingest(&app, json!({ "linkId": id, "longitude": -74.0 })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "Missing required fields: linkId, latitude, longitude");

        let (_, history) = send_json(&app, Method::GET, &format!("/api/location/{id}"), None).await;
        assert_eq!(history["count"], 0);
    }

    #[tokio::test]
    async fn test_malformed_body_is_structured_400() {
        let app = app();
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/location/update")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from("{oops"))
            .unwrap();
        let (status, _, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["success"], false);
    }

    #[tokio::test]
    async fn test_unknown_link_is_404() {
        let app = app();
        for _ in 0..2 {
            let (status, json) = ingest(
                &app,
                json!({ "linkId": "unknown-id", "latitude": 1.0, "longitude": 2.0 }),
            )
            .await;
            assert_eq!(status, StatusCode::NOT_FOUND);
            assert_eq!(json["error"], "Invalid tracking link");
        }
    }

    #[tokio::test]
    async fn test_deactivated_link_is_403_and_history_unchanged() {
        let app = app();
        let id = generate_link(&app, None).await;
        ingest(&app, json!({ "linkId": id, "latitude": 1.0, "longitude": 2.0 })).await;
        let (_, before) = send_json(&app, Method::GET, &format!("/api/location/{id}"), None).await;

        let (status, json) =
            send_json(&app, Method::POST, &format!("/api/links/{id}/deactivate"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], true);

        for _ in 0..2 {
            let (status, json) =
                ingest(&app, json!({ "linkId": id, "latitude": 3.0, "longitude": 4.0 })).await;
            assert_eq!(status, StatusCode::FORBIDDEN);
            assert_eq!(json["error"], "Tracking link is inactive");
        }

        let (_, after) = send_json(&app, Method::GET, &format!("/api/location/{id}"), None).await;
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_deactivate_is_idempotent_and_unknown_is_404() {
        let app = app();
        let id = generate_link(&app, None).await;
        let uri = format!("/api/links/{id}/deactivate");
        let (first, _) = send_json(&app, Method::POST, &uri, None).await;
        let (second, _) = send_json(&app, Method::POST, &uri, None).await;
        assert_eq!(first, StatusCode::OK);
        assert_eq!(second, StatusCode::OK);

        let (_, info) = send_json(&app, Method::GET, &format!("/api/links/{id}"), None).await;
        assert_eq!(info["link"]["active"], false);

        let (status, _) = send_json(
            &app,
            Method::POST,
            &format!("/api/links/{}/deactivate", LinkId::generate()),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_user_links() {
        let app = app();
        let a = generate_link(&app, Some("alice")).await;
        generate_link(&app, Some("bob")).await;
        ingest(&app, json!({ "linkId": a, "latitude": 1.0, "longitude": 2.0 })).await;

        let (status, json) = send_json(&app, Method::GET, "/api/links/user/alice", None).await;
        assert_eq!(status, StatusCode::OK);
        let links = json["links"].as_array().unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0]["linkId"], a);
        assert_eq!(links[0]["locationCount"], 1);
        assert_eq!(links[0]["latestLocation"]["latitude"], 1.0);

        let (_, empty) = send_json(&app, Method::GET, "/api/links/user/nobody", None).await;
        assert_eq!(empty["links"], json!([]));
    }

    #[tokio::test]
    async fn test_preflight_is_allowed_from_any_origin() {
        let app = app();
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/api/location/update")
            .header("origin", "null")
            .header("access-control-request-method", "POST")
            .header("access-control-request-headers", "content-type")
            .body(Body::empty())
            .unwrap();
        let (status, headers, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert!(headers.contains_key("access-control-allow-origin"));
    }

    #[tokio::test]
    async fn test_ingest_allows_cross_origin() {
        let app = app();
        let id = generate_link(&app, None).await;
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/location/update")
            .header("origin", "https://elsewhere.test")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({ "linkId": id, "latitude": 1, "longitude": 2 }).to_string(),
            ))
            .unwrap();
        let (status, headers, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers["access-control-allow-origin"], "*");
    }

    #[tokio::test]
    async fn test_media_page() {
        let app = app();
        let id = generate_link(&app, None).await;
        let (status, headers, body) = get_page(&app, &format!("/api/media/{id}")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[CONTENT_TYPE], "text/html; charset=utf-8");
        assert!(!headers.contains_key(CONTENT_DISPOSITION));
        assert!(body.contains(&format!("var LINK_ID = \"{id}\";")));
        assert!(body.contains("var API_BASE = \"http://api.test:3001\";"));
        assert!(body.contains("src=\"http://localhost:3000/images/share.webp\""));
    }

    #[tokio::test]
    async fn test_media_page_prefers_backend_override() {
        let mut config = Config::default();
        config.urls.backend_url = Some("https://api.example.com".to_string());
        let app = app_with(config);
        let id = generate_link(&app, None).await;
        let (_, _, body) = get_page(&app, &format!("/api/media/{id}")).await;
        assert!(body.contains("var API_BASE = \"https://api.example.com\";"));
    }

    #[tokio::test]
    async fn test_media_page_is_deterministic() {
        let app = app();
        let id = generate_link(&app, None).await;
        let (_, _, first) = get_page(&app, &format!("/api/media/{id}")).await;
        let (_, _, second) = get_page(&app, &format!("/api/media/{id}")).await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_media_unknown_is_404() {
        let app = app();
        let (status, _, body) = get_page(&app, "/api/media/unknown-id").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let json: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["success"], false);
    }

    #[tokio::test]
    async fn test_download_without_asset_uses_url() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.artifact.asset_dir = dir.path().to_path_buf();
        let app = app_with(config);

        let id = generate_link(&app, None).await;
        let (status, headers, body) = get_page(&app, &format!("/api/download/{id}")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            headers[CONTENT_DISPOSITION],
            format!("attachment; filename=\"location-share-{}.html\"", &id[..8])
        );
        assert!(body.contains("src=\"http://localhost:3000/images/share.webp\""));

        let (_, _, served) = get_page(&app, &format!("/api/media/{id}")).await;
        assert_eq!(body, served);
    }

    #[tokio::test]
    async fn test_download_inlines_small_asset() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("share.webp"), b"abc").unwrap();
        let mut config = Config::default();
        config.artifact.asset_dir = dir.path().to_path_buf();
        let app = app_with(config);

        let id = generate_link(&app, None).await;
        let (_, _, first) = get_page(&app, &format!("/api/download/{id}")).await;
        let (_, _, second) = get_page(&app, &format!("/api/download/{id}")).await;
        assert!(first.contains("src=\"data:image/webp;base64,YWJj\""));
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_download_skips_oversized_asset() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("share.webp"), vec![0_u8; 64]).unwrap();
        let mut config = Config::default();
        config.artifact.asset_dir = dir.path().to_path_buf();
        config.artifact.inline_limit = 16;
        let app = app_with(config);

        let id = generate_link(&app, None).await;
        let (_, _, body) = get_page(&app, &format!("/api/download/{id}")).await;
        assert!(!body.contains("data:image/webp"));
        assert!(body.contains("src=\"http://localhost:3000/images/share.webp\""));
    }

    #[tokio::test]
    async fn test_download_unknown_is_404() {
        let app = app();
        let (status, _, _) = get_page(&app, &format!("/api/download/{}", LinkId::generate())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_images_are_served() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("share.webp"), b"abc").unwrap();
        let mut config = Config::default();
        config.artifact.asset_dir = dir.path().to_path_buf();
        let app = app_with(config);

        let request = Request::builder()
            .uri("/images/share.webp")
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(&body[..], b"abc");
    }

    #[tokio::test]
    async fn test_missing_image_is_structured_404() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.artifact.asset_dir = dir.path().to_path_buf();
        let app = app_with(config);

        let (status, json) = send_json(&app, Method::GET, "/images/missing.webp", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["success"], false);
    }

    #[tokio::test]
    async fn test_invalid_utf8_path_is_structured_400() {
        let app = app();
        for uri in ["/api/location/%FF", "/api/links/%FF", "/api/media/%FF"] {
            let (status, json) = send_json(&app, Method::GET, uri, None).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(json["success"], false);
            assert!(json["error"].as_str().unwrap().contains("UTF-8"));
        }
    }

    #[tokio::test]
    async fn test_unknown_route_is_structured_404() {
        let app = app();
        for uri in ["/api/nope", "/api/links/generate/extra", "/elsewhere"] {
            let (status, json) = send_json(&app, Method::GET, uri, None).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
            assert_eq!(json, json!({ "success": false, "error": "Not found" }));
        }
    }

    #[tokio::test]
    async fn test_wrong_method_is_structured_405() {
        let app = app();
        let uri = format!("/api/links/{}", LinkId::generate());
        let (status, json) = send_json(&app, Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(
            json,
            json!({ "success": false, "error": "Method DELETE not allowed" })
        );
    }

    #[tokio::test]
    async fn test_oversized_body_is_structured_413() {
        let app = app();
        let body = vec![b' '; 3 * 1024 * 1024];
        let (status, json) = send_body(&app, "/api/location/update", "application/json", body).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(json["success"], false);
    }

    #[tokio::test]
    async fn test_form_encoded_report_is_accepted() {
        let app = app();
        let id = generate_link(&app, None).await;

        let (status, json) = send_body(
            &app,
            "/api/location/update",
            "application/x-www-form-urlencoded",
            format!("linkId={id}&latitude=40.7&longitude=-74.0"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["count"], 1);

        let (_, history) = send_json(&app, Method::GET, &format!("/api/location/{id}"), None).await;
        assert_eq!(history["latest"]["latitude"], 40.7);
        assert_eq!(history["latest"]["longitude"], -74.0);
        assert_eq!(history["latest"]["deviceId"], "unknown");
    }

    #[tokio::test]
    async fn test_form_encoded_report_missing_field_is_400() {
        let app = app();
        let id = generate_link(&app, None).await;
        let (status, json) = send_body(
            &app,
            "/api/location/update",
            "application/x-www-form-urlencoded; charset=UTF-8",
            format!("linkId={id}&latitude=40.7"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            json["error"],
            "Missing required fields: linkId, latitude, longitude"
        );
    }

    #[tokio::test]
    async fn test_form_encoded_generate() {
        let app = app();
        let (status, json) = send_body(
            &app,
            "/api/links/generate",
            "application/x-www-form-urlencoded",
            "userId=alice",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let id = json["linkId"].as_str().unwrap();

        let (_, info) = send_json(&app, Method::GET, &format!("/api/links/{id}"), None).await;
        assert_eq!(info["link"]["ownerTag"], "alice");
    }

    #[tokio::test]
    async fn test_capacity_from_config() {
        let mut config = Config::default();
        config.history.capacity = 3;
        let app = app_with(config);
        let id = generate_link(&app, None).await;

        let mut count = Value::Null;
        for n in 0..5 {
            let (_, json) = ingest(
                &app,
                json!({ "linkId": id, "latitude": n, "longitude": 0, "deviceId": format!("d{n}") }),
            )
            .await;
            count = json["count"].clone();
        }
        assert_eq!(count, 3);

        let (_, history) = send_json(&app, Method::GET, &format!("/api/location/{id}"), None).await;
        assert_eq!(history["locations"][0]["deviceId"], "d2");
        assert_eq!(history["latest"]["deviceId"], "d4");
    }
}
