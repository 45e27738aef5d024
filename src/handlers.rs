use crate::catalog::Catalog;
use crate::error::{CatalogError, CatalogResult};
use crate::models::{
    Credentials, NewVideo, ProfileChanges, SortOrder, User, UserId, Video, VideoChanges, VideoId,
};
use axum::{
    async_trait,
    extract::{FromRequestParts, Path, Query, State},
    http::{header, request::Parts, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

pub fn router(catalog: Catalog) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/register", post(register_user))
        .route("/login", post(login_user))
        .route("/logout", post(logout_user))
        .route("/videos", get(list_videos).post(create_video))
        .route(
            "/videos/:id",
            get(show_video).put(update_video).delete(delete_video),
        )
        .route("/my/videos", get(my_videos))
        .route("/search", get(search_videos))
        .route("/profile", get(show_profile).put(update_profile))
        .with_state(catalog)
}

/// Caller identity taken from an `Authorization: Bearer <token>` header.
pub struct AuthUser {
    pub user_id: UserId,
    pub token: String,
}

#[async_trait]
impl FromRequestParts<Catalog> for AuthUser {
    type Rejection = CatalogError;

    async fn from_request_parts(parts: &mut Parts, catalog: &Catalog) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(CatalogError::InvalidCredentials)?;
        let token = raw
            .strip_prefix("Bearer ")
            .or_else(|| raw.strip_prefix("bearer "))
            .unwrap_or(raw)
            .trim();

        let user_id = catalog.resolve_session(token).await?;
        Ok(AuthUser {
            user_id,
            token: token.to_string(),
        })
    }
}

#[derive(Serialize)]
pub struct AuthToken {
    token: String,
    user_id: UserId,
}

#[derive(Serialize)]
pub struct VideoResponse {
    #[serde(flatten)]
    video: Video,
    embed_url: String,
}

impl From<Video> for VideoResponse {
    fn from(video: Video) -> Self {
        let embed_url = video.embed_url();
        Self { video, embed_url }
    }
}

#[derive(Deserialize)]
pub struct ListParams {
    order: Option<String>,
}

#[derive(Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    query: String,
}

fn to_responses(videos: Vec<Video>) -> Json<Vec<VideoResponse>> {
    Json(videos.into_iter().map(VideoResponse::from).collect())
}

pub async fn register_user(
    State(catalog): State<Catalog>,
    Json(creds): Json<Credentials>,
) -> CatalogResult<impl IntoResponse> {
    let user_id = catalog.register(&creds).await?;
    let user = catalog.get_user(user_id).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn login_user(
    State(catalog): State<Catalog>,
    Json(creds): Json<Credentials>,
) -> CatalogResult<Json<AuthToken>> {
    let session = catalog.authenticate(&creds).await?;
    Ok(Json(AuthToken {
        token: session.token,
        user_id: session.user_id,
    }))
}

pub async fn logout_user(
    State(catalog): State<Catalog>,
    auth: AuthUser,
) -> CatalogResult<StatusCode> {
    catalog.logout(&auth.token).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_videos(
    State(catalog): State<Catalog>,
    Query(params): Query<ListParams>,
) -> CatalogResult<Json<Vec<VideoResponse>>> {
    let order = SortOrder::from_param(params.order.as_deref());
    Ok(to_responses(catalog.list_videos(order).await?))
}

pub async fn my_videos(
    State(catalog): State<Catalog>,
    auth: AuthUser,
    Query(params): Query<ListParams>,
) -> CatalogResult<Json<Vec<VideoResponse>>> {
    let order = SortOrder::from_param(params.order.as_deref());
    Ok(to_responses(
        catalog.list_videos_by_owner(auth.user_id, order).await?,
    ))
}

pub async fn search_videos(
    State(catalog): State<Catalog>,
    Query(params): Query<SearchParams>,
) -> CatalogResult<Json<Vec<VideoResponse>>> {
    Ok(to_responses(catalog.search(&params.query).await?))
}

pub async fn show_video(
    State(catalog): State<Catalog>,
    _auth: AuthUser,
    Path(id): Path<VideoId>,
) -> CatalogResult<Json<VideoResponse>> {
    Ok(Json(catalog.get_video(id).await?.into()))
}

pub async fn create_video(
    State(catalog): State<Catalog>,
    auth: AuthUser,
    Json(new): Json<NewVideo>,
) -> CatalogResult<impl IntoResponse> {
    let id = catalog.create_video(auth.user_id, &new).await?;
    let video = catalog.get_video(id).await?;
    Ok((StatusCode::CREATED, Json(VideoResponse::from(video))))
}

pub async fn update_video(
    State(catalog): State<Catalog>,
    auth: AuthUser,
    Path(id): Path<VideoId>,
    Json(changes): Json<VideoChanges>,
) -> CatalogResult<Json<VideoResponse>> {
    let video = catalog.update_video(id, auth.user_id, &changes).await?;
    Ok(Json(video.into()))
}

pub async fn delete_video(
    State(catalog): State<Catalog>,
    auth: AuthUser,
    Path(id): Path<VideoId>,
) -> CatalogResult<StatusCode> {
    catalog.delete_video(id, auth.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn show_profile(
    State(catalog): State<Catalog>,
    auth: AuthUser,
) -> CatalogResult<Json<User>> {
    Ok(Json(catalog.get_user(auth.user_id).await?))
}

pub async fn update_profile(
    State(catalog): State<Catalog>,
    auth: AuthUser,
    Json(changes): Json<ProfileChanges>,
) -> CatalogResult<Json<User>> {
    Ok(Json(catalog.update_profile(auth.user_id, &changes).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use axum::body::Body;
    use axum::http::{Method, Request};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app() -> Router {
        router(Catalog::new(db::in_memory().unwrap(), 4))
    }

    async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let req = match body {
            Some(body) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };

        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    async fn signup(app: &Router, username: &str) -> String {
        let creds = json!({ "username": username, "password": "pw" });
        let (status, _) = send(app, Method::POST, "/register", None, Some(creds.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, body) = send(app, Method::POST, "/login", None, Some(creds)).await;
        assert_eq!(status, StatusCode::OK);
        body["token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn register_twice_conflicts() {
        let app = app();
        signup(&app, "ana").await;
        let (status, body) = send(
            &app,
            Method::POST,
            "/register",
            None,
            Some(json!({ "username": "ana", "password": "other" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "username already taken");
    }

    #[tokio::test]
    async fn bad_login_is_unauthorized() {
        let app = app();
        signup(&app, "ana").await;
        let (status, _) = send(
            &app,
            Method::POST,
            "/login",
            None,
            Some(json!({ "username": "ana", "password": "nope" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn upload_requires_session() {
        let app = app();
        let video = json!({ "title": "Intro", "url": "https://youtu.be/xyz789" });
        let (status, _) = send(&app, Method::POST, "/videos", None, Some(video.clone())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = send(&app, Method::POST, "/videos", Some("bogus"), Some(video)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn video_lifecycle_over_http() {
        let app = app();
        let ana = signup(&app, "ana").await;
        let bob = signup(&app, "bob").await;

        let (status, created) = send(
            &app,
            Method::POST,
            "/videos",
            Some(ana.as_str()),
            Some(json!({
                "title": "Intro",
                "description": "welcome",
                "url": "https://youtube.com/watch?v=abc123&t=5s"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["video_id"], "abc123");
        assert_eq!(created["embed_url"], "https://www.youtube.com/embed/abc123");
        let id = created["id"].as_i64().unwrap();

        let (status, list) = send(&app, Method::GET, "/videos?order=asc", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list.as_array().unwrap().len(), 1);

        let (status, hits) = send(&app, Method::GET, "/search?query=WELCOME", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(hits[0]["id"], id);

        let (status, hits) = send(&app, Method::GET, "/search", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(hits.as_array().unwrap().is_empty());

        let uri = format!("/videos/{id}");
        let (status, body) = send(&app, Method::DELETE, &uri, Some(bob.as_str()), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not found");

        let (status, updated) = send(
            &app,
            Method::PUT,
            &uri,
            Some(ana.as_str()),
            Some(json!({ "title": "Intro v2", "url": "https://youtu.be/xyz789" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["video_id"], "xyz789");

        let (status, _) = send(&app, Method::DELETE, &uri, Some(ana.as_str()), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, Method::GET, &uri, Some(ana.as_str()), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn invalid_url_is_bad_request() {
        let app = app();
        let ana = signup(&app, "ana").await;
        let (status, body) = send(
            &app,
            Method::POST,
            "/videos",
            Some(ana.as_str()),
            Some(json!({ "title": "Elsewhere", "url": "https://example.com/video" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid YouTube URL");

        let (_, list) = send(&app, Method::GET, "/my/videos", Some(ana.as_str()), None).await;
        assert!(list.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn profile_roundtrip_and_logout() {
        let app = app();
        let ana = signup(&app, "ana").await;

        let (status, user) = send(
            &app,
            Method::PUT,
            "/profile",
            Some(ana.as_str()),
            Some(json!({ "username": "ana", "description": "hello", "profile_picture": "/uploads/ana.jpg" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(user["description"], "hello");
        assert!(user.get("password_hash").is_none());

        let (status, _) = send(&app, Method::POST, "/logout", Some(ana.as_str()), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, Method::GET, "/profile", Some(ana.as_str()), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
