use actix_web::{web, HttpRequest, HttpResponse, Responder};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;

use crate::auth::{can_modify_post, can_modify_profile, AuthService, AuthUser};
use crate::error::{json_error_handler, path_error_handler, query_error_handler, ApiError};
use crate::models::*;
use crate::store::Store;
use crate::validation::{validate_comment, validate_post, validate_profile_update, validate_registration};

pub struct AppState {
    pub store: Arc<Store>,
    pub auth_service: Arc<AuthService>,
}

type ApiResult = Result<HttpResponse, ApiError>;

const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    limit: Option<i64>,
    offset: Option<i64>,
    search: Option<String>,
}

impl ListQuery {
    fn page(&self) -> (i64, i64) {
        let limit = self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let offset = self.offset.unwrap_or(0).max(0);
        (limit, offset)
    }
}

fn user_url(req: &HttpRequest, username: &str) -> Result<String, ApiError> {
    req.url_for("user_detail", [username])
        .map(|u| u.to_string())
        .map_err(|e| ApiError::Internal(format!("Failed to build user url: {}", e)))
}

fn post_url(req: &HttpRequest, post_id: &str) -> Result<String, ApiError> {
    req.url_for("post_detail", [post_id])
        .map(|u| u.to_string())
        .map_err(|e| ApiError::Internal(format!("Failed to build post url: {}", e)))
}

// ==================== Health Check ====================

pub async fn health() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339()
    }))
}

// ==================== Auth Endpoints ====================

pub async fn register(
    state: web::Data<AppState>,
    body: web::Json<RegisterRequest>,
) -> ApiResult {
    let account = validate_registration(&body, &state.store)?;

    // Hashing runs on the blocking pool
    let auth = state.auth_service.clone();
    let password = account.password;
    let password_hash = web::block(move || auth.hash_password(&password)).await??;

    let mut user = User {
        id: String::new(),
        username: account.username,
        email: account.email,
        password_hash,
        profile_picture: None,
        bio: String::new(),
        is_staff: false,
        date_joined: Utc::now(),
    };
    state.store.create_user(&mut user)?;
    log::info!("Registered user {}", user.username);

    Ok(HttpResponse::Created().json(ApiResponse::success(MessageResponse::new(
        "User registered successfully",
    ))))
}

pub async fn login(state: web::Data<AppState>, body: web::Json<LoginRequest>) -> ApiResult {
    let LoginRequest { username, password } = body.into_inner();
    let auth = state.auth_service.clone();
    let pair = web::block(move || auth.login(&username, &password)).await??;
    Ok(HttpResponse::Ok().json(ApiResponse::success(pair)))
}

pub async fn refresh_token(
    state: web::Data<AppState>,
    body: web::Json<RefreshRequest>,
) -> ApiResult {
    let access = state.auth_service.refresh(&body.refresh)?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(access)))
}

// ==================== User Endpoints ====================

pub async fn list_users(
    state: web::Data<AppState>,
    _auth_user: AuthUser,
    req: HttpRequest,
    query: web::Query<ListQuery>,
) -> ApiResult {
    let (limit, offset) = query.page();
    let (profiles, count) = state
        .store
        .list_profiles(query.search.as_deref(), limit, offset)?;

    let results = profiles
        .into_iter()
        .map(|profile| {
            let url = user_url(&req, &profile.username)?;
            Ok(UserListItem::from_profile(profile, url))
        })
        .collect::<Result<Vec<_>, ApiError>>()?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(PaginatedResponse {
        count,
        limit,
        offset,
        results,
    })))
}

pub async fn get_user(
    state: web::Data<AppState>,
    _auth_user: AuthUser,
    path: web::Path<String>,
) -> ApiResult {
    let profile = state.store.get_profile(&path.into_inner())?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(profile)))
}

pub async fn update_user(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
    body: web::Json<UpdateProfileRequest>,
) -> ApiResult {
    let mut user = state.store.get_user_by_username(&path.into_inner())?;
    if !can_modify_profile(&auth_user, &user) {
        return Err(ApiError::Forbidden);
    }
    validate_profile_update(&body, &state.store, &user.id)?;

    let changes = body.into_inner();
    if let Some(username) = changes.username {
        user.username = username.trim().to_string();
    }
    if let Some(bio) = changes.bio {
        user.bio = bio;
    }
    if let Some(picture) = changes.profile_picture {
        // An empty string clears the picture
        let picture = picture.trim();
        user.profile_picture = (!picture.is_empty()).then(|| picture.to_string());
    }

    state.store.update_user(&user)?;
    let profile = state.store.get_profile(&user.username)?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(profile)))
}

pub async fn delete_user(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
) -> ApiResult {
    let user = state.store.get_user_by_username(&path.into_inner())?;
    if !can_modify_profile(&auth_user, &user) {
        return Err(ApiError::Forbidden);
    }

    state.store.delete_user(&user.id)?;
    log::info!("User {} deleted by {}", user.username, auth_user.username);
    Ok(HttpResponse::NoContent().finish())
}

pub async fn toggle_follow(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
) -> ApiResult {
    let target = state.store.get_user_by_username(&path.into_inner())?;
    if target.id == auth_user.user_id {
        return Err(ApiError::BadRequest("You cannot follow yourself".to_string()));
    }

    let is_following = state.store.toggle_follow(&auth_user.user_id, &target.id)?;
    let message = if is_following {
        "Followed successfully"
    } else {
        "Unfollowed successfully"
    };
    log::debug!("{} -> {}: {}", auth_user.username, target.username, message);

    Ok(HttpResponse::Ok().json(ApiResponse::success(FollowResponse {
        message: message.to_string(),
        is_following,
    })))
}

// ==================== Post Endpoints ====================

/// Posts from accounts the caller follows
pub async fn list_posts(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    req: HttpRequest,
    query: web::Query<ListQuery>,
) -> ApiResult {
    let (limit, offset) = query.page();
    let (posts, count) = state.store.list_feed(&auth_user.user_id, limit, offset)?;

    let results = posts
        .into_iter()
        .map(|stats| {
            let url = post_url(&req, &stats.id)?;
            Ok(PostListItem::from_stats(stats, url))
        })
        .collect::<Result<Vec<_>, ApiError>>()?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(PaginatedResponse {
        count,
        limit,
        offset,
        results,
    })))
}

pub async fn create_post(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    req: HttpRequest,
    body: web::Json<CreatePostRequest>,
) -> ApiResult {
    let (caption, image) = validate_post(body.into_inner())?;

    let mut post = Post {
        id: String::new(),
        user_id: auth_user.user_id.clone(),
        image,
        caption,
        created_at: Utc::now(),
    };
    state.store.create_post(&mut post)?;

    let stats = state.store.get_post_stats(&post.id)?;
    let url = post_url(&req, &post.id)?;
    Ok(HttpResponse::Created().json(ApiResponse::success(PostListItem::from_stats(stats, url))))
}

pub async fn get_post(
    state: web::Data<AppState>,
    _auth_user: AuthUser,
    path: web::Path<String>,
) -> ApiResult {
    let id = path.into_inner();
    let stats = state.store.get_post_stats(&id)?;
    let comments = state.store.comments_for_post(&id)?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(PostDetail::new(stats, comments))))
}

pub async fn delete_post(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
) -> ApiResult {
    let post = state.store.get_post(&path.into_inner())?;
    if !can_modify_post(&auth_user, &post) {
        return Err(ApiError::Forbidden);
    }

    state.store.delete_post(&post.id)?;
    log::info!("Post {} deleted by {}", post.id, auth_user.username);
    Ok(HttpResponse::NoContent().finish())
}

pub async fn toggle_like(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
) -> ApiResult {
    let post_id = path.into_inner();
    match state.store.toggle_like(&auth_user.user_id, &post_id)? {
        LikeState::Liked(_) => Ok(HttpResponse::Created()
            .json(ApiResponse::success(MessageResponse::new("Liked post")))),
        LikeState::Unliked => Ok(HttpResponse::Ok()
            .json(ApiResponse::success(MessageResponse::new("Unliked post")))),
    }
}

// ==================== Comment Endpoints ====================

pub async fn list_comments(
    state: web::Data<AppState>,
    _auth_user: AuthUser,
    path: web::Path<String>,
    query: web::Query<ListQuery>,
) -> ApiResult {
    let post = state.store.get_post(&path.into_inner())?;
    let (limit, offset) = query.page();
    let (results, count) = state.store.list_comments(&post.id, limit, offset)?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(PaginatedResponse {
        count,
        limit,
        offset,
        results,
    })))
}

pub async fn create_comment(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
    body: web::Json<CreateCommentRequest>,
) -> ApiResult {
    let post = state.store.get_post(&path.into_inner())?;
    let text = validate_comment(body.into_inner())?;

    let mut comment = Comment {
        id: String::new(),
        user_id: auth_user.user_id.clone(),
        post_id: post.id,
        text,
        created_at: Utc::now(),
    };
    state.store.create_comment(&mut comment)?;

    Ok(HttpResponse::Created().json(ApiResponse::success(CommentView {
        id: comment.id,
        post: comment.post_id,
        user: auth_user.username,
        text: comment.text,
        created_at: comment.created_at,
    })))
}

// ==================== Route Configuration ====================

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg
        .app_data(web::JsonConfig::default().error_handler(json_error_handler))
        .app_data(web::QueryConfig::default().error_handler(query_error_handler))
        .app_data(web::PathConfig::default().error_handler(path_error_handler))
        // Health check
        .route("/health", web::get().to(health))

        // Auth routes (no auth required)
        .route("/api/auth/register/", web::post().to(register))
        .route("/api/auth/login/", web::post().to(login))
        .route("/api/auth/token/refresh/", web::post().to(refresh_token))

        // Users
        .route("/api/v1/users/", web::get().to(list_users))
        .service(
            web::resource("/api/v1/users/{username}/")
                .name("user_detail")
                .route(web::get().to(get_user))
                .route(web::put().to(update_user))
                .route(web::delete().to(delete_user)),
        )
        .route("/api/v1/users/{username}/follow/", web::post().to(toggle_follow))

        // Posts
        .route("/api/v1/posts/", web::get().to(list_posts))
        .route("/api/v1/posts/", web::post().to(create_post))
        .service(
            web::resource("/api/v1/posts/{post_id}/")
                .name("post_detail")
                .route(web::get().to(get_post))
                .route(web::delete().to(delete_post)),
        )
        .route("/api/v1/posts/{post_id}/like/", web::post().to(toggle_like))

        // Comments
        .route("/api/v1/posts/{post_id}/comments/", web::get().to(list_comments))
        .route("/api/v1/posts/{post_id}/comments/", web::post().to(create_comment));
}
