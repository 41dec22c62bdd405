use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User is an account: identity, credentials and profile fields
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub profile_picture: Option<String>,
    pub bio: String,
    pub is_staff: bool,
    pub date_joined: DateTime<Utc>,
}

/// Post is a piece of user-authored content (image and/or caption)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub user_id: String,
    pub image: Option<String>,
    pub caption: String,
    pub created_at: DateTime<Utc>,
}

/// Like is the (user, post) engagement edge. At most one per pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Like {
    pub id: String,
    pub user_id: String,
    pub post_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub user_id: String,
    pub post_id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

// ==================== Projections ====================

/// Profile with follower/following counts
#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    pub id: String,
    pub username: String,
    pub email: String,
    pub profile_picture: Option<String>,
    pub bio: String,
    pub followers_count: i64,
    pub following_count: i64,
    #[serde(skip_serializing)]
    pub date_joined: DateTime<Utc>,
}

/// Entry in the user list, carries a link to the profile
#[derive(Debug, Clone, Serialize)]
pub struct UserListItem {
    pub url: String,
    pub id: String,
    pub username: String,
    pub email: String,
    pub profile_picture: Option<String>,
    pub followers_count: i64,
    pub following_count: i64,
}

impl UserListItem {
    pub fn from_profile(profile: UserProfile, url: String) -> Self {
        Self {
            url,
            id: profile.id,
            username: profile.username,
            email: profile.email,
            profile_picture: profile.profile_picture,
            followers_count: profile.followers_count,
            following_count: profile.following_count,
        }
    }
}

/// Post joined with its author's username and engagement counts
#[derive(Debug, Clone)]
pub struct PostStats {
    pub id: String,
    pub user_id: String,
    pub username: String,
    pub image: Option<String>,
    pub caption: String,
    pub created_at: DateTime<Utc>,
    pub likes_count: i64,
    pub comments_count: i64,
}

/// Feed entry
#[derive(Debug, Clone, Serialize)]
pub struct PostListItem {
    pub url: String,
    pub id: String,
    pub user: String,
    pub image: Option<String>,
    pub caption: String,
    pub likes_count: i64,
    pub comments_count: i64,
}

impl PostListItem {
    pub fn from_stats(stats: PostStats, url: String) -> Self {
        Self {
            url,
            id: stats.id,
            user: stats.username,
            image: stats.image,
            caption: stats.caption,
            likes_count: stats.likes_count,
            comments_count: stats.comments_count,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PostDetail {
    pub id: String,
    pub user: String,
    pub image: Option<String>,
    pub caption: String,
    pub created_at: DateTime<Utc>,
    pub likes_count: i64,
    pub comments_count: i64,
    pub comments: Vec<CommentView>,
}

impl PostDetail {
    pub fn new(stats: PostStats, comments: Vec<CommentView>) -> Self {
        Self {
            id: stats.id,
            user: stats.username,
            image: stats.image,
            caption: stats.caption,
            created_at: stats.created_at,
            likes_count: stats.likes_count,
            comments_count: stats.comments_count,
            comments,
        }
    }
}

/// Comment as shown to clients: author by username
#[derive(Debug, Clone, Serialize)]
pub struct CommentView {
    pub id: String,
    pub post: String,
    pub user: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// Result of a like toggle; a new like carries the stored row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LikeState {
    Liked(Like),
    Unliked,
}

// ==================== Request/Response types ====================

// Fields are optional so that missing values surface as per-field
// validation errors instead of a generic deserialization failure.
#[derive(Debug, Default, Deserialize)]
pub struct RegisterRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh: String,
}

#[derive(Debug, Serialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

#[derive(Debug, Serialize)]
pub struct AccessToken {
    pub access: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateProfileRequest {
    pub username: Option<String>,
    pub bio: Option<String>,
    pub profile_picture: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CreatePostRequest {
    #[serde(default)]
    pub caption: String,
    pub image: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateCommentRequest {
    pub text: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FollowResponse {
    pub message: String,
    pub is_following: bool,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    pub count: i64,
    pub limit: i64,
    pub offset: i64,
    pub results: Vec<T>,
}
