use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use uuid::Uuid;

use crate::models::*;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("Not found: {0}")]
    NotFound(String),
    /// Unique constraint violation; carries the offending column name
    #[error("Already exists: {0}")]
    Conflict(String),
    #[error("Invalid operation: {0}")]
    Invalid(String),
    #[error("Store lock poisoned")]
    Poisoned,
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Thread-safe SQLite store
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

const POST_STATS_SELECT: &str = r#"
    SELECT p.id, p.user_id, u.username, p.image, p.caption, p.created_at,
        (SELECT COUNT(*) FROM likes l WHERE l.post_id = p.id) AS likes_count,
        (SELECT COUNT(*) FROM comments c WHERE c.post_id = p.id) AS comments_count
    FROM posts p
    JOIN users u ON u.id = p.user_id
"#;

const PROFILE_SELECT: &str = r#"
    SELECT u.id, u.username, u.email, u.profile_picture, u.bio, u.date_joined,
        (SELECT COUNT(*) FROM follows f WHERE f.followee_id = u.id) AS followers_count,
        (SELECT COUNT(*) FROM follows f WHERE f.follower_id = u.id) AS following_count
    FROM users u
"#;

impl Store {
    /// Create a new store with the given database path
    pub fn new(db_path: &str) -> StoreResult<Self> {
        let conn = Connection::open(db_path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store for testing
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn()?;
        // Cascades below depend on this; it is per-connection in SQLite.
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT UNIQUE NOT NULL,
                email TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                profile_picture TEXT,
                bio TEXT NOT NULL DEFAULT '',
                is_staff INTEGER NOT NULL DEFAULT 0,
                date_joined TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS follows (
                follower_id TEXT NOT NULL,
                followee_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (follower_id, followee_id),
                CHECK (follower_id <> followee_id),
                FOREIGN KEY (follower_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (followee_id) REFERENCES users(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS posts (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                image TEXT,
                caption TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS likes (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                post_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE(user_id, post_id),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (post_id) REFERENCES posts(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS comments (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                post_id TEXT NOT NULL,
                text TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (post_id) REFERENCES posts(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_follows_followee_id ON follows(followee_id);
            CREATE INDEX IF NOT EXISTS idx_posts_user_id ON posts(user_id);
            CREATE INDEX IF NOT EXISTS idx_posts_created_at ON posts(created_at);
            CREATE INDEX IF NOT EXISTS idx_likes_post_id ON likes(post_id);
            CREATE INDEX IF NOT EXISTS idx_comments_post_id ON comments(post_id);
            "#,
        )?;
        Ok(())
    }

    // ==================== User Operations ====================

    pub fn create_user(&self, user: &mut User) -> StoreResult<()> {
        let conn = self.conn()?;
        user.id = Uuid::new_v4().to_string();
        user.date_joined = Utc::now();

        conn.execute(
            r#"INSERT INTO users (id, username, email, password_hash, profile_picture, bio,
                is_staff, date_joined)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
            params![
                &user.id,
                &user.username,
                &user.email,
                &user.password_hash,
                &user.profile_picture,
                &user.bio,
                user.is_staff,
                format_datetime(&user.date_joined),
            ],
        )
        .map_err(map_constraint)?;
        Ok(())
    }

    pub fn get_user(&self, id: &str) -> StoreResult<User> {
        let conn = self.conn()?;
        conn.query_row("SELECT * FROM users WHERE id = ?1", params![id], row_to_user)
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound(format!("User {}", id)),
                _ => StoreError::Database(e),
            })
    }

    pub fn get_user_by_username(&self, username: &str) -> StoreResult<User> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT * FROM users WHERE username = ?1",
            params![username],
            row_to_user,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                StoreError::NotFound(format!("User {}", username))
            }
            _ => StoreError::Database(e),
        })
    }

    /// Persist the mutable profile fields (username, bio, profile picture)
    pub fn update_user(&self, user: &User) -> StoreResult<()> {
        let conn = self.conn()?;
        let rows = conn
            .execute(
                "UPDATE users SET username = ?1, bio = ?2, profile_picture = ?3 WHERE id = ?4",
                params![&user.username, &user.bio, &user.profile_picture, &user.id],
            )
            .map_err(map_constraint)?;

        if rows == 0 {
            return Err(StoreError::NotFound(format!("User {}", user.id)));
        }
        Ok(())
    }

    /// Delete an account; posts, likes, comments and follow edges go with it
    pub fn delete_user(&self, id: &str) -> StoreResult<()> {
        let conn = self.conn()?;
        let rows = conn.execute("DELETE FROM users WHERE id = ?1", params![id])?;
        if rows == 0 {
            return Err(StoreError::NotFound(format!("User {}", id)));
        }
        Ok(())
    }

    pub fn count_users(&self) -> StoreResult<i64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Whether another account (not `except_id`) already has this username
    pub fn username_taken(&self, username: &str, except_id: Option<&str>) -> StoreResult<bool> {
        let conn = self.conn()?;
        let found = conn
            .query_row(
                "SELECT 1 FROM users WHERE username = ?1 AND (?2 IS NULL OR id <> ?2)",
                params![username, except_id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn email_taken(&self, email: &str) -> StoreResult<bool> {
        let conn = self.conn()?;
        let found = conn
            .query_row("SELECT 1 FROM users WHERE email = ?1", params![email], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }

    pub fn get_profile(&self, username: &str) -> StoreResult<UserProfile> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("{} WHERE u.username = ?1", PROFILE_SELECT),
            params![username],
            row_to_profile,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                StoreError::NotFound(format!("User {}", username))
            }
            _ => StoreError::Database(e),
        })
    }

    /// List profiles newest first, optionally filtered by a case-insensitive
    /// username substring. Returns the page and the total match count.
    pub fn list_profiles(
        &self,
        search: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> StoreResult<(Vec<UserProfile>, i64)> {
        let conn = self.conn()?;
        let pattern = search.filter(|s| !s.is_empty()).map(like_pattern);

        let total: i64 = conn.query_row(
            r"SELECT COUNT(*) FROM users WHERE (?1 IS NULL OR username LIKE ?1 ESCAPE '\')",
            params![&pattern],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(&format!(
            r"{} WHERE (?1 IS NULL OR u.username LIKE ?1 ESCAPE '\')
               ORDER BY u.date_joined DESC, u.rowid DESC LIMIT ?2 OFFSET ?3",
            PROFILE_SELECT
        ))?;
        let profiles = stmt
            .query_map(params![&pattern, limit, offset], row_to_profile)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok((profiles, total))
    }

    // ==================== Follow Operations ====================

    pub fn is_following(&self, follower_id: &str, followee_id: &str) -> StoreResult<bool> {
        let conn = self.conn()?;
        let found = conn
            .query_row(
                "SELECT 1 FROM follows WHERE follower_id = ?1 AND followee_id = ?2",
                params![follower_id, followee_id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Flip the follower -> followee edge. Returns whether the edge exists afterwards.
    pub fn toggle_follow(&self, follower_id: &str, followee_id: &str) -> StoreResult<bool> {
        if follower_id == followee_id {
            return Err(StoreError::Invalid("You cannot follow yourself".to_string()));
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let removed = tx.execute(
            "DELETE FROM follows WHERE follower_id = ?1 AND followee_id = ?2",
            params![follower_id, followee_id],
        )?;

        let following = if removed > 0 {
            false
        } else {
            tx.execute(
                r#"INSERT OR IGNORE INTO follows (follower_id, followee_id, created_at)
                   VALUES (?1, ?2, ?3)"#,
                params![follower_id, followee_id, format_datetime(&Utc::now())],
            )
            .map_err(map_constraint)?;
            true
        };

        tx.commit()?;
        Ok(following)
    }

    // ==================== Post Operations ====================

    pub fn create_post(&self, post: &mut Post) -> StoreResult<()> {
        let conn = self.conn()?;
        post.id = Uuid::new_v4().to_string();
        post.created_at = Utc::now();

        conn.execute(
            r#"INSERT INTO posts (id, user_id, image, caption, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5)"#,
            params![
                &post.id,
                &post.user_id,
                &post.image,
                &post.caption,
                format_datetime(&post.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_post(&self, id: &str) -> StoreResult<Post> {
        let conn = self.conn()?;
        conn.query_row("SELECT * FROM posts WHERE id = ?1", params![id], |row| {
            Ok(Post {
                id: row.get("id")?,
                user_id: row.get("user_id")?,
                image: row.get("image")?,
                caption: row.get("caption")?,
                created_at: parse_datetime(row.get::<_, String>("created_at")?),
            })
        })
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound(format!("Post {}", id)),
            _ => StoreError::Database(e),
        })
    }

    pub fn get_post_stats(&self, id: &str) -> StoreResult<PostStats> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("{} WHERE p.id = ?1", POST_STATS_SELECT),
            params![id],
            row_to_post_stats,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound(format!("Post {}", id)),
            _ => StoreError::Database(e),
        })
    }

    /// Posts authored by accounts that `user_id` follows, newest first
    pub fn list_feed(
        &self,
        user_id: &str,
        limit: i64,
        offset: i64,
    ) -> StoreResult<(Vec<PostStats>, i64)> {
        let conn = self.conn()?;

        let total: i64 = conn.query_row(
            r#"SELECT COUNT(*) FROM posts p
               JOIN follows f ON f.followee_id = p.user_id
               WHERE f.follower_id = ?1"#,
            params![user_id],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(&format!(
            r#"{} JOIN follows f ON f.followee_id = p.user_id
               WHERE f.follower_id = ?1
               ORDER BY p.created_at DESC, p.rowid DESC LIMIT ?2 OFFSET ?3"#,
            POST_STATS_SELECT
        ))?;
        let posts = stmt
            .query_map(params![user_id, limit, offset], row_to_post_stats)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok((posts, total))
    }

    /// Delete a post; its likes and comments go with it
    pub fn delete_post(&self, id: &str) -> StoreResult<()> {
        let conn = self.conn()?;
        let rows = conn.execute("DELETE FROM posts WHERE id = ?1", params![id])?;
        if rows == 0 {
            return Err(StoreError::NotFound(format!("Post {}", id)));
        }
        Ok(())
    }

    pub fn count_posts_by_user(&self, user_id: &str) -> StoreResult<i64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM posts WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // ==================== Like Operations ====================

    /// Get-or-create a like, deleting it if it already existed
    pub fn toggle_like(&self, user_id: &str, post_id: &str) -> StoreResult<LikeState> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let post_exists = tx
            .query_row("SELECT 1 FROM posts WHERE id = ?1", params![post_id], |_| Ok(()))
            .optional()?
            .is_some();
        if !post_exists {
            return Err(StoreError::NotFound(format!("Post {}", post_id)));
        }

        let removed = tx.execute(
            "DELETE FROM likes WHERE user_id = ?1 AND post_id = ?2",
            params![user_id, post_id],
        )?;

        let state = if removed > 0 {
            LikeState::Unliked
        } else {
            let like = Like {
                id: Uuid::new_v4().to_string(),
                user_id: user_id.to_string(),
                post_id: post_id.to_string(),
                created_at: Utc::now(),
            };
            tx.execute(
                r#"INSERT OR IGNORE INTO likes (id, user_id, post_id, created_at)
                   VALUES (?1, ?2, ?3, ?4)"#,
                params![
                    &like.id,
                    &like.user_id,
                    &like.post_id,
                    format_datetime(&like.created_at),
                ],
            )?;
            LikeState::Liked(like)
        };

        tx.commit()?;
        Ok(state)
    }

    pub fn count_likes(&self, post_id: &str) -> StoreResult<i64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM likes WHERE post_id = ?1",
            params![post_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // ==================== Comment Operations ====================

    pub fn create_comment(&self, comment: &mut Comment) -> StoreResult<()> {
        let conn = self.conn()?;
        comment.id = Uuid::new_v4().to_string();
        comment.created_at = Utc::now();

        conn.execute(
            r#"INSERT INTO comments (id, user_id, post_id, text, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5)"#,
            params![
                &comment.id,
                &comment.user_id,
                &comment.post_id,
                &comment.text,
                format_datetime(&comment.created_at),
            ],
        )
        .map_err(|e| match map_constraint(e) {
            StoreError::Database(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                StoreError::NotFound(format!("Post {}", comment.post_id))
            }
            other => other,
        })?;
        Ok(())
    }

    pub fn list_comments(
        &self,
        post_id: &str,
        limit: i64,
        offset: i64,
    ) -> StoreResult<(Vec<CommentView>, i64)> {
        let conn = self.conn()?;
        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM comments WHERE post_id = ?1",
            params![post_id],
            |row| row.get(0),
        )?;
        let comments = query_comments(&conn, post_id, limit, offset)?;
        Ok((comments, total))
    }

    /// Every comment on a post, newest first
    pub fn comments_for_post(&self, post_id: &str) -> StoreResult<Vec<CommentView>> {
        let conn = self.conn()?;
        // LIMIT -1 is "no limit" in SQLite
        query_comments(&conn, post_id, -1, 0)
    }

    pub fn count_comments(&self, post_id: &str) -> StoreResult<i64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM comments WHERE post_id = ?1",
            params![post_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

fn query_comments(
    conn: &Connection,
    post_id: &str,
    limit: i64,
    offset: i64,
) -> StoreResult<Vec<CommentView>> {
    let mut stmt = conn.prepare(
        r#"SELECT c.id, c.post_id, u.username, c.text, c.created_at
           FROM comments c
           JOIN users u ON u.id = c.user_id
           WHERE c.post_id = ?1
           ORDER BY c.created_at DESC, c.rowid DESC LIMIT ?2 OFFSET ?3"#,
    )?;
    let comments = stmt
        .query_map(params![post_id, limit, offset], |row| {
            Ok(CommentView {
                id: row.get("id")?,
                post: row.get("post_id")?,
                user: row.get("username")?,
                text: row.get("text")?,
                created_at: parse_datetime(row.get::<_, String>("created_at")?),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(comments)
}

fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get("id")?,
        username: row.get("username")?,
        email: row.get("email")?,
        password_hash: row.get("password_hash")?,
        profile_picture: row.get("profile_picture")?,
        bio: row.get("bio")?,
        is_staff: row.get("is_staff")?,
        date_joined: parse_datetime(row.get::<_, String>("date_joined")?),
    })
}

fn row_to_profile(row: &rusqlite::Row) -> rusqlite::Result<UserProfile> {
    Ok(UserProfile {
        id: row.get("id")?,
        username: row.get("username")?,
        email: row.get("email")?,
        profile_picture: row.get("profile_picture")?,
        bio: row.get("bio")?,
        followers_count: row.get("followers_count")?,
        following_count: row.get("following_count")?,
        date_joined: parse_datetime(row.get::<_, String>("date_joined")?),
    })
}

fn row_to_post_stats(row: &rusqlite::Row) -> rusqlite::Result<PostStats> {
    Ok(PostStats {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        username: row.get("username")?,
        image: row.get("image")?,
        caption: row.get("caption")?,
        created_at: parse_datetime(row.get::<_, String>("created_at")?),
        likes_count: row.get("likes_count")?,
        comments_count: row.get("comments_count")?,
    })
}

/// Turn "UNIQUE constraint failed: users.email" into `Conflict("email")`
fn map_constraint(e: rusqlite::Error) -> StoreError {
    if let rusqlite::Error::SqliteFailure(err, Some(msg)) = &e {
        if err.code == ErrorCode::ConstraintViolation {
            if let Some(columns) = msg.strip_prefix("UNIQUE constraint failed: ") {
                let first = columns.split(", ").next().unwrap_or(columns);
                let field = first.rsplit('.').next().unwrap_or(first);
                return StoreError::Conflict(field.to_string());
            }
        }
    }
    StoreError::Database(e)
}

/// Substring LIKE pattern with the wildcard characters escaped
fn like_pattern(search: &str) -> String {
    let escaped = search
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

// Fixed-width timestamps so that ORDER BY on the text column is chronological.
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
