use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::Arc;
use tokio::task;
use tracing::{debug, info, warn};

use crate::auth;
use crate::db::{format_timestamp, is_unique_violation, parse_timestamp, DbConnection};
use crate::error::{CatalogError, CatalogResult};
use crate::models::{
    Credentials, NewVideo, ProfileChanges, Session, SortOrder, User, UserId, Video, VideoChanges,
    VideoId,
};
use crate::normalize::normalize;

const USER_COLUMNS: &str =
    "id, username, password_hash, name, description, profile_picture, created_at, updated_at";
const VIDEO_COLUMNS: &str =
    "id, user_id, title, description, youtube_url, video_id, created_at, updated_at";

pub const DEFAULT_SESSION_TTL_HOURS: i64 = 24 * 14;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Users, their sessions and the videos they own.
///
/// Every write runs in a single transaction on the shared connection.
#[derive(Clone)]
pub struct Catalog {
    conn: DbConnection,
    clock: Arc<dyn Clock>,
    bcrypt_cost: u32,
    session_ttl: Duration,
}

impl Catalog {
    pub fn new(conn: DbConnection, bcrypt_cost: u32) -> Self {
        Self::with_clock(conn, bcrypt_cost, Arc::new(SystemClock))
    }

    pub fn with_clock(conn: DbConnection, bcrypt_cost: u32, clock: Arc<dyn Clock>) -> Self {
        Self {
            conn,
            clock,
            bcrypt_cost,
            session_ttl: Duration::hours(DEFAULT_SESSION_TTL_HOURS),
        }
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    pub async fn register(&self, creds: &Credentials) -> CatalogResult<UserId> {
        creds.validate()?;
        let username = creds.username.trim();
        let password = creds.password.clone();
        let cost = self.bcrypt_cost;
        let password_hash =
            task::spawn_blocking(move || auth::hash_password(&password, cost)).await??;
        let now = format_timestamp(&self.clock.now());

        let conn = self.conn.lock().await;
        let result = conn.execute(
            "INSERT INTO users (username, password_hash, created_at, updated_at) VALUES (?, ?, ?, ?)",
            params![username, password_hash, now, now],
        );

        match result {
            Ok(_) => {
                let user_id = conn.last_insert_rowid();
                info!(user_id, "user registered");
                Ok(user_id)
            }
            Err(e) if is_unique_violation(&e) => Err(CatalogError::DuplicateUsername),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn authenticate(&self, creds: &Credentials) -> CatalogResult<Session> {
        let username = creds.username.trim();
        let stored = self
            .conn
            .lock()
            .await
            .query_row(
                "SELECT id, password_hash FROM users WHERE username = ?",
                [username],
                |row| Ok((row.get::<_, UserId>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;

        let Some((user_id, password_hash)) = stored else {
            warn!(username, "login rejected");
            return Err(CatalogError::InvalidCredentials);
        };
        let password = creds.password.clone();
        let matches =
            task::spawn_blocking(move || auth::verify_password(&password, &password_hash)).await?;
        if !matches {
            warn!(username, "login rejected");
            return Err(CatalogError::InvalidCredentials);
        }

        let session = auth::create_session(
            &*self.conn.lock().await,
            user_id,
            self.clock.now(),
            self.session_ttl,
        )?;
        info!(user_id, "session opened");
        Ok(session)
    }

    /// Expired sessions resolve like unknown ones.
    pub async fn resolve_session(&self, token: &str) -> CatalogResult<UserId> {
        auth::find_session(&*self.conn.lock().await, token, self.clock.now(), self.session_ttl)?
            .map(|session| session.user_id)
            .ok_or(CatalogError::InvalidCredentials)
    }

    /// Unknown tokens are ignored.
    pub async fn logout(&self, token: &str) -> CatalogResult<()> {
        if auth::revoke_session(&*self.conn.lock().await, token)? {
            debug!("session closed");
        }
        Ok(())
    }

    pub async fn get_user(&self, user_id: UserId) -> CatalogResult<User> {
        find_user(&*self.conn.lock().await, user_id)?.ok_or(CatalogError::NotFound)
    }

    pub async fn update_profile(
        &self,
        user_id: UserId,
        changes: &ProfileChanges,
    ) -> CatalogResult<User> {
        changes.validate()?;
        let now = format_timestamp(&self.clock.now());

        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        let result = tx.execute(
            "UPDATE users SET
                username = ?1,
                name = CASE WHEN ?2 IS NULL THEN name ELSE NULLIF(?2, '') END,
                description = ?3,
                profile_picture = CASE WHEN ?4 IS NULL THEN profile_picture ELSE NULLIF(?4, '') END,
                updated_at = ?5
             WHERE id = ?6",
            params![
                changes.username.trim(),
                changes.name.as_deref().map(str::trim),
                non_blank(changes.description.as_deref()),
                changes.profile_picture.as_deref().map(str::trim),
                now,
                user_id
            ],
        );
        match result {
            Ok(0) => return Err(CatalogError::NotFound),
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => return Err(CatalogError::DuplicateUsername),
            Err(e) => return Err(e.into()),
        }
        let user = find_user(&tx, user_id)?.ok_or(CatalogError::NotFound)?;
        tx.commit()?;

        info!(user_id, "profile updated");
        Ok(user)
    }

    /// Persists a video only when its URL yields an id.
    pub async fn create_video(&self, owner: UserId, new: &NewVideo) -> CatalogResult<VideoId> {
        new.validate()?;
        let video_ref = normalize(&new.url)?;
        let now = format_timestamp(&self.clock.now());

        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        if find_user(&tx, owner)?.is_none() {
            return Err(CatalogError::NotFound);
        }
        tx.execute(
            "INSERT INTO videos (user_id, title, description, youtube_url, video_id, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                owner,
                new.title.trim(),
                non_blank(new.description.as_deref()),
                new.url.trim(),
                video_ref.video_id,
                now,
                now
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        info!(video = id, owner, youtube_id = %video_ref.video_id, "video created");
        Ok(id)
    }

    pub async fn get_video(&self, id: VideoId) -> CatalogResult<Video> {
        find_video(&*self.conn.lock().await, id)?.ok_or(CatalogError::NotFound)
    }

    /// All videos ordered by id.
    pub async fn list_videos(&self, order: SortOrder) -> CatalogResult<Vec<Video>> {
        let sql = format!(
            "SELECT {VIDEO_COLUMNS} FROM videos ORDER BY id {}",
            order.as_sql()
        );
        let videos = query_videos(&*self.conn.lock().await, &sql, [])?;
        debug!(count = videos.len(), ?order, "listed videos");
        Ok(videos)
    }

    /// One owner's videos ordered by creation time.
    pub async fn list_videos_by_owner(
        &self,
        owner: UserId,
        order: SortOrder,
    ) -> CatalogResult<Vec<Video>> {
        let dir = order.as_sql();
        let sql = format!(
            "SELECT {VIDEO_COLUMNS} FROM videos WHERE user_id = ?
             ORDER BY created_at {dir}, id {dir}"
        );
        let videos = query_videos(&*self.conn.lock().await, &sql, [owner])?;
        debug!(count = videos.len(), owner, ?order, "listed owner videos");
        Ok(videos)
    }

    /// Case-insensitive (ASCII) substring match on title or description.
    /// A blank term matches nothing.
    pub async fn search(&self, term: &str) -> CatalogResult<Vec<Video>> {
        let term = term.trim();
        if term.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {VIDEO_COLUMNS} FROM videos
             WHERE title LIKE ?1 ESCAPE '\\' OR description LIKE ?1 ESCAPE '\\'
             ORDER BY id DESC"
        );
        let videos = query_videos(&*self.conn.lock().await, &sql, [like_pattern(term)])?;
        debug!(count = videos.len(), "search finished");
        Ok(videos)
    }

    /// Replaces title, description and URL; the stored id is re-derived from the new URL.
    pub async fn update_video(
        &self,
        id: VideoId,
        requester: UserId,
        changes: &VideoChanges,
    ) -> CatalogResult<Video> {
        changes.validate()?;
        let video_ref = normalize(&changes.url)?;
        let now = format_timestamp(&self.clock.now());

        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        ensure_owner(&tx, id, requester)?;
        tx.execute(
            "UPDATE videos SET title = ?, description = ?, youtube_url = ?, video_id = ?, updated_at = ?
             WHERE id = ?",
            params![
                changes.title.trim(),
                non_blank(changes.description.as_deref()),
                changes.url.trim(),
                video_ref.video_id,
                now,
                id
            ],
        )?;
        let video = find_video(&tx, id)?.ok_or(CatalogError::NotFound)?;
        tx.commit()?;

        info!(video = id, youtube_id = %video.video_id, "video updated");
        Ok(video)
    }

    pub async fn delete_video(&self, id: VideoId, requester: UserId) -> CatalogResult<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        ensure_owner(&tx, id, requester)?;
        tx.execute("DELETE FROM videos WHERE id = ?", [id])?;
        tx.commit()?;

        info!(video = id, "video deleted");
        Ok(())
    }
}

fn ensure_owner(conn: &Connection, id: VideoId, requester: UserId) -> CatalogResult<()> {
    let owner: Option<UserId> = conn
        .query_row("SELECT user_id FROM videos WHERE id = ?", [id], |row| {
            row.get(0)
        })
        .optional()?;
    match owner {
        None => Err(CatalogError::NotFound),
        Some(owner) if owner != requester => {
            warn!(video = id, requester, "rejected change by non-owner");
            Err(CatalogError::NotOwner)
        }
        Some(_) => Ok(()),
    }
}

fn find_user(conn: &Connection, id: UserId) -> rusqlite::Result<Option<User>> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"),
        [id],
        user_from_row,
    )
    .optional()
}

fn find_video(conn: &Connection, id: VideoId) -> rusqlite::Result<Option<Video>> {
    conn.query_row(
        &format!("SELECT {VIDEO_COLUMNS} FROM videos WHERE id = ?"),
        [id],
        video_from_row,
    )
    .optional()
}

fn query_videos<P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> rusqlite::Result<Vec<Video>> {
    let mut stmt = conn.prepare(sql)?;
    let videos = stmt
        .query_map(params, video_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(videos)
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        password_hash: row.get(2)?,
        name: row.get(3)?,
        description: row.get(4)?,
        profile_picture: row.get(5)?,
        created_at: parse_timestamp(6, &row.get::<_, String>(6)?)?,
        updated_at: parse_timestamp(7, &row.get::<_, String>(7)?)?,
    })
}

fn video_from_row(row: &Row<'_>) -> rusqlite::Result<Video> {
    Ok(Video {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        youtube_url: row.get(4)?,
        video_id: row.get(5)?,
        created_at: parse_timestamp(6, &row.get::<_, String>(6)?)?,
        updated_at: parse_timestamp(7, &row.get::<_, String>(7)?)?,
    })
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}
