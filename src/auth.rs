use crate::db::{format_timestamp, parse_timestamp};
use crate::models::{Session, UserId};
use bcrypt::{hash, verify, BcryptResult};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use rusqlite::{params, Connection, OptionalExtension};

const TOKEN_LEN: usize = 32;

pub fn hash_password(password: &str, cost: u32) -> BcryptResult<String> {
    hash(password, cost)
}

/// A malformed stored hash counts as a mismatch.
pub fn verify_password(password: &str, hash: &str) -> bool {
    verify(password, hash).unwrap_or(false)
}

pub fn generate_token() -> String {
    rand::thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect()
}

/// Opens a session and drops every session older than `ttl`.
pub fn create_session(
    conn: &Connection,
    user_id: UserId,
    now: DateTime<Utc>,
    ttl: Duration,
) -> rusqlite::Result<Session> {
    let pruned = conn.execute(
        "DELETE FROM sessions WHERE created_at < ?",
        [format_timestamp(&(now - ttl))],
    )?;
    if pruned > 0 {
        tracing::debug!(pruned, "expired sessions removed");
    }

    let token = generate_token();
    conn.execute(
        "INSERT INTO sessions (token, user_id, created_at) VALUES (?, ?, ?)",
        params![token, user_id, format_timestamp(&now)],
    )?;

    Ok(Session {
        token,
        user_id,
        created_at: now,
    })
}

/// Sessions older than `ttl` are treated as absent.
pub fn find_session(
    conn: &Connection,
    token: &str,
    now: DateTime<Utc>,
    ttl: Duration,
) -> rusqlite::Result<Option<Session>> {
    conn.query_row(
        "SELECT token, user_id, created_at FROM sessions WHERE token = ? AND created_at >= ?",
        params![token, format_timestamp(&(now - ttl))],
        |row| {
            Ok(Session {
                token: row.get(0)?,
                user_id: row.get(1)?,
                created_at: parse_timestamp(2, &row.get::<_, String>(2)?)?,
            })
        },
    )
    .optional()
}

/// Returns whether a session was actually removed.
pub fn revoke_session(conn: &Connection, token: &str) -> rusqlite::Result<bool> {
    let removed = conn.execute("DELETE FROM sessions WHERE token = ?", [token])?;
    Ok(removed > 0)
}
