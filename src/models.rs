use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, CatalogResult};
use crate::normalize::embed_url;

pub type UserId = i64;
pub type VideoId = i64;

const MAX_USERNAME_LEN: usize = 80;
const MAX_TITLE_LEN: usize = 255;
const PICTURE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "gif"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub profile_picture: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Video {
    pub id: VideoId,
    pub user_id: UserId,
    pub title: String,
    pub description: Option<String>,
    pub youtube_url: String,
    pub video_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Video {
    pub fn embed_url(&self) -> String {
        embed_url(&self.video_id)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub token: String,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Ascending,
    #[default]
    Descending,
}

impl SortOrder {
    /// `asc` selects ascending; any other value falls back to newest first.
    pub fn from_param(param: Option<&str>) -> Self {
        match param {
            Some(p) if p.eq_ignore_ascii_case("asc") => SortOrder::Ascending,
            _ => SortOrder::Descending,
        }
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            SortOrder::Ascending => "ASC",
            SortOrder::Descending => "DESC",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn validate(&self) -> CatalogResult<()> {
        validate_username(&self.username)?;
        if self.password.is_empty() {
            return Err(CatalogError::Validation("password is required".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewVideo {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub url: String,
}

impl NewVideo {
    pub fn validate(&self) -> CatalogResult<()> {
        validate_title(&self.title)
    }
}

/// Full replacement of the editable video fields.
#[derive(Debug, Clone, Deserialize)]
pub struct VideoChanges {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub url: String,
}

impl VideoChanges {
    pub fn validate(&self) -> CatalogResult<()> {
        validate_title(&self.title)
    }
}

/// Profile edit. `name` and `profile_picture` keep their stored value when
/// absent; a blank `profile_picture` removes the picture.
#[derive(Debug, Clone, Deserialize)]
pub struct ProfileChanges {
    pub username: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub profile_picture: Option<String>,
}

impl ProfileChanges {
    pub fn validate(&self) -> CatalogResult<()> {
        validate_username(&self.username)?;
        // A blank reference clears the picture and needs no image check.
        if let Some(picture) = self.profile_picture.as_deref().filter(|p| !p.trim().is_empty()) {
            if !is_allowed_picture(picture.trim()) {
                return Err(CatalogError::Validation(
                    "profile picture must be a png, jpg or gif image".into(),
                ));
            }
        }
        Ok(())
    }
}

fn validate_username(username: &str) -> CatalogResult<()> {
    let username = username.trim();
    if username.is_empty() {
        return Err(CatalogError::Validation("username is required".into()));
    }
    if username.chars().count() > MAX_USERNAME_LEN {
        return Err(CatalogError::Validation(format!(
            "username must be at most {MAX_USERNAME_LEN} characters"
        )));
    }
    Ok(())
}

fn validate_title(title: &str) -> CatalogResult<()> {
    if title.trim().is_empty() {
        return Err(CatalogError::Validation("title is required".into()));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(CatalogError::Validation(format!(
            "title must be at most {MAX_TITLE_LEN} characters"
        )));
    }
    Ok(())
}

fn is_allowed_picture(reference: &str) -> bool {
    let path = reference.split(['?', '#']).next().unwrap_or(reference);
    let has_allowed_ext = path
        .rsplit_once('.')
        .map(|(_, ext)| PICTURE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false);
    has_allowed_ext
        && mime_guess::from_path(path)
            .first()
            .map(|mime| mime.type_() == mime_guess::mime::IMAGE)
            .unwrap_or(false)
}
