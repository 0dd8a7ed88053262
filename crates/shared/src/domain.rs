use std::{fmt, str::FromStr};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ParseContentTypeError;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(UserId);
id_newtype!(ProjectId);
id_newtype!(PostId);

/// Kind of content a post carries. Serialized as the lower-case wire string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    #[default]
    Document,
    Image,
    Video,
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Image => "image",
            Self::Video => "video",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = ParseContentTypeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "document" => Ok(Self::Document),
            "image" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            other => Err(ParseContentTypeError(other.to_string())),
        }
    }
}

/// Profile of the authenticated user as returned by `GET /users/me`.
///
/// Snapshots are replaced wholesale on every identity fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: UserId,
    pub email: String,
    pub username: String,
    #[serde(default)]
    pub full_name: Option<String>,
}

/// Project record owned by the remote API.
///
/// Only `id` is required. Every other field is kept exactly as the server sent
/// it in `fields` and read through the accessors, which never fail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Project {
    pub fn title(&self) -> Option<&str> {
        str_field(&self.fields, "title")
    }

    pub fn description(&self) -> Option<&str> {
        str_field(&self.fields, "description")
    }

    pub fn category(&self) -> Option<&str> {
        str_field(&self.fields, "category")
    }

    pub fn owner_id(&self) -> Option<UserId> {
        int_field(&self.fields, "owner_id").map(UserId)
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        timestamp_field(&self.fields, "created_at")
    }
}

/// Post record owned by the remote API. Same pass-through shape as [`Project`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Post {
    pub fn title(&self) -> Option<&str> {
        str_field(&self.fields, "title")
    }

    pub fn content(&self) -> Option<&str> {
        str_field(&self.fields, "content")
    }

    /// Raw wire value; unknown kinds are not rejected.
    pub fn content_type(&self) -> Option<&str> {
        str_field(&self.fields, "content_type")
    }

    pub fn project_id(&self) -> Option<ProjectId> {
        int_field(&self.fields, "project_id").map(ProjectId)
    }

    pub fn author_id(&self) -> Option<UserId> {
        int_field(&self.fields, "author_id").map(UserId)
    }

    pub fn media_url(&self) -> Option<&str> {
        str_field(&self.fields, "media_url")
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        timestamp_field(&self.fields, "created_at")
    }
}

fn str_field<'a>(fields: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    fields.get(key).and_then(Value::as_str)
}

fn int_field(fields: &Map<String, Value>, key: &str) -> Option<i64> {
    fields.get(key).and_then(Value::as_i64)
}

// Offset-less timestamps (as emitted for naive datetimes) are read as UTC.
fn timestamp_field(fields: &Map<String, Value>, key: &str) -> Option<DateTime<Utc>> {
    let raw = str_field(fields, key)?;
    DateTime::parse_from_rfc3339(raw)
        .map(|parsed| parsed.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        })
}
