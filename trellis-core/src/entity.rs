//! Response entities and the writers that serialize them.
//!
//! Endpoints return a [`Reply`]: a status, headers and an [`Entity`]. At
//! the end of the chain the write handler picks the target media type and
//! asks the [`EntityWriters`] registry for the first writer that supports
//! the entity as that type.

use crate::http::{find_header, set_header};
use crate::media_type::MediaType;
use crate::{Error, HttpStatus, Result};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Body of a reply before serialization.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Entity {
    #[default]
    Empty,
    Text(String),
    Bytes(Vec<u8>),
    Json(Value),
}

impl Entity {
    pub fn is_empty(&self) -> bool {
        matches!(self, Entity::Empty)
    }

    /// Short label used in logs and writer errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Entity::Empty => "empty",
            Entity::Text(_) => "text",
            Entity::Bytes(_) => "bytes",
            Entity::Json(_) => "json",
        }
    }
}

/// What an endpoint, filter or exception mapper answers with.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub entity: Entity,
}

impl Default for Reply {
    fn default() -> Self {
        Self::ok()
    }
}

impl Reply {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            entity: Entity::Empty,
        }
    }

    pub fn ok() -> Self {
        Self::new(200)
    }

    pub fn created() -> Self {
        Self::new(201)
    }

    pub fn no_content() -> Self {
        Self::new(204)
    }

    pub fn status(status: HttpStatus) -> Self {
        Self::new(status.code())
    }

    pub fn text(body: impl Into<String>) -> Self {
        Self::ok().with_entity(Entity::Text(body.into()))
    }

    pub fn bytes(body: impl Into<Vec<u8>>) -> Self {
        Self::ok().with_entity(Entity::Bytes(body.into()))
    }

    /// 200 with a JSON entity.
    pub fn json<T: Serialize>(value: &T) -> Result<Self> {
        let value =
            serde_json::to_value(value).map_err(|e| Error::Serialization(e.to_string()))?;
        Ok(Self::ok().with_entity(Entity::Json(value)))
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn with_entity(mut self, entity: Entity) -> Self {
        self.entity = entity;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        set_header(&mut self.headers, &name, value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Explicit `Content-Type`, when the reply set one that parses.
    pub fn content_type(&self) -> Option<MediaType> {
        self.header("Content-Type").and_then(MediaType::parse)
    }
}

/// Serializes one family of entities.
pub trait EntityWriter: Send + Sync + 'static {
    /// Whether this writer can produce `entity` as `media_type`. The type
    /// passed here is always concrete.
    fn supports(&self, entity: &Entity, media_type: &MediaType) -> bool;

    /// Type to use when nothing was negotiated and the reply set none.
    fn default_media_type(&self) -> MediaType;

    fn write(&self, entity: &Entity, media_type: &MediaType) -> Result<Vec<u8>>;
}

/// JSON entities as `application/json` or any `+json` type.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonWriter;

impl EntityWriter for JsonWriter {
    fn supports(&self, entity: &Entity, media_type: &MediaType) -> bool {
        matches!(entity, Entity::Json(_)) && media_type.is_json()
    }

    fn default_media_type(&self) -> MediaType {
        MediaType::json()
    }

    fn write(&self, entity: &Entity, _media_type: &MediaType) -> Result<Vec<u8>> {
        match entity {
            Entity::Json(value) => {
                serde_json::to_vec(value).map_err(|e| Error::Serialization(e.to_string()))
            }
            other => Err(Error::Serialization(format!(
                "json writer cannot write {} entity",
                other.kind()
            ))),
        }
    }
}

/// Text entities, written as UTF-8 whatever the type.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextWriter;

impl EntityWriter for TextWriter {
    fn supports(&self, entity: &Entity, _media_type: &MediaType) -> bool {
        matches!(entity, Entity::Text(_))
    }

    fn default_media_type(&self) -> MediaType {
        MediaType::plain_text().with_param("charset", "utf-8")
    }

    fn write(&self, entity: &Entity, _media_type: &MediaType) -> Result<Vec<u8>> {
        match entity {
            Entity::Text(text) => Ok(text.as_bytes().to_vec()),
            other => Err(Error::Serialization(format!(
                "text writer cannot write {} entity",
                other.kind()
            ))),
        }
    }
}

/// Raw bytes, passed through unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct BytesWriter;

impl EntityWriter for BytesWriter {
    fn supports(&self, entity: &Entity, _media_type: &MediaType) -> bool {
        matches!(entity, Entity::Bytes(_))
    }

    fn default_media_type(&self) -> MediaType {
        MediaType::octet_stream()
    }

    fn write(&self, entity: &Entity, _media_type: &MediaType) -> Result<Vec<u8>> {
        match entity {
            Entity::Bytes(bytes) => Ok(bytes.clone()),
            other => Err(Error::Serialization(format!(
                "bytes writer cannot write {} entity",
                other.kind()
            ))),
        }
    }
}

/// Ordered writer registry. Writers registered by the application are
/// consulted before the built-in ones.
#[derive(Clone)]
pub struct EntityWriters {
    custom: Vec<Arc<dyn EntityWriter>>,
    builtin: Vec<Arc<dyn EntityWriter>>,
}

impl Default for EntityWriters {
    fn default() -> Self {
        Self {
            custom: Vec::new(),
            builtin: vec![
                Arc::new(JsonWriter),
                Arc::new(TextWriter),
                Arc::new(BytesWriter),
            ],
        }
    }
}

impl std::fmt::Debug for EntityWriters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityWriters")
            .field("custom", &self.custom.len())
            .field("builtin", &self.builtin.len())
            .finish()
    }
}

impl EntityWriters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<W: EntityWriter>(&mut self, writer: W) {
        self.custom.push(Arc::new(writer));
    }

    fn all(&self) -> impl Iterator<Item = &Arc<dyn EntityWriter>> {
        self.custom.iter().chain(self.builtin.iter())
    }

    /// First writer able to produce `entity` as `media_type`.
    pub fn find(&self, entity: &Entity, media_type: &MediaType) -> Option<&Arc<dyn EntityWriter>> {
        self.all().find(|writer| writer.supports(entity, media_type))
    }

    /// Default media type of the first writer handling `entity` at all.
    pub fn default_media_type(&self, entity: &Entity) -> Option<MediaType> {
        self.default_media_type_within(entity, &MediaType::any())
    }

    /// Default media type of the first writer handling `entity` whose
    /// default falls inside `range`.
    pub fn default_media_type_within(&self, entity: &Entity, range: &MediaType) -> Option<MediaType> {
        self.all()
            .map(|writer| (writer, writer.default_media_type()))
            .find(|(writer, default)| range.matches(default) && writer.supports(entity, default))
            .map(|(_, default)| default)
    }

    /// Serialize `entity` as `media_type`.
    pub fn write(&self, entity: &Entity, media_type: &MediaType) -> Result<Vec<u8>> {
        let writer = self
            .find(entity, media_type)
            .ok_or_else(|| Error::NoEntityWriter {
                entity: entity.kind().to_string(),
                media_type: media_type.essence(),
            })?;
        writer.write(entity, media_type)
    }
}
