//! Custom item and block definitions a plugin declares in its hello.
//!
//! Texture and geometry data are opaque bytes. They travel base64-encoded
//! inside the JSON body.

use serde::{Deserialize, Serialize};

/// Creative inventory category for a custom item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemCategory {
    Construction,
    Nature,
    Equipment,
    #[default]
    Items,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomItemDefinition {
    /// Namespaced identifier such as `greeter:welcome_token`.
    pub id: String,
    pub display_name: String,
    /// PNG texture bytes.
    #[serde(with = "base64_bytes", default)]
    pub texture_data: Vec<u8>,
    #[serde(default)]
    pub category: ItemCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default)]
    pub meta: i32,
}

impl CustomItemDefinition {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>, texture_data: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            texture_data,
            category: ItemCategory::default(),
            group: None,
            meta: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockTexture {
    pub name: String,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomBlockDefinition {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub textures: Vec<BlockTexture>,
    /// Optional geometry model JSON, kept as raw bytes.
    #[serde(with = "base64_bytes", default, skip_serializing_if = "Vec::is_empty")]
    pub geometry_json: Vec<u8>,
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded.as_bytes()).map_err(serde::de::Error::custom)
    }
}
