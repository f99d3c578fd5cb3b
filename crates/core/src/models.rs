use crate::error::ParseEnumError;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use serde_with::{base64::Base64, serde_as};
use std::fmt;
use std::str::FromStr;

/// Caption recorded for images that are not followed by a figure caption.
pub const NO_CAPTION: &str = "No Caption";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Text,
    Table,
    Image,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Text => "text",
            ContentType::Table => "table",
            ContentType::Image => "image",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Provenance {
    pub source_file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextChunk {
    pub content: String,
    pub provenance: Provenance,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableChunk {
    /// Plain-text rendering, replaced by a generated description once enriched.
    pub content: String,
    pub html: String,
    pub provenance: Provenance,
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageChunk {
    /// Generated description once enriched; parser text before that.
    pub content: String,
    /// Text the parser found inside the image.
    #[serde(default)]
    pub image_text: String,
    pub caption: String,
    #[serde_as(as = "Base64")]
    #[serde(rename = "image_base64")]
    pub bytes: Vec<u8>,
    pub provenance: Provenance,
}

/// One normalized unit of document content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "content_type", rename_all = "lowercase")]
pub enum Chunk {
    Text(TextChunk),
    Table(TableChunk),
    Image(ImageChunk),
}

impl Chunk {
    pub fn text(content: impl Into<String>, provenance: Provenance) -> Self {
        Chunk::Text(TextChunk {
            content: content.into(),
            provenance,
        })
    }

    pub fn content(&self) -> &str {
        match self {
            Chunk::Text(chunk) => &chunk.content,
            Chunk::Table(chunk) => &chunk.content,
            Chunk::Image(chunk) => &chunk.content,
        }
    }

    pub fn set_content(&mut self, content: String) {
        match self {
            Chunk::Text(chunk) => chunk.content = content,
            Chunk::Table(chunk) => chunk.content = content,
            Chunk::Image(chunk) => chunk.content = content,
        }
    }

    pub fn content_type(&self) -> ContentType {
        match self {
            Chunk::Text(_) => ContentType::Text,
            Chunk::Table(_) => ContentType::Table,
            Chunk::Image(_) => ContentType::Image,
        }
    }

    pub fn provenance(&self) -> &Provenance {
        match self {
            Chunk::Text(chunk) => &chunk.provenance,
            Chunk::Table(chunk) => &chunk.provenance,
            Chunk::Image(chunk) => &chunk.provenance,
        }
    }

    pub fn has_content(&self) -> bool {
        !self.content().trim().is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DocumentMetadata {
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub caption: String,
    #[serde(default)]
    pub image_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,
}

/// A chunk with its embedding, shaped as the search store document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PreparedDocument {
    pub content: String,
    pub content_type: ContentType,
    pub embedding: Vec<f32>,
    pub metadata: DocumentMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base64_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_html: Option<String>,
}

impl PreparedDocument {
    pub fn from_chunk(chunk: &Chunk, embedding: Vec<f32>) -> Self {
        let provenance = chunk.provenance();
        let mut metadata = DocumentMetadata {
            filename: provenance.source_file.clone(),
            page_number: provenance.page_number,
            ..DocumentMetadata::default()
        };
        let mut base64_image = None;
        let mut table_html = None;

        match chunk {
            Chunk::Text(_) => {}
            Chunk::Table(table) => table_html = Some(table.html.clone()),
            Chunk::Image(image) => {
                metadata.caption = image.caption.clone();
                metadata.image_text = image.image_text.clone();
                base64_image = Some(STANDARD.encode(&image.bytes));
            }
        }

        Self {
            content: chunk.content().to_string(),
            content_type: chunk.content_type(),
            embedding,
            metadata,
            base64_image,
            table_html,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Keyword,
    Semantic,
    Hybrid,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::Keyword => "keyword",
            SearchMode::Semantic => "semantic",
            SearchMode::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchMode {
    type Err = ParseEnumError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "keyword" => Ok(SearchMode::Keyword),
            "semantic" => Ok(SearchMode::Semantic),
            "hybrid" => Ok(SearchMode::Hybrid),
            _ => Err(ParseEnumError {
                kind: "search mode",
                value: value.to_string(),
                expected: "keyword, semantic, hybrid",
            }),
        }
    }
}

/// A retrieved chunk with the score of the mode that produced it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredChunk {
    pub id: String,
    pub score: f64,
    pub content: String,
    pub content_type: ContentType,
    pub metadata: DocumentMetadata,
    pub table_html: Option<String>,
    pub mode: SearchMode,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionWeights {
    pub keyword: f64,
    pub semantic: f64,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            keyword: 0.5,
            semantic: 0.5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestionOptions {
    pub batch_size: usize,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self { batch_size: 100 }
    }
}
