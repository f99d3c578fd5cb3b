use serde::{Deserialize, Serialize};

/// Element categories produced by the layout parser. Anything unrecognised
/// (headers, footers, page breaks, formulas) is carried as `Other`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ElementKind {
    CompositeElement,
    Table,
    Image,
    FigureCaption,
    Title,
    NarrativeText,
    ListItem,
    Text,
    UncategorizedText,
    #[serde(other)]
    Other,
}

impl ElementKind {
    /// Loose text that still needs grouping into sections.
    pub fn is_narrative(&self) -> bool {
        matches!(
            self,
            ElementKind::Title
                | ElementKind::NarrativeText
                | ElementKind::ListItem
                | ElementKind::Text
                | ElementKind::UncategorizedText
        )
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ElementMetadata {
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub page_number: Option<u32>,
    #[serde(default)]
    pub image_base64: Option<String>,
    #[serde(default)]
    pub text_as_html: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParsedElement {
    #[serde(rename = "type")]
    pub kind: ElementKind,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub metadata: ElementMetadata,
}

impl ParsedElement {
    pub fn new(kind: ElementKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            metadata: ElementMetadata::default(),
        }
    }

    pub fn filename(&self) -> String {
        self.metadata.filename.clone().unwrap_or_default()
    }
}
