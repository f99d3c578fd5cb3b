use crate::elements::{ElementKind, ElementMetadata, ParsedElement};

#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: 1_500,
            overlap_chars: 150,
        }
    }
}

pub fn normalize_whitespace(text: &str) -> String {
    text.replace('\u{a0}', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Groups loose narrative elements into section composites. A `Title` opens a
/// new section; a section closes before it would exceed `max_chars`. Every
/// other element is passed through in place, so image/caption adjacency is
/// untouched.
pub fn compose_sections(elements: &[ParsedElement], config: ChunkingConfig) -> Vec<ParsedElement> {
    let mut output = Vec::with_capacity(elements.len());
    let mut section = Section::default();

    for element in elements {
        if !element.kind.is_narrative() {
            section.flush_into(&mut output, config);
            output.push(element.clone());
            continue;
        }

        let text = normalize_whitespace(&element.text);
        if text.is_empty() {
            continue;
        }

        let starts_section = element.kind == ElementKind::Title;
        let overflows = section.len() + text.chars().count() + 2 > config.max_chars;
        if starts_section || overflows {
            section.flush_into(&mut output, config);
        }
        section.push(element, text);
    }

    section.flush_into(&mut output, config);
    output
}

#[derive(Default)]
struct Section {
    parts: Vec<String>,
    metadata: Option<ElementMetadata>,
}

impl Section {
    fn len(&self) -> usize {
        self.parts.iter().map(|part| part.chars().count() + 2).sum()
    }

    fn push(&mut self, element: &ParsedElement, text: String) {
        if self.metadata.is_none() {
            self.metadata = Some(ElementMetadata {
                filename: element.metadata.filename.clone(),
                page_number: element.metadata.page_number,
                ..ElementMetadata::default()
            });
        }
        self.parts.push(text);
    }

    fn flush_into(&mut self, output: &mut Vec<ParsedElement>, config: ChunkingConfig) {
        if self.parts.is_empty() {
            return;
        }
        let text = self.parts.join("\n\n");
        let metadata = self.metadata.take().unwrap_or_default();
        self.parts.clear();

        for piece in split_with_overlap(&text, config) {
            output.push(ParsedElement {
                kind: ElementKind::CompositeElement,
                text: piece,
                metadata: metadata.clone(),
            });
        }
    }
}

fn split_with_overlap(text: &str, config: ChunkingConfig) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let max_chars = config.max_chars.max(1);
    if chars.len() <= max_chars {
        return vec![text.to_string()];
    }

    let step = max_chars.saturating_sub(config.overlap_chars).max(1);
    let mut pieces = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + max_chars).min(chars.len());
        pieces.push(chars[start..end].iter().collect::<String>().trim().to_string());
        if end == chars.len() {
            break;
        }
        start += step;
    }
    pieces.retain(|piece| !piece.is_empty());
    pieces
}
