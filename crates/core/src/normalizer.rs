use crate::chunking::{compose_sections, ChunkingConfig};
use crate::elements::{ElementKind, ParsedElement};
use crate::error::NormalizeError;
use crate::models::{Chunk, ImageChunk, Provenance, TableChunk, NO_CAPTION};
use base64::{engine::general_purpose::STANDARD, Engine};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizeOptions {
    pub sections: ChunkingConfig,
}

/// Chunks in input order plus the elements that could not be converted.
#[derive(Debug, Default)]
pub struct NormalizeReport {
    pub chunks: Vec<Chunk>,
    pub errors: Vec<NormalizeError>,
}

pub fn normalize_elements(elements: &[ParsedElement], options: &NormalizeOptions) -> NormalizeReport {
    let elements = compose_sections(elements, options.sections);
    let mut report = NormalizeReport::default();

    for (position, element) in elements.iter().enumerate() {
        let provenance = Provenance {
            source_file: element.filename(),
            page_number: element.metadata.page_number,
        };

        match element.kind {
            ElementKind::CompositeElement => {
                if element.text.trim().is_empty() {
                    continue;
                }
                report.chunks.push(Chunk::text(element.text.clone(), provenance));
            }
            ElementKind::Table => {
                let html = element.metadata.text_as_html.clone().unwrap_or_default();
                if element.text.trim().is_empty() && html.trim().is_empty() {
                    continue;
                }
                report.chunks.push(Chunk::Table(TableChunk {
                    content: element.text.clone(),
                    html,
                    provenance,
                }));
            }
            ElementKind::Image => {
                let caption = elements
                    .get(position + 1)
                    .filter(|next| next.kind == ElementKind::FigureCaption)
                    .map(|next| next.text.trim())
                    .filter(|caption| !caption.is_empty())
                    .unwrap_or(NO_CAPTION)
                    .to_string();

                match decode_image(element, &provenance) {
                    Ok(bytes) => report.chunks.push(Chunk::Image(ImageChunk {
                        content: element.text.clone(),
                        image_text: element.text.clone(),
                        caption,
                        bytes,
                        provenance,
                    })),
                    Err(error) => {
                        warn!(%error, "skipping image element");
                        report.errors.push(error);
                    }
                }
            }
            _ => {}
        }
    }

    info!(
        chunks = report.chunks.len(),
        errors = report.errors.len(),
        "normalized parsed elements"
    );
    report
}

fn decode_image(element: &ParsedElement, provenance: &Provenance) -> Result<Vec<u8>, NormalizeError> {
    let payload = element
        .metadata
        .image_base64
        .as_deref()
        .filter(|payload| !payload.trim().is_empty())
        .ok_or_else(|| NormalizeError::MissingImagePayload {
            file: provenance.source_file.clone(),
            page: provenance.page_number,
        })?;

    let compact: String = payload.chars().filter(|ch| !ch.is_whitespace()).collect();
    STANDARD
        .decode(compact)
        .map_err(|source| NormalizeError::InvalidImagePayload {
            file: provenance.source_file.clone(),
            page: provenance.page_number,
            source,
        })
}
