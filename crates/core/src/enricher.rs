use crate::backends::strip_reasoning;
use crate::error::EnrichError;
use crate::models::{Chunk, ImageChunk, TableChunk};
use crate::traits::{TextGenerator, VisionModel};
use std::sync::Arc;
use tracing::{info, warn};

pub fn image_prompt(caption: &str, content: &str) -> String {
    format!(
        "Analyze the following image and provide a detailed description. \
         Caption: '{caption}'. Content: '{content}'. \
         Please focus on the visual elements and context of the image, delivering a thorough \
         and insightful description without any additional commentary."
    )
}

pub fn table_prompt(html: &str, text: &str) -> String {
    format!(
        "Analyze the following table and provide a detailed description. \
         Table as HTML: '{html}'. Table Text: '{text}'. \
         Please focus on the structure, content, and context of the table, delivering a thorough \
         and insightful description without any additional commentary."
    )
}

#[derive(Debug, Default)]
pub struct EnrichmentReport {
    pub chunks: Vec<Chunk>,
    pub errors: Vec<EnrichError>,
    pub described: usize,
    pub dropped_empty: usize,
}

/// Replaces table and image content with generated descriptions. A chunk type
/// without a configured backend passes through unchanged.
#[derive(Default)]
pub struct DescriptorEnricher {
    tables: Option<Arc<dyn TextGenerator>>,
    images: Option<Arc<dyn VisionModel>>,
}

impl DescriptorEnricher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table_describer(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.tables = Some(generator);
        self
    }

    pub fn with_image_describer(mut self, vision: Arc<dyn VisionModel>) -> Self {
        self.images = Some(vision);
        self
    }

    /// Enriches chunks one at a time in input order. Failures are collected
    /// per chunk; chunks left without content are dropped.
    pub async fn enrich(&self, chunks: Vec<Chunk>) -> EnrichmentReport {
        let mut report = EnrichmentReport::default();

        for mut chunk in chunks {
            let outcome = match &mut chunk {
                Chunk::Text(_) => Ok(false),
                Chunk::Table(table) => self.describe_table(table).await,
                Chunk::Image(image) => self.describe_image(image).await,
            };

            match outcome {
                Ok(true) => report.described += 1,
                Ok(false) => {}
                Err(error) => {
                    warn!(%error, "keeping original chunk content");
                    report.errors.push(error);
                }
            }

            if chunk.has_content() {
                report.chunks.push(chunk);
            } else {
                report.dropped_empty += 1;
            }
        }

        info!(
            chunks = report.chunks.len(),
            described = report.described,
            errors = report.errors.len(),
            dropped_empty = report.dropped_empty,
            "enrichment finished"
        );
        report
    }

    async fn describe_table(&self, table: &mut TableChunk) -> Result<bool, EnrichError> {
        let Some(generator) = &self.tables else {
            return Ok(false);
        };

        let prompt = table_prompt(&table.html, &table.content);
        let description = generator
            .generate(&prompt)
            .await
            .map_err(|source| EnrichError::Table {
                file: table.provenance.source_file.clone(),
                page: table.provenance.page_number,
                source,
            })?;

        Ok(replace_content(&mut table.content, &description))
    }

    async fn describe_image(&self, image: &mut ImageChunk) -> Result<bool, EnrichError> {
        let Some(vision) = &self.images else {
            return Ok(false);
        };

        let prompt = image_prompt(&image.caption, &image.content);
        let description = vision
            .describe_image(&image.bytes, &prompt)
            .await
            .map_err(|source| EnrichError::Image {
                file: image.provenance.source_file.clone(),
                page: image.provenance.page_number,
                source,
            })?;

        Ok(replace_content(&mut image.content, &description))
    }
}

fn replace_content(content: &mut String, description: &str) -> bool {
    let description = strip_reasoning(description);
    if description.is_empty() {
        return false;
    }
    *content = description;
    true
}
