use crate::elements::ParsedElement;
use crate::error::ArtifactError;
use crate::models::Chunk;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tracing::info;

pub const TEXT_CHUNKS_FILE: &str = "text_chunks.json";
pub const IMAGE_CHUNKS_FILE: &str = "image_chunks.json";
pub const TABLE_CHUNKS_FILE: &str = "table_chunks.json";

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ArtifactError> {
    let file = File::open(path).map_err(|source| ArtifactError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_reader(BufReader::new(file)).map_err(|source| ArtifactError::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), ArtifactError> {
    let write_error = |source: std::io::Error| ArtifactError::Write {
        path: path.to_path_buf(),
        source,
    };
    let file = File::create(path).map_err(write_error)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value).map_err(|source| ArtifactError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    writer.write_all(b"\n").map_err(write_error)?;
    writer.flush().map_err(write_error)
}

/// Reads the layout parser's element dump.
pub fn load_elements(path: &Path) -> Result<Vec<ParsedElement>, ArtifactError> {
    read_json(path)
}

pub fn save_chunks(path: &Path, chunks: &[Chunk]) -> Result<(), ArtifactError> {
    write_json(path, chunks)?;
    info!(path = %path.display(), chunks = chunks.len(), "saved chunks");
    Ok(())
}

pub fn load_chunks(path: &Path) -> Result<Vec<Chunk>, ArtifactError> {
    read_json(path)
}

/// Chunks grouped by content type, persisted as one file per group.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkSet {
    pub text: Vec<Chunk>,
    pub tables: Vec<Chunk>,
    pub images: Vec<Chunk>,
}

impl ChunkSet {
    pub fn from_chunks(chunks: Vec<Chunk>) -> Self {
        let mut set = Self::default();
        for chunk in chunks {
            match chunk {
                Chunk::Text(_) => set.text.push(chunk),
                Chunk::Table(_) => set.tables.push(chunk),
                Chunk::Image(_) => set.images.push(chunk),
            }
        }
        set
    }

    pub fn len(&self) -> usize {
        self.text.len() + self.tables.len() + self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn save(&self, dir: &Path) -> Result<(), ArtifactError> {
        fs::create_dir_all(dir).map_err(|source| ArtifactError::Write {
            path: dir.to_path_buf(),
            source,
        })?;
        save_chunks(&dir.join(TEXT_CHUNKS_FILE), &self.text)?;
        save_chunks(&dir.join(IMAGE_CHUNKS_FILE), &self.images)?;
        save_chunks(&dir.join(TABLE_CHUNKS_FILE), &self.tables)
    }

    pub fn load(dir: &Path) -> Result<Self, ArtifactError> {
        Ok(Self {
            text: load_chunks(&dir.join(TEXT_CHUNKS_FILE))?,
            tables: load_chunks(&dir.join(TABLE_CHUNKS_FILE))?,
            images: load_chunks(&dir.join(IMAGE_CHUNKS_FILE))?,
        })
    }
}
