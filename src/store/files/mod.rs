
use std::collections::HashMap;
use std::fs;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::{Document, VectorRecordStore};
use crate::MatchError;

pub const VECTORS_FILE: &str = "vectors.bin";
pub const DOCUMENTS_FILE: &str = "docs.jsonl";
pub const MANIFEST_FILE: &str = "manifest.json";
pub const DISPLAY_NAMES_FILE: &str = "display_names.json";

const MAGIC: &[u8; 8] = b"AMVSTOR1";
/// Magic, u64 record count, u32 dimension
const HEADER_LEN: usize = 8 + 8 + 4;
const F32_LEN: usize = std::mem::size_of::<f32>();

/// Build metadata written alongside the vectors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub embedding_model: String,
    pub dimension: usize,
    pub count: usize,
    pub created_at: DateTime<Utc>,
}

/// File locations inside a store directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePaths {
    root: PathBuf,
}

impl StorePaths {
    #[inline]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[inline]
    pub fn vectors(&self) -> PathBuf {
        self.root.join(VECTORS_FILE)
    }

    #[inline]
    pub fn documents(&self) -> PathBuf {
        self.root.join(DOCUMENTS_FILE)
    }

    #[inline]
    pub fn manifest(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    #[inline]
    pub fn display_names(&self) -> PathBuf {
        self.root.join(DISPLAY_NAMES_FILE)
    }

    /// Both required files are present
    #[inline]
    pub fn is_available(&self) -> bool {
        self.vectors().is_file() && self.documents().is_file()
    }
}

/// Persist `store` into `dir`. Every file is written to a `.tmp` sibling and
/// renamed into place.
#[inline]
pub fn write_store(
    dir: &Path,
    store: &VectorRecordStore,
    embedding_model: &str,
) -> crate::Result<Manifest> {
    let paths = StorePaths::new(dir);
    fs::create_dir_all(dir)?;

    let manifest = Manifest {
        embedding_model: embedding_model.to_string(),
        dimension: store.dimension(),
        count: store.len(),
        created_at: Utc::now(),
    };

    write_atomically(&paths.vectors(), |writer| {
        writer.write_all(&encode_vectors(store))?;
        Ok(())
    })?;

    write_atomically(&paths.documents(), |writer| {
        for document in store.documents() {
            serde_json::to_writer(&mut *writer, document)?;
            writer.write_all(b"\n")?;
        }
        Ok(())
    })?;

    if store.display_names().is_empty() {
        remove_if_present(&paths.display_names())?;
    } else {
        write_atomically(&paths.display_names(), |writer| {
            serde_json::to_writer_pretty(&mut *writer, store.display_names())?;
            Ok(())
        })?;
    }

    write_atomically(&paths.manifest(), |writer| {
        serde_json::to_writer_pretty(&mut *writer, &manifest)?;
        Ok(())
    })?;

    info!(
        "Wrote {} records ({} dimensions) to {}",
        manifest.count,
        manifest.dimension,
        dir.display()
    );

    Ok(manifest)
}

/// Load the store in `dir`.
///
/// Fails with [`MatchError::StoreUnavailable`] when a required file is absent
/// and with [`MatchError::Integrity`] when the files disagree with each other.
#[inline]
pub fn load_store(dir: &Path) -> crate::Result<VectorRecordStore> {
    let paths = StorePaths::new(dir);
    if !paths.is_available() {
        debug!("No store files under {}", dir.display());
        return Err(MatchError::StoreUnavailable(dir.to_path_buf()));
    }

    let bytes = fs::read(paths.vectors())?;
    let (dimension, vectors) = decode_vectors(&bytes).inspect_err(|e| {
        error!("Rejecting {}: {}", paths.vectors().display(), e);
    })?;

    let documents = read_documents(&paths.documents())?;
    let count = if dimension == 0 {
        0
    } else {
        vectors.len() / dimension
    };
    if documents.len() != count {
        error!(
            "Store at {} has {} vectors but {} documents",
            dir.display(),
            count,
            documents.len()
        );
        return Err(MatchError::Integrity(format!(
            "{} holds {} vectors but {} holds {} documents",
            VECTORS_FILE,
            count,
            DOCUMENTS_FILE,
            documents.len()
        )));
    }

    if let Some(manifest) = read_manifest(dir)? {
        if manifest.count != count || manifest.dimension != dimension {
            return Err(MatchError::Integrity(format!(
                "{} describes {} x {} but the store holds {} x {}",
                MANIFEST_FILE, manifest.count, manifest.dimension, count, dimension
            )));
        }
    }

    let display_names = read_display_names(&paths.display_names())?;
    let store = VectorRecordStore::new(dimension, vectors, documents)?
        .with_display_names(display_names);

    info!(
        "Loaded {} records ({} dimensions) from {}",
        store.len(),
        store.dimension(),
        dir.display()
    );

    Ok(store)
}

/// Read `manifest.json` if it exists
#[inline]
pub fn read_manifest(dir: &Path) -> crate::Result<Option<Manifest>> {
    let path = StorePaths::new(dir).manifest();
    if !path.is_file() {
        return Ok(None);
    }

    let content = fs::read_to_string(&path)?;
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| MatchError::Integrity(format!("malformed {}: {}", MANIFEST_FILE, e)))
}

/// Read a `{keyword: name}` object. A missing file is an empty mapping.
#[inline]
pub fn read_display_names(path: &Path) -> crate::Result<HashMap<String, String>> {
    if !path.is_file() {
        return Ok(HashMap::new());
    }

    let content = fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|e| {
        MatchError::Integrity(format!("malformed {}: {}", path.display(), e))
    })
}

fn read_documents(path: &Path) -> crate::Result<Vec<Document>> {
    let reader = BufReader::new(fs::File::open(path)?);
    let mut documents = Vec::new();

    for (line_number, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let document: Document = serde_json::from_str(&line).map_err(|e| {
            MatchError::Integrity(format!(
                "{} line {}: {}",
                DOCUMENTS_FILE,
                line_number + 1,
                e
            ))
        })?;
        documents.push(document);
    }

    Ok(documents)
}

fn encode_vectors(store: &VectorRecordStore) -> Vec<u8> {
    let values = store.as_flat();
    let mut bytes = Vec::with_capacity(HEADER_LEN + values.len() * F32_LEN);
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&(store.len() as u64).to_le_bytes());
    bytes.extend_from_slice(&(store.dimension() as u32).to_le_bytes());
    for &value in values {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

fn decode_vectors(bytes: &[u8]) -> crate::Result<(usize, Vec<f32>)> {
    let (header, body) = bytes
        .split_at_checked(HEADER_LEN)
        .ok_or_else(|| MatchError::Integrity(format!("{} is truncated", VECTORS_FILE)))?;

    let (magic, rest) = header.split_at(MAGIC.len());
    if magic != MAGIC {
        return Err(MatchError::Integrity(format!(
            "{} has an unknown format",
            VECTORS_FILE
        )));
    }

    let (count_bytes, dimension_bytes) = rest.split_at(8);
    let count = u64::from_le_bytes(
        count_bytes
            .try_into()
            .map_err(|_| MatchError::Integrity("bad record count".to_string()))?,
    );
    let dimension = u32::from_le_bytes(
        dimension_bytes
            .try_into()
            .map_err(|_| MatchError::Integrity("bad dimension".to_string()))?,
    );

    let expected_len = usize::try_from(count)
        .ok()
        .and_then(|count| count.checked_mul(dimension as usize))
        .and_then(|values| values.checked_mul(F32_LEN))
        .ok_or_else(|| MatchError::Integrity("record count overflows".to_string()))?;
    if body.len() != expected_len {
        return Err(MatchError::Integrity(format!(
            "{} header promises {} bytes of vectors, found {}",
            VECTORS_FILE,
            expected_len,
            body.len()
        )));
    }

    let mut values = Vec::with_capacity(body.len() / F32_LEN);
    for chunk in body.chunks_exact(F32_LEN) {
        let value = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        if !value.is_finite() {
            return Err(MatchError::Integrity(format!(
                "{} contains non-finite values",
                VECTORS_FILE
            )));
        }
        values.push(value);
    }

    Ok((dimension as usize, values))
}

fn write_atomically<F>(path: &Path, write: F) -> crate::Result<()>
where
    F: FnOnce(&mut BufWriter<fs::File>) -> crate::Result<()>,
{
    let tmp_path = path.with_extension(path.extension().map_or_else(
        || "tmp".to_string(),
        |ext| format!("{}.tmp", ext.to_string_lossy()),
    ));

    if let Err(e) = write_file(&tmp_path, write) {
        warn!("Discarding partial write of {}", path.display());
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }

    fs::rename(&tmp_path, path)?;
    debug!("Wrote {}", path.display());
    Ok(())
}

fn write_file<F>(path: &Path, write: F) -> crate::Result<()>
where
    F: FnOnce(&mut BufWriter<fs::File>) -> crate::Result<()>,
{
    let mut writer = BufWriter::new(fs::File::create(path)?);
    write(&mut writer)?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(())
}

fn remove_if_present(path: &Path) -> crate::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
