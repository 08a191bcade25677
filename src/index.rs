//! Vector index artifact: build, open, search.
//!
//! The index is a single SQLite file at `[index].path` holding every chunk
//! and its embedding vector, plus a one-row metadata table recording which
//! embedding model produced the vectors. Exactly one index exists per
//! knowledge base; a rebuild writes a fresh file next to the old one and
//! renames it into place, so the prior index stays authoritative until a
//! complete replacement exists.
//!
//! The file's absence is a meaningful state — "knowledge base not processed
//! yet" — which callers check with [`index_exists`] before attempting a
//! search.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use uuid::Uuid;

use crate::config::Config;
use crate::embedding;
use crate::models::Chunk;

/// A chunk returned from a similarity search.
#[derive(Debug, Clone)]
pub struct Retrieved {
    pub chunk_index: i64,
    pub text: String,
    pub score: f64,
}

/// Index metadata recorded at build time.
#[derive(Debug, Clone)]
pub struct IndexMeta {
    pub model: String,
    pub dims: usize,
    pub chunk_count: i64,
    pub built_at: i64,
}

/// Whether an index artifact exists. This is the gate between "can chat"
/// and "please process the knowledge base first".
pub fn index_exists(config: &Config) -> bool {
    config.index.path.exists()
}

/// Build a fresh index from chunks and their vectors, atomically replacing
/// any prior artifact.
///
/// Fails loudly (and leaves any existing index untouched) when the chunk
/// list is empty or the vectors don't line up with the chunks.
pub async fn build_index(
    config: &Config,
    chunks: &[Chunk],
    vectors: &[Vec<f32>],
    model: &str,
    dims: usize,
) -> Result<()> {
    if chunks.is_empty() {
        bail!("No chunks to index; refusing to write an empty index");
    }
    if chunks.len() != vectors.len() {
        bail!(
            "Chunk/vector count mismatch: {} chunks, {} vectors",
            chunks.len(),
            vectors.len()
        );
    }

    let final_path = &config.index.path;
    if let Some(parent) = final_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_path = tmp_index_path(final_path);
    if tmp_path.exists() {
        std::fs::remove_file(&tmp_path)
            .with_context(|| format!("Failed to clear stale temp index {}", tmp_path.display()))?;
    }

    let pool = connect_at(&tmp_path).await?;
    let write_result = write_index(&pool, chunks, vectors, model, dims).await;
    pool.close().await;

    if let Err(e) = write_result {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(e);
    }

    std::fs::rename(&tmp_path, final_path).with_context(|| {
        format!(
            "Failed to move new index into place at {}",
            final_path.display()
        )
    })?;

    Ok(())
}

/// Open the persisted index, verifying it exists and was built with a
/// compatible embedding configuration. Callers close the pool when done.
pub async fn open_index(config: &Config) -> Result<SqlitePool> {
    if !index_exists(config) {
        bail!(
            "Knowledge base not processed yet: no index at {}",
            config.index.path.display()
        );
    }

    let pool = connect_at(&config.index.path).await?;
    let meta = read_meta(&pool).await?;

    if meta.model != config.embedding.model || meta.dims != config.embedding.dims {
        pool.close().await;
        bail!(
            "Index was built with embedding model {} ({} dims) but config specifies {} ({} dims); \
             reprocess the knowledge base",
            meta.model,
            meta.dims,
            config.embedding.model,
            config.embedding.dims
        );
    }

    Ok(pool)
}

/// Read the metadata row of an open index.
pub async fn read_meta(pool: &SqlitePool) -> Result<IndexMeta> {
    let row = sqlx::query("SELECT model, dims, chunk_count, built_at FROM index_meta WHERE id = 1")
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Index is missing its metadata row"))?;

    Ok(IndexMeta {
        model: row.get("model"),
        dims: row.get::<i64, _>("dims") as usize,
        chunk_count: row.get("chunk_count"),
        built_at: row.get("built_at"),
    })
}

/// Return the `k` chunks nearest to `query_vec` by cosine similarity.
///
/// Scans every stored vector and ranks in Rust — exact top-k, no
/// approximation, which is the right trade at knowledge-base scale.
/// Ties break on chunk order so results are deterministic.
pub async fn search(pool: &SqlitePool, query_vec: &[f32], k: usize) -> Result<Vec<Retrieved>> {
    let rows = sqlx::query(
        r#"
        SELECT c.chunk_index, c.text, cv.embedding
        FROM chunk_vectors cv
        JOIN chunks c ON c.id = cv.chunk_id
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut scored: Vec<Retrieved> = rows
        .iter()
        .map(|row| {
            let blob: Vec<u8> = row.get("embedding");
            let vec = embedding::blob_to_vec(&blob);
            let score = embedding::cosine_similarity(query_vec, &vec) as f64;
            Retrieved {
                chunk_index: row.get("chunk_index"),
                text: row.get("text"),
                score,
            }
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.chunk_index.cmp(&b.chunk_index))
    });
    scored.truncate(k);

    Ok(scored)
}

fn tmp_index_path(final_path: &Path) -> PathBuf {
    let mut name = final_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "index.sqlite".to_string());
    name.push_str(".tmp");
    final_path.with_file_name(name)
}

/// Open a SQLite pool at `path`. Journal mode stays on rollback journaling
/// so the artifact remains a single file that a rename replaces wholly.
async fn connect_at(path: &Path) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Delete);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}

async fn write_index(
    pool: &SqlitePool,
    chunks: &[Chunk],
    vectors: &[Vec<f32>],
    model: &str,
    dims: usize,
) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE index_meta (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            model TEXT NOT NULL,
            dims INTEGER NOT NULL,
            chunk_count INTEGER NOT NULL,
            built_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE chunks (
            id TEXT PRIMARY KEY,
            chunk_index INTEGER NOT NULL UNIQUE,
            text TEXT NOT NULL,
            hash TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE chunk_vectors (
            chunk_id TEXT PRIMARY KEY,
            embedding BLOB NOT NULL,
            FOREIGN KEY (chunk_id) REFERENCES chunks(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    let mut tx = pool.begin().await?;

    sqlx::query("INSERT INTO index_meta (id, model, dims, chunk_count, built_at) VALUES (1, ?, ?, ?, ?)")
        .bind(model)
        .bind(dims as i64)
        .bind(chunks.len() as i64)
        .bind(Utc::now().timestamp())
        .execute(&mut *tx)
        .await?;

    for (chunk, vec) in chunks.iter().zip(vectors.iter()) {
        let id = Uuid::new_v4().to_string();
        let hash = text_hash(&chunk.text);

        sqlx::query("INSERT INTO chunks (id, chunk_index, text, hash) VALUES (?, ?, ?, ?)")
            .bind(&id)
            .bind(chunk.chunk_index)
            .bind(&chunk.text)
            .bind(&hash)
            .execute(&mut *tx)
            .await?;

        sqlx::query("INSERT INTO chunk_vectors (chunk_id, embedding) VALUES (?, ?)")
            .bind(&id)
            .bind(embedding::vec_to_blob(vec))
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(())
}

fn text_hash(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
