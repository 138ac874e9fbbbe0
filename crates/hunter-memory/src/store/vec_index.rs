//! Native-index strategy backed by the `sqlite-vec` extension.
//!
//! `issue_history` stays the source of truth (blob column included, so the
//! database remains readable by [`super::ScanStore`]). Each embedding of the
//! configured dimension is mirrored into the `issue_embeddings` `vec0`
//! table under the same rowid, and searches are answered with a KNN query
//! joined back onto the history rows.

use std::sync::Once;

use async_trait::async_trait;
use hunter_types::Experience;
use rusqlite::{Connection, params};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::sqlite::{self, Db, NewExperience};
use super::{Backend, ExperienceStore};
use crate::codec;
use crate::error::MemoryError;
use crate::rules::{self, NewRule};
use crate::similarity;

/// Register sqlite-vec for every connection opened by this process.
fn ensure_sqlite_vec_loaded() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        // SAFETY: `sqlite3_vec_init` is the extension entry point statically
        // linked by the sqlite-vec crate; auto-extension registration is its
        // documented loading mechanism.
        unsafe {
            rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
                sqlite_vec::sqlite3_vec_init as *const (),
            )));
        }
    });
}

/// Largest `k` sqlite-vec accepts in a KNN query; larger limits are capped.
const MAX_KNN_K: usize = 4096;

const KNN_QUERY: &str = "
    WITH knn AS (
        SELECT rowid, distance FROM issue_embeddings
        WHERE embedding MATCH ?1 AND k = ?2
    )
    SELECT h.id, h.task_signature, h.error_pattern, h.root_cause, h.solution_summary,
           h.embedding, h.occurred_at, knn.distance
    FROM knn JOIN issue_history h ON h.id = knn.rowid
    ORDER BY knn.distance, h.id";

/// Convert a cosine distance into a similarity figure. The engine reports
/// no distance for zero-magnitude vectors.
fn similarity_from_distance(distance: Option<f64>) -> f32 {
    let Some(distance) = distance else { return 0.0 };
    let similarity = (1.0 - distance) as f32;
    if similarity.is_finite() { similarity } else { 0.0 }
}

/// SQLite store that delegates ranking to a `vec0` cosine index.
pub struct VecIndexStore {
    db: Db,
    dimension: usize,
}

impl VecIndexStore {
    /// Open (or create) the database at `path` with an index of `dimension`
    /// floats, backfilling any history rows the index does not cover yet.
    pub fn open(path: &str, dimension: usize) -> Result<Self, MemoryError> {
        ensure_sqlite_vec_loaded();
        let conn = sqlite::open_connection(path)?;
        conn.execute_batch(&format!(
            "CREATE VIRTUAL TABLE IF NOT EXISTS issue_embeddings USING vec0(
                embedding float[{dimension}] distance_metric=cosine
            );"
        ))?;
        let backfilled = backfill_index(&conn, dimension)?;
        if backfilled > 0 {
            info!(backfilled, dimension, "indexed existing experiences");
        }
        Ok(Self { db: Db::new(conn), dimension })
    }

    pub fn open_in_memory(dimension: usize) -> Result<Self, MemoryError> {
        Self::open(":memory:", dimension)
    }
}

/// Index history rows of the right dimension that have no index entry yet.
/// Zero-magnitude vectors stay unindexed: cosine distance is undefined for them.
fn backfill_index(conn: &Connection, dimension: usize) -> Result<usize, MemoryError> {
    let byte_len = (dimension * std::mem::size_of::<f32>()) as i64;
    let pending: Vec<(i64, Vec<u8>)> = {
        let mut stmt = conn.prepare(
            "SELECT id, embedding FROM issue_history
             WHERE embedding IS NOT NULL
               AND length(embedding) = ?1
               AND id NOT IN (SELECT rowid FROM issue_embeddings)
             ORDER BY id",
        )?;
        let rows = stmt.query_map(params![byte_len], |row| Ok((row.get(0)?, row.get(1)?)))?;
        rows.collect::<Result<_, _>>()?
    };
    if pending.is_empty() {
        return Ok(0);
    }

    let tx = conn.unchecked_transaction()?;
    let mut inserted = 0;
    let mut zero = 0;
    for (id, blob) in pending {
        if similarity::is_zero_magnitude(&codec::decode(&blob)?) {
            zero += 1;
            continue;
        }
        tx.execute("INSERT INTO issue_embeddings (rowid, embedding) VALUES (?1, ?2)", params![id, blob])?;
        inserted += 1;
    }
    tx.commit()?;
    if zero > 0 {
        warn!(skipped = zero, "zero-magnitude embeddings left out of the index");
    }
    Ok(inserted)
}

#[async_trait]
impl ExperienceStore for VecIndexStore {
    #[instrument(skip_all)]
    async fn active_rules(&self, cancel: &CancellationToken) -> Result<Vec<String>, MemoryError> {
        self.db
            .read(cancel, |conn| {
                Ok(rules::load_active_rules(conn)?.into_iter().map(|r| r.rule_content).collect())
            })
            .await
    }

    #[instrument(skip_all, fields(limit = limit, dimension = query.len()))]
    async fn search_similar(
        &self,
        query: &[f32],
        limit: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<Experience>, MemoryError> {
        if query.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        if query.len() != self.dimension {
            debug!(expected = self.dimension, "query dimension does not match index");
            return Ok(Vec::new());
        }
        if similarity::is_zero_magnitude(query) {
            debug!("zero-magnitude query has no nearest neighbours");
            return Ok(Vec::new());
        }
        let blob = codec::encode(query);
        let k = limit.min(MAX_KNN_K) as i64;
        let hits = self
            .db
            .read(cancel, move |conn| {
                let mut stmt = conn.prepare(KNN_QUERY)?;
                let rows = stmt.query_map(params![blob, k], |row| {
                    let (experience, embedding) = sqlite::experience_from_row(row)?;
                    let distance: Option<f64> = row.get(7)?;
                    Ok((experience, embedding, distance))
                })?;
                let mut out = Vec::new();
                for row in rows {
                    let (experience, embedding, distance) = row?;
                    let mut experience = sqlite::with_embedding(experience, embedding);
                    experience.similarity = Some(similarity_from_distance(distance));
                    out.push(experience);
                }
                Ok(out)
            })
            .await?;
        debug!(returned = hits.len(), "index search complete");
        Ok(hits)
    }

    #[instrument(skip_all, fields(dimension = vector.map_or(0, <[f32]>::len)))]
    async fn save(
        &self,
        pattern: &str,
        cause: &str,
        solution: &str,
        vector: Option<&[f32]>,
        cancel: &CancellationToken,
    ) -> Result<(), MemoryError> {
        let record = NewExperience::prepare(pattern, cause, solution, vector)?;
        let indexable = match record.embedding.as_deref() {
            Some(v) if v.len() != self.dimension => {
                warn!(expected = self.dimension, actual = v.len(), "embedding dimension mismatch; saving without index entry");
                None
            }
            Some(v) if similarity::is_zero_magnitude(v) => {
                warn!("zero-magnitude embedding; saving without index entry");
                None
            }
            Some(v) => Some(codec::encode(v)),
            None => None,
        };
        let id = self
            .db
            .write(cancel, move |tx| {
                let id = record.insert(tx)?;
                if let Some(blob) = indexable {
                    tx.execute(
                        "INSERT INTO issue_embeddings (rowid, embedding) VALUES (?1, ?2)",
                        params![id, blob],
                    )?;
                }
                Ok(id)
            })
            .await?;
        debug!(id, "experience saved");
        Ok(())
    }

    async fn seed_rules(&self, seed: &[NewRule], cancel: &CancellationToken) -> Result<usize, MemoryError> {
        let seed = seed.to_vec();
        self.db.write(cancel, move |tx| rules::seed_rules(tx, &seed)).await
    }

    fn backend(&self) -> Backend {
        Backend::VecIndex
    }

    fn close(&self) {
        self.db.close();
    }
}
