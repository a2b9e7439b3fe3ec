//! LanceDB embedding index for clause and feedback vectors.
//!
//! One table holds every embedding, keyed by the composite string id the
//! lifecycle assigns (`{document}:{clause}`, `feedback:{document}:{fb}`),
//! with a `kind` column usable as a search filter. The embedding dimension
//! is fixed when the table is created and checked on every reopen; vectors
//! are unit-length, so L2 ordering matches cosine ordering and the
//! distance column converts directly to a similarity score.

use std::path::Path;
use std::sync::Arc;

use arrow::array::{
    Array, FixedSizeListBuilder, Float32Array, Float32Builder, LargeStringArray,
    RecordBatchIterator, StringArray, StringBuilder,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use tracing::info;
use uuid::Uuid;

use covenant_core::{DocumentId, EmbeddingKind, EmbeddingRecord, PortError, SimilarMatch, VectorIndex};

use crate::StoreError;

const EMBEDDINGS_TABLE: &str = "nda_embeddings";

/// LanceDB-backed [`VectorIndex`].
pub struct LanceIndex {
    table: lancedb::Table,
    dim: usize,
}

impl LanceIndex {
    /// Connect to (or create) the embedding table at the given path.
    ///
    /// An existing table must carry the same embedding dimension; the
    /// encoder and the index are created as a pair and must stay one.
    pub async fn open(path: &Path, dim: usize) -> Result<Self, StoreError> {
        let uri = path
            .to_str()
            .ok_or_else(|| StoreError::Other("non-UTF8 index path".into()))?;
        let db = lancedb::connect(uri).execute().await?;

        let existing = db.table_names().execute().await?;
        let table = if existing.contains(&EMBEDDINGS_TABLE.to_string()) {
            let table = db.open_table(EMBEDDINGS_TABLE).execute().await?;
            let schema = table.schema().await?;
            let field = schema
                .field_with_name("embedding")
                .map_err(|e| StoreError::Other(format!("embedding column missing: {e}")))?;
            let stored_dim = match field.data_type() {
                DataType::FixedSizeList(_, n) => *n as usize,
                other => {
                    return Err(StoreError::Other(format!(
                        "embedding column has type {other:?}, expected FixedSizeList"
                    )));
                }
            };
            if stored_dim != dim {
                return Err(StoreError::Other(format!(
                    "index dimension {stored_dim} does not match encoder dimension {dim}"
                )));
            }
            table
        } else {
            let table = db
                .create_empty_table(EMBEDDINGS_TABLE, embedding_schema(dim))
                .execute()
                .await?;
            info!(dim, "created embedding table");
            table
        };

        Ok(Self { table, dim })
    }
}

fn embedding_schema(dim: usize) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("document_id", DataType::Utf8, false),
        Field::new("kind", DataType::Utf8, false),
        Field::new("text", DataType::Utf8, false),
        Field::new(
            "embedding",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, true)),
                dim as i32,
            ),
            true,
        ),
    ]))
}

fn record_batch(record: &EmbeddingRecord, dim: usize) -> Result<RecordBatch, PortError> {
    let mut id = StringBuilder::new();
    let mut document_id = StringBuilder::new();
    let mut kind = StringBuilder::new();
    let mut text = StringBuilder::new();
    let mut embedding = FixedSizeListBuilder::new(Float32Builder::new(), dim as i32);

    id.append_value(&record.id);
    document_id.append_value(record.document_id.to_string());
    kind.append_value(record.kind.as_str());
    text.append_value(&record.text);
    for &value in &record.vector {
        embedding.values().append_value(value);
    }
    embedding.append(true);

    RecordBatch::try_new(
        embedding_schema(dim),
        vec![
            Arc::new(id.finish()),
            Arc::new(document_id.finish()),
            Arc::new(kind.finish()),
            Arc::new(text.finish()),
            Arc::new(embedding.finish()),
        ],
    )
    .map_err(|e| PortError::fatal(format!("building record batch: {e}")))
}

/// Escape a value for a Lance SQL predicate.
fn sql_literal(value: &str) -> String {
    value.replace('\'', "''")
}

fn lance_err(e: lancedb::Error) -> PortError {
    PortError::transient(format!("lancedb: {e}"))
}

fn get_string(col: &dyn Array, row: usize) -> Option<String> {
    col.as_any()
        .downcast_ref::<StringArray>()
        .map(|arr| arr.value(row).to_string())
        .or_else(|| {
            col.as_any()
                .downcast_ref::<LargeStringArray>()
                .map(|arr| arr.value(row).to_string())
        })
}

fn parse_kind(value: &str) -> Option<EmbeddingKind> {
    match value {
        "clause" => Some(EmbeddingKind::Clause),
        "feedback" => Some(EmbeddingKind::Feedback),
        _ => None,
    }
}

fn matches_from_batches(batches: &[RecordBatch]) -> Result<Vec<SimilarMatch>, PortError> {
    let mut hits = Vec::new();
    for batch in batches {
        let id_col = column(batch, "id")?;
        let doc_col = column(batch, "document_id")?;
        let kind_col = column(batch, "kind")?;
        let text_col = column(batch, "text")?;
        let dist_col = column(batch, "_distance")?;
        let distances = dist_col
            .as_any()
            .downcast_ref::<Float32Array>()
            .ok_or_else(|| PortError::fatal("_distance column is not Float32"))?;

        for row in 0..batch.num_rows() {
            let id = get_string(id_col.as_ref(), row)
                .ok_or_else(|| PortError::fatal("id column is not Utf8"))?;
            let document_id = get_string(doc_col.as_ref(), row)
                .and_then(|s| Uuid::parse_str(&s).ok())
                .ok_or_else(|| PortError::fatal("malformed document_id column"))?;
            let kind = get_string(kind_col.as_ref(), row)
                .and_then(|s| parse_kind(&s))
                .ok_or_else(|| PortError::fatal("malformed kind column"))?;
            let text = get_string(text_col.as_ref(), row).unwrap_or_default();

            // Unit vectors: squared L2 distance d maps to cosine 1 - d/2.
            let score = (1.0 - distances.value(row) / 2.0).clamp(-1.0, 1.0);
            hits.push(SimilarMatch {
                id,
                document_id,
                kind,
                text,
                score,
            });
        }
    }
    Ok(hits)
}

fn column<'a>(
    batch: &'a RecordBatch,
    name: &str,
) -> Result<&'a Arc<dyn Array>, PortError> {
    batch
        .column_by_name(name)
        .ok_or_else(|| PortError::fatal(format!("missing {name:?} column in search result")))
}

#[async_trait]
impl VectorIndex for LanceIndex {
    async fn upsert(&self, record: EmbeddingRecord) -> Result<(), PortError> {
        if record.vector.len() != self.dim {
            return Err(PortError::fatal(format!(
                "embedding dimension {} does not match index dimension {}",
                record.vector.len(),
                self.dim
            )));
        }

        // Delete-then-add keeps composite ids unique across re-analysis.
        self.table
            .delete(&format!("id = '{}'", sql_literal(&record.id)))
            .await
            .map(|_| ())
            .map_err(lance_err)?;

        let batch = record_batch(&record, self.dim)?;
        let schema = batch.schema();
        let reader: Box<dyn arrow::array::RecordBatchReader + Send> =
            Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
        self.table
            .add(reader)
            .execute()
            .await
            .map(|_| ())
            .map_err(lance_err)
    }

    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
        kind: Option<EmbeddingKind>,
    ) -> Result<Vec<SimilarMatch>, PortError> {
        if vector.len() != self.dim {
            return Err(PortError::fatal(format!(
                "query dimension {} does not match index dimension {}",
                vector.len(),
                self.dim
            )));
        }

        let mut query = self.table.vector_search(vector).map_err(lance_err)?;
        if let Some(kind) = kind {
            query = query.only_if(format!("kind = '{}'", kind.as_str()));
        }
        let batches: Vec<RecordBatch> = query
            .limit(top_k)
            .execute()
            .await
            .map_err(lance_err)?
            .try_collect()
            .await
            .map_err(lance_err)?;

        matches_from_batches(&batches)
    }

    async fn remove_document(
        &self,
        document_id: DocumentId,
        kind: EmbeddingKind,
    ) -> Result<(), PortError> {
        self.table
            .delete(&format!(
                "document_id = '{document_id}' AND kind = '{}'",
                kind.as_str()
            ))
            .await
            .map(|_| ())
            .map_err(lance_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const DIM: usize = 4;

    fn record(id: &str, doc: DocumentId, kind: EmbeddingKind, vector: [f32; 4]) -> EmbeddingRecord {
        EmbeddingRecord {
            id: id.to_string(),
            document_id: doc,
            kind,
            text: format!("text for {id}"),
            vector: vector.to_vec(),
        }
    }

    #[tokio::test]
    async fn open_creates_table() {
        let tmp = TempDir::new().unwrap();
        let index = LanceIndex::open(&tmp.path().join("index"), DIM).await;
        assert!(index.is_ok());
    }

    #[tokio::test]
    async fn reopen_with_other_dimension_errors() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("index");
        LanceIndex::open(&path, DIM).await.unwrap();
        let err = LanceIndex::open(&path, DIM * 2).await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn upsert_and_search_ranks_by_similarity() {
        let tmp = TempDir::new().unwrap();
        let index = LanceIndex::open(&tmp.path().join("index"), DIM).await.unwrap();
        let doc = Uuid::new_v4();

        index
            .upsert(record("a", doc, EmbeddingKind::Clause, [1.0, 0.0, 0.0, 0.0]))
            .await
            .unwrap();
        index
            .upsert(record("b", doc, EmbeddingKind::Clause, [0.0, 1.0, 0.0, 0.0]))
            .await
            .unwrap();

        let hits = index
            .search(&[1.0, 0.0, 0.0, 0.0], 2, Some(EmbeddingKind::Clause))
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "a");
        assert!((hits[0].score - 1.0).abs() < 1e-5);
        assert!(hits[0].score > hits[1].score);
        assert_eq!(hits[0].document_id, doc);
    }

    #[tokio::test]
    async fn kind_filter_applies() {
        let tmp = TempDir::new().unwrap();
        let index = LanceIndex::open(&tmp.path().join("index"), DIM).await.unwrap();
        let doc = Uuid::new_v4();

        index
            .upsert(record("c", doc, EmbeddingKind::Clause, [1.0, 0.0, 0.0, 0.0]))
            .await
            .unwrap();
        index
            .upsert(record(
                "f",
                doc,
                EmbeddingKind::Feedback,
                [1.0, 0.0, 0.0, 0.0],
            ))
            .await
            .unwrap();

        let hits = index
            .search(&[1.0, 0.0, 0.0, 0.0], 10, Some(EmbeddingKind::Feedback))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "f");
        assert_eq!(hits[0].kind, EmbeddingKind::Feedback);
    }

    #[tokio::test]
    async fn upsert_replaces_existing_id() {
        let tmp = TempDir::new().unwrap();
        let index = LanceIndex::open(&tmp.path().join("index"), DIM).await.unwrap();
        let doc = Uuid::new_v4();

        index
            .upsert(record("x", doc, EmbeddingKind::Clause, [1.0, 0.0, 0.0, 0.0]))
            .await
            .unwrap();
        index
            .upsert(record("x", doc, EmbeddingKind::Clause, [0.0, 1.0, 0.0, 0.0]))
            .await
            .unwrap();

        let hits = index
            .search(&[0.0, 1.0, 0.0, 0.0], 10, None)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert!((hits[0].score - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn remove_document_drops_only_that_kind() {
        let tmp = TempDir::new().unwrap();
        let index = LanceIndex::open(&tmp.path().join("index"), DIM).await.unwrap();
        let doc = Uuid::new_v4();
        let other = Uuid::new_v4();

        index
            .upsert(record("c1", doc, EmbeddingKind::Clause, [1.0, 0.0, 0.0, 0.0]))
            .await
            .unwrap();
        index
            .upsert(record("f1", doc, EmbeddingKind::Feedback, [1.0, 0.0, 0.0, 0.0]))
            .await
            .unwrap();
        index
            .upsert(record("c2", other, EmbeddingKind::Clause, [1.0, 0.0, 0.0, 0.0]))
            .await
            .unwrap();

        index
            .remove_document(doc, EmbeddingKind::Clause)
            .await
            .unwrap();

        let clauses = index
            .search(&[1.0, 0.0, 0.0, 0.0], 10, Some(EmbeddingKind::Clause))
            .await
            .unwrap();
        assert_eq!(clauses.len(), 1);
        assert_eq!(clauses[0].id, "c2");

        let feedback = index
            .search(&[1.0, 0.0, 0.0, 0.0], 10, Some(EmbeddingKind::Feedback))
            .await
            .unwrap();
        assert_eq!(feedback.len(), 1);
    }

    #[tokio::test]
    async fn wrong_dimension_rejected() {
        let tmp = TempDir::new().unwrap();
        let index = LanceIndex::open(&tmp.path().join("index"), DIM).await.unwrap();
        let err = index.search(&[1.0, 0.0], 5, None).await.unwrap_err();
        assert!(!err.is_transient());
    }
}
