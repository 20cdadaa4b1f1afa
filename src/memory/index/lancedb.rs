use super::VectorIndex;
use crate::memory::types::{IndexEntry, ScoredId, format_timestamp, parse_timestamp};
use crate::memory::vector::{distance_to_score, rank_hits};

use anyhow::Context;
use async_trait::async_trait;

use arrow_array::builder::{FixedSizeListBuilder, Float32Builder};
use arrow_array::{Array, Float32Array, RecordBatch, RecordBatchIterator, StringArray};
use arrow_schema::{DataType, Field, Schema, SchemaRef};

use futures_util::TryStreamExt;
use lancedb::Table;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use tokio::sync::OnceCell;

use std::path::{Path, PathBuf};
use std::sync::Arc;

const TABLE_NAME: &str = "memory_vectors";
const LANCE_DISTANCE_COL: &str = "_distance";

/// Local LanceDB table keyed by memory id, searched with cosine distance.
pub struct LanceDbVectorIndex {
    db_dir: PathBuf,
    schema: SchemaRef,
    dims: i32,
    table: OnceCell<Table>,
}

impl LanceDbVectorIndex {
    pub fn new(workspace_dir: &Path, dims: usize) -> anyhow::Result<Self> {
        let dims_i32 =
            i32::try_from(dims).with_context(|| format!("Invalid embedding dimension: {dims}"))?;
        anyhow::ensure!(
            dims_i32 > 0,
            "LanceDB vector index requires embeddings (embedding_dimensions > 0)"
        );

        let db_dir = workspace_dir.join("memory").join("lancedb");
        std::fs::create_dir_all(&db_dir)
            .with_context(|| format!("Failed to create LanceDB dir: {}", db_dir.display()))?;

        let embedding_field = Field::new("item", DataType::Float32, true);
        let schema = Arc::new(Schema::new(vec![
            Field::new("memory_id", DataType::Utf8, false),
            Field::new("owner", DataType::Utf8, false),
            Field::new("updated_at", DataType::Utf8, false),
            Field::new(
                "embedding",
                DataType::FixedSizeList(Arc::new(embedding_field), dims_i32),
                false,
            ),
        ]));

        Ok(Self {
            db_dir,
            schema,
            dims: dims_i32,
            table: OnceCell::new(),
        })
    }

    async fn table(&self) -> anyhow::Result<&Table> {
        self.table
            .get_or_try_init(|| async {
                let uri = self.db_dir.to_string_lossy().to_string();
                let conn = lancedb::connect(&uri)
                    .execute()
                    .await
                    .with_context(|| format!("Failed to connect to LanceDB at {uri}"))?;

                match conn.open_table(TABLE_NAME).execute().await {
                    Ok(t) => Ok(t),
                    Err(_) => conn
                        .create_empty_table(TABLE_NAME, self.schema.clone())
                        .execute()
                        .await
                        .context("Failed to create empty LanceDB vector table"),
                }
            })
            .await
    }

    fn sql_eq(column: &str, value: &str) -> String {
        let v = value.replace('\'', "''");
        format!("{column} = '{v}'")
    }

    fn build_entry_batch(&self, entry: &IndexEntry) -> anyhow::Result<RecordBatch> {
        let dims = usize::try_from(self.dims)?;
        anyhow::ensure!(
            entry.embedding.len() == dims,
            "Embedding dimension mismatch: got {}, expected {}",
            entry.embedding.len(),
            dims
        );

        let memory_id = Arc::new(StringArray::from(vec![Some(entry.memory_id.as_str())]));
        let owner = Arc::new(StringArray::from(vec![Some(entry.owner.as_str())]));
        let updated_at = Arc::new(StringArray::from(vec![Some(format_timestamp(
            &entry.updated_at,
        ))]));

        let mut emb_builder = FixedSizeListBuilder::new(Float32Builder::new(), self.dims);
        emb_builder.values().append_slice(&entry.embedding);
        emb_builder.append(true);
        let embedding = Arc::new(emb_builder.finish());

        let cols: Vec<Arc<dyn Array>> = vec![memory_id, owner, updated_at, embedding];
        Ok(RecordBatch::try_new(self.schema.clone(), cols)?)
    }
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> anyhow::Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .with_context(|| format!("LanceDB batch missing string column '{name}'"))
}

fn parse_hits(batch: &RecordBatch) -> anyhow::Result<Vec<ScoredId>> {
    let ids = string_column(batch, "memory_id")?;
    let updated = string_column(batch, "updated_at")?;
    let distances = batch
        .column_by_name(LANCE_DISTANCE_COL)
        .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
        .context("LanceDB batch missing distance column")?;

    let mut hits = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        hits.push(ScoredId {
            memory_id: ids.value(row).to_string(),
            score: distance_to_score(distances.value(row)),
            updated_at: parse_timestamp(updated.value(row))?,
        });
    }
    Ok(hits)
}

#[async_trait]
impl VectorIndex for LanceDbVectorIndex {
    fn name(&self) -> &str {
        "lancedb"
    }

    async fn upsert(&self, entry: &IndexEntry) -> anyhow::Result<()> {
        let table = self.table().await?;
        let batch = self.build_entry_batch(entry)?;

        let schema = batch.schema();
        let reader = RecordBatchIterator::new([Ok(batch)].into_iter(), schema);

        let mut merge_insert = table.merge_insert(&["memory_id"]);
        merge_insert
            .when_matched_update_all(None)
            .when_not_matched_insert_all();
        merge_insert
            .execute(Box::new(reader))
            .await
            .context("LanceDB merge_insert failed")?;
        Ok(())
    }

    async fn delete(&self, memory_id: &str) -> anyhow::Result<()> {
        let table = self.table().await?;
        table
            .delete(&Self::sql_eq("memory_id", memory_id))
            .await
            .context("LanceDB delete failed")?;
        Ok(())
    }

    async fn query(&self, owner: &str, vector: &[f32], k: usize) -> anyhow::Result<Vec<ScoredId>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let table = self.table().await?;
        let mut stream = table
            .query()
            .only_if(Self::sql_eq("owner", owner))
            .nearest_to(vector)?
            .column("embedding")
            .distance_type(lancedb::DistanceType::Cosine)
            .limit(k)
            .select(Select::columns(&[
                "memory_id",
                "updated_at",
                LANCE_DISTANCE_COL,
            ]))
            .execute()
            .await
            .context("LanceDB vector search failed")?;

        let mut hits = Vec::new();
        while let Some(batch) = stream.try_next().await? {
            hits.extend(parse_hits(&batch)?);
        }
        rank_hits(&mut hits, k);
        Ok(hits)
    }

    async fn ids_for_owner(&self, owner: &str) -> anyhow::Result<Vec<String>> {
        let table = self.table().await?;
        let mut stream = table
            .query()
            .only_if(Self::sql_eq("owner", owner))
            .select(Select::columns(&["memory_id"]))
            .execute()
            .await
            .context("LanceDB owner scan failed")?;

        let mut ids = Vec::new();
        while let Some(batch) = stream.try_next().await? {
            let col = string_column(&batch, "memory_id")?;
            ids.extend((0..batch.num_rows()).map(|row| col.value(row).to_string()));
        }
        ids.sort();
        Ok(ids)
    }

    async fn health_check(&self) -> bool {
        match self.table().await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!("lancedb health check failed: {e:#}");
                false
            }
        }
    }
}
