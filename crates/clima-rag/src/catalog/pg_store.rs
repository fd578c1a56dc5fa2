//! Postgres + pgvector catalog.

use anyhow::{Context, Result};
use async_trait::async_trait;
use pgvector::Vector;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, NoTls, Row};

use super::query::{self, SqlParam, SqlQuery};
use super::{CatalogQuery, CatalogStore};
use crate::brand::BrandWeightTable;
use crate::config::CatalogConfig;
use crate::types::{CandidateProduct, Dimensions};

/// Fully-qualified Postgres table name (schema + table).
#[derive(Debug, Clone)]
pub struct TableName {
    schema: String,
    table: String,
}

impl TableName {
    pub fn new<S, T>(schema: S, table: T) -> Result<Self>
    where
        S: Into<String>,
        T: Into<String>,
    {
        let schema = schema.into();
        let table = table.into();
        anyhow::ensure!(!schema.trim().is_empty(), "schema name is required");
        anyhow::ensure!(!table.trim().is_empty(), "table name is required");
        Ok(Self { schema, table })
    }

    /// Quoted `schema.table` reference.
    pub fn qualified(&self) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(&self.table))
    }
}

/// Quotes Postgres identifiers, escaping embedded quotes.
pub fn quote_ident(input: &str) -> String {
    format!("\"{}\"", input.replace('"', "\"\""))
}

pub struct PgCatalogStore {
    client: Client,
    table: TableName,
}

impl PgCatalogStore {
    pub fn new(client: Client, table: TableName) -> Self {
        Self { client, table }
    }

    /// Connect and drive the connection on a background task.
    pub async fn connect(config: &CatalogConfig) -> Result<Self> {
        anyhow::ensure!(
            !config.database_url.is_empty(),
            "catalog.database_url is empty (set DATABASE_URL)"
        );
        let table = TableName::new(config.schema.clone(), config.table.clone())?;
        let (client, connection) = tokio_postgres::connect(&config.database_url, NoTls)
            .await
            .context("failed to connect to the catalog database")?;
        tokio::spawn(async move {
            if let Err(err) = connection.await {
                tracing::error!(error = %err, "Catalog connection closed with error");
            }
        });
        tracing::info!(table = %table.qualified(), "Connected to catalog");
        Ok(Self::new(client, table))
    }

    async fn run(&self, stage: &str, query: SqlQuery) -> Result<Vec<CandidateProduct>> {
        tracing::debug!(stage = stage, sql = %query.sql, params = query.params.len(), "Catalog query");

        let owned: Vec<Box<dyn ToSql + Sync + Send>> =
            query.params.into_iter().map(into_sql).collect();
        let refs: Vec<&(dyn ToSql + Sync)> = owned
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect();

        let rows = self
            .client
            .query(query.sql.as_str(), &refs)
            .await
            .with_context(|| format!("{} query failed", stage))?;

        let mut products = Vec::with_capacity(rows.len());
        for row in rows {
            match product_from_row(&row) {
                Ok(product) => products.push(product),
                Err(e) => tracing::warn!(stage = stage, error = %e, "Skipping malformed catalog row"),
            }
        }
        Ok(products)
    }
}

fn into_sql(param: SqlParam) -> Box<dyn ToSql + Sync + Send> {
    match param {
        SqlParam::Embedding(values) => Box::new(Vector::from(values)),
        SqlParam::Text(value) => Box::new(value),
        SqlParam::Int(value) => Box::new(value),
        SqlParam::Float(value) => Box::new(value),
        SqlParam::Limit(value) => Box::new(value),
    }
}

fn text(row: &Row, column: &str) -> Result<String> {
    let value: Option<String> = row
        .try_get(column)
        .with_context(|| format!("column {}", column))?;
    Ok(value.unwrap_or_default())
}

fn real(row: &Row, column: &str) -> Result<f32> {
    let value: Option<f32> = row
        .try_get(column)
        .with_context(|| format!("column {}", column))?;
    Ok(value.unwrap_or_default())
}

fn product_from_row(row: &Row) -> Result<CandidateProduct> {
    let capacity: Option<i32> = row.try_get("btus").context("column btus")?;
    let score: Option<f64> = row.try_get("score").context("column score")?;
    let in_stock: Option<bool> = row.try_get("in_stock").context("column in_stock")?;

    Ok(CandidateProduct {
        product_id: text(row, "produto_id")?,
        brand: text(row, "brand")?,
        capacity: capacity.unwrap_or(0).max(0) as u32,
        cycle: text(row, "ciclo")?,
        voltage: text(row, "voltagem")?,
        technology: text(row, "tecnologia")?,
        product_type: text(row, "type")?,
        content: text(row, "content")?,
        similarity: score.unwrap_or(0.0) as f32,
        sale_price: real(row, "sale_price")?,
        dimensions: Dimensions {
            length: real(row, "length")?,
            weight: real(row, "weight")?,
            width: real(row, "width")?,
            height: real(row, "height")?,
        },
        in_stock: in_stock.unwrap_or(false),
        source_url: text(row, "source_url")?,
        image_url: text(row, "image_url")?,
    })
}

#[async_trait]
impl CatalogStore for PgCatalogStore {
    async fn search_by_metadata(
        &self,
        query: &CatalogQuery,
        limit: usize,
    ) -> Result<Vec<CandidateProduct>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        self.run("metadata", query::metadata_sql(&self.table, query, limit))
            .await
    }

    async fn search_by_brand(
        &self,
        brand: &str,
        query: &CatalogQuery,
        embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<CandidateProduct>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        self.run(
            "brand",
            query::brand_sql(&self.table, brand, embedding, query, limit),
        )
        .await
    }

    async fn search_similar(
        &self,
        embedding: &[f32],
        query: &CatalogQuery,
        min_score: f32,
        weights: &BrandWeightTable,
        limit: usize,
    ) -> Result<Vec<CandidateProduct>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        self.run(
            "semantic",
            query::similar_sql(&self.table, embedding, query, min_score, weights, limit),
        )
        .await
    }

    async fn product_chunks(&self, product_id: &str) -> Result<Vec<String>> {
        let sql = query::chunks_sql(&self.table);
        let rows = self
            .client
            .query(sql.as_str(), &[&product_id])
            .await
            .with_context(|| format!("failed to load chunks for product {}", product_id))?;
        rows.iter()
            .map(|row| text(row, "content"))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("product_knowledge"), "\"product_knowledge\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_table_name_requires_parts() {
        assert!(TableName::new("", "t").is_err());
        assert!(TableName::new("public", " ").is_err());
        assert_eq!(
            TableName::new("public", "product_knowledge").unwrap().qualified(),
            "\"public\".\"product_knowledge\""
        );
    }
}
