//! SQL generation for the pgvector catalog.
//!
//! Builders are pure so the exact statement text can be asserted in tests.
//! User-provided values are always bound as parameters; only column names
//! and configured brand weights are inlined.

use super::CatalogQuery;
use crate::brand::BrandWeightTable;
use crate::catalog::pg_store::TableName;

pub const PRODUCT_COLUMNS: &str = "produto_id, source_url, image_url, brand, btus, ciclo, \
    voltagem, tecnologia, type, content, sale_price, length, weight, width, height, \
    (stock = 1) AS in_stock";

/// Bound value, converted to a `ToSql` type at execution time.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Embedding(Vec<f32>),
    Text(String),
    Int(i32),
    Float(f64),
    Limit(i64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SqlQuery {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

struct WhereBuilder {
    clauses: Vec<String>,
    params: Vec<SqlParam>,
}

impl WhereBuilder {
    fn new(params: Vec<SqlParam>) -> Self {
        Self {
            clauses: vec!["stock = 1".to_string()],
            params,
        }
    }

    fn bind(&mut self, param: SqlParam) -> String {
        self.params.push(param);
        format!("${}", self.params.len())
    }

    fn push(&mut self, clause: String) {
        self.clauses.push(clause);
    }

    fn apply(&mut self, query: &CatalogQuery, allow_unknown_capacity: bool) {
        if let Some(range) = query.capacity {
            let min = self.bind(SqlParam::Int(range.min as i32));
            let max = self.bind(SqlParam::Int(range.max as i32));
            if allow_unknown_capacity {
                self.push(format!("(btus >= {} AND btus <= {} OR btus = 0)", min, max));
            } else {
                self.push(format!("(btus >= {} AND btus <= {})", min, max));
            }
        }

        for (key, value) in query.filters.iter() {
            let placeholder = self.bind(SqlParam::Text(format!("%{}%", value)));
            let op = if key.is_negated() { "NOT ILIKE" } else { "ILIKE" };
            self.push(format!("{} {} {}", key.column(), op, placeholder));
        }

        if let Some(brand) = &query.exclude_brand {
            let placeholder = self.bind(SqlParam::Text(format!("%{}%", brand)));
            self.push(format!("brand NOT ILIKE {}", placeholder));
        }
    }

    fn finish(self) -> (String, Vec<SqlParam>) {
        (self.clauses.join(" AND "), self.params)
    }
}

/// Attribute-only search ordered by capacity.
pub fn metadata_sql(table: &TableName, query: &CatalogQuery, limit: usize) -> SqlQuery {
    let mut builder = WhereBuilder::new(Vec::new());
    builder.apply(query, false);
    let limit_ph = builder.bind(SqlParam::Limit(limit as i64));
    let (where_clause, params) = builder.finish();

    let sql = format!(
        "SELECT * FROM (\
            SELECT DISTINCT ON (produto_id) {columns}, 0::float8 AS score \
            FROM {table} \
            WHERE {where_clause} \
            ORDER BY produto_id, btus ASC\
        ) sub \
        ORDER BY btus ASC, produto_id ASC \
        LIMIT {limit_ph}",
        columns = PRODUCT_COLUMNS,
        table = table.qualified(),
    );
    SqlQuery { sql, params }
}

/// Single-brand search ordered by distance, no similarity threshold.
pub fn brand_sql(
    table: &TableName,
    brand: &str,
    embedding: &[f32],
    query: &CatalogQuery,
    limit: usize,
) -> SqlQuery {
    let mut builder = WhereBuilder::new(vec![SqlParam::Embedding(embedding.to_vec())]);
    let brand_ph = builder.bind(SqlParam::Text(format!("%{}%", brand)));
    builder.push(format!("brand ILIKE {}", brand_ph));
    builder.apply(query, true);
    let limit_ph = builder.bind(SqlParam::Limit(limit as i64));
    let (where_clause, params) = builder.finish();

    let sql = format!(
        "SELECT * FROM (\
            SELECT DISTINCT ON (produto_id) {columns}, \
                   1 - (embedding <=> $1) AS score, \
                   embedding <=> $1 AS sort_val \
            FROM {table} \
            WHERE {where_clause} \
            ORDER BY produto_id, sort_val ASC\
        ) sub \
        ORDER BY sort_val ASC, produto_id ASC \
        LIMIT {limit_ph}",
        columns = PRODUCT_COLUMNS,
        table = table.qualified(),
    );
    SqlQuery { sql, params }
}

/// Brand-weighted similarity search. Lower `sort_val` ranks first.
pub fn similar_sql(
    table: &TableName,
    embedding: &[f32],
    query: &CatalogQuery,
    min_score: f32,
    weights: &BrandWeightTable,
    limit: usize,
) -> SqlQuery {
    let mut builder = WhereBuilder::new(vec![SqlParam::Embedding(embedding.to_vec())]);
    if min_score > 0.0 {
        let score_ph = builder.bind(SqlParam::Float(f64::from(min_score)));
        builder.push(format!("1 - (embedding <=> $1) > {}", score_ph));
    }
    builder.apply(query, true);

    let mut case_expr = String::from("CASE ");
    for (brand, weight) in weights.iter() {
        let brand_ph = builder.bind(SqlParam::Text(format!("%{}%", brand)));
        case_expr.push_str(&format!("WHEN brand ILIKE {} THEN {:.6} ", brand_ph, weight));
    }
    case_expr.push_str("ELSE 1.0 END");

    let limit_ph = builder.bind(SqlParam::Limit(limit as i64));
    let (where_clause, params) = builder.finish();

    let sql = format!(
        "SELECT * FROM (\
            SELECT DISTINCT ON (produto_id) {columns}, \
                   1 - (embedding <=> $1) AS score, \
                   (embedding <=> $1) * ({case_expr}) AS sort_val \
            FROM {table} \
            WHERE {where_clause} \
            ORDER BY produto_id, sort_val ASC\
        ) sub \
        ORDER BY sort_val ASC, produto_id ASC \
        LIMIT {limit_ph}",
        columns = PRODUCT_COLUMNS,
        table = table.qualified(),
    );
    SqlQuery { sql, params }
}

pub fn chunks_sql(table: &TableName) -> String {
    format!(
        "SELECT content FROM {} WHERE produto_id = $1 ORDER BY created_at ASC",
        table.qualified()
    )
}
