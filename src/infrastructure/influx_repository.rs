// InfluxDB repository implementation
use crate::application::query_repository::QueryRepository;
use crate::domain::error::TelemetryResult;
use crate::domain::series::{Cell, QueryResult, QueryTable};
use crate::domain::timestamp::RawTimestamp;
use crate::infrastructure::config::{prepare_query, QueryConfig};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone)]
pub struct InfluxRepository {
    client: reqwest::Client,
    host: String,
    token: String,
    database: String,
    retention_policy: String,
}

#[derive(Debug, Deserialize)]
struct InfluxQLResponse {
    results: Vec<InfluxQLResult>,
}

#[derive(Debug, Deserialize)]
struct InfluxQLResult {
    #[serde(default)]
    series: Option<Vec<InfluxQLSeries>>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InfluxQLSeries {
    #[allow(dead_code)]
    name: String,
    columns: Vec<String>,
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
    #[serde(default)]
    tags: Option<HashMap<String, String>>,
}

impl InfluxRepository {
    pub fn new(host: String, token: String, database: String, retention_policy: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            host: host.trim_end_matches('/').to_string(),
            token,
            database,
            retention_policy,
        }
    }

    fn build_query_url(&self, query: &str) -> String {
        let encoded_query = urlencoding::encode(query);
        format!(
            "{}/query?db={}&rp={}&q={}",
            self.host, self.database, self.retention_policy, encoded_query
        )
    }

    async fn execute_query(&self, query: &str) -> Result<InfluxQLResponse> {
        let url = self.build_query_url(query);

        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Token {}", self.token))
            .header("Accept", "application/json")
            .send()
            .await
            .context("Failed to send request to InfluxDB")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("InfluxDB query failed with status {}: {}", status, body);
        }

        let data = response
            .json::<InfluxQLResponse>()
            .await
            .context("Failed to parse InfluxDB response")?;

        if let Some(result) = data.results.first() {
            if let Some(error) = &result.error {
                anyhow::bail!("InfluxDB query error: {}", error);
            }
        }

        Ok(data)
    }
}

#[async_trait]
impl QueryRepository for InfluxRepository {
    async fn run_query(&self, query: &QueryConfig) -> Result<QueryResult> {
        let mut vars = HashMap::new();
        vars.insert("hours".to_string(), query.range_hours.to_string());
        let statement = prepare_query(&query.query, &vars);

        tracing::debug!("Executing query {}: {}", query.name, statement);
        let response = self
            .execute_query(&statement)
            .await
            .with_context(|| format!("query {}", query.name))?;

        Ok(to_query_result(response, query))
    }
}

type Row = (RawTimestamp, BTreeMap<String, Option<Cell>>);

/// Reshape InfluxQL series into tables, one per group when grouped.
/// Series landing in the same group are merged on their timestamps.
fn to_query_result(response: InfluxQLResponse, query: &QueryConfig) -> QueryResult {
    let mut groups: BTreeMap<String, Vec<Row>> = BTreeMap::new();

    let series_list = response
        .results
        .into_iter()
        .next()
        .and_then(|r| r.series)
        .unwrap_or_default();

    for series in series_list {
        let group = match &query.group_by {
            Some(tag) => match series.tags.as_ref().and_then(|t| t.get(tag)) {
                Some(value) => value.clone(),
                None => {
                    tracing::warn!("Query {}: series without tag {}, skipped", query.name, tag);
                    continue;
                }
            },
            None => String::new(),
        };

        let Some(time_idx) = series.columns.iter().position(|c| c == "time") else {
            tracing::warn!("Query {}: series without a time column, skipped", query.name);
            continue;
        };

        let rows = groups.entry(group).or_default();
        for row in series.values {
            let Some(time) = row.get(time_idx) else {
                continue;
            };
            // Anything that is not a string or number becomes an unparseable
            // text timestamp and is rejected by the filter at tick time
            let time = RawTimestamp::from_json(time)
                .unwrap_or_else(|_| RawTimestamp::Text(time.to_string()));

            let values = series
                .columns
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != time_idx)
                .map(|(i, name)| {
                    let column = query.rename.get(name).unwrap_or(name).clone();
                    (column, row.get(i).and_then(to_cell))
                })
                .collect();
            rows.push((time, values));
        }
    }

    let mut groups: BTreeMap<String, QueryTable> = groups
        .into_iter()
        .map(|(group, rows)| {
            let table = merge_rows(&query.name, rows);
            (group, table)
        })
        .collect();

    if query.group_by.is_none() && groups.is_empty() {
        groups.insert(String::new(), QueryTable::default());
    }

    QueryResult { groups }
}

/// Order rows by time, joining rows that share a timestamp. If any
/// timestamp is unparseable the rows are kept as delivered, and the
/// filter reports the bad value when the table is read.
fn merge_rows(query: &str, rows: Vec<Row>) -> QueryTable {
    let mut table = QueryTable::default();

    let times = match rows
        .iter()
        .map(|(t, _)| t.normalize())
        .collect::<TelemetryResult<Vec<_>>>()
    {
        Ok(times) => times,
        Err(e) => {
            tracing::warn!("Query {}: rows left unmerged: {}", query, e);
            for (time, values) in rows {
                table.push_row(time, values);
            }
            return table;
        }
    };

    let mut merged: BTreeMap<DateTime<Utc>, BTreeMap<String, Option<Cell>>> = BTreeMap::new();
    for (time, (_, values)) in times.into_iter().zip(rows) {
        let row = merged.entry(time).or_default();
        for (column, value) in values {
            let slot = row.entry(column).or_insert(None);
            if slot.is_none() {
                *slot = value;
            }
        }
    }

    for (time, values) in merged {
        table.push_row(RawTimestamp::Utc(time), values);
    }
    table
}

fn to_cell(value: &serde_json::Value) -> Option<Cell> {
    match value {
        serde_json::Value::Number(n) => n.as_f64().filter(|v| v.is_finite()).map(Cell::Number),
        serde_json::Value::String(s) => Some(Cell::Text(s.clone())),
        serde_json::Value::Bool(b) => Some(Cell::Number(if *b { 1.0 } else { 0.0 })),
        _ => None,
    }
}
