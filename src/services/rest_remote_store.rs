//! PostgREST remote store
//!
//! Talks to a Supabase-style REST endpoint:
//! - upsert: `POST {base}/rest/v1/{table}?on_conflict={field}` with
//!   `Prefer: resolution=merge-duplicates`
//! - delete: `DELETE {base}/rest/v1/{table}?id=in.(a,b,c)`

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use crate::services::remote_store::{RemoteError, RemoteStore, Row};

/// Per-request timeout; a hung call would otherwise hold a pool slot
const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Clone)]
pub struct RestRemoteStore {
    client: Client,
    base_url: String,
    api_key: String,
}

impl RestRemoteStore {
    pub fn new(base_url: String, api_key: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    async fn check(response: reqwest::Response) -> Result<(), RemoteError> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(RemoteError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

/// PostgREST `in` filter; ids are quoted so commas or parentheses inside an
/// id cannot break the list.
fn in_filter(ids: &[String]) -> String {
    let quoted: Vec<String> = ids
        .iter()
        .map(|id| format!("\"{}\"", id.replace('\\', "\\\\").replace('"', "\\\"")))
        .collect();
    format!("in.({})", quoted.join(","))
}

#[async_trait]
impl RemoteStore for RestRemoteStore {
    async fn upsert(
        &self,
        table: &str,
        rows: Vec<Row>,
        conflict_field: &str,
    ) -> Result<(), RemoteError> {
        tracing::debug!(table = table, rows = rows.len(), conflict_field, "Remote upsert");

        let response = self
            .client
            .post(self.table_url(table))
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .query(&[("on_conflict", conflict_field)])
            .json(&rows)
            .send()
            .await?;

        Self::check(response).await
    }

    async fn delete_by_ids(&self, table: &str, ids: Vec<String>) -> Result<(), RemoteError> {
        tracing::debug!(table = table, ids = ids.len(), "Remote delete");

        let response = self
            .client
            .delete(self.table_url(table))
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .header("Prefer", "return=minimal")
            .query(&[("id", in_filter(&ids))])
            .send()
            .await?;

        Self::check(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_url_trims_trailing_slash() {
        let store = RestRemoteStore::new("https://example.supabase.co/".to_string(), "key".to_string());
        assert_eq!(
            store.table_url("weighings"),
            "https://example.supabase.co/rest/v1/weighings"
        );
    }

    #[test]
    fn test_in_filter_quotes_ids() {
        let ids = vec!["1".to_string(), "a,b".to_string(), "q\"x".to_string()];
        assert_eq!(in_filter(&ids), r#"in.("1","a,b","q\"x")"#);
    }
}
