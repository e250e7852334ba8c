//! Hosted [`ExchangeStore`] over a PostgREST-compatible HTTP API.
//!
//! Targets Supabase-style deployments where the `queries` table is exposed
//! at `{url}/rest/v1/{table}`:
//!
//! - insert: `POST /rest/v1/queries` with a one-element JSON array
//! - read: `GET /rest/v1/queries?select=*&user_email=eq.<addr>&order=created_at.desc,id.desc`
//!
//! Both requests carry the project key as `apikey` and as a bearer token.
//! Row-level access rules are the hosted service's concern.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;

use crate::config::StoreConfig;
use crate::models::{NewExchange, PersistedExchange};
use crate::traits::ExchangeStore;

pub struct RestExchangeStore {
    table_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl RestExchangeStore {
    /// # Errors
    ///
    /// Fails when `store.url` is unset or no key can be resolved.
    pub fn new(config: &StoreConfig) -> Result<Self> {
        let base = config
            .url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("store.url required for rest backend"))?;
        let api_key = config.resolve_api_key().ok_or_else(|| {
            anyhow::anyhow!(
                "no store API key: set store.api_key or the {} environment variable",
                config.api_key_env
            )
        })?;

        Ok(Self {
            table_url: table_url(base, &config.table),
            api_key,
            client: reqwest::Client::new(),
        })
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
    }
}

fn table_url(base: &str, table: &str) -> String {
    format!("{}/rest/v1/{}", base.trim_end_matches('/'), table)
}

/// Query parameters for the owner-scoped, newest-first read.
fn owner_query(owner: &str) -> [(&'static str, String); 3] {
    [
        ("select", "*".to_string()),
        ("user_email", format!("eq.{}", owner)),
        ("order", "created_at.desc,id.desc".to_string()),
    ]
}

#[async_trait]
impl ExchangeStore for RestExchangeStore {
    fn backend(&self) -> &str {
        "rest"
    }

    async fn insert(&self, exchange: &NewExchange) -> Result<()> {
        let response = self
            .authorized(self.client.post(&self.table_url))
            .header("Prefer", "return=minimal")
            .json(&[exchange])
            .send()
            .await
            .context("store insert request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("store insert error {}: {}", status, body_text);
        }
        Ok(())
    }

    async fn list_by_owner(&self, owner: &str) -> Result<Vec<PersistedExchange>> {
        let response = self
            .authorized(self.client.get(&self.table_url))
            .query(&owner_query(owner))
            .send()
            .await
            .context("store read request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("store read error {}: {}", status, body_text);
        }

        response
            .json::<Vec<PersistedExchange>>()
            .await
            .context("store read returned unexpected rows")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_url_trims_trailing_slash() {
        assert_eq!(
            table_url("https://abc.supabase.co/", "queries"),
            "https://abc.supabase.co/rest/v1/queries"
        );
    }

    #[test]
    fn owner_query_filters_and_orders() {
        let q = owner_query("a@example.com");
        assert_eq!(q[1], ("user_email", "eq.a@example.com".to_string()));
        assert_eq!(q[2], ("order", "created_at.desc,id.desc".to_string()));
    }

    #[test]
    fn rows_deserialize_from_postgrest_shape() {
        let body = r#"[{"id":7,"question":"q","response":"r","user_email":"a@example.com","created_at":"2024-05-01T12:34:56.789+00:00"}]"#;
        let rows: Vec<PersistedExchange> = serde_json::from_str(body).unwrap();
        assert_eq!(rows[0].id, 7);
        assert_eq!(rows[0].owner, "a@example.com");
    }

    #[test]
    fn missing_url_is_rejected() {
        let config = StoreConfig {
            backend: "rest".to_string(),
            api_key: Some("k".to_string()),
            ..StoreConfig::default()
        };
        assert!(RestExchangeStore::new(&config).is_err());
    }
}
