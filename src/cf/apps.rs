//! Applications

use super::client::CfClient;
use crate::error::Result;
use crate::resource::fetcher::fetch_all;
use crate::resource::json::{str_at, string_or};
use crate::resource::query::{ensure_query, pad_query_space, resource_url, validate_filters, QuerySpec};
use crate::resource::registry::ResourceKind;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// Application information
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct App {
    pub guid: String,
    pub name: String,
    pub state: String,
    pub space_guid: Option<String>,
}

impl From<&Value> for App {
    fn from(value: &Value) -> Self {
        Self {
            guid: string_or(value, "guid", ""),
            name: string_or(value, "name", ""),
            state: string_or(value, "state", "UNKNOWN"),
            space_guid: str_at(value, "relationships.space.data.guid").map(str::to_string),
        }
    }
}

/// Apps in the targeted space (or the space named in `query`)
pub async fn cf_get_apps(
    client: &CfClient,
    query: Option<QuerySpec>,
    token: Option<&CancellationToken>,
) -> Result<Vec<App>> {
    let query = ensure_query(query);
    validate_filters(&query, ResourceKind::Apps)?;
    let query = pad_query_space(query, &[], &client.config).await?;

    fetch_all(
        client,
        &resource_url(ResourceKind::Apps, &query),
        |resource, _| async move { Ok(Some(App::from(&resource))) },
        token,
    )
    .await
}
