//! Targets, organizations and spaces

use super::client::CfClient;
use super::to_args;
use crate::error::Result;
use crate::resource::fetcher::fetch_all;
use crate::resource::json::{str_at, string_or};
use crate::resource::query::{
    ensure_query, pad_query, resource_url, validate_filters, Filter, FilterKey, QuerySpec,
};
use crate::resource::registry::ResourceKind;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// Output of `cf target`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TargetInfo {
    pub api_endpoint: Option<String>,
    pub api_version: Option<String>,
    pub user: Option<String>,
    pub org: Option<String>,
    pub space: Option<String>,
}

impl TargetInfo {
    /// Parse the `key: value` lines printed by `cf target`
    pub fn parse(output: &str) -> Self {
        let mut info = Self::default();
        for line in output.lines() {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            let slot = match key.trim().to_lowercase().as_str() {
                "api endpoint" => &mut info.api_endpoint,
                "api version" => &mut info.api_version,
                "user" => &mut info.user,
                "org" => &mut info.org,
                "space" => &mut info.space,
                _ => continue,
            };
            *slot = Some(value.to_string());
        }
        info
    }
}

/// A target saved with `cf save-target`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SavedTarget {
    pub label: String,
    pub is_current: bool,
}

/// Parse the output of `cf targets`
pub fn parse_saved_targets(output: &str) -> Vec<SavedTarget> {
    if output.contains("No targets have been saved yet") {
        return Vec::new();
    }

    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| match line.strip_suffix("(current)") {
            Some(name) => SavedTarget {
                label: name.trim().to_string(),
                is_current: true,
            },
            None => SavedTarget {
                label: line.to_string(),
                is_current: false,
            },
        })
        .collect()
}

/// Organization information
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Organization {
    pub guid: String,
    pub label: String,
}

impl From<&Value> for Organization {
    fn from(value: &Value) -> Self {
        Self {
            guid: string_or(value, "guid", ""),
            label: string_or(value, "name", ""),
        }
    }
}

/// Space information
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Space {
    pub guid: String,
    pub label: String,
    pub org_guid: Option<String>,
}

impl From<&Value> for Space {
    fn from(value: &Value) -> Self {
        Self {
            guid: string_or(value, "guid", ""),
            label: string_or(value, "name", ""),
            org_guid: str_at(value, "relationships.organization.data.guid").map(str::to_string),
        }
    }
}

/// `cf target`
pub async fn cf_get_target(
    client: &CfClient,
    token: Option<&CancellationToken>,
) -> Result<TargetInfo> {
    let stdout = client.execute(&to_args(&["target"]), token).await?;
    Ok(TargetInfo::parse(&stdout))
}

/// `cf targets`
pub async fn cf_get_targets(
    client: &CfClient,
    token: Option<&CancellationToken>,
) -> Result<Vec<SavedTarget>> {
    let stdout = client.execute(&to_args(&["targets"]), token).await?;
    Ok(parse_saved_targets(&stdout))
}

/// Switch to a saved target
pub async fn cf_set_target(
    client: &CfClient,
    name: &str,
    token: Option<&CancellationToken>,
) -> Result<()> {
    client
        .execute(&to_args(&["set-target", "-f", name]), token)
        .await?;
    client.clear_cache();
    Ok(())
}

/// Organizations visible to the current user
pub async fn cf_get_available_orgs(
    client: &CfClient,
    query: Option<QuerySpec>,
    token: Option<&CancellationToken>,
) -> Result<Vec<Organization>> {
    let query = ensure_query(query);
    validate_filters(&query, ResourceKind::Organizations)?;

    fetch_all(
        client,
        &resource_url(ResourceKind::Organizations, &query),
        |resource, _| async move { Ok(Some(Organization::from(&resource))) },
        token,
    )
    .await
}

/// Spaces visible to the current user, optionally within one organization
pub async fn cf_get_available_spaces(
    client: &CfClient,
    org_guid: Option<&str>,
    query: Option<QuerySpec>,
    token: Option<&CancellationToken>,
) -> Result<Vec<Space>> {
    let query = ensure_query(query);
    validate_filters(&query, ResourceKind::Spaces)?;

    let fallbacks: Vec<Filter> = org_guid
        .map(|guid| Filter::new(FilterKey::OrganizationGuids, guid))
        .into_iter()
        .collect();
    let query = pad_query(query, &fallbacks);

    fetch_all(
        client,
        &resource_url(ResourceKind::Spaces, &query),
        |resource, _| async move { Ok(Some(Space::from(&resource))) },
        token,
    )
    .await
}

/// `cf target -o <org> [-s <space>]`
pub async fn cf_set_org_space(
    client: &CfClient,
    org: &str,
    space: Option<&str>,
    token: Option<&CancellationToken>,
) -> Result<()> {
    let mut args = to_args(&["target", "-o", org]);
    if let Some(space) = space {
        args.extend(to_args(&["-s", space]));
    }
    client.execute(&args, token).await?;
    client.clear_cache();
    tracing::info!("Targeted org {} space {}", org, space.unwrap_or("-"));
    Ok(())
}
