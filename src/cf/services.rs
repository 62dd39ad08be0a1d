//! Service instances, offerings, plans and keys
//!
//! Listing joins each instance with its plan (from the page's `included`
//! side-car) and its offering (through the client's lookup cache). Creating or
//! deleting a managed instance polls until the broker settles.

use super::client::CfClient;
use super::to_args;
use crate::error::{Error, Result};
use crate::resource::fetcher::{fetch_all, fetch_all_resources};
use crate::resource::json::{at_path, find_by_guid, str_at, string_or, strings_at};
use crate::resource::poller::{poll_until_ready, ProgressReporter};
use crate::resource::query::{
    ensure_query, pad_query, pad_query_space, resource_url, validate_filters, Filter, FilterKey,
    QuerySpec,
};
use crate::resource::registry::ResourceKind;
use futures::future::{select_all, BoxFuture, FutureExt, Shared};
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub const MANAGED_TYPE: &str = "managed";
pub const USER_PROVIDED_TYPE: &str = "user-provided";
pub const KEY_TYPE: &str = "key";

/// Credentials of a user-provided instance, resolved in the background
///
/// Clones share one lookup. A failed lookup resolves to `{}`; only a
/// cancellation surfaces as an error.
#[derive(Clone)]
pub struct PendingCredentials(Shared<BoxFuture<'static, Result<Value>>>);

impl PendingCredentials {
    fn spawn(client: CfClient, guid: String, token: Option<CancellationToken>) -> Self {
        let handle =
            tokio::spawn(async move { fetch_credentials(&client, &guid, token.as_ref()).await });
        let lookup = async move {
            handle.await.unwrap_or_else(|e| {
                tracing::warn!("Credentials lookup task failed: {}", e);
                Ok(json!({}))
            })
        };
        Self(lookup.boxed().shared())
    }

    pub async fn get(&self) -> Result<Value> {
        self.0.clone().await
    }

    /// The outcome if the lookup already settled
    pub fn peek(&self) -> Option<Result<Value>> {
        self.0.peek().cloned()
    }
}

impl fmt::Debug for PendingCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.peek() {
            Some(_) => f.write_str("PendingCredentials(resolved)"),
            None => f.write_str("PendingCredentials(pending)"),
        }
    }
}

/// Service instance information
#[derive(Debug, Clone, Serialize)]
pub struct ServiceInstance {
    pub guid: String,
    pub label: String,
    /// Name of the service offering
    pub service_name: String,
    pub plan_guid: Option<String>,
    pub plan: String,
    #[serde(rename = "type")]
    pub instance_type: String,
    pub tags: Vec<String>,
    pub last_operation: Option<String>,
    #[serde(skip)]
    pub credentials: Option<PendingCredentials>,
}

impl From<&Value> for ServiceInstance {
    fn from(value: &Value) -> Self {
        Self {
            guid: string_or(value, "guid", ""),
            label: string_or(value, "name", ""),
            service_name: String::new(),
            plan_guid: str_at(value, "relationships.service_plan.data.guid").map(str::to_string),
            plan: String::new(),
            instance_type: string_or(value, "type", MANAGED_TYPE),
            tags: strings_at(value, "tags"),
            last_operation: str_at(value, "last_operation.state").map(str::to_string),
            credentials: None,
        }
    }
}

/// Service offering information
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceOffering {
    pub guid: String,
    pub label: String,
    pub description: String,
    pub service_broker_guid: Option<String>,
}

impl From<&Value> for ServiceOffering {
    fn from(value: &Value) -> Self {
        Self {
            guid: string_or(value, "guid", ""),
            label: string_or(value, "name", ""),
            description: string_or(value, "description", ""),
            service_broker_guid: str_at(value, "relationships.service_broker.data.guid")
                .map(str::to_string),
        }
    }
}

/// Service plan information
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServicePlan {
    pub guid: String,
    pub label: String,
    pub description: String,
    pub service_offering_guid: Option<String>,
}

impl From<&Value> for ServicePlan {
    fn from(value: &Value) -> Self {
        Self {
            guid: string_or(value, "guid", ""),
            label: string_or(value, "name", ""),
            description: string_or(value, "description", ""),
            service_offering_guid: str_at(value, "relationships.service_offering.data.guid")
                .map(str::to_string),
        }
    }
}

/// Service key (credential binding of type `key`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceKey {
    pub guid: String,
    pub name: String,
    pub service_instance_guid: Option<String>,
}

impl From<&Value> for ServiceKey {
    fn from(value: &Value) -> Self {
        Self {
            guid: string_or(value, "guid", ""),
            name: string_or(value, "name", ""),
            service_instance_guid: str_at(value, "relationships.service_instance.data.guid")
                .map(str::to_string),
        }
    }
}

/// Parameters for creating a managed service instance
#[derive(Debug, Clone, Default)]
pub struct CreateServiceRequest {
    pub name: String,
    pub plan_guid: String,
    pub parameters: Option<Value>,
    pub tags: Vec<String>,
    /// Defaults to the targeted space
    pub space_guid: Option<String>,
}

/// Parameters for creating a user-provided service instance
#[derive(Debug, Clone, Default)]
pub struct CreateUpsRequest {
    pub name: String,
    pub credentials: Option<Value>,
    pub tags: Vec<String>,
    pub route_service_url: Option<String>,
    pub syslog_drain_url: Option<String>,
    /// Defaults to the targeted space
    pub space_guid: Option<String>,
}

/// Changes to a user-provided instance; `None` fields are left as they are
#[derive(Debug, Clone, Default)]
pub struct UpdateUpsRequest {
    pub credentials: Option<Value>,
    pub tags: Option<Vec<String>>,
    pub route_service_url: Option<String>,
    pub syslog_drain_url: Option<String>,
}

/// Parameters of `cf bind-local`
#[derive(Debug, Clone, Default)]
pub struct BindLocalRequest {
    pub file_path: String,
    pub instance_names: Vec<String>,
    pub tags: Vec<String>,
    pub service_keys: Vec<String>,
    pub params: Option<Value>,
}

// =============================================================================
// Listing
// =============================================================================

/// Service instances in the targeted space (or the space named in `query`)
pub async fn cf_get_service_instances(
    client: &CfClient,
    query: Option<QuerySpec>,
    token: Option<&CancellationToken>,
) -> Result<Vec<ServiceInstance>> {
    list_service_instances(client, query, None, token).await
}

/// Managed service instances only
pub async fn cf_get_managed_service_instances(
    client: &CfClient,
    query: Option<QuerySpec>,
    token: Option<&CancellationToken>,
) -> Result<Vec<ServiceInstance>> {
    list_service_instances(client, query, Some(MANAGED_TYPE), token).await
}

/// User-provided service instances, each with background credentials
///
/// Returns once the pages are walked and the first credentials lookup has
/// settled; the others keep resolving behind
/// [`ServiceInstance::credentials`].
pub async fn cf_get_ups_instances(
    client: &CfClient,
    query: Option<QuerySpec>,
    token: Option<&CancellationToken>,
) -> Result<Vec<ServiceInstance>> {
    let mut instances =
        list_service_instances(client, query, Some(USER_PROVIDED_TYPE), token).await?;

    for instance in &mut instances {
        instance.credentials = Some(PendingCredentials::spawn(
            client.clone(),
            instance.guid.clone(),
            token.cloned(),
        ));
    }

    let lookups: Vec<_> = instances
        .iter()
        .filter_map(|instance| instance.credentials.as_ref())
        .map(|credentials| credentials.0.clone())
        .collect();
    if !lookups.is_empty() {
        select_all(lookups).await;
    }

    Ok(instances)
}

async fn list_service_instances(
    client: &CfClient,
    query: Option<QuerySpec>,
    instance_type: Option<&str>,
    token: Option<&CancellationToken>,
) -> Result<Vec<ServiceInstance>> {
    let query = ensure_query(query);
    validate_filters(&query, ResourceKind::ServiceInstances)?;

    let mut fallbacks = vec![Filter::fields(FilterKey::ServicePlan, "guid,name")];
    if let Some(instance_type) = instance_type {
        fallbacks.push(Filter::new(FilterKey::Type, instance_type));
    }
    let query = pad_query_space(query, &fallbacks, &client.config).await?;

    fetch_all(
        client,
        &resource_url(ResourceKind::ServiceInstances, &query),
        |resource, included| map_service_instance(client, resource, included),
        token,
    )
    .await
}

async fn map_service_instance(
    client: &CfClient,
    resource: Value,
    included: Option<Arc<Value>>,
) -> Result<Option<ServiceInstance>> {
    let mut instance = ServiceInstance::from(&resource);

    if let Some(plan_guid) = instance.plan_guid.clone() {
        let plans = included
            .as_deref()
            .and_then(|included| at_path(included, "service_plans"));
        instance.plan = find_by_guid(plans, &plan_guid)
            .map(|plan| string_or(plan, "name", ""))
            .unwrap_or_default();

        let offering = offering_for_plan(client, &plan_guid).await?;
        instance.service_name = string_or(&offering, "name", "");
    }

    Ok(Some(instance))
}

/// Offering of a plan, memoized per plan guid
///
/// The lookup runs without the caller's token: its outcome is shared with
/// every later caller until the cache is cleared.
async fn offering_for_plan(client: &CfClient, plan_guid: &str) -> Result<Value> {
    let lookup_client = client.clone();
    let guid = plan_guid.to_string();

    client
        .offerings_cache()
        .get_or_compute(plan_guid, move || async move {
            let query = QuerySpec::new(vec![
                Filter::new(FilterKey::Guids, &guid),
                Filter::new(FilterKey::Include, "service_offering"),
            ]);
            let page = lookup_client
                .curl(&resource_url(ResourceKind::ServicePlans, &query), None)
                .await?;
            Ok(at_path(&page, "included.service_offerings.0")
                .cloned()
                .unwrap_or(Value::Null))
        })
        .await
}

/// Raw service instance resource by name, in the given or targeted space
pub async fn cf_get_instance_by_name(
    client: &CfClient,
    name: &str,
    space_guid: Option<&str>,
    token: Option<&CancellationToken>,
) -> Result<Value> {
    let mut query = QuerySpec::new(vec![Filter::new(FilterKey::Names, name)]);
    if let Some(space_guid) = space_guid {
        query = query.with_filter(Filter::new(FilterKey::SpaceGuids, space_guid));
    }
    let query = pad_query_space(query, &[], &client.config).await?;

    fetch_all_resources(
        client,
        &resource_url(ResourceKind::ServiceInstances, &query),
        token,
    )
    .await?
    .into_iter()
    .next()
    .ok_or_else(|| Error::not_found("Service instance", name))
}

/// `GET /v3/service_instances/<guid>/credentials`, `{}` on any failure but
/// cancellation
async fn fetch_credentials(
    client: &CfClient,
    guid: &str,
    token: Option<&CancellationToken>,
) -> Result<Value> {
    let path = format!(
        "{}/credentials",
        ResourceKind::ServiceInstances.item_path(guid)
    );
    match client.curl(&path, token).await {
        Ok(credentials) if !credentials.is_null() => Ok(credentials),
        Ok(_) => Ok(json!({})),
        Err(Error::Canceled) => Err(Error::Canceled),
        Err(e) => {
            tracing::warn!("Failed to fetch credentials of {}: {}", guid, e);
            Ok(json!({}))
        },
    }
}

// =============================================================================
// Creation
// =============================================================================

async fn resolve_space(client: &CfClient, space_guid: Option<&str>) -> Result<String> {
    match space_guid {
        Some(guid) => Ok(guid.to_string()),
        None => client
            .config
            .get_space_guid()
            .await?
            .ok_or(Error::SpaceNotTargeted),
    }
}

/// Create a managed service instance and wait until it is usable
pub async fn cf_create_service(
    client: &CfClient,
    request: &CreateServiceRequest,
    progress: &dyn ProgressReporter,
    token: Option<&CancellationToken>,
) -> Result<Value> {
    let space_guid = resolve_space(client, request.space_guid.as_deref()).await?;

    let body = json!({
        "type": MANAGED_TYPE,
        "name": request.name,
        "relationships": {
            "space": {"data": {"guid": space_guid}},
            "service_plan": {"data": {"guid": request.plan_guid}},
        },
        "parameters": request.parameters.clone().unwrap_or_else(|| json!({})),
        "tags": request.tags,
    });

    tracing::info!("Creating service instance '{}'", request.name);
    let created = client
        .curl_post(ResourceKind::ServiceInstances.path(), &body, token)
        .await?;

    let name = request.name.as_str();
    let space = space_guid.as_str();
    let lookup = move || cf_get_instance_by_name(client, name, Some(space), token);

    // Async brokers answer 202 with an empty body
    let initial = if str_at(&created, "name").is_some() {
        created
    } else {
        lookup().await?
    };

    let never = CancellationToken::new();
    poll_until_ready(
        initial,
        &client.poll,
        lookup,
        progress,
        token.unwrap_or(&never),
    )
    .await
}

/// Create a user-provided service instance
pub async fn cf_create_ups_instance(
    client: &CfClient,
    request: &CreateUpsRequest,
    token: Option<&CancellationToken>,
) -> Result<Value> {
    let space_guid = resolve_space(client, request.space_guid.as_deref()).await?;

    let mut body = json!({
        "type": USER_PROVIDED_TYPE,
        "name": request.name,
        "relationships": {"space": {"data": {"guid": space_guid}}},
        "credentials": request.credentials.clone().unwrap_or_else(|| json!({})),
        "tags": request.tags,
    });
    if let Some(url) = &request.route_service_url {
        body["route_service_url"] = json!(url);
    }
    if let Some(url) = &request.syslog_drain_url {
        body["syslog_drain_url"] = json!(url);
    }

    tracing::info!("Creating user-provided service instance '{}'", request.name);
    client
        .curl_post(ResourceKind::ServiceInstances.path(), &body, token)
        .await
}

// =============================================================================
// Update and deletion
// =============================================================================

/// Update a user-provided instance, found by name in the targeted space
pub async fn cf_update_ups_instance(
    client: &CfClient,
    name: &str,
    request: &UpdateUpsRequest,
    token: Option<&CancellationToken>,
) -> Result<Value> {
    let instance = cf_get_instance_by_name(client, name, None, token).await?;
    if str_at(&instance, "type") != Some(USER_PROVIDED_TYPE) {
        return Err(Error::not_found("User-provided service instance", name));
    }

    let mut body = serde_json::Map::new();
    if let Some(credentials) = &request.credentials {
        body.insert("credentials".to_string(), credentials.clone());
    }
    if let Some(tags) = &request.tags {
        body.insert("tags".to_string(), json!(tags));
    }
    if let Some(url) = &request.route_service_url {
        body.insert("route_service_url".to_string(), json!(url));
    }
    if let Some(url) = &request.syslog_drain_url {
        body.insert("syslog_drain_url".to_string(), json!(url));
    }

    let path = ResourceKind::ServiceInstances.item_path(&string_or(&instance, "guid", ""));
    tracing::info!("Updating user-provided service instance '{}'", name);
    client
        .curl_request(&path, "PATCH", Some(&Value::Object(body)), token)
        .await
}

/// Delete a service instance by name
///
/// User-provided instances go away at once. Managed ones are deleted by
/// their broker, so the instance is polled until it can no longer be found.
pub async fn cf_delete_service_instance(
    client: &CfClient,
    name: &str,
    progress: &dyn ProgressReporter,
    token: Option<&CancellationToken>,
) -> Result<()> {
    let instance = cf_get_instance_by_name(client, name, None, token).await?;
    let path = ResourceKind::ServiceInstances.item_path(&string_or(&instance, "guid", ""));

    tracing::info!("Deleting service instance '{}'", name);
    client.curl_request(&path, "DELETE", None, token).await?;

    if str_at(&instance, "type") == Some(USER_PROVIDED_TYPE) {
        return Ok(());
    }

    let space = str_at(&instance, "relationships.space.data.guid");
    let lookup = move || async move {
        match cf_get_instance_by_name(client, name, space, token).await {
            Ok(resource) => Ok(pending_deletion(resource)),
            Err(Error::NotFound { .. }) => Ok(json!({ "name": name })),
            Err(e) => Err(e),
        }
    };

    let initial = lookup().await?;
    let never = CancellationToken::new();
    poll_until_ready(
        initial,
        &client.poll,
        lookup,
        progress,
        token.unwrap_or(&never),
    )
    .await?;

    Ok(())
}

/// An instance still showing an earlier operation has not started deleting
fn pending_deletion(mut resource: Value) -> Value {
    if str_at(&resource, "last_operation.type") != Some("delete") {
        if let Some(fields) = resource.as_object_mut() {
            fields.insert(
                "last_operation".to_string(),
                json!({"type": "delete", "state": "in progress"}),
            );
        }
    }
    resource
}

// =============================================================================
// Offerings, plans and keys
// =============================================================================

pub async fn cf_get_service_offerings(
    client: &CfClient,
    query: Option<QuerySpec>,
    token: Option<&CancellationToken>,
) -> Result<Vec<ServiceOffering>> {
    let query = ensure_query(query);
    validate_filters(&query, ResourceKind::ServiceOfferings)?;

    fetch_all(
        client,
        &resource_url(ResourceKind::ServiceOfferings, &query),
        |resource, _| async move { Ok(Some(ServiceOffering::from(&resource))) },
        token,
    )
    .await
}

pub async fn cf_get_service_plans(
    client: &CfClient,
    query: Option<QuerySpec>,
    token: Option<&CancellationToken>,
) -> Result<Vec<ServicePlan>> {
    let query = ensure_query(query);
    validate_filters(&query, ResourceKind::ServicePlans)?;

    fetch_all(
        client,
        &resource_url(ResourceKind::ServicePlans, &query),
        |resource, _| async move { Ok(Some(ServicePlan::from(&resource))) },
        token,
    )
    .await
}

/// Service keys; restricted to bindings of type `key` unless the query says otherwise
pub async fn cf_get_service_keys(
    client: &CfClient,
    query: Option<QuerySpec>,
    token: Option<&CancellationToken>,
) -> Result<Vec<ServiceKey>> {
    let query = ensure_query(query);
    validate_filters(&query, ResourceKind::ServiceCredentialBindings)?;
    let query = pad_query(query, &[Filter::new(FilterKey::Type, KEY_TYPE)]);

    fetch_all(
        client,
        &resource_url(ResourceKind::ServiceCredentialBindings, &query),
        |resource, _| async move { Ok(Some(ServiceKey::from(&resource))) },
        token,
    )
    .await
}

/// Credentials of the first service key of an instance
///
/// `None` when the instance has no key. A failing details lookup yields `{}`.
pub async fn cf_get_instance_key_parameters(
    client: &CfClient,
    instance_name: &str,
    token: Option<&CancellationToken>,
) -> Result<Option<Value>> {
    let instance = cf_get_instance_by_name(client, instance_name, None, token).await?;
    let guid = string_or(&instance, "guid", "");

    let keys = cf_get_service_keys(
        client,
        Some(QuerySpec::new(vec![Filter::new(
            FilterKey::ServiceInstanceGuids,
            &guid,
        )])),
        token,
    )
    .await?;

    let Some(key) = keys.first() else {
        return Ok(None);
    };

    let path = format!(
        "{}/details",
        ResourceKind::ServiceCredentialBindings.item_path(&key.guid)
    );
    let details = match client.curl(&path, token).await {
        Ok(details) => details
            .get("credentials")
            .cloned()
            .unwrap_or(details),
        Err(Error::Canceled) => return Err(Error::Canceled),
        Err(e) => {
            tracing::warn!("Failed to fetch details of key '{}': {}", key.name, e);
            json!({})
        },
    };

    Ok(Some(details))
}

// =============================================================================
// Local binding
// =============================================================================

/// `cf bind-local`: write instance credentials into a local env file
pub async fn cf_bind_local_services(
    client: &CfClient,
    request: &BindLocalRequest,
    token: Option<&CancellationToken>,
) -> Result<String> {
    let mut args = to_args(&["bind-local", "-path", &request.file_path, "-service-names"]);
    args.extend(request.instance_names.iter().cloned());
    if !request.tags.is_empty() {
        args.push("-tags".to_string());
        args.extend(request.tags.iter().cloned());
    }
    if !request.service_keys.is_empty() {
        args.push("-service-keys".to_string());
        args.extend(request.service_keys.iter().cloned());
    }
    if let Some(params) = &request.params {
        args.push("-params".to_string());
        args.push(params.to_string());
    }

    client.execute(&args, token).await
}

/// `cf bind-local-ups`: same for user-provided instances
pub async fn cf_bind_local_ups(
    client: &CfClient,
    file_path: &str,
    instance_names: &[String],
    tags: &[String],
    token: Option<&CancellationToken>,
) -> Result<String> {
    let mut args = to_args(&["bind-local-ups", "-path", file_path, "-service-names"]);
    args.extend(instance_names.iter().cloned());
    if !tags.is_empty() {
        args.push("-tags".to_string());
        args.extend(tags.iter().cloned());
    }

    client.execute(&args, token).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_instance_from_value() {
        let instance = ServiceInstance::from(&json!({
            "guid": "i1",
            "name": "my-db",
            "type": "managed",
            "tags": ["db", "prod"],
            "last_operation": {"state": "succeeded"},
            "relationships": {"service_plan": {"data": {"guid": "p1"}}}
        }));

        assert_eq!(instance.label, "my-db");
        assert_eq!(instance.plan_guid.as_deref(), Some("p1"));
        assert_eq!(instance.tags, vec!["db", "prod"]);
        assert_eq!(instance.last_operation.as_deref(), Some("succeeded"));
    }

    #[test]
    fn test_user_provided_instance_has_no_plan() {
        let instance = ServiceInstance::from(&json!({
            "guid": "u1",
            "name": "my-ups",
            "type": "user-provided",
            "relationships": {"space": {"data": {"guid": "s1"}}}
        }));
        assert!(instance.plan_guid.is_none());
        assert_eq!(instance.instance_type, USER_PROVIDED_TYPE);
    }

    #[test]
    fn test_pending_deletion() {
        let stale = pending_deletion(json!({
            "name": "db",
            "last_operation": {"type": "create", "state": "succeeded"}
        }));
        assert_eq!(stale["last_operation"]["state"], "in progress");

        let deleting = json!({
            "name": "db",
            "last_operation": {"type": "delete", "state": "failed", "description": "busy"}
        });
        assert_eq!(pending_deletion(deleting.clone()), deleting);
    }

    #[test]
    fn test_service_key_from_value() {
        let key = ServiceKey::from(&json!({
            "guid": "k1",
            "name": "my-key",
            "type": "key",
            "relationships": {"service_instance": {"data": {"guid": "i1"}}}
        }));
        assert_eq!(key.service_instance_guid.as_deref(), Some("i1"));
    }
}
