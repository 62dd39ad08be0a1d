//! Query composition
//!
//! Builds the query strings handed to `cf curl` from a structured
//! [`QuerySpec`], checks filter keys against the per-resource allow-list, and
//! injects ambient defaults such as the page size and the targeted space.

use super::registry::ResourceKind;
use crate::cf::cf_config::CfConfig;
use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Page size used when the caller does not pick one
pub const DEFAULT_PER_PAGE: u32 = 297;

/// Filter names understood by the v3 API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterKey {
    Names,
    Guids,
    Type,
    SpaceGuids,
    OrganizationGuids,
    ServicePlanGuids,
    ServicePlanNames,
    ServiceOfferingGuids,
    ServiceOfferingNames,
    ServiceBrokerGuids,
    ServiceBrokerNames,
    ServiceInstanceGuids,
    ServiceInstanceNames,
    BrokerCatalogIds,
    Available,
    AppGuids,
    AppNames,
    Stacks,
    LifecycleType,
    Include,
    LabelSelector,
    CreatedAts,
    UpdatedAts,
    Page,
    PerPage,
    OrderBy,
    // Relations usable with `fields[...]`
    Space,
    SpaceOrganization,
    ServicePlan,
    ServicePlanServiceOffering,
    ServiceOffering,
    ServiceOfferingServiceBroker,
    ServiceBroker,
    ServiceInstance,
}

impl FilterKey {
    pub const ALL: &'static [FilterKey] = &[
        Self::Names,
        Self::Guids,
        Self::Type,
        Self::SpaceGuids,
        Self::OrganizationGuids,
        Self::ServicePlanGuids,
        Self::ServicePlanNames,
        Self::ServiceOfferingGuids,
        Self::ServiceOfferingNames,
        Self::ServiceBrokerGuids,
        Self::ServiceBrokerNames,
        Self::ServiceInstanceGuids,
        Self::ServiceInstanceNames,
        Self::BrokerCatalogIds,
        Self::Available,
        Self::AppGuids,
        Self::AppNames,
        Self::Stacks,
        Self::LifecycleType,
        Self::Include,
        Self::LabelSelector,
        Self::CreatedAts,
        Self::UpdatedAts,
        Self::Page,
        Self::PerPage,
        Self::OrderBy,
        Self::Space,
        Self::SpaceOrganization,
        Self::ServicePlan,
        Self::ServicePlanServiceOffering,
        Self::ServiceOffering,
        Self::ServiceOfferingServiceBroker,
        Self::ServiceBroker,
        Self::ServiceInstance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Names => "names",
            Self::Guids => "guids",
            Self::Type => "type",
            Self::SpaceGuids => "space_guids",
            Self::OrganizationGuids => "organization_guids",
            Self::ServicePlanGuids => "service_plan_guids",
            Self::ServicePlanNames => "service_plan_names",
            Self::ServiceOfferingGuids => "service_offering_guids",
            Self::ServiceOfferingNames => "service_offering_names",
            Self::ServiceBrokerGuids => "service_broker_guids",
            Self::ServiceBrokerNames => "service_broker_names",
            Self::ServiceInstanceGuids => "service_instance_guids",
            Self::ServiceInstanceNames => "service_instance_names",
            Self::BrokerCatalogIds => "broker_catalog_ids",
            Self::Available => "available",
            Self::AppGuids => "app_guids",
            Self::AppNames => "app_names",
            Self::Stacks => "stacks",
            Self::LifecycleType => "lifecycle_type",
            Self::Include => "include",
            Self::LabelSelector => "label_selector",
            Self::CreatedAts => "created_ats",
            Self::UpdatedAts => "updated_ats",
            Self::Page => "page",
            Self::PerPage => "per_page",
            Self::OrderBy => "order_by",
            Self::Space => "space",
            Self::SpaceOrganization => "space.organization",
            Self::ServicePlan => "service_plan",
            Self::ServicePlanServiceOffering => "service_plan.service_offering",
            Self::ServiceOffering => "service_offering",
            Self::ServiceOfferingServiceBroker => "service_offering.service_broker",
            Self::ServiceBroker => "service_broker",
            Self::ServiceInstance => "service_instance",
        }
    }
}

impl fmt::Display for FilterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| Error::Config(format!("Unknown filter key: {}", s)))
    }
}

/// Comparison applied to a filter value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Gte,
    Lte,
    Lt,
    Gt,
    Not,
    /// Sparse fieldset: `fields[key]=value`
    Fields,
}

impl FilterOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gte => "gte",
            Self::Lte => "lte",
            Self::Lt => "lt",
            Self::Gt => "gt",
            Self::Not => "not",
            Self::Fields => "fields",
        }
    }
}

impl FromStr for FilterOp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "gte" => Ok(Self::Gte),
            "lte" => Ok(Self::Lte),
            "lt" => Ok(Self::Lt),
            "gt" => Ok(Self::Gt),
            "not" => Ok(Self::Not),
            "fields" => Ok(Self::Fields),
            other => Err(Error::Config(format!("Unknown filter operator: {}", other))),
        }
    }
}

/// One `key[op]=value` clause
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub key: FilterKey,
    pub value: String,
    pub op: Option<FilterOp>,
}

impl Filter {
    pub fn new(key: FilterKey, value: &str) -> Self {
        Self {
            key,
            value: value.to_string(),
            op: None,
        }
    }

    pub fn with_op(key: FilterKey, op: FilterOp, value: &str) -> Self {
        Self {
            key,
            value: value.to_string(),
            op: Some(op),
        }
    }

    pub fn fields(key: FilterKey, value: &str) -> Self {
        Self::with_op(key, FilterOp::Fields, value)
    }

    /// Serialize, or `None` when the value is empty
    fn to_clause(&self) -> Option<String> {
        if self.value.is_empty() {
            return None;
        }

        let value = urlencoding::encode(&self.value);
        Some(match self.op {
            Some(FilterOp::Fields) => format!("fields[{}]={}", self.key, value),
            Some(op) => format!("{}[{}]={}", self.key, op.as_str(), value),
            None => format!("{}={}", self.key, value),
        })
    }
}

impl FromStr for Filter {
    type Err = Error;

    /// Parse `key=value`, `key[op]=value` or `fields[key]=value`
    fn from_str(s: &str) -> Result<Self> {
        let (lhs, value) = s
            .split_once('=')
            .ok_or_else(|| Error::Config(format!("Filter must look like key=value: {}", s)))?;

        if let Some(rest) = lhs.strip_prefix("fields[") {
            let key = rest.trim_end_matches(']');
            return Ok(Self::fields(key.parse()?, value));
        }

        match lhs.split_once('[') {
            Some((key, op)) => Ok(Self::with_op(
                key.parse()?,
                op.trim_end_matches(']').parse()?,
                value,
            )),
            None => Ok(Self::new(lhs.parse()?, value)),
        }
    }
}

/// Sort orders supported by list endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderBy {
    Name,
    NameDesc,
    CreatedAt,
    CreatedAtDesc,
    UpdatedAt,
    UpdatedAtDesc,
}

impl OrderBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::NameDesc => "-name",
            Self::CreatedAt => "created_at",
            Self::CreatedAtDesc => "-created_at",
            Self::UpdatedAt => "updated_at",
            Self::UpdatedAtDesc => "-updated_at",
        }
    }
}

impl FromStr for OrderBy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "name" => Ok(Self::Name),
            "-name" => Ok(Self::NameDesc),
            "created_at" => Ok(Self::CreatedAt),
            "-created_at" => Ok(Self::CreatedAtDesc),
            "updated_at" => Ok(Self::UpdatedAt),
            "-updated_at" => Ok(Self::UpdatedAtDesc),
            other => Err(Error::Config(format!("Unknown order: {}", other))),
        }
    }
}

/// Structured list query
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QuerySpec {
    pub filters: Vec<Filter>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub order_by: Option<OrderBy>,
}

impl QuerySpec {
    pub fn new(filters: Vec<Filter>) -> Self {
        Self {
            filters,
            ..Self::default()
        }
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Non-empty value of the first filter with `key`
    pub fn filter_value(&self, key: FilterKey) -> Option<&str> {
        self.filters
            .iter()
            .find(|f| f.key == key && !f.value.is_empty())
            .map(|f| f.value.as_str())
    }
}

/// Serialize a query, filters first, then paging and ordering
pub fn compose_query(spec: &QuerySpec) -> String {
    let params = [
        (FilterKey::Page, spec.page.map(|p| p.to_string())),
        (FilterKey::PerPage, spec.per_page.map(|p| p.to_string())),
        (FilterKey::OrderBy, spec.order_by.map(|o| o.as_str().to_string())),
    ];

    spec.filters
        .iter()
        .filter_map(Filter::to_clause)
        .chain(params.into_iter().filter_map(|(key, value)| {
            value
                .filter(|v| !v.is_empty())
                .map(|v| format!("{}={}", key, v))
        }))
        .collect::<Vec<_>>()
        .join("&")
}

/// `path?query`, or just `path` when nothing survives composition
pub fn resource_url(kind: ResourceKind, spec: &QuerySpec) -> String {
    let query = compose_query(spec);
    if query.is_empty() {
        kind.path().to_string()
    } else {
        format!("{}?{}", kind.path(), query)
    }
}

/// Reject any filter key outside the resource's allow-list
pub fn validate_filters(spec: &QuerySpec, kind: ResourceKind) -> Result<()> {
    match spec.filters.iter().find(|f| !kind.allows(f.key)) {
        Some(filter) => Err(Error::disallowed_filter(filter.key.as_str(), kind.name())),
        None => Ok(()),
    }
}

/// Fill in defaults; applying it twice changes nothing
///
/// `page`, `per_page` and `order_by` given as filters move into their
/// fields, so each is emitted once. A value already in the field wins.
pub fn ensure_query(spec: Option<QuerySpec>) -> QuerySpec {
    let mut spec = spec.unwrap_or_default();
    lift_paging_filters(&mut spec);
    if spec.per_page.is_none() {
        spec.per_page = Some(DEFAULT_PER_PAGE);
    }
    spec
}

fn lift_paging_filters(spec: &mut QuerySpec) {
    let (paging, filters): (Vec<Filter>, Vec<Filter>) =
        std::mem::take(&mut spec.filters).into_iter().partition(|f| {
            matches!(
                f.key,
                FilterKey::Page | FilterKey::PerPage | FilterKey::OrderBy
            )
        });
    spec.filters = filters;

    for filter in paging.iter().filter(|f| !f.value.is_empty()) {
        let lifted = match filter.key {
            FilterKey::Page => lift(&mut spec.page, &filter.value),
            FilterKey::PerPage => lift(&mut spec.per_page, &filter.value),
            _ => lift(&mut spec.order_by, &filter.value),
        };
        if !lifted {
            tracing::warn!("Ignoring {} filter value '{}'", filter.key, filter.value);
        }
    }
}

/// Set an empty `slot` from `value`; false if the value does not parse
fn lift<T: FromStr>(slot: &mut Option<T>, value: &str) -> bool {
    if slot.is_some() {
        return true;
    }
    match value.parse() {
        Ok(parsed) => {
            *slot = Some(parsed);
            true
        },
        Err(_) => false,
    }
}

/// Append each fallback whose key is not already set to a non-empty value
pub fn pad_query(spec: QuerySpec, fallbacks: &[Filter]) -> QuerySpec {
    let mut spec = ensure_query(Some(spec));
    for fallback in fallbacks {
        if spec.filter_value(fallback.key).is_none() {
            spec.filters.push(fallback.clone());
        }
    }
    spec
}

/// Like [`pad_query`], and make sure the query is scoped to a space,
/// using the targeted space from the `cf` configuration when needed
pub async fn pad_query_space(
    spec: QuerySpec,
    fallbacks: &[Filter],
    config: &CfConfig,
) -> Result<QuerySpec> {
    let mut spec = pad_query(spec, fallbacks);
    if spec.filter_value(FilterKey::SpaceGuids).is_none() {
        let space_guid = config
            .get_space_guid()
            .await?
            .ok_or(Error::SpaceNotTargeted)?;
        spec.filters.push(Filter::new(FilterKey::SpaceGuids, &space_guid));
    }
    Ok(spec)
}
