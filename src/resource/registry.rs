//! Resource Registry
//!
//! The v3 resource types this crate queries, their endpoints, and the filter
//! keys each endpoint accepts.

use super::query::FilterKey;
use std::fmt;

/// Filters every list endpoint accepts
const COMMON_FILTERS: &[FilterKey] = &[
    FilterKey::Page,
    FilterKey::PerPage,
    FilterKey::OrderBy,
    FilterKey::LabelSelector,
    FilterKey::CreatedAts,
    FilterKey::UpdatedAts,
];

const ORGANIZATION_FILTERS: &[FilterKey] = &[FilterKey::Names, FilterKey::Guids];

const SPACE_FILTERS: &[FilterKey] = &[
    FilterKey::Names,
    FilterKey::Guids,
    FilterKey::OrganizationGuids,
    FilterKey::Include,
];

const SERVICE_INSTANCE_FILTERS: &[FilterKey] = &[
    FilterKey::Names,
    FilterKey::Guids,
    FilterKey::Type,
    FilterKey::SpaceGuids,
    FilterKey::OrganizationGuids,
    FilterKey::ServicePlanGuids,
    FilterKey::ServicePlanNames,
    FilterKey::Space,
    FilterKey::SpaceOrganization,
    FilterKey::ServicePlan,
    FilterKey::ServicePlanServiceOffering,
];

const SERVICE_PLAN_FILTERS: &[FilterKey] = &[
    FilterKey::Names,
    FilterKey::Guids,
    FilterKey::Available,
    FilterKey::BrokerCatalogIds,
    FilterKey::SpaceGuids,
    FilterKey::OrganizationGuids,
    FilterKey::ServiceBrokerGuids,
    FilterKey::ServiceBrokerNames,
    FilterKey::ServiceOfferingGuids,
    FilterKey::ServiceOfferingNames,
    FilterKey::ServiceInstanceGuids,
    FilterKey::Include,
    FilterKey::ServiceOfferingServiceBroker,
];

const SERVICE_OFFERING_FILTERS: &[FilterKey] = &[
    FilterKey::Names,
    FilterKey::Guids,
    FilterKey::Available,
    FilterKey::ServiceBrokerGuids,
    FilterKey::ServiceBrokerNames,
    FilterKey::SpaceGuids,
    FilterKey::OrganizationGuids,
    FilterKey::ServiceBroker,
];

const CREDENTIAL_BINDING_FILTERS: &[FilterKey] = &[
    FilterKey::Names,
    FilterKey::Guids,
    FilterKey::Type,
    FilterKey::ServiceInstanceGuids,
    FilterKey::ServiceInstanceNames,
    FilterKey::AppGuids,
    FilterKey::AppNames,
    FilterKey::ServicePlanGuids,
    FilterKey::ServicePlanNames,
    FilterKey::ServiceOfferingGuids,
    FilterKey::ServiceOfferingNames,
    FilterKey::Include,
    FilterKey::ServiceInstance,
];

const APP_FILTERS: &[FilterKey] = &[
    FilterKey::Names,
    FilterKey::Guids,
    FilterKey::SpaceGuids,
    FilterKey::OrganizationGuids,
    FilterKey::Stacks,
    FilterKey::LifecycleType,
    FilterKey::Include,
];

/// A list endpoint of the v3 API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Organizations,
    Spaces,
    ServiceInstances,
    ServicePlans,
    ServiceOfferings,
    ServiceCredentialBindings,
    Apps,
}

impl ResourceKind {
    pub const ALL: &'static [ResourceKind] = &[
        Self::Organizations,
        Self::Spaces,
        Self::ServiceInstances,
        Self::ServicePlans,
        Self::ServiceOfferings,
        Self::ServiceCredentialBindings,
        Self::Apps,
    ];

    /// Name used in the API path and in error messages
    pub fn name(&self) -> &'static str {
        match self {
            Self::Organizations => "organizations",
            Self::Spaces => "spaces",
            Self::ServiceInstances => "service_instances",
            Self::ServicePlans => "service_plans",
            Self::ServiceOfferings => "service_offerings",
            Self::ServiceCredentialBindings => "service_credential_bindings",
            Self::Apps => "apps",
        }
    }

    /// Path handed to `cf curl`
    pub fn path(&self) -> &'static str {
        match self {
            Self::Organizations => "/v3/organizations",
            Self::Spaces => "/v3/spaces",
            Self::ServiceInstances => "/v3/service_instances",
            Self::ServicePlans => "/v3/service_plans",
            Self::ServiceOfferings => "/v3/service_offerings",
            Self::ServiceCredentialBindings => "/v3/service_credential_bindings",
            Self::Apps => "/v3/apps",
        }
    }

    /// Path of a single resource
    pub fn item_path(&self, guid: &str) -> String {
        format!("{}/{}", self.path(), guid)
    }

    /// Resource-specific filters, without the common set
    pub fn specific_filters(&self) -> &'static [FilterKey] {
        match self {
            Self::Organizations => ORGANIZATION_FILTERS,
            Self::Spaces => SPACE_FILTERS,
            Self::ServiceInstances => SERVICE_INSTANCE_FILTERS,
            Self::ServicePlans => SERVICE_PLAN_FILTERS,
            Self::ServiceOfferings => SERVICE_OFFERING_FILTERS,
            Self::ServiceCredentialBindings => CREDENTIAL_BINDING_FILTERS,
            Self::Apps => APP_FILTERS,
        }
    }

    pub fn allows(&self, key: FilterKey) -> bool {
        COMMON_FILTERS.contains(&key) || self.specific_filters().contains(&key)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
