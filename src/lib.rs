//! Cloud Foundry resource access through the `cf` CLI
//!
//! Every platform call goes through the `cf` binary: plain commands for the
//! session and targeting, `cf curl` against the v3 API for resources. The
//! [`resource`] module turns filters into queries, walks pages and polls
//! asynchronous operations; [`cf`] holds the process runner and the
//! operations built on top.

pub mod cf;
pub mod config;
pub mod error;
pub mod resource;

pub use cf::auth::{cf_api, cf_get_auth_token, cf_login, cf_logout, LoginOptions};
pub use cf::apps::{cf_get_apps, App};
pub use cf::cf_config::CfConfig;
pub use cf::cli::{CfCli, CliRunner, ProcessResult, RunOptions};
pub use cf::client::CfClient;
pub use cf::services::{
    cf_bind_local_services, cf_bind_local_ups, cf_create_service, cf_create_ups_instance,
    cf_delete_service_instance, cf_get_instance_by_name, cf_get_instance_key_parameters,
    cf_get_managed_service_instances, cf_get_service_instances, cf_get_service_keys,
    cf_get_service_offerings, cf_get_service_plans, cf_get_ups_instances, cf_update_ups_instance,
    BindLocalRequest, CreateServiceRequest, CreateUpsRequest, ServiceInstance, ServiceKey,
    ServiceOffering, ServicePlan, UpdateUpsRequest,
};
pub use cf::targets::{
    cf_get_available_orgs, cf_get_available_spaces, cf_get_target, cf_get_targets,
    cf_set_org_space, cf_set_target, Organization, SavedTarget, Space, TargetInfo,
};
pub use config::Settings;
pub use error::{Error, Result};
pub use tokio_util::sync::CancellationToken;
