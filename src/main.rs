use anyhow::{Context, Result};
use cf_tools::cf::cf_config::SPACE_GUID_FIELD;
use cf_tools::resource::query::{Filter, OrderBy, QuerySpec};
use cf_tools::{
    BindLocalRequest, CancellationToken, CfCli, CfClient, CfConfig, CreateServiceRequest,
    CreateUpsRequest, LoginOptions, Settings, UpdateUpsRequest,
};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Cloud Foundry resources through the cf CLI
#[derive(Parser, Debug)]
#[command(name = "cf-tools", version, about, long_about = None)]
struct Args {
    /// Saved cf target whose configuration is read
    #[arg(short, long)]
    target: Option<String>,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off")]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

/// Filters and paging shared by list commands
#[derive(clap::Args, Debug, Default)]
struct QueryArgs {
    /// Filter as key=value, key[op]=value or fields[key]=value
    #[arg(short, long = "filter")]
    filters: Vec<String>,

    #[arg(long)]
    page: Option<u32>,

    #[arg(long)]
    per_page: Option<u32>,

    /// name, created_at or updated_at, prefixed with '-' for descending
    #[arg(long, allow_hyphen_values = true)]
    order_by: Option<String>,
}

impl QueryArgs {
    fn to_query(&self) -> Result<Option<QuerySpec>> {
        if self.filters.is_empty()
            && self.page.is_none()
            && self.per_page.is_none()
            && self.order_by.is_none()
        {
            return Ok(None);
        }

        let filters = self
            .filters
            .iter()
            .map(|f| f.parse::<Filter>())
            .collect::<cf_tools::Result<Vec<_>>>()?;
        let order_by = self
            .order_by
            .as_deref()
            .map(str::parse::<OrderBy>)
            .transpose()?;

        Ok(Some(QuerySpec {
            filters,
            page: self.page,
            per_page: self.per_page,
            order_by,
        }))
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Set the API endpoint and authenticate
    Login {
        #[arg(short = 'a', long)]
        endpoint: String,
        #[arg(short, long)]
        user: String,
        /// Falls back to CF_PASSWORD
        #[arg(short, long, env = "CF_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long)]
        origin: Option<String>,
        #[arg(long)]
        skip_ssl_validation: bool,
    },
    Logout,
    /// Show or set the API endpoint
    Api { url: Option<String> },
    /// Print the current OAuth token
    OauthToken,
    /// Show the current target
    Target,
    /// List saved targets
    Targets,
    /// Switch to a saved target
    SetTarget { name: String },
    Orgs {
        #[command(flatten)]
        query: QueryArgs,
    },
    Spaces {
        /// Restrict to one organization
        #[arg(long)]
        org_guid: Option<String>,
        #[command(flatten)]
        query: QueryArgs,
    },
    /// Target an org and optionally a space
    SetOrgSpace {
        org: String,
        space: Option<String>,
    },
    /// Read a dotted field from the cf configuration file
    ConfigField {
        #[arg(default_value = SPACE_GUID_FIELD)]
        field: String,
    },
    Services {
        #[arg(long, value_enum, default_value = "all")]
        kind: ServiceKind,
        #[command(flatten)]
        query: QueryArgs,
    },
    /// Show a service instance by name
    Instance {
        name: String,
        #[arg(long)]
        space_guid: Option<String>,
    },
    /// Create a managed service instance and wait for it
    CreateService {
        name: String,
        #[arg(long)]
        plan_guid: String,
        /// JSON object of broker parameters
        #[arg(long)]
        parameters: Option<String>,
        #[arg(long = "tag")]
        tags: Vec<String>,
        #[arg(long)]
        space_guid: Option<String>,
    },
    /// Create a user-provided service instance
    CreateUps {
        name: String,
        /// JSON object of credentials
        #[arg(long)]
        credentials: Option<String>,
        #[arg(long = "tag")]
        tags: Vec<String>,
        #[arg(long)]
        route_service_url: Option<String>,
        #[arg(long)]
        syslog_drain_url: Option<String>,
        #[arg(long)]
        space_guid: Option<String>,
    },
    /// Change credentials, tags or URLs of a user-provided instance
    UpdateUps {
        name: String,
        /// JSON object of credentials
        #[arg(long)]
        credentials: Option<String>,
        /// Replaces all tags; repeat for several
        #[arg(long = "tag")]
        tags: Vec<String>,
        #[arg(long)]
        route_service_url: Option<String>,
        #[arg(long)]
        syslog_drain_url: Option<String>,
    },
    /// Delete a service instance and wait until it is gone
    DeleteService { name: String },
    Offerings {
        #[command(flatten)]
        query: QueryArgs,
    },
    Plans {
        #[command(flatten)]
        query: QueryArgs,
    },
    Keys {
        #[command(flatten)]
        query: QueryArgs,
    },
    /// Credentials of the first service key of an instance
    KeyParams { instance: String },
    /// Write service credentials into a local env file
    BindLocal {
        #[arg(long)]
        path: String,
        #[arg(required = true)]
        instances: Vec<String>,
        #[arg(long = "tag")]
        tags: Vec<String>,
        #[arg(long = "service-key")]
        service_keys: Vec<String>,
        /// JSON object passed to the key creation
        #[arg(long)]
        params: Option<String>,
    },
    /// Write user-provided credentials into a local env file
    BindLocalUps {
        #[arg(long)]
        path: String,
        #[arg(required = true)]
        instances: Vec<String>,
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    Apps {
        #[command(flatten)]
        query: QueryArgs,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ServiceKind {
    All,
    Managed,
    Ups,
}

fn setup_logging(level: LogLevel) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let tracing_level = level.to_tracing_level()?;

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Failed to open log file {}: {}", log_path.display(), e);
            return None;
        },
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_max_level(tracing_level)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("cf-tools started with log level: {:?}", level);
    tracing::info!("Log file: {:?}", log_path);

    Some(guard)
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("cf-tools").join("cf-tools.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".cf-tools").join("cf-tools.log");
    }
    PathBuf::from("cf-tools.log")
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_json_arg(name: &str, raw: Option<&str>) -> Result<Option<Value>> {
    raw.map(|text| serde_json::from_str(text).with_context(|| format!("--{} is not valid JSON", name)))
        .transpose()
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level);

    let settings = Settings::load();
    let target = args.target.clone().or_else(|| settings.cf_target.clone());
    let config = CfConfig::from_env().with_target(target.as_deref());
    let client = CfClient::new(Arc::new(CfCli::new()), config)
        .with_poll_settings(settings.poll_settings());

    let token = CancellationToken::new();
    let ctrl_c_token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, canceling");
            ctrl_c_token.cancel();
        }
    });

    run_command(&client, args.command, &token).await
}

async fn run_command(client: &CfClient, command: Command, token: &CancellationToken) -> Result<()> {
    let token = Some(token);

    match command {
        Command::Login {
            endpoint,
            user,
            password,
            origin,
            skip_ssl_validation,
        } => {
            let options = LoginOptions {
                endpoint,
                user,
                password,
                origin,
                skip_ssl_validation,
            };
            println!("{}", cf_tools::cf_login(client, &options, token).await?);
        },
        Command::Logout => cf_tools::cf_logout(client, token).await?,
        Command::Api { url } => {
            print!("{}", cf_tools::cf_api(client, url.as_deref(), token).await?)
        },
        Command::OauthToken => println!("{}", cf_tools::cf_get_auth_token(client, token).await?),
        Command::Target => print_json(&cf_tools::cf_get_target(client, token).await?)?,
        Command::Targets => print_json(&cf_tools::cf_get_targets(client, token).await?)?,
        Command::SetTarget { name } => cf_tools::cf_set_target(client, &name, token).await?,
        Command::Orgs { query } => {
            let orgs = cf_tools::cf_get_available_orgs(client, query.to_query()?, token).await?;
            print_json(&orgs)?;
        },
        Command::Spaces { org_guid, query } => {
            let spaces = cf_tools::cf_get_available_spaces(
                client,
                org_guid.as_deref(),
                query.to_query()?,
                token,
            )
            .await?;
            print_json(&spaces)?;
        },
        Command::SetOrgSpace { org, space } => {
            cf_tools::cf_set_org_space(client, &org, space.as_deref(), token).await?
        },
        Command::ConfigField { field } => {
            print_json(&client.config.get_field(&field).await?)?;
        },
        Command::Services { kind, query } => {
            let query = query.to_query()?;
            match kind {
                ServiceKind::All => {
                    print_json(&cf_tools::cf_get_service_instances(client, query, token).await?)?
                },
                ServiceKind::Managed => print_json(
                    &cf_tools::cf_get_managed_service_instances(client, query, token).await?,
                )?,
                ServiceKind::Ups => {
                    let instances = cf_tools::cf_get_ups_instances(client, query, token).await?;
                    let mut out = Vec::with_capacity(instances.len());
                    for instance in &instances {
                        let mut value = serde_json::to_value(instance)?;
                        if let Some(credentials) = &instance.credentials {
                            value["credentials"] = credentials.get().await?;
                        }
                        out.push(value);
                    }
                    print_json(&out)?;
                },
            }
        },
        Command::Instance { name, space_guid } => {
            let instance =
                cf_tools::cf_get_instance_by_name(client, &name, space_guid.as_deref(), token)
                    .await?;
            print_json(&instance)?;
        },
        Command::CreateService {
            name,
            plan_guid,
            parameters,
            tags,
            space_guid,
        } => {
            let request = CreateServiceRequest {
                name,
                plan_guid,
                parameters: parse_json_arg("parameters", parameters.as_deref())?,
                tags,
                space_guid,
            };
            let progress = |increment: f64, message: &str| {
                eprintln!("[+{:.0}%] {}", increment, message);
            };
            let instance = cf_tools::cf_create_service(client, &request, &progress, token).await?;
            print_json(&instance)?;
        },
        Command::CreateUps {
            name,
            credentials,
            tags,
            route_service_url,
            syslog_drain_url,
            space_guid,
        } => {
            let request = CreateUpsRequest {
                name,
                credentials: parse_json_arg("credentials", credentials.as_deref())?,
                tags,
                route_service_url,
                syslog_drain_url,
                space_guid,
            };
            print_json(&cf_tools::cf_create_ups_instance(client, &request, token).await?)?;
        },
        Command::UpdateUps {
            name,
            credentials,
            tags,
            route_service_url,
            syslog_drain_url,
        } => {
            let request = UpdateUpsRequest {
                credentials: parse_json_arg("credentials", credentials.as_deref())?,
                tags: (!tags.is_empty()).then_some(tags),
                route_service_url,
                syslog_drain_url,
            };
            let instance =
                cf_tools::cf_update_ups_instance(client, &name, &request, token).await?;
            print_json(&instance)?;
        },
        Command::DeleteService { name } => {
            let progress = |increment: f64, message: &str| {
                eprintln!("[+{:.0}%] {}", increment, message);
            };
            cf_tools::cf_delete_service_instance(client, &name, &progress, token).await?;
        },
        Command::Offerings { query } => {
            let offerings =
                cf_tools::cf_get_service_offerings(client, query.to_query()?, token).await?;
            print_json(&offerings)?;
        },
        Command::Plans { query } => {
            let plans = cf_tools::cf_get_service_plans(client, query.to_query()?, token).await?;
            print_json(&plans)?;
        },
        Command::Keys { query } => {
            let keys = cf_tools::cf_get_service_keys(client, query.to_query()?, token).await?;
            print_json(&keys)?;
        },
        Command::KeyParams { instance } => {
            let params =
                cf_tools::cf_get_instance_key_parameters(client, &instance, token).await?;
            print_json(&params.unwrap_or_else(|| json!(null)))?;
        },
        Command::BindLocal {
            path,
            instances,
            tags,
            service_keys,
            params,
        } => {
            let request = BindLocalRequest {
                file_path: path,
                instance_names: instances,
                tags,
                service_keys,
                params: parse_json_arg("params", params.as_deref())?,
            };
            print!("{}", cf_tools::cf_bind_local_services(client, &request, token).await?);
        },
        Command::BindLocalUps {
            path,
            instances,
            tags,
        } => {
            let output =
                cf_tools::cf_bind_local_ups(client, &path, &instances, &tags, token).await?;
            print!("{}", output);
        },
        Command::Apps { query } => {
            print_json(&cf_tools::cf_get_apps(client, query.to_query()?, token).await?)?;
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cf_tools::resource::query::FilterKey;

    #[test]
    fn test_log_level_conversion() {
        assert!(LogLevel::Off.to_tracing_level().is_none());
        assert_eq!(LogLevel::Debug.to_tracing_level(), Some(Level::DEBUG));
    }

    #[test]
    fn test_query_args_to_query() {
        assert!(QueryArgs::default().to_query().unwrap().is_none());

        let args = QueryArgs {
            filters: vec!["names=db".to_string(), "fields[service_plan]=guid".to_string()],
            per_page: Some(10),
            order_by: Some("-name".to_string()),
            ..QueryArgs::default()
        };
        let query = args.to_query().unwrap().unwrap();
        assert_eq!(query.filter_value(FilterKey::Names), Some("db"));
        assert_eq!(query.per_page, Some(10));
        assert_eq!(query.order_by, Some(OrderBy::NameDesc));
    }

    #[test]
    fn test_bad_filter_is_rejected() {
        let args = QueryArgs {
            filters: vec!["bogus".to_string()],
            ..QueryArgs::default()
        };
        assert!(args.to_query().is_err());
    }

    #[test]
    fn test_update_ups_parses() {
        let args = Args::try_parse_from([
            "cf-tools",
            "update-ups",
            "db",
            "--credentials",
            r#"{"user":"u"}"#,
            "--tag",
            "a",
        ])
        .unwrap();
        match args.command {
            Command::UpdateUps {
                name,
                credentials,
                tags,
                ..
            } => {
                assert_eq!(name, "db");
                assert_eq!(credentials.as_deref(), Some(r#"{"user":"u"}"#));
                assert_eq!(tags, vec!["a"]);
            },
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_cli_parses() {
        let args = Args::try_parse_from([
            "cf-tools",
            "--target",
            "dev",
            "services",
            "--kind",
            "ups",
            "-f",
            "names=db",
        ])
        .unwrap();
        assert_eq!(args.target.as_deref(), Some("dev"));
        assert!(matches!(
            args.command,
            Command::Services {
                kind: ServiceKind::Ups,
                ..
            }
        ));
    }
}
