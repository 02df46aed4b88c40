//! Command-line interface for Gatehouse
//!
//! `serve` runs the login server, `providers` lists the configured login
//! providers with their callback URLs, and `confirm` marks an identity as
//! verified.

use crate::config::Config;
use crate::constants::CONFIG_FILE_NAMES;
use crate::login::AccountResolver;
use crate::providers::{Handshake, ProviderDescriptor};
use crate::{GatehouseError, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use serde::Serialize;
use std::path::Path;

/// Build the CLI
pub fn build_cli() -> Command {
    Command::new("gatehouse")
        .about("Pluggable OAuth login server with account linking")
        .version(env!("CARGO_PKG_VERSION"))
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .global(true)
                .value_name("PATH")
                .help("Config file (defaults to the first gatehouse.config.* found)"),
        )
        .subcommand(
            Command::new("serve")
                .about("Start the login server")
                .arg(Arg::new("host").long("host").help("Listen address"))
                .arg(
                    Arg::new("port")
                        .long("port")
                        .value_parser(clap::value_parser!(u16))
                        .help("Listen port"),
                )
                .arg(
                    Arg::new("public-url")
                        .long("public-url")
                        .help("Externally visible base URL"),
                ),
        )
        .subcommand(
            Command::new("providers")
                .about("List configured login providers and their callback URLs")
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output as JSON"),
                ),
        )
        .subcommand(
            Command::new("confirm")
                .about("Mark an identity and its account as verified")
                .arg(
                    Arg::new("provider")
                        .long("provider")
                        .required(true)
                        .help("Provider id (google, github, facebook, twitter)"),
                )
                .arg(
                    Arg::new("provider-id")
                        .long("provider-id")
                        .required(true)
                        .help("The user's id at the provider"),
                ),
        )
}

/// Main CLI entry point
pub async fn run() -> Result<()> {
    let matches = build_cli().get_matches();
    let mut config = load_config(&matches)?;

    crate::init_logging(config.log.as_ref().and_then(|l| l.level.as_deref()));

    match matches.subcommand() {
        Some(("serve", sub)) => {
            apply_serve_overrides(&mut config, sub);
            crate::http::start_server(config).await
        }
        Some(("providers", sub)) => print_providers(&config, sub.get_flag("json")),
        Some(("confirm", sub)) => confirm(&config, sub).await,
        _ => Ok(()),
    }
}

/// Load the config file and overlay the environment
///
/// Validation is left to the commands that need a complete config.
fn load_config(matches: &ArgMatches) -> Result<Config> {
    let path = match matches.get_one::<String>("config") {
        Some(path) => {
            if !Path::new(path).exists() {
                return Err(GatehouseError::config(format!(
                    "Config file not found: {}",
                    path
                )));
            }
            path.clone()
        }
        None => CONFIG_FILE_NAMES
            .iter()
            .find(|name| Path::new(name).exists())
            .unwrap_or(&CONFIG_FILE_NAMES[0])
            .to_string(),
    };

    let mut config = Config::load_from_path(&path)?;
    config.overlay_env()?;
    Ok(config)
}

fn apply_serve_overrides(config: &mut Config, matches: &ArgMatches) {
    if let Some(host) = matches.get_one::<String>("host") {
        config.http.host = host.clone();
    }
    if let Some(port) = matches.get_one::<u16>("port") {
        config.http.port = *port;
    }
    if let Some(url) = matches.get_one::<String>("public-url") {
        config.http.public_url = url.clone();
    }
}

/// One configured provider as shown by `providers`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSummary {
    pub id: String,
    pub name: String,
    pub protocol: &'static str,
    pub login_url: String,
    pub callback_url: String,
}

/// Describe every configured provider
pub fn provider_summaries(config: &Config) -> Result<Vec<ProviderSummary>> {
    let ctx = config.login_context()?;

    config
        .providers
        .iter()
        .map(|p| {
            let descriptor = ProviderDescriptor::from_config(p)?;
            let id = descriptor.kind.id();
            Ok(ProviderSummary {
                id: id.to_string(),
                name: descriptor.kind.display_name().to_string(),
                protocol: match descriptor.handshake {
                    Handshake::OAuth2 { .. } => "oauth2",
                    Handshake::OAuth1 { .. } => "oauth1",
                },
                login_url: ctx.login_url(&[id]).to_string(),
                callback_url: ctx.callback_url(id).to_string(),
            })
        })
        .collect()
}

fn print_providers(config: &Config, json: bool) -> Result<()> {
    let summaries = provider_summaries(config)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }

    if summaries.is_empty() {
        println!("No login providers configured");
        return Ok(());
    }

    println!("\nLogin providers:");
    for s in summaries {
        println!("  {} ({}, {})", s.name, s.id, s.protocol);
        println!("    login:    {}", s.login_url);
        println!("    callback: {}", s.callback_url);
    }
    Ok(())
}

async fn confirm(config: &Config, matches: &ArgMatches) -> Result<()> {
    let provider = matches
        .get_one::<String>("provider")
        .ok_or_else(|| GatehouseError::config("--provider is required"))?;
    let provider_id = matches
        .get_one::<String>("provider-id")
        .ok_or_else(|| GatehouseError::config("--provider-id is required"))?;

    let storage = crate::storage::create_storage_from_config(&config.storage).await?;
    let resolver = AccountResolver::new(storage.users);
    let user = resolver.confirm_identity(provider, provider_id).await?;

    tracing::info!(user.id = %user.id, provider = %provider, "identity confirmed");
    println!("{}", serde_json::to_string_pretty(&user)?);
    Ok(())
}
