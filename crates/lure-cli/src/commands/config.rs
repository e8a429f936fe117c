use std::env;
use std::path::PathBuf;

use lure_core::config::setting_value;

use crate::cli::ConfigCommands;
use crate::commands::common::{CliContext, API_TOKEN_ENV, PROFILE_ENV};
use crate::config_profiles::{default_config_path, CliProfilesConfig};
use crate::error::CliError;

pub fn run_config(
    command: ConfigCommands,
    global_profile: Option<&str>,
    global_db_path: Option<PathBuf>,
) -> Result<(), CliError> {
    match command {
        ConfigCommands::Init {
            profile,
            api_base_url,
            db_path,
            no_activate,
        } => run_config_init(
            profile.as_deref().or(global_profile),
            api_base_url,
            db_path.or(global_db_path),
            no_activate,
        ),
        ConfigCommands::Show => run_config_show(global_profile, global_db_path),
    }
}

pub fn run_config_init(
    profile_name: Option<&str>,
    api_base_url: Option<String>,
    db_path: Option<PathBuf>,
    no_activate: bool,
) -> Result<(), CliError> {
    let mut config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name =
        config.resolve_profile_name(profile_name, env::var(PROFILE_ENV).ok().as_deref());

    let profile = config.profile_mut_or_default(&profile_name);
    if let Some(url) = setting_value(api_base_url) {
        profile.api_base_url = Some(url.trim_end_matches('/').to_string());
    }
    if let Some(path) = db_path {
        profile.db_path = Some(path);
    }
    profile.validate().map_err(CliError::Config)?;

    if !no_activate {
        config.active_profile = Some(profile_name.clone());
    }

    let path = config.save().map_err(CliError::Config)?;
    println!(
        "Profile '{}' initialized at {}",
        profile_name,
        path.display()
    );

    let has_api = config
        .profile(&profile_name)
        .and_then(crate::config_profiles::CliProfile::api_base_url)
        .is_some();
    if !has_api {
        println!(
            "Profile '{profile_name}' has no API base URL; saves will stay queued until one is set with `lure config init --api-base-url <URL>`."
        );
    }
    Ok(())
}

pub fn run_config_show(
    profile_name: Option<&str>,
    db_path: Option<PathBuf>,
) -> Result<(), CliError> {
    let context = CliContext::resolve(db_path, profile_name)?;
    let config_path = default_config_path().map_err(CliError::Config)?;
    for line in format_context_lines(&context, &config_path.display().to_string()) {
        println!("{line}");
    }
    Ok(())
}

pub fn format_context_lines(context: &CliContext, config_path: &str) -> Vec<String> {
    vec![
        format!("config:       {config_path}"),
        format!("profile:      {}", context.profile),
        format!("database:     {}", context.db_path.display()),
        format!(
            "api base url: {}",
            context.api_base_url.as_deref().unwrap_or("(not set)")
        ),
        format!(
            "api token:    {}",
            if context.api_token.is_some() {
                format!("set via {API_TOKEN_ENV}")
            } else {
                "(not set)".to_string()
            }
        ),
    ]
}
