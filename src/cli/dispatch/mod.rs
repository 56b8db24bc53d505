use crate::cli::{actions::Action, globals::GlobalArgs};
use anyhow::{Context, Result};
use secrecy::SecretString;

pub fn handler(matches: &clap::ArgMatches) -> Result<(Action, GlobalArgs)> {
    let portal_url = matches
        .get_one::<String>("portal-url")
        .map(String::to_string)
        .context("missing required argument: --portal-url")?;

    let mut globals = GlobalArgs::new(portal_url);

    globals.set_credentials(
        matches
            .get_one::<String>("login-id")
            .map(String::to_string)
            .context("missing required argument: --login-id")?,
        matches
            .get_one::<String>("login-pwd")
            .map(|s| SecretString::from(s.as_str()))
            .context("missing required argument: --login-pwd")?,
    );

    globals.token_queue_url = matches
        .get_one::<String>("token-queue-url")
        .map(String::to_string);

    if let Some(url) = matches.get_one::<String>("solver-url") {
        globals.solver_url = url.to_string();
    }

    globals.solver_api_key = matches
        .get_one::<String>("solver-api-key")
        .map(|s| SecretString::from(s.as_str()));

    if let Some(key) = matches.get_one::<String>("solver-site-key") {
        globals.solver_site_key = key.to_string();
    }

    globals.inbox_relay_url = matches
        .get_one::<String>("inbox-relay-url")
        .map(String::to_string)
        .context("missing required argument: --inbox-relay-url")?;

    if let Some(secs) = matches.get_one::<u64>("refresh-interval") {
        globals.refresh_interval = *secs;
    }

    if let Some(secs) = matches.get_one::<u64>("otp-timeout") {
        globals.otp_timeout = *secs;
    }

    let action = Action::Server {
        port: matches.get_one::<u16>("port").copied().unwrap_or(8080),
    };

    Ok((action, globals))
}
