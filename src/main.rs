mod cli;
mod config;
mod dcc;
mod error;
mod irc;
mod progress;
mod request;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;
use crate::config::Config;
use crate::irc::session;
use crate::request::{addr, group_by_server, DEFAULT_INFO_KEY};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("xget=info")),
        )
        .with_target(false)
        .init();

    let mut cfg = config::load_config(cli.config.as_deref())?;
    apply_cli_overrides(&cli, &mut cfg);

    if !cfg.out_dir.is_dir() {
        bail!("out directory {} doesn't exist", cfg.out_dir.display());
    }

    let tokens = gather_tokens(&cli)?;
    if tokens.is_empty() {
        bail!("no jobs, nothing to do");
    }

    // Parse addresses. A bad token only loses that token.
    let mut requests = Vec::new();
    let mut rejected = 0usize;
    for token in &tokens {
        match addr::parse_address(token) {
            Ok(mut parsed) => {
                for request in &mut parsed {
                    if cfg.servers.contains_key(&request.server) {
                        request.info_key = request.server.clone();
                    }
                }
                requests.extend(parsed);
            }
            Err(err) => {
                error!("{}", err);
                rejected += 1;
            }
        }
    }
    if requests.is_empty() {
        bail!("no jobs, nothing to do");
    }

    let queues = group_by_server(requests);
    for (server, queue) in &queues {
        info!("{} ->", server);
        for request in queue.iter() {
            info!("    {}", request);
        }
    }

    let mut completed = 0usize;
    let mut skipped = 0usize;
    let mut failed = rejected;

    for (server, queue) in queues {
        let remaining = queue.len();
        let info_key = queue
            .iter()
            .next()
            .map(|r| r.info_key.clone())
            .unwrap_or_else(|| DEFAULT_INFO_KEY.to_string());
        let profile = config::resolve_profile(&info_key, &cfg.servers);

        match session::run(server.clone(), profile, queue, &cfg).await {
            Ok(report) => {
                completed += report.completed;
                skipped += report.skipped;
                failed += report.failed;
            }
            Err(err) => {
                error!("{}: {}", server, err);
                failed += remaining;
            }
        }
    }

    info!(
        "{} downloaded, {} skipped, {} failed",
        completed, skipped, failed
    );
    if failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

/// Positional addresses plus the contents of any `--files` lists. Blank lines
/// and `#` comments in list files are ignored.
fn gather_tokens(cli: &Cli) -> Result<Vec<String>> {
    let mut tokens = cli.addresses.clone();
    for file in &cli.files {
        let contents = std::fs::read_to_string(file)
            .with_context(|| format!("failed to read address list {}", file.display()))?;
        tokens.extend(
            contents
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(String::from),
        );
    }
    Ok(tokens)
}

/// CLI flags override the top-level settings and the `"*"` default profile.
fn apply_cli_overrides(cli: &Cli, cfg: &mut Config) {
    if let Some(dir) = &cli.out_dir {
        cfg.out_dir = dir.clone();
    }
    if cli.skip_existing {
        cfg.skip_existing = true;
    }

    if cli.nick.is_some()
        || cli.user.is_some()
        || cli.pass.is_some()
        || cli.realname.is_some()
        || cli.nickserv.is_some()
    {
        let profile = cfg.servers.entry(DEFAULT_INFO_KEY.to_string()).or_default();
        if let Some(nick) = &cli.nick {
            profile.nick = Some(nick.clone());
        }
        if let Some(user) = &cli.user {
            profile.user = Some(user.clone());
        }
        if let Some(pass) = &cli.pass {
            profile.pass = Some(pass.clone());
        }
        if let Some(realname) = &cli.realname {
            profile.realname = Some(realname.clone());
        }
        if let Some(nickserv) = &cli.nickserv {
            profile.nickserv = Some(nickserv.clone());
        }
    }
}
