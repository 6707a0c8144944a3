//! CLI + environment configuration (SPEC_FULL.md §10.4).
//!
//! `dotenvy` loads a local `.env` file (if present) before `clap` reads
//! environment variables, the way `openibank-api-server` layers
//! environment overrides onto its settings structs - but here the
//! environment *is* the config, there is no TOML file to merge against.

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "mu-server")]
#[command(author, version, about = "mu control plane HTTP server", long_about = None)]
pub struct Args {
    /// Repo root the control plane state lives under (`.mu/control-plane/`).
    #[arg(long, env = "MU_REPO_ROOT")]
    pub repo_root: String,

    /// Port to bind the HTTP server to.
    #[arg(long, env = "MU_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Slack slash-command signing secret.
    #[arg(long, env = "MU_SLACK_SIGNING_SECRET", default_value = "")]
    pub slack_signing_secret: String,

    /// Discord interaction public key, used as the HMAC secret.
    #[arg(long, env = "MU_DISCORD_PUBLIC_KEY_OR_SECRET", default_value = "")]
    pub discord_public_key_or_secret: String,

    /// Telegram bot webhook secret token.
    #[arg(long, env = "MU_TELEGRAM_SECRET_TOKEN", default_value = "")]
    pub telegram_secret_token: String,

    /// Telegram bot username, for `/mu@botname` mention matching.
    #[arg(long, env = "MU_TELEGRAM_BOT_USERNAME", default_value = "mu_bot")]
    pub telegram_bot_username: String,

    /// Shared secret required on terminal/`/api/commands/submit` ingress.
    #[arg(long, env = "MU_TERMINAL_SHARED_SECRET", default_value = "")]
    pub terminal_shared_secret: String,

    /// Bot token used to post outbound Slack messages (`chat.postMessage`).
    #[arg(long, env = "MU_SLACK_BOT_TOKEN", default_value = "")]
    pub slack_bot_token: String,

    /// Bot token used to post outbound Discord messages.
    #[arg(long, env = "MU_DISCORD_BOT_TOKEN", default_value = "")]
    pub discord_bot_token: String,

    /// Bot token used to post outbound Telegram messages (`sendMessage`).
    #[arg(long, env = "MU_TELEGRAM_BOT_TOKEN", default_value = "")]
    pub telegram_bot_token: String,

    /// Log level passed to `EnvFilter` when `RUST_LOG` is unset.
    #[arg(long, env = "MU_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Outbox delivery worker poll interval, milliseconds.
    #[arg(long, env = "MU_OUTBOX_POLL_MS", default_value_t = 500)]
    pub outbox_poll_ms: u64,

    /// Confirmation-expiry sweeper interval, milliseconds.
    #[arg(long, env = "MU_CONFIRMATION_SWEEP_MS", default_value_t = 5_000)]
    pub confirmation_sweep_ms: u64,

    /// Maximum outbox delivery attempts before dead-lettering.
    #[arg(long, env = "MU_OUTBOX_MAX_ATTEMPTS", default_value_t = mu_outbox::DEFAULT_MAX_ATTEMPTS)]
    pub outbox_max_attempts: u32,
}

impl Args {
    /// `dotenvy::dotenv()` then `Args::parse()`, following
    /// `openibank-api-server`'s environment-first loading order.
    pub fn load() -> Self {
        if let Err(e) = dotenvy::dotenv() {
            tracing::debug!(error = %e, "no .env file loaded");
        }
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_only_repo_root_is_given() {
        let args = Args::parse_from(["mu-server", "--repo-root", "/tmp/repo"]);
        assert_eq!(args.port, 8080);
        assert_eq!(args.outbox_max_attempts, mu_outbox::DEFAULT_MAX_ATTEMPTS);
    }
}
