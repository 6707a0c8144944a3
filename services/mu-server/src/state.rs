//! Application state: every long-lived collaborator `mu-server` wires
//! together, following `openibank_api::state::AppState`'s
//! `Arc`-of-services-behind-`Clone`-handle shape.

use crate::config::Args;
use crate::delivery::{DiscordDelivery, SlackDelivery, TelegramDelivery, TerminalDelivery};
use crate::executor::{IssueCommandExecutor, NoopOperatorBackend};
use crate::issue_store::IssueStore;
use crate::reload::PolicyReloader;
use mu_adapters::{DiscordAdapter, SlackAdapter, TelegramAdapter, TerminalAdapter};
use mu_outbox::{Outbox, OutboxWorker};
use mu_pipeline::CommandPipeline;
use mu_reload::ReloadManager;
use mu_store::{AdapterAuditLog, CommandJournal, ControlPlanePaths, IdempotencyIndex, IdentityStore, WriterLock};
use mu_types::channel::Channel;
use mu_types::error::MuError;
use mu_types::generation::GenerationIdentity;
use mu_types::policy::Policy;
use std::sync::{Arc, RwLock};

pub struct AppState {
    pub paths: ControlPlanePaths,
    pub identity_store: Arc<IdentityStore>,
    pub commands: Arc<CommandJournal>,
    pub idempotency: Arc<IdempotencyIndex>,
    pub issues: Arc<IssueStore>,
    pub adapter_audit: Arc<AdapterAuditLog>,
    pub outbox: Arc<Outbox>,
    pub policy: Arc<RwLock<Policy>>,
    pub pipeline: Arc<CommandPipeline>,
    pub reload: Arc<ReloadManager<PolicyReloader>>,
    pub slack: Arc<SlackAdapter>,
    pub discord: Arc<DiscordAdapter>,
    pub telegram: Arc<TelegramAdapter>,
    pub terminal: Arc<TerminalAdapter>,
    pub args: Args,
}

impl AppState {
    /// Bring up every journal, the command pipeline, and the adapters.
    /// Does not acquire the writer lock or spawn background tasks - the
    /// caller (`main`) owns that sequencing.
    pub fn bootstrap(args: Args, now_ms: i64) -> Result<Self, MuError> {
        let paths = ControlPlanePaths::new(&args.repo_root);
        paths.ensure_dir()?;

        let identity_store = Arc::new(IdentityStore::open(&paths.identities_jsonl)?);
        let commands = Arc::new(CommandJournal::open(&paths.commands_jsonl)?);
        let idempotency = Arc::new(IdempotencyIndex::open(&paths.idempotency_jsonl)?);
        let issues_path = paths.control_plane_dir.join("issues.jsonl");
        let issues = Arc::new(IssueStore::open(issues_path)?);
        let adapter_audit = Arc::new(AdapterAuditLog::open(&paths.adapter_audit_jsonl));
        let outbox = Arc::new(Outbox::open(&paths.outbox_jsonl)?);

        let loaded_policy = mu_store::policy_store::load(&paths.policy_json)?;
        let policy = Arc::new(RwLock::new(loaded_policy));

        let executor = Arc::new(IssueCommandExecutor::new(issues.clone()));
        let operator = Arc::new(NoopOperatorBackend);
        let pipeline = Arc::new(CommandPipeline::new(
            identity_store.clone(),
            idempotency.clone(),
            commands.clone(),
            policy.clone(),
            executor,
            operator,
        ));

        let reloader = PolicyReloader::new(paths.policy_json.clone(), policy.clone());
        let initial_handle = policy.read().unwrap().clone();
        let reload = Arc::new(ReloadManager::new(reloader, initial_handle, GenerationIdentity::genesis()));

        let slack = Arc::new(SlackAdapter::new(args.slack_signing_secret.clone(), args.repo_root.clone()));
        let discord = Arc::new(DiscordAdapter::new(args.discord_public_key_or_secret.clone(), args.repo_root.clone()));
        let telegram = Arc::new(TelegramAdapter::new(
            args.telegram_secret_token.clone(),
            args.repo_root.clone(),
            args.telegram_bot_username.clone(),
        ));
        let terminal = Arc::new(TerminalAdapter::new(args.terminal_shared_secret.clone(), args.repo_root.clone()));

        let _ = now_ms;
        Ok(Self {
            paths,
            identity_store,
            commands,
            idempotency,
            issues,
            adapter_audit,
            outbox,
            policy,
            pipeline,
            reload,
            slack,
            discord,
            telegram,
            terminal,
            args,
        })
    }

    /// Build the delivery worker with every channel's outbound transport
    /// registered (spec.md §4.7).
    pub fn build_outbox_worker(&self) -> OutboxWorker {
        OutboxWorker::new(self.outbox.clone())
            .with_max_attempts(self.args.outbox_max_attempts)
            .register_channel(Channel::Slack, Arc::new(SlackDelivery::new(self.args.slack_bot_token.clone())))
            .register_channel(Channel::Discord, Arc::new(DiscordDelivery::new(self.args.discord_bot_token.clone())))
            .register_channel(Channel::Telegram, Arc::new(TelegramDelivery::new(self.args.telegram_bot_token.clone())))
            .register_channel(Channel::Terminal, Arc::new(TerminalDelivery))
    }

    pub fn acquire_writer_lock(&self, now_ms: i64) -> Result<WriterLock, MuError> {
        WriterLock::acquire(&self.paths.writer_lock, "mu-server", &self.args.repo_root, now_ms)
    }
}
