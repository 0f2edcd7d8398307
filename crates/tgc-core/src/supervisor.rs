//! Runs one ingestion pipeline per configured account.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::{
    sync::{mpsc, Semaphore},
    task::{JoinError, JoinSet},
};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::{
    delivery::{notify::OwnerHandle, sender::Delivery, sender::Sender, AccountState, DeliverySettings},
    generation::{retry::RetryingGenerator, CommentGenerator},
    platform::{port::ChatPlatform, types::RawPost},
    resolver::UpdateResolver,
    session_config::{SessionConfig, SessionConfigRepo},
    Error, Result,
};

/// Opens a platform connection for one account.
#[async_trait]
pub trait PlatformFactory: Send + Sync {
    async fn connect(&self, session: &SessionConfig) -> Result<Arc<dyn ChatPlatform>>;
}

#[derive(Clone)]
pub struct Supervisor {
    repo: Arc<dyn SessionConfigRepo>,
    factory: Arc<dyn PlatformFactory>,
    generator: Arc<dyn CommentGenerator>,
    settings: DeliverySettings,
    /// Process-wide owner, overridden per account.
    owner: Option<String>,
}

impl Supervisor {
    pub fn new(
        repo: Arc<dyn SessionConfigRepo>,
        factory: Arc<dyn PlatformFactory>,
        generator: Arc<dyn CommentGenerator>,
        settings: DeliverySettings,
        owner: Option<String>,
    ) -> Self {
        Self {
            repo,
            factory,
            generator,
            settings,
            owner,
        }
    }

    /// Run every account until `cancel` fires.
    ///
    /// Accounts that stop on their own (rate limit, closed stream) stay down
    /// while the process waits for shutdown. Fails when there is no account to
    /// run or none of them could be started.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        let names = self.repo.list_sessions().await?;
        if names.is_empty() {
            return Err(Error::Config("no sessions configured".to_string()));
        }
        tracing::info!(accounts = names.len(), "starting accounts");

        let mut accounts = JoinSet::new();
        for name in names {
            let this = self.clone();
            let token = cancel.child_token();
            let span = tracing::info_span!("session", session = %name);
            accounts.spawn(async move { this.run_account(&name, token).await }.instrument(span));
        }

        let mut started = 0usize;
        while let Some(res) = accounts.join_next().await {
            match res {
                Ok(true) => started += 1,
                Ok(false) => {}
                Err(e) => tracing::error!(error = %e, "account task aborted"),
            }
        }

        if started == 0 {
            return Err(Error::Config("no account could be started".to_string()));
        }
        if !cancel.is_cancelled() {
            tracing::warn!("all accounts stopped, waiting for shutdown");
            cancel.cancelled().await;
        }
        tracing::info!("all accounts stopped");
        Ok(())
    }

    /// Returns whether the account got as far as connecting.
    async fn run_account(&self, name: &str, cancel: CancellationToken) -> bool {
        let cfg = match self.repo.get_session_config(name).await {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::error!(error = %e, "account config invalid, skipping");
                return false;
            }
        };
        let platform = match self.factory.connect(&cfg).await {
            Ok(p) => p,
            Err(e) => {
                tracing::error!(error = %e, "account connection failed, skipping");
                return false;
            }
        };

        self.serve(&cfg, platform.clone(), &cancel).await;

        platform.close().await;
        tracing::info!("account stopped");
        true
    }

    async fn serve(
        &self,
        cfg: &SessionConfig,
        platform: Arc<dyn ChatPlatform>,
        cancel: &CancellationToken,
    ) {
        join_channels(platform.as_ref(), &cfg.channels, cancel).await;

        let updates = match platform.listen().await {
            Ok(rx) => rx,
            Err(e) => {
                tracing::error!(error = %e, "cannot listen for updates");
                return;
            }
        };

        let owner = cfg
            .owner
            .as_deref()
            .or(self.owner.as_deref())
            .and_then(OwnerHandle::parse);
        let state = Arc::new(AccountState::new(&self.settings, owner));
        let resolver = UpdateResolver::new(platform.clone(), state.clone());
        let sender = Arc::new(Sender::new(
            platform,
            RetryingGenerator::new(self.generator.clone(), self.settings.retry),
            self.settings,
            state,
        ));
        let admission = Arc::new(Semaphore::new(self.settings.max_in_flight.max(1)));

        tracing::info!("listening for channel posts");
        ingest(updates, &resolver, sender, admission, cancel).await;
    }
}

async fn join_channels(platform: &dyn ChatPlatform, channels: &[String], cancel: &CancellationToken) {
    for handle in channels {
        if cancel.is_cancelled() {
            return;
        }
        match platform.join_channel(handle).await {
            Ok(()) => tracing::info!(channel = %handle, "subscribed"),
            Err(e) => tracing::warn!(channel = %handle, error = %e, "subscribe failed"),
        }
    }
}

/// Read posts, admit candidates under the semaphore and deliver them, then drain.
async fn ingest(
    mut updates: mpsc::Receiver<RawPost>,
    resolver: &UpdateResolver,
    sender: Arc<Sender>,
    admission: Arc<Semaphore>,
    cancel: &CancellationToken,
) {
    let mut tasks = JoinSet::new();

    loop {
        let post = tokio::select! {
            _ = cancel.cancelled() => break,
            Some(res) = tasks.join_next(), if !tasks.is_empty() => {
                log_task_exit(res);
                continue;
            }
            post = updates.recv() => match post {
                Some(p) => p,
                None => {
                    tracing::info!("update stream closed");
                    break;
                }
            },
        };

        let candidate = tokio::select! {
            _ = cancel.cancelled() => break,
            c = resolver.resolve(post) => c,
        };
        let Some(candidate) = candidate else {
            continue;
        };

        // Saturated: wait here instead of dropping the candidate.
        let permit = tokio::select! {
            _ = cancel.cancelled() => break,
            p = admission.clone().acquire_owned() => match p {
                Ok(p) => p,
                Err(_) => break,
            },
        };

        let sender = sender.clone();
        let cancel = cancel.clone();
        tasks.spawn(
            async move {
                let _permit = permit;
                let chat_id = candidate.chat_id.0;
                let thread_id = candidate.thread_id.0;
                match sender.send_comment(&candidate, &cancel).await {
                    Ok(Delivery::Sent { permalink }) => {
                        tracing::info!(chat_id, thread_id, link = ?permalink, "comment delivered");
                    }
                    Ok(Delivery::Skipped(reason)) => {
                        tracing::info!(chat_id, thread_id, %reason, "comment skipped");
                    }
                    Err(Error::RateLimited) => {
                        tracing::warn!(chat_id, thread_id, "account rate limited, shutting it down");
                        cancel.cancel();
                    }
                    Err(Error::Cancelled) => {
                        tracing::debug!(chat_id, thread_id, "delivery cancelled");
                    }
                    Err(e) => {
                        tracing::warn!(chat_id, thread_id, error = %e, "delivery failed");
                    }
                }
            }
            .in_current_span(),
        );
    }

    drop(updates);
    if !tasks.is_empty() {
        tracing::info!(in_flight = tasks.len(), "draining deliveries");
    }
    while let Some(res) = tasks.join_next().await {
        log_task_exit(res);
    }
}

fn log_task_exit(res: std::result::Result<(), JoinError>) {
    if let Err(e) = res {
        tracing::error!(error = %e, "delivery task aborted");
    }
}
