use std::sync::Arc;

use tokio::signal;
use tokio_util::sync::CancellationToken;

use tgc_core::{
    config::Config, session_config::JsonSessionConfigRepo, supervisor::Supervisor,
};
use tgc_openai::NeuroClient;
use tgc_telegram::TelegramFactory;

#[tokio::main]
async fn main() -> Result<(), tgc_core::Error> {
    tgc_core::logging::init("tgc")?;

    let cfg = Config::load()?;
    tracing::info!(
        sessions_dir = %cfg.sessions_dir.display(),
        model = %cfg.neuro_model,
        "starting comment bot"
    );

    let generator = Arc::new(NeuroClient::new(
        cfg.neuro_addr.clone(),
        cfg.neuro_token.clone(),
        cfg.neuro_model.clone(),
        cfg.comment_prompt.clone(),
        cfg.neuro_timeout,
    ));
    let supervisor = Supervisor::new(
        Arc::new(JsonSessionConfigRepo::new(cfg.sessions_dir.clone())),
        Arc::new(TelegramFactory),
        generator,
        cfg.delivery_settings(),
        cfg.owner.clone(),
    );

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            cancel.cancel();
        }
    });

    supervisor.run(cancel).await
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!(error = %e, "cannot listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received terminate signal, shutting down"),
    }
}
