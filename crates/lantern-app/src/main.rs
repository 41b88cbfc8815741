use std::future;
use std::process::ExitCode;
use std::thread;

use thiserror::Error;
use tokio::runtime::{Builder, Runtime};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use lantern_app::bridge;
use lantern_app::config::{log_filter_from_env, ConfigError, ShellConfig};
use lantern_app::host::DefaultBackend;
use lantern_app::persistence::open_store;
use lantern_app::runtime::{BrowserRuntime, RuntimeError};
use lantern_app::server::HostServer;

#[derive(Debug, Error)]
enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("could not build the {name} event loop: {source}")]
    EventLoop {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("could not spawn the host thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("host thread panicked")]
    HostPanicked,
    #[error(transparent)]
    Browser(#[from] RuntimeError),
}

fn main() -> ExitCode {
    init_tracing();
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!(%error, "lantern stopped");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_filter_from_env()));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}

fn event_loop(name: &'static str) -> Result<Runtime, AppError> {
    Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|source| AppError::EventLoop { name, source })
}

fn run() -> Result<(), AppError> {
    let config = ShellConfig::from_env()?;
    info!(
        state_file = %config.state_file.display(),
        home = config.home.as_str(),
        "starting lantern"
    );
    let (client, subscription, endpoint) = bridge::connect();

    let host_config = config.clone();
    let host = thread::Builder::new()
        .name("lantern-host".to_owned())
        .spawn(move || -> Result<(), AppError> {
            let event_loop = event_loop("host")?;
            event_loop.block_on(async move {
                let store = open_store(&host_config.state_file).await;
                HostServer::new(
                    DefaultBackend::default(),
                    store,
                    endpoint,
                    host_config.content_bounds(),
                )
                .run()
                .await;
            });
            Ok(())
        })
        .map_err(AppError::Spawn)?;

    let interface = event_loop("interface")?;
    let result = interface.block_on(async move {
        let mut runtime = BrowserRuntime::bootstrap(client, config.model_defaults()).await?;
        for input in std::env::args().skip(1) {
            let tab_id = runtime.add_tab(Some(&input)).await?;
            info!(%tab_id, %input, "opened from command line");
        }
        runtime.run(subscription, ctrl_c()).await
    });

    let hosted = host.join().map_err(|_| AppError::HostPanicked)?;
    result?;
    hosted
}

async fn ctrl_c() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(%error, "cannot listen for Ctrl-C, running until the host stops");
        future::pending::<()>().await;
    }
}
