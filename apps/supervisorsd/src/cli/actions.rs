use std::sync::Arc;

use tokio::select;
use tokio::signal::unix::{self, SignalKind};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::cli::{arguments, node::Node};
use crate::config::NodeConfig;

pub async fn run(args: arguments::Run) -> eyre::Result<()> {
    let config = NodeConfig::from_path(args.config)?;

    let level_filter = LevelFilter::from_level(config.logger.level);

    let filter = Targets::new()
        .with_target("supervisors_context", level_filter)
        .with_target("supervisors_fsm", level_filter)
        .with_target("supervisors_transport", level_filter)
        .with_target("supervisors_dispatcher", level_filter)
        .with_target("supervisors_rules", level_filter)
        .with_target("supervisors_process_manager", level_filter)
        .with_target("supervisorsd", level_filter)
        .with_default(level_filter);

    let env_filter = EnvFilter::builder()
        .with_default_directive(level_filter.into())
        .from_env()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(filter))
        .with(env_filter)
        .try_init()?;

    let node = Arc::new(Node::new(config).await?);
    let node_clone = node.clone();

    tokio::spawn(async move {
        if let Err(err) = node_clone.run().await {
            tracing::error!("node cancelled: {:?}", err);
        }
        node_clone.task_tracker.close();
    });

    let mut sigterm =
        unix::signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    let mut sigint =
        unix::signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");

    select! {
        _ = node.cancelled() => {
            tracing::info!("node run failed");
        }
        _ = sigterm.recv() => {
            tracing::info!("received SIGTERM");
        }
        _ = sigint.recv() => {
            tracing::info!("received SIGINT");
        }
    }

    node.shutdown().await;

    Ok(())
}
