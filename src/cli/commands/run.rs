use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use workstation_brain::{
    spawn_consumer, AssignmentConsumer, AssignmentResolver, ChannelSink, DetectionConsumer,
    DetectionParser, HandConsumer, HandParser, Orchestrator, Publisher, SharedState,
    ShutdownCoordinator, StationMetrics, StdioBus, TopicRouter,
};

use super::{load_station, Command};

const CONSUMER_QUEUE: usize = 64;
const OUTBOUND_QUEUE: usize = 256;

pub struct RunCommand {
    pub config: Option<PathBuf>,
    pub catalog: Option<PathBuf>,
}

impl RunCommand {
    pub fn new(config: Option<PathBuf>, catalog: Option<PathBuf>) -> Self {
        Self { config, catalog }
    }
}

impl Command for RunCommand {
    async fn execute(&self) -> Result<()> {
        let (config, catalog, _) = load_station(self.config.as_deref(), self.catalog.as_deref())?;
        info!(
            station = %config.station.id,
            confirmation_cell = %config.confirmation_cell().label(),
            "Starting workstation"
        );

        let metrics = Arc::new(StationMetrics::new());
        let shared = Arc::new(SharedState::new(
            config.detection.combination_scope,
            config.hand_stale_after(),
        ));
        let shutdown = ShutdownCoordinator::default();

        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE);
        let sink = ChannelSink::new(config.topics.clone(), outbound_tx);
        let publisher = Publisher::new(Arc::new(sink), metrics.clone());
        let (assignment_tx, assignment_rx) = mpsc::unbounded_channel();

        let mut router = TopicRouter::new(metrics.clone());
        let mut consumers = Vec::new();

        let (tx, rx) = mpsc::channel(CONSUMER_QUEUE);
        router.add_route(config.topics.detection.clone(), tx);
        let parser = DetectionParser::new(config.detection.clone())
            .context("invalid detection key prefix")?;
        consumers.push(spawn_consumer(
            DetectionConsumer::new(shared.clone(), parser),
            rx,
            metrics.clone(),
        ));

        let (tx, rx) = mpsc::channel(CONSUMER_QUEUE);
        router.add_route(config.topics.hands.clone(), tx);
        consumers.push(spawn_consumer(
            HandConsumer::new(shared.clone(), HandParser::new(config.grid_mapper())),
            rx,
            metrics.clone(),
        ));

        let (tx, rx) = mpsc::channel(CONSUMER_QUEUE);
        router.add_route(config.topics.assignment.clone(), tx);
        consumers.push(spawn_consumer(
            AssignmentConsumer::new(
                AssignmentResolver::new(catalog.clone()),
                assignment_tx,
                metrics.clone(),
            ),
            rx,
            metrics.clone(),
        ));

        let writer = tokio::spawn(async move {
            if let Err(e) = StdioBus::run_stdout(outbound_rx).await {
                error!(error = %e, "Bus writer failed");
            }
        });

        let reader_shutdown = shutdown.subscribe();
        let trigger = shutdown.trigger_handle();
        let reader = tokio::spawn(async move {
            match StdioBus::run_stdin(router, reader_shutdown).await {
                Ok(()) => info!("Bus input closed"),
                Err(e) => error!(error = %e, "Bus reader failed"),
            }
            trigger.send_replace(true);
        });

        let _signals = shutdown.install_signal_handlers();
        let orchestrator =
            Orchestrator::new(config, catalog, shared, publisher, metrics, assignment_rx);
        let control = tokio::spawn(orchestrator.run(shutdown.subscribe()));

        let mut stopping = shutdown.subscribe();
        if stopping.wait_for(|stop| *stop).await.is_err() {
            warn!("Shutdown channel closed unexpectedly");
        }

        shutdown.wait_for("orchestrator", control).await?;
        shutdown.wait_for("bus reader", reader).await?;
        for consumer in consumers {
            shutdown.wait_for("consumer", consumer).await?;
        }
        shutdown.wait_for("bus writer", writer).await?;

        info!("Workstation stopped");
        Ok(())
    }
}
