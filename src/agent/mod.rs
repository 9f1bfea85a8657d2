pub mod pipeline;
pub mod source;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::AsyncBufReadExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::event::stats::EventStats;
use crate::export::HealthMetrics;
use crate::handler::{HandlerContext, HandlerRegistry, ThreadGrouper};
use crate::metrics::{ExecutionProfile, Meter};

pub use pipeline::EventPipeline;

/// Agent wires the event source, the handler registry and the metrics
/// server together.
pub struct Agent {
    cfg: Config,
    health: Arc<HealthMetrics>,
    profile: Arc<ExecutionProfile>,
    stats: Arc<EventStats>,
    cancel: CancellationToken,
    source_done: CancellationToken,
    consumer: Option<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
}

impl Agent {
    /// Creates a new Agent, initializing health metrics.
    pub fn new(cfg: Config) -> Result<Self> {
        let health = Arc::new(
            HealthMetrics::new(&cfg.health.bind_addr()).context("creating health metrics")?,
        );
        let profile = Arc::new(ExecutionProfile::new(cfg.profile.max_stacks));

        Ok(Self {
            cfg,
            health,
            profile,
            stats: Arc::new(EventStats::new()),
            cancel: CancellationToken::new(),
            source_done: CancellationToken::new(),
            consumer: None,
            local_addr: None,
        })
    }

    /// Builds the handlers, starts the metrics server and begins consuming
    /// the event source.
    pub async fn start(&mut self) -> Result<()> {
        // 1. Build and initialize handlers against the shared registry.
        let meter = Meter::new(self.health.registry().clone());
        let ctx = HandlerContext {
            grouper: ThreadGrouper::new(self.cfg.threads.ignored_groups.iter().cloned()),
            max_groups: self.cfg.threads.max_groups,
            profile: Arc::clone(&self.profile),
        };
        let registry = HandlerRegistry::build(&self.cfg.handlers, &ctx, &meter)
            .context("building handler registry")?;

        for (event, interval) in registry.polling_intervals() {
            info!(event, interval = ?interval, "Handler expects periodic event");
        }

        // 2. Start metrics server so scrapes work before the first event.
        let addr = self
            .health
            .start(Arc::clone(&self.profile))
            .await
            .context("starting metrics server")?;
        self.local_addr = Some(addr);

        // 3. Open the source and spawn the consumer.
        let reader = source::open(&self.cfg.source).await?;
        let pipeline =
            EventPipeline::new(registry, Arc::clone(&self.health), Arc::clone(&self.stats));
        self.spawn_consumer(reader, pipeline);

        info!(source = %self.cfg.source.path, "agent fully started");

        Ok(())
    }

    /// Gracefully stop all components. Unpaired events are discarded.
    pub async fn stop(&mut self) -> Result<()> {
        self.cancel.cancel();

        if let Some(consumer) = self.consumer.take() {
            if let Err(e) = consumer.await {
                warn!(error = %e, "event consumer task failed");
            }
        }

        self.health.stop();

        Ok(())
    }

    /// Cancelled once the event source is exhausted or fails.
    pub fn source_done(&self) -> CancellationToken {
        self.source_done.clone()
    }

    /// Address the metrics server is bound to, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn health(&self) -> &Arc<HealthMetrics> {
        &self.health
    }

    fn spawn_consumer(&mut self, mut reader: source::EventReader, mut pipeline: EventPipeline) {
        let cancel = self.cancel.clone();
        let source_done = self.source_done.clone();
        let stats = Arc::clone(&self.stats);
        let stats_interval = self.cfg.source.stats_interval;

        self.consumer = Some(tokio::spawn(async move {
            // Lines are read as bytes so a non UTF-8 line is dropped on its own.
            let mut buf = Vec::with_capacity(4096);
            let mut ticker = tokio::time::interval(stats_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => log_event_stats(&stats, stats_interval),
                    read = reader.read_until(b'\n', &mut buf) => match read {
                        Ok(0) => {
                            info!("event source exhausted");
                            break;
                        }
                        Ok(_) => {
                            pipeline.process_bytes(&buf);
                            buf.clear();
                        }
                        Err(e) => {
                            error!(error = %e, "reading event source");
                            break;
                        }
                    },
                }
            }

            log_event_stats(&stats, stats_interval);
            source_done.cancel();
        }));
    }
}

fn log_event_stats(stats: &EventStats, interval: Duration) {
    let (snapshot, ignored) = stats.snapshot();
    let total: u64 = snapshot.iter().map(|(_, n)| n).sum();

    if total == 0 && ignored == 0 {
        return;
    }

    info!(dispatched = total, ignored, interval = ?interval, "event stats");

    for (kind, count) in &snapshot {
        debug!(event_type = %kind, count, "  by type");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write;

    fn config_for(path: &str) -> Config {
        let mut cfg = Config::default();
        cfg.source.path = path.to_string();
        cfg.health.addr = "127.0.0.1:0".to_string();
        cfg
    }

    #[tokio::test]
    async fn test_agent_consumes_file_and_signals_done() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(
            file,
            r#"{{"type":"jdk.CPULoad","startTime":1,"fields":{{"jvmUser":0.5}}}}"#
        )
        .expect("write");
        writeln!(file, "not json").expect("write");

        let path = file.path().to_str().expect("utf-8 path").to_string();
        let mut agent = Agent::new(config_for(&path)).expect("agent");
        agent.start().await.expect("start");
        assert!(agent.local_addr().is_some());

        tokio::time::timeout(Duration::from_secs(5), agent.source_done().cancelled())
            .await
            .expect("source exhausted");

        let health = Arc::clone(agent.health());
        assert_eq!(health.events_received.get(), 2.0);
        assert_eq!(health.events_malformed.get(), 1.0);
        let text = health.encode().expect("encode");
        assert!(text.contains("runtime_jvm_cpu_utilization_ratio_count{cpu_usage=\"user\"} 1"));

        agent.stop().await.expect("stop");
    }

    #[tokio::test]
    async fn test_agent_keeps_reading_past_invalid_utf8() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        let cpu = br#"{"type":"jdk.CPULoad","startTime":1,"fields":{"jvmUser":0.5}}"#;
        file.write_all(cpu).expect("write");
        file.write_all(b"\n\xff\xfe garbage\n").expect("write");
        file.write_all(cpu).expect("write");
        file.write_all(b"\n").expect("write");

        let path = file.path().to_str().expect("utf-8 path").to_string();
        let mut agent = Agent::new(config_for(&path)).expect("agent");
        agent.start().await.expect("start");

        tokio::time::timeout(Duration::from_secs(5), agent.source_done().cancelled())
            .await
            .expect("source exhausted");

        let health = Arc::clone(agent.health());
        assert_eq!(health.events_received.get(), 3.0);
        assert_eq!(health.events_malformed.get(), 1.0);
        let text = health.encode().expect("encode");
        assert!(text.contains("runtime_jvm_cpu_utilization_ratio_count{cpu_usage=\"user\"} 2"));

        agent.stop().await.expect("stop");
    }

    #[tokio::test]
    async fn test_start_fails_on_missing_source() {
        let mut agent = Agent::new(config_for("/nonexistent/events.jsonl")).expect("agent");
        assert!(agent.start().await.is_err());
        agent.stop().await.expect("stop");
    }
}
