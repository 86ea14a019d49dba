use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::config::BroadcastConfig;
use crate::error::{BroadcasterError, Result};
use crate::record::WitsGenerator;
use crate::session::Session;
use crate::shutdown::Shutdown;

/// How a broadcast run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// `stop()` was called
    Stopped,
    /// The peer went away or a write failed
    ConnectionLost,
}

/// Periodic WITS broadcaster.
///
/// Accepts one client through its [`Session`], then generates and sends a
/// batch of records every `frequency` until stopped or the client is lost.
pub struct WitsServer<S: Session> {
    session: Arc<S>,
    generator: WitsGenerator,
    config: BroadcastConfig,
    running: AtomicBool,
    cycles: AtomicU64,
    shutdown: Shutdown,
}

impl<S: Session> WitsServer<S> {
    pub fn new(session: Arc<S>, generator: WitsGenerator, config: BroadcastConfig) -> Self {
        Self {
            session,
            generator,
            config,
            running: AtomicBool::new(false),
            cycles: AtomicU64::new(0),
            shutdown: Shutdown::new(),
        }
    }

    /// Run the broadcast loop until stopped or the client disconnects
    pub async fn start(&self) -> Result<RunOutcome> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(BroadcasterError::AlreadyRunning);
        }
        self.shutdown.reset();
        self.cycles.store(0, Ordering::SeqCst);
        let mut stop_requested = self.shutdown.subscribe();

        if let Err(e) = self.session.start().await {
            self.running.store(false, Ordering::SeqCst);
            return Err(e);
        }
        if !self.running.load(Ordering::SeqCst) {
            // stopped while the session was binding
            self.session.stop_server().await;
            return Ok(RunOutcome::Stopped);
        }

        tracing::info!(
            "WitsServer started: port={} frequency={:?} records={} items={}",
            self.config.port(),
            self.config.frequency(),
            self.config.records(),
            self.config.items()
        );

        let frequency = self.config.frequency();
        let records = i64::from(self.config.records());
        let items = i64::from(self.config.items());

        while self.running.load(Ordering::SeqCst) {
            let started = Instant::now();

            let block = match self.generator.generate(records, items) {
                Ok(block) => block,
                Err(e) => {
                    self.running.store(false, Ordering::SeqCst);
                    self.session.stop_server().await;
                    return Err(e);
                }
            };
            if let Err(e) = self.session.writeln(&block).await {
                if !self.running.swap(false, Ordering::SeqCst) {
                    // stop() tore the session down under us
                    break;
                }
                tracing::warn!("Client lost: {}", e);
                self.session.stop_server().await;
                return Ok(RunOutcome::ConnectionLost);
            }

            let cycle = self.cycles.fetch_add(1, Ordering::SeqCst) + 1;
            let elapsed = started.elapsed();
            tracing::debug!("Cycle {} sent {} bytes in {:?}", cycle, block.len() + 1, elapsed);

            let remaining = frequency.saturating_sub(elapsed);
            if remaining.is_zero() {
                // overran the interval: next cycle right away, but let stop() in
                tokio::task::yield_now().await;
                continue;
            }
            tokio::select! {
                _ = tokio::time::sleep(remaining) => {}
                _ = stop_requested.wait() => break,
            }
        }

        Ok(RunOutcome::Stopped)
    }

    /// Stop the loop and release the session. Idempotent.
    pub async fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            self.shutdown.trigger();
            self.session.stop_server().await;
            tracing::info!("WitsServer stopped after {} cycles", self.cycles());
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn server_is_alive(&self) -> bool {
        self.session.is_alive()
    }

    /// Completed write cycles in the current or last run
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &BroadcastConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::Notify;

    /// In-memory session recording every line written
    #[derive(Default)]
    struct MockSession {
        writes: Mutex<Vec<String>>,
        fail_on: Option<usize>,
        notify_after: Option<usize>,
        written: Notify,
        starts: AtomicU64,
        stops: AtomicU64,
        alive: AtomicBool,
    }

    impl MockSession {
        fn failing_on(call: usize) -> Self {
            Self {
                fail_on: Some(call),
                ..Default::default()
            }
        }

        fn notifying_after(writes: usize) -> Self {
            Self {
                notify_after: Some(writes),
                ..Default::default()
            }
        }

        fn writes(&self) -> Vec<String> {
            self.writes.lock().unwrap().clone()
        }
    }

    impl Session for MockSession {
        async fn start(&self) -> Result<()> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            self.alive.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn writeln(&self, text: &str) -> Result<()> {
            let count = {
                let mut writes = self.writes.lock().unwrap();
                if self.fail_on == Some(writes.len() + 1) {
                    return Err(BroadcasterError::BrokenConnection(std::io::Error::new(
                        std::io::ErrorKind::BrokenPipe,
                        "peer closed",
                    )));
                }
                writes.push(text.to_string());
                writes.len()
            };
            if self.notify_after == Some(count) {
                self.written.notify_one();
            }
            Ok(())
        }

        fn is_alive(&self) -> bool {
            self.alive.load(Ordering::SeqCst)
        }

        async fn stop_server(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
            self.alive.store(false, Ordering::SeqCst);
        }
    }

    fn server(
        session: MockSession,
        frequency_ms: i64,
        records: i64,
        items: i64,
    ) -> Arc<WitsServer<MockSession>> {
        let config = BroadcastConfig::new(4000, frequency_ms, records, items).unwrap();
        Arc::new(WitsServer::new(
            Arc::new(session),
            WitsGenerator::default(),
            config,
        ))
    }

    fn assert_block_shape(text: &str, records: usize, items: usize) {
        let blocks: Vec<&str> = text.split("!!\n").collect();
        assert_eq!(blocks.len(), records);
        assert!(text.starts_with("&&\n"));
        assert!(text.ends_with("!!"));
        let data_lines = items.saturating_sub(7);
        assert_eq!(text.lines().count(), records * (2 + 7 + data_lines));
    }

    #[tokio::test]
    async fn test_stop_after_n_cycles() {
        let server = server(MockSession::notifying_after(3), 50, 2, 10);

        let run = {
            let server = Arc::clone(&server);
            tokio::spawn(async move { server.start().await })
        };

        server.session.written.notified().await;
        server.stop().await;

        let outcome = run.await.unwrap().unwrap();
        assert_eq!(outcome, RunOutcome::Stopped);

        let writes = server.session.writes();
        assert_eq!(writes.len(), 3);
        assert_eq!(server.cycles(), 3);
        for write in &writes {
            assert_block_shape(write, 2, 10);
        }
        assert_eq!(server.session.stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_write_failure_stops_loop() {
        let server = server(MockSession::failing_on(3), 1, 1, 8);

        let outcome = server.start().await.unwrap();
        assert_eq!(outcome, RunOutcome::ConnectionLost);
        assert_eq!(server.session.writes().len(), 2);
        assert_eq!(server.session.stops.load(Ordering::SeqCst), 1);
        assert!(!server.is_running());
        assert!(!server.server_is_alive());

        // stop after a fatal error does nothing more
        server.stop().await;
        assert_eq!(server.session.stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stop_wakes_long_sleep() {
        let server = server(MockSession::notifying_after(1), 60_000, 1, 1);

        let run = {
            let server = Arc::clone(&server);
            tokio::spawn(async move { server.start().await })
        };
        server.session.written.notified().await;

        let begin = Instant::now();
        server.stop().await;
        let outcome = tokio::time::timeout(Duration::from_secs(2), run)
            .await
            .expect("loop should exit promptly")
            .unwrap()
            .unwrap();

        assert_eq!(outcome, RunOutcome::Stopped);
        assert!(begin.elapsed() < Duration::from_secs(2));
        assert_eq!(server.session.writes().len(), 1);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let server = server(MockSession::default(), 1000, 1, 1);
        server.stop().await;
        assert_eq!(server.session.stops.load(Ordering::SeqCst), 0);

        let run = {
            let server = Arc::clone(&server);
            tokio::spawn(async move { server.start().await })
        };
        while server.session.writes().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(server.server_is_alive());

        server.stop().await;
        server.stop().await;
        assert_eq!(run.await.unwrap().unwrap(), RunOutcome::Stopped);
        assert_eq!(server.session.stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_double_start_rejected() {
        let server = server(MockSession::notifying_after(1), 1000, 1, 1);

        let run = {
            let server = Arc::clone(&server);
            tokio::spawn(async move { server.start().await })
        };
        server.session.written.notified().await;

        let second = server.start().await;
        assert!(matches!(second, Err(BroadcasterError::AlreadyRunning)));
        assert_eq!(server.session.starts.load(Ordering::SeqCst), 1);

        server.stop().await;
        run.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_restart_after_stop() {
        let server = server(MockSession::notifying_after(1), 1000, 1, 1);

        let run = {
            let server = Arc::clone(&server);
            tokio::spawn(async move { server.start().await })
        };
        server.session.written.notified().await;
        server.stop().await;
        run.await.unwrap().unwrap();

        let run = {
            let server = Arc::clone(&server);
            tokio::spawn(async move { server.start().await })
        };
        while server.session.writes().len() < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        server.stop().await;
        assert_eq!(run.await.unwrap().unwrap(), RunOutcome::Stopped);
        assert_eq!(server.session.starts.load(Ordering::SeqCst), 2);
        assert_eq!(server.cycles(), 1);
    }

    #[tokio::test]
    async fn test_overrunning_cycles_do_not_sleep() {
        // a 1ms frequency is always exceeded; the loop must keep going
        let server = server(MockSession::notifying_after(20), 1, 99, 99);

        let run = {
            let server = Arc::clone(&server);
            tokio::spawn(async move { server.start().await })
        };
        tokio::time::timeout(Duration::from_secs(5), server.session.written.notified())
            .await
            .unwrap();
        server.stop().await;
        run.await.unwrap().unwrap();
        assert!(server.session.writes().len() >= 20);
    }
}
