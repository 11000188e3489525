//! # termhub
//!
//! Terminal session host binary.
//!
//! Spawns one shell session through the warm-pool / flow-control stack and
//! bridges it to the local terminal: session output goes to stdout, local
//! stdin goes to the shell, and flood/overflow notifications go to the log.

use std::sync::Arc;

use anyhow::Context;
use termhub_core::{ActivityTier, AppConfig, Notifier};
use termhub_pool::ProcessPool;

use termhub::{EventBus, SessionManager, StdoutSink};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries the session's bytes
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let config = match args.iter().position(|arg| arg == "--config") {
        Some(i) => {
            let path = args.get(i + 1).context("--config requires a path")?;
            AppConfig::from_file(path)?
        }
        None => AppConfig::default(),
    };

    tracing::info!("termhub starting (pool size {})", config.pool.size);

    let bus = Arc::new(EventBus::new(64));
    let mut events = bus.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            tracing::warn!("notification: topic={} payload={}", event.topic, event.payload);
        }
    });

    let pool = Arc::new(ProcessPool::new(
        config.pool.clone(),
        config.terminal.clone(),
    ));
    pool.warm_pool(None).await;

    let manager = SessionManager::new(config, Arc::clone(&pool), bus.clone() as Arc<dyn Notifier>);

    let session = manager.create_session(None, Arc::new(StdoutSink)).await?;
    session.set_activity_tier(ActivityTier::Focused);
    tracing::info!("Session ready: id={}", session.id());

    // Bridge local stdin to the shell on a plain thread; stdin reads block
    let input_session = Arc::clone(&session);
    std::thread::spawn(move || {
        use std::io::Read;

        let mut stdin = std::io::stdin();
        let mut buf = [0u8; 1024];
        loop {
            match stdin.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if input_session.write_input(&buf[..n]).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });

    // Run until the shell exits
    while session.is_alive() {
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    }
    session.flush();

    tracing::info!("Session ended; shutting down");
    manager.shutdown();

    Ok(())
}
