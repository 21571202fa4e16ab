use clap::Parser;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tunwatch::cli::Cli;
use tunwatch::engine::types::{ProxyStats, ShutdownFlag, Tuning};
use tunwatch::engine::SuspicionEngine;
use tunwatch::logger::{Event, Logger, SharedLogger};
use tunwatch::proxy::Proxy;

fn main() {
    let cli = Cli::parse();

    // Shared shutdown flag: set by the ctrl-c handler, checked by the accept
    // loop and the background threads.
    let shutdown: ShutdownFlag = Arc::new(AtomicBool::new(false));
    let session_start = Instant::now();

    let logger: SharedLogger = Arc::new(
        Logger::new(cli.json, cli.log_file.as_deref()).expect("Failed to open log file"),
    );
    let stats = ProxyStats::new();

    register_shutdown_handler(Arc::clone(&shutdown));

    // ── Engine ────────────────────────────────────────────────────────────────
    let tuning = build_tuning(&cli);
    let engine = match SuspicionEngine::new(tuning, Arc::clone(&logger), Arc::clone(&stats)) {
        Ok(engine) => Arc::new(engine),
        Err(e) => {
            logger.log(&Event::Info { message: &format!("Engine init failed: {e}") });
            process::exit(1);
        }
    };

    // ── Proxy substrate ───────────────────────────────────────────────────────
    let mut proxy = match Proxy::new(Arc::clone(&logger), Arc::clone(&stats), cli.verbose) {
        Ok(proxy) => proxy,
        Err(e) => {
            logger.log(&Event::Info { message: &format!("Proxy init failed: {e}") });
            process::exit(1);
        }
    };
    Arc::clone(&engine).register(&mut proxy);
    let proxy = Arc::new(proxy);

    let background = engine.start(Arc::clone(&shutdown));

    logger.log(&Event::Info {
        message: &format!("tunwatch proxy listening on {}", cli.addr),
    });

    // ── Serve ─────────────────────────────────────────────────────────────────
    if let Err(e) = proxy.serve(&cli.addr, Arc::clone(&shutdown)) {
        logger.log(&Event::Info {
            message: &format!("Cannot listen on {}: {}", cli.addr, e),
        });
        shutdown.store(true, Ordering::SeqCst);
        process::exit(1);
    }

    for handle in background {
        let _ = handle.join();
    }

    print_summary(&logger, &stats, session_start);
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Registers a signal handler for graceful shutdown on Ctrl+C.
fn register_shutdown_handler(shutdown: ShutdownFlag) {
    ctrlc::set_handler(move || {
        println!("\n[!] Ctrl+C received — shutting down...");
        shutdown.store(true, Ordering::SeqCst);
    })
    .expect("Failed to register Ctrl+C handler");
}

/// Builds the engine tuning from CLI arguments.
fn build_tuning(cli: &Cli) -> Tuning {
    Tuning {
        block_threshold: cli.block_threshold,
        decay_amount:    cli.decay_amount,
        decay_interval:  Duration::from_secs(cli.decay_interval),
        session_timeout: Duration::from_secs(cli.session_timeout),
        evict_interval:  Duration::from_secs(cli.evict_interval),
        replay_limit:    cli.replay_limit,
    }
}

/// Prints a summary of the run on shutdown.
fn print_summary(logger: &SharedLogger, stats: &Arc<ProxyStats>, session_start: Instant) {
    logger.log(&Event::SessionSummary {
        duration_secs:    session_start.elapsed().as_secs(),
        requests_total:   stats.requests_total.load(Ordering::Relaxed),
        responses_total:  stats.responses_total.load(Ordering::Relaxed),
        blocked_total:    stats.blocked_total.load(Ordering::Relaxed),
        sessions_created: stats.sessions_created.load(Ordering::Relaxed),
        alerts_emitted:   stats.alerts_emitted.load(Ordering::Relaxed),
    });
}
