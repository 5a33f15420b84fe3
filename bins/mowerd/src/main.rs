//! mowerd — control daemon for the autonomous mower.

mod controller;

use anyhow::Result;
use clap::Parser;
use controller::Controller;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use teleop::{Telemetry, WsConfig, WsServer};
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use types::Command;

#[derive(Parser)]
#[command(name = "mowerd", about = "Autonomous mower control daemon")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/mower.toml")]
    config: PathBuf,

    /// Force the simulation backend regardless of configuration
    #[arg(long)]
    sim: bool,

    /// WebSocket port for the operator UI (0 to disable). Overrides config.
    #[arg(long)]
    ws_port: Option<u16>,

    /// Log directory for rolling text logs
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    std::process::exit(match run(args).await {
        Ok(interrupted) => {
            if interrupted {
                130
            } else {
                0
            }
        }
        Err(e) => {
            error!(?e, "Fatal initialization failure");
            eprintln!("mowerd: {e:#}");
            1
        }
    });
}

async fn run(args: Args) -> Result<bool> {
    // The guard must live for the whole process so logs flush on exit
    let _log_guard = init_logging(&args.log_dir, &args.log_level)?;

    let mut config = config::MowerConfig::load(&args.config)?;
    if args.sim {
        config.sensors.r#type = "simulation".to_string();
        config.motors.r#type = "simulation".to_string();
        info!("Simulation backend forced from the command line");
    }
    if let Some(port) = args.ws_port {
        config.web_interface.port = port;
        config.web_interface.enabled = port > 0;
    }

    let mut backend = hal::create_backend(&config)?;
    if !backend.start_all() {
        warn!("Some devices failed to start; continuing with degraded capability");
    }

    // Channels to and from the UI boundary
    let (command_tx, mut command_rx) = mpsc::channel::<Command>(32);
    let (telemetry_tx, telemetry_rx) = watch::channel(Telemetry::default());

    if config.web_interface.enabled && config.web_interface.port > 0 {
        let ws_config = WsConfig {
            port: config.web_interface.port,
            telemetry_interval: Duration::from_secs_f64(
                1.0 / config.web_interface.telemetry_hz.max(1) as f64,
            ),
        };
        let server = WsServer::new(ws_config, command_tx.clone(), telemetry_rx.clone());
        tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!(?e, "WebSocket server error");
            }
        });
        info!(port = config.web_interface.port, "Operator interface up");
    }

    // Interrupt/terminate: observed at the tick boundary
    let shutdown = Arc::new(AtomicBool::new(false));
    let interrupted_flag = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        let interrupted_flag = interrupted_flag.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupt received, stopping");
                interrupted_flag.store(true, Ordering::SeqCst);
                shutdown.store(true, Ordering::SeqCst);
            }
        });
    }
    #[cfg(unix)]
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let mut term =
                match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(signal) => signal,
                    Err(e) => {
                        warn!(?e, "SIGTERM handler unavailable");
                        return;
                    }
                };
            term.recv().await;
            info!("Terminate received, stopping");
            shutdown.store(true, Ordering::SeqCst);
        });
    }

    let tick_period = Duration::from_secs_f64(1.0 / config.robot.tick_rate_hz.max(1.0));
    let mut controller = Controller::new(config, backend)?;

    info!("Entering control loop");
    let mut last_tick = Instant::now();
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        let dt = last_tick.elapsed().as_secs_f64();
        last_tick = Instant::now();

        while let Ok(command) = command_rx.try_recv() {
            controller.handle_command(command);
        }

        controller.step(dt.clamp(0.001, 1.0));
        let _ = telemetry_tx.send(controller.telemetry());

        // Sleep out the rest of the tick
        let elapsed = last_tick.elapsed();
        if elapsed < tick_period {
            tokio::time::sleep(tick_period - elapsed).await;
        }
    }

    controller.shutdown();
    Ok(interrupted_flag.load(Ordering::SeqCst))
}

/// Logging: stdout plus a daily-rolling file, filtered by `RUST_LOG` or
/// the --log-level argument.
fn init_logging(
    log_dir: &std::path::Path,
    level: &str,
) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    std::fs::create_dir_all(log_dir)?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, log_dir, "mowerd.log");
    let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("mowerd={level},{level}")));

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .with_target(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}
