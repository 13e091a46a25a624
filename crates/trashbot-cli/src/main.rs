//! `trashbot` – remote-control gateway for the trash-collecting robot.
//!
//! Startup order:
//!
//! 1. Tracing (`RUST_LOG`, `TRASHBOT_LOG_FORMAT`, optional OTLP export).
//! 2. Config from `~/.trashbot/config.toml` (or `$TRASHBOT_CONFIG`), then
//!    `TRASHBOT_*` overrides, then validation.  Invalid config exits non-zero.
//! 3. Actuator driver probe; a driver that does not answer exits non-zero.
//! 4. Motion scheduler and WebSocket gateway on one Tokio runtime.
//! 5. **Ctrl-C** flips the shutdown flag: the gateway stops accepting,
//!    sessions close and the scheduler writes a final STOP.

mod config;

use std::process::ExitCode;
use std::sync::Arc;

use colored::Colorize;
use tokio::sync::watch;
use tracing::{error, info, warn};

use trashbot_gateway::{GatewayServer, ProtocolHandler};
use trashbot_hal::{ActuatorDriver, DriveController, LidBank, SimDriver};
use trashbot_runtime::{MotionScheduler, init_tracing};
use trashbot_types::BotError;

fn main() -> ExitCode {
    let telemetry = init_tracing("trashbot");
    if telemetry.is_exporting() {
        info!("exporting spans over OTLP");
    }

    let cfg = match config::load().and_then(|cfg| cfg.validate().map(|()| cfg)) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{}: {e}", "Config error".red().bold());
            error!(error = %e, path = %config::config_path().display(), "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    print_banner(&cfg);

    let driver: Arc<dyn ActuatorDriver> = Arc::new(SimDriver::new());
    if let Err(e) = driver.probe() {
        eprintln!("{}: {e}", "Actuator driver unavailable".red().bold());
        error!(driver = driver.name(), error = %e, "driver probe failed");
        return ExitCode::FAILURE;
    }
    info!(driver = driver.name(), "actuator driver ready");

    // ── Shutdown flag ─────────────────────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping the robot …".yellow().bold());
        let _ = shutdown_tx.send(true);
    }) {
        warn!(error = %e, "failed to install Ctrl-C handler; only SIGKILL will stop the gateway");
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to build Tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(serve(cfg, driver, shutdown_rx)) {
        Ok(()) => {
            println!("{}", "  ✓ Motors stopped. Bye.".green());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}: {e}", "Gateway error".red().bold());
            error!(error = %e, "gateway terminated");
            ExitCode::FAILURE
        }
    }
}

async fn serve(
    cfg: config::Config,
    driver: Arc<dyn ActuatorDriver>,
    shutdown: watch::Receiver<bool>,
) -> Result<(), BotError> {
    let drive = DriveController::new(cfg.drive.clone(), Arc::clone(&driver));
    let scheduler = Arc::new(MotionScheduler::new(&cfg.motion, drive));
    let lids = Arc::new(LidBank::new(&cfg.lids, &cfg.lid_motion, driver));
    let handler = Arc::new(ProtocolHandler::new(Arc::clone(&scheduler), lids));

    let ticker = tokio::spawn(Arc::clone(&scheduler).run(shutdown.clone()));

    let served = GatewayServer::new(handler)
        .with_config(cfg.server)
        .run(shutdown)
        .await;

    // Final STOP write, also when the gateway never bound.
    scheduler.stop();
    if served.is_err() {
        ticker.abort();
        scheduler.tick();
    } else if let Err(e) = ticker.await {
        warn!(error = %e, "motion scheduler task ended abnormally");
        scheduler.tick();
    }
    served
}

fn print_banner(cfg: &config::Config) {
    println!();
    println!("{}", r#"  _____               _     _           _   "#.bold().green());
    println!("{}", r#" |_   _| __ __ _ ___| |__ | |__   ___ | |_ "#.bold().green());
    println!("{}", r#"   | || '__/ _` / __| '_ \| '_ \ / _ \| __|"#.bold().green());
    println!("{}", r#"   | || | | (_| \__ \ | | | |_) | (_) | |_ "#.bold().green());
    println!("{}", r#"   |_||_|  \__,_|___/_| |_|_.__/ \___/ \__|"#.bold().green());
    println!();
    println!(
        "  {} {}",
        "Trashbot gateway".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!(
        "  Listening on {}",
        format!("ws://{}:{}", cfg.server.bind_address, cfg.server.port).bold().cyan()
    );
    println!("  Lids:");
    for lid in &cfg.lids {
        println!(
            "    • {} {} {}",
            lid.id.0.to_string().bold(),
            lid.name,
            format!("(servo {})", lid.servo_channel).dimmed()
        );
    }
    println!();
}
