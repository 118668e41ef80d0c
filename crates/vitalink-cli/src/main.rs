//! `vitalink-cli` – VitaLink Demo Supervisor
//!
//! This binary is the reference wiring of the VitaLink stack.  It:
//!
//! 1. Loads (or creates) `~/.vitalink/config.toml`.
//! 2. Spawns a simulated pulse oximeter and infusion pump on a shared bus.
//! 3. Runs the supervisory side: heartbeats, liveliness monitor, time-sync
//!    responder, clock-offset estimator, and a demo alarm-limit objective
//!    with a bounded convergence wait.
//! 4. Renders a status line per second until **Ctrl-C**.
//!
//! `vitalink schema [topic]` prints the JSON schema of one (or every) topic
//! record instead of running the demo.

mod config;
mod telemetry;

use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use tracing::{info, warn};

use vitalink_devices::{DeviceRunner, DeviceTask, SimInfusionPump, SimPulseOximeter};
use vitalink_kernel::{
    ClockOffsetEstimator, HeartbeatPublisher, LivelinessMonitor, ObjectiveController, Presence,
    TimeSyncResponder, WaitOutcome,
};
use vitalink_middleware::{InstanceRegistry, InstanceView, SampleBus};
use vitalink_types::{
    nomenclature, DeviceId, LimitType, LocalAlarmLimitObjective, ParticipantKind, RecordValue,
    Topic,
};

fn main() {
    // Hold the guard for the entire process lifetime; the OTLP exporter is
    // initialised before the Tokio runtime starts.
    let _telemetry = telemetry::init_tracing("vitalink");

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.first().map(String::as_str) == Some("schema") {
        print_schemas(args.get(1).map(String::as_str));
        return;
    }

    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => {
            let cfg = config::Config::default();
            if let Err(e) = config::save(&cfg) {
                warn!(error = %e, "could not persist default config");
            }
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            config::Config::default()
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("{}: {e}", "Failed to start async runtime".red());
            std::process::exit(1);
        }
    };
    if let Err(e) = runtime.block_on(run(cfg)) {
        eprintln!("{}: {e}", "vitalink demo failed".red());
        std::process::exit(1);
    }
}

/// Print the JSON schema of `name`d topic, or of every topic.
fn print_schemas(name: Option<&str>) {
    for topic in Topic::ALL {
        if name.is_some_and(|wanted| wanted != topic.name()) {
            continue;
        }
        let schema = topic.json_schema();
        match serde_json::to_string_pretty(&schema) {
            Ok(rendered) => println!("{rendered}"),
            Err(e) => eprintln!("{}: {e}", topic.name().red()),
        }
    }
}

async fn run(cfg: config::Config) -> Result<(), String> {
    print_banner();

    let supervisor_id = DeviceId::new(cfg.supervisor_id.clone())
        .map_err(|e| format!("supervisor_id: {e}"))?;
    let oximeter_id =
        DeviceId::new(cfg.oximeter_id.clone()).map_err(|e| format!("oximeter_id: {e}"))?;
    let pump_id = DeviceId::new(cfg.pump_id.clone()).map_err(|e| format!("pump_id: {e}"))?;

    let heartbeat_period = Duration::from_millis(cfg.heartbeat_period_ms);
    let vitals_period = Duration::from_millis(cfg.vitals_period_ms);
    let stale_threshold = Duration::from_millis(cfg.stale_clock_threshold_ms);

    // ── Shared bus and supervisory participant ────────────────────────────
    let bus = SampleBus::default();
    let registry = Arc::new(InstanceRegistry::new(supervisor_id.clone(), bus.clone()));

    let monitor = LivelinessMonitor::new(heartbeat_period, cfg.grace_periods);
    monitor.spawn_listener(bus.subscribe(Topic::HeartBeat));

    let estimator = ClockOffsetEstimator::new(supervisor_id.clone());
    estimator.spawn_listener(bus.subscribe(Topic::TimeSync));

    TimeSyncResponder::new(
        registry.clone(),
        std::num::NonZeroU32::new(2).expect("nonzero"),
        std::num::NonZeroU32::new(4).expect("nonzero"),
    )
    .spawn(bus.subscribe(Topic::HeartBeat));

    let vitals = InstanceView::new();
    vitals.spawn_listener(bus.subscribe(Topic::Numeric));
    let alerts = InstanceView::new();
    alerts.spawn_listener(bus.subscribe(Topic::PatientAlert));
    alerts.spawn_listener(bus.subscribe(Topic::TechnicalAlert));
    let infusions = InstanceView::new();
    infusions.spawn_listener(bus.subscribe(Topic::InfusionStatus));

    let heartbeat = HeartbeatPublisher::new(
        registry.clone(),
        ParticipantKind::Supervisor,
        heartbeat_period,
    )
    .spawn()
    .map_err(|e| format!("supervisor heartbeat: {e}"))?;

    // ── Simulated fleet ───────────────────────────────────────────────────
    let runner = DeviceRunner::new(bus.clone(), heartbeat_period);

    let oximeter = SimPulseOximeter::new(oximeter_id.clone(), vitals_period);
    let mut oximeter_ready = oximeter.ready_gate();
    let oximeter_task = runner
        .spawn(Box::new(oximeter))
        .map_err(|e| format!("oximeter: {e}"))?;
    let pump_task = runner
        .spawn(Box::new(SimInfusionPump::new(pump_id.clone(), vitals_period)))
        .map_err(|e| format!("pump: {e}"))?;

    match oximeter_ready.wait(Duration::from_secs(5)).await {
        WaitOutcome::Ready => info!(device = %oximeter_id, "oximeter online"),
        outcome => warn!(device = %oximeter_id, ?outcome, "oximeter not ready"),
    }

    // ── Demo objective: lower the SpO₂ low limit and await convergence ───
    let controller = ObjectiveController::new(registry.clone());
    let objective = LocalAlarmLimitObjective {
        device_id: oximeter_id.clone(),
        metric_id: nomenclature::spo2(),
        limit_type: LimitType::Low,
        value: 92.0,
        unit_id: nomenclature::percent(),
        requestor: supervisor_id.clone(),
    };
    match controller
        .issue_and_await(objective, Duration::from_secs(2))
        .await
    {
        Ok(WaitOutcome::Ready) => {
            println!("{}", "  ✓ SpO₂ low-limit objective converged.".green())
        }
        Ok(outcome) => println!(
            "{} ({outcome:?})",
            "  ✗ SpO₂ low-limit objective did not converge".yellow()
        ),
        Err(e) => println!("{}: {e}", "  ✗ objective rejected".red()),
    }

    // ── Status loop until Ctrl-C ──────────────────────────────────────────
    let devices = [oximeter_id.clone(), pump_id.clone()];
    let mut tick = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!();
                println!("{}", "⚠  Ctrl-C received – shutting down fleet …".yellow().bold());
                break;
            }
            _ = tick.tick() => {
                print_status(
                    &devices,
                    &monitor,
                    &vitals,
                    &alerts,
                    &infusions,
                    &estimator,
                    stale_threshold,
                );
            }
        }
    }

    shutdown(oximeter_task, pump_task).await;
    heartbeat.shutdown().await;
    println!("{}", "  ✓ Fleet withdrawn. Exiting VitaLink.".green());
    Ok(())
}

async fn shutdown(oximeter: DeviceTask, pump: DeviceTask) {
    oximeter.shutdown().await;
    pump.shutdown().await;
}

fn print_banner() {
    println!();
    println!("  {}", "VitaLink — clinical device interop demo".bold());
    println!("  {}", "sim pulse oximeter + sim infusion pump".dimmed());
    println!();
}

#[allow(clippy::too_many_arguments)]
fn print_status(
    devices: &[DeviceId],
    monitor: &LivelinessMonitor,
    vitals: &InstanceView,
    alerts: &InstanceView,
    infusions: &InstanceView,
    estimator: &ClockOffsetEstimator,
    stale_threshold: Duration,
) {
    let mut line = String::new();
    for device in devices {
        let presence = match monitor.presence(device) {
            Presence::Present => "present".green(),
            Presence::Absent => "absent".red(),
        };
        line.push_str(&format!("{device}: {presence}  "));
    }

    for value in vitals.snapshot().into_values() {
        if let RecordValue::Numeric(numeric) = value {
            if numeric.metric_id == nomenclature::spo2() {
                line.push_str(&format!("SpO₂ {:.0}%  ", numeric.value));
            } else if numeric.metric_id == nomenclature::pulse_rate() {
                line.push_str(&format!("pulse {:.0} bpm  ", numeric.value));
            }
        }
    }

    for value in infusions.snapshot().into_values() {
        if let RecordValue::InfusionStatus(status) = value {
            let state = if status.infusion_active {
                format!("{:.1} mL/h", status.milliliters_per_hour).normal()
            } else {
                "idle".dimmed()
            };
            line.push_str(&format!("pump {state}  "));
        }
    }

    let active_alerts = alerts.len();
    if active_alerts > 0 {
        line.push_str(&format!("{}", format!("⚑ {active_alerts} alert(s)  ").red().bold()));
    }

    let stale = estimator.stale_peers(stale_threshold);
    if !stale.is_empty() {
        line.push_str(&format!("{}", format!("⌚ {} stale clock(s)", stale.len()).yellow()));
    }

    println!("  {line}");
}
