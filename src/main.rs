//! cranetrack - UWB positioning daemon
//!
//! Startup order: bring up the local ranging module, push the device roster
//! to it, initialise the remote tag over the relay protocol, push the roster
//! there too, then hand everything to the positioning control loop on a
//! dedicated thread. Ctrl-C flips the shutdown flag; the loop drains out on
//! its next cadence check.

mod config;
mod core;
mod devices;
mod error;
mod ranging;
mod sensors;
mod telemetry;
mod tracking;

use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::config::AppConfig;
use crate::core::{DeviceRole, RegisterBus};
use crate::devices::{create_bus, create_load_sensor, create_radio};
use crate::error::Result;
use crate::ranging::RangingModule;
use crate::sensors::LoadSensor;
use crate::telemetry::RadioLink;
use crate::tracking::ControlLoop;

/// Parse config path from command line arguments.
///
/// Supports:
/// - `cranetrack <path>` (positional)
/// - `cranetrack --config <path>` (flag-based)
/// - `cranetrack -c <path>` (short flag)
///
/// Defaults to `/etc/cranetrack.toml` if not specified.
fn parse_config_path() -> String {
    let args: Vec<String> = env::args().collect();

    for i in 1..args.len() {
        if (args[i] == "--config" || args[i] == "-c") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }

    if args.len() > 1 && !args[1].starts_with('-') {
        return args[1].clone();
    }

    "/etc/cranetrack.toml".to_string()
}

type Bus = Box<dyn RegisterBus>;
type Radio = Box<dyn std::io::Write + Send>;
type Sensor = Box<dyn LoadSensor>;

/// Push the roster to the local module and bring up the remote tag.
fn provision(
    module: &mut RangingModule<Bus>,
    radio: &mut RadioLink<Radio>,
    config: &AppConfig,
    running: &AtomicBool,
) -> Result<bool> {
    let settings = config.module_settings();
    let tag = config.tag_address()?;

    if let Err(e) = radio.send_raw(b"BEGIN INIT\n") {
        log::warn!("startup marker failed: {}", e);
    }

    log::info!("initialising local module");
    module.init_local_module(&settings)?;
    thread::sleep(Duration::from_millis(150));

    for device in config.roster() {
        module.add_local_device(&device)?;
    }
    module.set_local_anchor_count(&settings)?;

    if let Err(e) = radio.send_raw(b"INIT OK\r\n") {
        log::warn!("startup marker failed: {}", e);
    }

    // the remote tag may still be powering up; keep trying until it answers
    log::info!("initialising remote tag {:#06x}", tag);
    loop {
        if !running.load(Ordering::Relaxed) {
            return Ok(false);
        }
        match module.init_remote_tag(tag, &settings) {
            Ok(()) => break,
            Err(e) => log::warn!("remote tag init failed, retrying: {}", e),
        }
    }

    for device in config.roster() {
        if device.role == DeviceRole::Anchor {
            if let Err(e) = module.add_remote_device(tag, &device) {
                log::warn!("remote add of {:#06x} failed: {}", device.address, e);
            }
        }
    }
    module.save_remote_device_list(tag)?;

    if let Err(e) = radio.send_raw(b"ANCHORS OK\r\n") {
        log::warn!("startup marker failed: {}", e);
    }

    module.set_remote_anchor_count(tag, &settings)?;

    Ok(true)
}

fn main() -> Result<()> {
    let config_path = parse_config_path();

    // Load configuration before the logger so its level can seed the filter
    let config = AppConfig::from_file(&config_path)?;
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.clone()),
    )
    .init();

    log::info!("cranetrack v{} starting", env!("CARGO_PKG_VERSION"));
    log::info!("using config: {}", config_path);
    log::info!(
        "crane {} in bay {}x{} mm, {} anchors, zone split at y={}",
        config.crane.id,
        config.bay.x_max_mm - config.bay.x_min_mm,
        config.bay.y_max_mm - config.bay.y_min_mm,
        config.anchors().len(),
        config.zones.split_y_mm
    );

    let bus = create_bus(&config)?;
    let mut radio = RadioLink::new(create_radio(&config)?);
    let sensor: Sensor = create_load_sensor(&config);

    let mut module = RangingModule::new(bus, config.drain_policy());

    // Shutdown flag, flipped by Ctrl-C. The interrupt-pending bit is set by
    // the module's interrupt line when one is wired up; the loop clears it
    // once per cycle either way.
    let running = Arc::new(AtomicBool::new(true));
    let irq_pending = Arc::new(AtomicBool::new(false));

    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        log::info!("received shutdown signal");
        r.store(false, Ordering::Relaxed);
    })
    .map_err(|e| error::Error::Other(format!("error setting Ctrl-C handler: {}", e)))?;

    if !provision(&mut module, &mut radio, &config, &running)? {
        log::info!("shutdown requested during provisioning");
        return Ok(());
    }
    log::info!("provisioning complete");

    let mut control_loop: ControlLoop<Bus, Sensor, Radio> = ControlLoop::new(
        module,
        sensor,
        radio,
        config.motion_policy(),
        config.zone_plan()?,
        config.tag_address()?,
        config.loop_settings(),
        Arc::clone(&irq_pending),
    );

    let loop_running = Arc::clone(&running);
    let handle = thread::Builder::new()
        .name("control-loop".to_string())
        .spawn(move || control_loop.run(&loop_running))
        .map_err(|e| error::Error::Other(format!("failed to spawn control loop: {}", e)))?;

    log::info!("cranetrack running, press Ctrl-C to stop");
    if handle.join().is_err() {
        log::error!("control loop panicked");
    }

    log::info!("cranetrack stopped");
    Ok(())
}
