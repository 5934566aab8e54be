//! Breadboard firmware entry point.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  devices.json ──▶ Document ──▶ RingLogger (serial + /logs)   │
//! │                       │                                      │
//! │                       ├──▶ WiFi (client or AP)               │
//! │                       ▼                                      │
//! │  Hardware + Notifier ──▶ Supervisor::load ──▶ Supervisor::run │
//! │                                   (device tasks + API server) │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The process boots straight into the supervisor loop and never returns
//! under normal operation.  Only an unreadable configuration document
//! aborts startup.
#![deny(unused_must_use)]

use std::rc::Rc;

use anyhow::{Context, Result, anyhow};
use log::{error, info};

use breadboard::adapters::log_sink::RingLogger;
use breadboard::adapters::notifier::TcpNotifier;
use breadboard::adapters::time::realtime_runtime;
use breadboard::adapters::wifi::WifiPlan;
use breadboard::app::ports::Hardware;
use breadboard::app::supervisor::{Environment, Supervisor};
use breadboard::config::{DEFAULT_CONFIG_FILE, Document, NetworkConfig};

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    // ── 1. Platform bootstrap ─────────────────────────────────
    #[cfg(target_os = "espidf")]
    {
        esp_idf_svc::sys::link_patches();
        esp::mount_storage()?;
    }

    // ── 2. Configuration and logging ──────────────────────────
    let path = config_path();
    let text = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
    let doc = Document::parse(&text).map_err(|e| anyhow!("{path}: {e}"))?;
    let logs = RingLogger::new(&doc.logging)
        .install()
        .context("installing logger")?;

    info!("Breadboard v{} starting from {}", env!("CARGO_PKG_VERSION"), path);

    // ── 3. Network ────────────────────────────────────────────
    // The returned driver must stay alive for the radio to stay up.
    let _wifi = doc.network.as_ref().and_then(start_network);

    // ── 4. Supervisor ─────────────────────────────────────────
    let env = Environment {
        hardware: hardware(),
        notifier: Rc::new(TcpNotifier),
        logs,
    };
    let runtime = realtime_runtime();
    let supervisor = Supervisor::load(doc, &env, runtime.clone());
    runtime.block_on(supervisor.run());
    Ok(())
}

/// The config file: the first argument on a host, `devices.json` in the
/// storage partition on the board.
fn config_path() -> String {
    #[cfg(target_os = "espidf")]
    {
        format!("{}/{DEFAULT_CONFIG_FILE}", esp::STORAGE_ROOT)
    }
    #[cfg(not(target_os = "espidf"))]
    {
        std::env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_owned())
    }
}

#[cfg(target_os = "espidf")]
fn hardware() -> Rc<dyn Hardware> {
    Rc::new(breadboard::adapters::hardware::EspHardware::new())
}

#[cfg(not(target_os = "espidf"))]
fn hardware() -> Rc<dyn Hardware> {
    info!("hardware: simulated board");
    Rc::new(breadboard::adapters::hardware::SimBoard::new())
}

/// Bring the network up.  A failure is logged and the devices still run.
#[cfg(target_os = "espidf")]
fn start_network(network: &NetworkConfig) -> Option<esp::Wifi> {
    match WifiPlan::from_config(network).map_err(|e| e.to_string()).and_then(|plan| esp::wifi(&plan)) {
        Ok(driver) => Some(driver),
        Err(e) => {
            error!("network unavailable: {e}");
            None
        }
    }
}

#[cfg(not(target_os = "espidf"))]
fn start_network(network: &NetworkConfig) -> Option<()> {
    match WifiPlan::from_config(network).and_then(|plan| breadboard::adapters::wifi::start(&plan)) {
        Ok(()) => Some(()),
        Err(e) => {
            error!("network unavailable: {e}");
            None
        }
    }
}

#[cfg(target_os = "espidf")]
mod esp {
    use esp_idf_svc::eventloop::EspSystemEventLoop;
    use esp_idf_svc::hal::peripherals::Peripherals;
    use esp_idf_svc::nvs::EspDefaultNvsPartition;
    use esp_idf_svc::sys::{esp, esp_vfs_spiffs_conf_t, esp_vfs_spiffs_register};
    use esp_idf_svc::wifi::{BlockingWifi, EspWifi};

    use breadboard::adapters::wifi::{self, WifiPlan};

    pub const STORAGE_ROOT: &str = "/spiffs";

    pub type Wifi = BlockingWifi<EspWifi<'static>>;

    /// Mount the SPIFFS partition holding `devices.json`.
    pub fn mount_storage() -> anyhow::Result<()> {
        let conf = esp_vfs_spiffs_conf_t {
            base_path: c"/spiffs".as_ptr(),
            partition_label: core::ptr::null(),
            max_files: 4,
            format_if_mount_failed: false,
        };
        // SAFETY: `conf` and the path literal outlive the call; the VFS
        // copies what it keeps.
        esp!(unsafe { esp_vfs_spiffs_register(&conf) })?;
        Ok(())
    }

    pub fn wifi(plan: &WifiPlan) -> Result<Wifi, String> {
        let peripherals = Peripherals::take().map_err(|e| e.to_string())?;
        let sysloop = EspSystemEventLoop::take().map_err(|e| e.to_string())?;
        let nvs = EspDefaultNvsPartition::take().ok();
        wifi::start(plan, peripherals.modem, sysloop, nvs).map_err(|e| e.to_string())
    }
}
