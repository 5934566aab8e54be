//! WiFi bring-up from the `network` section.
//!
//! With no SSID the board hosts its own access point (`breadboard` /
//! `cheesplate` unless overridden).  With an SSID it joins that network
//! in client mode, unless `mode` says `ap`.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: `esp_idf_svc::wifi::BlockingWifi` over
//!   `EspWifi`, blocking until the netif is up.
//! - **all other targets**: the host's own network stack is used as is;
//!   bring-up only validates and logs the plan.

use core::fmt;

use log::info;

use crate::config::{AP_DEFAULT_PASSWORD, AP_DEFAULT_SSID, NetworkConfig, WifiMode};

// ───────────────────────────────────────────────────────────────
// Errors
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectivityError {
    InvalidSsid,
    InvalidPassword,
    /// The platform driver refused a step of the bring-up.
    Platform(String),
}

impl fmt::Display for ConnectivityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSsid => write!(f, "SSID invalid (must be 1-32 printable ASCII bytes)"),
            Self::InvalidPassword => write!(f, "password invalid (must be 8-64 bytes for WPA2, or empty for open)"),
            Self::Platform(msg) => write!(f, "WiFi driver: {msg}"),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Validation
// ───────────────────────────────────────────────────────────────

fn is_printable_ascii(s: &str) -> bool {
    s.bytes().all(|b| (0x20..=0x7E).contains(&b))
}

fn validate_ssid(ssid: &str) -> Result<(), ConnectivityError> {
    if ssid.is_empty() || ssid.len() > 32 || !is_printable_ascii(ssid) {
        return Err(ConnectivityError::InvalidSsid);
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), ConnectivityError> {
    if password.is_empty() {
        return Ok(());
    }
    if password.len() < 8 || password.len() > 64 {
        return Err(ConnectivityError::InvalidPassword);
    }
    Ok(())
}

// ───────────────────────────────────────────────────────────────
// Plan
// ───────────────────────────────────────────────────────────────

/// Resolved, validated WiFi settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WifiPlan {
    pub mode: WifiMode,
    pub ssid: heapless::String<32>,
    pub password: heapless::String<64>,
}

impl WifiPlan {
    pub fn from_config(config: &NetworkConfig) -> Result<Self, ConnectivityError> {
        let mode = config.effective_mode();
        let (ssid, password) = match mode {
            WifiMode::Client => (config.ssid.as_deref().unwrap_or_default(), config.password.as_deref().unwrap_or_default()),
            WifiMode::Ap => (
                config.ssid.as_deref().filter(|s| !s.is_empty()).unwrap_or(AP_DEFAULT_SSID),
                config.password.as_deref().filter(|p| !p.is_empty()).unwrap_or(AP_DEFAULT_PASSWORD),
            ),
        };
        validate_ssid(ssid)?;
        validate_password(password)?;
        Ok(Self {
            mode,
            ssid: ssid.try_into().map_err(|_| ConnectivityError::InvalidSsid)?,
            password: password.try_into().map_err(|_| ConnectivityError::InvalidPassword)?,
        })
    }
}

// ───────────────────────────────────────────────────────────────
// Bring-up
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub use esp::start;

#[cfg(target_os = "espidf")]
mod esp {
    use esp_idf_svc::eventloop::EspSystemEventLoop;
    use esp_idf_svc::hal::modem::Modem;
    use esp_idf_svc::nvs::EspDefaultNvsPartition;
    use esp_idf_svc::wifi::{
        AccessPointConfiguration, AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi,
    };
    use log::info;

    use super::{ConnectivityError, WifiPlan};
    use crate::config::WifiMode;

    fn platform(e: esp_idf_svc::sys::EspError) -> ConnectivityError {
        ConnectivityError::Platform(e.to_string())
    }

    /// Start the radio per `plan` and block until the interface is up.
    pub fn start(
        plan: &WifiPlan,
        modem: Modem,
        sysloop: EspSystemEventLoop,
        nvs: Option<EspDefaultNvsPartition>,
    ) -> Result<BlockingWifi<EspWifi<'static>>, ConnectivityError> {
        let driver = EspWifi::new(modem, sysloop.clone(), nvs).map_err(platform)?;
        let mut wifi = BlockingWifi::wrap(driver, sysloop).map_err(platform)?;
        let auth_method = if plan.password.is_empty() { AuthMethod::None } else { AuthMethod::WPA2Personal };

        let config = match plan.mode {
            WifiMode::Client => Configuration::Client(ClientConfiguration {
                ssid: plan.ssid.clone(),
                password: plan.password.clone(),
                auth_method,
                ..Default::default()
            }),
            WifiMode::Ap => Configuration::AccessPoint(AccessPointConfiguration {
                ssid: plan.ssid.clone(),
                password: plan.password.clone(),
                auth_method,
                ..Default::default()
            }),
        };
        wifi.set_configuration(&config).map_err(platform)?;
        wifi.start().map_err(platform)?;

        let netif = match plan.mode {
            WifiMode::Client => {
                wifi.connect().map_err(platform)?;
                wifi.wait_netif_up().map_err(platform)?;
                wifi.wifi().sta_netif()
            }
            WifiMode::Ap => wifi.wifi().ap_netif(),
        };
        let ip = netif.get_ip_info().map_err(platform)?.ip;
        info!("WiFi: {:?} '{}' up at {}", plan.mode, plan.ssid, ip);
        Ok(wifi)
    }
}

/// Host bring-up: nothing to associate, the OS network is already up.
#[cfg(not(target_os = "espidf"))]
pub fn start(plan: &WifiPlan) -> Result<(), ConnectivityError> {
    info!("WiFi(sim): {:?} '{}' assumed up (host network)", plan.mode, plan.ssid);
    Ok(())
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
