//! Adapters: concrete implementations of the port traits.
//!
//! | Adapter     | Implements        | Connects to                          |
//! |-------------|-------------------|--------------------------------------|
//! | `hardware`  | Hardware          | ESP32 GPIO/LEDC/RMT/I2C/UART, or sim |
//! | `log_sink`  | log::Log          | Serial console + `/logs` ring        |
//! | `notifier`  | Notifier          | Outbound TCP (webhook GET)           |
//! | `time`      | Clock driver      | async-io-mini reactor timers         |
//! | `wifi`      | (none)            | ESP-IDF WiFi STA / AP                |

pub mod hardware;
pub mod log_sink;
pub mod notifier;
pub mod time;
pub mod wifi;
