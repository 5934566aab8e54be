//! UART pass-through.

use core::cell::RefCell;

use serde_json::json;

use super::BuildContext;
use crate::app::device::{Args, Operation, Param, Reply};
use crate::app::ports::{SerialPort, UartSettings};
use crate::config::Params;
use crate::error::{DeviceError, OperationError};

pub const OPERATIONS: &[Operation] = &[Operation::new(
    "write",
    "Write data to the connected serial device.",
    &[Param::required("message", "The message to write; a newline is appended.")],
)];

pub struct Serial {
    name: String,
    port: RefCell<Box<dyn SerialPort>>,
}

impl Serial {
    pub fn build(params: &Params<'_>, ctx: &BuildContext<'_>) -> Result<Self, DeviceError> {
        let settings = UartSettings {
            uart_id: params.require("uart_id")?,
            baudrate: params.or("baudrate", 9600)?,
            tx_pin: params.get("tx_pin")?,
            rx_pin: params.get("rx_pin")?,
            bits: params.or("bits", 8)?,
            parity: params.get("parity_bit")?,
            stop_bits: params.or("stop_bits", 1)?,
            timeout_ms: params.or("timeout", 5000)?,
        };
        if !(7..=9).contains(&settings.bits) {
            return Err(DeviceError::InvalidParam {
                param: "bits",
                reason: format!("must be 7, 8 or 9, got {}", settings.bits),
            });
        }
        Ok(Self {
            name: params.device().to_owned(),
            port: RefCell::new(ctx.hardware.serial(&settings)?),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn call(&self, op: &str, args: &Args) -> Result<Reply, OperationError> {
        if op != "write" {
            return Err(OperationError::bad_request(format!("`{}` has no operation `{op}`", self.name)));
        }
        let message = args.text("message").unwrap_or_default();
        let bytes_written = self.port.borrow_mut().write(format!("{message}\n").as_bytes())?;
        Ok(Reply::Json(json!({ "bytes_written": bytes_written })))
    }
}
