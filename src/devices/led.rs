//! LED devices: white and RGB NeoPixel strips, and the onboard heartbeat.

use core::cell::RefCell;
use core::time::Duration;

use log::{debug, error};
use serde::Deserialize;
use serde_json::json;

use super::{BuildContext, colors};
use crate::app::device::{Args, Operation, Param, Reply};
use crate::app::ports::{DigitalOutput, PixelStrip, Rgb};
use crate::config::Params;
use crate::error::{DeviceError, HalError, OperationError};
use crate::scheduler::Clock;

/// Settle time after each strip write.
pub const WRITE_SETTLE: Duration = Duration::from_millis(500);
pub const BLINK_PERIOD: Duration = Duration::from_secs(1);

const BLACK: Rgb = (0, 0, 0);

pub const NEOPIXEL_OPERATIONS: &[Operation] = &[
    Operation::new("on", "Turn on the NeoPixel, restoring its state.", &[]),
    Operation::new("off", "Turn off the NeoPixel.", &[]),
    Operation::new(
        "set",
        "Set the brightness of the NeoPixel.",
        &[Param::required("brightness", "How bright to set the NeoPixel (0-100).")],
    ),
];

pub const RGB_OPERATIONS: &[Operation] = &[
    Operation::new("on", "Turn on the NeoPixel, restoring its state.", &[]),
    Operation::new("off", "Turn off the NeoPixel.", &[]),
    Operation::new(
        "set",
        "Set the color and brightness of the NeoPixel.",
        &[
            Param::optional("red", "Red channel (0-255)."),
            Param::optional("green", "Green channel (0-255)."),
            Param::optional("blue", "Blue channel (0-255)."),
            Param::optional("color", "The name of a color."),
            Param::optional("brightness", "Relative brightness across all channels (0-100)."),
        ],
    ),
];

/// Brightness percentage to an 8-bit level.
pub fn level(brightness: u8) -> u8 {
    (255.0 * f32::from(brightness.min(100)) / 100.0).round() as u8
}

/// Scale a colour by a brightness percentage.
pub fn scale((r, g, b): Rgb, brightness: u8) -> Rgb {
    let s = |c: u8| (f32::from(c) * f32::from(brightness.min(100)) / 100.0).round() as u8;
    (s(r), s(g), s(b))
}

// ── Strip core ────────────────────────────────────────────────

/// Port plus the remembered per-pixel colours `on` restores.
struct Strip {
    port: RefCell<Box<dyn PixelStrip>>,
    blacklist: Vec<usize>,
    pixels: RefCell<Vec<Rgb>>,
    clock: Clock,
}

impl Strip {
    fn build(
        params: &Params<'_>,
        ctx: &BuildContext<'_>,
        initial: impl FnOnce(u8) -> Rgb,
    ) -> Result<(Self, u8), DeviceError> {
        let pin: u8 = params.require("pin")?;
        let count: usize = params.or("count", 1)?;
        let blacklist: Vec<usize> = params.or("blacklist", Vec::new())?;
        let brightness: u8 = params.or("default_brightness", 0)?;
        if brightness > 100 {
            return Err(DeviceError::InvalidParam {
                param: "default_brightness",
                reason: format!("must be a percentage (0-100), got {brightness}"),
            });
        }
        let colour = initial(brightness);
        let strip = Self {
            port: RefCell::new(ctx.hardware.pixel_strip(pin, count)?),
            blacklist,
            pixels: RefCell::new(vec![colour; count]),
            clock: ctx.clock.clone(),
        };
        Ok((strip, brightness))
    }

    fn len(&self) -> usize {
        self.pixels.borrow().len()
    }

    /// The frame that lights every usable pixel with its remembered colour.
    fn remembered(&self) -> Vec<Rgb> {
        self.pixels
            .borrow()
            .iter()
            .enumerate()
            .map(|(i, c)| if self.blacklist.contains(&i) { BLACK } else { *c })
            .collect()
    }

    fn latch(&self, frame: &[Rgb]) -> Result<(), HalError> {
        self.port.borrow_mut().write(frame)
    }

    /// Write a frame and let the strip settle.
    async fn show(&self, frame: Vec<Rgb>) -> Result<(), OperationError> {
        self.latch(&frame)?;
        self.clock.sleep(WRITE_SETTLE).await;
        Ok(())
    }

    async fn on(&self) -> Result<(), OperationError> {
        self.show(self.remembered()).await
    }

    async fn off(&self) -> Result<(), OperationError> {
        self.show(vec![BLACK; self.len()]).await
    }

    /// Remember `colour` on every usable pixel and show it.
    async fn fill(&self, colour: Rgb) -> Result<(), OperationError> {
        {
            let mut pixels = self.pixels.borrow_mut();
            for (i, p) in pixels.iter_mut().enumerate() {
                if !self.blacklist.contains(&i) {
                    *p = colour;
                }
            }
        }
        self.on().await
    }

    /// Colour of the first pixel that is not blacklisted.
    fn first_usable(&self) -> Rgb {
        self.pixels
            .borrow()
            .iter()
            .enumerate()
            .find(|(i, _)| !self.blacklist.contains(i))
            .map_or(BLACK, |(_, c)| *c)
    }
}

// ── NeoPixel ──────────────────────────────────────────────────

/// A single colour (white) NeoPixel strip.
pub struct NeoPixel {
    name: String,
    strip: Strip,
}

impl NeoPixel {
    pub fn build(params: &Params<'_>, ctx: &BuildContext<'_>) -> Result<Self, DeviceError> {
        let (strip, _) = Strip::build(params, ctx, |b| {
            let l = level(b);
            (l, l, l)
        })?;
        strip.latch(&strip.remembered())?;
        Ok(Self {
            name: params.device().to_owned(),
            strip,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn call(&self, op: &str, args: &Args) -> Result<Reply, OperationError> {
        match op {
            "on" => self.strip.on().await?,
            "off" => self.strip.off().await?,
            "set" => {
                let brightness = args.int_in("brightness", 0..=100)?.unwrap_or_default() as u8;
                let l = level(brightness);
                debug!("NeoPixel `{}`: brightness {}%", self.name, brightness);
                self.strip.fill((l, l, l)).await?;
                return Ok(Reply::Json(json!({ "brightness": brightness })));
            }
            _ => return Err(OperationError::bad_request(format!("`{}` has no operation `{op}`", self.name))),
        }
        Ok(Reply::empty())
    }
}

// ── RGB NeoPixel ──────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ColorParam {
    Name(String),
    Channels([u8; 3]),
}

/// An RGB NeoPixel strip.
pub struct RgbNeoPixel {
    name: String,
    strip: Strip,
    default_brightness: u8,
}

impl RgbNeoPixel {
    pub fn build(params: &Params<'_>, ctx: &BuildContext<'_>) -> Result<Self, DeviceError> {
        let colour = match params.get::<ColorParam>("default_color")? {
            None => BLACK,
            Some(ColorParam::Channels([r, g, b])) => (r, g, b),
            Some(ColorParam::Name(name)) => colors::lookup(&name).ok_or_else(|| DeviceError::InvalidParam {
                param: "default_color",
                reason: format!("unknown color `{name}`"),
            })?,
        };
        let default_on: bool = params.or("default_on", true)?;
        // Unset brightness is full brightness on a colour strip.
        let explicit = params.get::<u8>("default_brightness")?.is_some();
        let (strip, brightness) = Strip::build(params, ctx, |b| scale(colour, if explicit { b } else { 100 }))?;
        let default_brightness = if explicit { brightness } else { 100 };

        if default_on {
            strip.latch(&strip.remembered())?;
        }
        Ok(Self {
            name: params.device().to_owned(),
            strip,
            default_brightness,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn requested_colour(&self, args: &Args) -> Result<Rgb, OperationError> {
        let channels = [
            args.int_in("red", 0..=255)?,
            args.int_in("green", 0..=255)?,
            args.int_in("blue", 0..=255)?,
        ];
        match channels {
            [Some(r), Some(g), Some(b)] => Ok((r as u8, g as u8, b as u8)),
            [None, None, None] => {
                let name = args.text("color").ok_or_else(|| {
                    OperationError::bad_request("either `color` or all of `red`, `green` and `blue` must be given")
                })?;
                colors::lookup(&name).ok_or_else(|| OperationError::bad_request(format!("unknown color `{name}`")))
            }
            _ => Err(OperationError::bad_request(
                "`red`, `green` and `blue` must all be given if any are given",
            )),
        }
    }

    pub async fn call(&self, op: &str, args: &Args) -> Result<Reply, OperationError> {
        match op {
            "on" => self.strip.on().await?,
            "off" => self.strip.off().await?,
            "set" => {
                let brightness = match args.int_in("brightness", 0..=100)? {
                    Some(b) => b as u8,
                    None => self.default_brightness,
                };
                let colour = scale(self.requested_colour(args)?, brightness);
                debug!("RGBNeoPixel `{}`: colour {:?}", self.name, colour);
                self.strip.fill(colour).await?;
                let (red, green, blue) = self.strip.first_usable();
                return Ok(Reply::Json(json!({ "red": red, "green": green, "blue": blue })));
            }
            _ => return Err(OperationError::bad_request(format!("`{}` has no operation `{op}`", self.name))),
        }
        Ok(Reply::empty())
    }
}

// ── Onboard LED ───────────────────────────────────────────────

/// The board's status LED, blinking as a heartbeat while the scheduler
/// is alive.
pub struct OnboardLed {
    name: String,
    led: RefCell<Box<dyn DigitalOutput>>,
}

impl OnboardLed {
    pub fn build(name: &str, ctx: &BuildContext<'_>) -> Result<Self, DeviceError> {
        Ok(Self {
            name: name.to_owned(),
            led: RefCell::new(ctx.hardware.onboard_led()?),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn run(&self, clock: &Clock) {
        let mut lit = true;
        loop {
            if let Err(e) = self.led.borrow_mut().set_level(lit) {
                error!("`{}`: {}", self.name, e);
            }
            clock.sleep(BLINK_PERIOD).await;
            lit = !lit;
        }
    }
}
