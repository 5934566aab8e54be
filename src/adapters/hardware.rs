//! Hardware adapters: the [`Hardware`] factory for each target.
//!
//! - **`target_os = "espidf"`**: [`EspHardware`] configures GPIO and LEDC
//!   through raw ESP-IDF sys calls, and builds the I2C, RMT and display
//!   drivers from `esp-idf-hal` peripherals.
//! - **every target**: [`SimBoard`] is an in-memory board.  Inputs are
//!   driven by the caller, outputs are recorded, so the runtime can run
//!   on a host and be observed by tests.
//!
//! ```text
//!   SimBoard (Rc<RefCell<BoardState>>)
//!     ├── levels      pin → bool        set_input() / level()
//!     ├── links       input → outputs   connect()  (matrix wiring)
//!     ├── pwm         pin → duty log    duty() / pwm_state()
//!     ├── strips      pin → frames      strip()
//!     ├── displays    rs  → cells       display()
//!     ├── climate     pin → frames      push_climate_frame()
//!     ├── air         sda → registers   air() / set_air_sample()
//!     └── serial      uart → bytes      serial_output()
//! ```

use core::cell::RefCell;
use core::convert::Infallible;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::rc::Rc;

use crate::app::ports::{
    AirQualitySensor, AirSample, CharacterDisplay, ClimateSensor, DigitalInput, DigitalOutput, HalInput, HalOutput,
    HalPwm, Hardware, PixelStrip, Pull, PwmOutput, Rgb, SerialPort, UartSettings,
};
use crate::error::HalError;

/// GPIO of the status LED on the supported dev boards.
pub const ONBOARD_LED_PIN: u8 = 2;

// ═══════════════════════════════════════════════════════════════
//  Simulated board
// ═══════════════════════════════════════════════════════════════

/// Last applied PWM settings on one pin.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PwmState {
    pub freq_hz: u32,
    pub duty: u16,
    pub history: Vec<u16>,
}

/// Character cells written to one simulated display.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisplayState {
    pub initialised: bool,
    pub clears: usize,
    pub cursor: (u8, u8),
    pub cells: BTreeMap<(u8, u8), u8>,
}

impl DisplayState {
    /// Row `row` rendered to `columns` characters, blanks as spaces.
    pub fn row_text(&self, row: u8, columns: u8) -> String {
        (0..columns)
            .map(|c| self.cells.get(&(c, row)).map_or(' ', |b| char::from(*b)))
            .collect()
    }
}

/// Register state of one simulated air-quality sensor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AirState {
    pub sample: AirSample,
    pub status: u8,
    pub error_id: u8,
    pub measure_mode: u8,
    pub started: bool,
    pub environment: Vec<(f32, f32)>,
}

#[derive(Default)]
struct BoardState {
    levels: HashMap<u8, bool>,
    links: HashMap<u8, Vec<u8>>,
    pwm: HashMap<u8, PwmState>,
    strips: HashMap<u8, Vec<Vec<Rgb>>>,
    displays: HashMap<u8, DisplayState>,
    climate: HashMap<u8, VecDeque<[u8; 5]>>,
    climate_last: HashMap<u8, [u8; 5]>,
    climate_reads: HashMap<u8, usize>,
    air: HashMap<u8, AirState>,
    serial: HashMap<u8, Vec<u8>>,
    broken: HashSet<u8>,
}

impl BoardState {
    fn input_level(&self, pin: u8) -> bool {
        let driven = self
            .links
            .get(&pin)
            .is_some_and(|outs| outs.iter().any(|o| self.levels.get(o).copied().unwrap_or(false)));
        driven || self.levels.get(&pin).copied().unwrap_or(false)
    }
}

/// In-memory board.  Cheap to clone; clones share the same state.
#[derive(Clone, Default)]
pub struct SimBoard {
    state: Rc<RefCell<BoardState>>,
}

impl SimBoard {
    pub fn new() -> Self {
        Self::default()
    }

    fn claim(&self, pin: u8) -> Result<(), HalError> {
        if self.state.borrow().broken.contains(&pin) {
            return Err(HalError::Pin { pin, code: -1 });
        }
        Ok(())
    }

    // ── Test controls ─────────────────────────────────────────

    /// Make every later claim of `pin` fail.
    pub fn break_pin(&self, pin: u8) {
        self.state.borrow_mut().broken.insert(pin);
    }

    /// Drive an input pin from outside the board.
    pub fn set_input(&self, pin: u8, high: bool) {
        self.state.borrow_mut().levels.insert(pin, high);
    }

    /// Wire `output` to `input`: the input reads high while the output is.
    pub fn connect(&self, output: u8, input: u8) {
        self.state.borrow_mut().links.entry(input).or_default().push(output);
    }

    /// Remove every wire into `input`.
    pub fn disconnect(&self, input: u8) {
        self.state.borrow_mut().links.remove(&input);
    }

    pub fn push_climate_frame(&self, pin: u8, frame: [u8; 5]) {
        self.state.borrow_mut().climate.entry(pin).or_default().push_back(frame);
    }

    pub fn set_air_sample(&self, sda: u8, sample: AirSample) {
        self.state.borrow_mut().air.entry(sda).or_default().sample = sample;
    }

    pub fn set_air_status(&self, sda: u8, status: u8, error_id: u8) {
        let mut s = self.state.borrow_mut();
        let air = s.air.entry(sda).or_default();
        air.status = status;
        air.error_id = error_id;
    }

    // ── Observations ──────────────────────────────────────────

    /// Current level of a pin (output as written, or input as driven).
    pub fn level(&self, pin: u8) -> bool {
        self.state.borrow().levels.get(&pin).copied().unwrap_or(false)
    }

    pub fn pwm_state(&self, pin: u8) -> Option<PwmState> {
        self.state.borrow().pwm.get(&pin).cloned()
    }

    pub fn duty(&self, pin: u8) -> Option<u16> {
        self.state.borrow().pwm.get(&pin).map(|p| p.duty)
    }

    /// Every frame written to the strip on `pin`, oldest first.
    pub fn strip_frames(&self, pin: u8) -> Vec<Vec<Rgb>> {
        self.state.borrow().strips.get(&pin).cloned().unwrap_or_default()
    }

    pub fn strip(&self, pin: u8) -> Option<Vec<Rgb>> {
        self.state.borrow().strips.get(&pin).and_then(|f| f.last().cloned())
    }

    /// Display keyed by its register-select pin.
    pub fn display(&self, rs: u8) -> Option<DisplayState> {
        self.state.borrow().displays.get(&rs).cloned()
    }

    pub fn climate_reads(&self, pin: u8) -> usize {
        self.state.borrow().climate_reads.get(&pin).copied().unwrap_or(0)
    }

    pub fn air(&self, sda: u8) -> Option<AirState> {
        self.state.borrow().air.get(&sda).cloned()
    }

    pub fn serial_output(&self, uart_id: u8) -> Vec<u8> {
        self.state.borrow().serial.get(&uart_id).cloned().unwrap_or_default()
    }
}

// ── embedded-hal pins ─────────────────────────────────────────

/// One simulated GPIO, usable as an `embedded-hal` input or output.
pub struct SimPin {
    state: Rc<RefCell<BoardState>>,
    pin: u8,
}

impl embedded_hal::digital::ErrorType for SimPin {
    type Error = Infallible;
}

impl embedded_hal::digital::InputPin for SimPin {
    fn is_high(&mut self) -> Result<bool, Infallible> {
        Ok(self.state.borrow().input_level(self.pin))
    }

    fn is_low(&mut self) -> Result<bool, Infallible> {
        self.is_high().map(|h| !h)
    }
}

impl embedded_hal::digital::OutputPin for SimPin {
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.state.borrow_mut().levels.insert(self.pin, false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.state.borrow_mut().levels.insert(self.pin, true);
        Ok(())
    }
}

/// One simulated PWM channel at full 16-bit resolution.
pub struct SimPwmChannel {
    state: Rc<RefCell<BoardState>>,
    pin: u8,
}

impl embedded_hal::pwm::ErrorType for SimPwmChannel {
    type Error = Infallible;
}

impl embedded_hal::pwm::SetDutyCycle for SimPwmChannel {
    fn max_duty_cycle(&self) -> u16 {
        u16::MAX
    }

    fn set_duty_cycle(&mut self, duty: u16) -> Result<(), Infallible> {
        let mut s = self.state.borrow_mut();
        let pwm = s.pwm.entry(self.pin).or_default();
        pwm.duty = duty;
        pwm.history.push(duty);
        Ok(())
    }
}

// ── Composite peripherals ─────────────────────────────────────

struct SimStrip {
    state: Rc<RefCell<BoardState>>,
    pin: u8,
    count: usize,
}

impl PixelStrip for SimStrip {
    fn write(&mut self, pixels: &[Rgb]) -> Result<(), HalError> {
        let mut frame = pixels.to_vec();
        frame.resize(self.count, (0, 0, 0));
        self.state.borrow_mut().strips.entry(self.pin).or_default().push(frame);
        Ok(())
    }
}

struct SimDisplay {
    state: Rc<RefCell<BoardState>>,
    rs: u8,
}

impl SimDisplay {
    fn with<R>(&self, f: impl FnOnce(&mut DisplayState) -> R) -> R {
        f(self.state.borrow_mut().displays.entry(self.rs).or_default())
    }
}

impl CharacterDisplay for SimDisplay {
    fn initialise(&mut self, _two_line: bool, _show_cursor: bool, _blink_cursor: bool) -> Result<(), HalError> {
        self.with(|d| {
            *d = DisplayState { initialised: true, ..DisplayState::default() };
        });
        Ok(())
    }

    fn clear(&mut self) -> Result<(), HalError> {
        self.with(|d| {
            d.cells.clear();
            d.cursor = (0, 0);
            d.clears += 1;
        });
        Ok(())
    }

    fn set_cursor(&mut self, column: u8, row: u8) -> Result<(), HalError> {
        self.with(|d| d.cursor = (column, row));
        Ok(())
    }

    fn write_char(&mut self, ch: u8) -> Result<(), HalError> {
        self.with(|d| {
            d.cells.insert(d.cursor, ch);
            d.cursor.0 = d.cursor.0.saturating_add(1);
        });
        Ok(())
    }
}

struct SimClimate {
    state: Rc<RefCell<BoardState>>,
    pin: u8,
}

impl ClimateSensor for SimClimate {
    fn read_frame(&mut self) -> Result<[u8; 5], HalError> {
        let mut s = self.state.borrow_mut();
        *s.climate_reads.entry(self.pin).or_default() += 1;
        let next = s.climate.get_mut(&self.pin).and_then(VecDeque::pop_front);
        if let Some(frame) = next {
            s.climate_last.insert(self.pin, frame);
            return Ok(frame);
        }
        s.climate_last
            .get(&self.pin)
            .copied()
            .ok_or_else(|| HalError::Bus(format!("no response from sensor on pin {}", self.pin)))
    }
}

struct SimAir {
    state: Rc<RefCell<BoardState>>,
    sda: u8,
}

impl SimAir {
    fn with<R>(&self, f: impl FnOnce(&mut AirState) -> R) -> R {
        f(self.state.borrow_mut().air.entry(self.sda).or_default())
    }
}

impl AirQualitySensor for SimAir {
    fn sample(&mut self) -> Result<AirSample, HalError> {
        Ok(self.with(|a| a.sample))
    }

    fn status(&mut self) -> Result<u8, HalError> {
        Ok(self.with(|a| a.status))
    }

    fn error_id(&mut self) -> Result<u8, HalError> {
        Ok(self.with(|a| a.error_id))
    }

    fn measure_mode(&mut self) -> Result<u8, HalError> {
        Ok(self.with(|a| a.measure_mode))
    }

    fn set_measure_mode(&mut self, raw: u8) -> Result<(), HalError> {
        self.with(|a| a.measure_mode = raw);
        Ok(())
    }

    fn start_app(&mut self) -> Result<(), HalError> {
        self.with(|a| a.started = true);
        Ok(())
    }

    fn set_environment(&mut self, humidity: f32, temperature: f32) -> Result<(), HalError> {
        self.with(|a| a.environment.push((humidity, temperature)));
        Ok(())
    }
}

struct SimSerial {
    state: Rc<RefCell<BoardState>>,
    uart_id: u8,
}

impl SerialPort for SimSerial {
    fn write(&mut self, bytes: &[u8]) -> Result<usize, HalError> {
        self.state.borrow_mut().serial.entry(self.uart_id).or_default().extend_from_slice(bytes);
        Ok(bytes.len())
    }
}

impl Hardware for SimBoard {
    fn input(&self, pin: u8, _pull: Pull) -> Result<Box<dyn DigitalInput>, HalError> {
        self.claim(pin)?;
        let sim = SimPin { state: self.state.clone(), pin };
        Ok(Box::new(HalInput::new(sim, pin)))
    }

    fn output(&self, pin: u8) -> Result<Box<dyn DigitalOutput>, HalError> {
        self.claim(pin)?;
        let sim = SimPin { state: self.state.clone(), pin };
        Ok(Box::new(HalOutput::new(sim, pin)))
    }

    fn pwm(&self, pin: u8, freq_hz: u32) -> Result<Box<dyn PwmOutput>, HalError> {
        self.claim(pin)?;
        self.state.borrow_mut().pwm.entry(pin).or_default().freq_hz = freq_hz;
        let sim = SimPwmChannel { state: self.state.clone(), pin };
        Ok(Box::new(HalPwm::new(sim, pin)))
    }

    fn pixel_strip(&self, pin: u8, count: usize) -> Result<Box<dyn PixelStrip>, HalError> {
        self.claim(pin)?;
        Ok(Box::new(SimStrip { state: self.state.clone(), pin, count }))
    }

    fn character_display(
        &self,
        register_select: u8,
        enable: u8,
        data: [u8; 4],
    ) -> Result<Box<dyn CharacterDisplay>, HalError> {
        for pin in [register_select, enable].into_iter().chain(data) {
            self.claim(pin)?;
        }
        Ok(Box::new(SimDisplay { state: self.state.clone(), rs: register_select }))
    }

    fn climate_sensor(&self, pin: u8) -> Result<Box<dyn ClimateSensor>, HalError> {
        self.claim(pin)?;
        Ok(Box::new(SimClimate { state: self.state.clone(), pin }))
    }

    fn air_quality(&self, sda: u8, scl: u8) -> Result<Box<dyn AirQualitySensor>, HalError> {
        self.claim(sda)?;
        self.claim(scl)?;
        self.state.borrow_mut().air.entry(sda).or_default();
        Ok(Box::new(SimAir { state: self.state.clone(), sda }))
    }

    fn serial(&self, settings: &UartSettings) -> Result<Box<dyn SerialPort>, HalError> {
        for pin in settings.tx_pin.into_iter().chain(settings.rx_pin) {
            self.claim(pin)?;
        }
        Ok(Box::new(SimSerial { state: self.state.clone(), uart_id: settings.uart_id }))
    }

    fn onboard_led(&self) -> Result<Box<dyn DigitalOutput>, HalError> {
        self.output(ONBOARD_LED_PIN)
    }
}

// ═══════════════════════════════════════════════════════════════
//  ESP-IDF board
// ═══════════════════════════════════════════════════════════════

#[cfg(target_os = "espidf")]
pub use esp::EspHardware;

#[cfg(target_os = "espidf")]
mod esp {
    use core::cell::Cell;

    use esp_idf_hal::delay::{Ets, FreeRtos};
    use esp_idf_hal::gpio::AnyIOPin;
    use esp_idf_hal::i2c::{I2cConfig, I2cDriver, I2C0};
    use esp_idf_hal::units::Hertz;
    use esp_idf_svc::sys::*;
    use log::info;

    use super::ONBOARD_LED_PIN;
    use crate::app::ports::{
        AirQualitySensor, CharacterDisplay, ClimateSensor, DigitalInput, DigitalOutput, Hardware, PixelStrip, Pull,
        PwmOutput, SerialPort, UartSettings,
    };
    use crate::drivers::ccs811::Ccs811;
    use crate::drivers::hd44780::Hd44780;
    use crate::drivers::ws2812::Ws2812;
    use crate::error::HalError;

    /// LEDC timers available for independent PWM frequencies.
    const LEDC_TIMERS: u32 = 4;
    const LEDC_RESOLUTION_BITS: u32 = 10;
    const I2C_BAUDRATE_HZ: u32 = 100_000;
    const UART_RX_BUFFER: i32 = 256;

    fn check(pin: u8, rc: esp_err_t) -> Result<(), HalError> {
        if rc == ESP_OK {
            Ok(())
        } else {
            Err(HalError::Pin { pin, code: rc })
        }
    }

    /// Real peripherals, claimed on demand by pin number.
    pub struct EspHardware {
        next_ledc: Cell<u32>,
        next_rmt: Cell<u8>,
        i2c_taken: Cell<bool>,
    }

    impl EspHardware {
        /// Must be constructed at most once; it hands out peripherals by
        /// number without the `esp-idf-hal` ownership tokens.
        pub fn new() -> Self {
            info!("hardware: ESP-IDF adapter ready");
            Self {
                next_ledc: Cell::new(0),
                next_rmt: Cell::new(0),
                i2c_taken: Cell::new(false),
            }
        }
    }

    // ── GPIO ──────────────────────────────────────────────────

    struct EspInput(u8);

    impl DigitalInput for EspInput {
        fn is_high(&mut self) -> Result<bool, HalError> {
            // SAFETY: register read on a pin configured as input in `input()`.
            Ok(unsafe { gpio_get_level(i32::from(self.0)) } != 0)
        }
    }

    struct EspOutput(u8);

    impl DigitalOutput for EspOutput {
        fn set_level(&mut self, high: bool) -> Result<(), HalError> {
            // SAFETY: register write on a pin configured as output in `output()`.
            check(self.0, unsafe { gpio_set_level(i32::from(self.0), u32::from(high)) })
        }
    }

    // ── LEDC ──────────────────────────────────────────────────

    struct EspPwm {
        pin: u8,
        channel: u32,
    }

    impl PwmOutput for EspPwm {
        fn set_duty_u16(&mut self, duty: u16) -> Result<(), HalError> {
            let scaled = u32::from(duty) >> (16 - LEDC_RESOLUTION_BITS);
            // SAFETY: channel configured in `pwm()`; single executor thread.
            unsafe {
                check(self.pin, ledc_set_duty(ledc_mode_t_LEDC_LOW_SPEED_MODE, self.channel, scaled))?;
                check(self.pin, ledc_update_duty(ledc_mode_t_LEDC_LOW_SPEED_MODE, self.channel))
            }
        }
    }

    // ── UART ──────────────────────────────────────────────────

    struct EspSerial {
        port: i32,
    }

    impl SerialPort for EspSerial {
        fn write(&mut self, bytes: &[u8]) -> Result<usize, HalError> {
            // SAFETY: driver installed in `serial()`; the buffer outlives the call.
            let n = unsafe { uart_write_bytes(self.port, bytes.as_ptr().cast(), bytes.len()) };
            usize::try_from(n).map_err(|_| HalError::Bus(format!("uart{} write failed (rc={n})", self.port)))
        }
    }

    impl Hardware for EspHardware {
        fn input(&self, pin: u8, pull: Pull) -> Result<Box<dyn DigitalInput>, HalError> {
            let cfg = gpio_config_t {
                pin_bit_mask: 1u64 << pin,
                mode: gpio_mode_t_GPIO_MODE_INPUT,
                pull_up_en: if pull == Pull::Up {
                    gpio_pullup_t_GPIO_PULLUP_ENABLE
                } else {
                    gpio_pullup_t_GPIO_PULLUP_DISABLE
                },
                pull_down_en: if pull == Pull::Down {
                    gpio_pulldown_t_GPIO_PULLDOWN_ENABLE
                } else {
                    gpio_pulldown_t_GPIO_PULLDOWN_DISABLE
                },
                intr_type: gpio_int_type_t_GPIO_INTR_DISABLE,
            };
            // SAFETY: plain configuration call from the single startup context.
            check(pin, unsafe { gpio_config(&cfg) })?;
            Ok(Box::new(EspInput(pin)))
        }

        fn output(&self, pin: u8) -> Result<Box<dyn DigitalOutput>, HalError> {
            let cfg = gpio_config_t {
                pin_bit_mask: 1u64 << pin,
                mode: gpio_mode_t_GPIO_MODE_OUTPUT,
                pull_up_en: gpio_pullup_t_GPIO_PULLUP_DISABLE,
                pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
                intr_type: gpio_int_type_t_GPIO_INTR_DISABLE,
            };
            // SAFETY: as above.
            check(pin, unsafe { gpio_config(&cfg) })?;
            Ok(Box::new(EspOutput(pin)))
        }

        fn pwm(&self, pin: u8, freq_hz: u32) -> Result<Box<dyn PwmOutput>, HalError> {
            let channel = self.next_ledc.get();
            if channel >= LEDC_TIMERS {
                return Err(HalError::Bus(format!("no free LEDC timer for pin {pin}")));
            }
            self.next_ledc.set(channel + 1);

            let timer = ledc_timer_config_t {
                speed_mode: ledc_mode_t_LEDC_LOW_SPEED_MODE,
                timer_num: ledc_timer_t_LEDC_TIMER_0 + channel,
                duty_resolution: ledc_timer_bit_t_LEDC_TIMER_10_BIT,
                freq_hz,
                clk_cfg: soc_periph_ledc_clk_src_legacy_t_LEDC_AUTO_CLK,
                ..Default::default()
            };
            let chan = ledc_channel_config_t {
                speed_mode: ledc_mode_t_LEDC_LOW_SPEED_MODE,
                channel: ledc_channel_t_LEDC_CHANNEL_0 + channel,
                timer_sel: ledc_timer_t_LEDC_TIMER_0 + channel,
                gpio_num: i32::from(pin),
                duty: 0,
                hpoint: 0,
                ..Default::default()
            };
            // SAFETY: each channel/timer pair is configured exactly once.
            unsafe {
                check(pin, ledc_timer_config(&timer))?;
                check(pin, ledc_channel_config(&chan))?;
            }
            Ok(Box::new(EspPwm { pin, channel }))
        }

        fn pixel_strip(&self, pin: u8, count: usize) -> Result<Box<dyn PixelStrip>, HalError> {
            let channel = self.next_rmt.get();
            let strip = Ws2812::new(channel, pin, count)?;
            self.next_rmt.set(channel + 1);
            Ok(Box::new(strip))
        }

        fn character_display(
            &self,
            register_select: u8,
            enable: u8,
            data: [u8; 4],
        ) -> Result<Box<dyn CharacterDisplay>, HalError> {
            let rs = self.output(register_select)?;
            let en = self.output(enable)?;
            let [d4, d5, d6, d7] = data;
            let bus = [self.output(d4)?, self.output(d5)?, self.output(d6)?, self.output(d7)?];
            Ok(Box::new(Hd44780::new(rs, en, bus, Ets)))
        }

        fn climate_sensor(&self, _pin: u8) -> Result<Box<dyn ClimateSensor>, HalError> {
            Err(HalError::Unsupported("DHT single-wire capture"))
        }

        fn air_quality(&self, sda: u8, scl: u8) -> Result<Box<dyn AirQualitySensor>, HalError> {
            if self.i2c_taken.replace(true) {
                return Err(HalError::Bus("I2C0 already in use".into()));
            }
            let config = I2cConfig::new().baudrate(Hertz(I2C_BAUDRATE_HZ));
            // SAFETY: I2C0 and these pins are claimed once, guarded by `i2c_taken`.
            let driver = unsafe {
                I2cDriver::new(I2C0::new(), AnyIOPin::new(i32::from(sda)), AnyIOPin::new(i32::from(scl)), &config)
            }
            .map_err(|e| HalError::Bus(format!("i2c init: {e}")))?;
            Ok(Box::new(Ccs811::probe(driver, FreeRtos)?))
        }

        fn serial(&self, settings: &UartSettings) -> Result<Box<dyn SerialPort>, HalError> {
            let port = i32::from(settings.uart_id);
            let cfg = uart_config_t {
                baud_rate: settings.baudrate as i32,
                data_bits: u32::from(settings.bits.saturating_sub(5)),
                parity: match settings.parity {
                    None => uart_parity_t_UART_PARITY_DISABLE,
                    Some(0) => uart_parity_t_UART_PARITY_EVEN,
                    Some(_) => uart_parity_t_UART_PARITY_ODD,
                },
                stop_bits: if settings.stop_bits == 2 {
                    uart_stop_bits_t_UART_STOP_BITS_2
                } else {
                    uart_stop_bits_t_UART_STOP_BITS_1
                },
                flow_ctrl: uart_hw_flowcontrol_t_UART_HW_FLOWCTRL_DISABLE,
                ..Default::default()
            };
            let pin = |p: Option<u8>| p.map_or(UART_PIN_NO_CHANGE, i32::from);
            let tag = settings.tx_pin.unwrap_or_default();
            // SAFETY: one driver per UART id, installed from the startup context.
            unsafe {
                check(tag, uart_driver_install(port, UART_RX_BUFFER, 0, 0, core::ptr::null_mut(), 0))?;
                check(tag, uart_param_config(port, &cfg))?;
                check(
                    tag,
                    uart_set_pin(port, pin(settings.tx_pin), pin(settings.rx_pin), UART_PIN_NO_CHANGE, UART_PIN_NO_CHANGE),
                )?;
            }
            Ok(Box::new(EspSerial { port }))
        }

        fn onboard_led(&self) -> Result<Box<dyn DigitalOutput>, HalError> {
            self.output(ONBOARD_LED_PIN)
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outputs_are_recorded_and_inputs_driven() {
        let board = SimBoard::new();
        let mut out = board.output(5).unwrap();
        out.set_level(true).unwrap();
        assert!(board.level(5));

        let mut input = board.input(6, Pull::Down).unwrap();
        assert!(!input.is_high().unwrap());
        board.set_input(6, true);
        assert!(input.is_high().unwrap());
    }

    #[test]
    fn connected_input_follows_output() {
        let board = SimBoard::new();
        let mut column = board.output(10).unwrap();
        let mut row = board.input(20, Pull::Down).unwrap();
        board.connect(10, 20);
        assert!(!row.is_high().unwrap());
        column.set_level(true).unwrap();
        assert!(row.is_high().unwrap());
    }

    #[test]
    fn broken_pin_refuses_claims() {
        let board = SimBoard::new();
        board.break_pin(7);
        assert!(matches!(board.pwm(7, 25_000), Err(HalError::Pin { pin: 7, .. })));
        assert!(board.output(8).is_ok());
    }

    #[test]
    fn pwm_duty_history_is_kept() {
        let board = SimBoard::new();
        let mut pwm = Hardware::pwm(&board, 17, 25_000).unwrap();
        pwm.set_duty_u16(100).unwrap();
        pwm.set_duty_u16(200).unwrap();
        let state = board.pwm_state(17).unwrap();
        assert_eq!(state.freq_hz, 25_000);
        assert_eq!(state.history, vec![100, 200]);
    }

    #[test]
    fn climate_sensor_repeats_last_frame() {
        let board = SimBoard::new();
        let mut sensor = board.climate_sensor(3).unwrap();
        assert!(sensor.read_frame().is_err());
        board.push_climate_frame(3, [1, 2, 3, 4, 10]);
        assert_eq!(sensor.read_frame().unwrap(), [1, 2, 3, 4, 10]);
        assert_eq!(sensor.read_frame().unwrap(), [1, 2, 3, 4, 10]);
        assert_eq!(board.climate_reads(3), 3);
    }
}
