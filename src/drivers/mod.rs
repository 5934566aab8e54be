//! Bus-level peripheral drivers behind the composite port traits.

pub mod ccs811;
pub mod hd44780;
pub mod ws2812;
