//! Application core: the device model, event and chain wiring, the port
//! traits hardware is reached through, and the supervisor tying them
//! together.  Nothing here touches a peripheral directly; every device
//! owns port objects handed out by a [`ports::Hardware`] factory.

pub mod device;
pub mod events;
pub mod ports;
pub mod supervisor;
