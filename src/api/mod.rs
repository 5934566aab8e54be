//! The request/response protocol.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                        API stack                          │
//! │                                                           │
//! │  ┌──────────┐   ┌──────────┐   ┌───────────────────────┐  │
//! │  │  server  │──▶│  codec   │──▶│  router (route table) │  │
//! │  │ (accept) │   │ (lines)  │   │  → device / chain     │  │
//! │  └──────────┘   └──────────┘   └───────────────────────┘  │
//! │                                           │               │
//! │                                    pages (docs, logs)     │
//! └───────────────────────────────────────────────────────────┘
//! ```

pub mod codec;
pub mod pages;
pub mod router;
pub mod server;
