//! Dungeon Terminal wire protocol.
//!
//! Message types exchanged over the persistent game connection. Used by the
//! engine (receiving `ClientMessage`, sending `ServerMessage`) and by any
//! client implementation.
//!
//! # Design Principles
//!
//! 1. **Minimal dependencies** - serde and the domain crate only
//! 2. **No business logic** - pure data types and serialization
//! 3. **Closed vocabulary** - every server-sent frame is one of the
//!    `ServerMessage` variants; the engine never invents new shapes

pub mod messages;

pub use messages::{ClientMessage, HpUpdate, ServerMessage};
