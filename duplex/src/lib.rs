//! Two-party UDP line chat.
//!
//! A session links the local terminal to exactly one remote peer. Text typed
//! locally goes out as datagrams; datagrams from the peer are printed. Either
//! side ends the session for both by typing a line holding only `!`.
//!
//! # Architecture
//!
//! ```text
//!              ┌────────────┐   outbound   ┌─────────────┐
//!  stdin ────▶ │   input    │ ───queue───▶ │ transmitter │ ────┐
//!              └────────────┘              └─────────────┘     │
//!                                                       shared UDP endpoint ◀──▶ peer
//!              ┌────────────┐   inbound    ┌─────────────┐     │
//!  stdout ◀─── │  display   │ ◀──queue──── │  receiver   │ ◀───┘
//!              └────────────┘              └─────────────┘
//! ```
//!
//! - [`message`]: chat messages and termination-marker detection
//! - [`sync`]: bounded queue, rendezvous gate, once flag, cancellation
//! - [`net`]: UDP transport and the shared endpoint
//! - [`stdio`]: interruptible stdin and the session console
//! - [`session`]: the four workers and exactly-once shutdown
//!
//! # Tracing
//!
//! Enable the `tracing` feature for diagnostic events on stderr, then call
//! [`init_tracing`] once at startup.

pub mod message;
pub mod net;
pub mod session;
pub mod stdio;
pub mod sync;

mod trace;

pub use trace::init_tracing;
