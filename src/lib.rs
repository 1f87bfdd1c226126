//! # sortlink
//!
//! A Rust client library for serial-connected recycling sorter controllers.
//!
//! An upstream image classifier labels each camera frame; this library maps
//! the label to a single ASCII command byte and delivers it to the
//! microcontroller driving the sorting servos, handling port discovery,
//! connection lifecycle, bounded retries and liveness along the way.
//!
//! ## Features
//!
//! - Async/await based API using Tokio
//! - Automatic port discovery by USB bridge-chip keywords
//! - Bounded, never-spinning reconnect with a persistent retry budget
//! - Event broadcasting for surfacing link state to a hosting UI
//!
//! ## Quick Start
//!
//! ```no_run
//! use sortlink::{Classification, SortLink};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), sortlink::Error> {
//!     // Discover and connect to the sorter controller
//!     let mut link = SortLink::auto();
//!     link.connect(None).await?;
//!
//!     // Route one classified frame
//!     let verdict = Classification::new("plastic", 0.91);
//!     if let Some(material) = link.dispatch_classification(&verdict).await? {
//!         println!("routed item to the {material} bin");
//!     }
//!
//!     link.disconnect().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`types`] - Material classes, command bytes, port descriptors, states
//! - [`discovery`] - Serial port enumeration and candidate filtering
//! - [`transport`] - The serial seam ([`Transport`] trait and its
//!   `tokio-serial` implementation)
//! - [`link`] - Connection manager and command dispatcher state machine
//! - [`event`] - Broadcast channel for link events
//! - [`client`] - High-level [`SortLink`] client with health supervision
//!
//! ## Wire protocol
//!
//! One ASCII character per action at 9600 baud, no framing, no checksum:
//! `P` paper, `M` metal, `L` plastic, `G` glass, `T` trash, `R` reset/home.
//! The firmware prints free-text status lines back; they are logged and
//! broadcast but never parsed. Command success means the byte was written,
//! not that the servos moved - the protocol carries no per-command ack.

pub mod client;
pub mod discovery;
pub mod error;
pub mod event;
pub mod link;
pub mod transport;
pub mod types;

// Re-exports for convenience
pub use client::{DEFAULT_CONFIDENCE_THRESHOLD, SortLink};
pub use discovery::list_candidate_ports;
pub use error::{Error, Result};
pub use event::{EventDispatcher, LinkEvent, Subscription};
pub use link::{LinkConfig, LinkManager};
pub use transport::{SerialTransport, Transport, serial::SerialConfig};
pub use types::{Classification, LinkState, Material, PortDescriptor, SortCommand};
