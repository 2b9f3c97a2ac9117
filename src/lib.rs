//! An embedded-grade SMTP client.
//!
//! This crate turns a caller-supplied [`Transport`] and a caller-supplied
//! byte buffer into a stateful SMTP session: the extended greeting
//! handshake (EHLO, with HELO fallback), optional `AUTH PLAIN` /
//! `AUTH LOGIN` authentication, a mail transaction (`MAIL FROM` /
//! `RCPT TO` / `DATA`), and orderly shutdown (`QUIT`).
//!
//! The crate never opens or configures the transport itself, never spawns
//! a thread or task, and never allocates: every encoded command and every
//! decoded reply lives in the buffer the caller handed to [`Session::connect`].
//!
//! ```text
//! let mut buf = [0u8; 512];
//! let mut session = Session::new();
//! session.connect(ConnectInfo {
//!     transport: my_tcp_stream,
//!     buffer: &mut buf,
//!     remote_endpoint: my_endpoint,
//!     auth: None,
//!     client_id: None,
//! })?;
//! session.send(&message)?;
//! session.close()?;
//! ```
#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![deny(missing_debug_implementations)]

mod auth;
mod capability;
mod clock;
mod command;
mod error;
mod io;
mod message;
mod reply;
mod session;
mod transport;

pub use auth::Credentials;
pub use capability::Capabilities;
pub use clock::{Clock, RfcDate};
pub use error::Error;
pub use message::{Envelope, Mailbox, Message};
pub use reply::{Reply, ReplyClass};
pub use session::{ConnectInfo, Session};
pub use transport::Transport;
