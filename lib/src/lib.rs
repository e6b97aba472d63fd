//! Pushq-lib is a shared library used by the `pushq` binary.
//!
//! It contains common components such as:
//!
//! - Everything about [Message](message::Message)s and their payloads.
//! - The [PushClient](delivery::PushClient), which delivers queued messages
//!   to the push gateway and tracks per-recipient retry state.
//! - Network code: the binary packet format, the TLS connector and the
//!   feedback service client.
//!
//! Pushq-lib is a stand-alone crate, so it can be used by third-party
//! applications to push notifications through the binary gateway protocol
//! from their own code.

/// The delivery engine: connection lifecycle and the send/retry loop.
pub mod delivery;
/// Pushq-lib's own Error implementation.
pub mod error;
/// The logical notification and its JSON payload.
pub mod message;
pub mod network;
/// Per-recipient delivery outcome tracking.
pub mod report;
/// Pushq's representation of configuration and their default settings.
pub mod settings;
