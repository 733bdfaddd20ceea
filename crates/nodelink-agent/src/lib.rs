//! The `nodelink-agent` library crate provides a headless agent that takes
//! a freshly discovered IoT node, proves its identity, binds it to a cloud
//! user and hands it its network credentials.
//!
//! Core functionalities of this crate include:
//!
//! - Authenticating a device through a challenge-response handshake verified
//!   by the cloud
//! - Associating legacy devices with a user through a shared secret, then
//!   polling the cloud until the association is confirmed
//! - Transferring Wi-Fi or Thread credentials to a device and waiting for it
//!   to join the network
//! - Keeping the operational dataset of a Thread border router in sync with
//!   the one of an external source
//! - Delegating the cloud credentials of a user to a Matter controller node
//!
//! Every device and cloud exchange goes through the [`transport::Transport`]
//! and [`cloud::Cloud`] traits, so a session can run over different links
//! and against different cloud backends. The agent relies on `tokio` for
//! its timers and for running independent waits concurrently.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

/// Device authentication through a challenge-response handshake.
pub mod auth;
/// A client for the cloud service managing nodes and users.
pub mod cloud;
/// Agent configuration.
pub mod config;
/// Network credentials transfer.
pub mod credentials;
/// Delegation of the user cloud credentials to a Matter controller.
pub mod delegation;
/// A connected device and its capabilities.
pub mod device;
/// Error management.
pub mod error;
/// The provisioning session orchestrator.
pub mod provision;
/// Node setup after provisioning.
pub mod setup;
/// Thread border router datasets.
pub mod thread;
/// Links towards a device.
pub mod transport;
