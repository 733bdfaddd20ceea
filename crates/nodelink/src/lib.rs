//! The data and wire interface between a provisioning agent, the devices it
//! configures and the cloud service that manages them.
//!
//! This crate provides APIs to:
//!
//! - Encode and decode the protobuf envelopes exchanged with a device during
//!   provisioning: the challenge-response handshake used to prove a device
//!   identity, the user-mapping exchange, and the network credentials
//!   transfer.
//! - Parse, compare and rewrite Thread operational datasets, and decide how
//!   the dataset of a border router and the one of an external source must be
//!   reconciled.
//! - Describe a node as reported by the cloud: its services, their
//!   parameters, and the parameter updates sent back to it.
//!
//! No function in this crate performs I/O. A device firmware can decode the
//! messages produced by an agent and the other way around.
//!
//! This crate can be compiled for both `std` and `no_std` environments.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![no_std]

extern crate alloc;

/// Challenge-response and user-mapping envelopes.
pub mod codec;
/// Thread operational datasets.
pub mod dataset;
/// Device capabilities.
pub mod device;
/// Network credentials messages.
pub mod network;
/// Nodes, services and parameters as reported by the cloud.
pub mod node;
/// Reconciliation of two operational datasets.
pub mod reconcile;
