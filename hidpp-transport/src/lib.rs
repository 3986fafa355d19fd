//! Transport abstraction layer for HID++ peripheral communication
//!
//! This crate routes HID++ traffic between callers and physical
//! transports:
//!
//! - A per-transport dispatcher with named queues, predicate-filtered
//!   gets and a per-device outstanding-request mutex
//! - A receiver-side multi-queue demultiplexing paired devices
//! - Channel lifecycle over a USB hub model with per-device caches
//! - A BLE GATT codec speaking to an external stack over a message bus
//! - A hidapi backend for wired devices and receivers

pub mod ble;
pub mod channel;
pub mod dispatcher;
pub mod error;
pub mod multiqueue;
pub mod queue;

mod hid_backend;
mod sync_adapter;

pub use ble::{
    Address, AddressType, AdvReport, BleAdapter, BleEvent, Characteristic, ConnectionHandle,
    ConnectionParameters, Envelope, MessageBus, ReadOp, SecurityParameters, Service, WriteOp,
};
pub use channel::{ChannelId, ChannelManager, DeviceChannel, UsbHubModel};
pub use dispatcher::{Dispatcher, InboundReport, QueueName, RawChannel};
pub use error::TransportError;
pub use hid_backend::{HidRawChannel, VENDOR_LOGITECH};
pub use multiqueue::MultiQueue;
pub use queue::FilterQueue;
pub use sync_adapter::SyncDispatcher;
