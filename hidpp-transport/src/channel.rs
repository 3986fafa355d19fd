//! Channel lifecycle over a USB hub model.
//!
//! A channel binds one `(port_index, device_index)` pair to a
//! dispatcher. The hub model tracks which ports carry power; the
//! manager caches channels, supports switching the active channel
//! without necessarily closing the previous one, and caches the HID++
//! protocol version per device so feature resolution is not repeated on
//! every request.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info};

use hidpp_protocol::features::root::{
    GetFeature, GetFeatureResponse, GetProtocolVersion, GetProtocolVersionResponse,
};
use hidpp_protocol::features::{FeatureRequest, FeatureResponse};

use crate::dispatcher::{Dispatcher, QueueName};
use crate::error::TransportError;

/// Identity of a channel within the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId {
    pub port_index: u16,
    pub device_index: u8,
}

/// Power state of the hub's downstream ports.
#[derive(Debug, Default)]
pub struct UsbHubModel {
    ports: Mutex<HashMap<u16, bool>>,
}

impl UsbHubModel {
    pub fn new(port_count: u16) -> Self {
        let ports = (0..port_count).map(|i| (i, true)).collect();
        Self {
            ports: Mutex::new(ports),
        }
    }

    pub fn enable_port(&self, index: u16) {
        info!(port = index, "hub port on");
        self.ports.lock().insert(index, true);
    }

    pub fn disable_port(&self, index: u16) {
        info!(port = index, "hub port off");
        self.ports.lock().insert(index, false);
    }

    pub fn is_powered(&self, index: u16) -> bool {
        self.ports.lock().get(&index).copied().unwrap_or(false)
    }
}

/// Ping payload for the protocol-version probe.
const VERSION_PING: u8 = 0x5A;

/// A logical endpoint to one device behind one port.
pub struct DeviceChannel {
    pub id: ChannelId,
    dispatcher: Arc<Dispatcher>,
    software_id: u8,
    hidpp_version: Mutex<Option<u8>>,
    feature_cache: Mutex<HashMap<u16, (u8, u8)>>,
    open: AtomicBool,
}

impl DeviceChannel {
    pub fn new(id: ChannelId, dispatcher: Arc<Dispatcher>, software_id: u8) -> Self {
        Self {
            id,
            dispatcher,
            software_id: software_id & 0x0F,
            hidpp_version: Mutex::new(None),
            feature_cache: Mutex::new(HashMap::new()),
            open: AtomicBool::new(true),
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        self.dispatcher.clone()
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.is_open() {
            Ok(())
        } else {
            Err(TransportError::Disconnected)
        }
    }

    /// Send a typed request on the queue matching its feature id.
    pub async fn request<Rq, Rs>(
        &self,
        req: &Rq,
        feature_index: u8,
        queue: QueueName,
        timeout: Duration,
    ) -> Result<Rs, TransportError>
    where
        Rq: FeatureRequest,
        Rs: FeatureResponse,
    {
        self.ensure_open()?;
        let report = req.build(self.id.device_index, feature_index, self.software_id)?;
        let data = self.dispatcher.send(report, queue, timeout).await?;
        Ok(Rs::parse(&data)?)
    }

    /// Protocol version, cached after the first probe.
    pub async fn hidpp_version(&self, timeout: Duration) -> Result<u8, TransportError> {
        if let Some(v) = *self.hidpp_version.lock() {
            return Ok(v);
        }
        let rsp: GetProtocolVersionResponse = self
            .request(
                &GetProtocolVersion {
                    ping_data: VERSION_PING,
                },
                0,
                QueueName::Important,
                timeout,
            )
            .await?;
        debug!(
            device = self.id.device_index,
            version = rsp.protocol_num,
            "protocol version probed"
        );
        *self.hidpp_version.lock() = Some(rsp.protocol_num);
        Ok(rsp.protocol_num)
    }

    /// Resolve a feature id to `(feature_index, version)`, cached, and
    /// register the route with the dispatcher.
    pub async fn resolve_feature(
        &self,
        feature_id: u16,
        max_function_index: u8,
        timeout: Duration,
    ) -> Result<(u8, u8), TransportError> {
        if let Some(entry) = self.feature_cache.lock().get(&feature_id) {
            return Ok(*entry);
        }
        let rsp: GetFeatureResponse = self
            .request(
                &GetFeature { feature_id },
                0,
                QueueName::Important,
                timeout,
            )
            .await?;
        if rsp.feature_index == 0 {
            return Err(TransportError::DeviceNotFound(format!(
                "feature 0x{feature_id:04X} not implemented"
            )));
        }
        self.dispatcher.register_feature(
            self.id.device_index,
            rsp.feature_index,
            feature_id,
            max_function_index,
        );
        let entry = (rsp.feature_index, rsp.version);
        self.feature_cache.lock().insert(feature_id, entry);
        Ok(entry)
    }

    /// Mark closed; further requests fail with `Disconnected`. Pending
    /// gets are cancelled when [`ChannelManager::remove`] closes the
    /// dispatcher.
    pub fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            debug!(?self.id, "channel closed");
        }
    }
}

/// Channel cache plus the active-channel pointer.
pub struct ChannelManager {
    hub: UsbHubModel,
    channels: Mutex<HashMap<ChannelId, Arc<DeviceChannel>>>,
    current: Mutex<Option<ChannelId>>,
}

impl ChannelManager {
    pub fn new(hub: UsbHubModel) -> Self {
        Self {
            hub,
            channels: Mutex::new(HashMap::new()),
            current: Mutex::new(None),
        }
    }

    pub fn hub(&self) -> &UsbHubModel {
        &self.hub
    }

    pub fn insert(&self, channel: Arc<DeviceChannel>) {
        self.channels.lock().insert(channel.id, channel);
    }

    pub fn get(&self, id: ChannelId) -> Option<Arc<DeviceChannel>> {
        self.channels.lock().get(&id).cloned()
    }

    pub fn current(&self) -> Option<Arc<DeviceChannel>> {
        let id = (*self.current.lock())?;
        self.get(id)
    }

    /// Make `new_id` the active channel.
    ///
    /// The previous channel stays open unless `close_previous` is set;
    /// the new one is only usable if its port carries power.
    pub fn switch_channel(
        &self,
        new_id: ChannelId,
        close_previous: bool,
        open_new: bool,
    ) -> Result<Arc<DeviceChannel>, TransportError> {
        if !self.hub.is_powered(new_id.port_index) {
            return Err(TransportError::DeviceNotFound(format!(
                "port {} is unpowered",
                new_id.port_index
            )));
        }
        let new_channel = self.get(new_id).ok_or_else(|| {
            TransportError::DeviceNotFound(format!("no channel at {new_id:?}"))
        })?;
        if close_previous {
            if let Some(prev) = self.current() {
                if prev.id != new_id {
                    prev.close();
                }
            }
        }
        if open_new {
            new_channel.open.store(true, Ordering::SeqCst);
        }
        *self.current.lock() = Some(new_id);
        Ok(new_channel)
    }

    /// Drop a channel on unplug; pending gets on its dispatcher cancel.
    pub fn remove(&self, id: ChannelId) {
        if let Some(channel) = self.channels.lock().remove(&id) {
            channel.close();
            channel.dispatcher().close();
        }
        let mut current = self.current.lock();
        if *current == Some(id) {
            *current = None;
        }
    }
}
