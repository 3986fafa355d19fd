//! BLE GATT operation codec.
//!
//! The BLE stack lives in a separate process; this module only encodes
//! typed operations into the `(tag, args)` envelope carried over an
//! injected message bus and decodes the stack's replies. Tag values are
//! stable wire constants. Stack-death errors are distinguished from
//! argument rejections so callers can tell "reopen the bridge" apart
//! from "fix the request".

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::TransportError;

/// Stable operation tags of the bridge envelope. Responses use the
/// request tag with the high bit set.
pub mod tag {
    pub const SCAN: u8 = 0x01;
    pub const SCAN_STOP: u8 = 0x02;
    pub const CONNECT: u8 = 0x03;
    pub const DISCONNECT: u8 = 0x04;
    pub const DISCOVER_SERVICES: u8 = 0x05;
    pub const PAIR: u8 = 0x06;
    pub const DELETE_BOND: u8 = 0x07;
    pub const UPDATE_CONN_PARAMS: u8 = 0x08;
    pub const GET_SECURITY_PARAMS: u8 = 0x09;
    pub const WRITE_CHAR: u8 = 0x0A;
    pub const READ_CHAR: u8 = 0x0B;
    pub const READ_DESCRIPTOR: u8 = 0x0C;
    pub const SET_NOTIFICATION: u8 = 0x0D;
    pub const SET_INDICATION: u8 = 0x0E;
    pub const SET_CONN_PARAMS_RANGE: u8 = 0x0F;

    pub const ERROR: u8 = 0x7F;
    pub const RESPONSE_BIT: u8 = 0x80;
}

/// One bus message: stable tag plus operation-specific arguments.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    pub tag: u8,
    pub args: serde_json::Value,
}

impl Envelope {
    pub fn new<T: Serialize>(tag: u8, args: &T) -> Result<Self, TransportError> {
        Ok(Self {
            tag,
            args: serde_json::to_value(args)
                .map_err(|e| TransportError::Internal(format!("envelope encode: {e}")))?,
        })
    }

    pub fn decode<T: for<'de> Deserialize<'de>>(&self) -> Result<T, TransportError> {
        serde_json::from_value(self.args.clone())
            .map_err(|e| TransportError::Internal(format!("envelope decode: {e}")))
    }
}

/// Address type tag carried next to every 6-byte address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressType {
    Public,
    RandomStatic,
    RandomPrivateResolvable,
    RandomPrivateNonResolvable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    pub bytes: [u8; 6],
    pub kind: AddressType,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdvReport {
    pub address: Address,
    pub rssi: i8,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionHandle(pub u16);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Descriptor {
    pub uuid: u128,
    pub handle: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Characteristic {
    pub uuid: u128,
    pub handle: u16,
    /// GATT property bits (broadcast, read, write, notify, indicate...).
    pub properties: u8,
    pub descriptors: Vec<Descriptor>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Service {
    pub uuid: u128,
    pub characteristics: Vec<Characteristic>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ConnectionParameters {
    pub interval_min: u16,
    pub interval_max: u16,
    pub latency: u16,
    pub supervision_timeout: u16,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SecurityParameters {
    pub encrypted: bool,
    pub authenticated: bool,
    pub key_size: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteOp {
    Auto,
    WithResponse,
    WithoutResponse,
    Long,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadOp {
    Short,
    Long,
}

/// Events pushed by the stack outside the request/response flow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BleEvent {
    Notification {
        handle: ConnectionHandle,
        characteristic: u16,
        data: Vec<u8>,
        timestamp_us: u64,
    },
    Indication {
        handle: ConnectionHandle,
        characteristic: u16,
        data: Vec<u8>,
        timestamp_us: u64,
    },
    L2capConnParamUpdateRequest {
        handle: ConnectionHandle,
        params: ConnectionParameters,
        timestamp_us: u64,
        accepted: bool,
    },
    Paired {
        handle: ConnectionHandle,
        address: Address,
    },
    Error {
        request_tag: u8,
        code: u16,
        detail: String,
    },
    Log {
        message: String,
    },
}

/// Error payload of a `tag::ERROR` envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ErrorArgs {
    code: u16,
    detail: String,
    /// Stack died vs request rejected.
    critical: bool,
}

/// The message bus carrying envelopes to the external BLE stack.
#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn request(&self, envelope: Envelope) -> Result<Envelope, TransportError>;

    fn events(&self) -> broadcast::Receiver<BleEvent>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ScanArgs {
    duration_ms: u64,
    active: bool,
    /// Only report addresses in this list when non-empty.
    filters: Vec<Address>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PairArgs {
    handle: ConnectionHandle,
    io_caps: u8,
    auth_req: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WriteCharArgs {
    handle: ConnectionHandle,
    characteristic: u16,
    op: WriteOp,
    data: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ReadCharArgs {
    handle: ConnectionHandle,
    characteristic: u16,
    op: ReadOp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SubscribeArgs {
    handle: ConnectionHandle,
    characteristic: u16,
    enabled: bool,
}

/// Typed facade over the envelope bus.
pub struct BleAdapter<B: MessageBus> {
    bus: B,
}

impl<B: MessageBus> BleAdapter<B> {
    pub fn new(bus: B) -> Self {
        Self { bus }
    }

    /// Subscribe to the stack's event stream.
    pub fn events(&self) -> broadcast::Receiver<BleEvent> {
        self.bus.events()
    }

    async fn roundtrip<T: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        op: u8,
        args: &T,
    ) -> Result<R, TransportError> {
        let request = Envelope::new(op, args)?;
        debug!(tag = op, "ble request");
        let response = self.bus.request(request).await?;
        if response.tag == tag::ERROR {
            let err: ErrorArgs = response.decode()?;
            return Err(if err.critical {
                TransportError::BleCritical(err.detail)
            } else {
                TransportError::BleArgument(format!("code {}: {}", err.code, err.detail))
            });
        }
        if response.tag != op | tag::RESPONSE_BIT {
            return Err(TransportError::Internal(format!(
                "mismatched response tag 0x{:02X} for request 0x{op:02X}",
                response.tag
            )));
        }
        response.decode()
    }

    pub async fn scan(
        &self,
        duration: Duration,
        active: bool,
        filters: Vec<Address>,
    ) -> Result<HashMap<Address, AdvReport>, TransportError> {
        let reports: Vec<AdvReport> = self
            .roundtrip(
                tag::SCAN,
                &ScanArgs {
                    duration_ms: duration.as_millis() as u64,
                    active,
                    filters,
                },
            )
            .await?;
        Ok(reports.into_iter().map(|r| (r.address, r)).collect())
    }

    pub async fn scan_stop(&self) -> Result<(), TransportError> {
        self.roundtrip(tag::SCAN_STOP, &()).await
    }

    pub async fn connect(
        &self,
        address: Address,
        params: ConnectionParameters,
    ) -> Result<ConnectionHandle, TransportError> {
        self.roundtrip(tag::CONNECT, &(address, params)).await
    }

    pub async fn disconnect(&self, handle: ConnectionHandle) -> Result<(), TransportError> {
        self.roundtrip(tag::DISCONNECT, &handle).await
    }

    pub async fn discover_services(
        &self,
        handle: ConnectionHandle,
    ) -> Result<Vec<Service>, TransportError> {
        self.roundtrip(tag::DISCOVER_SERVICES, &handle).await
    }

    pub async fn pair(
        &self,
        handle: ConnectionHandle,
        io_caps: u8,
        auth_req: u8,
    ) -> Result<(), TransportError> {
        self.roundtrip(
            tag::PAIR,
            &PairArgs {
                handle,
                io_caps,
                auth_req,
            },
        )
        .await
    }

    pub async fn delete_bond(&self, address: Address) -> Result<(), TransportError> {
        self.roundtrip(tag::DELETE_BOND, &address).await
    }

    pub async fn update_connection_parameters(
        &self,
        handle: ConnectionHandle,
        params: ConnectionParameters,
    ) -> Result<(), TransportError> {
        self.roundtrip(tag::UPDATE_CONN_PARAMS, &(handle, params))
            .await
    }

    pub async fn get_security_parameters(
        &self,
        handle: ConnectionHandle,
    ) -> Result<SecurityParameters, TransportError> {
        self.roundtrip(tag::GET_SECURITY_PARAMS, &handle).await
    }

    pub async fn write_char(
        &self,
        handle: ConnectionHandle,
        characteristic: u16,
        op: WriteOp,
        data: Vec<u8>,
    ) -> Result<(), TransportError> {
        self.roundtrip(
            tag::WRITE_CHAR,
            &WriteCharArgs {
                handle,
                characteristic,
                op,
                data,
            },
        )
        .await
    }

    pub async fn read_char(
        &self,
        handle: ConnectionHandle,
        characteristic: u16,
        op: ReadOp,
    ) -> Result<Vec<u8>, TransportError> {
        self.roundtrip(
            tag::READ_CHAR,
            &ReadCharArgs {
                handle,
                characteristic,
                op,
            },
        )
        .await
    }

    pub async fn read_descriptor(
        &self,
        handle: ConnectionHandle,
        descriptor: u16,
        op: ReadOp,
    ) -> Result<Vec<u8>, TransportError> {
        self.roundtrip(
            tag::READ_DESCRIPTOR,
            &ReadCharArgs {
                handle,
                characteristic: descriptor,
                op,
            },
        )
        .await
    }

    pub async fn set_notification(
        &self,
        handle: ConnectionHandle,
        characteristic: u16,
        enabled: bool,
    ) -> Result<(), TransportError> {
        self.roundtrip(
            tag::SET_NOTIFICATION,
            &SubscribeArgs {
                handle,
                characteristic,
                enabled,
            },
        )
        .await
    }

    pub async fn set_indication(
        &self,
        handle: ConnectionHandle,
        characteristic: u16,
        enabled: bool,
    ) -> Result<(), TransportError> {
        self.roundtrip(
            tag::SET_INDICATION,
            &SubscribeArgs {
                handle,
                characteristic,
                enabled,
            },
        )
        .await
    }

    pub async fn set_connection_parameters_range(
        &self,
        range: (ConnectionParameters, ConnectionParameters),
    ) -> Result<(), TransportError> {
        self.roundtrip(tag::SET_CONN_PARAMS_RANGE, &range).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn addr(last: u8) -> Address {
        Address {
            bytes: [0xDE, 0xAD, 0xBE, 0xEF, 0x00, last],
            kind: AddressType::RandomStatic,
        }
    }

    /// Bus stub answering from a canned tag -> envelope map.
    struct CannedBus {
        responses: Mutex<HashMap<u8, Envelope>>,
        event_tx: broadcast::Sender<BleEvent>,
    }

    impl CannedBus {
        fn new() -> Self {
            let (event_tx, _) = broadcast::channel(16);
            Self {
                responses: Mutex::new(HashMap::new()),
                event_tx,
            }
        }

        fn respond<T: Serialize>(&self, op: u8, value: &T) {
            let envelope = Envelope::new(op | tag::RESPONSE_BIT, value).unwrap();
            self.responses.lock().insert(op, envelope);
        }

        fn respond_error(&self, op: u8, critical: bool) {
            let envelope = Envelope::new(
                tag::ERROR,
                &ErrorArgs {
                    code: 0x0C,
                    detail: "bad handle".into(),
                    critical,
                },
            )
            .unwrap();
            self.responses.lock().insert(op, envelope);
        }
    }

    #[async_trait]
    impl MessageBus for CannedBus {
        async fn request(&self, envelope: Envelope) -> Result<Envelope, TransportError> {
            self.responses
                .lock()
                .get(&envelope.tag)
                .cloned()
                .ok_or_else(|| TransportError::Internal("no canned response".into()))
        }

        fn events(&self) -> broadcast::Receiver<BleEvent> {
            self.event_tx.subscribe()
        }
    }

    #[tokio::test]
    async fn scan_results_keyed_by_address() {
        let bus = CannedBus::new();
        bus.respond(
            tag::SCAN,
            &vec![
                AdvReport {
                    address: addr(1),
                    rssi: -40,
                    data: vec![0x02, 0x01, 0x06],
                },
                AdvReport {
                    address: addr(2),
                    rssi: -70,
                    data: vec![],
                },
            ],
        );
        let adapter = BleAdapter::new(bus);
        let results = adapter
            .scan(Duration::from_secs(5), true, vec![])
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[&addr(1)].rssi, -40);
    }

    #[tokio::test]
    async fn argument_error_vs_critical_error() {
        let bus = CannedBus::new();
        bus.respond_error(tag::DISCONNECT, false);
        bus.respond_error(tag::PAIR, true);
        let adapter = BleAdapter::new(bus);
        assert!(matches!(
            adapter.disconnect(ConnectionHandle(1)).await,
            Err(TransportError::BleArgument(_))
        ));
        assert!(matches!(
            adapter.pair(ConnectionHandle(1), 0x03, 0x01).await,
            Err(TransportError::BleCritical(_))
        ));
    }

    #[tokio::test]
    async fn mismatched_tag_is_internal_error() {
        let bus = CannedBus::new();
        // respond to CONNECT with a SCAN response tag
        bus.responses.lock().insert(
            tag::CONNECT,
            Envelope::new(tag::SCAN | tag::RESPONSE_BIT, &ConnectionHandle(4)).unwrap(),
        );
        let adapter = BleAdapter::new(bus);
        let err = adapter
            .connect(
                addr(1),
                ConnectionParameters {
                    interval_min: 6,
                    interval_max: 12,
                    latency: 0,
                    supervision_timeout: 400,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Internal(_)));
    }

    #[tokio::test]
    async fn events_flow_through_broadcast() {
        let bus = CannedBus::new();
        let tx = bus.event_tx.clone();
        let adapter = BleAdapter::new(bus);
        let mut events = adapter.events();
        tx.send(BleEvent::Notification {
            handle: ConnectionHandle(2),
            characteristic: 0x2A4D,
            data: vec![1, 2],
            timestamp_us: 1000,
        })
        .unwrap();
        let event = events.recv().await.unwrap();
        assert!(matches!(event, BleEvent::Notification { .. }));
    }

    #[test]
    fn envelope_roundtrip() {
        let env = Envelope::new(tag::WRITE_CHAR, &WriteCharArgs {
            handle: ConnectionHandle(7),
            characteristic: 0x1234,
            op: WriteOp::WithoutResponse,
            data: vec![9, 9],
        })
        .unwrap();
        let decoded: WriteCharArgs = env.decode().unwrap();
        assert_eq!(decoded.handle, ConnectionHandle(7));
        assert_eq!(decoded.op, WriteOp::WithoutResponse);
    }
}
