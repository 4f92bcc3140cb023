//! Record kinds (spec §4.1). Tag values are part of the on-wire contract
//! and must never change once shipped.

use crate::value::Value;
use crow_core::{Attributes, Instant, ServiceEndpoint};

pub const TAG_JOIN_REQUEST: u8 = 11;
pub const TAG_REGISTRATION: u8 = 12;
pub const TAG_HEART_BEAT: u8 = 13;
pub const TAG_LEASE: u8 = 14;
pub const TAG_LEASE_EXPIRED: u8 = 15;
pub const TAG_INVALID_MESSAGE: u8 = 16;
pub const TAG_REMOTE_CALL: u8 = 17;
pub const TAG_CALL_RESULT: u8 = 18;
pub const TAG_PROTOCOL_ERROR: u8 = 19;
pub const TAG_CALL_EXCEPTION: u8 = 20;
pub const TAG_DISCOVERY: u8 = 21;
pub const TAG_SERVICE_FOUND: u8 = 22;
pub const TAG_SERVICE_NOT_FOUND: u8 = 23;
pub const TAG_SEQUENTIAL_ITEM_START: u8 = 24;
pub const TAG_SEQUENTIAL_ITEM: u8 = 25;
pub const TAG_SEQUENTIAL_ITEM_END: u8 = 26;
pub const TAG_PING: u8 = 27;
pub const TAG_ACK: u8 = 28;

#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    JoinRequest {
        address: String,
        port: u16,
        service_id: Option<String>,
        service_name: String,
        attributes: Attributes,
    },
    Registration {
        service_id: String,
        expire_at: Instant,
    },
    HeartBeat {
        service_id: String,
    },
    Lease {
        expire_at: Instant,
    },
    LeaseExpired {
        service_id: String,
    },
    InvalidMessage {
        original: Vec<u8>,
    },
    RemoteCall {
        target_ns: String,
        fn_name: String,
        args: Value,
    },
    CallResult {
        obj: Value,
    },
    ProtocolError {
        code: String,
        message: String,
    },
    CallException {
        kind: String,
        stack_trace: String,
    },
    Discovery {
        service_name: String,
        attributes: Attributes,
    },
    ServiceFound {
        endpoints: Vec<ServiceEndpoint>,
    },
    ServiceNotFound {
        service_name: String,
        attributes: Attributes,
    },
    SequentialItemStart {
        seq_id: u64,
    },
    SequentialItem {
        seq_id: u64,
        obj: Value,
    },
    SequentialItemEnd {
        seq_id: u64,
    },
    Ping,
    Ack,
}

impl Record {
    pub fn tag(&self) -> u8 {
        match self {
            Record::JoinRequest { .. } => TAG_JOIN_REQUEST,
            Record::Registration { .. } => TAG_REGISTRATION,
            Record::HeartBeat { .. } => TAG_HEART_BEAT,
            Record::Lease { .. } => TAG_LEASE,
            Record::LeaseExpired { .. } => TAG_LEASE_EXPIRED,
            Record::InvalidMessage { .. } => TAG_INVALID_MESSAGE,
            Record::RemoteCall { .. } => TAG_REMOTE_CALL,
            Record::CallResult { .. } => TAG_CALL_RESULT,
            Record::ProtocolError { .. } => TAG_PROTOCOL_ERROR,
            Record::CallException { .. } => TAG_CALL_EXCEPTION,
            Record::Discovery { .. } => TAG_DISCOVERY,
            Record::ServiceFound { .. } => TAG_SERVICE_FOUND,
            Record::ServiceNotFound { .. } => TAG_SERVICE_NOT_FOUND,
            Record::SequentialItemStart { .. } => TAG_SEQUENTIAL_ITEM_START,
            Record::SequentialItem { .. } => TAG_SEQUENTIAL_ITEM,
            Record::SequentialItemEnd { .. } => TAG_SEQUENTIAL_ITEM_END,
            Record::Ping => TAG_PING,
            Record::Ack => TAG_ACK,
        }
    }

    /// Records that terminate a reply stream (spec §4.6): the transport
    /// closes or returns the connection to the pool upon seeing one of
    /// these.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Record::CallResult { .. }
                | Record::SequentialItemEnd { .. }
                | Record::CallException { .. }
                | Record::ProtocolError { .. }
                | Record::ServiceFound { .. }
                | Record::ServiceNotFound { .. }
                | Record::Lease { .. }
                | Record::LeaseExpired { .. }
                | Record::Registration { .. }
                | Record::Ack
                | Record::InvalidMessage { .. }
        )
    }
}
