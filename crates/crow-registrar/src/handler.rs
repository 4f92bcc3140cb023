//! Dispatches one decoded request record to the matching `Registrar`
//! operation (spec §4.3). Anything outside the registrar's vocabulary
//! (e.g. a `RemoteCall` sent to the wrong port) becomes `ProtocolError`.

use crate::lease::Registrar;
use crow_wire::Record;

pub fn handle(registrar: &Registrar, request: Record) -> Record {
    match request {
        Record::JoinRequest {
            address,
            port,
            service_id,
            service_name,
            attributes,
        } => registrar.join(address, port, service_id, service_name, attributes),
        Record::HeartBeat { service_id } => registrar.heart_beat(&service_id),
        Record::Discovery {
            service_name,
            attributes,
        } => registrar.discover(service_name, attributes),
        Record::Ping => Record::Ack,
        Record::InvalidMessage { original } => Record::InvalidMessage { original },
        other => Record::ProtocolError {
            code: "unexpected-record".to_string(),
            message: format!("registrar does not accept tag {}", other.tag()),
        },
    }
}
