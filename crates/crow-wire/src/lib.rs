//! Wire encoding for Crow's framed RPC protocol: primitives, the
//! attribute and compaction sub-formats, record shapes, and the codec
//! that stitches them into length-prefixed frames (spec §4).

pub mod attrs;
mod codec;
mod compaction;
mod error;
mod frame;
mod primitives;
mod record;
mod value;

pub use codec::{read_record, write_record, RecordDecoder, RecordEncoder, MAX_FRAME_BYTES};
pub use compaction::{AddedKeymap, CompactionContext};
pub use error::{WireError, WireResult};
pub use frame::{read_frame, write_frame};
pub use primitives::{read_date, write_date};
pub use record::{Record, TAG_ACK, TAG_CALL_EXCEPTION, TAG_CALL_RESULT, TAG_DISCOVERY,
    TAG_HEART_BEAT, TAG_INVALID_MESSAGE, TAG_JOIN_REQUEST, TAG_LEASE, TAG_LEASE_EXPIRED,
    TAG_PING, TAG_PROTOCOL_ERROR, TAG_REGISTRATION, TAG_REMOTE_CALL, TAG_SEQUENTIAL_ITEM,
    TAG_SEQUENTIAL_ITEM_END, TAG_SEQUENTIAL_ITEM_START, TAG_SERVICE_FOUND, TAG_SERVICE_NOT_FOUND};
pub use value::Value;
