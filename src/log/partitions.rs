/// Key layout and encoding utilities for Fjall partitions
///
/// Partition structure:
/// - `records`: rec:{seq:016} -> Record (JSON), append order
/// - `index`: idx:{msg_id} -> seq (u64 BE)
/// - `tangles`: tangle:{len}:{tangle_id}:{depth:016}:{msg_id} -> seq (u64 BE)
/// - `ghosts`: ghost:{len}:{tangle_id}:{depth:016}:{msg_id} -> span (u32 BE)
///
/// Tangle ids are prefixed with their byte length so that a tangle prefix
/// never matches a longer id that happens to start with it.
/// - `metadata`: meta:{key} -> value (JSON)
use super::{MsgId, TangleId};

/// Encode a record key: rec:{seq:016}
pub fn encode_record_key(seq: u64) -> Vec<u8> {
    format!("rec:{:016}", seq).into_bytes()
}

/// Encode an id index key: idx:{msg_id}
pub fn encode_index_key(id: &MsgId) -> Vec<u8> {
    format!("idx:{}", id).into_bytes()
}

fn scoped_prefix(kind: &str, tangle: &TangleId) -> String {
    format!("{}:{}:{}:", kind, tangle.as_str().len(), tangle)
}

/// Encode a tangle membership key: tangle:{len}:{tangle_id}:{depth:016}:{msg_id}
pub fn encode_tangle_key(tangle: &TangleId, depth: u64, id: &MsgId) -> Vec<u8> {
    format!("{}{:016}:{}", scoped_prefix("tangle", tangle), depth, id).into_bytes()
}

/// Encode a tangle prefix for range scan: tangle:{len}:{tangle_id}:
pub fn encode_tangle_prefix(tangle: &TangleId) -> Vec<u8> {
    scoped_prefix("tangle", tangle).into_bytes()
}

/// Encode a ghost key: ghost:{len}:{tangle_id}:{depth:016}:{msg_id}
pub fn encode_ghost_key(tangle: &TangleId, depth: u64, id: &MsgId) -> Vec<u8> {
    format!("{}{:016}:{}", scoped_prefix("ghost", tangle), depth, id).into_bytes()
}

/// Encode a ghost prefix for range scan: ghost:{len}:{tangle_id}:
pub fn encode_ghost_prefix(tangle: &TangleId) -> Vec<u8> {
    scoped_prefix("ghost", tangle).into_bytes()
}

/// Decode a ghost key of a known tangle -> (depth, msg_id)
///
/// Ids may contain `:`, so decoding goes by the fixed-width depth field.
pub fn decode_ghost_key(tangle: &TangleId, key: &[u8]) -> Option<(u64, MsgId)> {
    let key_str = std::str::from_utf8(key).ok()?;
    let rest = key_str.strip_prefix(&scoped_prefix("ghost", tangle))?;
    let depth = rest.get(..16)?.parse().ok()?;
    let id = rest.get(16..)?.strip_prefix(':')?;
    Some((depth, MsgId::new(id)))
}

/// Encode a metadata key: meta:{key}
pub fn encode_meta_key(key: &str) -> Vec<u8> {
    format!("meta:{}", key).into_bytes()
}

pub fn encode_seq(seq: u64) -> Vec<u8> {
    seq.to_be_bytes().to_vec()
}

pub fn decode_seq(bytes: &[u8]) -> Option<u64> {
    Some(u64::from_be_bytes(bytes.try_into().ok()?))
}
