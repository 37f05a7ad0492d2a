//! Fixed-width binary encoding for everything that crosses the process boundary.
//!
//! All integers are little-endian. Field order is part of the contract and
//! must not change between versions:
//!
//! ```text
//! ClusterConfig           u32 interval | u32 kind | u32 width | u32 height | u32 depth | Bundle
//! ActivityPlacementState  i32 unobscured | i32 left | i32 top | i32 right | i32 bottom
//! NavigationEvent         i32 type | Bundle
//! Bundle                  i32 count | (String key | i32 tag | value)*
//! Call                    i32 version | i32 code | body
//! Reply                   i32 version | i32 code | body
//! ```

use bytes::Bytes;

use crate::bundle::{Bundle, BundleValue};
use crate::config::{ClusterConfig, ClusterKind};
use crate::event::NavigationEvent;
use crate::placement::{ActivityPlacementState, Rect};
use crate::rpc::{Call, FailureCode, Reply};

pub const PROTOCOL_VERSION: i32 = 1;

const CALL_GET_CLUSTER_INFO: i32 = 1;
const CALL_SEND_EVENT: i32 = 2;
const CALL_SET_ACTIVITY_STATE: i32 = 3;

const REPLY_CLUSTER_INFO: i32 = 1;
const REPLY_ACK: i32 = 2;
const REPLY_FAILURE: i32 = 3;

const VAL_NULL: i32 = -1;
const VAL_STRING: i32 = 0;
const VAL_INT: i32 = 1;
const VAL_LONG: i32 = 6;
const VAL_DOUBLE: i32 = 8;
const VAL_BOOL: i32 = 9;
const VAL_BYTES: i32 = 13;

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum WireError {
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(i32),
    #[error("unknown call code: {0}")]
    UnknownCall(i32),
    #[error("unknown reply code: {0}")]
    UnknownReply(i32),
    #[error("unknown failure code: {0}")]
    UnknownFailure(i32),
    #[error("unknown cluster kind: {0}")]
    UnknownClusterKind(u32),
    #[error("unknown bundle value tag: {0}")]
    UnknownValueTag(i32),
    #[error("invalid length: {0}")]
    InvalidLength(i32),
    #[error("string is not valid utf-8")]
    InvalidUtf8,
    #[error("unexpected end of input")]
    UnexpectedEof,
    #[error("{0} trailing bytes after message")]
    TrailingBytes(usize),
    #[error("invalid data: {0}")]
    InvalidData(&'static str),
}

pub fn encode_cluster_config(config: &ClusterConfig) -> Vec<u8> {
    let mut buf = Vec::with_capacity(32);
    write_cluster_config(&mut buf, config);
    buf
}

pub fn decode_cluster_config(bytes: &[u8]) -> Result<ClusterConfig, WireError> {
    let mut cursor = Cursor::new(bytes);
    let config = read_cluster_config(&mut cursor)?;
    cursor.finish()?;
    Ok(config)
}

pub fn encode_placement_state(state: &ActivityPlacementState) -> Vec<u8> {
    let mut buf = Vec::with_capacity(20);
    write_placement_state(&mut buf, state);
    buf
}

pub fn decode_placement_state(bytes: &[u8]) -> Result<ActivityPlacementState, WireError> {
    let mut cursor = Cursor::new(bytes);
    let state = read_placement_state(&mut cursor)?;
    cursor.finish()?;
    Ok(state)
}

pub fn encode_navigation_event(event: &NavigationEvent) -> Vec<u8> {
    let mut buf = Vec::with_capacity(32);
    write_navigation_event(&mut buf, event);
    buf
}

pub fn decode_navigation_event(bytes: &[u8]) -> Result<NavigationEvent, WireError> {
    let mut cursor = Cursor::new(bytes);
    let event = read_navigation_event(&mut cursor)?;
    cursor.finish()?;
    Ok(event)
}

pub fn encode_call(call: &Call) -> Vec<u8> {
    let mut buf = Vec::with_capacity(48);
    write_i32(&mut buf, PROTOCOL_VERSION);
    match call {
        Call::GetClusterInfo => {
            write_i32(&mut buf, CALL_GET_CLUSTER_INFO);
        }
        Call::SendEvent(event) => {
            write_i32(&mut buf, CALL_SEND_EVENT);
            write_navigation_event(&mut buf, event);
        }
        Call::SetActivityState { category, state } => {
            write_i32(&mut buf, CALL_SET_ACTIVITY_STATE);
            write_string(&mut buf, category);
            write_placement_state(&mut buf, state);
        }
    }
    buf
}

pub fn decode_call(bytes: &[u8]) -> Result<Call, WireError> {
    let mut cursor = Cursor::new(bytes);
    read_version(&mut cursor)?;
    let call = match cursor.read_i32()? {
        CALL_GET_CLUSTER_INFO => Call::GetClusterInfo,
        CALL_SEND_EVENT => Call::SendEvent(read_navigation_event(&mut cursor)?),
        CALL_SET_ACTIVITY_STATE => {
            let category = cursor.read_string()?;
            let state = read_placement_state(&mut cursor)?;
            Call::SetActivityState { category, state }
        }
        other => return Err(WireError::UnknownCall(other)),
    };
    cursor.finish()?;
    Ok(call)
}

pub fn encode_reply(reply: &Reply) -> Vec<u8> {
    let mut buf = Vec::with_capacity(40);
    write_i32(&mut buf, PROTOCOL_VERSION);
    match reply {
        Reply::ClusterInfo(config) => {
            write_i32(&mut buf, REPLY_CLUSTER_INFO);
            write_cluster_config(&mut buf, config);
        }
        Reply::Ack => {
            write_i32(&mut buf, REPLY_ACK);
        }
        Reply::Failure(code) => {
            write_i32(&mut buf, REPLY_FAILURE);
            write_i32(&mut buf, code.code());
        }
    }
    buf
}

pub fn decode_reply(bytes: &[u8]) -> Result<Reply, WireError> {
    let mut cursor = Cursor::new(bytes);
    read_version(&mut cursor)?;
    let reply = match cursor.read_i32()? {
        REPLY_CLUSTER_INFO => Reply::ClusterInfo(read_cluster_config(&mut cursor)?),
        REPLY_ACK => Reply::Ack,
        REPLY_FAILURE => {
            let code = cursor.read_i32()?;
            Reply::Failure(FailureCode::from_code(code).ok_or(WireError::UnknownFailure(code))?)
        }
        other => return Err(WireError::UnknownReply(other)),
    };
    cursor.finish()?;
    Ok(reply)
}

fn read_version(cursor: &mut Cursor<'_>) -> Result<(), WireError> {
    let version = cursor.read_i32()?;
    if version != PROTOCOL_VERSION {
        return Err(WireError::UnsupportedVersion(version));
    }
    Ok(())
}

fn write_cluster_config(buf: &mut Vec<u8>, config: &ClusterConfig) {
    write_u32(buf, config.min_interval_millis());
    write_u32(buf, config.kind().code());
    write_u32(buf, config.image_width());
    write_u32(buf, config.image_height());
    write_u32(buf, config.image_color_depth_bits());
    write_bundle(buf, config.extra());
}

fn read_cluster_config(cursor: &mut Cursor<'_>) -> Result<ClusterConfig, WireError> {
    let min_interval_millis = cursor.read_u32()?;
    let kind_code = cursor.read_u32()?;
    let kind = ClusterKind::from_code(kind_code).ok_or(WireError::UnknownClusterKind(kind_code))?;
    let image_width = cursor.read_u32()?;
    let image_height = cursor.read_u32()?;
    let image_color_depth_bits = cursor.read_u32()?;
    let extra = read_bundle(cursor)?;
    ClusterConfig::from_parts(
        min_interval_millis,
        kind,
        image_width,
        image_height,
        image_color_depth_bits,
        extra,
    )
    .map_err(WireError::InvalidData)
}

fn write_placement_state(buf: &mut Vec<u8>, state: &ActivityPlacementState) {
    let area = state.visible_area();
    write_i32(buf, state.is_unobscured() as i32);
    write_i32(buf, area.left());
    write_i32(buf, area.top());
    write_i32(buf, area.right());
    write_i32(buf, area.bottom());
}

fn read_placement_state(cursor: &mut Cursor<'_>) -> Result<ActivityPlacementState, WireError> {
    let unobscured = match cursor.read_i32()? {
        0 => false,
        1 => true,
        _ => return Err(WireError::InvalidData("invalid unobscured flag")),
    };
    let left = cursor.read_i32()?;
    let top = cursor.read_i32()?;
    let right = cursor.read_i32()?;
    let bottom = cursor.read_i32()?;
    let area = Rect::new(left, top, right, bottom)
        .map_err(|_| WireError::InvalidData("malformed visible area"))?;
    Ok(ActivityPlacementState::create(unobscured, area))
}

fn write_navigation_event(buf: &mut Vec<u8>, event: &NavigationEvent) {
    write_i32(buf, event.event_type);
    write_bundle(buf, &event.payload);
}

fn read_navigation_event(cursor: &mut Cursor<'_>) -> Result<NavigationEvent, WireError> {
    let event_type = cursor.read_i32()?;
    let payload = read_bundle(cursor)?;
    Ok(NavigationEvent::new(event_type, payload))
}

fn write_bundle(buf: &mut Vec<u8>, bundle: &Bundle) {
    write_len(buf, bundle.len());
    for (key, value) in bundle.iter() {
        write_string(buf, key);
        match value {
            BundleValue::Null => write_i32(buf, VAL_NULL),
            BundleValue::Bool(value) => {
                write_i32(buf, VAL_BOOL);
                write_i32(buf, *value as i32);
            }
            BundleValue::Int(value) => {
                write_i32(buf, VAL_INT);
                write_i32(buf, *value);
            }
            BundleValue::Long(value) => {
                write_i32(buf, VAL_LONG);
                buf.extend_from_slice(&value.to_le_bytes());
            }
            BundleValue::Double(value) => {
                write_i32(buf, VAL_DOUBLE);
                buf.extend_from_slice(&value.to_bits().to_le_bytes());
            }
            BundleValue::String(value) => {
                write_i32(buf, VAL_STRING);
                write_string(buf, value);
            }
            BundleValue::Bytes(value) => {
                write_i32(buf, VAL_BYTES);
                write_len(buf, value.len());
                buf.extend_from_slice(value);
            }
        }
    }
}

fn read_bundle(cursor: &mut Cursor<'_>) -> Result<Bundle, WireError> {
    let count = cursor.read_len()?;
    let mut bundle = Bundle::new();
    for _ in 0..count {
        let key = cursor.read_string()?;
        let value = match cursor.read_i32()? {
            VAL_NULL => BundleValue::Null,
            VAL_BOOL => match cursor.read_i32()? {
                0 => BundleValue::Bool(false),
                1 => BundleValue::Bool(true),
                _ => return Err(WireError::InvalidData("invalid boolean")),
            },
            VAL_INT => BundleValue::Int(cursor.read_i32()?),
            VAL_LONG => BundleValue::Long(cursor.read_i64()?),
            VAL_DOUBLE => BundleValue::Double(f64::from_bits(cursor.read_i64()? as u64)),
            VAL_STRING => BundleValue::String(cursor.read_string()?),
            VAL_BYTES => {
                let len = cursor.read_len()?;
                BundleValue::Bytes(Bytes::copy_from_slice(cursor.read_bytes(len)?))
            }
            other => return Err(WireError::UnknownValueTag(other)),
        };
        if bundle.insert(key, value).is_some() {
            return Err(WireError::InvalidData("duplicate bundle key"));
        }
    }
    Ok(bundle)
}

fn write_i32(buf: &mut Vec<u8>, value: i32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn write_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn write_len(buf: &mut Vec<u8>, len: usize) {
    write_i32(buf, i32::try_from(len).unwrap_or(i32::MAX));
}

fn write_string(buf: &mut Vec<u8>, value: &str) {
    write_len(buf, value.len());
    buf.extend_from_slice(value.as_bytes());
}

#[derive(Clone, Copy)]
struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], WireError> {
        let slice = self.read_bytes(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    fn read_i32(&mut self) -> Result<i32, WireError> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    fn read_u32(&mut self) -> Result<u32, WireError> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    fn read_i64(&mut self) -> Result<i64, WireError> {
        Ok(i64::from_le_bytes(self.read_array()?))
    }

    fn read_len(&mut self) -> Result<usize, WireError> {
        let len = self.read_i32()?;
        usize::try_from(len).map_err(|_| WireError::InvalidLength(len))
    }

    fn read_string(&mut self) -> Result<String, WireError> {
        let len = self.read_len()?;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| WireError::InvalidUtf8)
    }

    fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], WireError> {
        if len > self.remaining() {
            return Err(WireError::UnexpectedEof);
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.pos)
    }

    fn finish(&self) -> Result<(), WireError> {
        match self.remaining() {
            0 => Ok(()),
            extra => Err(WireError::TrailingBytes(extra)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn area(left: i32, top: i32, right: i32, bottom: i32) -> Rect {
        Rect::new(left, top, right, bottom).expect("rect")
    }

    #[test_timeout::timeout]
    fn enum_only_cluster_survives_the_wire() {
        let config = ClusterConfig::enum_only(1000);
        let decoded = decode_cluster_config(&encode_cluster_config(&config)).expect("decode");
        assert_eq!(decoded.min_interval_millis(), 1000);
        assert_eq!(decoded.kind(), ClusterKind::EnumOnly);
        assert!(!decoded.supports_custom_images());
        assert_eq!(decoded, config);
    }

    #[test_timeout::timeout]
    fn cluster_config_field_order_is_fixed() {
        let config = ClusterConfig::image_capable(500, 800, 480, 16).expect("config");
        let encoded = encode_cluster_config(&config);
        let mut expected = Vec::new();
        for word in [500u32, 1, 800, 480, 16, 0] {
            expected.extend_from_slice(&word.to_le_bytes());
        }
        assert_eq!(encoded, expected);
    }

    #[test_timeout::timeout]
    fn unknown_cluster_kind_is_rejected() {
        let mut encoded = encode_cluster_config(&ClusterConfig::enum_only(1000));
        encoded[4..8].copy_from_slice(&7u32.to_le_bytes());
        assert_eq!(
            decode_cluster_config(&encoded),
            Err(WireError::UnknownClusterKind(7))
        );
    }

    #[test_timeout::timeout]
    fn enum_only_with_image_geometry_is_rejected() {
        let mut encoded = encode_cluster_config(&ClusterConfig::enum_only(1000));
        encoded[8..12].copy_from_slice(&800u32.to_le_bytes());
        assert!(matches!(
            decode_cluster_config(&encoded),
            Err(WireError::InvalidData(_))
        ));
    }

    #[test_timeout::timeout]
    fn placement_state_is_five_integers() {
        let state = ActivityPlacementState::create(true, area(0, 10, 640, 480));
        let encoded = encode_placement_state(&state);
        assert_eq!(encoded.len(), 20);
        assert_eq!(decode_placement_state(&encoded), Ok(state));
    }

    #[test_timeout::timeout]
    fn placement_state_rejects_inverted_area() {
        let mut encoded = encode_placement_state(&ActivityPlacementState::create(
            false,
            area(0, 0, 10, 10),
        ));
        encoded[4..8].copy_from_slice(&50i32.to_le_bytes());
        assert!(decode_placement_state(&encoded).is_err());
    }

    #[test_timeout::timeout]
    fn placement_state_rejects_unknown_flag() {
        let mut encoded = encode_placement_state(&ActivityPlacementState::create(
            true,
            area(0, 0, 10, 10),
        ));
        encoded[0..4].copy_from_slice(&2i32.to_le_bytes());
        assert_eq!(
            decode_placement_state(&encoded),
            Err(WireError::InvalidData("invalid unobscured flag"))
        );
    }

    #[test_timeout::timeout]
    fn negative_bundle_count_is_rejected() {
        let mut encoded = encode_navigation_event(&NavigationEvent::new(1, Bundle::new()));
        encoded[4..8].copy_from_slice(&(-1i32).to_le_bytes());
        assert_eq!(
            decode_navigation_event(&encoded),
            Err(WireError::InvalidLength(-1))
        );
    }

    #[test_timeout::timeout]
    fn duplicate_bundle_keys_are_rejected() {
        let mut encoded = encode_navigation_event(&NavigationEvent::new(1, Bundle::new().with("k", 5)));
        let entry = encoded[8..].to_vec();
        encoded[4..8].copy_from_slice(&2i32.to_le_bytes());
        encoded.extend_from_slice(&entry);
        assert_eq!(
            decode_navigation_event(&encoded),
            Err(WireError::InvalidData("duplicate bundle key"))
        );
    }

    #[test_timeout::timeout]
    fn unknown_failure_code_is_rejected() {
        let mut encoded = encode_reply(&Reply::Failure(FailureCode::Destroyed));
        encoded[8..12].copy_from_slice(&99i32.to_le_bytes());
        assert_eq!(decode_reply(&encoded), Err(WireError::UnknownFailure(99)));
    }

    #[test_timeout::timeout]
    fn event_payload_keeps_every_value_kind() {
        let payload = Bundle::new()
            .with("nothing", BundleValue::Null)
            .with("flag", true)
            .with("distance", 420)
            .with("eta_ms", 9_000_000_000i64)
            .with("speed", 13.5)
            .with("road", "Ring Road")
            .with("icon", vec![1u8, 2, 3]);
        let event = NavigationEvent::new(3, payload);
        let decoded = decode_navigation_event(&encode_navigation_event(&event)).expect("decode");
        assert_eq!(decoded, event);
    }

    #[test_timeout::timeout]
    fn unknown_value_tag_is_rejected() {
        let event = NavigationEvent::new(1, Bundle::new().with("k", 5));
        let mut encoded = encode_navigation_event(&event);
        // type | count | key len | 'k' | tag
        let tag_at = 4 + 4 + 4 + 1;
        encoded[tag_at..tag_at + 4].copy_from_slice(&42i32.to_le_bytes());
        assert_eq!(
            decode_navigation_event(&encoded),
            Err(WireError::UnknownValueTag(42))
        );
    }

    #[test_timeout::timeout]
    fn truncated_event_reports_eof() {
        let event = NavigationEvent::new(1, Bundle::new().with("road", "M25"));
        let encoded = encode_navigation_event(&event);
        assert_eq!(
            decode_navigation_event(&encoded[..encoded.len() - 1]),
            Err(WireError::UnexpectedEof)
        );
    }

    #[test_timeout::timeout]
    fn calls_round_trip() {
        let calls = [
            Call::GetClusterInfo,
            Call::SendEvent(NavigationEvent::new(2, Bundle::new().with("turn", "left"))),
            Call::SetActivityState {
                category: "navigation".into(),
                state: ActivityPlacementState::create(true, area(0, 0, 800, 480)),
            },
        ];
        for call in calls {
            assert_eq!(decode_call(&encode_call(&call)), Ok(call));
        }
    }

    #[test_timeout::timeout]
    fn failure_reply_round_trips() {
        let reply = Reply::Failure(FailureCode::NotReady);
        assert_eq!(decode_reply(&encode_reply(&reply)), Ok(reply));
    }

    #[test_timeout::timeout]
    fn version_mismatch_is_rejected() {
        let mut encoded = encode_call(&Call::GetClusterInfo);
        encoded[0..4].copy_from_slice(&2i32.to_le_bytes());
        assert_eq!(decode_call(&encoded), Err(WireError::UnsupportedVersion(2)));
    }

    #[test_timeout::timeout]
    fn trailing_bytes_are_rejected() {
        let mut encoded = encode_reply(&Reply::Ack);
        encoded.push(0);
        assert_eq!(decode_reply(&encoded), Err(WireError::TrailingBytes(1)));
    }

    proptest! {
        #[test]
        fn image_capable_configs_round_trip(
            interval in any::<u32>(),
            width in 1u32..=u32::MAX,
            height in 1u32..=u32::MAX,
            depth in prop::sample::select(vec![8u32, 16, 32]),
        ) {
            let config = ClusterConfig::image_capable(interval, width, height, depth)
                .expect("valid config");
            let decoded = decode_cluster_config(&encode_cluster_config(&config))
                .expect("decode");
            prop_assert_eq!(decoded, config);
        }
    }
}
