//! Binary encoding of payloads at the byte boundary.
//!
//! Record format: `[length: 4 bytes][tag: 2 bytes][body: length - 2 bytes]`,
//! all integers little-endian. `length` counts the tag and body.
//!
//! Hit body (20 bytes):
//! `[time: 8][source: 4][string: 2][position: 1][pad: 1][hit type: 2][pad: 2]`
//!
//! Request body:
//! `[uid: 4][type: 4][config: 4][source: 4][first: 8][last: 8]`
//! `[readout uid: 4][readout source: 4][elements: 4][hits: 4][components: 4]`
//! followed by the elements (28 bytes each), the hit bodies, and one full
//! record per component.

use bytes::{Buf, BufMut, Bytes};

use super::{
    ChannelId, Hit, HitType, Payload, PayloadError, ReadoutKind, ReadoutRequest,
    ReadoutRequestElement, ReadoutScope, SourceId, TriggerKey, TriggerRequest,
};
use crate::time::DaqTime;

/// Record tag of a hit.
pub const TAG_HIT: u16 = 1;
/// Record tag of a trigger request.
pub const TAG_REQUEST: u16 = 2;

const RECORD_HEADER_SIZE: usize = 4;
const TAG_SIZE: usize = 2;
const HIT_BODY_SIZE: usize = 20;
const REQUEST_FIXED_SIZE: usize = 4 * 4 + 8 * 2 + 4 * 5;
const ELEMENT_SIZE: usize = 28;
const MIN_COMPONENT_SIZE: usize = RECORD_HEADER_SIZE + TAG_SIZE + REQUEST_FIXED_SIZE;

/// Deepest component nesting a decoded request may carry.
pub const MAX_NESTING: usize = 8;

const SCOPE_ALL: u8 = 0;
const SCOPE_STRING: u8 = 1;
const SCOPE_MODULE: u8 = 2;

/// Number of bytes [`encode_payload`] writes for `payload`.
#[must_use]
pub fn encoded_len(payload: &Payload) -> usize {
    match payload {
        Payload::Hit(_) => RECORD_HEADER_SIZE + TAG_SIZE + HIT_BODY_SIZE,
        Payload::Request(req) => request_record_len(req),
    }
}

fn request_record_len(req: &TriggerRequest) -> usize {
    RECORD_HEADER_SIZE
        + TAG_SIZE
        + REQUEST_FIXED_SIZE
        + req.readout().len() * ELEMENT_SIZE
        + req.hits().len() * HIT_BODY_SIZE
        + req
            .components()
            .iter()
            .map(request_record_len)
            .sum::<usize>()
}

/// Appends one record to `buf`.
pub fn encode_payload(payload: &Payload, buf: &mut impl BufMut) {
    match payload {
        Payload::Hit(hit) => encode_hit(hit, buf),
        Payload::Request(req) => encode_request(req, buf),
    }
}

/// Appends a hit record.
#[allow(clippy::cast_possible_truncation)] // fixed-size record
pub fn encode_hit(hit: &Hit, buf: &mut impl BufMut) {
    buf.put_u32_le((TAG_SIZE + HIT_BODY_SIZE) as u32);
    buf.put_u16_le(TAG_HIT);
    put_hit_body(hit, buf);
}

/// Appends a trigger request record, components included.
#[allow(clippy::cast_possible_truncation)] // request records are far below u32::MAX
pub fn encode_request(req: &TriggerRequest, buf: &mut impl BufMut) {
    let len = request_record_len(req) - RECORD_HEADER_SIZE;
    buf.put_u32_le(len as u32);
    buf.put_u16_le(TAG_REQUEST);

    buf.put_u32_le(req.uid());
    buf.put_i32_le(req.trigger_type());
    buf.put_i32_le(req.config_id());
    buf.put_u32_le(req.source().0);
    buf.put_i64_le(req.first_time().ticks());
    buf.put_i64_le(req.last_time().ticks());

    let readout = req.readout();
    buf.put_u32_le(readout.uid());
    buf.put_u32_le(readout.source().0);
    buf.put_u32_le(readout.len() as u32);
    buf.put_u32_le(req.hits().len() as u32);
    buf.put_u32_le(req.components().len() as u32);

    for element in readout.elements() {
        put_element(element, buf);
    }
    for hit in req.hits() {
        put_hit_body(hit, buf);
    }
    for component in req.components() {
        encode_request(component, buf);
    }
}

fn put_hit_body(hit: &Hit, buf: &mut impl BufMut) {
    buf.put_i64_le(hit.time.ticks());
    buf.put_u32_le(hit.source.0);
    buf.put_u16_le(hit.channel.string);
    buf.put_u8(hit.channel.position);
    buf.put_u8(0);
    buf.put_u16_le(hit.kind.code());
    buf.put_u16_le(0);
}

fn put_element(element: &ReadoutRequestElement, buf: &mut impl BufMut) {
    let (scope, string, position) = match element.scope {
        ReadoutScope::All => (SCOPE_ALL, 0, 0),
        ReadoutScope::String(string) => (SCOPE_STRING, string, 0),
        ReadoutScope::Module(channel) => (SCOPE_MODULE, channel.string, channel.position),
    };
    buf.put_u16_le(element.kind.code());
    buf.put_u8(scope);
    buf.put_u8(position);
    buf.put_u32_le(element.source.0);
    buf.put_i64_le(element.first.ticks());
    buf.put_i64_le(element.last.ticks());
    buf.put_u16_le(string);
    buf.put_u16_le(0);
}

/// Decodes one record from the front of `buf`.
///
/// # Errors
///
/// Returns [`PayloadError::Truncated`] if `buf` holds less than a full
/// record, [`PayloadError::UnknownTag`] for an unknown record type, or an
/// error from building the request.
pub fn decode_payload(buf: &mut impl Buf) -> Result<Payload, PayloadError> {
    let mut record = take_record(buf)?;
    let tag = record.get_u16_le();
    match tag {
        TAG_HIT => {
            ensure(record.remaining(), HIT_BODY_SIZE)?;
            Ok(Payload::Hit(get_hit_body(&mut record)))
        }
        TAG_REQUEST => decode_request_body(&mut record, 0).map(Payload::Request),
        other => Err(PayloadError::UnknownTag(other)),
    }
}

/// Decodes every record in `buf`.
///
/// # Errors
///
/// Returns the first decode error.
pub fn decode_all(mut buf: impl Buf) -> Result<Vec<Payload>, PayloadError> {
    let mut out = Vec::new();
    while buf.has_remaining() {
        out.push(decode_payload(&mut buf)?);
    }
    Ok(out)
}

fn take_record(buf: &mut impl Buf) -> Result<Bytes, PayloadError> {
    ensure(buf.remaining(), RECORD_HEADER_SIZE)?;
    let len = buf.get_u32_le() as usize;
    ensure(buf.remaining(), len)?;
    let record = buf.copy_to_bytes(len);
    ensure(record.remaining(), TAG_SIZE)?;
    Ok(record)
}

fn decode_request_body(record: &mut Bytes, depth: usize) -> Result<TriggerRequest, PayloadError> {
    if depth > MAX_NESTING {
        return Err(PayloadError::TooDeep { limit: MAX_NESTING });
    }
    ensure(record.remaining(), REQUEST_FIXED_SIZE)?;
    let uid = record.get_u32_le();
    let trigger_type = record.get_i32_le();
    let config_id = record.get_i32_le();
    let source = SourceId(record.get_u32_le());
    let first = DaqTime::new(record.get_i64_le());
    let last = DaqTime::new(record.get_i64_le());
    let readout_uid = record.get_u32_le();
    let readout_source = SourceId(record.get_u32_le());
    let n_elements = record.get_u32_le() as usize;
    let n_hits = record.get_u32_le() as usize;
    let n_components = record.get_u32_le() as usize;

    ensure(
        record.remaining(),
        n_elements
            .saturating_mul(ELEMENT_SIZE)
            .saturating_add(n_hits.saturating_mul(HIT_BODY_SIZE))
            .saturating_add(n_components.saturating_mul(MIN_COMPONENT_SIZE)),
    )?;

    let mut readout = ReadoutRequest::new(readout_uid, readout_source);
    for _ in 0..n_elements {
        readout.push(get_element(record)?);
    }
    let hits = (0..n_hits).map(|_| get_hit_body(record)).collect();
    let mut components = Vec::with_capacity(n_components);
    for _ in 0..n_components {
        let mut nested = take_record(record)?;
        match nested.get_u16_le() {
            TAG_REQUEST => components.push(decode_request_body(&mut nested, depth + 1)?),
            other => return Err(PayloadError::UnknownTag(other)),
        }
    }

    if uid == super::FLUSH_UID && first.is_flush() {
        return Ok(TriggerRequest::flush_sentinel());
    }

    TriggerRequest::builder(uid, TriggerKey::new(trigger_type, config_id, source))
        .span(first, last)
        .readout(readout)
        .hits(hits)
        .components(components)
        .build()
}

fn get_hit_body(buf: &mut impl Buf) -> Hit {
    let time = DaqTime::new(buf.get_i64_le());
    let source = SourceId(buf.get_u32_le());
    let string = buf.get_u16_le();
    let position = buf.get_u8();
    buf.advance(1);
    let kind = HitType::from_code(buf.get_u16_le());
    buf.advance(2);
    Hit::new(time, ChannelId::new(string, position), source, kind)
}

fn get_element(buf: &mut impl Buf) -> Result<ReadoutRequestElement, PayloadError> {
    let kind = ReadoutKind::from_code(buf.get_u16_le())?;
    let scope_tag = buf.get_u8();
    let position = buf.get_u8();
    let source = SourceId(buf.get_u32_le());
    let first = DaqTime::new(buf.get_i64_le());
    let last = DaqTime::new(buf.get_i64_le());
    let string = buf.get_u16_le();
    buf.advance(2);
    let scope = match scope_tag {
        SCOPE_STRING => ReadoutScope::String(string),
        SCOPE_MODULE => ReadoutScope::Module(ChannelId::new(string, position)),
        _ => ReadoutScope::All,
    };
    Ok(ReadoutRequestElement {
        kind,
        source,
        first,
        last,
        scope,
    })
}

fn ensure(available: usize, needed: usize) -> Result<(), PayloadError> {
    if available < needed {
        return Err(PayloadError::Truncated { needed, available });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    fn sample_request() -> TriggerRequest {
        let mut readout = ReadoutRequest::new(11, SourceId::IN_ICE_TRIGGER);
        readout.push(ReadoutRequestElement {
            kind: ReadoutKind::InIceModule,
            source: SourceId::string_hub(21),
            first: DaqTime::new(90),
            last: DaqTime::new(260),
            scope: ReadoutScope::Module(ChannelId::new(21, 30)),
        });
        let inner = TriggerRequest::builder(4, TriggerKey::new(2, 7, SourceId::ICETOP_TRIGGER))
            .span(DaqTime::new(95), DaqTime::new(120))
            .build()
            .unwrap();
        TriggerRequest::builder(11, TriggerKey::new(0, 1006, SourceId::IN_ICE_TRIGGER))
            .span(DaqTime::new(100), DaqTime::new(250))
            .readout(readout)
            .hits(vec![
                Hit::spe(DaqTime::new(100), ChannelId::new(21, 30)),
                Hit::new(
                    DaqTime::new(250),
                    ChannelId::new(21, 62),
                    SourceId::icetop_hub(21),
                    HitType::Mpe,
                ),
            ])
            .components(vec![inner])
            .build()
            .unwrap()
    }

    #[test]
    fn test_request_survives_encoding() {
        let req = Payload::Request(sample_request());
        let mut buf = BytesMut::new();
        encode_payload(&req, &mut buf);
        assert_eq!(buf.len(), encoded_len(&req));

        let decoded = decode_payload(&mut buf.freeze()).unwrap();
        assert_eq!(decoded, req);
    }

    #[test]
    fn test_stream_of_records() {
        let mut buf = BytesMut::new();
        let hit = Payload::Hit(Hit::spe(DaqTime::new(5), ChannelId::new(1, 1)));
        encode_payload(&hit, &mut buf);
        encode_payload(&Payload::Request(TriggerRequest::flush_sentinel()), &mut buf);

        let decoded = decode_all(buf.freeze()).unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0], hit);
        assert!(decoded[1].as_request().is_some_and(TriggerRequest::is_flush));
    }

    #[test]
    fn test_truncated_record() {
        let mut buf = BytesMut::new();
        encode_request(&sample_request(), &mut buf);
        let cut = buf.len() - 3;
        let mut short = buf.freeze().slice(..cut);
        assert!(matches!(
            decode_payload(&mut short),
            Err(PayloadError::Truncated { .. })
        ));
    }

    #[test]
    fn test_component_count_beyond_record_is_truncated() {
        let plain = TriggerRequest::builder(3, TriggerKey::new(0, 1, SourceId::IN_ICE_TRIGGER))
            .span(DaqTime::new(10), DaqTime::new(20))
            .build()
            .unwrap();
        let mut buf = BytesMut::new();
        encode_request(&plain, &mut buf);
        // component count is the last fixed field of the request body
        let at = RECORD_HEADER_SIZE + TAG_SIZE + REQUEST_FIXED_SIZE - 4;
        buf[at..at + 4].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(
            decode_payload(&mut buf.freeze()),
            Err(PayloadError::Truncated { available: 0, .. })
        ));
    }

    #[test]
    fn test_nesting_limit() {
        let key = TriggerKey::new(3, 1, SourceId::GLOBAL_TRIGGER);
        let mut req = TriggerRequest::builder(0, key)
            .span(DaqTime::new(10), DaqTime::new(20))
            .build()
            .unwrap();
        for uid in 1..=u32::try_from(MAX_NESTING + 1).unwrap() {
            req = TriggerRequest::builder(uid, key)
                .span(DaqTime::new(10), DaqTime::new(20))
                .components(vec![req])
                .build()
                .unwrap();
        }
        let mut buf = BytesMut::new();
        encode_request(&req, &mut buf);
        assert_eq!(
            decode_payload(&mut buf.freeze()),
            Err(PayloadError::TooDeep { limit: MAX_NESTING })
        );
    }

    #[test]
    fn test_unknown_tag() {
        let mut buf = BytesMut::new();
        buf.put_u32_le(2);
        buf.put_u16_le(99);
        assert_eq!(
            decode_payload(&mut buf.freeze()),
            Err(PayloadError::UnknownTag(99))
        );
    }
}
