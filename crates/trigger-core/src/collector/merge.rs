//! Folding overlapping released requests into merged requests.

use smallvec::SmallVec;

use crate::algorithm::RequestIdGenerator;
use crate::payload::{
    PayloadError, ReadoutRequest, SourceId, TriggerKey, TriggerRequest, MERGED_TRIGGER_TYPE,
};

/// Config id stamped on merged requests.
pub const MERGED_CONFIG_ID: i32 = -1;

/// Folds overlapping requests of a first-time-ordered batch.
///
/// Each maximal run of mutually reachable overlaps becomes one request of
/// type [`MERGED_TRIGGER_TYPE`] spanning the run, carrying the run as
/// components and the union of their readouts. Requests overlapping nothing
/// pass through unchanged. Returns the folded batch and the number of merged
/// requests built.
///
/// # Errors
///
/// Returns [`PayloadError`] if a merged request cannot be built.
pub fn merge_overlapping(
    batch: Vec<TriggerRequest>,
    ids: &mut RequestIdGenerator,
    source: SourceId,
) -> Result<(Vec<TriggerRequest>, usize), PayloadError> {
    let mut out = Vec::with_capacity(batch.len());
    let mut group: SmallVec<[TriggerRequest; 4]> = SmallVec::new();
    let mut merged = 0;

    for request in batch {
        let joins = group
            .iter()
            .map(TriggerRequest::last_time)
            .max()
            .is_some_and(|last| request.first_time() <= last);
        if !joins && !group.is_empty() {
            merged += flush_group(&mut group, &mut out, ids, source)?;
        }
        group.push(request);
    }
    merged += flush_group(&mut group, &mut out, ids, source)?;
    Ok((out, merged))
}

fn flush_group(
    group: &mut SmallVec<[TriggerRequest; 4]>,
    out: &mut Vec<TriggerRequest>,
    ids: &mut RequestIdGenerator,
    source: SourceId,
) -> Result<usize, PayloadError> {
    if group.len() <= 1 {
        out.extend(group.drain(..));
        return Ok(0);
    }
    let components: Vec<TriggerRequest> = group.drain(..).collect();
    let first = components
        .iter()
        .map(TriggerRequest::first_time)
        .min()
        .unwrap_or_default();
    let last = components
        .iter()
        .map(TriggerRequest::last_time)
        .max()
        .unwrap_or_default();
    let uid = ids.next_uid();
    let mut readout = ReadoutRequest::new(uid, source);
    for component in &components {
        readout.extend_from(component.readout());
    }
    let request = TriggerRequest::builder(
        uid,
        TriggerKey::new(MERGED_TRIGGER_TYPE, MERGED_CONFIG_ID, source),
    )
    .span(first, last)
    .readout(readout)
    .components(components)
    .build()?;
    out.push(request);
    Ok(1)
}
