// Delta-encoding between two absolute headers on the same channel, and the
// inverse fold used by the frame reader to resolve a relative header back
// into an absolute one.
//
// The four size classes are cumulative: a header can express "nothing
// changed", "only the timestamp changed", "timestamp/datatype/bodyLength
// changed", or "everything changed" -- never an arbitrary subset (there is
// no wire shape for "datatype changed but bodyLength didn't"). `diff_headers`
// picks the narrowest class that covers every field that actually changed.

use crate::header::Header;

/// Computes the relative header that turns `old` into `new` when applied
/// with `apply`.
///
/// Both inputs must be absolute headers on the same channel; violating
/// either is a programmer error in the caller (the channel demuxer always
/// diffs against its own last-sent absolute header), not a condition this
/// function recovers from.
pub fn diff_headers(old: &Header, new: &Header) -> Header {
    assert!(!old.relative, "diff_headers: `old` must be an absolute header");
    assert!(!new.relative, "diff_headers: `new` must be an absolute header");
    assert_eq!(
        old.channel_id, new.channel_id,
        "diff_headers: headers must be on the same channel"
    );

    let old_ts = old.timestamp.unwrap_or(0);
    let new_ts = new.timestamp.unwrap_or(0);

    if old.stream_id != new.stream_id {
        // A stream id change can only be carried by a full, absolute header.
        return Header {
            channel_id: new.channel_id,
            relative: false,
            timestamp: Some(new_ts),
            datatype: new.datatype,
            body_length: new.body_length,
            stream_id: new.stream_id,
        };
    }

    if old.datatype != new.datatype || old.body_length != new.body_length {
        return Header {
            channel_id: new.channel_id,
            relative: true,
            timestamp: Some(new_ts.wrapping_sub(old_ts)),
            datatype: new.datatype,
            body_length: new.body_length,
            stream_id: None,
        };
    }

    if old_ts != new_ts {
        return Header {
            channel_id: new.channel_id,
            relative: true,
            timestamp: Some(new_ts.wrapping_sub(old_ts)),
            datatype: None,
            body_length: None,
            stream_id: None,
        };
    }

    Header::continuation(new.channel_id)
}

/// Folds a (possibly relative) header over the channel's previous absolute
/// header, producing the effective absolute header for the current chunk.
///
/// `old` must itself be absolute -- it is always the last resolved header
/// recorded for this channel, never a still-relative one.
pub fn apply(old: &Header, diff: &Header) -> Header {
    assert!(!old.relative, "apply: `old` must be an absolute header");
    assert_eq!(
        old.channel_id, diff.channel_id,
        "apply: diff must target the same channel as `old`"
    );

    if !diff.relative {
        return diff.clone();
    }

    let old_ts = old.timestamp.unwrap_or(0);
    let timestamp = old_ts.wrapping_add(diff.timestamp.unwrap_or(0));

    Header {
        channel_id: old.channel_id,
        relative: false,
        timestamp: Some(timestamp),
        datatype: diff.datatype.or(old.datatype),
        body_length: diff.body_length.or(old.body_length),
        stream_id: diff.stream_id.or(old.stream_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diff_nothing_changed() {
        let old = Header::absolute(3, 100, 8, 10, 1);
        let new = Header::absolute(3, 100, 8, 10, 1);
        let diff = diff_headers(&old, &new);
        assert!(diff.relative);
        assert_eq!(diff.timestamp, None);
        assert_eq!(diff.datatype, None);
        assert_eq!(diff.body_length, None);
        assert_eq!(diff.stream_id, None);
    }

    #[test]
    fn diff_timestamp_only() {
        let old = Header::absolute(3, 100, 8, 10, 1);
        let new = Header::absolute(3, 150, 8, 10, 1);
        let diff = diff_headers(&old, &new);
        assert!(diff.relative);
        assert_eq!(diff.timestamp, Some(50));
        assert_eq!(diff.datatype, None);
        assert_eq!(diff.body_length, None);
    }

    #[test]
    fn diff_datatype_change_pulls_in_body_length() {
        let old = Header::absolute(3, 100, 8, 10, 1);
        let new = Header::absolute(3, 150, 9, 10, 1);
        let diff = diff_headers(&old, &new);
        assert!(diff.relative);
        assert_eq!(diff.timestamp, Some(50));
        assert_eq!(diff.datatype, Some(9));
        assert_eq!(diff.body_length, Some(10));
        assert_eq!(diff.stream_id, None);
    }

    #[test]
    fn diff_body_length_change() {
        let old = Header::absolute(3, 100, 8, 10, 1);
        let new = Header::absolute(3, 100, 8, 20, 1);
        let diff = diff_headers(&old, &new);
        assert_eq!(diff.timestamp, Some(0));
        assert_eq!(diff.body_length, Some(20));
    }

    #[test]
    fn diff_stream_id_change_forces_absolute() {
        let old = Header::absolute(3, 100, 8, 10, 1);
        let new = Header::absolute(3, 150, 8, 10, 2);
        let diff = diff_headers(&old, &new);
        assert!(!diff.relative);
        assert_eq!(diff.timestamp, Some(150));
        assert_eq!(diff.stream_id, Some(2));
    }

    #[test]
    fn diff_timestamp_wraps_instead_of_going_negative() {
        let old = Header::absolute(3, u32::MAX - 5, 8, 10, 1);
        let new = Header::absolute(3, 10, 8, 10, 1);
        let diff = diff_headers(&old, &new);
        assert_eq!(diff.timestamp, Some(16));
    }

    #[test]
    fn apply_folds_relative_over_absolute() {
        let old = Header::absolute(3, 100, 8, 10, 1);
        let diff = diff_headers(&old, &Header::absolute(3, 150, 9, 20, 1));
        let resolved = apply(&old, &diff);
        assert!(!resolved.relative);
        assert_eq!(resolved.timestamp, Some(150));
        assert_eq!(resolved.datatype, Some(9));
        assert_eq!(resolved.body_length, Some(20));
        assert_eq!(resolved.stream_id, Some(1));
    }

    #[test]
    fn apply_continuation_keeps_everything() {
        let old = Header::absolute(3, 100, 8, 10, 1);
        let diff = Header::continuation(3);
        let resolved = apply(&old, &diff);
        assert_eq!(resolved, old);
    }

    #[test]
    #[should_panic]
    fn diff_headers_rejects_relative_input() {
        let old = Header::absolute(3, 100, 8, 10, 1);
        let bad_new = Header::continuation(3);
        diff_headers(&old, &bad_new);
    }

    #[test]
    #[should_panic]
    fn diff_headers_rejects_channel_mismatch() {
        let old = Header::absolute(3, 100, 8, 10, 1);
        let new = Header::absolute(4, 100, 8, 10, 1);
        diff_headers(&old, &new);
    }
}
