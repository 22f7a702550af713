use super::Memo;

/// Returns true when `a` is strictly more recent than `b`.
///
/// An absent `a` is never more recent. A `b` without a timestamp (or no `b`
/// at all) is older than anything present. Timestamps come from different
/// clocks, so this is not safe against skew between devices.
pub fn is_more_recent(a: Option<&Memo>, b: Option<&Memo>) -> bool {
    let Some(a) = a else {
        return false;
    };
    match b.and_then(|b| b.timestamp) {
        None => true,
        Some(b_ts) => a.timestamp.is_some_and(|a_ts| a_ts > b_ts),
    }
}
