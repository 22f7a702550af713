//! Token diff on top of `similar`'s linear-space Myers.

use similar::{capture_diff_slices, Algorithm, DiffTag};
use std::hash::Hash;
use std::ops::Range;

/// A changed region: `old` tokens were replaced by `new` tokens.
///
/// Either range may be empty (pure insertion or pure deletion), never both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    pub old: Range<usize>,
    pub new: Range<usize>,
}

/// Changed regions between `old` and `new`, in order, separated by at least
/// one unchanged token.
pub fn diff<T: Eq + Hash + Ord>(old: &[T], new: &[T]) -> Vec<Hunk> {
    let mut hunks: Vec<Hunk> = Vec::new();
    let mut current: Option<Hunk> = None;

    for op in capture_diff_slices(Algorithm::Myers, old, new) {
        if op.tag() == DiffTag::Equal {
            if let Some(hunk) = current.take() {
                hunks.push(hunk);
            }
            continue;
        }
        let (old_range, new_range) = (op.old_range(), op.new_range());
        match current.as_mut() {
            Some(hunk) => {
                hunk.old.end = old_range.end;
                hunk.new.end = new_range.end;
            }
            None => {
                current = Some(Hunk {
                    old: old_range,
                    new: new_range,
                })
            }
        }
    }
    if let Some(hunk) = current {
        hunks.push(hunk);
    }
    hunks
}
