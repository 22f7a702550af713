//! Three-way text merge.
//!
//! Both sides are diffed line by line against their common ancestor and the
//! two change sets are replayed onto it. Where changes from the two sides
//! touch the same region, the region is merged again word by word; if that
//! still collides, or the region is too large to refine, both versions are
//! kept between conflict markers so that no content is ever dropped.

mod diff;

use std::ops::Range;

pub use diff::{diff, Hunk};

pub const CONFLICT_START: &str = "<<<<<<< LOCAL";
pub const CONFLICT_SEPARATOR: &str = "=======";
pub const CONFLICT_END: &str = ">>>>>>> REMOTE";

/// Conflicting regions with more words than this (all three versions
/// together) go straight to conflict markers.
const WORD_MERGE_LIMIT: usize = 6_000;

/// Merges `local` and `remote`, two divergent edits of `ancestor`.
///
/// Deterministic: identical inputs always give identical output.
pub fn merge(ancestor: &str, local: &str, remote: &str) -> String {
    if local == remote || remote == ancestor {
        return local.to_string();
    }
    if local == ancestor {
        return remote.to_string();
    }

    let chunks = merge_tokens(&lines(ancestor), &lines(local), &lines(remote));

    let mut out = String::with_capacity(local.len().max(remote.len()));
    for chunk in chunks {
        match chunk {
            Chunk::Resolved(tokens) => tokens.iter().for_each(|t| out.push_str(t)),
            Chunk::Conflict {
                ancestor,
                local,
                remote,
            } => {
                let (ancestor, local, remote) = (ancestor.concat(), local.concat(), remote.concat());
                match merge_words(&ancestor, &local, &remote) {
                    Some(text) => out.push_str(&text),
                    None => push_conflict(&mut out, &local, &remote),
                }
            }
        }
    }
    out
}

/// True if `text` still carries conflict markers from an earlier merge.
pub fn has_conflicts(text: &str) -> bool {
    text.lines()
        .any(|line| line == CONFLICT_START || line == CONFLICT_END)
}

#[derive(Debug, PartialEq, Eq)]
enum Chunk<'a> {
    Resolved(Vec<&'a str>),
    Conflict {
        ancestor: Vec<&'a str>,
        local: Vec<&'a str>,
        remote: Vec<&'a str>,
    },
}

fn merge_words(ancestor: &str, local: &str, remote: &str) -> Option<String> {
    let (ancestor, local, remote) = (words(ancestor), words(local), words(remote));
    if ancestor.len() + local.len() + remote.len() > WORD_MERGE_LIMIT {
        return None;
    }
    let chunks = merge_tokens(&ancestor, &local, &remote);
    let mut out = String::new();
    for chunk in chunks {
        match chunk {
            Chunk::Resolved(tokens) => tokens.iter().for_each(|t| out.push_str(t)),
            Chunk::Conflict { .. } => return None,
        }
    }
    Some(out)
}

fn push_conflict(out: &mut String, local: &str, remote: &str) {
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(CONFLICT_START);
    out.push('\n');
    push_line_block(out, local);
    out.push_str(CONFLICT_SEPARATOR);
    out.push('\n');
    push_line_block(out, remote);
    out.push_str(CONFLICT_END);
    out.push('\n');
}

fn push_line_block(out: &mut String, block: &str) {
    out.push_str(block);
    if !block.is_empty() && !block.ends_with('\n') {
        out.push('\n');
    }
}

/// Replays both change sets onto `ancestor`, grouping changes that collide.
fn merge_tokens<'a>(ancestor: &[&'a str], local: &[&'a str], remote: &[&'a str]) -> Vec<Chunk<'a>> {
    let local_hunks = diff(ancestor, local);
    let remote_hunks = diff(ancestor, remote);
    let (mut i, mut j) = (0, 0);
    let mut cursor = 0;
    let mut chunks = Vec::new();

    while i < local_hunks.len() || j < remote_hunks.len() {
        let take_local = match (local_hunks.get(i), remote_hunks.get(j)) {
            (Some(l), Some(r)) => order_key(&l.old) <= order_key(&r.old),
            (Some(_), None) => true,
            _ => false,
        };

        let mut group_local: Vec<&Hunk> = Vec::new();
        let mut group_remote: Vec<&Hunk> = Vec::new();
        let first = if take_local {
            i += 1;
            group_local.push(&local_hunks[i - 1]);
            &local_hunks[i - 1]
        } else {
            j += 1;
            group_remote.push(&remote_hunks[j - 1]);
            &remote_hunks[j - 1]
        };
        let mut region = first.old.clone();

        loop {
            let mut grew = false;
            if let Some(h) = local_hunks.get(i).filter(|h| collides(&region, &h.old)) {
                region.end = region.end.max(h.old.end);
                group_local.push(h);
                i += 1;
                grew = true;
            }
            if let Some(h) = remote_hunks.get(j).filter(|h| collides(&region, &h.old)) {
                region.end = region.end.max(h.old.end);
                group_remote.push(h);
                j += 1;
                grew = true;
            }
            if !grew {
                break;
            }
        }

        if cursor < region.start {
            chunks.push(Chunk::Resolved(ancestor[cursor..region.start].to_vec()));
        }

        let merged_local = apply_region(ancestor, local, &group_local, &region);
        let merged_remote = apply_region(ancestor, remote, &group_remote, &region);
        if group_remote.is_empty() {
            chunks.push(Chunk::Resolved(merged_local));
        } else if group_local.is_empty() || merged_local == merged_remote {
            chunks.push(Chunk::Resolved(merged_remote));
        } else {
            chunks.push(Chunk::Conflict {
                ancestor: ancestor[region.clone()].to_vec(),
                local: merged_local,
                remote: merged_remote,
            });
        }
        cursor = region.end;
    }

    if cursor < ancestor.len() {
        chunks.push(Chunk::Resolved(ancestor[cursor..].to_vec()));
    }
    chunks
}

/// Insertions sort before edits starting at the same position.
fn order_key(range: &Range<usize>) -> (usize, bool) {
    (range.start, !range.is_empty())
}

/// Whether a change at `next` lands inside `region`.
///
/// An insertion at either edge of an edited region does not collide with
/// it; two insertions at the same position do.
fn collides(region: &Range<usize>, next: &Range<usize>) -> bool {
    match (region.is_empty(), next.is_empty()) {
        (false, false) => next.start < region.end && region.start < next.end,
        (true, true) => next.start == region.start,
        (true, false) => next.start < region.start && region.start < next.end,
        (false, true) => region.start < next.start && next.start < region.end,
    }
}

/// One side's version of `region`: ancestor tokens with that side's hunks applied.
fn apply_region<'a>(
    ancestor: &[&'a str],
    side: &[&'a str],
    hunks: &[&Hunk],
    region: &Range<usize>,
) -> Vec<&'a str> {
    let mut out = Vec::new();
    let mut cursor = region.start;
    for hunk in hunks {
        out.extend_from_slice(&ancestor[cursor..hunk.old.start]);
        out.extend_from_slice(&side[hunk.new.clone()]);
        cursor = hunk.old.end;
    }
    out.extend_from_slice(&ancestor[cursor..region.end]);
    out
}

/// Lines, each keeping its line break.
fn lines(text: &str) -> Vec<&str> {
    text.split_inclusive('\n').collect()
}

/// Runs of word characters, runs of whitespace, and single punctuation marks.
fn words(text: &str) -> Vec<&str> {
    #[derive(PartialEq)]
    enum Class {
        Word,
        Space,
        Mark,
    }
    let class = |c: char| {
        if c.is_alphanumeric() {
            Class::Word
        } else if c.is_whitespace() {
            Class::Space
        } else {
            Class::Mark
        }
    };

    let mut tokens = Vec::new();
    let mut start = 0;
    let mut previous: Option<Class> = None;
    for (idx, c) in text.char_indices() {
        let current = class(c);
        let split = match &previous {
            Some(p) => *p != current || current == Class::Mark,
            None => false,
        };
        if split {
            tokens.push(&text[start..idx]);
            start = idx;
        }
        previous = Some(current);
    }
    if start < text.len() {
        tokens.push(&text[start..]);
    }
    tokens
}
