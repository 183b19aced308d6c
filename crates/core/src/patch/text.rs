#![forbid(unsafe_code)]

use super::PatchError;
use similar::{ChangeTag, TextDiff};
use std::fmt::Write as _;

/// Characters of unchanged text kept around each change. Hunks separated by
/// no more than twice this are merged.
const CONTEXT_CHARS: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SegmentKind {
    Keep,
    Delete,
    Insert,
}

impl SegmentKind {
    fn marker(self) -> char {
        match self {
            Self::Keep => ' ',
            Self::Delete => '-',
            Self::Insert => '+',
        }
    }

    fn from_marker(marker: char) -> Option<Self> {
        match marker {
            ' ' => Some(Self::Keep),
            '-' => Some(Self::Delete),
            '+' => Some(Self::Insert),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Segment {
    kind: SegmentKind,
    text: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct Hunk {
    old_start: usize,
    new_start: usize,
    segments: Vec<Segment>,
}

impl Hunk {
    fn push(&mut self, kind: SegmentKind, text: &str) {
        push_segment(&mut self.segments, kind, text);
    }

    fn old_len(&self) -> usize {
        self.segments
            .iter()
            .filter(|segment| segment.kind != SegmentKind::Insert)
            .map(|segment| segment.text.chars().count())
            .sum()
    }

    fn new_len(&self) -> usize {
        self.segments
            .iter()
            .filter(|segment| segment.kind != SegmentKind::Delete)
            .map(|segment| segment.text.chars().count())
            .sum()
    }
}

fn push_segment(segments: &mut Vec<Segment>, kind: SegmentKind, text: &str) {
    if text.is_empty() {
        return;
    }
    match segments.last_mut() {
        Some(last) if last.kind == kind => last.text.push_str(text),
        _ => segments.push(Segment {
            kind,
            text: text.to_string(),
        }),
    }
}

/// Encodes the change from `old` to `new`. Identical inputs yield an empty
/// patch; either side may be empty.
pub fn create_text_patch(old: &str, new: &str) -> String {
    if old == new {
        return String::new();
    }
    let runs = diff_runs(old, new);
    encode(&build_hunks(&runs))
}

/// Applies a patch produced by [`create_text_patch`]. Every hunk must land
/// exactly where it was recorded; any mismatch means the patch was made
/// against different text and is reported as [`PatchError::Unapplyable`].
pub fn apply_text_patch(text: &str, patch: &str) -> Result<String, PatchError> {
    if patch.is_empty() {
        return Ok(text.to_string());
    }

    let hunks = parse_hunks(patch)?;
    let source: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0usize;

    for (index, hunk) in hunks.iter().enumerate() {
        if hunk.old_start < cursor || hunk.old_start > source.len() {
            return Err(PatchError::Unapplyable {
                hunk: index,
                offset: hunk.old_start,
            });
        }
        out.extend(&source[cursor..hunk.old_start]);

        let mut pos = hunk.old_start;
        for segment in &hunk.segments {
            match segment.kind {
                SegmentKind::Insert => out.push_str(&segment.text),
                SegmentKind::Keep | SegmentKind::Delete => {
                    let Some(end) = match_at(&source, pos, &segment.text) else {
                        return Err(PatchError::Unapplyable {
                            hunk: index,
                            offset: pos,
                        });
                    };
                    if segment.kind == SegmentKind::Keep {
                        out.extend(&source[pos..end]);
                    }
                    pos = end;
                }
            }
        }
        cursor = pos;
    }

    out.extend(&source[cursor..]);
    Ok(out)
}

fn diff_runs(old: &str, new: &str) -> Vec<Segment> {
    let diff = TextDiff::from_chars(old, new);
    let mut runs = Vec::new();
    for change in diff.iter_all_changes() {
        let kind = match change.tag() {
            ChangeTag::Equal => SegmentKind::Keep,
            ChangeTag::Delete => SegmentKind::Delete,
            ChangeTag::Insert => SegmentKind::Insert,
        };
        push_segment(&mut runs, kind, change.value());
    }
    runs
}

fn build_hunks(runs: &[Segment]) -> Vec<Hunk> {
    let mut hunks = Vec::new();
    let mut current: Option<Hunk> = None;
    let mut old_pos = 0usize;
    let mut new_pos = 0usize;

    for (index, run) in runs.iter().enumerate() {
        let len = run.text.chars().count();
        match run.kind {
            SegmentKind::Keep => {
                if let Some(mut hunk) = current.take() {
                    let is_last = index + 1 == runs.len();
                    if !is_last && len <= CONTEXT_CHARS * 2 {
                        hunk.push(SegmentKind::Keep, &run.text);
                        current = Some(hunk);
                    } else {
                        hunk.push(SegmentKind::Keep, prefix_chars(&run.text, CONTEXT_CHARS));
                        hunks.push(hunk);
                    }
                }
                old_pos += len;
                new_pos += len;
            }
            SegmentKind::Delete | SegmentKind::Insert => {
                let hunk = current.get_or_insert_with(|| {
                    let lead = match index.checked_sub(1).map(|prev| &runs[prev]) {
                        Some(prev) if prev.kind == SegmentKind::Keep => {
                            suffix_chars(&prev.text, CONTEXT_CHARS)
                        }
                        _ => "",
                    };
                    let lead_len = lead.chars().count();
                    let mut hunk = Hunk {
                        old_start: old_pos - lead_len,
                        new_start: new_pos - lead_len,
                        segments: Vec::new(),
                    };
                    hunk.push(SegmentKind::Keep, lead);
                    hunk
                });
                hunk.push(run.kind, &run.text);
                if run.kind == SegmentKind::Delete {
                    old_pos += len;
                } else {
                    new_pos += len;
                }
            }
        }
    }

    if let Some(hunk) = current {
        hunks.push(hunk);
    }
    hunks
}

fn prefix_chars(value: &str, count: usize) -> &str {
    match value.char_indices().nth(count) {
        Some((index, _)) => &value[..index],
        None => value,
    }
}

fn suffix_chars(value: &str, count: usize) -> &str {
    let total = value.chars().count();
    if total <= count {
        return value;
    }
    match value.char_indices().nth(total - count) {
        Some((index, _)) => &value[index..],
        None => value,
    }
}

fn match_at(source: &[char], start: usize, expected: &str) -> Option<usize> {
    let mut pos = start;
    for ch in expected.chars() {
        if source.get(pos) != Some(&ch) {
            return None;
        }
        pos += 1;
    }
    Some(pos)
}

fn encode(hunks: &[Hunk]) -> String {
    let mut out = String::new();
    for hunk in hunks {
        let _ = writeln!(
            out,
            "@@ -{},{} +{},{} @@",
            hunk.old_start,
            hunk.old_len(),
            hunk.new_start,
            hunk.new_len()
        );
        for segment in &hunk.segments {
            out.push(segment.kind.marker());
            escape_into(&mut out, &segment.text);
            out.push('\n');
        }
    }
    out
}

fn parse_hunks(patch: &str) -> Result<Vec<Hunk>, PatchError> {
    let mut hunks: Vec<(Hunk, usize, usize)> = Vec::new();

    for line in patch.split('\n') {
        if line.is_empty() {
            continue;
        }
        if let Some(header) = line.strip_prefix("@@ ") {
            let (old_start, old_len, new_start, new_len) = parse_header(header)?;
            hunks.push((
                Hunk {
                    old_start,
                    new_start,
                    segments: Vec::new(),
                },
                old_len,
                new_len,
            ));
            continue;
        }

        let Some((hunk, _, _)) = hunks.last_mut() else {
            return Err(PatchError::Malformed {
                reason: "segment before hunk header",
            });
        };
        let mut chars = line.chars();
        let kind = chars
            .next()
            .and_then(SegmentKind::from_marker)
            .ok_or(PatchError::Malformed {
                reason: "unknown segment marker",
            })?;
        let text = unescape(chars.as_str())?;
        hunk.segments.push(Segment { kind, text });
    }

    let mut out = Vec::with_capacity(hunks.len());
    for (hunk, old_len, new_len) in hunks {
        if hunk.old_len() != old_len || hunk.new_len() != new_len {
            return Err(PatchError::Malformed {
                reason: "hunk length does not match header",
            });
        }
        out.push(hunk);
    }
    Ok(out)
}

fn parse_header(header: &str) -> Result<(usize, usize, usize, usize), PatchError> {
    const BAD_HEADER: PatchError = PatchError::Malformed {
        reason: "invalid hunk header",
    };

    let header = header.strip_suffix(" @@").ok_or(BAD_HEADER)?;
    let mut parts = header.split(' ');
    let old = parts
        .next()
        .and_then(|part| part.strip_prefix('-'))
        .ok_or(BAD_HEADER)?;
    let new = parts
        .next()
        .and_then(|part| part.strip_prefix('+'))
        .ok_or(BAD_HEADER)?;
    if parts.next().is_some() {
        return Err(BAD_HEADER);
    }

    let (old_start, old_len) = parse_range(old).ok_or(BAD_HEADER)?;
    let (new_start, new_len) = parse_range(new).ok_or(BAD_HEADER)?;
    Ok((old_start, old_len, new_start, new_len))
}

fn parse_range(value: &str) -> Option<(usize, usize)> {
    let (start, len) = value.split_once(',')?;
    Some((start.parse().ok()?, len.parse().ok()?))
}

fn escape_into(out: &mut String, text: &str) {
    for ch in text.chars() {
        match ch {
            '%' => out.push_str("%25"),
            '\n' => out.push_str("%0A"),
            '\r' => out.push_str("%0D"),
            other => out.push(other),
        }
    }
}

fn unescape(text: &str) -> Result<String, PatchError> {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(index) = rest.find('%') {
        out.push_str(&rest[..index]);
        let escaped = rest.get(index + 1..index + 3).ok_or(PatchError::Malformed {
            reason: "truncated escape",
        })?;
        let ch = match escaped {
            "25" => '%',
            "0A" => '\n',
            "0D" => '\r',
            _ => {
                return Err(PatchError::Malformed {
                    reason: "unknown escape",
                });
            }
        };
        out.push(ch);
        rest = &rest[index + 3..];
    }
    out.push_str(rest);
    Ok(out)
}
