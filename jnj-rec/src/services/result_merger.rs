//! Merge per-segment detections into a deduplicated track list
//!
//! **Algorithm:**
//! 1. Drop no-match detections
//! 2. Sort the rest by a total order (track, start, end, index, match key,
//!    confidence descending, metadata) so the result never depends on input
//!    order
//! 3. Sweep in that order, keeping a list of open groups:
//!    - same match key as the last group and
//!      `start - group_end <= overlap + gap_tolerance`: extend the group
//!    - different key overlapping the last group by more than the overlap
//!      tolerance: the two disagree about the same window; keep the higher
//!      confidence (equal scores keep the detection already placed)
//!    - otherwise: start a new group
//! 4. Each group becomes one [`MergedDetection`] with the metadata of its
//!    highest-confidence member and that member's confidence
//! 5. Neighbouring entries whose keys differ but are nearly identical are
//!    flagged for review instead of merged
//!
//! Match keys compare artist and title ignoring case, punctuation and
//! whitespace.

use crate::models::{MergeParameters, MergedDetection, RawDetection, ReviewFlag, TrackMatch};
use std::cmp::Ordering;

const KEY_SEPARATOR: char = '|';

/// Normalized comparison key: lowercase alphanumerics only
pub fn normalize(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Match key for one recognized track ("artist|title", normalized)
pub fn match_key(track: &TrackMatch) -> String {
    let mut key = normalize(&track.artist_display());
    key.push(KEY_SEPARATOR);
    key.push_str(&normalize(&track.title));
    key
}

/// Overlap of two half-open ranges in ms
fn overlap_ms(a: (u64, u64), b: (u64, u64)) -> u64 {
    a.1.min(b.1).saturating_sub(a.0.max(b.0))
}

/// Matched detection with its precomputed key
struct Candidate {
    detection: RawDetection,
    track: TrackMatch,
    key: String,
    confidence: f64,
}

impl Candidate {
    fn span(&self) -> (u64, u64) {
        (self.detection.segment.start_ms, self.detection.segment.end_ms)
    }

    fn track_id(&self) -> &str {
        &self.detection.segment.track_id
    }

    fn total_cmp(&self, other: &Self) -> Ordering {
        let (a, b) = (&self.detection.segment, &other.detection.segment);
        a.track_id
            .cmp(&b.track_id)
            .then(a.start_ms.cmp(&b.start_ms))
            .then(a.end_ms.cmp(&b.end_ms))
            .then(a.index.cmp(&b.index))
            .then_with(|| self.key.cmp(&other.key))
            .then_with(|| other.confidence.total_cmp(&self.confidence))
            .then_with(|| self.detection.backend.cmp(&other.detection.backend))
            .then_with(|| compare_tracks(&self.track, &other.track))
    }
}

fn compare_tracks(a: &TrackMatch, b: &TrackMatch) -> Ordering {
    a.title
        .cmp(&b.title)
        .then_with(|| a.artists.cmp(&b.artists))
        .then_with(|| a.album.cmp(&b.album))
        .then_with(|| a.duration_ms.cmp(&b.duration_ms))
        .then_with(|| a.spotify_id.cmp(&b.spotify_id))
        .then_with(|| a.isrc.cmp(&b.isrc))
        .then_with(|| a.genres.cmp(&b.genres))
        .then_with(|| a.release_date.cmp(&b.release_date))
}

struct Group {
    key: String,
    members: Vec<Candidate>,
}

impl Group {
    fn track_id(&self) -> &str {
        self.members.first().map(|m| m.track_id()).unwrap_or_default()
    }

    fn span(&self) -> (u64, u64) {
        let start = self.members.iter().map(|m| m.span().0).min().unwrap_or(0);
        let end = self.members.iter().map(|m| m.span().1).max().unwrap_or(0);
        (start, end)
    }
}

/// Collapses raw per-segment detections into merged track-list entries
#[derive(Debug, Clone, Default)]
pub struct ResultMerger {
    params: MergeParameters,
}

impl ResultMerger {
    pub fn new(params: MergeParameters) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &MergeParameters {
        &self.params
    }

    /// Merge detections; output is ordered by (track id, start)
    pub fn merge(&self, detections: Vec<RawDetection>) -> Vec<MergedDetection> {
        let total = detections.len();
        let mut candidates: Vec<Candidate> = detections
            .into_iter()
            .filter_map(|detection| {
                let track = detection.track.clone()?;
                let confidence = if detection.confidence.is_nan() {
                    0.0
                } else {
                    detection.confidence
                };
                Some(Candidate {
                    key: match_key(&track),
                    track,
                    confidence,
                    detection,
                })
            })
            .collect();
        candidates.sort_by(|a, b| a.total_cmp(b));

        let matched = candidates.len();
        let mut groups: Vec<Group> = Vec::new();
        for candidate in candidates {
            self.place(&mut groups, candidate);
        }

        let mut merged: Vec<(String, MergedDetection)> = groups
            .into_iter()
            .filter_map(build_entry)
            .collect();
        merged.sort_by(|(_, a), (_, b)| {
            a.track_id
                .cmp(&b.track_id)
                .then(a.start_ms.cmp(&b.start_ms))
                .then(a.end_ms.cmp(&b.end_ms))
        });

        self.flag_near_duplicates(&mut merged);

        tracing::debug!(
            detections = total,
            matched,
            merged = merged.len(),
            "Merged segment detections"
        );

        merged.into_iter().map(|(_, entry)| entry).collect()
    }

    fn place(&self, groups: &mut Vec<Group>, candidate: Candidate) {
        let tolerance = self.params.overlap_tolerance_ms;
        let join_window = self
            .params
            .overlap_ms
            .saturating_add(self.params.gap_tolerance_ms);

        loop {
            let Some(group) = groups
                .last_mut()
                .filter(|g| g.track_id() == candidate.track_id())
            else {
                break;
            };
            let span = group.span();

            if group.key == candidate.key {
                if candidate.span().0 <= span.1.saturating_add(join_window) {
                    group.members.push(candidate);
                    return;
                }
                break;
            }

            if overlap_ms(span, candidate.span()) <= tolerance {
                break;
            }

            // Disagreement over the same window
            let mut rivals: Vec<usize> = group
                .members
                .iter()
                .enumerate()
                .filter(|(_, m)| overlap_ms(m.span(), candidate.span()) > tolerance)
                .map(|(i, _)| i)
                .collect();
            if rivals.is_empty() {
                rivals = group
                    .members
                    .iter()
                    .enumerate()
                    .filter(|(_, m)| overlap_ms(m.span(), candidate.span()) > 0)
                    .map(|(i, _)| i)
                    .collect();
            }
            if rivals.is_empty() {
                // only the group's span covers the window, no member does
                break;
            }
            let rival_confidence = rivals
                .iter()
                .map(|&i| group.members[i].confidence)
                .fold(f64::NEG_INFINITY, f64::max);

            if candidate.confidence <= rival_confidence {
                tracing::trace!(
                    track_id = %candidate.track_id(),
                    segment = candidate.detection.segment.index,
                    dropped = %candidate.key,
                    kept = %group.key,
                    "Conflicting detection dropped"
                );
                return;
            }

            tracing::trace!(
                track_id = %candidate.track_id(),
                segment = candidate.detection.segment.index,
                dropped = %group.key,
                kept = %candidate.key,
                "Conflicting detection replaced"
            );
            let mut index = 0;
            group.members.retain(|_| {
                let keep = !rivals.contains(&index);
                index += 1;
                keep
            });
            if group.members.is_empty() {
                groups.pop();
            }
        }

        groups.push(Group {
            key: candidate.key.clone(),
            members: vec![candidate],
        });
    }

    fn flag_near_duplicates(&self, merged: &mut [(String, MergedDetection)]) {
        let threshold = self.params.review_similarity;

        for i in 1..merged.len() {
            let (left, right) = merged.split_at_mut(i);
            let (prev_key, prev) = &mut left[i - 1];
            let (key, entry) = &mut right[0];

            if prev.track_id != entry.track_id || prev_key == key {
                continue;
            }

            let similarity = strsim::normalized_levenshtein(prev_key, key);
            if similarity < threshold {
                continue;
            }

            tracing::debug!(
                track_id = %entry.track_id,
                first = %prev_key,
                second = %key,
                similarity,
                "Near-duplicate neighbours flagged for review"
            );
            attach_flag(prev, entry, similarity);
            attach_flag(entry, prev, similarity);
        }
    }
}

fn attach_flag(entry: &mut MergedDetection, neighbour: &MergedDetection, similarity: f64) {
    let better = entry
        .review
        .as_ref()
        .map_or(true, |flag| similarity > flag.similarity);
    if better {
        entry.review = Some(ReviewFlag {
            similar_title: neighbour.track.title.clone(),
            similar_artist: neighbour.artist(),
            similarity,
        });
    }
}

/// Build the output entry for one group, keyed by its match key
fn build_entry(group: Group) -> Option<(String, MergedDetection)> {
    let (start_ms, end_ms) = group.span();
    let first_segment = group.members.iter().map(|m| m.detection.segment.index).min()?;
    let last_segment = group.members.iter().map(|m| m.detection.segment.index).max()?;
    let supporting_count = group.members.len();

    // Highest confidence wins; members are in sweep order so ties keep the earliest
    let best = group.members.iter().fold(None::<&Candidate>, |best, m| match best {
        Some(b) if m.confidence <= b.confidence => Some(b),
        _ => Some(m),
    })?;

    let entry = MergedDetection {
        track_id: best.track_id().to_string(),
        track: best.track.clone(),
        start_ms,
        end_ms,
        first_segment,
        last_segment,
        supporting_count,
        confidence: best.confidence,
        backend: best.detection.backend.clone(),
        review: None,
    };
    Some((group.key, entry))
}

/// Merge with default tolerances
pub fn merge(detections: Vec<RawDetection>) -> Vec<MergedDetection> {
    ResultMerger::default().merge(detections)
}
