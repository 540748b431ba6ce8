//! Segment completion tracking.
//!
//! The encoder never says a segment is closed; it only says the next one was
//! opened. [`SegmentTracker`] keeps one [`SegmentCursor`] per rendition and
//! turns segment-open events into [`PublishFact`]s:
//!
//! - opening segment `n` finalizes the previously opened segment of the same
//!   rendition (the first open finalizes nothing);
//! - [`SegmentTracker::flush`], called once after a successful encode,
//!   finalizes the last segment and the manifest of every rendition that
//!   opened at least one segment.
//!
//! Whether a superseded segment may be published immediately is decided by a
//! [`ClosePolicy`]. The default [`SuccessorCloses`] relies on the encoder
//! never opening segment `n` before `n-1` is fully flushed.

use std::collections::VecDeque;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};

use crate::encoder::plan::RenditionPlan;

/// Per-rendition cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentCursor {
    pub rendition_label: String,
    pub last_opened: Option<u32>,
}

/// A segment file that is fully written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FinalizedSegment {
    pub rendition_label: String,
    pub segment_index: u32,
    pub file_path: PathBuf,
}

/// A manifest that will receive no further entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestFinalized {
    pub rendition_label: String,
    pub file_path: PathBuf,
}

/// Something ready to publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PublishFact {
    Segment(FinalizedSegment),
    Manifest(ManifestFinalized),
}

impl PublishFact {
    pub fn file_path(&self) -> &Path {
        match self {
            Self::Segment(s) => &s.file_path,
            Self::Manifest(m) => &m.file_path,
        }
    }

    pub fn rendition_label(&self) -> &str {
        match self {
            Self::Segment(s) => &s.rendition_label,
            Self::Manifest(m) => &m.rendition_label,
        }
    }

    /// Remote name: the bare file name.
    pub fn published_name(&self) -> String {
        self.file_path()
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

/// Decides when a superseded segment is safe to publish.
pub trait ClosePolicy: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Whether the superseded segment at `path` is fully written.
    fn is_closed(&self, path: &Path) -> bool;
}

/// A segment is closed as soon as its successor opens.
#[derive(Debug, Default, Clone, Copy)]
pub struct SuccessorCloses;

impl ClosePolicy for SuccessorCloses {
    fn name(&self) -> &'static str {
        "successor-closes"
    }

    fn is_closed(&self, _path: &Path) -> bool {
        true
    }
}

/// A superseded segment is closed once it exists with a non-zero size.
///
/// Unconfirmed segments are re-checked on the next event for the same
/// rendition and unconditionally released at flush.
#[derive(Debug, Default, Clone, Copy)]
pub struct StatConfirmed;

impl ClosePolicy for StatConfirmed {
    fn name(&self) -> &'static str {
        "stat-confirmed"
    }

    fn is_closed(&self, path: &Path) -> bool {
        std::fs::metadata(path)
            .map(|m| m.is_file() && m.len() > 0)
            .unwrap_or(false)
    }
}

/// Selects a [`ClosePolicy`] for new trackers.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ClosePolicyKind {
    #[default]
    SuccessorCloses,
    StatConfirmed,
}

impl ClosePolicyKind {
    pub fn build(self) -> Box<dyn ClosePolicy> {
        match self {
            Self::SuccessorCloses => Box::new(SuccessorCloses),
            Self::StatConfirmed => Box::new(StatConfirmed),
        }
    }
}

#[derive(Debug)]
struct RenditionState {
    cursor: SegmentCursor,
    /// Superseded, not yet confirmed closed.
    pending: VecDeque<u32>,
}

/// Per-job state machine from segment opens to publish facts.
#[derive(Debug)]
pub struct SegmentTracker {
    output_dir: PathBuf,
    renditions: Vec<RenditionState>,
    policy: Box<dyn ClosePolicy>,
    flushed: bool,
}

impl SegmentTracker {
    pub fn new(plan: &RenditionPlan, output_dir: impl Into<PathBuf>) -> Self {
        Self::with_policy(plan, output_dir, Box::new(SuccessorCloses))
    }

    pub fn with_policy(
        plan: &RenditionPlan,
        output_dir: impl Into<PathBuf>,
        policy: Box<dyn ClosePolicy>,
    ) -> Self {
        let renditions = plan
            .labels()
            .map(|label| RenditionState {
                cursor: SegmentCursor {
                    rendition_label: label.to_string(),
                    last_opened: None,
                },
                pending: VecDeque::new(),
            })
            .collect();

        Self {
            output_dir: output_dir.into(),
            renditions,
            policy,
            flushed: false,
        }
    }

    pub fn cursor(&self, label: &str) -> Option<&SegmentCursor> {
        self.renditions
            .iter()
            .find(|r| r.cursor.rendition_label == label)
            .map(|r| &r.cursor)
    }

    pub fn is_flushed(&self) -> bool {
        self.flushed
    }

    /// Record that segment `index` of `label` was opened.
    ///
    /// Opens for unknown renditions, non-increasing indices, or arriving
    /// after flush are ignored.
    pub fn on_segment_opened(&mut self, label: &str, index: u32) -> Vec<PublishFact> {
        if self.flushed {
            warn!(rendition = %label, segment = index, "Segment opened after flush, ignoring");
            return Vec::new();
        }

        let Some(state) = self
            .renditions
            .iter_mut()
            .find(|r| r.cursor.rendition_label == label)
        else {
            warn!(rendition = %label, segment = index, "Segment opened for unknown rendition");
            return Vec::new();
        };

        if let Some(prev) = state.cursor.last_opened
            && index <= prev
        {
            warn!(
                rendition = %label,
                segment = index,
                last_opened = prev,
                "Non-increasing segment index, ignoring"
            );
            return Vec::new();
        }

        let prev = state.cursor.last_opened.replace(index);
        if let Some(prev) = prev {
            state.pending.push_back(prev);
        }

        let mut facts = Vec::new();
        let output_dir = &self.output_dir;
        let policy = &self.policy;
        state.pending.retain(|&pending| {
            let path = RenditionPlan::segment_path(output_dir, label, pending);
            if policy.is_closed(&path) {
                facts.push(PublishFact::Segment(FinalizedSegment {
                    rendition_label: label.to_string(),
                    segment_index: pending,
                    file_path: path,
                }));
                false
            } else {
                debug!(rendition = %label, segment = pending, policy = policy.name(), "Segment not yet confirmed closed");
                true
            }
        });

        facts
    }

    /// Finalize the last segment and manifest of every rendition.
    ///
    /// Only the first call produces facts.
    pub fn flush(&mut self) -> Vec<PublishFact> {
        if self.flushed {
            return Vec::new();
        }
        self.flushed = true;

        let mut facts = Vec::new();
        for state in &mut self.renditions {
            let label = state.cursor.rendition_label.as_str();
            let Some(last) = state.cursor.last_opened else {
                continue;
            };

            for index in state.pending.drain(..).chain(std::iter::once(last)) {
                facts.push(PublishFact::Segment(FinalizedSegment {
                    rendition_label: label.to_string(),
                    segment_index: index,
                    file_path: RenditionPlan::segment_path(&self.output_dir, label, index),
                }));
            }
            facts.push(PublishFact::Manifest(ManifestFinalized {
                rendition_label: label.to_string(),
                file_path: RenditionPlan::manifest_path(&self.output_dir, label),
            }));
        }
        facts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::plan::EncodeSettings;

    fn plan(ladder: &[(&str, &str)]) -> RenditionPlan {
        RenditionPlan::new(ladder, EncodeSettings::default()).unwrap()
    }

    fn segment(label: &str, index: u32) -> PublishFact {
        PublishFact::Segment(FinalizedSegment {
            rendition_label: label.to_string(),
            segment_index: index,
            file_path: RenditionPlan::segment_path(Path::new("/out"), label, index),
        })
    }

    fn manifest(label: &str) -> PublishFact {
        PublishFact::Manifest(ManifestFinalized {
            rendition_label: label.to_string(),
            file_path: RenditionPlan::manifest_path(Path::new("/out"), label),
        })
    }

    #[test]
    fn first_open_finalizes_nothing_second_finalizes_index_zero() {
        let mut tracker = SegmentTracker::new(&plan(&[("640:360", "1000k")]), "/out");

        assert!(tracker.on_segment_opened("360", 0).is_empty());
        assert_eq!(tracker.on_segment_opened("360", 1), vec![segment("360", 0)]);
    }

    #[test]
    fn single_rendition_scenario_publishes_four_facts_in_order() {
        let mut tracker = SegmentTracker::new(&plan(&[("640:360", "1000k")]), "/out");

        let mut facts = Vec::new();
        facts.extend(tracker.on_segment_opened("360", 0));
        facts.extend(tracker.on_segment_opened("360", 1));
        facts.extend(tracker.on_segment_opened("360", 2));
        facts.extend(tracker.flush());

        assert_eq!(
            facts,
            vec![
                segment("360", 0),
                segment("360", 1),
                segment("360", 2),
                manifest("360"),
            ]
        );
    }

    #[test]
    fn n_opens_yield_each_index_exactly_once() {
        let mut tracker = SegmentTracker::new(&plan(&[("1280:720", "3000k")]), "/out");
        let n = 25;

        let mut indices = Vec::new();
        for i in 0..n {
            for fact in tracker.on_segment_opened("720", i) {
                if let PublishFact::Segment(s) = fact {
                    indices.push(s.segment_index);
                }
            }
        }
        assert_eq!(indices.len(), (n - 1) as usize);

        for fact in tracker.flush() {
            if let PublishFact::Segment(s) = fact {
                indices.push(s.segment_index);
            }
        }
        assert_eq!(indices, (0..n).collect::<Vec<_>>());
    }

    #[test]
    fn interleaved_renditions_are_tracked_independently() {
        let mut tracker = SegmentTracker::new(
            &plan(&[("1920:1080", "5000k"), ("640:360", "1000k")]),
            "/out",
        );

        assert!(tracker.on_segment_opened("1080", 0).is_empty());
        assert!(tracker.on_segment_opened("360", 0).is_empty());
        assert!(tracker.on_segment_opened("360", 1).len() == 1);
        assert_eq!(tracker.on_segment_opened("1080", 1), vec![segment("1080", 0)]);
        assert_eq!(tracker.cursor("360").unwrap().last_opened, Some(1));
    }

    #[test]
    fn flush_skips_renditions_without_segments_and_runs_once() {
        let mut tracker = SegmentTracker::new(
            &plan(&[("1920:1080", "5000k"), ("640:360", "1000k")]),
            "/out",
        );
        tracker.on_segment_opened("360", 0);

        let facts = tracker.flush();
        assert_eq!(facts, vec![segment("360", 0), manifest("360")]);
        assert!(tracker.is_flushed());
        assert!(tracker.flush().is_empty());
        assert!(tracker.on_segment_opened("360", 1).is_empty());
    }

    #[test]
    fn unknown_rendition_and_regressing_index_are_ignored() {
        let mut tracker = SegmentTracker::new(&plan(&[("640:360", "1000k")]), "/out");

        assert!(tracker.on_segment_opened("480", 0).is_empty());
        tracker.on_segment_opened("360", 3);
        assert!(tracker.on_segment_opened("360", 3).is_empty());
        assert!(tracker.on_segment_opened("360", 1).is_empty());
        assert_eq!(tracker.cursor("360").unwrap().last_opened, Some(3));
        assert!(tracker.cursor("480").is_none());
    }

    #[test]
    fn stat_policy_holds_segments_until_written() {
        let dir = tempfile::tempdir().unwrap();
        let mut tracker = SegmentTracker::with_policy(
            &plan(&[("640:360", "1000k")]),
            dir.path(),
            Box::new(StatConfirmed),
        );

        tracker.on_segment_opened("360", 0);
        // 360p_000.ts does not exist yet
        assert!(tracker.on_segment_opened("360", 1).is_empty());

        std::fs::write(dir.path().join("360p_000.ts"), b"ts").unwrap();
        std::fs::write(dir.path().join("360p_001.ts"), b"ts").unwrap();
        let facts = tracker.on_segment_opened("360", 2);
        let indices: Vec<u32> = facts
            .iter()
            .filter_map(|f| match f {
                PublishFact::Segment(s) => Some(s.segment_index),
                _ => None,
            })
            .collect();
        assert_eq!(indices, vec![0, 1]);
    }

    #[test]
    fn stat_policy_releases_unconfirmed_segments_at_flush() {
        let dir = tempfile::tempdir().unwrap();
        let mut tracker = SegmentTracker::with_policy(
            &plan(&[("640:360", "1000k")]),
            dir.path(),
            Box::new(StatConfirmed),
        );

        tracker.on_segment_opened("360", 0);
        tracker.on_segment_opened("360", 1);
        let names: Vec<String> = tracker.flush().iter().map(|f| f.published_name()).collect();
        assert_eq!(names, vec!["360p_000.ts", "360p_001.ts", "360p.m3u8"]);
    }

    #[test]
    fn published_name_is_bare_file_name() {
        assert_eq!(segment("720", 4).published_name(), "720p_004.ts");
        assert_eq!(manifest("720").published_name(), "720p.m3u8");
        assert_eq!(manifest("720").rendition_label(), "720");
    }
}
