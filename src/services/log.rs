//! Stroke log — the authoritative canvas of one room.
//!
//! Append-only except for `clear`, which swaps in an empty sequence.
//! The log is owned by its room actor, so `&mut self` is the only
//! exclusion it needs: appends, clears and snapshots are serialized by
//! the actor's command loop.

use crate::frame::Stroke;

#[derive(Debug, Default)]
pub struct StrokeLog {
    strokes: Vec<Stroke>,
    /// Count of operations applied since creation. Never reset.
    seq: u64,
}

impl StrokeLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Point-in-time copy of the log, in append order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Stroke> {
        self.strokes.clone()
    }

    /// Add one stroke at the end. Returns the sequence number of the operation.
    pub fn append(&mut self, stroke: Stroke) -> u64 {
        self.strokes.push(stroke);
        self.bump()
    }

    /// Replace the log with the empty sequence. Returns the sequence number of the operation.
    pub fn clear(&mut self) -> u64 {
        self.strokes = Vec::new();
        self.bump()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.strokes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strokes.is_empty()
    }

    fn bump(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Point, Tool};

    fn stroke(color: &str) -> Stroke {
        Stroke {
            points: vec![Point { x: 0.0, y: 0.0 }, Point { x: 10.0, y: 10.0 }],
            color: color.into(),
            size: 2.0,
            tool: Tool::Pen,
        }
    }

    #[test]
    fn new_log_is_empty() {
        let log = StrokeLog::new();
        assert!(log.is_empty());
        assert!(log.snapshot().is_empty());
    }

    #[test]
    fn snapshot_preserves_append_order() {
        let mut log = StrokeLog::new();
        for color in ["#111", "#222", "#333"] {
            log.append(stroke(color));
        }
        let colors: Vec<String> = log.snapshot().into_iter().map(|s| s.color).collect();
        assert_eq!(colors, ["#111", "#222", "#333"]);
    }

    #[test]
    fn clear_empties_the_log() {
        let mut log = StrokeLog::new();
        log.append(stroke("#111"));
        log.append(stroke("#222"));
        log.clear();
        assert!(log.snapshot().is_empty());

        log.append(stroke("#333"));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn snapshot_is_detached_from_later_appends() {
        let mut log = StrokeLog::new();
        log.append(stroke("#111"));
        let before = log.snapshot();
        log.append(stroke("#222"));
        assert_eq!(before.len(), 1);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn sequence_numbers_increase_across_clears() {
        let mut log = StrokeLog::new();
        assert_eq!(log.append(stroke("#111")), 1);
        assert_eq!(log.clear(), 2);
        assert_eq!(log.append(stroke("#222")), 3);
    }
}
