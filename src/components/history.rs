use std::collections::VecDeque;

use crate::canvas::{PixRect, PixelBuffer};
use crate::ops::transform::Snapshot;
use crate::selection::Region;

// ============================================================================
// HISTORY RECORDS: plain data, replayed by the gesture controller
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApplyDirection {
    Undo,
    Redo,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegionChangeKind {
    Create,
    Add,
    Subtract,
    Intersect,
    Invert,
    Clear,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransformChangeKind {
    /// Position or pivot edits; snapshots carry no pixels.
    Move,
    Scale,
    Rotate,
    Flip,
}

/// How a pixel patch changes the floating state alongside the layer bytes.
#[derive(Clone, Debug, PartialEq)]
pub enum FloatTransition {
    /// Plain layer edit (e.g. deleting selected pixels while armed).
    None,
    /// Pixels were lifted into a floating buffer. `snapshot` is the state just
    /// after the lift, `region` the selection at lift time.
    Lift { snapshot: Snapshot, region: Region },
    /// The floating buffer was blitted back. `snapshot` is the floating state
    /// just before.
    Commit {
        snapshot: Snapshot,
        region_before: Region,
        region_after: Region,
    },
    /// The floating buffer was thrown away (delete while floating).
    Discard { snapshot: Snapshot, region_before: Region },
}

#[derive(Clone, Debug, PartialEq)]
pub enum HistoryRecord {
    RegionChange {
        kind: RegionChangeKind,
        before: Region,
        after: Region,
    },
    TransformChange {
        kind: TransformChangeKind,
        before: Snapshot,
        after: Snapshot,
    },
    /// `before` / `after` hold the layer bytes of `rect` (may be empty).
    PixelPatch {
        layer_index: usize,
        rect: PixRect,
        before: PixelBuffer,
        after: PixelBuffer,
        transition: FloatTransition,
    },
}

impl HistoryRecord {
    pub fn description(&self) -> String {
        match self {
            HistoryRecord::RegionChange { kind, .. } => match kind {
                RegionChangeKind::Create => "Select",
                RegionChangeKind::Add => "Add to Selection",
                RegionChangeKind::Subtract => "Subtract from Selection",
                RegionChangeKind::Intersect => "Intersect Selection",
                RegionChangeKind::Invert => "Invert Selection",
                RegionChangeKind::Clear => "Deselect",
            }
            .to_string(),
            HistoryRecord::TransformChange { kind, .. } => match kind {
                TransformChangeKind::Move => "Move Selection",
                TransformChangeKind::Scale => "Scale Selection",
                TransformChangeKind::Rotate => "Rotate Selection",
                TransformChangeKind::Flip => "Flip Selection",
            }
            .to_string(),
            HistoryRecord::PixelPatch { transition, .. } => match transition {
                FloatTransition::None => "Delete Pixels",
                FloatTransition::Lift { .. } => "Lift Selection",
                FloatTransition::Commit { .. } => "Commit Selection",
                FloatTransition::Discard { .. } => "Delete Selection",
            }
            .to_string(),
        }
    }

    /// Approximate bytes held by this record.
    pub fn memory_size(&self) -> usize {
        let mask = |r: &Region| r.width() as usize * r.height() as usize;
        match self {
            HistoryRecord::RegionChange { before, after, .. } => mask(before) + mask(after),
            HistoryRecord::TransformChange { before, after, .. } => before.memory_size() + after.memory_size(),
            HistoryRecord::PixelPatch { before, after, transition, .. } => {
                let extra = match transition {
                    FloatTransition::None => 0,
                    FloatTransition::Lift { snapshot, region } => snapshot.memory_size() + mask(region),
                    FloatTransition::Commit { snapshot, region_before, region_after } => {
                        snapshot.memory_size() + mask(region_before) + mask(region_after)
                    }
                    FloatTransition::Discard { snapshot, region_before } => {
                        snapshot.memory_size() + mask(region_before)
                    }
                };
                before.memory_bytes() + after.memory_bytes() + extra
            }
        }
    }

    pub fn is_lift(&self) -> bool {
        matches!(
            self,
            HistoryRecord::PixelPatch { transition: FloatTransition::Lift { .. }, .. }
        )
    }
}

// ============================================================================
// HISTORY MANAGER
// ============================================================================

/// A record plus the serial it was pushed under.
#[derive(Clone, Debug)]
pub struct HistoryEntry {
    pub serial: u64,
    pub record: HistoryRecord,
    size: usize,
}

pub struct HistoryManager {
    undo_stack: VecDeque<HistoryEntry>,
    redo_stack: VecDeque<HistoryEntry>,
    max_history_size: usize,
    /// Optional memory cap in bytes.
    max_memory_bytes: Option<usize>,
    /// Running memory total across both stacks.
    total_memory: usize,
    next_serial: u64,
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new(50)
    }
}

impl HistoryManager {
    pub fn new(max_history_size: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: VecDeque::new(),
            max_history_size: max_history_size.max(1),
            max_memory_bytes: Some(100 * 1024 * 1024), // 100 MB default limit
            total_memory: 0,
            next_serial: 1,
        }
    }

    pub fn with_memory_limit(mut self, max_bytes: Option<usize>) -> Self {
        self.max_memory_bytes = max_bytes;
        self.prune();
        self
    }

    /// Push a new record, dropping the redo stack. Returns its serial.
    pub fn push(&mut self, record: HistoryRecord) -> u64 {
        // Clear redo stack when a new action is performed
        for entry in self.redo_stack.drain(..) {
            self.total_memory = self.total_memory.saturating_sub(entry.size);
        }

        let serial = self.next_serial;
        self.next_serial += 1;
        let size = record.memory_size();
        self.total_memory += size;
        self.undo_stack.push_back(HistoryEntry { serial, record, size });

        self.prune();
        serial
    }

    /// Move the newest record to the redo stack and hand it out for replay.
    pub fn undo(&mut self) -> Option<&HistoryEntry> {
        let entry = self.undo_stack.pop_back()?;
        self.redo_stack.push_back(entry);
        self.redo_stack.back()
    }

    pub fn redo(&mut self) -> Option<&HistoryEntry> {
        let entry = self.redo_stack.pop_back()?;
        self.undo_stack.push_back(entry);
        self.undo_stack.back()
    }

    /// Drop every undo record with `serial >= from` and the whole redo stack
    /// without replaying anything.
    pub fn discard_from(&mut self, from: u64) -> usize {
        let mut dropped = 0;
        while self.undo_stack.back().is_some_and(|e| e.serial >= from) {
            if let Some(entry) = self.undo_stack.pop_back() {
                self.total_memory = self.total_memory.saturating_sub(entry.size);
                dropped += 1;
            }
        }
        for entry in self.redo_stack.drain(..) {
            self.total_memory = self.total_memory.saturating_sub(entry.size);
        }
        dropped
    }

    /// Newest undoable lift, if it has not been pruned.
    pub fn last_lift(&self) -> Option<&HistoryEntry> {
        self.undo_stack.iter().rev().find(|e| e.record.is_lift())
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_description(&self) -> Option<String> {
        self.undo_stack.back().map(|e| e.record.description())
    }

    pub fn redo_description(&self) -> Option<String> {
        self.redo_stack.back().map(|e| e.record.description())
    }

    /// Get all undo descriptions (most recent first)
    pub fn undo_history(&self) -> Vec<String> {
        self.undo_stack.iter().rev().map(|e| e.record.description()).collect()
    }

    pub fn memory_usage(&self) -> usize {
        self.total_memory
    }

    fn prune(&mut self) {
        while self.undo_stack.len() > self.max_history_size {
            if let Some(removed) = self.undo_stack.pop_front() {
                self.total_memory = self.total_memory.saturating_sub(removed.size);
            }
        }

        if let Some(max_bytes) = self.max_memory_bytes {
            while self.total_memory > max_bytes && self.undo_stack.len() > 1 {
                if let Some(removed) = self.undo_stack.pop_front() {
                    self.total_memory = self.total_memory.saturating_sub(removed.size);
                }
            }
        }
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.total_memory = 0;
    }

    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region_record(kind: RegionChangeKind) -> HistoryRecord {
        HistoryRecord::RegionChange { kind, before: Region::new(4, 4), after: Region::new(4, 4) }
    }

    fn patch(bytes: u32) -> HistoryRecord {
        HistoryRecord::PixelPatch {
            layer_index: 0,
            rect: PixRect::new(0, 0, bytes, 1),
            before: PixelBuffer::new(bytes, 1),
            after: PixelBuffer::new(bytes, 1),
            transition: FloatTransition::None,
        }
    }

    #[test]
    fn undo_redo_moves_between_stacks() {
        let mut h = HistoryManager::new(10);
        let a = h.push(region_record(RegionChangeKind::Create));
        let b = h.push(region_record(RegionChangeKind::Add));
        assert!(b > a);
        assert_eq!(h.undo().map(|e| e.serial), Some(b));
        assert_eq!(h.redo_description().as_deref(), Some("Add to Selection"));
        assert_eq!(h.redo().map(|e| e.serial), Some(b));
        assert_eq!(h.undo_count(), 2);
        assert!(!h.can_redo());
    }

    #[test]
    fn push_clears_redo() {
        let mut h = HistoryManager::new(10);
        h.push(region_record(RegionChangeKind::Create));
        h.undo();
        h.push(region_record(RegionChangeKind::Clear));
        assert!(!h.can_redo());
        assert_eq!(h.undo_history(), vec!["Deselect".to_string()]);
    }

    #[test]
    fn prunes_by_count_and_memory() {
        let mut h = HistoryManager::new(2);
        for _ in 0..5 {
            h.push(region_record(RegionChangeKind::Create));
        }
        assert_eq!(h.undo_count(), 2);

        let mut h = HistoryManager::new(100).with_memory_limit(Some(100));
        h.push(patch(8)); // 64 bytes
        h.push(patch(8));
        assert_eq!(h.undo_count(), 1);
        assert_eq!(h.memory_usage(), 64);
    }

    #[test]
    fn discard_from_drops_without_replay() {
        let mut h = HistoryManager::new(10);
        h.push(region_record(RegionChangeKind::Create));
        let lift = h.push(patch(1));
        h.push(region_record(RegionChangeKind::Add));
        assert_eq!(h.discard_from(lift), 2);
        assert_eq!(h.undo_count(), 1);
        assert_eq!(h.memory_usage(), 32);
    }
}
