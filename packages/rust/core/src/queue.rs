//! Ordered upload queue. Queue order is output page order.

use everythingpdf_shared::{EverythingPdfError, InputKind, Result};

use crate::classify::QueuedInput;

/// Ordered, mutable sequence of classified inputs.
#[derive(Debug, Clone, Default)]
pub struct Queue {
    items: Vec<QueuedInput>,
}

/// Immutable point-in-time copy of the queue, used by builds.
#[derive(Debug, Clone, Default)]
pub struct QueueSnapshot {
    items: Vec<QueuedInput>,
}

impl Queue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&QueuedInput> {
        self.items.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueuedInput> {
        self.items.iter()
    }

    /// Append items at the end, preserving their order.
    pub fn append(&mut self, items: impl IntoIterator<Item = QueuedInput>) {
        self.items.extend(items);
    }

    /// Remove and return the item at `index`.
    pub fn remove_at(&mut self, index: usize) -> Result<QueuedInput> {
        self.check_index(index)?;
        Ok(self.items.remove(index))
    }

    /// Move the item at `from` to position `to`; all other items keep their
    /// relative order.
    pub fn move_item(&mut self, from: usize, to: usize) -> Result<()> {
        self.check_index(from)?;
        self.check_index(to)?;
        if from == to {
            return Ok(());
        }
        let item = self.items.remove(from);
        self.items.insert(to, item);
        Ok(())
    }

    /// Keep only the first `max_len` items; returns what was dropped.
    pub fn truncate(&mut self, max_len: usize) -> Vec<QueuedInput> {
        if self.items.len() <= max_len {
            return Vec::new();
        }
        self.items.split_off(max_len)
    }

    /// Empty the queue.
    pub fn reset(&mut self) {
        self.items.clear();
    }

    /// Copy the current contents.
    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            items: self.items.clone(),
        }
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.items.len() {
            return Err(EverythingPdfError::IndexOutOfRange {
                index,
                len: self.items.len(),
            });
        }
        Ok(())
    }
}

impl QueueSnapshot {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueuedInput> {
        self.items.iter()
    }

    pub fn items(&self) -> &[QueuedInput] {
        &self.items
    }

    /// Number of image entries (each contributes exactly one page).
    pub fn image_count(&self) -> usize {
        self.items
            .iter()
            .filter(|i| matches!(i.kind, InputKind::Image(_)))
            .count()
    }

    /// Number of document entries.
    pub fn document_count(&self) -> usize {
        self.items.len() - self.image_count()
    }
}
