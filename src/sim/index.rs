//! Nearest-object spatial index
//!
//! A static 2-D kd-tree stored implicitly in a flat vector: every subslice
//! holds its splitting entry at the midpoint, left half below it on the
//! current axis, right half above. There is no insert/remove; the world
//! rebuilds the whole tree whenever positions or membership change.

use glam::Vec2;

/// A point and the payload it stands for
#[derive(Debug, Clone, Copy)]
struct Entry<T> {
    pos: Vec2,
    value: T,
}

/// Result of a nearest-neighbour query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Nearest<T> {
    pub value: T,
    pub distance: f32,
}

/// Rebuildable kd-tree over 2-D points
#[derive(Debug, Clone)]
pub struct SpatialIndex<T> {
    entries: Vec<Entry<T>>,
}

impl<T: Copy> Default for SpatialIndex<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T: Copy> SpatialIndex<T> {
    /// Build a balanced tree from scratch
    pub fn build<I>(points: I) -> Self
    where
        I: IntoIterator<Item = (Vec2, T)>,
    {
        let mut entries: Vec<Entry<T>> = points
            .into_iter()
            .map(|(pos, value)| Entry { pos, value })
            .collect();
        split(&mut entries, 0);
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Nearest entry to `query` and its euclidean distance.
    /// Returns `None` on an empty index.
    pub fn nearest(&self, query: Vec2) -> Option<Nearest<T>> {
        let mut best: Option<(f32, T)> = None;
        search(&self.entries, 0, query, &mut best);
        best.map(|(dist_sq, value)| Nearest {
            value,
            distance: dist_sq.sqrt(),
        })
    }
}

fn split<T>(entries: &mut [Entry<T>], depth: usize) {
    if entries.len() <= 1 {
        return;
    }
    let axis = depth % 2;
    let mid = entries.len() / 2;
    entries.select_nth_unstable_by(mid, |a, b| a.pos[axis].total_cmp(&b.pos[axis]));
    let (left, right) = entries.split_at_mut(mid);
    split(left, depth + 1);
    split(&mut right[1..], depth + 1);
}

fn search<T: Copy>(entries: &[Entry<T>], depth: usize, query: Vec2, best: &mut Option<(f32, T)>) {
    if entries.is_empty() {
        return;
    }
    let mid = entries.len() / 2;
    let node = &entries[mid];

    let dist_sq = node.pos.distance_squared(query);
    if best.is_none_or(|(best_sq, _)| dist_sq < best_sq) {
        *best = Some((dist_sq, node.value));
    }

    let axis = depth % 2;
    let diff = query[axis] - node.pos[axis];
    let (near, far) = if diff < 0.0 {
        (&entries[..mid], &entries[mid + 1..])
    } else {
        (&entries[mid + 1..], &entries[..mid])
    };

    search(near, depth + 1, query, best);
    // Only cross the splitting plane if it is closer than the best so far
    if best.is_none_or(|(best_sq, _)| diff * diff < best_sq) {
        search(far, depth + 1, query, best);
    }
}
