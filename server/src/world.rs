use std::collections::HashMap;

/// The shared block map: every explicitly placed or removed block, keyed by
/// world coordinate. Grows for the life of the process; there is no
/// generated terrain and no eviction.
#[derive(Debug, Clone, Default)]
pub struct World {
    blocks: HashMap<(i32, i32, i32), i32>,
}

impl World {
    pub fn new() -> Self {
        Self {
            blocks: HashMap::new(),
        }
    }

    /// Applies one block mutation. A type of 0 removes any block at the
    /// coordinate (removing an absent block is a no-op); any other type
    /// overwrites unconditionally; the last write wins.
    pub fn apply(&mut self, x: i32, y: i32, z: i32, w: i32) {
        if w == 0 {
            self.blocks.remove(&(x, y, z));
        } else {
            self.blocks.insert((x, y, z), w);
        }
    }

    pub fn get(&self, x: i32, y: i32, z: i32) -> Option<i32> {
        self.blocks.get(&(x, y, z)).copied()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}
