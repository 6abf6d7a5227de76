use std::collections::HashMap;

use crate::models::export::RecordId;

/// Order-preserving map from source track identities to dense ids `1..=K`.
///
/// Built once per sequence, the first identity seen gets 1.
#[derive(Debug, Clone, Default)]
pub struct TrackIdTable {
    ids:   HashMap<RecordId, u32>,
    order: Vec<RecordId>,
}

impl TrackIdTable {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn id_for(&mut self, source: &RecordId) -> u32 {
        if let Some(id) = self.ids.get(source) {
            return *id;
        }
        self.order.push(source.clone());
        let id = self.order.len() as u32;
        self.ids.insert(source.clone(), id);
        id
    }

    /// Source identity behind a dense id.
    #[inline]
    pub fn source_of(&self, id: u32) -> Option<&RecordId> {
        id.checked_sub(1).and_then(|index| self.order.get(index as usize))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
