//! Per-invocation memoization of node facts.

use std::collections::HashMap;

use typesynth_core::id::NodeId;

/// What the classifier knows about a node independent of instantiation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeFacts {
    /// Copying a value needs more than assignment, whatever the type
    /// arguments are.
    pub deep: bool,
    /// Per type parameter: whether it is reached in a copied position.
    pub live: Vec<bool>,
}

impl NodeFacts {
    pub fn plain(params: usize) -> Self {
        NodeFacts {
            deep: false,
            live: vec![false; params],
        }
    }

    pub fn is_live(&self, index: usize) -> bool {
        self.live.get(index).copied().unwrap_or(false)
    }
}

/// Facts per node, filled bottom-up in synthesis order and dropped with the
/// classifier that owns it.
#[derive(Debug, Default)]
pub struct ClassificationCache {
    facts: HashMap<NodeId, NodeFacts>,
}

impl ClassificationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: NodeId) -> Option<&NodeFacts> {
        self.facts.get(&id)
    }

    /// Stores `facts`; returns `true` if they differ from what was stored.
    pub fn update(&mut self, id: NodeId, facts: NodeFacts) -> bool {
        match self.facts.get(&id) {
            Some(existing) if *existing == facts => false,
            _ => {
                self.facts.insert(id, facts);
                true
            }
        }
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_reports_changes() {
        let mut cache = ClassificationCache::new();
        assert!(cache.update(NodeId(0), NodeFacts::plain(1)));
        assert!(!cache.update(NodeId(0), NodeFacts::plain(1)));
        assert!(cache.update(
            NodeId(0),
            NodeFacts {
                deep: false,
                live: vec![true]
            }
        ));
        assert!(cache.get(NodeId(0)).unwrap().is_live(0));
        assert!(!cache.get(NodeId(0)).unwrap().is_live(5));
    }
}
