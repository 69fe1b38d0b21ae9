//! Ordering shim between matcher and renderer.
//!
//! The matcher can retract highlight events it already attached when a match
//! attempt breaks later in the stream. The renderer must therefore not see a
//! structural event until no retraction can reach it. The orchestrator pushes
//! every event here and drains only while the matcher reports no uncommitted
//! attempts, so the renderer always reads settled highlight state. Order is
//! preserved exactly.

use std::collections::VecDeque;

use crate::html::NodeEvent;

#[derive(Default)]
pub struct EventBuffer<'a> {
    pending: VecDeque<NodeEvent<'a>>,
}

impl<'a> EventBuffer<'a> {
    pub fn new() -> Self {
        Self {
            pending: VecDeque::new(),
        }
    }

    pub fn push(&mut self, ev: NodeEvent<'a>) {
        self.pending.push_back(ev);
    }

    /// Remove and return all held events, oldest first.
    pub fn flush(&mut self) -> impl Iterator<Item = NodeEvent<'a>> + '_ {
        self.pending.drain(..)
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flush_preserves_order() {
        let mut buffer = EventBuffer::new();
        buffer.push(NodeEvent::Raw { raw: "a" });
        buffer.push(NodeEvent::Raw { raw: "b" });
        let drained: Vec<_> = buffer
            .flush()
            .map(|ev| match ev {
                NodeEvent::Raw { raw } => raw,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(drained, vec!["a", "b"]);
        assert!(buffer.is_empty());
    }
}
