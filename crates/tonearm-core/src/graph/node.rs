//! Source node identity and the control-side handle that owns a connection

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use basedrop::Owned;

use super::command::{CommandSender, GraphCommand};
use super::gc::gc_handle;
use crate::audio::{AudioError, AudioResult};
use crate::source::SourceNode;

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one connected source for its whole lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u64);

impl NodeId {
    pub fn next() -> Self {
        Self(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// A source connected to the renderer
///
/// Dropping the handle disconnects the source. The renderer ignores the
/// disconnect if the source was already replaced or finished on its own.
pub struct NodeHandle {
    id: NodeId,
    sender: CommandSender,
}

impl NodeHandle {
    /// Send `node` to the renderer and return the handle owning it
    pub fn connect(sender: &CommandSender, node: SourceNode) -> AudioResult<Self> {
        let id = NodeId::next();
        let node = Owned::new(&gc_handle(), node);
        sender
            .send(GraphCommand::ConnectSource { id, node })
            .map_err(|_| AudioError::CommandQueueFull)?;
        log::debug!("Connected source {}", id);
        Ok(Self {
            id,
            sender: sender.clone(),
        })
    }

    pub fn id(&self) -> NodeId {
        self.id
    }
}

impl fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeHandle").field("id", &self.id).finish()
    }
}

impl Drop for NodeHandle {
    fn drop(&mut self) {
        if self.sender.is_closed() {
            return;
        }
        if self.sender.send(GraphCommand::DisconnectSource { id: self.id }).is_err() {
            log::warn!("Command queue full, {} stays connected until replaced", self.id);
        } else {
            log::debug!("Disconnected source {}", self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::command::command_channel;
    use crate::source::{BufferPlaybackNode, SourceNode};
    use crate::types::StereoBuffer;
    use std::sync::Arc;

    fn silent_source() -> SourceNode {
        SourceNode::Buffer(BufferPlaybackNode::new(Arc::new(StereoBuffer::silence(16)), 0))
    }

    #[test]
    fn test_ids_are_unique() {
        let a = NodeId::next();
        let b = NodeId::next();
        assert_ne!(a, b);
        assert!(b.raw() > a.raw());
    }

    #[test]
    fn test_connect_then_drop_disconnects() {
        let (tx, mut rx) = command_channel();
        let handle = NodeHandle::connect(&tx, silent_source()).unwrap();
        let id = handle.id();
        drop(handle);

        assert!(matches!(rx.pop(), Ok(GraphCommand::ConnectSource { id: c, .. }) if c == id));
        assert!(matches!(rx.pop(), Ok(GraphCommand::DisconnectSource { id: d }) if d == id));
    }

    #[test]
    fn test_connect_on_full_queue_fails() {
        let (tx, _rx) = command_channel();
        while tx.send(GraphCommand::SetMasterGain(1.0)).is_ok() {}
        let result = NodeHandle::connect(&tx, silent_source());
        assert!(matches!(result, Err(AudioError::CommandQueueFull)));
    }
}
