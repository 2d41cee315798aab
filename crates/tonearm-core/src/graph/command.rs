//! Lock-free command queue between control threads and the renderer
//!
//! Control code pushes [`GraphCommand`]s, the renderer drains them at the
//! start of every render quantum. Anything the renderer has to report back
//! (a source reaching its end) travels the other way as a [`RenderEvent`].
//! Both directions are `rtrb` ring buffers, so neither side ever blocks.

use std::sync::{Arc, Mutex, PoisonError};

use basedrop::Owned;

use super::node::NodeId;
use crate::dsp::Convolver;
use crate::equalizer::NUM_BANDS;
use crate::source::SourceNode;

/// Capacity of the command queue
///
/// A full EQ reset plus a preset change is about a dozen commands, the rest
/// is headroom for bursts while the renderer is not running.
pub const COMMAND_QUEUE_CAPACITY: usize = 256;

/// Capacity of the renderer → control event queue
pub const EVENT_QUEUE_CAPACITY: usize = 64;

/// Commands processed by the renderer at quantum boundaries
pub enum GraphCommand {
    /// Attach a source, replacing any current one
    ///
    /// The node is `Owned` so the renderer can drop it without freeing memory.
    ConnectSource {
        id: NodeId,
        node: Owned<SourceNode>,
    },
    /// Detach a source; ignored if `id` is no longer connected
    DisconnectSource { id: NodeId },
    /// Set one equalizer band (dB)
    SetBandGain { index: usize, gain_db: f32 },
    /// Set every equalizer band at once (dB)
    SetAllBandGains([f32; NUM_BANDS]),
    /// Start ramping the sound field towards new mix gains
    SetSoundFieldGains { wet: f32, dry: f32 },
    /// Swap the sound field convolver
    SetConvolver(Owned<Convolver>),
    /// Linear output gain
    SetMasterGain(f32),
}

impl std::fmt::Debug for GraphCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConnectSource { id, .. } => write!(f, "ConnectSource({})", id),
            Self::DisconnectSource { id } => write!(f, "DisconnectSource({})", id),
            Self::SetBandGain { index, gain_db } => write!(f, "SetBandGain({}, {})", index, gain_db),
            Self::SetAllBandGains(gains) => write!(f, "SetAllBandGains({:?})", gains),
            Self::SetSoundFieldGains { wet, dry } => write!(f, "SetSoundFieldGains({}, {})", wet, dry),
            Self::SetConvolver(_) => write!(f, "SetConvolver"),
            Self::SetMasterGain(gain) => write!(f, "SetMasterGain({})", gain),
        }
    }
}

/// Notifications from the renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderEvent {
    /// A source rendered its last frame
    SourceEnded { id: NodeId },
}

/// Create the command queue (producer/consumer pair)
pub fn command_channel() -> (CommandSender, rtrb::Consumer<GraphCommand>) {
    let (producer, consumer) = rtrb::RingBuffer::new(COMMAND_QUEUE_CAPACITY);
    (CommandSender::new(producer), consumer)
}

/// Create the event queue (producer/consumer pair)
pub fn event_channel() -> (rtrb::Producer<RenderEvent>, rtrb::Consumer<RenderEvent>) {
    rtrb::RingBuffer::new(EVENT_QUEUE_CAPACITY)
}

/// Cloneable send side of the command queue
///
/// `rtrb` is single-producer. Control-side holders (the player, node handles
/// being dropped) share the producer behind a mutex; the renderer side stays
/// lock-free.
#[derive(Clone)]
pub struct CommandSender {
    producer: Arc<Mutex<rtrb::Producer<GraphCommand>>>,
}

impl CommandSender {
    fn new(producer: rtrb::Producer<GraphCommand>) -> Self {
        Self {
            producer: Arc::new(Mutex::new(producer)),
        }
    }

    /// Queue a command without blocking on the renderer
    ///
    /// Returns `Err(cmd)` if the queue is full.
    pub fn send(&self, cmd: GraphCommand) -> Result<(), GraphCommand> {
        let mut producer = self.producer.lock().unwrap_or_else(PoisonError::into_inner);
        producer.push(cmd).map_err(|e| match e {
            rtrb::PushError::Full(value) => value,
        })
    }

    /// Free slots in the queue
    pub fn slots(&self) -> usize {
        self.producer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .slots()
    }

    /// Whether the renderer has dropped its end of the queue
    pub fn is_closed(&self) -> bool {
        self.producer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_abandoned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_channel_round_trip() {
        let (tx, mut rx) = command_channel();
        tx.send(GraphCommand::SetMasterGain(0.5)).unwrap();
        tx.send(GraphCommand::SetBandGain { index: 3, gain_db: -4.0 }).unwrap();

        assert!(matches!(rx.pop(), Ok(GraphCommand::SetMasterGain(g)) if g == 0.5));
        assert!(matches!(
            rx.pop(),
            Ok(GraphCommand::SetBandGain { index: 3, gain_db }) if gain_db == -4.0
        ));
        assert!(rx.pop().is_err());
    }

    #[test]
    fn test_full_queue_returns_command() {
        let (tx, _rx) = command_channel();
        for _ in 0..COMMAND_QUEUE_CAPACITY {
            tx.send(GraphCommand::SetMasterGain(1.0)).unwrap();
        }
        assert_eq!(tx.slots(), 0);
        let rejected = tx.send(GraphCommand::SetMasterGain(0.25)).unwrap_err();
        assert!(matches!(rejected, GraphCommand::SetMasterGain(g) if g == 0.25));
    }

    #[test]
    fn test_clones_share_one_queue() {
        let (tx, mut rx) = command_channel();
        let other = tx.clone();
        other.send(GraphCommand::SetMasterGain(0.1)).unwrap();
        tx.send(GraphCommand::SetMasterGain(0.2)).unwrap();
        assert!(matches!(rx.pop(), Ok(GraphCommand::SetMasterGain(g)) if g == 0.1));
        assert!(matches!(rx.pop(), Ok(GraphCommand::SetMasterGain(g)) if g == 0.2));
    }

    #[test]
    fn test_closed_after_consumer_drop() {
        let (tx, rx) = command_channel();
        assert!(!tx.is_closed());
        drop(rx);
        assert!(tx.is_closed());
    }
}
