//! Render-side audio graph
//!
//! - [`Renderer`]: owns the source slot, equalizer, sound field and master gain
//! - [`command`]: lock-free queues between control threads and the renderer
//! - [`NodeHandle`]: scoped ownership of a connected source
//! - [`gc_handle`]: deferred deallocation for values dropped while rendering

pub mod clock;
pub mod command;
pub mod gc;
pub mod node;
pub mod renderer;

pub use clock::RenderClock;
pub use command::{command_channel, event_channel, CommandSender, GraphCommand, RenderEvent};
pub use gc::gc_handle;
pub use node::{NodeHandle, NodeId};
pub use renderer::{Renderer, RendererSettings};
