//! Per-connection handler pipeline.
//!
//! # Data Flow
//! ```text
//! Connection task
//!     → chain.rs (ordered, named handler entries)
//!     → handler.rs (on_event / on_error callbacks)
//!     → context.rs (forward to the next entry, mutate the chain)
//!     → stage.rs (staged insertions, committed in one step)
//!
//! Events travel head → tail. Errors travel from the failing handler
//! towards the tail; an error nobody consumes closes the connection.
//! ```
//!
//! # Design Decisions
//! - One pipeline per connection, driven by exactly one task (`&mut` dispatch)
//! - A running handler is taken out of its slot, so it may remove itself
//! - Handlers are located by name, identity or concrete type

pub mod chain;
pub mod context;
pub mod error;
pub mod event;
pub mod handler;
pub mod stage;

pub use chain::{HandlerId, Pipeline};
pub use context::HandlerContext;
pub use error::PipelineError;
pub use event::{Event, HandshakeCompletion};
pub use handler::Handler;
pub use stage::PipelineStage;
