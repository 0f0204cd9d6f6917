//! The Sibyl turn engine.
//!
//! Ties the catalog, session stores and handler registry together into a
//! single entry point: [`Engine::handle_message`] takes one inbound message
//! and produces one reply, running the whole turn pipeline — per-user
//! locking, session expiry, token resolution, flow advancement, dispatch
//! with dedup, and the versioned session save.

pub mod bootstrap;
pub mod cancel;
pub mod cli;
pub mod dispatch;
pub mod engine;
pub mod flow;
pub mod handler;
pub mod handlers;
pub mod invocations;
pub mod resolver;
pub mod state;
pub mod user_lock;

pub use cancel::CancelToken;
pub use dispatch::{DispatchOutcome, Dispatcher};
pub use engine::Engine;
pub use handler::{ActionHandler, ActionInput, HandlerContext, HandlerOutput, HandlerRegistry};
pub use invocations::{InvocationLog, InvocationRepository, InvocationStatus, ServiceInvocation};
pub use state::AppState;
