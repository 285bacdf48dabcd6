//! Application layer: the role-agnostic use-case state machines.

pub mod apply_input;
pub mod forward_input;
pub mod service;
