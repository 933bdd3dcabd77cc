pub mod callback;
pub mod general;
pub mod global;
pub mod queue;
