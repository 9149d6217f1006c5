//! Question-answering workflow: route, gather evidence, query, synthesize,
//! validate, and repair within a fixed budget.
//!
//! The state machine lives in [`run`]; the free-text decisions it makes are
//! pure functions in [`routing`] so they can be tested without a model.
mod batch;
mod routing;
mod run;
mod state;

pub use batch::run_batch;
pub use run::Workflow;
