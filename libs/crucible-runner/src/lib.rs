//! Compile-and-run core: turns `{ code, tests }` into an `ExecutionResult`.
//!
//! Request flow: workspace → harness → engine (compile, execute) → evaluator,
//! driven by [`executor::Executor`].

pub mod engine;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod harness;
pub mod workspace;


pub use engine::{Invoker, ProcessOutput, RustcInvoker};
pub use error::{Outcome, RunError};
pub use executor::{Executor, RunReport};
