//! The marker-driven resource pipeline.
//!
//! A resource moves through a fixed sequence of steps, each stamped by a
//! sentinel marker file in its working directory. [`ResourceProcessor`]
//! executes a single step; [`Dispatcher`] exposes the hosted request/response
//! entry point over the same machinery.

pub mod dispatcher;
pub mod processor;
pub mod step;

pub use dispatcher::{DispatchStatus, Dispatcher, DispatcherConfig, StepRequest, StepResponse};
pub use processor::{
    BatchReport, ExecutionRecord, ProcessorConfig, ResourceProcessor, RunStatus,
};
pub use step::{Step, StepDefinition};
