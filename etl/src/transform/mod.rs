//! Transformation module.
//!
//! - Steps: cleanup, price, dates and amenities, each a pure function over a
//!   [`Dataset`](crate::models::Dataset) returning a [`StepOutcome`]
//! - Pipeline: runs the steps in order and keeps the report

pub mod amenities;
pub mod cleanup;
pub mod dates;
pub mod pipeline;
pub mod price;
pub mod step;

pub use pipeline::{Report, TransformPipeline};
pub use step::{steps_description, Diagnostic, Step, StepOutcome, StepStatus};
