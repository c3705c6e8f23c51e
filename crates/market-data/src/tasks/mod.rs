//! Grouping of classified instruments into schedulable tasks.

mod builder;

pub use builder::TaskBuilder;
