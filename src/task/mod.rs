// src/task/mod.rs

//! What a task *is*: descriptor, retry policy and the work capability.
//!
//! - [`descriptor`] holds the immutable [`TaskDescriptor`].
//! - [`retry`] holds [`RetryPolicy`] and backoff computation.
//! - [`work`] defines the [`Work`] trait every executable unit implements.

pub mod descriptor;
pub mod retry;
pub mod work;

pub use descriptor::TaskDescriptor;
pub use retry::RetryPolicy;
pub use work::{ErrorKind, FnWork, Work, WorkContext, WorkError, WorkFuture, WorkOutput, work_fn};
