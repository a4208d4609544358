//! # Jobs Testing Utils
//!
//! Shared testing utilities for the job scheduling workspace.
//!
//! - **Mock Repositories**: In-memory implementations of the repository traits
//! - **Scriptable Backend Mock**: Execution backend double with controllable
//!   submission failures, cancel outcomes and queued status notifications
//! - **Recording Event Sink**: Captures published run status events
//! - **Test Data Builders**: Fluent construction of jobs and runs
//!
//! Add this crate as a dev-dependency:
//!
//! ```toml
//! [dev-dependencies]
//! jobs-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod helpers;
pub mod mocks;

pub use builders::*;
pub use helpers::*;
pub use mocks::*;
