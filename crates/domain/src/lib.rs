pub mod backend;
pub mod entities;
pub mod events;
pub mod repositories;

pub use backend::*;
pub use entities::*;
pub use events::*;
pub use jobs_core::{JobsError, JobsResult};
pub use repositories::*;
