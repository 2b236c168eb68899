pub mod executor;
pub mod retry;

pub use executor::{PipelineExecutor, PipelineRequest};
pub use retry::RetryPolicy;
