pub mod alert;
pub mod endpoint;
pub mod health;
pub mod session;
pub mod workflow;

pub use alert::{Alert, AlertSeverity};
pub use endpoint::{Endpoint, Protocol};
pub use health::{HealthRecord, HealthStatus, HealthSummary};
pub use session::{ExecutionSession, SessionStatus, StepOutcome, StepResult};
pub use workflow::{EngineRole, WorkflowDefinition, WorkflowStep};
