pub mod confirm;
pub mod health;
pub mod ratelimit;
pub mod registry;
pub mod sanitize;
pub mod schema;
pub mod types;

pub use confirm::{ConfirmationManager, PendingAction};
pub use health::{HealthTracker, SkillStatus};
pub use ratelimit::{RateDecision, RateLimiter, RatePolicy};
pub use registry::{ExecutionContext, SkillRegistry, ToolExecution, ToolFilter};
pub use types::{Skill, SkillContext, SkillKind};
