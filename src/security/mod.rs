pub mod policy;

pub use policy::{CommandVerdict, PlanVerdict, SecurityPolicy, plan_commands};
