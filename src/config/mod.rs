pub mod schema;
pub mod services;

pub use schema::{
    Config, GatewayConfig, KnowledgeConfig, MemoryConfig, OracleConfig, RemoteConfig, RemoteKind,
    WorkflowConfig,
};
pub use services::{ServiceDefinition, ServiceRegistry, SharedRegistry, default_services};
