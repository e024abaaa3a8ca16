// Shared components
pub mod config;
pub mod error;
pub mod validation;

// Domain layer
pub mod notification;
pub mod provider;

// Application layer
pub mod api;
pub mod server;

// Supporting modules
pub mod telemetry;
