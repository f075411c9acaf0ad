//! Afta Core - Shared service infrastructure for the Afta platform
//!
//! This crate provides:
//! - Standard service trait all Afta services implement
//! - Error handling utilities
//! - Configuration management

pub mod config;
pub mod error;
pub mod service;

pub use config::ServiceConfig;
pub use error::{AftaError, Result};
pub use service::{AftaService, DependencyStatus, HealthStatus, ReadinessStatus, ServiceRuntime};
