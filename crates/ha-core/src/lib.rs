//! Core types for Home Assistant
//!
//! This crate provides the value types shared by the hub runtime and the
//! integrations built on top of it: Context, ServiceCall, Platform and
//! DeviceInfo.

mod context;
mod device;
mod platform;
mod service_call;

pub use context::Context;
pub use device::{DeviceIdentifier, DeviceInfo};
pub use platform::{Platform, PlatformParseError};
pub use service_call::{ServiceCall, SupportsResponse};

/// State value used when an entity has not reported anything yet
pub const STATE_UNKNOWN: &str = "unknown";

/// State value used for entities that are not available
pub const STATE_UNAVAILABLE: &str = "unavailable";
