//! Hub runtime helpers
//!
//! The pieces an integration plugs into: the [`HomeAssistant`] hub object,
//! per-domain shared data, OAuth2 implementations, the entity contract,
//! entity platforms and the device registry.

pub mod data;
pub mod device_registry;
pub mod entity;
pub mod entity_platform;
pub mod error;
pub mod hass;
pub mod integration;
pub mod oauth2;

pub use data::DomainData;
pub use device_registry::{DeviceEntry, DeviceRegistry};
pub use entity::Entity;
pub use entity_platform::{
    slugify, AddEntities, Entities, EntityHandle, EntityPlatform, EntityPlatforms, EntityRef,
};
pub use error::{EntityError, IntegrationError, IntegrationResult, OAuth2Error};
pub use hass::HomeAssistant;
pub use integration::{ConfigType, Integration};
pub use oauth2::{
    LocalOAuth2Implementation, OAuth2Implementations, OAuth2Token, CONF_AUTH_IMPLEMENTATION,
    CONF_TOKEN,
};
