pub mod device;
pub mod dispatcher;
// Private module - allowed by clippy.toml allow-private-module-inception
#[allow(clippy::module_inception)]
mod engine;
pub mod entity;
pub mod event;
pub mod hub;
mod integration;
mod message;
pub mod notification;
pub mod state;

pub use engine::Engine;
pub use engine::EngineError;
pub use event::Event;
pub use hub::Hub;
pub use integration::FromIntegrationSender;
pub use integration::Integration;
pub use integration::IntegrationContext;
pub use integration::IntegrationFactoryResult;
pub use integration::REGISTRY as INTEGRATION_REGISTRY;
pub use message::EntityCommand;
pub use message::FromIntegrationMessage;
pub use message::ToIntegrationMessage;
pub use state::EntityState;
pub use state::State;
