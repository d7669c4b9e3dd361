pub mod auth_layer;

pub use auth_layer::ScopeAuthLayer;
