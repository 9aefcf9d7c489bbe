pub mod auth_service;
pub mod chat_service;

#[cfg(test)]
pub(crate) mod test_support;

#[cfg(test)]
mod chat_service_tests;

pub use auth_service::{AuthService, AuthServiceDependencies, LoginData};
pub use chat_service::{ChatService, ChatServiceDependencies};
