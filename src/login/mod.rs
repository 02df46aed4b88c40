//! Login core: identity resolution and the URL layout of the login routes

pub mod context;
pub mod resolver;

pub use context::LoginContext;
pub use resolver::AccountResolver;
