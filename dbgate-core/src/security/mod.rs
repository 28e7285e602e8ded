//! Credential handling for project connections.
//!
//! Passwords are held in zeroizing containers from the moment they are read
//! from configuration or the environment until the pool is built.

mod credentials;

pub use credentials::Credentials;
