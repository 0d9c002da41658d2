//! Shell-specific extensions built on the core driver.
//!
//! Each dialect is a small bundle of hooks, an optional [`crate::session::SetupHook`]
//! override, and an optional [`crate::session::ExitCodeProbe`] override, composed onto
//! a plain [`crate::session::Session`] rather than a subclass of it.

pub mod device;
pub mod transfer;
