//! Shared helpers for unit tests that need local sockets.

pub mod socket_guard;
