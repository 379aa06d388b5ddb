//! End-to-end tests over loopback sockets

mod registry_tests;
mod shutdown_tests;
