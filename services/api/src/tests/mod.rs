//! In-memory stand-ins for the ports, shared by the unit tests, and the
//! router-level tests that run on top of them.

pub mod fakes;
