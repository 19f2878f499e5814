//! Scenario tests for the request pipeline and session operations
//!
//! These drive whole flows through the scripted mock transport, where routes
//! can be held open to force concurrent callers into a known interleaving.

pub mod support;
