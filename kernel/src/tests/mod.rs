//! Process Manager Unit Tests
//!
//! Scenario and property tests that drive the manager and scheduler
//! through the same paths the kernel uses.
