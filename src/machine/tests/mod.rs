//! Tests for the provisioning state machine.

mod bootstrap;
