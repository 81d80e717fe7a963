//! Unit tests for the channel module.

mod ssh;
mod util;
