//! Presence scenario tests

mod lifecycle_tests;
mod sweeper_tests;
