//! Integration tests driving the `brick` binary against temporary projects.

mod build_tests;
mod common;
mod targets_tests;
#[cfg(unix)]
mod test_tests;
