//! End-to-end runs over in-memory source trees.

mod common;
mod errors_tests;
mod genrule_tests;
mod install_tests;
mod missing_deps_tests;
mod variants_tests;
