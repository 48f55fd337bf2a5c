//! Behavioural suites for the dispatch engine and daemon bootstrap.

mod support;
