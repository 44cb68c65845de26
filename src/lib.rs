pub mod app;
pub mod backend;
pub mod cli;
pub mod config;
pub mod flow;
pub mod guard;
pub mod http;
pub mod interceptor;
pub mod navigator;
pub mod notify;
pub mod orchestrator;
pub mod paths;
pub mod policy;
pub mod predicate;
pub mod role;
pub mod screens;
#[cfg(test)]
pub mod test_support;
pub mod vault;
