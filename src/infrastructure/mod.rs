//! Infrastructure: API access, templating, queries, subprocesses

pub mod environment;
pub mod jq;
pub mod kubernetes;
pub mod process;
pub mod registry;
pub mod templating;
