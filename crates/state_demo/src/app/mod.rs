pub(crate) mod bootstrap;
pub(crate) mod host;
pub(crate) mod loop_runner;
pub(crate) mod scenario;
