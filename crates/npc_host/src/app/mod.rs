mod bootstrap;
mod input;
mod loop_runner;
mod metrics;
mod overlay;
mod scenario;

pub(crate) use bootstrap::build_app;
pub(crate) use loop_runner::run;
