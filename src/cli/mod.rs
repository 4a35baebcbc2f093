pub mod app;
pub mod commands;
pub mod context;
pub mod dispatch;
pub mod env;
pub mod info;
pub mod locate;
pub mod output;
pub mod plan;
pub mod presence;
pub mod runtime;
pub mod strategies;
