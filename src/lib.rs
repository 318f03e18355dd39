//! scenecast: option normalization, layered configuration and scene dispatch
//! in front of an external animation engine.

pub mod actions;
pub mod backend;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod executables;
pub mod logging;
pub mod options;
pub mod script;
pub mod selector;
