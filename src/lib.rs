#![forbid(unsafe_code)]
#![doc = include_str!("../README.md")]

mod bundle;
mod clean;
mod config;
mod deploy;
mod error;
mod graph;
mod lint;
mod pipeline;
#[cfg(feature = "live")]
mod reload;
#[cfg(feature = "server")]
mod serve;
mod task;
pub mod transform;

pub use crate::bundle::bundle;
pub use crate::clean::clean;
pub use crate::config::{
    AssetPatterns, BuildConfig, Config, DeployConfig, OVERRIDE_FILES, ServeConfig,
};
pub use crate::deploy::upload;
pub use crate::error::*;
pub use crate::graph::{Node, Runnable, leaf, parallel, run, sequence, step};
pub use crate::lint::lint;
pub use crate::pipeline::Pipeline;
#[cfg(feature = "live")]
pub use crate::reload::ReloadServer;
#[cfg(feature = "server")]
pub use crate::serve::{ServeHandle, WatchAction, WatchBinding, serve};
pub use crate::task::{FileUnit, ReloadTx, Stage, Task};
