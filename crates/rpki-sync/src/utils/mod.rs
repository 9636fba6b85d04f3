//! 工具模块

pub mod task;

pub use task::spawn_logged;
