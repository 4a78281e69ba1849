pub mod app;
pub mod cli;
pub mod config;
pub mod highlight;
pub mod search;
pub mod storage;
pub mod ui;
pub mod view;

pub use config::{AppConfig, ConfigLoader, ConfigPaths};
pub use storage::{Card, CardStore, Category, EditableField};
