pub mod config;
pub mod db;
pub mod forge;
pub mod manifest;
pub mod model;
pub mod reconciler;
pub mod watcher;
