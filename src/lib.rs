pub mod catalog;
pub mod config;
pub mod engine;
pub mod geometry;
pub mod mode;
pub mod paths;
pub mod policy;
pub mod random;
pub mod resources;
pub mod scheduler;
pub mod settings;
pub mod store;
