pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod jobs;
pub mod join;
pub mod membership;
pub mod model;
pub mod progress;
pub mod provider;
pub mod query;
pub mod reconcile;
pub mod registry;
pub mod report;
pub mod search;
pub mod settings;
pub mod tables;
