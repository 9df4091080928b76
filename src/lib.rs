pub mod aggregator;
pub mod app;
pub mod catalog;
pub mod config;
pub mod embed;
pub mod pager;
