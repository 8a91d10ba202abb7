//! Configuration for the `multi-chat` demonstration driver.

pub mod config;
