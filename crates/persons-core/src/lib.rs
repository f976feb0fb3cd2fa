#![doc = include_str!("../README.md")]

pub mod bulk;
mod common;
pub mod fetch;
pub mod store;
pub mod strategy;

pub use common::*;
