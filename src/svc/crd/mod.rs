//! # Custom resource definition module
//!
//! This module provide custom resources and their definitions
pub mod managed_kafka;
