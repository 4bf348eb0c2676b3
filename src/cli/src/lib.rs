//! ocibake CLI - reproducible OCI image assembly from build plans.

pub mod commands;
pub mod output;
