// SPDX-License-Identifier: MIT

pub mod config;
pub mod extract;
pub mod nodes;
pub mod prompts;
pub mod records;
pub mod server;
pub mod service;
pub mod workflow;
