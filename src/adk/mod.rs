// SPDX-License-Identifier: MIT

//! LLM toolkit: model clients, prompt chains and output coercion

pub mod chain;
pub mod coerce;
pub mod error;
pub mod model;
