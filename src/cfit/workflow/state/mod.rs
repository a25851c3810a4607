// SPDX-License-Identifier: MIT

//! State management for graph workflows
//!
//! This module provides:
//! - `StateSchema` - declares which keys accumulate and which are replaced
//! - `JobState` - the runtime document with reducer support
//! - `merge` - the shallow union used by accumulating keys

mod schema;
mod store;

pub use schema::{FieldType, ReducerType, StateFieldDef, StateSchema};
pub use store::{merge, JobState};
