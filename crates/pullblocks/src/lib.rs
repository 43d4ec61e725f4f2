//! Standard block library
//!
//! The for-each control-flow block plus a handful of general-purpose blocks.

mod debug;
mod foreach;
mod state;
mod transform;

pub use debug::{LogMessageBlock, LOG_MESSAGE_TYPE};
pub use foreach::{ForEachBlock, FOREACH_TYPE, LOOP_OUTCOME};
pub use state::{ReturnValueBlock, SetStateBlock, RETURN_VALUE_TYPE, SET_STATE_TYPE};
pub use transform::{ParseJsonBlock, PARSE_JSON_TYPE};
use pullruntime::BlockRegistry;

use std::sync::Arc;

/// Register all standard blocks with a registry
pub fn register_all(registry: &mut BlockRegistry) {
    registry.register(Arc::new(foreach::ForEachBlockFactory));
    registry.register(Arc::new(debug::LogMessageBlockFactory));
    registry.register(Arc::new(state::SetStateBlockFactory));
    registry.register(Arc::new(state::ReturnValueBlockFactory));
    registry.register(Arc::new(transform::ParseJsonBlockFactory));
}
