pub type IndexType = u16;

#[cfg(feature = "compiler")]
pub mod compiler;
#[cfg(feature = "compiler")]
pub mod model;

mod core;
mod events;
mod graph_definition;
mod variation;

pub use crate::core::*;
pub use crate::events::*;
pub use crate::graph_definition::*;
pub use crate::variation::*;

pub use anyhow;
pub use serde;
pub use serde_derive;
pub use serde_json;
#[cfg(feature = "compiler")]
pub use uuid;
