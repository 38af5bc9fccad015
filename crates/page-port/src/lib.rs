//! Page contract consumed by the layout, preservation and workflow crates.
//!
//! [`PagePort`] is the seam between the engine and whatever hosts the document.
//! [`InMemoryPage`] implements it for tests and the command line demo.

pub mod errors;
pub mod memory;
pub mod model;
pub mod port;
pub mod selector;

pub use errors::PageError;
pub use memory::{ElementSpec, InMemoryPage};
pub use model::{DocumentMetrics, ElementSummary, MutationRecord, NodeId, Overlay, StyleSheetEntry};
pub use port::{parse_inline_style, render_inline_style, PagePort};
pub use selector::{Selector, SelectorError};
