//! Layout detection, preset application and agent-mode control.

pub mod controller;
pub mod errors;
pub mod model;
pub mod policy;

pub use controller::LayoutController;
pub use errors::LayoutError;
pub use model::{
    ComponentDigest, LayoutBackup, LayoutInfo, LayoutPreset, LayoutSnapshot, PageCategory,
    StyleRef, ViewportClass,
};
pub use policy::{LayoutPolicy, PresetTable};
