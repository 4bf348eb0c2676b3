//! OCI image assembly.
//!
//! Turns variant chains into canonical OCI documents:
//!
//! ```text
//! ┌──────────────┐   fold    ┌──────────────┐  group by   ┌───────────────────────┐
//! │ variant chain│ ────────► │   OciImage   │ ──────────► │ OciMultiPlatformImage │
//! │ (base first) │           │ config +     │  reference  │ index over platforms  │
//! └──────────────┘           │ manifest     │             └───────────────────────┘
//!                            └──────────────┘
//! ```

pub mod assemble;
pub mod document;
pub mod reference;
pub mod variant;

pub use assemble::{assemble_image, assemble_index, ImageClaims, OciImage, OciMultiPlatformImage};
pub use reference::ImageReference;
pub use variant::{LayerDescriptor, LayerMetadata, OciVariant, VariantMetadata};
