//! Core machinery shared by the D3D9 shader translator: decoding of the
//! bit-packed D3D9 instruction stream, structural SPIR-V type descriptors
//! with an interning registry, and per-section SPIR-V module assembly.
pub use spirv;

pub mod parse;
pub mod spv;
pub mod ty;

/// Error infrastructure.
pub mod error {
    pub use anyhow::{anyhow, bail, Error, Result};
}
