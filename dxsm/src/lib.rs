//! # DXSM: Direct3D 9 shader bytecode to SPIR-V.
//!
//! DXSM consumes a compiled D3D9 shader (the 32-bit token stream handed to
//! `CreateVertexShader`/`CreatePixelShader`, models 1.0 through 3.0) and
//! produces an equivalent SPIR-V 1.0 module for Vulkan, rewriting the
//! register-machine program into SSA form along the way. Uniform inputs are
//! mapped onto a fixed descriptor-set-0 contract (shader constants, render
//! state, textures, texture-stage state) the host binds against.
//!
//! ## How-to
//!
//! ```ignore
//! // `tokens` is the `&[u32]` shader function blob from the application.
//! let shader = dxsm::translate(tokens)?;
//! // Inspect the emitted words, or hand them straight to Vulkan:
//! let module = shader.create_module(&device)?;
//! ```
//!
//! Slot budgets for the shader-constant block are configurable when the
//! host reserves a different layout:
//!
//! ```ignore
//! let shader = TranslateConfig::new()
//!     .float_vector_slots(224)
//!     .translate(tokens)?;
//! ```
//!
//! Translation is single-threaded per invocation; concurrent translations
//! use independent [`Translator`] instances. Warnings about unsupported
//! opcodes and modifiers are reported through the `log` crate with the word
//! offset of the offending instruction.
mod consts;
mod layout;
mod registers;
mod shader;
mod symbols;
mod translate;

use fnv::FnvHashMap;
use ordered_float::OrderedFloat;

use dxsm_core::error::Result;
use dxsm_core::parse::{ShaderHeader, Stage, TokenStream};
use dxsm_core::spv::ModuleBuilder;
use dxsm_core::ty::TypeRegistry;

use crate::symbols::SymbolTable;
use crate::translate::{IfFrame, LoopFrame};

pub use dxsm_core::parse::words_from_bytes;
pub use dxsm_core::error;

/// Translate a D3D9 shader token stream into a SPIR-V module with the
/// default slot budgets.
pub fn translate(words: &[u32]) -> Result<TranslatedShader> {
    Translator::new(words)?.translate()
}

/// Slot budgets of the shader-constant block. The member-index formula
/// (`i#` at `n`, `b#` at `int_vector_slots + n`, `c#` after both) follows
/// from these, so they must match the host's upload layout.
#[derive(Clone, Debug)]
pub struct TranslateConfig {
    pub(crate) int_vector_slots: u32,
    pub(crate) bool_slots: u32,
    pub(crate) float_vector_slots: u32,
}

impl Default for TranslateConfig {
    fn default() -> TranslateConfig {
        TranslateConfig {
            int_vector_slots: consts::INT_VECTOR_SLOTS,
            bool_slots: consts::BOOL_SLOTS,
            float_vector_slots: consts::FLOAT_VECTOR_SLOTS,
        }
    }
}

impl TranslateConfig {
    pub fn new() -> TranslateConfig {
        TranslateConfig::default()
    }
    pub fn int_vector_slots(mut self, n: u32) -> Self {
        self.int_vector_slots = n;
        self
    }
    pub fn bool_slots(mut self, n: u32) -> Self {
        self.bool_slots = n;
        self
    }
    pub fn float_vector_slots(mut self, n: u32) -> Self {
        self.float_vector_slots = n;
        self
    }
    pub fn translate(self, words: &[u32]) -> Result<TranslatedShader> {
        Translator::with_config(words, self)?.translate()
    }
}

/// Literal constants embedded in the stream by `def`/`defi`/`defb`. The
/// translator only bookkeeps them; the host folds them into its constant
/// upload.
#[derive(Clone, Debug, Default)]
pub struct ConstantDefinitions {
    pub(crate) floats: FnvHashMap<u32, [f32; 4]>,
    pub(crate) ints: FnvHashMap<u32, [i32; 4]>,
    pub(crate) bools: FnvHashMap<u32, bool>,
}

impl ConstantDefinitions {
    pub fn float(&self, register: u32) -> Option<[f32; 4]> {
        self.floats.get(&register).copied()
    }
    pub fn int(&self, register: u32) -> Option<[i32; 4]> {
        self.ints.get(&register).copied()
    }
    pub fn bool(&self, register: u32) -> Option<bool> {
        self.bools.get(&register).copied()
    }
    pub fn is_empty(&self) -> bool {
        self.floats.is_empty() && self.ints.is_empty() && self.bools.is_empty()
    }
}

/// The result of a translation: the SPIR-V words plus the metadata the host
/// needs to bind the shader.
pub struct TranslatedShader {
    pub(crate) words: Vec<u32>,
    pub(crate) stage: Stage,
    pub(crate) major: u8,
    pub(crate) minor: u8,
    pub(crate) constants: ConstantDefinitions,
}

impl TranslatedShader {
    pub fn words(&self) -> &[u32] {
        &self.words
    }
    pub fn into_words(self) -> Vec<u32> {
        self.words
    }
    pub fn stage(&self) -> Stage {
        self.stage
    }
    pub fn version(&self) -> (u8, u8) {
        (self.major, self.minor)
    }
    pub fn constants(&self) -> &ConstantDefinitions {
        &self.constants
    }
}

/// Single-pass translator over one token stream. All per-invocation state
/// lives here; nothing is shared between instances.
pub struct Translator<'a> {
    stream: TokenStream<'a>,
    stage: Stage,
    major: u8,
    minor: u8,
    config: TranslateConfig,

    module: ModuleBuilder,
    types: TypeRegistry,
    symbols: SymbolTable,
    defs: ConstantDefinitions,

    glsl_ext: u32,
    entry_id: u32,
    entry_type_id: u32,

    // Preamble constants, produced once and reused everywhere.
    float_0: u32,
    float_1: u32,
    float_neg_1: u32,
    float_255: u32,
    vec4_0: u32,
    vec4_1: u32,
    vec4_255: u32,
    vec4_y_flip: u32,
    const_ints: [u32; 17],
    int_consts: FnvHashMap<u32, u32>,
    float_consts: FnvHashMap<OrderedFloat<f32>, u32>,

    // Descriptor-block variables.
    constants_block: u32,
    render_state_block: u32,
    textures_block: u32,
    texture_stages_block: u32,

    inputs: Vec<u32>,
    outputs: Vec<u32>,
    if_frames: Vec<IfFrame>,
    loop_frames: Vec<LoopFrame>,
    /// Pointer to `position.y` of the vertex output, for the final flip.
    position_y: Option<u32>,
    /// Word offset of the instruction being lowered, for diagnostics.
    instr_offset: usize,
}

impl<'a> Translator<'a> {
    pub fn new(words: &'a [u32]) -> Result<Translator<'a>> {
        Translator::with_config(words, TranslateConfig::default())
    }

    pub fn with_config(words: &'a [u32], config: TranslateConfig) -> Result<Translator<'a>> {
        let mut stream = TokenStream::new(words);
        let version = stream.next()?;
        let header = ShaderHeader::parse(version.0);
        log::debug!("translating {}", header);
        Ok(Translator {
            stream,
            stage: header.stage,
            major: header.major,
            minor: header.minor,
            config,
            module: ModuleBuilder::new(),
            types: TypeRegistry::new(),
            symbols: SymbolTable::new(),
            defs: ConstantDefinitions::default(),
            glsl_ext: 0,
            entry_id: 0,
            entry_type_id: 0,
            float_0: 0,
            float_1: 0,
            float_neg_1: 0,
            float_255: 0,
            vec4_0: 0,
            vec4_1: 0,
            vec4_255: 0,
            vec4_y_flip: 0,
            const_ints: [0; 17],
            int_consts: FnvHashMap::default(),
            float_consts: FnvHashMap::default(),
            constants_block: 0,
            render_state_block: 0,
            textures_block: 0,
            texture_stages_block: 0,
            inputs: Vec::new(),
            outputs: Vec::new(),
            if_frames: Vec::new(),
            loop_frames: Vec::new(),
            position_y: None,
            instr_offset: 0,
        })
    }

    /// Run the pass to completion and assemble the module.
    pub fn translate(self) -> Result<TranslatedShader> {
        self.run()
    }

    pub(crate) fn is_vertex(&self) -> bool {
        self.stage == Stage::Vertex
    }
}
