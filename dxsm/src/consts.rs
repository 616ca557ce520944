//! Fixed points of the descriptor and interface contract with the host.
use dxsm_core::parse::Usage;

/// Interface locations per declaration usage. The table packs every D3D9
/// usage into the 32 locations Vulkan guarantees: POSITION 0-1 (slot 1 is
/// tweening), BLENDWEIGHT 2-4, BLENDINDICES 5-7, NORMAL 8-9, PSIZE 10,
/// TEXCOORD 11-26, TANGENT 27, BINORMAL 28, TESSFACTOR 29, COLOR 30-31,
/// with FOG/DEPTH/SAMPLE reusing the last three TEXCOORD slots.
pub const USAGE_LOCATIONS: [u32; 14] = [
    0,  // Position
    2,  // BlendWeight
    5,  // BlendIndices
    8,  // Normal
    10, // PointSize
    11, // Texcoord
    27, // Tangent
    28, // Binormal
    29, // TessFactor
    0,  // PositionT, same slot as Position
    30, // Color
    24, // Fog
    25, // Depth
    26, // Sample
];

pub fn usage_location(usage: Usage, usage_index: u32) -> u32 {
    USAGE_LOCATIONS[usage as usize] + usage_index
}

/// Every block the translator declares lives in descriptor set 0.
pub const DESCRIPTOR_SET: u32 = 0;
/// Render-state uniform block.
pub const RENDER_STATE_BINDING: u32 = 0;
/// Texture-stage state array, pixel stage only.
pub const TEXTURE_STAGE_BINDING: u32 = 1;
/// Shader-constant block, per stage.
pub const VS_CONSTANTS_BINDING: u32 = 5;
pub const PS_CONSTANTS_BINDING: u32 = 6;
/// Sampled-image array, pixel stage only.
pub const TEXTURES_BINDING: u32 = 7;

/// Constant-register slot budget: `i#` ivec4s, then `b#` ints, then `c#`
/// vec4s, in that member order inside the shader-constant block.
pub const INT_VECTOR_SLOTS: u32 = 16;
pub const BOOL_SLOTS: u32 = 16;
pub const FLOAT_VECTOR_SLOTS: u32 = 256;

pub const SAMPLER_SLOTS: u32 = 16;
pub const TEXTURE_STAGE_SLOTS: u32 = 16;

/// One uint per render state, `D3DRS_ZENABLE` through `D3DRS_BLENDOPALPHA`.
pub const RENDER_STATE_MEMBERS: u32 = 210;
/// One uint per texture-stage state, through `D3DTSS_CONSTANT`.
pub const TEXTURE_STAGE_MEMBERS: u32 = 33;

/// Member indices of the bump-environment matrix inside a texture-stage
/// struct, as the host lays it out.
pub const BUMP_ENV_MAT_00: u32 = 13;
pub const BUMP_ENV_MAT_01: u32 = 14;
pub const BUMP_ENV_MAT_10: u32 = 15;
pub const BUMP_ENV_MAT_11: u32 = 16;

/// The extra constant-file pages of `CONST2`/`CONST3`/`CONST4` registers are
/// rebased onto one flat constant address space.
pub const CONST2_BASE: u32 = 2048;
pub const CONST3_BASE: u32 = 4096;
pub const CONST4_BASE: u32 = 6144;
