//! Register resolution and write-back.
//!
//! Source operands resolve to SPIR-V value ids here: registers are declared
//! on first use, pointers are loaded, source modifiers and swizzles applied,
//! and the register file's untyped vec4 slots are coerced into whatever
//! shape the instruction asked for. Results come back through [`commit`],
//! which honors the destination write mask and keeps the register-to-id
//! table in SSA form.
//!
//! [`commit`]: crate::Translator::commit
use log::warn;
use spirv::{BuiltIn, Decoration, GLOp, Op, StorageClass};

use dxsm_core::error::{bail, Result};
use dxsm_core::parse::{RegisterType, SourceModifier, Token, Usage};
use dxsm_core::ty::TypeDescriptor;

use crate::consts;
use crate::Translator;

/// The value shape a lowering asks the resolver for.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum Want {
    Scalar,
    Vec2,
    Vec3,
    Vec4,
    Mat3,
    Mat4,
    Sampler,
}

impl<'a> Translator<'a> {
    pub(crate) fn type_id(&mut self, desc: &TypeDescriptor) -> u32 {
        self.types.intern(&mut self.module, desc)
    }

    /// Allocate an id and record its type in one step.
    pub(crate) fn new_id(&mut self, desc: &TypeDescriptor) -> u32 {
        let id = self.module.alloc_id();
        self.types.bind(id, desc.clone());
        id
    }

    /// Integer constants are interned; repeated requests reuse the id, which
    /// also keeps every access-chain index pointing at a preamble constant.
    pub(crate) fn const_int(&mut self, value: u32) -> u32 {
        if let Some(&id) = self.int_consts.get(&value) {
            return id;
        }
        let ty = TypeDescriptor::int();
        let ty_id = self.type_id(&ty);
        let id = self.new_id(&ty);
        self.module.constant(ty_id, id, &[value]);
        self.int_consts.insert(value, id);
        id
    }

    pub(crate) fn const_f32(&mut self, value: f32) -> u32 {
        let key = ordered_float::OrderedFloat(value);
        if let Some(&id) = self.float_consts.get(&key) {
            return id;
        }
        let ty = TypeDescriptor::float();
        let ty_id = self.type_id(&ty);
        let id = self.new_id(&ty);
        self.module.constant(ty_id, id, &[value.to_bits()]);
        self.float_consts.insert(key, id);
        id
    }

    pub(crate) fn push_load(&mut self, pointer: u32) -> u32 {
        let value_ty = self.types.type_of(pointer).value_type();
        let value_ty_id = self.type_id(&value_ty);
        let id = self.new_id(&value_ty);
        self.module.code(Op::Load, &[value_ty_id, id, pointer]);
        id
    }

    pub(crate) fn push_store(&mut self, pointer: u32, value: u32) {
        self.module.code(Op::Store, &[pointer, value]);
    }

    pub(crate) fn load_if_pointer(&mut self, id: u32) -> u32 {
        if self.types.type_of(id).is_pointer() {
            self.push_load(id)
        } else {
            id
        }
    }

    /// Pointer to one component of a pointer-to-vector.
    pub(crate) fn access_chain_component(&mut self, base: u32, lane: u32) -> u32 {
        let ptr_ty = self.types.type_of(base).pointer_component_type();
        let ptr_ty_id = self.type_id(&ptr_ty);
        let index = self.const_int(lane);
        let id = self.new_id(&ptr_ty);
        self.module.code(Op::AccessChain, &[ptr_ty_id, id, base, index]);
        id
    }

    pub(crate) fn composite_extract(&mut self, base: u32, index: u32) -> u32 {
        let ty = self.types.type_of(base).component_type();
        let ty_id = self.type_id(&ty);
        let id = self.new_id(&ty);
        self.module.code(Op::CompositeExtract, &[ty_id, id, base, index]);
        id
    }

    pub(crate) fn composite_extract2(&mut self, base: u32, i: u32, j: u32) -> u32 {
        let ty = self.types.type_of(base).component_type().component_type();
        let ty_id = self.type_id(&ty);
        let id = self.new_id(&ty);
        self.module
            .code(Op::CompositeExtract, &[ty_id, id, base, i, j]);
        id
    }

    /// Broadcast a scalar into an n-wide composite.
    pub(crate) fn splat(&mut self, scalar: u32, ty: &TypeDescriptor) -> u32 {
        let ty_id = self.type_id(ty);
        let id = self.new_id(ty);
        let mut operands = vec![ty_id, id];
        operands.extend(std::iter::repeat(scalar).take(ty.component_count as usize));
        self.module.code(Op::CompositeConstruct, &operands);
        id
    }

    fn rebased_number(&self, class: RegisterType, token: Token) -> u32 {
        let number = token.register_number();
        match class {
            RegisterType::Const2 => number + consts::CONST2_BASE,
            RegisterType::Const3 => number + consts::CONST3_BASE,
            RegisterType::Const4 => number + consts::CONST4_BASE,
            _ => number,
        }
    }

    /// Rebind a register to a freshly allocated id and return it.
    pub(crate) fn next_version_id(&mut self, token: Token) -> u32 {
        let id = self.module.alloc_id();
        self.bind_register(token, id);
        id
    }

    pub(crate) fn bind_register(&mut self, token: Token, id: u32) {
        let class = token.register_type();
        let number = self.rebased_number(class, token);
        self.symbols.bind(class, number, id);
    }

    /// The current value type of a register, declaring it if this is its
    /// first appearance.
    pub(crate) fn register_type_of(&mut self, token: Token) -> Result<TypeDescriptor> {
        let id = self.register_id(token, None, Usage::Position, 0)?;
        Ok(self.types.type_of(id))
    }

    /// The id currently holding the register named by `token`, materializing
    /// a declaration when the stream never declared it.
    pub(crate) fn register_id(
        &mut self,
        token: Token,
        class_override: Option<RegisterType>,
        usage: Usage,
        usage_index: u32,
    ) -> Result<u32> {
        let class = class_override.unwrap_or_else(|| token.register_type());
        let number = self.rebased_number(class, token);

        if let Some(id) = self.symbols.lookup(class, number) {
            return Ok(id);
        }

        // Anything past this point was used before it was declared. The
        // stream gives no usage data here, so the storage class and location
        // are reconstructed from the register class and the caller's hint.
        let mut id = match class {
            RegisterType::Texture | RegisterType::Input => {
                let scalar = if usage == Usage::Color {
                    // A color input is one packed dword the host hands over
                    // as a uint vector.
                    Op::TypeInt
                } else {
                    Op::TypeFloat
                };
                let desc =
                    TypeDescriptor::pointer(Op::TypeVector, scalar, 4, StorageClass::Input);
                let ty_id = self.type_id(&desc);
                let id = self.new_id(&desc);
                self.module.variable(ty_id, id, StorageClass::Input);
                self.inputs.push(id);
                let declared_usage = if class == RegisterType::Texture {
                    Usage::Texcoord
                } else {
                    Usage::Color
                };
                self.decorate_interface(number, id, declared_usage, usage_index, true);
                id
            }
            RegisterType::Temp
            | RegisterType::RastOut
            | RegisterType::AttrOut
            | RegisterType::ColorOut
            | RegisterType::DepthOut
            | RegisterType::Output => {
                // Temps ride along here: pixel-shader r0 is the color
                // output, everything else is a private register.
                let is_output = (self.is_vertex() && class != RegisterType::Temp)
                    || (!self.is_vertex() && class == RegisterType::Temp && number == 0);
                let storage = if is_output {
                    StorageClass::Output
                } else {
                    StorageClass::Private
                };
                let desc = TypeDescriptor::pointer(Op::TypeVector, Op::TypeFloat, 4, storage);
                let ty_id = self.type_id(&desc);
                let id = self.new_id(&desc);
                self.module.variable(ty_id, id, storage);
                if is_output {
                    let guessed = self.guess_output_usage(class, usage);
                    self.outputs.push(id);
                    self.decorate_interface(number, id, guessed, usage_index, false);
                }
                id
            }
            RegisterType::ConstInt => {
                let value_ty = TypeDescriptor::vector(Op::TypeInt, 4);
                let ptr_ty = TypeDescriptor::pointer(
                    Op::TypeVector,
                    Op::TypeInt,
                    4,
                    StorageClass::Uniform,
                );
                let name = format!("i{}", number);
                self.constant_member_load(number, &value_ty, &ptr_ty, &name)
            }
            RegisterType::ConstBool => {
                let value_ty = TypeDescriptor::int();
                let ptr_ty =
                    TypeDescriptor::scalar_pointer(Op::TypeInt, StorageClass::Uniform);
                let name = format!("b{}", number);
                self.constant_member_load(
                    self.config.int_vector_slots + number,
                    &value_ty,
                    &ptr_ty,
                    &name,
                )
            }
            RegisterType::Const
            | RegisterType::Const2
            | RegisterType::Const3
            | RegisterType::Const4 => {
                let value_ty = TypeDescriptor::vector(Op::TypeFloat, 4);
                let ptr_ty = TypeDescriptor::pointer(
                    Op::TypeVector,
                    Op::TypeFloat,
                    4,
                    StorageClass::Uniform,
                );
                let name = format!("c{}", number);
                self.constant_member_load(
                    self.config.int_vector_slots + self.config.bool_slots + number,
                    &value_ty,
                    &ptr_ty,
                    &name,
                )
            }
            RegisterType::Sampler => self.sampler_chain(number),
            other => {
                bail!(
                    "register class {:?} (register {}) cannot be materialized at word {}",
                    other,
                    number,
                    self.instr_offset
                );
            }
        };

        if self.is_vertex() && class == RegisterType::Input {
            match usage {
                Usage::Color => id = self.fix_color(id),
                Usage::Position => id = self.fix_position(id),
                _ => {}
            }
        }

        self.symbols.bind(class, number, id);
        self.symbols.set_usage(id, usage);
        Ok(id)
    }

    /// Access-chain into the shader-constant block and load one member.
    fn constant_member_load(
        &mut self,
        member: u32,
        value_ty: &TypeDescriptor,
        ptr_ty: &TypeDescriptor,
        name: &str,
    ) -> u32 {
        let member_id = self.const_int(member);
        let ptr_ty_id = self.type_id(ptr_ty);
        let chain = self.new_id(ptr_ty);
        let block = self.constants_block;
        self.module
            .code(Op::AccessChain, &[ptr_ty_id, chain, block, member_id]);
        self.module.name(chain, name);
        let value_ty_id = self.type_id(value_ty);
        let id = self.new_id(value_ty);
        self.module.code(Op::Load, &[value_ty_id, id, chain]);
        id
    }

    /// Access-chain into the sampled-image array.
    pub(crate) fn sampler_chain(&mut self, number: u32) -> u32 {
        let desc = TypeDescriptor::pointer(
            Op::TypeImage,
            Op::TypeVoid,
            0,
            StorageClass::UniformConstant,
        );
        let ty_id = self.type_id(&desc);
        let index = self.const_int(number);
        let id = self.new_id(&desc);
        let block = self.textures_block;
        self.module.code(Op::AccessChain, &[ty_id, id, block, index]);
        self.module.name(id, &format!("s{}", number));
        id
    }

    /// Pre-SM3 streams rarely declare outputs; reconstruct the usage from
    /// the register class the way each model generation encoded it.
    fn guess_output_usage(&self, class: RegisterType, usage: Usage) -> Usage {
        if self.is_vertex() {
            match self.major {
                1 => match class {
                    RegisterType::RastOut => Usage::Position,
                    RegisterType::AttrOut | RegisterType::ColorOut => Usage::Color,
                    // Output doubles as the SM1 TexCrdOut class.
                    RegisterType::Output => Usage::Texcoord,
                    _ => usage,
                },
                2 => match class {
                    RegisterType::RastOut => Usage::Position,
                    RegisterType::AttrOut | RegisterType::Output | RegisterType::ColorOut => {
                        Usage::Color
                    }
                    _ => usage,
                },
                _ => usage,
            }
        } else {
            match class {
                RegisterType::DepthOut => Usage::Depth,
                _ => Usage::Color,
            }
        }
    }

    /// Location/built-in decorations plus the debug name of an interface
    /// variable.
    pub(crate) fn decorate_interface(
        &mut self,
        number: u32,
        id: u32,
        usage: Usage,
        usage_index: u32,
        is_input: bool,
    ) {
        let name;
        if self.is_vertex() {
            if is_input {
                let location = consts::usage_location(usage, usage_index);
                self.module.decorate(id, Decoration::Location, &[location]);
                name = format!("v{}", number);
            } else {
                // SM3 addresses outputs by register number; older models by
                // usage.
                let location = if self.major == 3 {
                    number
                } else {
                    consts::usage_location(usage, usage_index)
                };
                if usage == Usage::Position {
                    self.module
                        .decorate(id, Decoration::BuiltIn, &[BuiltIn::Position as u32]);
                    let y = self.access_chain_component(id, 1);
                    self.position_y = Some(y);
                } else {
                    self.module.decorate(id, Decoration::Location, &[location]);
                }
                name = match usage {
                    Usage::Position => "oPos".to_owned(),
                    Usage::Fog => "oFog".to_owned(),
                    Usage::PointSize => "oPts".to_owned(),
                    Usage::Color => format!("oD{}", number),
                    Usage::Texcoord => format!("oT{}", number),
                    _ => format!("o{}", number),
                };
            }
        } else if is_input {
            let location = if self.major == 3 {
                number
            } else {
                consts::usage_location(usage, usage_index)
            };
            self.module.decorate(id, Decoration::Location, &[location]);
            name = match usage {
                Usage::Texcoord => format!("t{}", number),
                _ => format!("v{}", number),
            };
        } else {
            let location = match usage {
                Usage::Color => usage_index,
                _ => 2 + usage_index,
            };
            self.module.decorate(id, Decoration::Location, &[location]);
            name = match usage {
                Usage::Color => format!("oC{}", number),
                Usage::Depth => "oDepth".to_owned(),
                _ => format!("o{}", number),
            };
        }
        self.module.name(id, &name);
    }

    /// Vertex color inputs arrive as one packed uint vector; decode to
    /// normalized floats.
    pub(crate) fn fix_color(&mut self, id: u32) -> u32 {
        let loaded = self.load_if_pointer(id);
        let loaded_ty = self.types.type_of(loaded);
        let mut float_ty = loaded_ty;
        if float_ty.is_vector() {
            float_ty.secondary = Op::TypeFloat;
        } else {
            float_ty.primary = Op::TypeFloat;
        }
        let float_ty_id = self.type_id(&float_ty);
        let converted = self.new_id(&float_ty);
        self.module
            .code(Op::ConvertUToF, &[float_ty_id, converted, loaded]);
        let divisor = if float_ty.is_vector() {
            self.vec4_255
        } else {
            self.float_255
        };
        let id = self.new_id(&float_ty);
        self.module
            .code(Op::FDiv, &[float_ty_id, id, converted, divisor]);
        id
    }

    /// Vertex position inputs may carry junk in `w`; force it to 1 so the
    /// projection multiply is correct.
    pub(crate) fn fix_position(&mut self, id: u32) -> u32 {
        let loaded = self.load_if_pointer(id);
        let ty = self.types.type_of(loaded);
        let ty_id = self.type_id(&ty);
        let one = self.float_1;
        let fixed = self.new_id(&ty);
        self.module
            .code(Op::CompositeInsert, &[ty_id, fixed, one, loaded, 3]);
        fixed
    }

    pub(crate) fn vec4_to_vec3(&mut self, id: u32) -> u32 {
        let loaded = self.load_if_pointer(id);
        let x = self.composite_extract(loaded, 0);
        let y = self.composite_extract(loaded, 1);
        let z = self.composite_extract(loaded, 2);
        let ty = TypeDescriptor::vector(Op::TypeFloat, 3);
        let ty_id = self.type_id(&ty);
        let result = self.new_id(&ty);
        self.module
            .code(Op::CompositeConstruct, &[ty_id, result, x, y, z]);
        result
    }

    pub(crate) fn mat4_to_mat3(&mut self, id: u32) -> u32 {
        let loaded = self.load_if_pointer(id);
        let column_ty = TypeDescriptor::vector(Op::TypeFloat, 3);
        let column_ty_id = self.type_id(&column_ty);
        let mut columns = [0u32; 3];
        for (column, slot) in columns.iter_mut().enumerate() {
            let x = self.composite_extract2(loaded, column as u32, 0);
            let y = self.composite_extract2(loaded, column as u32, 1);
            let z = self.composite_extract2(loaded, column as u32, 2);
            let v = self.new_id(&column_ty);
            self.module
                .code(Op::CompositeConstruct, &[column_ty_id, v, x, y, z]);
            *slot = v;
        }
        let ty = TypeDescriptor::matrix(3);
        let ty_id = self.type_id(&ty);
        let result = self.new_id(&ty);
        self.module.code(
            Op::CompositeConstruct,
            &[ty_id, result, columns[0], columns[1], columns[2]],
        );
        result
    }

    /// A vec4 register used as a mat4: the next three registers are folded
    /// in as the remaining columns. The result is cached per source id.
    fn matrix4_id(&mut self, token: Token) -> Result<u32> {
        let base = self.register_id(token, None, Usage::Position, 0)?;
        if let Some(matrix) = self.symbols.mat4_of(base) {
            return Ok(matrix);
        }
        let number = token.register_number();
        let mut columns = [0u32; 4];
        columns[0] = self.load_if_pointer(base);
        for i in 1..4u32 {
            let column = self.register_id(
                token.with_register_number(number + i),
                None,
                Usage::Position,
                0,
            )?;
            columns[i as usize] = self.load_if_pointer(column);
        }
        let ty = TypeDescriptor::matrix(4);
        let ty_id = self.type_id(&ty);
        let matrix = self.new_id(&ty);
        self.module.code(
            Op::CompositeConstruct,
            &[ty_id, matrix, columns[0], columns[1], columns[2], columns[3]],
        );
        self.symbols.cache_mat4(base, matrix);
        Ok(matrix)
    }

    fn matrix3_id(&mut self, token: Token) -> Result<u32> {
        let base = self.register_id(token, None, Usage::Position, 0)?;
        if let Some(matrix) = self.symbols.mat3_of(base) {
            return Ok(matrix);
        }
        let mat4 = match self.symbols.mat4_of(base) {
            Some(matrix) => matrix,
            None => self.matrix4_id(token)?,
        };
        let matrix = self.mat4_to_mat3(mat4);
        self.symbols.cache_mat3(base, matrix);
        Ok(matrix)
    }

    fn vec3_id(&mut self, base: u32) -> u32 {
        if let Some(vector) = self.symbols.vec3_of(base) {
            return vector;
        }
        let vector = self.vec4_to_vec3(base);
        self.symbols.cache_vec3(base, vector);
        vector
    }

    /// Resolve a source operand to a value id of the requested shape.
    pub(crate) fn resolve(&mut self, token: Token, want: Want) -> Result<u32> {
        let mut out_components = 4u32;
        let original = match want {
            Want::Sampler => {
                self.register_id(token, Some(RegisterType::Sampler), Usage::Position, 0)?
            }
            Want::Scalar => {
                out_components = 1;
                self.register_id(token, None, Usage::Position, 0)?
            }
            Want::Vec2 => {
                out_components = 2;
                // Texture coordinates come from the texture-coordinate
                // register file before SM3 and from the input file after.
                if self.major >= 3 {
                    self.register_id(token, Some(RegisterType::Input), Usage::Texcoord, 0)?
                } else {
                    self.register_id(token, Some(RegisterType::Texture), Usage::Texcoord, 0)?
                }
            }
            Want::Vec3 => {
                out_components = 3;
                let base = self.register_id(token, None, Usage::Position, 0)?;
                self.vec3_id(base)
            }
            Want::Mat4 => self.matrix4_id(token)?,
            Want::Mat3 => self.matrix3_id(token)?,
            Want::Vec4 => self.register_id(token, None, Usage::Position, 0)?,
        };

        let loaded = self.load_if_pointer(original);
        let loaded_ty = self.types.type_of(loaded);
        let loaded = self.apply_source_modifier(token, loaded, &loaded_ty);

        let swizzle = token.swizzle();
        if (swizzle.is_identity() || want == Want::Sampler) && want != Want::Scalar {
            return Ok(loaded);
        }
        if matches!(want, Want::Mat3 | Want::Mat4) {
            return Ok(loaded);
        }
        if !loaded_ty.is_vector() {
            // Already a scalar; nothing to select from.
            return Ok(loaded);
        }

        let mut lanes = swizzle.lanes();
        if want == Want::Vec2 && self.major == 1 {
            // SM1 texcoord reads encode a bogus .ww swizzle; the hardware
            // read .xy regardless.
            lanes[0] = 0;
            lanes[1] = 1;
        }

        if lanes[0] == lanes[1] && lanes[0] == lanes[2] && lanes[0] == lanes[3] {
            return Ok(self.composite_extract(loaded, lanes[0]));
        }

        let selectors = match out_components {
            1 => [lanes[0], lanes[0], lanes[0], lanes[0]],
            2 => [lanes[0], lanes[1], lanes[1], lanes[1]],
            3 => [lanes[0], lanes[1], lanes[2], lanes[2]],
            _ => lanes,
        };
        let ty_id = self.type_id(&loaded_ty);
        let out = self.new_id(&loaded_ty);
        if let Some(name) = self.module.name_of(loaded).map(|x| x.to_owned()) {
            self.module.name(out, &name);
        }
        self.module.code(
            Op::VectorShuffle,
            &[
                ty_id,
                out,
                loaded,
                loaded,
                selectors[0],
                selectors[1],
                selectors[2],
                selectors[3],
            ],
        );
        Ok(out)
    }

    fn apply_source_modifier(&mut self, token: Token, id: u32, ty: &TypeDescriptor) -> u32 {
        let modifier = token.source_modifier();
        if modifier == SourceModifier::None {
            return id;
        }
        let is_float = ty.primary == Op::TypeFloat || ty.secondary == Op::TypeFloat;
        let ty_id = self.type_id(ty);
        let negate = |this: &mut Self, value: u32| {
            let op = if is_float { Op::FNegate } else { Op::SNegate };
            let out = this.new_id(ty);
            this.module.code(op, &[ty_id, out, value]);
            out
        };
        let ext = |this: &mut Self, value: u32, float_op: GLOp, int_op: GLOp| {
            let op = if is_float { float_op } else { int_op };
            let out = this.new_id(ty);
            let set = this.glsl_ext;
            this.module.ext_inst(ty_id, out, set, op, &[value]);
            out
        };
        match modifier {
            SourceModifier::None => id,
            SourceModifier::Negate => negate(self, id),
            SourceModifier::Sign => ext(self, id, GLOp::FSign, GLOp::SSign),
            SourceModifier::SignNegate => {
                let signed = ext(self, id, GLOp::FSign, GLOp::SSign);
                negate(self, signed)
            }
            SourceModifier::Abs => ext(self, id, GLOp::FAbs, GLOp::SAbs),
            SourceModifier::AbsNegate => {
                let absolute = ext(self, id, GLOp::FAbs, GLOp::SAbs);
                negate(self, absolute)
            }
            SourceModifier::Complement => {
                let out = self.new_id(ty);
                if is_float {
                    let one = if ty.is_vector() { self.vec4_1 } else { self.float_1 };
                    self.module.code(Op::FSub, &[ty_id, out, one, id]);
                } else {
                    let one = self.const_ints[1];
                    self.module.code(Op::ISub, &[ty_id, out, one, id]);
                }
                out
            }
            unsupported => {
                warn!(
                    "source modifier {:?} on register {} is not modeled; passing the value through",
                    unsupported,
                    token.register_number()
                );
                id
            }
        }
    }

    /// Clamp to [0, 1] for the `_sat` destination modifier.
    fn saturate(&mut self, id: u32) -> u32 {
        let ty = self.types.type_of(id);
        let ty_id = self.type_id(&ty);
        let set = self.glsl_ext;
        match (ty.primary, ty.secondary) {
            (Op::TypeVector, Op::TypeFloat) => {
                let out = self.new_id(&ty);
                let (lo, hi) = (self.vec4_0, self.vec4_1);
                self.module
                    .ext_inst(ty_id, out, set, GLOp::FClamp, &[id, lo, hi]);
                out
            }
            (Op::TypeFloat, _) => {
                let out = self.new_id(&ty);
                let (lo, hi) = (self.float_0, self.float_1);
                self.module
                    .ext_inst(ty_id, out, set, GLOp::FClamp, &[id, lo, hi]);
                out
            }
            (Op::TypeInt, _) => {
                let out = self.new_id(&ty);
                let (lo, hi) = (self.const_ints[0], self.const_ints[1]);
                self.module
                    .ext_inst(ty_id, out, set, GLOp::UClamp, &[id, lo, hi]);
                out
            }
            _ => {
                warn!("saturate on {} is not clampable", ty);
                id
            }
        }
    }

    /// Store a computed value back to its destination register.
    ///
    /// Pointer-backed registers are stored through; a partial write mask
    /// stores component by component through access chains, which sidesteps
    /// the shuffle-then-store aliasing hazard. Input-class destinations are
    /// read-only in SPIR-V, so the register is simply rebound to the new id;
    /// the same goes for registers that only ever lived as values.
    pub(crate) fn commit(&mut self, token: Token, value: u32) -> Result<u32> {
        let dest = self.register_id(token, None, Usage::Position, 0)?;
        let dest_ty = self.types.type_of(dest);

        let mut input = self.load_if_pointer(value);
        if token.saturate() {
            input = self.saturate(input);
        }
        if token.partial_precision() {
            warn!("partial-precision writes are not modeled");
        }
        if token.centroid() {
            warn!("centroid writes are not modeled");
        }
        let input_ty = self.types.type_of(input);

        if dest_ty.storage_class == StorageClass::Input {
            // The ps1.x `tex` family writes back to its coordinate
            // register.
            self.bind_register(token, input);
            return Ok(input);
        }

        if dest_ty.is_pointer() {
            let mask = token.write_mask();
            if mask.is_full() && dest_ty.component_count == input_ty.component_count {
                self.push_store(dest, input);
            } else if input_ty.is_vector() {
                for lane in 0..4 {
                    if mask.lane(lane) {
                        let component = self.composite_extract(input, lane);
                        let pointer = self.access_chain_component(dest, lane);
                        self.push_store(pointer, component);
                    }
                }
            } else {
                for lane in 0..4 {
                    if mask.lane(lane) {
                        let pointer = self.access_chain_component(dest, lane);
                        self.push_store(pointer, input);
                    }
                }
            }
            return Ok(dest);
        }

        self.bind_register(token, input);
        Ok(input)
    }
}
