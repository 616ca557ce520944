//! The translation pass: preamble, opcode dispatch, lowerings and
//! post-processing.
//!
//! The pass is single streaming sweep over the token array. Each lowering
//! consumes its operand tokens, resolves sources through the register file,
//! emits SPIR-V into the function body and commits the result through the
//! write-mask path. Flow control keeps explicit stacks for the selection
//! and loop constructs, mirroring the nesting of the source program.
use log::{debug, warn};
use num_traits::FromPrimitive;
use spirv::{
    AddressingModel, Capability, ExecutionMode, ExecutionModel, GLOp, MemoryModel, Op,
    SourceLanguage, StorageClass,
};

use dxsm_core::error::Result;
use dxsm_core::parse::{Comparison, Opcode, RegisterType, Stage, Usage};
use dxsm_core::ty::TypeDescriptor;

use crate::consts;
use crate::registers::Want;
use crate::{TranslatedShader, Translator};

/// Generator magic for the module header.
const GENERATOR: u32 = (13 << 16) | 1;

pub(crate) struct IfFrame {
    false_label: u32,
    end_label: u32,
    saw_else: bool,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum LoopKind {
    Loop,
    Rep,
}

pub(crate) struct LoopFrame {
    /// The `OpPhi` result carrying the iteration count.
    counter: u32,
    /// The incremented counter fed back over the back edge.
    back_edge: u32,
    header_label: u32,
    end_label: u32,
    kind: LoopKind,
}

impl<'a> Translator<'a> {
    pub(crate) fn run(mut self) -> Result<TranslatedShader> {
        self.preamble();

        loop {
            self.instr_offset = self.stream.offset();
            let token = self.stream.next()?;
            let opcode = match token.op() {
                Some(op) => op,
                None => {
                    warn!(
                        "unknown instruction {:#06x} at word {}",
                        token.opcode(),
                        self.instr_offset
                    );
                    continue;
                }
            };
            match opcode {
                Opcode::End => break,
                Opcode::Nop => {}
                Opcode::Comment => self.stream.skip(token.comment_size()),
                Opcode::Phase => {
                    // ps_1_4 splits the shader in two phases; promoting the
                    // model turns the second phase into plain SM2 lowering.
                    if self.stage == Stage::Pixel && self.major == 1 && self.minor == 4 {
                        self.major = 2;
                        self.minor = 0;
                    }
                }

                Opcode::Dcl => self.lower_dcl()?,
                Opcode::Def => self.lower_def()?,
                Opcode::DefI => self.lower_defi()?,
                Opcode::DefB => self.lower_defb()?,

                Opcode::Mov => self.lower_mov()?,
                Opcode::Mova => self.lower_mova()?,

                Opcode::Add => self.lower_binary("add", Op::FAdd, Op::IAdd)?,
                Opcode::Sub => self.lower_binary("sub", Op::FSub, Op::ISub)?,
                Opcode::Mul => self.lower_binary("mul", Op::FMul, Op::IMul)?,
                Opcode::Mad => self.lower_mad()?,
                Opcode::Cmp => self.lower_cmp()?,
                Opcode::Dp2Add => self.lower_dp2add()?,
                Opcode::Lrp => self.lower_lrp()?,

                Opcode::Dp3 => self.lower_dot("dp3")?,
                Opcode::Dp4 => self.lower_dot("dp4")?,
                Opcode::Crs => self.lower_ext_binary("crs", GLOp::Cross)?,
                Opcode::Dst => self.lower_ext_binary("dst", GLOp::Distance)?,
                Opcode::Pow => self.lower_ext_binary("pow", GLOp::Pow)?,
                Opcode::Nrm => self.lower_ext_unary("nrm", GLOp::Normalize)?,
                Opcode::Rsq => self.lower_ext_unary("rsq", GLOp::InverseSqrt)?,
                Opcode::Exp => self.lower_ext_unary("exp", GLOp::Exp2)?,
                Opcode::ExpP => self.lower_ext_unary("expp", GLOp::Exp2)?,
                Opcode::Log => self.lower_ext_unary("log", GLOp::Log2)?,
                Opcode::LogP => self.lower_ext_unary("logp", GLOp::Log2)?,
                Opcode::Rcp => self.lower_rcp()?,
                Opcode::Frc => self.lower_frc()?,
                Opcode::Abs => self.lower_abs()?,
                Opcode::Min => self.lower_min_max("min", GLOp::FMin, GLOp::SMin, GLOp::UMin)?,
                Opcode::Max => self.lower_min_max("max", GLOp::FMax, GLOp::SMax, GLOp::UMax)?,
                Opcode::Sge => self.lower_compare(
                    "sge",
                    Op::FOrdGreaterThanEqual,
                    Op::SGreaterThanEqual,
                )?,
                Opcode::Slt => self.lower_compare("slt", Op::FOrdLessThan, Op::SLessThan)?,
                Opcode::SinCos => self.lower_sincos()?,

                Opcode::M4x4 => self.lower_matrix_multiply("m4x4", Want::Mat4)?,
                Opcode::M4x3 => self.lower_matrix_multiply("m4x3", Want::Mat4)?,
                Opcode::M3x4 => self.lower_matrix_multiply("m3x4", Want::Mat4)?,
                Opcode::M3x3 => self.lower_matrix_multiply("m3x3", Want::Mat3)?,
                Opcode::M3x2 => self.lower_matrix_multiply("m3x2", Want::Mat3)?,

                Opcode::Tex => self.lower_tex()?,
                Opcode::TexCoord => self.lower_texcoord()?,
                Opcode::TexKill => self.lower_texkill()?,
                Opcode::TexBem => self.lower_texbem()?,

                Opcode::If => self.lower_if()?,
                Opcode::Ifc => self.lower_ifc(token.control())?,
                Opcode::Else => self.lower_else(),
                Opcode::EndIf => self.lower_endif(),
                Opcode::Loop => self.lower_loop(LoopKind::Loop)?,
                Opcode::Rep => self.lower_loop(LoopKind::Rep)?,
                Opcode::EndLoop => self.lower_endloop(LoopKind::Loop),
                Opcode::EndRep => self.lower_endloop(LoopKind::Rep),
                Opcode::Break => self.lower_break(),

                Opcode::Ret => warn!("ret is not supported; ignoring"),
                Opcode::TexDepth => self.skip_unsupported("texdepth", 1),
                Opcode::Lit
                | Opcode::Dsx
                | Opcode::Dsy
                | Opcode::Label
                | Opcode::Call
                | Opcode::BreakP
                | Opcode::Bem
                | Opcode::TexBemL
                | Opcode::TexDp3
                | Opcode::TexDp3Tex
                | Opcode::TexM3x2Depth
                | Opcode::TexM3x2Tex
                | Opcode::TexM3x3
                | Opcode::TexM3x3Pad
                | Opcode::TexM3x3Tex
                | Opcode::TexM3x3VSpec
                | Opcode::TexReg2Ar
                | Opcode::TexReg2Gb
                | Opcode::TexReg2Rgb => self.skip_unsupported_op(opcode, 2),
                Opcode::CallNz
                | Opcode::SetP
                | Opcode::BreakC
                | Opcode::TexLdl
                | Opcode::TexM3x3Spec => self.skip_unsupported_op(opcode, 3),
                Opcode::Sgn | Opcode::Cnd => self.skip_unsupported_op(opcode, 4),
                Opcode::TexLdd => self.skip_unsupported_op(opcode, 5),
                other => {
                    warn!("unsupported instruction {:?}; no operands skipped", other);
                }
            }
        }

        self.finish()
    }

    fn skip_unsupported(&mut self, name: &str, operands: u32) {
        warn!(
            "{} at word {} is not supported; skipping {} operand words",
            name, self.instr_offset, operands
        );
        self.stream.skip(operands);
    }

    fn skip_unsupported_op(&mut self, opcode: Opcode, operands: u32) {
        warn!(
            "{:?} at word {} is not supported; skipping {} operand words",
            opcode, self.instr_offset, operands
        );
        self.stream.skip(operands);
    }

    fn preamble(&mut self) {
        self.module.capability(Capability::Shader);

        self.glsl_ext = self.module.alloc_id();
        self.module.ext_inst_import(self.glsl_ext, "GLSL.std.450");

        self.module
            .memory_model(AddressingModel::Logical, MemoryModel::GLSL450);
        self.module.source(SourceLanguage::GLSL, 400);
        self.module
            .source_extension("GL_ARB_separate_shader_objects");
        self.module
            .source_extension("GL_ARB_shading_language_420pack");

        self.generate_constant_indices();
        self.generate_constants_block();
        self.generate_render_state_block();
        if self.stage == Stage::Pixel {
            self.generate_textures_block();
            self.generate_texture_stages_block();
        }
        debug!(
            "uniform blocks: constants={}, render_state={}",
            self.constants_block, self.render_state_block
        );

        // The function type is only declared once the interface is known;
        // its id is fixed now so the body can open immediately.
        self.entry_type_id = self.module.alloc_id();
        self.entry_id = self.module.alloc_id();
        let void_id = self.type_id(&TypeDescriptor::void());
        self.module.code(
            Op::Function,
            &[void_id, self.entry_id, 0, self.entry_type_id],
        );
        let entry_label = self.label_id();
        self.module.code(Op::Label, &[entry_label]);

        self.generate_value_constants();
    }

    fn finish(mut self) -> Result<TranslatedShader> {
        if self.is_vertex() {
            self.generate_y_flip();
        }
        self.module.code(Op::Return, &[]);
        self.module.code(Op::FunctionEnd, &[]);

        let void_id = self.type_id(&TypeDescriptor::void());
        self.module
            .ty_instr(Op::TypeFunction, &[self.entry_type_id, void_id]);

        let mut interface = self.inputs.clone();
        interface.extend_from_slice(&self.outputs);
        let model = match self.stage {
            Stage::Vertex => ExecutionModel::Vertex,
            Stage::Pixel => ExecutionModel::Fragment,
        };
        self.module
            .entry_point(model, self.entry_id, "main", &interface);
        self.module.name(self.entry_id, "main");
        if self.stage == Stage::Pixel {
            self.module
                .execution_mode(self.entry_id, ExecutionMode::OriginUpperLeft, &[]);
        }

        if !self.if_frames.is_empty() {
            warn!("{} unterminated if block(s)", self.if_frames.len());
        }
        if !self.loop_frames.is_empty() {
            warn!("{} unterminated loop(s)", self.loop_frames.len());
        }

        Ok(TranslatedShader {
            words: self.module.assemble(GENERATOR),
            stage: self.stage,
            major: self.major,
            minor: self.minor,
            constants: self.defs,
        })
    }

    /// Vulkan clip space is Y-inverted relative to D3D; negate the position
    /// output once at the end of the vertex stage.
    fn generate_y_flip(&mut self) {
        let Some(pointer) = self.position_y else {
            return;
        };
        let float_ty = TypeDescriptor::float();
        let float_ty_id = self.type_id(&float_ty);
        let loaded = self.push_load(pointer);
        let flipped = self.new_id(&float_ty);
        let neg_one = self.float_neg_1;
        self.module
            .code(Op::FMul, &[float_ty_id, flipped, loaded, neg_one]);
        self.push_store(pointer, flipped);
    }

    fn label_id(&mut self) -> u32 {
        self.new_id(&TypeDescriptor::label())
    }

    /// A value id's type with any pointer layer peeled off.
    fn value_type_of(&self, id: u32) -> TypeDescriptor {
        let ty = self.types.type_of(id);
        if ty.is_pointer() {
            ty.value_type()
        } else {
            ty
        }
    }

    // --- Declarations -----------------------------------------------------

    fn lower_dcl(&mut self) -> Result<()> {
        if self.is_vertex() {
            self.lower_dcl_vertex()
        } else {
            self.lower_dcl_pixel()
        }
    }

    fn lower_dcl_vertex(&mut self) -> Result<()> {
        let usage_token = self.stream.next()?;
        let register_token = self.stream.next()?;
        let usage = usage_token.usage();
        let usage_index = usage_token.usage_index();
        let class = register_token.register_type();
        let number = register_token.register_number();
        let components = register_token.write_mask().bits();

        let id = self.next_version_id(register_token);

        let is_color_input = usage == Usage::Color && class == RegisterType::Input;
        let scalar = if is_color_input {
            Op::TypeInt
        } else {
            Op::TypeFloat
        };
        // Two- and three-component declarations are widened to vec4 so the
        // register file stays uniform.
        let mut desc = match components {
            0b0001 => TypeDescriptor::scalar_pointer(scalar, StorageClass::Input),
            0b0011 | 0b0111 | 0b1111 => {
                TypeDescriptor::pointer(Op::TypeVector, scalar, 4, StorageClass::Input)
            }
            other => {
                warn!("dcl with component pattern {:#x}; assuming vec4", other);
                TypeDescriptor::pointer(Op::TypeVector, scalar, 4, StorageClass::Input)
            }
        };

        match class {
            RegisterType::Input | RegisterType::Texture => {
                desc.storage_class = StorageClass::Input;
                let ty_id = self.type_id(&desc);
                self.types.bind(id, desc.clone());
                self.module.variable(ty_id, id, StorageClass::Input);
                self.inputs.push(id);
                self.decorate_interface(number, id, usage, usage_index, true);
            }
            RegisterType::RastOut
            | RegisterType::AttrOut
            | RegisterType::ColorOut
            | RegisterType::DepthOut
            | RegisterType::Output => {
                desc.storage_class = StorageClass::Output;
                let ty_id = self.type_id(&desc);
                self.types.bind(id, desc.clone());
                self.module.variable(ty_id, id, StorageClass::Output);
                self.outputs.push(id);
                self.decorate_interface(number, id, usage, usage_index, false);
            }
            RegisterType::Temp => {
                desc.storage_class = StorageClass::Private;
                let ty_id = self.type_id(&desc);
                self.types.bind(id, desc.clone());
                self.module.variable(ty_id, id, StorageClass::Private);
            }
            other => {
                dxsm_core::error::bail!(
                    "dcl of unsupported vertex register class {:?} at word {}",
                    other,
                    self.instr_offset
                );
            }
        }

        let mut id = id;
        if class == RegisterType::Input {
            match usage {
                Usage::Color => {
                    id = self.fix_color(id);
                    self.bind_register(register_token, id);
                }
                Usage::Position => {
                    id = self.fix_position(id);
                    self.bind_register(register_token, id);
                }
                _ => {}
            }
        }
        self.symbols.set_usage(id, usage);
        debug!(
            "dcl {:?}({}) {:?}{}",
            usage, usage_index, class, number
        );
        Ok(())
    }

    fn lower_dcl_pixel(&mut self) -> Result<()> {
        let usage_token = self.stream.next()?;
        let register_token = self.stream.next()?;
        let usage = usage_token.usage();
        let usage_index = usage_token.usage_index();
        let class = register_token.register_type();
        let number = register_token.register_number();
        let components = register_token.write_mask().bits();

        if class == RegisterType::Sampler {
            let id = self.sampler_chain(number);
            self.symbols.bind(class, number, id);
            self.symbols.set_usage(id, usage);
            return Ok(());
        }

        let id = self.next_version_id(register_token);
        let mut desc = match components {
            0b0001 => TypeDescriptor::scalar_pointer(Op::TypeFloat, StorageClass::Input),
            0b0011 | 0b0111 | 0b1111 => {
                TypeDescriptor::pointer(Op::TypeVector, Op::TypeFloat, 4, StorageClass::Input)
            }
            other => {
                warn!("dcl with component pattern {:#x}; assuming vec4", other);
                TypeDescriptor::pointer(Op::TypeVector, Op::TypeFloat, 4, StorageClass::Input)
            }
        };

        match class {
            RegisterType::Input | RegisterType::Texture => {
                let ty_id = self.type_id(&desc);
                self.types.bind(id, desc.clone());
                self.module.variable(ty_id, id, StorageClass::Input);
                self.inputs.push(id);
                self.decorate_interface(number, id, usage, usage_index, true);
            }
            RegisterType::Temp => {
                // r0 is the pixel color output.
                let storage = if number == 0 {
                    StorageClass::Output
                } else {
                    StorageClass::Private
                };
                desc.storage_class = storage;
                let ty_id = self.type_id(&desc);
                self.types.bind(id, desc.clone());
                self.module.variable(ty_id, id, storage);
                if number == 0 {
                    self.outputs.push(id);
                    self.decorate_interface(number, id, Usage::Color, usage_index, false);
                }
            }
            other => {
                dxsm_core::error::bail!(
                    "dcl of unsupported pixel register class {:?} at word {}",
                    other,
                    self.instr_offset
                );
            }
        }

        self.symbols.set_usage(id, usage);
        debug!(
            "dcl {:?}({}) {:?}{}",
            usage, usage_index, class, number
        );
        Ok(())
    }

    fn lower_def(&mut self) -> Result<()> {
        let register = self.stream.next()?;
        let mut value = [0f32; 4];
        for slot in value.iter_mut() {
            *slot = self.stream.next()?.as_f32();
        }
        debug!("def c{} = {:?}", register.register_number(), value);
        self.defs.floats.insert(register.register_number(), value);
        Ok(())
    }

    fn lower_defi(&mut self) -> Result<()> {
        let register = self.stream.next()?;
        let mut value = [0i32; 4];
        for slot in value.iter_mut() {
            *slot = self.stream.next()?.as_i32();
        }
        debug!("defi i{} = {:?}", register.register_number(), value);
        self.defs.ints.insert(register.register_number(), value);
        Ok(())
    }

    fn lower_defb(&mut self) -> Result<()> {
        let register = self.stream.next()?;
        let value = self.stream.next()?.0 != 0;
        debug!("defb b{} = {}", register.register_number(), value);
        self.defs.bools.insert(register.register_number(), value);
        Ok(())
    }

    // --- Data movement ----------------------------------------------------

    fn lower_mov(&mut self) -> Result<()> {
        let dst = self.stream.next()?;
        let src = self.stream.next()?;
        let value = self.resolve(src, Want::Vec4)?;
        self.commit(dst, value)?;
        Ok(())
    }

    fn lower_mova(&mut self) -> Result<()> {
        let dst = self.stream.next()?;
        let src = self.stream.next()?;
        let value = self.resolve(src, Want::Vec4)?;
        let mut ty = self.value_type_of(value);
        if ty.is_vector() || ty.is_matrix() {
            ty.secondary = Op::TypeInt;
        } else {
            ty.primary = Op::TypeInt;
        }
        let ty_id = self.type_id(&ty);
        let converted = self.new_id(&ty);
        self.module
            .code(Op::ConvertFToS, &[ty_id, converted, value]);
        self.commit(dst, converted)?;
        Ok(())
    }

    // --- Arithmetic -------------------------------------------------------

    fn lower_binary(&mut self, name: &str, float_op: Op, int_op: Op) -> Result<()> {
        let dst = self.stream.next()?;
        let a_token = self.stream.next()?;
        let a = self.resolve(a_token, Want::Vec4)?;
        let b_token = self.stream.next()?;
        let b = self.resolve(b_token, Want::Vec4)?;
        let result = self.binary_value(
            name,
            float_op,
            int_op,
            a,
            b,
            a_token.register_type(),
            b_token.register_type(),
        );
        self.commit(dst, result)?;
        Ok(())
    }

    fn is_constant_class(class: RegisterType) -> bool {
        matches!(
            class,
            RegisterType::Const
                | RegisterType::Const2
                | RegisterType::Const3
                | RegisterType::Const4
        )
    }

    fn convert_int_to_float(&mut self, id: u32, target: &TypeDescriptor) -> u32 {
        let ty_id = self.type_id(target);
        let out = self.new_id(target);
        self.module.code(Op::ConvertUToF, &[ty_id, out, id]);
        out
    }

    /// Type-directed lowering of a componentwise binary operation. D3D
    /// registers are untyped, so the operand shapes decide the opcode and
    /// any coercions.
    #[allow(clippy::too_many_arguments)]
    fn binary_value(
        &mut self,
        name: &str,
        float_op: Op,
        int_op: Op,
        a: u32,
        b: u32,
        a_class: RegisterType,
        b_class: RegisterType,
    ) -> u32 {
        let ta = self.value_type_of(a);
        let tb = self.value_type_of(b);

        let emit = |this: &mut Self, op: Op, ty: &TypeDescriptor, x: u32, y: u32| {
            let ty_id = this.type_id(ty);
            let out = this.new_id(ty);
            this.module.code(op, &[ty_id, out, x, y]);
            out
        };

        match (ta.primary, ta.secondary, tb.primary, tb.secondary) {
            (Op::TypeFloat, _, Op::TypeFloat, _) => emit(self, float_op, &ta, a, b),
            (Op::TypeFloat, _, Op::TypeInt, _) => {
                let converted = self.convert_int_to_float(b, &ta);
                emit(self, float_op, &ta, a, converted)
            }
            (Op::TypeInt, _, Op::TypeFloat, _) => {
                let converted = self.convert_int_to_float(a, &tb);
                emit(self, float_op, &tb, converted, b)
            }
            (Op::TypeVector, Op::TypeFloat, Op::TypeVector, Op::TypeFloat) => {
                emit(self, float_op, &ta, a, b)
            }
            (Op::TypeVector, Op::TypeInt, Op::TypeVector, Op::TypeInt) => {
                emit(self, int_op, &ta, a, b)
            }
            (Op::TypeVector, Op::TypeFloat, Op::TypeVector, Op::TypeInt) => {
                let converted = self.convert_int_to_float(b, &ta);
                emit(self, float_op, &ta, a, converted)
            }
            (Op::TypeVector, Op::TypeInt, Op::TypeVector, Op::TypeFloat) => {
                let converted = self.convert_int_to_float(a, &tb);
                emit(self, float_op, &tb, converted, b)
            }
            (Op::TypeVector, Op::TypeFloat, Op::TypeFloat, _) => {
                if float_op == Op::FMul {
                    emit(self, Op::VectorTimesScalar, &ta, a, b)
                } else if Self::is_constant_class(a_class) {
                    // A constant register read as a vector but combined with
                    // a scalar collapses to its first lane.
                    let x = self.composite_extract(a, 0);
                    let scalar = emit(self, float_op, &tb, x, b);
                    self.splat(scalar, &ta)
                } else {
                    let splat = self.splat(b, &ta);
                    emit(self, float_op, &ta, a, splat)
                }
            }
            (Op::TypeFloat, _, Op::TypeVector, Op::TypeFloat) => {
                if float_op == Op::FMul {
                    emit(self, Op::VectorTimesScalar, &tb, b, a)
                } else if Self::is_constant_class(b_class) {
                    let x = self.composite_extract(b, 0);
                    let scalar = emit(self, float_op, &ta, x, a);
                    self.splat(scalar, &tb)
                } else {
                    let splat = self.splat(a, &tb);
                    emit(self, float_op, &tb, b, splat)
                }
            }
            (Op::TypeMatrix, _, Op::TypeMatrix, _) if float_op == Op::FMul => {
                emit(self, Op::MatrixTimesMatrix, &ta, a, b)
            }
            (Op::TypeMatrix, _, Op::TypeFloat, _) if float_op == Op::FMul => {
                emit(self, Op::MatrixTimesScalar, &ta, a, b)
            }
            (Op::TypeFloat, _, Op::TypeMatrix, _) if float_op == Op::FMul => {
                emit(self, Op::MatrixTimesScalar, &tb, b, a)
            }
            (Op::TypeInt, _, Op::TypeInt, _) | (Op::TypeBool, _, Op::TypeBool, _) => {
                emit(self, int_op, &ta, a, b)
            }
            _ => {
                warn!(
                    "{} on {} and {} at word {}; falling back to the float opcode",
                    name, ta, tb, self.instr_offset
                );
                emit(self, float_op, &ta, a, b)
            }
        }
    }

    fn lower_mad(&mut self) -> Result<()> {
        let dst = self.stream.next()?;
        let a_token = self.stream.next()?;
        let a = self.resolve(a_token, Want::Vec4)?;
        let b_token = self.stream.next()?;
        let b = self.resolve(b_token, Want::Vec4)?;
        let c_token = self.stream.next()?;
        let c = self.resolve(c_token, Want::Vec4)?;

        let product = self.binary_value(
            "mad",
            Op::FMul,
            Op::IMul,
            a,
            b,
            a_token.register_type(),
            b_token.register_type(),
        );
        // The product is an intermediate, not a constant register; the
        // broadcast special case must not apply to it.
        let sum = self.binary_value(
            "mad",
            Op::FAdd,
            Op::IAdd,
            product,
            c,
            RegisterType::Temp,
            c_token.register_type(),
        );
        self.commit(dst, sum)?;
        Ok(())
    }

    /// `cmp dst, src0, src1, src2`: per component, `src0 >= 0 ? src1 : src2`.
    fn lower_cmp(&mut self) -> Result<()> {
        let dst = self.stream.next()?;
        let a = self.stream.next()?;
        let a = self.resolve(a, Want::Vec4)?;
        let b = self.stream.next()?;
        let b = self.resolve(b, Want::Vec4)?;
        let c = self.stream.next()?;
        let c = self.resolve(c, Want::Vec4)?;

        let ta = self.value_type_of(a);
        let tb = self.value_type_of(b);
        let tc = self.value_type_of(c);

        let bool_ty = TypeDescriptor::boolean();
        let bool_vec_ty = TypeDescriptor::vector(Op::TypeBool, 4);

        // Condition in the shape of src0.
        let cond_is_vector = ta.is_vector();
        let cond = if cond_is_vector {
            let ty_id = self.type_id(&bool_vec_ty);
            let out = self.new_id(&bool_vec_ty);
            let zero = self.vec4_0;
            self.module
                .code(Op::FOrdGreaterThanEqual, &[ty_id, out, a, zero]);
            out
        } else if ta.primary == Op::TypeInt {
            let ty_id = self.type_id(&bool_ty);
            let out = self.new_id(&bool_ty);
            let zero = self.const_ints[0];
            self.module
                .code(Op::SGreaterThanEqual, &[ty_id, out, a, zero]);
            out
        } else {
            let ty_id = self.type_id(&bool_ty);
            let out = self.new_id(&bool_ty);
            let zero = self.float_0;
            self.module
                .code(Op::FOrdGreaterThanEqual, &[ty_id, out, a, zero]);
            out
        };

        // OpSelect computes per component; condition and both arms must
        // share the result's width.
        let result_ty = if tb.is_vector() {
            tb.clone()
        } else if tc.is_vector() {
            tc.clone()
        } else {
            tb.clone()
        };
        let cond = if result_ty.is_vector() && !cond_is_vector {
            self.splat(cond, &bool_vec_ty)
        } else {
            cond
        };
        let b = if result_ty.is_vector() && !tb.is_vector() {
            self.splat(b, &result_ty)
        } else {
            b
        };
        let c = if result_ty.is_vector() && !tc.is_vector() {
            self.splat(c, &result_ty)
        } else {
            c
        };

        let ty_id = self.type_id(&result_ty);
        let out = self.new_id(&result_ty);
        self.module.code(Op::Select, &[ty_id, out, cond, b, c]);
        self.commit(dst, out)?;
        Ok(())
    }

    /// Two-component dot product plus a scalar.
    fn lower_dp2add(&mut self) -> Result<()> {
        let dst = self.stream.next()?;
        let a = self.stream.next()?;
        let a = self.resolve(a, Want::Vec4)?;
        let b = self.stream.next()?;
        let b = self.resolve(b, Want::Vec4)?;
        let c = self.stream.next()?;
        let c = self.resolve(c, Want::Vec4)?;

        let float_ty = TypeDescriptor::float();
        let float_ty_id = self.type_id(&float_ty);
        let dot = self.new_id(&float_ty);
        self.module.code(Op::Dot, &[float_ty_id, dot, a, b]);

        let c = if self.value_type_of(c).is_vector() {
            self.composite_extract(c, 0)
        } else {
            c
        };
        let out = self.new_id(&float_ty);
        self.module.code(Op::FAdd, &[float_ty_id, out, dot, c]);
        self.commit(dst, out)?;
        Ok(())
    }

    fn lower_lrp(&mut self) -> Result<()> {
        let dst = self.stream.next()?;
        let a = self.stream.next()?;
        let a = self.resolve(a, Want::Vec4)?;
        let b = self.stream.next()?;
        let b = self.resolve(b, Want::Vec4)?;
        let c = self.stream.next()?;
        let c = self.resolve(c, Want::Vec4)?;

        let ty = self.value_type_of(a);
        let ty_id = self.type_id(&ty);
        let out = self.new_id(&ty);
        let op = if ty.scalar_kind() == Op::TypeFloat {
            GLOp::FMix
        } else {
            GLOp::IMix
        };
        let set = self.glsl_ext;
        self.module.ext_inst(ty_id, out, set, op, &[a, b, c]);
        self.commit(dst, out)?;
        Ok(())
    }

    // --- Geometric --------------------------------------------------------

    fn lower_dot(&mut self, name: &str) -> Result<()> {
        let dst = self.stream.next()?;
        let a = self.stream.next()?;
        let a = self.resolve(a, Want::Vec4)?;
        let b = self.stream.next()?;
        let b = self.resolve(b, Want::Vec4)?;

        // The dot result is a scalar regardless of operand arity; the write
        // mask broadcasts it.
        let float_ty = TypeDescriptor::float();
        let float_ty_id = self.type_id(&float_ty);
        let out = self.new_id(&float_ty);
        self.module.code(Op::Dot, &[float_ty_id, out, a, b]);
        debug!("{} -> {}", name, out);
        self.commit(dst, out)?;
        Ok(())
    }

    fn lower_ext_unary(&mut self, name: &str, op: GLOp) -> Result<()> {
        let dst = self.stream.next()?;
        let src = self.stream.next()?;
        let a = self.resolve(src, Want::Vec4)?;
        let ty = self.value_type_of(a);
        let ty_id = self.type_id(&ty);
        let out = self.new_id(&ty);
        let set = self.glsl_ext;
        self.module.ext_inst(ty_id, out, set, op, &[a]);
        debug!("{} -> {}", name, out);
        self.commit(dst, out)?;
        Ok(())
    }

    fn lower_ext_binary(&mut self, name: &str, op: GLOp) -> Result<()> {
        let dst = self.stream.next()?;
        let a_token = self.stream.next()?;
        let a = self.resolve(a_token, Want::Vec4)?;
        let b_token = self.stream.next()?;
        let b = self.resolve(b_token, Want::Vec4)?;
        let mut ty = self.value_type_of(a);
        if ty.primary == Op::TypeVoid {
            ty = self.value_type_of(b);
        }
        let ty_id = self.type_id(&ty);
        let out = self.new_id(&ty);
        let set = self.glsl_ext;
        self.module.ext_inst(ty_id, out, set, op, &[a, b]);
        debug!("{} -> {}", name, out);
        self.commit(dst, out)?;
        Ok(())
    }

    fn lower_abs(&mut self) -> Result<()> {
        let dst = self.stream.next()?;
        let src = self.stream.next()?;
        let a = self.resolve(src, Want::Vec4)?;
        let ty = self.value_type_of(a);
        let ty_id = self.type_id(&ty);
        let out = self.new_id(&ty);
        let op = if ty.scalar_kind() == Op::TypeFloat {
            GLOp::FAbs
        } else {
            GLOp::SAbs
        };
        let set = self.glsl_ext;
        self.module.ext_inst(ty_id, out, set, op, &[a]);
        self.commit(dst, out)?;
        Ok(())
    }

    fn lower_min_max(
        &mut self,
        name: &str,
        float_op: GLOp,
        int_op: GLOp,
        bool_op: GLOp,
    ) -> Result<()> {
        let dst = self.stream.next()?;
        let a_token = self.stream.next()?;
        let a = self.resolve(a_token, Want::Vec4)?;
        let b_token = self.stream.next()?;
        let b = self.resolve(b_token, Want::Vec4)?;
        let mut ty = self.value_type_of(a);
        if ty.primary == Op::TypeVoid {
            ty = self.value_type_of(b);
        }
        let op = match ty.scalar_kind() {
            Op::TypeFloat => float_op,
            Op::TypeInt => int_op,
            Op::TypeBool => bool_op,
            other => {
                warn!("{} on {:?} operands; assuming float", name, other);
                float_op
            }
        };
        let ty_id = self.type_id(&ty);
        let out = self.new_id(&ty);
        let set = self.glsl_ext;
        self.module.ext_inst(ty_id, out, set, op, &[a, b]);
        self.commit(dst, out)?;
        Ok(())
    }

    fn lower_compare(&mut self, name: &str, float_op: Op, int_op: Op) -> Result<()> {
        let dst = self.stream.next()?;
        let a_token = self.stream.next()?;
        let a = self.resolve(a_token, Want::Vec4)?;
        let b_token = self.stream.next()?;
        let b = self.resolve(b_token, Want::Vec4)?;
        let mut ty = self.value_type_of(a);
        if ty.primary == Op::TypeVoid {
            ty = self.value_type_of(b);
        }
        let result_ty = if ty.is_vector() {
            TypeDescriptor::vector(Op::TypeBool, ty.component_count)
        } else {
            TypeDescriptor::boolean()
        };
        let op = match ty.scalar_kind() {
            Op::TypeFloat => float_op,
            Op::TypeInt | Op::TypeBool => int_op,
            other => {
                warn!("{} on {:?} operands; assuming float", name, other);
                float_op
            }
        };
        let ty_id = self.type_id(&result_ty);
        let out = self.new_id(&result_ty);
        self.module.code(op, &[ty_id, out, a, b]);
        self.commit(dst, out)?;
        Ok(())
    }

    fn lower_rcp(&mut self) -> Result<()> {
        let dst = self.stream.next()?;
        let src = self.stream.next()?;
        let a = self.resolve(src, Want::Vec4)?;
        let ty = self.value_type_of(a);
        let ty_id = self.type_id(&ty);
        let out = self.new_id(&ty);
        match ty.scalar_kind() {
            Op::TypeFloat => {
                let one = if ty.is_vector() { self.vec4_1 } else { self.float_1 };
                self.module.code(Op::FDiv, &[ty_id, out, a, one]);
            }
            Op::TypeInt => {
                let one = self.const_ints[1];
                self.module.code(Op::SDiv, &[ty_id, out, a, one]);
            }
            other => {
                warn!("rcp on {:?} operand; emitting float division", other);
                let one = self.float_1;
                self.module.code(Op::FDiv, &[ty_id, out, a, one]);
            }
        }
        self.commit(dst, out)?;
        Ok(())
    }

    fn lower_frc(&mut self) -> Result<()> {
        let dst = self.stream.next()?;
        let src = self.stream.next()?;
        let a = self.resolve(src, Want::Vec4)?;
        let ty = self.value_type_of(a);
        let ty_id = self.type_id(&ty);

        // Modf wants somewhere to put the integer part even though the
        // shader never reads it.
        let whole_ptr_ty = TypeDescriptor {
            primary: Op::TypePointer,
            secondary: ty.primary,
            ternary: ty.secondary,
            component_count: ty.component_count,
            storage_class: StorageClass::Private,
            args: Vec::new(),
        };
        let whole_ptr_ty_id = self.type_id(&whole_ptr_ty);
        let whole = self.new_id(&whole_ptr_ty);
        self.module
            .variable(whole_ptr_ty_id, whole, StorageClass::Private);

        let out = self.new_id(&ty);
        let set = self.glsl_ext;
        self.module
            .ext_inst(ty_id, out, set, GLOp::Modf, &[a, whole]);
        self.commit(dst, out)?;
        Ok(())
    }

    fn lower_sincos(&mut self) -> Result<()> {
        let dst = self.stream.next()?;
        let src = self.stream.next()?;
        let a = self.resolve(src, Want::Scalar)?;
        if self.major < 3 {
            // SM2 carries two scratch registers of Taylor coefficients the
            // lowering has no use for.
            let _ = self.stream.next()?;
            let _ = self.stream.next()?;
        }

        let float_ty = TypeDescriptor::float();
        let float_ty_id = self.type_id(&float_ty);
        let scalar = if self.value_type_of(a).is_vector() {
            self.composite_extract(a, 0)
        } else {
            a
        };
        let cos = self.new_id(&float_ty);
        let set = self.glsl_ext;
        self.module
            .ext_inst(float_ty_id, cos, set, GLOp::Cos, &[scalar]);
        let sin = self.new_id(&float_ty);
        self.module
            .ext_inst(float_ty_id, sin, set, GLOp::Sin, &[scalar]);

        // z and w are undefined by the instruction; mirror x and y.
        let vec_ty = TypeDescriptor::vector(Op::TypeFloat, 4);
        let vec_ty_id = self.type_id(&vec_ty);
        let out = self.new_id(&vec_ty);
        self.module.code(
            Op::CompositeConstruct,
            &[vec_ty_id, out, cos, sin, cos, sin],
        );
        self.commit(dst, out)?;
        Ok(())
    }

    // --- Matrix-vector ----------------------------------------------------

    fn lower_matrix_multiply(&mut self, name: &str, want: Want) -> Result<()> {
        let dst = self.stream.next()?;
        let vec_token = self.stream.next()?;
        let vec_want = if want == Want::Mat3 {
            Want::Vec3
        } else {
            Want::Vec4
        };
        let vector = self.resolve(vec_token, vec_want)?;
        let mat_token = self.stream.next()?;
        let matrix = self.resolve(mat_token, want)?;

        let ty = self.value_type_of(vector);
        if ty.scalar_kind() != Op::TypeFloat {
            warn!("{} on non-float vector at word {}", name, self.instr_offset);
        }
        let ty_id = self.type_id(&ty);
        let out = self.new_id(&ty);
        self.module
            .code(Op::VectorTimesMatrix, &[ty_id, out, vector, matrix]);
        self.commit(dst, out)?;
        Ok(())
    }

    // --- Texture ----------------------------------------------------------

    fn lower_tex(&mut self) -> Result<()> {
        let dst = self.stream.next()?;
        // ps_1_x samples through the destination register; ps_1_4 takes an
        // explicit coordinate; ps_2_0 adds the sampler operand.
        let coord_token = if self.major > 1 || self.minor >= 4 {
            self.stream.next()?
        } else {
            dst
        };
        let coord = self.resolve(coord_token, Want::Vec2)?;
        let sampler_token = if self.major > 1 {
            self.stream.next()?
        } else {
            coord_token
        };
        let sampler = self.resolve(sampler_token, Want::Sampler)?;

        let vec_ty = TypeDescriptor::vector(Op::TypeFloat, 4);
        let vec_ty_id = self.type_id(&vec_ty);
        let out = self.new_id(&vec_ty);
        self.module
            .code(Op::ImageSampleImplicitLod, &[vec_ty_id, out, sampler, coord]);
        self.commit(dst, out)?;
        Ok(())
    }

    fn lower_texcoord(&mut self) -> Result<()> {
        let dst = self.stream.next()?;
        let src = if self.major > 1 || self.minor >= 4 {
            self.stream.next()?
        } else {
            dst
        };
        let value = self.resolve(src, Want::Vec4)?;
        self.commit(dst, value)?;
        Ok(())
    }

    /// Kill the fragment when any of the first three coordinate components
    /// is negative.
    fn lower_texkill(&mut self) -> Result<()> {
        let src = self.stream.next()?;
        let value = self.resolve(src, Want::Vec4)?;

        let bool_ty = TypeDescriptor::boolean();
        let bool_ty_id = self.type_id(&bool_ty);
        for lane in 0..3 {
            let component = self.composite_extract(value, lane);
            let condition = self.new_id(&bool_ty);
            let zero = self.float_0;
            self.module
                .code(Op::FOrdLessThan, &[bool_ty_id, condition, component, zero]);
            let kill_label = self.label_id();
            let merge_label = self.label_id();
            self.module
                .code(Op::SelectionMerge, &[merge_label, 0]);
            self.module
                .code(Op::BranchConditional, &[condition, kill_label, merge_label]);
            self.module.code(Op::Label, &[kill_label]);
            self.module.code(Op::Kill, &[]);
            self.module.code(Op::Label, &[merge_label]);
        }
        Ok(())
    }

    /// Environment bump mapping: perturb the texture coordinate by the
    /// stage's 2x2 bump matrix applied to the previous stage's color, then
    /// sample.
    fn lower_texbem(&mut self) -> Result<()> {
        let dst = self.stream.next()?;
        let stage = dst.register_number();
        let coord = self.resolve(dst, Want::Vec2)?;
        let sampler = self.resolve(dst, Want::Sampler)?;

        let src = self.stream.next()?;
        // `tex` must have run on the source register first, so this resolves
        // to the sampled rgba.
        let rgba = self.resolve(src, Want::Vec4)?;

        let m00 = self.texture_stage_float(stage, consts::BUMP_ENV_MAT_00);
        let m10 = self.texture_stage_float(stage, consts::BUMP_ENV_MAT_10);
        let m01 = self.texture_stage_float(stage, consts::BUMP_ENV_MAT_01);
        let m11 = self.texture_stage_float(stage, consts::BUMP_ENV_MAT_11);

        let u = self.composite_extract(coord, 0);
        let v = self.composite_extract(coord, 1);
        let r = self.composite_extract(rgba, 0);
        let g = self.composite_extract(rgba, 1);

        let float_ty = TypeDescriptor::float();
        let float_ty_id = self.type_id(&float_ty);
        let mut mul_add = |this: &mut Self, ma: u32, mb: u32, base: u32| {
            let pa = this.new_id(&float_ty);
            this.module.code(Op::FMul, &[float_ty_id, pa, ma, r]);
            let pb = this.new_id(&float_ty);
            this.module.code(Op::FMul, &[float_ty_id, pb, mb, g]);
            let sum = this.new_id(&float_ty);
            this.module.code(Op::FAdd, &[float_ty_id, sum, pa, pb]);
            let out = this.new_id(&float_ty);
            this.module.code(Op::FAdd, &[float_ty_id, out, base, sum]);
            out
        };
        // u' = u + m00*r + m10*g; v' = v + m01*r + m11*g
        let u2 = mul_add(self, m00, m10, u);
        let v2 = mul_add(self, m01, m11, v);

        let vec2_ty = TypeDescriptor::vector(Op::TypeFloat, 2);
        let vec2_ty_id = self.type_id(&vec2_ty);
        let uv = self.new_id(&vec2_ty);
        self.module
            .code(Op::CompositeConstruct, &[vec2_ty_id, uv, u2, v2]);

        let vec4_ty = TypeDescriptor::vector(Op::TypeFloat, 4);
        let vec4_ty_id = self.type_id(&vec4_ty);
        let out = self.new_id(&vec4_ty);
        self.module
            .code(Op::ImageSampleImplicitLod, &[vec4_ty_id, out, sampler, uv]);
        self.commit(dst, out)?;
        Ok(())
    }

    // --- Flow control -----------------------------------------------------

    fn push_if_frame(&mut self) -> (u32, u32, u32) {
        let true_label = self.label_id();
        let false_label = self.label_id();
        let end_label = self.label_id();
        self.if_frames.push(IfFrame {
            false_label,
            end_label,
            saw_else: false,
        });
        (true_label, false_label, end_label)
    }

    fn lower_if(&mut self) -> Result<()> {
        let src = self.stream.next()?;
        let ty = self.register_type_of(src)?;
        let value = self.resolve(src, Want::Vec4)?;
        let value_ty = if ty.is_pointer() { ty.value_type() } else { ty };

        let bool_ty = TypeDescriptor::boolean();
        let bool_ty_id = self.type_id(&bool_ty);
        let condition = match value_ty.scalar_kind() {
            Op::TypeBool => value,
            Op::TypeInt => {
                // Boolean constants load as uints; compare against zero.
                let out = self.new_id(&bool_ty);
                let zero = self.const_ints[0];
                self.module
                    .code(Op::INotEqual, &[bool_ty_id, out, value, zero]);
                out
            }
            Op::TypeFloat => {
                let out = self.new_id(&bool_ty);
                let zero = self.float_0;
                self.module
                    .code(Op::FOrdNotEqual, &[bool_ty_id, out, value, zero]);
                out
            }
            other => {
                warn!("if on {:?} operand; branch not emitted", other);
                self.push_if_frame();
                return Ok(());
            }
        };

        let (true_label, false_label, end_label) = self.push_if_frame();
        self.module.code(Op::SelectionMerge, &[end_label, 0]);
        self.module
            .code(Op::BranchConditional, &[condition, true_label, false_label]);
        self.module.code(Op::Label, &[true_label]);
        Ok(())
    }

    fn lower_ifc(&mut self, control: u32) -> Result<()> {
        let a_token = self.stream.next()?;
        let a = self.resolve(a_token, Want::Vec4)?;
        let b_token = self.stream.next()?;
        let b = self.resolve(b_token, Want::Vec4)?;

        let ty = self.value_type_of(b);
        let is_vector = ty.is_vector() || ty.is_matrix();
        let scalar = ty.scalar_kind();

        let comparison = Comparison::from_u32(control);
        let op = match (comparison, scalar) {
            (Some(Comparison::Gt), Op::TypeFloat) => Op::FOrdGreaterThan,
            (Some(Comparison::Gt), _) => Op::UGreaterThan,
            (Some(Comparison::Eq), Op::TypeFloat) => Op::FOrdEqual,
            (Some(Comparison::Eq), _) => Op::IEqual,
            (Some(Comparison::Ge), Op::TypeFloat) => Op::FOrdGreaterThanEqual,
            (Some(Comparison::Ge), _) => Op::UGreaterThanEqual,
            (Some(Comparison::Lt), Op::TypeFloat) => Op::FOrdLessThan,
            (Some(Comparison::Lt), _) => Op::ULessThan,
            (Some(Comparison::Ne), Op::TypeFloat) => Op::FOrdNotEqual,
            (Some(Comparison::Ne), _) => Op::INotEqual,
            (Some(Comparison::Le), Op::TypeFloat) => Op::FOrdLessThanEqual,
            (Some(Comparison::Le), _) => Op::ULessThanEqual,
            (None, _) => {
                warn!("ifc with unknown predicate {}; assuming equality", control);
                if scalar == Op::TypeFloat {
                    Op::FOrdEqual
                } else {
                    Op::IEqual
                }
            }
        };

        let bool_ty = TypeDescriptor::boolean();
        let bool_ty_id = self.type_id(&bool_ty);
        let condition = if is_vector {
            let bool_vec_ty = TypeDescriptor::vector(Op::TypeBool, 4);
            let bool_vec_ty_id = self.type_id(&bool_vec_ty);
            let compared = self.new_id(&bool_vec_ty);
            self.module.code(op, &[bool_vec_ty_id, compared, a, b]);
            // Fold the four lanes into one condition.
            let c0 = self.composite_extract(compared, 0);
            let c1 = self.composite_extract(compared, 1);
            let c2 = self.composite_extract(compared, 2);
            let c3 = self.composite_extract(compared, 3);
            let c01 = self.new_id(&bool_ty);
            self.module.code(Op::LogicalAnd, &[bool_ty_id, c01, c0, c1]);
            let c23 = self.new_id(&bool_ty);
            self.module.code(Op::LogicalAnd, &[bool_ty_id, c23, c2, c3]);
            let folded = self.new_id(&bool_ty);
            self.module
                .code(Op::LogicalAnd, &[bool_ty_id, folded, c01, c23]);
            folded
        } else {
            let out = self.new_id(&bool_ty);
            self.module.code(op, &[bool_ty_id, out, a, b]);
            out
        };

        let (true_label, false_label, end_label) = self.push_if_frame();
        self.module.code(Op::SelectionMerge, &[end_label, 0]);
        self.module
            .code(Op::BranchConditional, &[condition, true_label, false_label]);
        self.module.code(Op::Label, &[true_label]);
        Ok(())
    }

    fn lower_else(&mut self) {
        let Some(frame) = self.if_frames.last_mut() else {
            warn!("else without a matching if");
            return;
        };
        frame.saw_else = true;
        let (false_label, end_label) = (frame.false_label, frame.end_label);
        self.module.code(Op::Branch, &[end_label]);
        self.module.code(Op::Label, &[false_label]);
    }

    fn lower_endif(&mut self) {
        let Some(frame) = self.if_frames.pop() else {
            warn!("endif without a matching if");
            return;
        };
        if !frame.saw_else {
            // Synthesize the empty else arm.
            self.module.code(Op::Branch, &[frame.end_label]);
            self.module.code(Op::Label, &[frame.false_label]);
        }
        self.module.code(Op::Branch, &[frame.end_label]);
        self.module.code(Op::Label, &[frame.end_label]);
    }

    /// The shared loop skeleton:
    ///
    /// ```text
    /// %pre:    OpBranch %header
    /// %header: %counter = OpPhi %int [0, %pre] [%back, %body]
    ///          %cond = OpSLessThanEqual %counter %count
    ///          OpLoopMerge %end %body
    ///          OpBranchConditional %cond %body %end
    /// %body:   ...
    ///          %back = OpIAdd %counter 1
    ///          OpBranch %header
    /// %end:
    /// ```
    fn lower_loop(&mut self, kind: LoopKind) -> Result<()> {
        let count_token = if kind == LoopKind::Loop {
            // `loop aL, i#`: the counter register itself needs no
            // materialization, the phi below is its value.
            let _counter_register = self.stream.next()?;
            self.stream.next()?
        } else {
            self.stream.next()?
        };
        let count = self.resolve(count_token, Want::Vec4)?;
        // i# loads as an ivec4 of (count, start, step, 0).
        let count = if self.value_type_of(count).is_vector() {
            self.composite_extract(count, 0)
        } else {
            count
        };

        let int_ty = TypeDescriptor::int();
        let int_ty_id = self.type_id(&int_ty);
        let bool_ty = TypeDescriptor::boolean();
        let bool_ty_id = self.type_id(&bool_ty);

        let counter = self.new_id(&int_ty);
        let back_edge = self.new_id(&int_ty);
        let pre_label = self.label_id();
        let header_label = self.label_id();
        let body_label = self.label_id();
        let end_label = self.label_id();

        if kind == LoopKind::Loop {
            self.symbols.bind(RegisterType::Loop, 0, counter);
        }

        self.module.code(Op::Branch, &[pre_label]);
        self.module.code(Op::Label, &[pre_label]);
        self.module.code(Op::Branch, &[header_label]);
        self.module.code(Op::Label, &[header_label]);
        let zero = self.const_ints[0];
        self.module.code(
            Op::Phi,
            &[int_ty_id, counter, zero, pre_label, back_edge, body_label],
        );
        let condition = self.new_id(&bool_ty);
        self.module
            .code(Op::SLessThanEqual, &[bool_ty_id, condition, counter, count]);
        self.module.code(Op::LoopMerge, &[end_label, body_label, 0]);
        self.module
            .code(Op::BranchConditional, &[condition, body_label, end_label]);
        self.module.code(Op::Label, &[body_label]);

        self.loop_frames.push(LoopFrame {
            counter,
            back_edge,
            header_label,
            end_label,
            kind,
        });
        Ok(())
    }

    fn lower_endloop(&mut self, kind: LoopKind) {
        let Some(frame) = self.loop_frames.pop() else {
            warn!("endloop without a matching loop");
            return;
        };
        if frame.kind != kind {
            warn!(
                "{:?} closed by the {:?} terminator",
                frame.kind, kind
            );
        }
        let int_ty_id = self.type_id(&TypeDescriptor::int());
        let one = self.const_ints[1];
        self.module.code(
            Op::IAdd,
            &[int_ty_id, frame.back_edge, frame.counter, one],
        );
        self.module.code(Op::Branch, &[frame.header_label]);
        self.module.code(Op::Label, &[frame.end_label]);
    }

    fn lower_break(&mut self) {
        let Some(frame) = self.loop_frames.last() else {
            warn!("break outside of a loop");
            return;
        };
        let end_label = frame.end_label;
        self.module.code(Op::Branch, &[end_label]);
        // Whatever follows the break still needs a block to live in.
        let unreachable = self.label_id();
        self.module.code(Op::Label, &[unreachable]);
    }
}
