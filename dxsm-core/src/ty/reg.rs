use fnv::FnvHashMap;
use log::warn;
use spirv::{Decoration, Dim, ImageFormat, Op, StorageClass};

use crate::spv::ModuleBuilder;
use crate::ty::TypeDescriptor;

type TypeId = u32;

/// Interns type descriptors to stable result ids and tracks the type of
/// every id the translation produces.
///
/// The first interning of a descriptor emits its declaration into the type
/// section, materializing dependencies first; structurally equal descriptors
/// always come back with the same id, which keeps the module free of
/// duplicate type declarations.
#[derive(Default)]
pub struct TypeRegistry {
    ty_ids: FnvHashMap<TypeDescriptor, TypeId>,
    id_tys: FnvHashMap<TypeId, TypeDescriptor>,
    length_ids: [u32; 17],
}

impl TypeRegistry {
    pub fn new() -> TypeRegistry {
        TypeRegistry::default()
    }

    /// Array lengths are encoded as constant ids. The preamble produces the
    /// small-integer constants once and registers them here before any array
    /// type can be requested.
    pub fn set_length_constants(&mut self, ids: [u32; 17]) {
        self.length_ids = ids;
    }

    /// Record the type of a non-type id (an instruction result).
    pub fn bind(&mut self, id: u32, ty: TypeDescriptor) {
        self.id_tys.insert(id, ty);
    }

    /// The type of an id. Ids that were never bound read as void, which is
    /// what the untyped fall-back paths expect.
    pub fn type_of(&self, id: u32) -> TypeDescriptor {
        self.id_tys.get(&id).cloned().unwrap_or_default()
    }

    /// Intern `desc`, emitting declarations on first use.
    pub fn intern(&mut self, module: &mut ModuleBuilder, desc: &TypeDescriptor) -> TypeId {
        let mut desc = desc.clone();
        // Image-typed pointers live in UniformConstant storage no matter
        // what the requester asked for.
        if desc.primary == Op::TypePointer
            && matches!(
                (desc.secondary, desc.ternary),
                (Op::TypeImage | Op::TypeSampledImage, _) | (_, Op::TypeImage | Op::TypeSampledImage)
            )
        {
            desc.storage_class = StorageClass::UniformConstant;
        }

        if let Some(&id) = self.ty_ids.get(&desc) {
            return id;
        }

        let mut id = module.alloc_id();
        match desc.primary {
            Op::TypeVoid | Op::TypeBool | Op::TypeSampler => {
                module.ty_instr(desc.primary, &[id]);
            }
            Op::TypeInt => {
                // All shader integers are 32-bit unsigned; signed arithmetic
                // selects signed opcodes instead of a distinct type.
                module.ty_instr(Op::TypeInt, &[id, 32, 0]);
            }
            Op::TypeFloat => {
                module.ty_instr(Op::TypeFloat, &[id, 32]);
            }
            Op::TypeVector => {
                let scalar = self.intern(module, &TypeDescriptor::scalar(desc.secondary));
                module.ty_instr(Op::TypeVector, &[id, scalar, desc.component_count]);
            }
            Op::TypeMatrix => {
                let column = self.intern(
                    module,
                    &TypeDescriptor::vector(Op::TypeFloat, desc.component_count),
                );
                module.ty_instr(Op::TypeMatrix, &[id, column, desc.component_count]);
                module.decorate(id, Decoration::ColMajor, &[]);
            }
            Op::TypeArray => {
                let element = self.intern(
                    module,
                    &TypeDescriptor {
                        primary: desc.secondary,
                        secondary: desc.ternary,
                        ..Default::default()
                    },
                );
                let length = self
                    .length_ids
                    .get(desc.component_count as usize)
                    .copied()
                    .unwrap_or(0);
                if length == 0 {
                    warn!(
                        "array type of length {} requested before its length constant exists",
                        desc.component_count
                    );
                }
                module.ty_instr(Op::TypeArray, &[id, element, length]);
            }
            Op::TypePointer => {
                let pointee = self.intern(module, &desc.value_type());
                module.ty_instr(
                    Op::TypePointer,
                    &[id, desc.storage_class as u32, pointee],
                );
            }
            Op::TypeImage | Op::TypeSampledImage => {
                // Both requests produce the pair: the bare image type, then
                // the sampled-image wrapper the sampling instructions want.
                let image_id = id;
                let sampled_ty = self.intern(module, &TypeDescriptor::float());
                id = module.alloc_id();
                module.ty_instr(
                    Op::TypeImage,
                    &[
                        image_id,
                        sampled_ty,
                        Dim::Dim2D as u32,
                        0, // not a depth image
                        0, // not arrayed
                        0, // not multisampled
                        1, // used with a sampler
                        ImageFormat::Unknown as u32,
                    ],
                );
                module.ty_instr(Op::TypeSampledImage, &[id, image_id]);
            }
            Op::TypeFunction => {
                let ret = self.intern(module, &TypeDescriptor::scalar(desc.secondary));
                let mut operands = vec![id, ret];
                operands.extend_from_slice(&desc.args);
                module.ty_instr(Op::TypeFunction, &operands);
            }
            other => {
                warn!("no declaration emitted for type kind {:?}", other);
            }
        }

        self.ty_ids.insert(desc.clone(), id);
        self.id_tys.insert(id, desc);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spv::Instrs;

    #[test]
    fn structurally_equal_descriptors_share_an_id() {
        let mut module = ModuleBuilder::new();
        let mut registry = TypeRegistry::new();
        let vec4 = TypeDescriptor::vector(Op::TypeFloat, 4);
        let a = registry.intern(&mut module, &vec4);
        let b = registry.intern(&mut module, &vec4);
        assert_eq!(a, b);

        let words = module.assemble(0);
        let vectors = Instrs::of_module(&words)
            .unwrap()
            .filter(|x| x.op() == Some(Op::TypeVector))
            .count();
        assert_eq!(vectors, 1);
    }

    #[test]
    fn dependencies_are_materialized_first() {
        let mut module = ModuleBuilder::new();
        let mut registry = TypeRegistry::new();
        let ptr =
            TypeDescriptor::pointer(Op::TypeVector, Op::TypeFloat, 4, StorageClass::Private);
        registry.intern(&mut module, &ptr);

        let words = module.assemble(0);
        let ops: Vec<_> = Instrs::of_module(&words)
            .unwrap()
            .filter_map(|x| x.op())
            .filter(|x| *x != Op::Decorate)
            .collect();
        assert_eq!(ops, vec![Op::TypeFloat, Op::TypeVector, Op::TypePointer]);
    }

    #[test]
    fn image_pointers_are_forced_to_uniform_constant() {
        let mut module = ModuleBuilder::new();
        let mut registry = TypeRegistry::new();
        let requested =
            TypeDescriptor::pointer(Op::TypeImage, Op::TypeVoid, 0, StorageClass::Input);
        let id = registry.intern(&mut module, &requested);
        // A second request with the canonical class must not re-declare.
        let again = registry.intern(
            &mut module,
            &TypeDescriptor::pointer(Op::TypeImage, Op::TypeVoid, 0, StorageClass::UniformConstant),
        );
        assert_eq!(id, again);

        let words = module.assemble(0);
        let pointer = Instrs::of_module(&words)
            .unwrap()
            .find(|x| x.op() == Some(Op::TypePointer))
            .unwrap();
        assert_eq!(pointer.operand(1), Some(StorageClass::UniformConstant as u32));
    }

    #[test]
    fn sampled_image_request_emits_the_pair() {
        let mut module = ModuleBuilder::new();
        let mut registry = TypeRegistry::new();
        let id = registry.intern(&mut module, &TypeDescriptor::image());
        let words = module.assemble(0);
        let sampled = Instrs::of_module(&words)
            .unwrap()
            .find(|x| x.op() == Some(Op::TypeSampledImage))
            .unwrap();
        assert_eq!(sampled.operand(0), Some(id));
    }

    #[test]
    fn unbound_ids_read_as_void() {
        let registry = TypeRegistry::new();
        assert_eq!(registry.type_of(42).primary, Op::TypeVoid);
    }
}
