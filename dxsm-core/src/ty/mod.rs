//! Structural SPIR-V type descriptors.
//!
//! D3D9 registers are untyped float4 slots; SPIR-V wants every id typed. The
//! translator describes each type as a flat tuple of up to three SPIR-V type
//! opcodes plus a component count and storage class, nested by convention:
//! a vector's `secondary` is its scalar, a matrix's `secondary` is the column
//! vector kind with `ternary` the scalar, a pointer shifts the pointee into
//! `secondary`/`ternary`.
mod reg;

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use spirv::{Op, StorageClass};

pub use self::reg::TypeRegistry;

#[derive(Clone, Debug)]
pub struct TypeDescriptor {
    pub primary: Op,
    pub secondary: Op,
    pub ternary: Op,
    pub component_count: u32,
    pub storage_class: StorageClass,
    /// Argument type ids of a function type. Not part of the structural
    /// identity; entry-point signatures are all `void()`.
    pub args: Vec<u32>,
}

impl Default for TypeDescriptor {
    fn default() -> TypeDescriptor {
        TypeDescriptor {
            primary: Op::TypeVoid,
            secondary: Op::TypeVoid,
            ternary: Op::TypeVoid,
            component_count: 0,
            storage_class: StorageClass::Input,
            args: Vec::new(),
        }
    }
}

impl TypeDescriptor {
    pub fn void() -> TypeDescriptor {
        TypeDescriptor::default()
    }
    pub fn boolean() -> TypeDescriptor {
        TypeDescriptor {
            primary: Op::TypeBool,
            ..Default::default()
        }
    }
    pub fn int() -> TypeDescriptor {
        TypeDescriptor {
            primary: Op::TypeInt,
            ..Default::default()
        }
    }
    pub fn float() -> TypeDescriptor {
        TypeDescriptor {
            primary: Op::TypeFloat,
            ..Default::default()
        }
    }
    pub fn scalar(kind: Op) -> TypeDescriptor {
        TypeDescriptor {
            primary: kind,
            ..Default::default()
        }
    }
    pub fn vector(scalar: Op, count: u32) -> TypeDescriptor {
        TypeDescriptor {
            primary: Op::TypeVector,
            secondary: scalar,
            component_count: count,
            ..Default::default()
        }
    }
    /// Square float matrix of `count` columns.
    pub fn matrix(count: u32) -> TypeDescriptor {
        TypeDescriptor {
            primary: Op::TypeMatrix,
            secondary: Op::TypeVector,
            ternary: Op::TypeFloat,
            component_count: count,
            ..Default::default()
        }
    }
    pub fn pointer(pointee: Op, scalar: Op, count: u32, storage: StorageClass) -> TypeDescriptor {
        TypeDescriptor {
            primary: Op::TypePointer,
            secondary: pointee,
            ternary: scalar,
            component_count: count,
            storage_class: storage,
            args: Vec::new(),
        }
    }
    pub fn scalar_pointer(scalar: Op, storage: StorageClass) -> TypeDescriptor {
        TypeDescriptor {
            primary: Op::TypePointer,
            secondary: scalar,
            storage_class: storage,
            ..Default::default()
        }
    }
    pub fn image() -> TypeDescriptor {
        TypeDescriptor {
            primary: Op::TypeImage,
            ..Default::default()
        }
    }
    pub fn sampled_image() -> TypeDescriptor {
        TypeDescriptor {
            primary: Op::TypeSampledImage,
            ..Default::default()
        }
    }
    pub fn label() -> TypeDescriptor {
        TypeDescriptor {
            primary: Op::Label,
            ..Default::default()
        }
    }
    pub fn function(return_kind: Op, args: Vec<u32>) -> TypeDescriptor {
        TypeDescriptor {
            primary: Op::TypeFunction,
            secondary: return_kind,
            args,
            ..Default::default()
        }
    }

    pub fn is_pointer(&self) -> bool {
        self.primary == Op::TypePointer
    }
    pub fn is_vector(&self) -> bool {
        self.primary == Op::TypeVector
    }
    pub fn is_matrix(&self) -> bool {
        self.primary == Op::TypeMatrix
    }

    /// The type a load through this pointer produces.
    pub fn value_type(&self) -> TypeDescriptor {
        TypeDescriptor {
            primary: self.secondary,
            secondary: self.ternary,
            ternary: Op::TypeVoid,
            component_count: self.component_count,
            storage_class: self.storage_class,
            args: Vec::new(),
        }
    }

    /// The element type of a composite (a vector's scalar, a matrix's
    /// column scalar).
    pub fn component_type(&self) -> TypeDescriptor {
        TypeDescriptor {
            primary: self.secondary,
            secondary: self.ternary,
            ternary: Op::TypeVoid,
            component_count: self.component_count,
            storage_class: self.storage_class,
            args: Vec::new(),
        }
    }

    /// The pointer type of one component of this pointer-to-composite.
    pub fn pointer_component_type(&self) -> TypeDescriptor {
        TypeDescriptor {
            primary: self.primary,
            secondary: self.ternary,
            ternary: Op::TypeVoid,
            component_count: 0,
            storage_class: self.storage_class,
            args: Vec::new(),
        }
    }

    /// The scalar kind arithmetic should dispatch on: the secondary for
    /// vectors and matrices, the primary otherwise.
    pub fn scalar_kind(&self) -> Op {
        if self.is_vector() || self.is_matrix() {
            self.secondary
        } else {
            self.primary
        }
    }

    /// Structural identity. Fields that do not participate for a given
    /// primary kind are ignored, so for example a vec4 requested for an
    /// Input pointee and a vec4 requested for a Uniform load intern to the
    /// same id.
    fn key(&self) -> (u32, u32, u32, u32, u32) {
        let p = self.primary as u32;
        match self.primary {
            Op::TypeVoid
            | Op::TypeBool
            | Op::TypeInt
            | Op::TypeFloat
            | Op::TypeSampler
            | Op::TypeImage
            | Op::TypeSampledImage
            | Op::Label => (p, 0, 0, 0, 0),
            Op::TypeVector | Op::TypeMatrix | Op::TypeArray => {
                (p, self.secondary as u32, 0, self.component_count, 0)
            }
            Op::TypePointer => (
                p,
                self.secondary as u32,
                self.ternary as u32,
                self.component_count,
                self.storage_class as u32,
            ),
            Op::TypeFunction => (p, self.secondary as u32, self.ternary as u32, 0, 0),
            _ => (
                p,
                self.secondary as u32,
                self.ternary as u32,
                self.component_count,
                self.storage_class as u32,
            ),
        }
    }
}

impl PartialEq for TypeDescriptor {
    fn eq(&self, other: &TypeDescriptor) -> bool {
        self.key() == other.key()
    }
}
impl Eq for TypeDescriptor {}

impl Hash for TypeDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl PartialOrd for TypeDescriptor {
    fn partial_cmp(&self, other: &TypeDescriptor) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for TypeDescriptor {
    fn cmp(&self, other: &TypeDescriptor) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn kind(op: Op, count: u32, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match op {
                Op::TypeFloat => f.write_str("float"),
                Op::TypeInt => f.write_str("uint"),
                Op::TypeBool => f.write_str("bool"),
                Op::TypeImage => f.write_str("image"),
                Op::TypeSampledImage => f.write_str("sampledImage"),
                Op::TypeSampler => f.write_str("sampler"),
                Op::TypeVector => write!(f, "vec{}", count),
                Op::TypeMatrix => write!(f, "mat{}", count),
                Op::TypeArray => write!(f, "array{}", count),
                Op::Label => f.write_str("label"),
                _ => f.write_str("void"),
            }
        }
        if self.primary == Op::TypePointer {
            f.write_str("*")?;
            if self.secondary == Op::TypeVector && self.ternary == Op::TypeInt {
                return write!(f, "uvec{}", self.component_count);
            }
            kind(self.secondary, self.component_count, f)
        } else {
            if self.primary == Op::TypeVector && self.secondary == Op::TypeInt {
                return write!(f, "uvec{}", self.component_count);
            }
            kind(self.primary, self.component_count, f)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_ignores_fields_outside_the_kind() {
        let mut a = TypeDescriptor::vector(Op::TypeFloat, 4);
        let mut b = TypeDescriptor::vector(Op::TypeFloat, 4);
        a.storage_class = StorageClass::Uniform;
        b.ternary = Op::TypeFloat;
        assert_eq!(a, b);
        assert_ne!(a, TypeDescriptor::vector(Op::TypeFloat, 3));
        assert_ne!(a, TypeDescriptor::vector(Op::TypeInt, 4));
    }

    #[test]
    fn pointer_identity_includes_storage_class() {
        let input = TypeDescriptor::pointer(Op::TypeVector, Op::TypeFloat, 4, StorageClass::Input);
        let output =
            TypeDescriptor::pointer(Op::TypeVector, Op::TypeFloat, 4, StorageClass::Output);
        assert_ne!(input, output);
    }

    #[test]
    fn pointer_value_type_shifts_the_pointee_up() {
        let ptr = TypeDescriptor::pointer(Op::TypeVector, Op::TypeFloat, 4, StorageClass::Private);
        let value = ptr.value_type();
        assert_eq!(value, TypeDescriptor::vector(Op::TypeFloat, 4));
        assert_eq!(value.component_type(), TypeDescriptor::float());
        assert_eq!(value.scalar_kind(), Op::TypeFloat);
    }

    #[test]
    fn display_matches_shader_register_shapes() {
        assert_eq!(TypeDescriptor::vector(Op::TypeFloat, 4).to_string(), "vec4");
        assert_eq!(TypeDescriptor::vector(Op::TypeInt, 4).to_string(), "uvec4");
        assert_eq!(
            TypeDescriptor::pointer(Op::TypeVector, Op::TypeFloat, 4, StorageClass::Input)
                .to_string(),
            "*vec4"
        );
        assert_eq!(TypeDescriptor::matrix(4).to_string(), "mat4");
    }
}
