use bitflags::bitflags;
use strum::Display;

use crate::middle::ir::Id;

/// The closed set of base kinds. The declaration order is significant: it is
/// the promotion order used when merging the types of two operands.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum BaseKind {
    #[default]
    Void,
    Bool,
    Int,
    Uint,
    Float,
    String,
    Texture,
    Sampler,
    Struct,
    Function,
}

bitflags! {
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Qualifiers: u32 {
        // Storage
        const EXTERN = 1 << 0;
        const STATIC = 1 << 1;
        const UNIFORM = 1 << 2;
        const VOLATILE = 1 << 3;
        const PRECISE = 1 << 4;

        // Parameter direction
        const IN = 1 << 5;
        const OUT = 1 << 6;
        const INOUT = Self::IN.bits() | Self::OUT.bits();

        // Modifier
        const CONST = 1 << 8;

        // Interpolation
        const LINEAR = 1 << 10;
        const NOPERSPECTIVE = 1 << 11;
        const CENTROID = 1 << 12;
        const NOINTERPOLATION = 1 << 13;
    }
}

/// Describes the type of a value, variable or declaration.
///
/// Types are plain values: productions copy them and strip or add qualifiers
/// as they see fit.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Type {
    pub base: BaseKind,
    /// Number of components of a vector, or number of rows of a matrix
    pub rows: u32,
    /// Number of columns of a matrix, 1 for everything else numeric
    pub cols: u32,
    pub qualifiers: Qualifiers,
    /// 0 for non-arrays, -1 for unsized arrays
    pub array_length: i32,
    pub is_pointer: bool,
    pub is_input: bool,
    pub is_output: bool,
    /// Struct or function definition this type refers to
    pub definition: Option<Id>,
}

impl Type {
    pub const MAX_ARRAY_LENGTH: i32 = 65536;

    pub const VOID: Type = Type::new(BaseKind::Void, 0, 0);
    pub const BOOL: Type = Type::new(BaseKind::Bool, 1, 1);
    pub const INT: Type = Type::new(BaseKind::Int, 1, 1);
    pub const UINT: Type = Type::new(BaseKind::Uint, 1, 1);
    pub const FLOAT: Type = Type::new(BaseKind::Float, 1, 1);

    pub const fn new(base: BaseKind, rows: u32, cols: u32) -> Self {
        Self {
            base,
            rows,
            cols,
            qualifiers: Qualifiers::empty(),
            array_length: 0,
            is_pointer: false,
            is_input: false,
            is_output: false,
            definition: None,
        }
    }

    pub const fn scalar(base: BaseKind) -> Self {
        Self::new(base, 1, 1)
    }

    pub const fn vector(base: BaseKind, rows: u32) -> Self {
        Self::new(base, rows, 1)
    }

    pub const fn matrix(base: BaseKind, rows: u32, cols: u32) -> Self {
        Self::new(base, rows, cols)
    }

    pub fn structure(definition: Id) -> Self {
        Self {
            definition: Some(definition),
            ..Self::new(BaseKind::Struct, 0, 0)
        }
    }

    pub fn has(&self, qualifiers: Qualifiers) -> bool {
        self.qualifiers.contains(qualifiers)
    }

    pub fn components(&self) -> u32 {
        self.rows * self.cols
    }

    pub fn is_void(&self) -> bool {
        self.base == BaseKind::Void
    }

    pub fn is_boolean(&self) -> bool {
        self.base == BaseKind::Bool
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self.base,
            BaseKind::Bool | BaseKind::Int | BaseKind::Uint | BaseKind::Float
        )
    }

    pub fn is_integral(&self) -> bool {
        matches!(self.base, BaseKind::Int | BaseKind::Uint)
    }

    pub fn is_floating_point(&self) -> bool {
        self.base == BaseKind::Float
    }

    pub fn is_signed(&self) -> bool {
        matches!(self.base, BaseKind::Int | BaseKind::Float)
    }

    pub fn is_texture(&self) -> bool {
        self.base == BaseKind::Texture
    }

    pub fn is_sampler(&self) -> bool {
        self.base == BaseKind::Sampler
    }

    pub fn is_struct(&self) -> bool {
        self.base == BaseKind::Struct
    }

    pub fn is_array(&self) -> bool {
        self.array_length != 0
    }

    pub fn is_scalar(&self) -> bool {
        self.is_numeric() && !self.is_array() && !self.is_vector() && !self.is_matrix()
    }

    pub fn is_vector(&self) -> bool {
        self.is_numeric() && self.rows > 1 && self.cols == 1
    }

    pub fn is_matrix(&self) -> bool {
        self.is_numeric() && self.rows >= 1 && self.cols > 1
    }

    /// The same type with all qualifiers and pointer markers removed
    pub fn unqualified(&self) -> Self {
        Self {
            qualifiers: Qualifiers::empty(),
            is_pointer: false,
            is_input: false,
            is_output: false,
            ..*self
        }
    }

    /// Type of a single element of an array type
    pub fn element(&self) -> Self {
        Self {
            array_length: 0,
            ..*self
        }
    }

    /// Computes the common type two operands are converted to before a binary
    /// operation is applied to them.
    pub fn merge(lhs: &Type, rhs: &Type) -> Type {
        let base = lhs.base.max(rhs.base);

        let (rows, cols) = if !lhs.is_numeric() || !rhs.is_numeric() {
            (0, 0)
        } else if lhs.is_scalar() || rhs.is_scalar() {
            // Scalars are promoted to the other operand's dimension
            (lhs.rows.max(rhs.rows), lhs.cols.max(rhs.cols))
        } else {
            (lhs.rows.min(rhs.rows), lhs.cols.min(rhs.cols))
        };

        let mut qualifiers = Qualifiers::empty();
        if lhs.has(Qualifiers::PRECISE) || rhs.has(Qualifiers::PRECISE) {
            qualifiers |= Qualifiers::PRECISE;
        }

        Type {
            base,
            rows,
            cols,
            qualifiers,
            array_length: 0,
            is_pointer: false,
            is_input: false,
            is_output: false,
            definition: rhs.definition,
        }
    }

    /// Ranks how well a value of type `src` converts to `dst`. Zero means that
    /// no implicit conversion exists, higher is a better match.
    pub fn rank(src: &Type, dst: &Type) -> u32 {
        // Rows are the conversion cost between base kinds (bool, int, uint, float)
        const RANKS: [[u32; 4]; 4] = [
            [5, 4, 4, 4], // bool
            [3, 5, 4, 4], // int
            [3, 3, 5, 4], // uint
            [3, 2, 2, 5], // float
        ];

        if src.array_length != dst.array_length {
            return 0;
        }

        if src.is_struct() || dst.is_struct() {
            return if src.definition == dst.definition { 32 } else { 0 };
        }

        if !src.is_numeric() || !dst.is_numeric() {
            let same = src.base == dst.base && src.rows == dst.rows && src.cols == dst.cols;
            return if same { 32 } else { 0 };
        }

        if src.is_matrix() && (!dst.is_matrix() || src.rows != dst.rows || src.cols != dst.cols) {
            return 0;
        }

        let numeric_index = |kind: BaseKind| match kind {
            BaseKind::Bool => 0,
            BaseKind::Int => 1,
            BaseKind::Uint => 2,
            _ => 3,
        };

        let rank = RANKS[numeric_index(src.base)][numeric_index(dst.base)] << 2;

        if src.is_scalar() && dst.is_vector() {
            // Scalar to vector promotion has a penalty
            return rank >> 1;
        }

        if (src.is_vector() && dst.is_scalar())
            || (src.is_vector() == dst.is_vector() && src.rows > dst.rows && src.cols >= dst.cols)
        {
            // Vector to scalar conversion or truncation has an even bigger penalty
            return rank >> 2;
        }

        if src.is_vector() != dst.is_vector()
            || src.is_matrix() != dst.is_matrix()
            || src.components() != dst.components()
        {
            return 0;
        }

        rank
    }
}

impl core::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.has(Qualifiers::CONST) {
            f.write_str("const ")?;
        }

        write!(f, "{}", self.base)?;

        if self.is_matrix() {
            write!(f, "{}x{}", self.rows, self.cols)?;
        } else if self.is_vector() {
            write!(f, "{}", self.rows)?;
        }

        match self.array_length {
            0 => Ok(()),
            -1 => f.write_str("[]"),
            n => write!(f, "[{n}]"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicates_follow_dimensions() {
        let float3 = Type::vector(BaseKind::Float, 3);
        let float4x4 = Type::matrix(BaseKind::Float, 4, 4);

        assert!(Type::FLOAT.is_scalar());
        assert!(float3.is_vector() && !float3.is_matrix());
        assert!(float4x4.is_matrix() && !float4x4.is_vector());
        assert_eq!(float4x4.components(), 16);
        assert!(!Type::new(BaseKind::Texture, 0, 0).is_numeric());
    }

    #[test]
    fn merge_promotes_base_and_scalars() {
        let int3 = Type::vector(BaseKind::Int, 3);
        let merged = Type::merge(&int3, &Type::FLOAT);

        assert_eq!(merged.base, BaseKind::Float);
        assert_eq!((merged.rows, merged.cols), (3, 1));

        let float2 = Type::vector(BaseKind::Float, 2);
        let float4 = Type::vector(BaseKind::Float, 4);
        assert_eq!(Type::merge(&float4, &float2).rows, 2);
    }

    #[test]
    fn merge_only_keeps_precise() {
        let mut lhs = Type::FLOAT;
        lhs.qualifiers = Qualifiers::CONST | Qualifiers::PRECISE;

        let merged = Type::merge(&lhs, &Type::FLOAT);
        assert_eq!(merged.qualifiers, Qualifiers::PRECISE);
    }

    #[test]
    fn rank_prefers_exact_matches() {
        let float2 = Type::vector(BaseKind::Float, 2);
        let int2 = Type::vector(BaseKind::Int, 2);

        let exact = Type::rank(&float2, &float2);
        let converted = Type::rank(&int2, &float2);
        let promoted = Type::rank(&Type::FLOAT, &float2);
        let truncated = Type::rank(&Type::vector(BaseKind::Float, 4), &float2);

        assert_eq!(exact, 20);
        assert!(converted > 0 && converted < exact);
        assert!(promoted > 0 && promoted < converted);
        assert!(truncated > 0 && truncated < promoted);
    }

    #[test]
    fn rank_rejects_arrays_and_non_numeric() {
        let mut array = Type::FLOAT;
        array.array_length = 4;

        assert_eq!(Type::rank(&array, &Type::FLOAT), 0);
        assert_eq!(Type::rank(&Type::new(BaseKind::Texture, 0, 0), &Type::FLOAT), 0);
        assert_eq!(
            Type::rank(&Type::vector(BaseKind::Float, 2), &Type::matrix(BaseKind::Float, 2, 2)),
            0
        );
    }

    #[test]
    fn display_uses_shader_names() {
        let mut ty = Type::matrix(BaseKind::Float, 3, 3);
        assert_eq!(ty.to_string(), "float3x3");

        ty.array_length = 2;
        assert_eq!(ty.to_string(), "float3x3[2]");

        assert_eq!(Type::vector(BaseKind::Uint, 2).to_string(), "uint2");
    }
}
