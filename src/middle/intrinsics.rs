//! Closed table of built-in functions.
//!
//! Every entry is one overload: its parameter types, return type and the rule
//! used to lower a call to it. Overload resolution treats intrinsics exactly
//! like user functions.

use once_cell::sync::Lazy;

use crate::middle::{
    ir::{GLOp, Op},
    ty::{BaseKind, Qualifiers, Type},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lowering {
    /// A single instruction over all arguments
    Op(Op),
    /// A `GLSL.std.450` extended instruction over all arguments
    Ext(GLOp),
    /// `1 / x`
    Reciprocal,
    /// Clamp to the [0, 1] range
    Saturate,
    /// Sine and cosine stored through the two output parameters
    SinCos,
    /// Matrix and vector products, with operands swapped because matrices are
    /// stored as rows
    Mul,
    /// Implicit level of detail texture sample
    Sample,
    /// Texture sample with the level of detail in the `w` coordinate
    SampleLod,
}

#[derive(Debug, PartialEq, Eq)]
pub struct Intrinsic {
    pub name: &'static str,
    pub parameters: Vec<Type>,
    pub return_type: Type,
    pub lowering: Lowering,
}

pub fn lookup(name: &str) -> impl Iterator<Item = &'static Intrinsic> + '_ {
    INTRINSICS.iter().filter(move |i| i.name == name)
}

fn float_n(n: u32) -> Type {
    Type::vector(BaseKind::Float, n)
}

fn vector_n(base: BaseKind, n: u32) -> Type {
    Type::vector(base, n)
}

fn output(mut ty: Type) -> Type {
    ty.qualifiers = Qualifiers::OUT;
    ty.is_pointer = true;
    ty
}

static INTRINSICS: Lazy<Vec<Intrinsic>> = Lazy::new(|| {
    let mut table = Vec::new();

    let mut add = |name: &'static str, parameters: Vec<Type>, return_type: Type, lowering| {
        table.push(Intrinsic {
            name,
            parameters,
            return_type,
            lowering,
        })
    };

    let unary_float = [
        ("abs", Lowering::Ext(GLOp::FAbs)),
        ("sign", Lowering::Ext(GLOp::FSign)),
        ("floor", Lowering::Ext(GLOp::Floor)),
        ("ceil", Lowering::Ext(GLOp::Ceil)),
        ("frac", Lowering::Ext(GLOp::Fract)),
        ("round", Lowering::Ext(GLOp::Round)),
        ("trunc", Lowering::Ext(GLOp::Trunc)),
        ("sin", Lowering::Ext(GLOp::Sin)),
        ("cos", Lowering::Ext(GLOp::Cos)),
        ("tan", Lowering::Ext(GLOp::Tan)),
        ("asin", Lowering::Ext(GLOp::Asin)),
        ("acos", Lowering::Ext(GLOp::Acos)),
        ("atan", Lowering::Ext(GLOp::Atan)),
        ("sinh", Lowering::Ext(GLOp::Sinh)),
        ("cosh", Lowering::Ext(GLOp::Cosh)),
        ("tanh", Lowering::Ext(GLOp::Tanh)),
        ("exp", Lowering::Ext(GLOp::Exp)),
        ("exp2", Lowering::Ext(GLOp::Exp2)),
        ("log", Lowering::Ext(GLOp::Log)),
        ("log2", Lowering::Ext(GLOp::Log2)),
        ("sqrt", Lowering::Ext(GLOp::Sqrt)),
        ("rsqrt", Lowering::Ext(GLOp::InverseSqrt)),
        ("normalize", Lowering::Ext(GLOp::Normalize)),
        ("ddx", Lowering::Op(Op::DPdx)),
        ("ddy", Lowering::Op(Op::DPdy)),
        ("fwidth", Lowering::Op(Op::Fwidth)),
        ("rcp", Lowering::Reciprocal),
        ("saturate", Lowering::Saturate),
    ];

    let binary_float = [
        ("atan2", Lowering::Ext(GLOp::Atan2)),
        ("pow", Lowering::Ext(GLOp::Pow)),
        ("min", Lowering::Ext(GLOp::FMin)),
        ("max", Lowering::Ext(GLOp::FMax)),
        ("step", Lowering::Ext(GLOp::Step)),
        ("reflect", Lowering::Ext(GLOp::Reflect)),
    ];

    let ternary_float = [
        ("clamp", Lowering::Ext(GLOp::FClamp)),
        ("lerp", Lowering::Ext(GLOp::FMix)),
        ("smoothstep", Lowering::Ext(GLOp::SmoothStep)),
        ("mad", Lowering::Ext(GLOp::Fma)),
    ];

    for n in 1..=4 {
        let ty = float_n(n);

        for (name, lowering) in unary_float {
            add(name, vec![ty], ty, lowering);
        }

        for (name, lowering) in binary_float {
            add(name, vec![ty, ty], ty, lowering);
        }

        for (name, lowering) in ternary_float {
            add(name, vec![ty, ty, ty], ty, lowering);
        }

        add("length", vec![ty], Type::FLOAT, Lowering::Ext(GLOp::Length));
        add(
            "distance",
            vec![ty, ty],
            Type::FLOAT,
            Lowering::Ext(GLOp::Distance),
        );

        let bool_n = vector_n(BaseKind::Bool, n);
        add("isnan", vec![ty], bool_n, Lowering::Op(Op::IsNan));
        add("isinf", vec![ty], bool_n, Lowering::Op(Op::IsInf));

        add(
            "sincos",
            vec![ty, output(ty), output(ty)],
            Type::VOID,
            Lowering::SinCos,
        );

        let int_n = vector_n(BaseKind::Int, n);
        let uint_n = vector_n(BaseKind::Uint, n);

        add("abs", vec![int_n], int_n, Lowering::Ext(GLOp::SAbs));
        add("min", vec![int_n, int_n], int_n, Lowering::Ext(GLOp::SMin));
        add("max", vec![int_n, int_n], int_n, Lowering::Ext(GLOp::SMax));
        add(
            "clamp",
            vec![int_n, int_n, int_n],
            int_n,
            Lowering::Ext(GLOp::SClamp),
        );
        add("min", vec![uint_n, uint_n], uint_n, Lowering::Ext(GLOp::UMin));
        add("max", vec![uint_n, uint_n], uint_n, Lowering::Ext(GLOp::UMax));
        add(
            "clamp",
            vec![uint_n, uint_n, uint_n],
            uint_n,
            Lowering::Ext(GLOp::UClamp),
        );
    }

    for n in 2..=4 {
        let ty = float_n(n);
        let bool_n = vector_n(BaseKind::Bool, n);
        let matrix = Type::matrix(BaseKind::Float, n, n);

        add("dot", vec![ty, ty], Type::FLOAT, Lowering::Op(Op::Dot));
        add("all", vec![bool_n], Type::BOOL, Lowering::Op(Op::All));
        add("any", vec![bool_n], Type::BOOL, Lowering::Op(Op::Any));

        add("mul", vec![matrix, ty], ty, Lowering::Mul);
        add("mul", vec![ty, matrix], ty, Lowering::Mul);
        add("mul", vec![matrix, matrix], matrix, Lowering::Mul);
    }

    add(
        "cross",
        vec![float_n(3), float_n(3)],
        float_n(3),
        Lowering::Ext(GLOp::Cross),
    );

    let sampler = Type::new(BaseKind::Sampler, 0, 0);
    add("tex2D", vec![sampler, float_n(2)], float_n(4), Lowering::Sample);
    add("tex2Dlod", vec![sampler, float_n(4)], float_n(4), Lowering::SampleLod);

    table
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedicated_lowerings_are_registered() {
        assert!(lookup("rcp").all(|i| i.lowering == Lowering::Reciprocal));
        assert!(lookup("saturate").all(|i| i.lowering == Lowering::Saturate));

        let sincos = lookup("sincos").next().unwrap();
        assert!(sincos.return_type.is_void());
        assert!(sincos.parameters[1].is_pointer && sincos.parameters[1].has(Qualifiers::OUT));
    }

    #[test]
    fn overloads_cover_every_vector_width() {
        assert_eq!(lookup("sin").count(), 4);
        assert_eq!(lookup("dot").count(), 3);
        assert_eq!(lookup("nonexistent").count(), 0);
    }
}
