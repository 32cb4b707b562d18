//! Everything the parser builds while it goes: types, folded constants, the
//! symbol table, the IR module and the effect reflection data.

pub mod constant;
pub mod effect;
pub mod expression;
pub mod intrinsics;
pub mod ir;
pub mod symbol;
pub mod ty;
