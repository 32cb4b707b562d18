use crate::{
    frontend::operator::{BinaryOperator, UnaryOperator},
    middle::ty::{BaseKind, Type},
};

/// Maximum number of scalar components a constant can hold (a 4x4 matrix)
pub const MAX_COMPONENTS: usize = 16;

/// A compile-time value.
///
/// Components are stored as raw 32-bit patterns. Which interpretation (float,
/// int or uint) is meaningful is decided by the type the constant belongs to.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Constant {
    pub words: [u32; MAX_COMPONENTS],
    /// Elements of an array constant
    pub array: Vec<Constant>,
    pub string: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoldError {
    DivisionByZero,
}

impl Constant {
    pub fn from_bool(value: bool) -> Self {
        Self::from_uint(value as u32)
    }

    pub fn from_int(value: i32) -> Self {
        Self::from_uint(value as u32)
    }

    pub fn from_uint(value: u32) -> Self {
        let mut constant = Self::default();
        constant.words[0] = value;
        constant
    }

    pub fn from_float(value: f32) -> Self {
        Self::from_uint(value.to_bits())
    }

    pub fn from_string(value: String) -> Self {
        Self {
            string: value,
            ..Self::default()
        }
    }

    pub fn as_float(&self, index: usize) -> f32 {
        f32::from_bits(self.words[index])
    }

    pub fn as_int(&self, index: usize) -> i32 {
        self.words[index] as i32
    }

    pub fn as_uint(&self, index: usize) -> u32 {
        self.words[index]
    }

    /// Reads the first component as an integer, converting from whatever base
    /// kind the constant has
    pub fn scalar_as_int(&self, base: BaseKind) -> i32 {
        match base {
            BaseKind::Float => self.as_float(0) as i32,
            _ => self.as_int(0),
        }
    }

    /// Picks components by offset into a new constant
    pub fn swizzle(&self, offsets: &[u32]) -> Self {
        let mut result = Self::default();

        for (i, offset) in offsets.iter().enumerate() {
            result.words[i] = self.words[*offset as usize];
        }

        result
    }

    /// Applies a unary operator to every component in place. The constant must
    /// already have been cast to `ty`.
    pub fn fold_unary(&mut self, operator: UnaryOperator, ty: &Type) {
        for i in 0..ty.components() as usize {
            self.words[i] = match operator {
                UnaryOperator::Negate if ty.is_floating_point() => {
                    (-self.as_float(i)).to_bits()
                }
                UnaryOperator::Negate => self.words[i].wrapping_neg(),
                UnaryOperator::BitwiseNot => !self.words[i],
                UnaryOperator::LogicalNot => (self.words[i] == 0) as u32,
            };
        }
    }

    /// Applies a binary operator component-wise, storing the result in `self`.
    ///
    /// Both operands must already have been cast to `ty`. Comparisons produce
    /// boolean components.
    pub fn fold_binary(
        &mut self,
        operator: BinaryOperator,
        ty: &Type,
        rhs: &Constant,
    ) -> Result<(), FoldError> {
        let mut result = Ok(());

        for i in 0..ty.components() as usize {
            let value = match ty.base {
                BaseKind::Float => fold_float(operator, self.as_float(i), rhs.as_float(i)),
                BaseKind::Int => fold_int(operator, self.as_int(i), rhs.as_int(i)),
                _ => fold_uint(operator, self.as_uint(i), rhs.as_uint(i)),
            };

            self.words[i] = value.unwrap_or_else(|error| {
                result = Err(error);
                0
            });
        }

        result
    }

    /// Converts the constant from one type to another: base kind conversion
    /// first, then scalar broadcast or truncation of components.
    pub fn convert(&mut self, from: &Type, to: &Type) {
        if from.is_array() {
            let (from, to) = (from.element(), to.element());

            for element in &mut self.array {
                element.convert(&from, &to);
            }

            return;
        }

        let source_components = (from.components() as usize).min(MAX_COMPONENTS);

        if from.base != to.base {
            for word in &mut self.words[..source_components] {
                *word = convert_component(*word, from.base, to.base);
            }
        }

        let target_components = (to.components() as usize).min(MAX_COMPONENTS);

        if source_components == 1 && target_components > 1 {
            let value = self.words[0];
            self.words[..target_components].fill(value);
        } else if from.is_matrix() && to.is_matrix() && from.cols != to.cols {
            let source = self.words;
            self.words = [0; MAX_COMPONENTS];

            for row in 0..to.rows as usize {
                for col in 0..to.cols as usize {
                    self.words[row * to.cols as usize + col] =
                        source[row * from.cols as usize + col];
                }
            }
        } else if target_components < source_components {
            self.words[target_components..].fill(0);
        }
    }
}

fn convert_component(word: u32, from: BaseKind, to: BaseKind) -> u32 {
    let float = f32::from_bits(word);

    match (from, to) {
        (BaseKind::Float, BaseKind::Bool) => (float != 0.0) as u32,
        (_, BaseKind::Bool) => (word != 0) as u32,
        (BaseKind::Float, BaseKind::Int) => float as i32 as u32,
        (BaseKind::Float, BaseKind::Uint) => float as u32,
        (BaseKind::Int, BaseKind::Float) => (word as i32 as f32).to_bits(),
        (BaseKind::Bool | BaseKind::Uint, BaseKind::Float) => (word as f32).to_bits(),
        // Integral to integral conversions keep the bit pattern
        _ => word,
    }
}

fn fold_float(operator: BinaryOperator, lhs: f32, rhs: f32) -> Result<u32, FoldError> {
    Ok(match operator {
        BinaryOperator::Add => (lhs + rhs).to_bits(),
        BinaryOperator::Subtract => (lhs - rhs).to_bits(),
        BinaryOperator::Multiply => (lhs * rhs).to_bits(),
        BinaryOperator::Divide => (lhs / rhs).to_bits(),
        BinaryOperator::Modulo => (lhs % rhs).to_bits(),
        BinaryOperator::Less => (lhs < rhs) as u32,
        BinaryOperator::Greater => (lhs > rhs) as u32,
        BinaryOperator::LessEqual => (lhs <= rhs) as u32,
        BinaryOperator::GreaterEqual => (lhs >= rhs) as u32,
        BinaryOperator::Equal => (lhs == rhs) as u32,
        BinaryOperator::NotEqual => (lhs != rhs) as u32,
        // Logical and bitwise operators never see float operands
        _ => fold_uint(operator, lhs.to_bits(), rhs.to_bits())?,
    })
}

fn fold_int(operator: BinaryOperator, lhs: i32, rhs: i32) -> Result<u32, FoldError> {
    Ok(match operator {
        BinaryOperator::Add => lhs.wrapping_add(rhs) as u32,
        BinaryOperator::Subtract => lhs.wrapping_sub(rhs) as u32,
        BinaryOperator::Multiply => lhs.wrapping_mul(rhs) as u32,
        BinaryOperator::Divide if rhs == 0 => return Err(FoldError::DivisionByZero),
        BinaryOperator::Divide => lhs.wrapping_div(rhs) as u32,
        BinaryOperator::Modulo if rhs == 0 => return Err(FoldError::DivisionByZero),
        BinaryOperator::Modulo => lhs.wrapping_rem(rhs) as u32,
        BinaryOperator::ShiftRight => lhs.wrapping_shr(rhs as u32) as u32,
        BinaryOperator::Less => (lhs < rhs) as u32,
        BinaryOperator::Greater => (lhs > rhs) as u32,
        BinaryOperator::LessEqual => (lhs <= rhs) as u32,
        BinaryOperator::GreaterEqual => (lhs >= rhs) as u32,
        _ => fold_uint(operator, lhs as u32, rhs as u32)?,
    })
}

fn fold_uint(operator: BinaryOperator, lhs: u32, rhs: u32) -> Result<u32, FoldError> {
    Ok(match operator {
        BinaryOperator::Add => lhs.wrapping_add(rhs),
        BinaryOperator::Subtract => lhs.wrapping_sub(rhs),
        BinaryOperator::Multiply => lhs.wrapping_mul(rhs),
        BinaryOperator::Divide | BinaryOperator::Modulo if rhs == 0 => {
            return Err(FoldError::DivisionByZero);
        }
        BinaryOperator::Divide => lhs / rhs,
        BinaryOperator::Modulo => lhs % rhs,
        BinaryOperator::BitwiseAnd => lhs & rhs,
        BinaryOperator::BitwiseOr => lhs | rhs,
        BinaryOperator::BitwiseXor => lhs ^ rhs,
        BinaryOperator::ShiftLeft => lhs.wrapping_shl(rhs),
        BinaryOperator::ShiftRight => lhs.wrapping_shr(rhs),
        BinaryOperator::LogicalAnd => (lhs != 0 && rhs != 0) as u32,
        BinaryOperator::LogicalOr => (lhs != 0 || rhs != 0) as u32,
        BinaryOperator::Less => (lhs < rhs) as u32,
        BinaryOperator::Greater => (lhs > rhs) as u32,
        BinaryOperator::LessEqual => (lhs <= rhs) as u32,
        BinaryOperator::GreaterEqual => (lhs >= rhs) as u32,
        BinaryOperator::Equal => (lhs == rhs) as u32,
        BinaryOperator::NotEqual => (lhs != rhs) as u32,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_arithmetic_folds() {
        let mut product = Constant::from_int(2);
        product
            .fold_binary(BinaryOperator::Multiply, &Type::INT, &Constant::from_int(3))
            .unwrap();

        let mut sum = Constant::from_int(1);
        sum.fold_binary(BinaryOperator::Add, &Type::INT, &product)
            .unwrap();

        assert_eq!(sum.as_int(0), 7);
    }

    #[test]
    fn shifts_respect_signedness() {
        let mut signed = Constant::from_int(-8);
        signed
            .fold_binary(BinaryOperator::ShiftRight, &Type::INT, &Constant::from_int(1))
            .unwrap();
        assert_eq!(signed.as_int(0), -4);

        let mut unsigned = Constant::from_uint(0x8000_0000);
        unsigned
            .fold_binary(BinaryOperator::ShiftRight, &Type::UINT, &Constant::from_uint(31))
            .unwrap();
        assert_eq!(unsigned.as_uint(0), 1);
    }

    #[test]
    fn division_by_zero_is_reported() {
        let mut value = Constant::from_int(1);
        let result = value.fold_binary(BinaryOperator::Divide, &Type::INT, &Constant::from_int(0));

        assert_eq!(result, Err(FoldError::DivisionByZero));
        assert_eq!(value.as_int(0), 0);

        let mut value = Constant::from_float(1.0);
        let result =
            value.fold_binary(BinaryOperator::Divide, &Type::FLOAT, &Constant::from_float(0.0));
        assert!(result.is_ok());
        assert!(value.as_float(0).is_infinite());
    }

    #[test]
    fn float_equality_compares_values() {
        let mut value = Constant::from_float(-0.0);
        value
            .fold_binary(BinaryOperator::Equal, &Type::FLOAT, &Constant::from_float(0.0))
            .unwrap();
        assert_eq!(value.as_uint(0), 1);

        let mut value = Constant::from_float(1.5);
        value
            .fold_binary(BinaryOperator::NotEqual, &Type::FLOAT, &Constant::from_float(1.5))
            .unwrap();
        assert_eq!(value.as_uint(0), 0);
    }

    #[test]
    fn unary_operators_fold() {
        let mut value = Constant::from_float(2.5);
        value.fold_unary(UnaryOperator::Negate, &Type::FLOAT);
        assert_eq!(value.as_float(0), -2.5);

        let mut value = Constant::from_uint(0);
        value.fold_unary(UnaryOperator::BitwiseNot, &Type::UINT);
        assert_eq!(value.as_uint(0), u32::MAX);

        let mut value = Constant::from_bool(true);
        value.fold_unary(UnaryOperator::LogicalNot, &Type::BOOL);
        assert_eq!(value.as_uint(0), 0);
    }

    #[test]
    fn conversion_broadcasts_and_truncates() {
        let mut value = Constant::from_int(3);
        value.convert(&Type::INT, &Type::vector(BaseKind::Float, 3));
        assert_eq!(&value.words[..4], &[3.0f32.to_bits(), 3.0f32.to_bits(), 3.0f32.to_bits(), 0]);

        value.convert(&Type::vector(BaseKind::Float, 3), &Type::vector(BaseKind::Int, 2));
        assert_eq!(&value.words[..3], &[3, 3, 0]);

        let mut value = Constant::from_float(0.25);
        value.convert(&Type::FLOAT, &Type::BOOL);
        assert_eq!(value.as_uint(0), 1);
    }
}
