/// Implements the standard arithmetic operator traits for single-field tuple structs.
///
/// `op!(binary T, Add, add)` implements `Add for T` by delegating to the inner field, and
/// `op!(inplace T, AddAssign, add_assign)` the in-place variant.
#[macro_export]
macro_rules! op {
    (binary $t:ty, $op:ident, $f:ident) => {
        impl std::ops::$op for $t {
            type Output = Self;

            fn $f(self, rhs: Self) -> Self::Output {
                Self(std::ops::$op::$f(self.0, rhs.0))
            }
        }
    };
    (inplace $t:ty, $op:ident, $f:ident) => {
        impl std::ops::$op for $t {
            fn $f(&mut self, rhs: Self) {
                std::ops::$op::$f(&mut self.0, rhs.0)
            }
        }
    };
}
