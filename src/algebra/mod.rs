//! Algebra: variables, monomials, polynomials and user expressions.
//!
//! Epistemic foundation:
//! - K_i: One `VariableRegistry` per run, passed by value to every template
//! - K_i: A monomial is identified by its exponent vector
//! - B_i: Parsing and evaluation of user expressions → Result

mod expression;
mod monomial;
mod polynomial;
mod registry;
mod template;

pub use expression::*;
pub use monomial::*;
pub use polynomial::*;
pub use registry::*;
pub use template::{build_template, ExpressionFunction, TemplateFunction};
