//! Sluice Expression Evaluator
//!
//! Compiles a boolean predicate once and evaluates it against events, for
//! routing decisions. Field references are slash-rooted paths into the event
//! body (`/resp/status == 200`).
//!
//! # Operators
//!
//! `and`, `or`, `not`, `==`, `!=`, `<`, `<=`, `>`, `>=`, `=~` (regex match),
//! `!~` (regex not-match), `in`, `not in`, with parentheses for grouping.
//!
//! # Semantics
//!
//! - Numeric comparisons promote integer operands to float when the other
//!   side is a float; numeric equality always compares as float.
//! - Any other cross-type comparison is a `TypeMismatch` error.
//! - Referencing an absent field is an `UnknownField` error.
//! - Callers route evaluation errors as "no match" and count them.
//!
//! # Example
//!
//! ```ignore
//! let expr = Expression::parse("/status >= 500 and /service =~ \"^front\"")?;
//! if expr.evaluate(&event)? {
//!     // route
//! }
//! ```

mod error;
mod eval;
mod lexer;
mod parser;

pub use error::ExpressionError;
pub use parser::Expression;

/// Result type for expression operations
pub type Result<T> = std::result::Result<T, ExpressionError>;
