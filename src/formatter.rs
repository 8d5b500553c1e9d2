//! The template language used to build names and paths from resource metadata.
//!
//! ```text
//! {authors#0|def('Unknown')}/{?series|wrap('@ ')}{?series_index|pad_left(2, '0')} - {title}
//! ```
//!
//! Text outside braces is copied as is. A block evaluates its first element,
//! a variable, literal or function call, and feeds the result through every
//! following `|` filter. A block opened with `{?` renders nothing when its
//! first element is empty.

pub mod evaluator;
pub mod functions;
pub mod lexer;
pub mod parser;
pub mod value;

pub use evaluator::{is_valid_template, Evaluator, VarResolver};
pub use functions::{FunctionError, FunctionResult, TemplateFunction};
pub use parser::{parse, unparse, Block, Expr, Node};
pub use value::Value;
