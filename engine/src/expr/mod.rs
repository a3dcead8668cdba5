// Expression model and type resolver.
//
// - types.rs: arena-based typed AST (nodes, operators, functions, literals)
// - resolver.rs: recursive static type checking against the fact registry

pub mod resolver;
pub mod types;

pub use resolver::{resolve_type, TypeError, MAX_EXPR_DEPTH};
pub use types::{
    ExprId, ExpressionArena, ExpressionNode, FunctionKind, Literal, Operator, ValueType,
};
