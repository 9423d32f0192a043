//! Per-query execution primitives.
//!
//! - [`filter`] - Residual predicate evaluation with three-valued logic
//! - [`marshaller`] - Decoding and unwinding documents into rows
//! - [`registry`] - Scoped, reference-counted marshaller registration

pub mod filter;
pub mod marshaller;
pub mod registry;

pub use filter::{
    ArithmeticOp, CompareOp, FieldSource, FilterExpr, LikePattern, Operand, ResidualFilter,
};
pub use marshaller::{MarshallerId, ProjectionPlan, Row, RowMarshaller};
pub use registry::MarshallerRegistry;
