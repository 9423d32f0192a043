//! Query translation pipeline.
//!
//! - **Plan**: the relational query handed over by the planner
//! - **Binder**: table binding through the alias resolver, column resolution
//! - **Pushdown**: split of the filter into native and residual parts
//! - **Translator**: emits the Ickle query and the projection

pub mod binder;
pub mod ickle_translator;
pub mod plan;
pub mod pushdown;

pub use binder::{Binder, Bindings, BoundTable};
pub use ickle_translator::{ProjectedColumn, TranslatedQuery, translate};
pub use plan::{BinaryOp, ColumnRef, Expression, RelationalQuery, TableRef, UnaryOp};
pub use pushdown::{FilterSplitter, NativeExpr, Split};
