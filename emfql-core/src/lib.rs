//! EMFQL Core - Storage-independent EMF/ESQL query parser, Phi algebra and executor.
//!
//! This crate turns multi-feature (EMF) query text into the canonical Phi operator
//! `(S, n, V, F, σ, G)`, compiles it into a scan plan and evaluates that plan over any
//! tabular reader. Only the MF-structure (one record per group) is materialized; the
//! base table is streamed once to discover groups and once per scan unit.
//!
//! # Main Components
//!
//! - **Sections / Lexer / Parser**: ESQL text and Phi-format blocks into an `EmfQuery`
//! - **Validator**: completeness and cross-reference checks
//! - **Phi**: the canonical 6-tuple
//! - **Planner**: MF-structure schema, access paths, scan merging, explain output
//! - **Executor**: runs plans against a `DataSource` trait implementation
//!
//! # Example
//!
//! ```rust
//! use emfql_core::{ColumnType, ColumnTypes, InMemoryDataSource, MfExecutor, Row, Value};
//!
//! let columns = ColumnTypes::from([
//!     ("cust".to_string(), ColumnType::String),
//!     ("state".to_string(), ColumnType::String),
//!     ("quant".to_string(), ColumnType::Int),
//! ]);
//! let row = |cust: &str, state: &str, quant: i64| {
//!     Row::new()
//!         .with("cust", Value::Str(cust.into()))
//!         .with("state", Value::Str(state.into()))
//!         .with("quant", Value::Int(quant))
//! };
//!
//! let mut ds = InMemoryDataSource::new();
//! ds.add_table("sales", columns, vec![row("A", "NY", 5), row("A", "NJ", 9), row("B", "NY", 3)]);
//!
//! let executor = MfExecutor::new(ds);
//! let result = executor
//!     .execute("SELECT cust, sum(x.quant) FROM sales GROUP BY cust; x SUCH THAT x.state = 'NY'")
//!     .unwrap();
//! assert_eq!(
//!     result.rows,
//!     vec![
//!         vec![Value::Str("A".into()), Value::Int(5)],
//!         vec![Value::Str("B".into()), Value::Int(3)],
//!     ]
//! );
//! ```

pub mod ast;
pub mod error;
pub mod executor;
pub mod lexer;
pub mod parser;
pub mod phi;
pub mod planner;
pub mod sections;
pub mod validator;
pub mod value;

// Re-export main types for convenience
pub use ast::{
    AggregateFunction, AggregateKind, ArithmeticOp, CompareOp, Condition, ConditionExpression,
    Connective, EmfQuery, Expression, SelectItem,
};
pub use error::{EmfError, EmfResult};
pub use executor::{
    format_table, DataSource, InMemoryDataSource, MfExecutor, QueryResult, RowFilter, RowIter,
    ScanStats,
};
pub use lexer::{Lexer, Token};
pub use parser::{parse_query, InputFormat, Parser};
pub use phi::PhiOperator;
pub use planner::{compile, AccessPath, Plan, PlanExplain, PlanOptions};
pub use validator::validate;
pub use value::{fold_identifier, ColumnType, ColumnTypes, GroupKey, Row, Value};
