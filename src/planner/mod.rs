//! Query planning.
//!
//! The planner binds SELECT statements against the catalog and produces
//! logical plans whose expressions refer to columns by position.

mod error;
mod logical;
#[allow(clippy::module_inception)]
mod planner;

pub use error::{PlanError, PlanResult};
pub use logical::{
    AggregateExpr, AggregateFunction, BoundExpr, JoinType, LogicalPlan, ScalarFunction, SortSpec,
};
pub use planner::{QueryPlan, QueryPlanner};
