//! Solver backends.
//!
//! A backend takes a fully built [`LinearModel`] and returns a status plus
//! per-variable values. Calls are blocking and single shot: there is no retry
//! and no timeout at this layer.

use good_lp::{Expression, ProblemVariables, ResolutionError, Solution as _, SolverModel, variable};
use tracing::debug;

use crate::solver::model::{LinearExpr, LinearModel, Relation, Sense, VarKind};

/// Values of an optimal solution.
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    /// One value per model variable, indexed by [`VarId::index`](crate::solver::VarId::index).
    /// Integer and binary variables are rounded to the nearest whole number.
    pub values: Vec<f64>,
    /// Objective evaluated on `values`.
    pub objective: f64,
}

/// Result status of a solve call.
#[derive(Debug, Clone, PartialEq)]
pub enum SolveOutcome {
    Optimal(Solution),
    Infeasible,
    Unbounded,
    Failed(String),
}

/// A constrained-optimization engine that can solve a [`LinearModel`].
pub trait SolverBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn solve(&self, model: &LinearModel) -> SolveOutcome;
}

/// Production backend: `good_lp` driving the pure-Rust `microlp` solver.
#[derive(Debug, Clone, Copy, Default)]
pub struct GoodLpBackend;

impl SolverBackend for GoodLpBackend {
    fn name(&self) -> &'static str {
        "good_lp/microlp"
    }

    fn solve(&self, model: &LinearModel) -> SolveOutcome {
        let mut vars = ProblemVariables::new();
        let handles: Vec<good_lp::Variable> = model
            .variables()
            .iter()
            .map(|v| {
                let mut def = variable().name(v.name.clone()).min(v.lower);
                if let Some(upper) = v.upper {
                    def = def.max(upper);
                }
                match v.kind {
                    VarKind::Continuous => {}
                    VarKind::Integer => def = def.integer(),
                    VarKind::Binary => def = def.binary(),
                }
                vars.add(def)
            })
            .collect();

        let to_expression = |expr: &LinearExpr| -> Expression {
            let mut out = Expression::from(expr.constant);
            for (var, coef) in &expr.terms {
                out += *coef * handles[var.index()];
            }
            out
        };

        let objective = to_expression(model.objective());
        let unsolved = match model.sense() {
            Sense::Minimize => vars.minimise(objective),
            Sense::Maximize => vars.maximise(objective),
        };
        let mut problem = unsolved.using(good_lp::solvers::microlp::microlp);

        for c in model.constraints() {
            let lhs = to_expression(&c.expr);
            let constraint = match c.relation {
                Relation::Le => good_lp::constraint::leq(lhs, c.rhs),
                Relation::Ge => good_lp::constraint::geq(lhs, c.rhs),
                Relation::Eq => good_lp::constraint::eq(lhs, c.rhs),
            };
            problem = problem.with(constraint);
        }

        debug!(
            backend = self.name(),
            variables = model.variables().len(),
            constraints = model.constraints().len(),
            "solving linear model"
        );

        match problem.solve() {
            Ok(solution) => {
                let values: Vec<f64> = model
                    .variables()
                    .iter()
                    .zip(&handles)
                    .map(|(v, handle)| {
                        let raw = solution.value(*handle);
                        match v.kind {
                            VarKind::Continuous => raw,
                            VarKind::Integer | VarKind::Binary => raw.round(),
                        }
                    })
                    .collect();
                let objective = model.objective().evaluate(&values);
                SolveOutcome::Optimal(Solution { values, objective })
            }
            Err(ResolutionError::Infeasible) => SolveOutcome::Infeasible,
            Err(ResolutionError::Unbounded) => SolveOutcome::Unbounded,
            Err(e) => SolveOutcome::Failed(e.to_string()),
        }
    }
}
