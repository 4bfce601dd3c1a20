//! Convex quadratic programming.
//!
//! Solves problems of the form
//!
//! ```text
//! minimize    ½ xᵀPx + qᵀx
//! subject to  l ≤ Ax ≤ u
//! ```
//!
//! with `P` symmetric positive semidefinite, using the alternating direction
//! method of multipliers (the operator-splitting scheme popularised by OSQP):
//!
//! 1. Ruiz equilibration of `P` and `A`, followed by cost scaling.
//! 2. ADMM iterations on the scaled problem with over-relaxation and an
//!    adaptive penalty `ρ` (refactored whenever it moves by more than 5x).
//! 3. Primal / dual infeasibility certificates checked every iteration.
//! 4. A polish step that guesses the active set from the ADMM iterate and
//!    solves the resulting equality-constrained KKT system exactly. The
//!    polished point is kept only if it is primal feasible and its
//!    multipliers have the right signs, which makes it an exact optimum.
//! 5. When ADMM reaches the iteration cap and the polish is rejected, the
//!    problem is handed to Clarabel's primal-dual interior-point method and
//!    its answer is polished the same way.
//!
//! Linear programs are the special case `P = 0`.

use clarabel::algebra::CscMatrix;
use nalgebra::{Cholesky, DMatrix, DVector, Dyn};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{MathError, MathResult};
use crate::linear_algebra::symmetrize;

const RHO_MIN: f64 = 1e-6;
const RHO_MAX: f64 = 1e6;
const RHO_EQUALITY_FACTOR: f64 = 1e3;
const RHO_UPDATE_RATIO: f64 = 5.0;

const SCALING_ITERATIONS: usize = 10;
const MIN_SCALING: f64 = 1e-4;
const MAX_SCALING: f64 = 1e4;
const MIN_COST_SCALING: f64 = 1e-10;
const MAX_COST_SCALING: f64 = 1e10;

const POLISH_DELTA: f64 = 1e-9;
const POLISH_REFINEMENT_STEPS: usize = 5;
const POLISH_FEASIBILITY_TOLERANCE: f64 = 1e-9;
const POLISH_DUAL_TOLERANCE: f64 = 1e-7;

const INTERIOR_POINT_MAX_ITERATIONS: u32 = 200;

const TINY: f64 = 1e-30;

/// Settings for the ADMM quadratic programming solver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QpSettings {
    /// Absolute and relative tolerance on the primal and dual residuals.
    pub tolerance: f64,
    /// Tolerance used by the infeasibility certificates.
    pub infeasibility_tolerance: f64,
    /// Maximum number of ADMM iterations.
    pub max_iterations: u32,
    /// Initial ADMM penalty parameter.
    pub rho: f64,
    /// Proximal regularization on `x`.
    pub sigma: f64,
    /// Over-relaxation parameter in (0, 2).
    pub alpha: f64,
    /// Number of iterations between penalty updates (0 disables).
    pub adaptive_rho_interval: u32,
    /// Whether to run the active-set polish step.
    pub polish: bool,
}

impl Default for QpSettings {
    fn default() -> Self {
        Self {
            tolerance: 1e-9,
            infeasibility_tolerance: 1e-6,
            max_iterations: 20_000,
            rho: 0.1,
            sigma: 1e-6,
            alpha: 1.6,
            adaptive_rho_interval: 25,
            polish: true,
        }
    }
}

impl QpSettings {
    /// Sets the residual tolerance.
    #[must_use]
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Sets the iteration cap.
    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Enables or disables polishing.
    #[must_use]
    pub fn with_polish(mut self, polish: bool) -> Self {
        self.polish = polish;
        self
    }

    /// Checks that every setting is in its admissible range.
    pub fn validate(&self) -> MathResult<()> {
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(MathError::invalid_input("QP tolerance must be positive"));
        }
        if !(self.infeasibility_tolerance.is_finite() && self.infeasibility_tolerance > 0.0) {
            return Err(MathError::invalid_input(
                "QP infeasibility tolerance must be positive",
            ));
        }
        if self.max_iterations == 0 {
            return Err(MathError::invalid_input("QP max_iterations must be at least 1"));
        }
        if !(self.rho.is_finite() && self.rho > 0.0) {
            return Err(MathError::invalid_input("QP rho must be positive"));
        }
        if !(self.sigma.is_finite() && self.sigma > 0.0) {
            return Err(MathError::invalid_input("QP sigma must be positive"));
        }
        if !(self.alpha > 0.0 && self.alpha < 2.0) {
            return Err(MathError::invalid_input("QP alpha must lie in (0, 2)"));
        }
        Ok(())
    }
}

/// Solution of a quadratic program.
#[derive(Debug, Clone)]
pub struct QpSolution {
    /// Primal solution.
    pub x: DVector<f64>,
    /// Constraint multipliers (negative for active lower bounds, positive
    /// for active upper bounds).
    pub duals: DVector<f64>,
    /// Objective value `½ xᵀPx + qᵀx` at `x`.
    pub objective: f64,
    /// ADMM iterations used.
    pub iterations: u32,
    /// Whether the returned point came from the polish step.
    pub polished: bool,
}

/// A convex quadratic program `min ½ xᵀPx + qᵀx  s.t.  l ≤ Ax ≤ u`.
///
/// Constraints are added one row at a time; infinite bounds are allowed on
/// either side.
#[derive(Debug, Clone)]
pub struct QuadraticProgram {
    p: DMatrix<f64>,
    q: DVector<f64>,
    rows: Vec<DVector<f64>>,
    lower: Vec<f64>,
    upper: Vec<f64>,
}

impl QuadraticProgram {
    /// Creates an unconstrained problem from `P` and `q`.
    ///
    /// `P` is symmetrized; it must be square, finite and match `q`.
    pub fn new(p: DMatrix<f64>, q: DVector<f64>) -> MathResult<Self> {
        if p.nrows() != p.ncols() || p.nrows() != q.len() {
            return Err(MathError::DimensionMismatch {
                rows1: p.nrows(),
                cols1: p.ncols(),
                rows2: q.len(),
                cols2: 1,
            });
        }
        if q.is_empty() {
            return Err(MathError::invalid_input("problem has no variables"));
        }
        if p.iter().chain(q.iter()).any(|v| !v.is_finite()) {
            return Err(MathError::invalid_input("objective contains non-finite values"));
        }

        Ok(Self {
            p: symmetrize(&p),
            q,
            rows: Vec::new(),
            lower: Vec::new(),
            upper: Vec::new(),
        })
    }

    /// Creates a linear program `min qᵀx`.
    pub fn linear(q: DVector<f64>) -> MathResult<Self> {
        let n = q.len();
        Self::new(DMatrix::zeros(n, n), q)
    }

    /// Number of decision variables.
    pub fn dimension(&self) -> usize {
        self.q.len()
    }

    /// Number of constraint rows.
    pub fn num_constraints(&self) -> usize {
        self.rows.len()
    }

    /// Adds the constraint `lower ≤ rowᵀx ≤ upper`.
    pub fn add_constraint(&mut self, row: DVector<f64>, lower: f64, upper: f64) -> MathResult<()> {
        if row.len() != self.dimension() {
            return Err(MathError::DimensionMismatch {
                rows1: 1,
                cols1: row.len(),
                rows2: self.dimension(),
                cols2: 1,
            });
        }
        if row.iter().any(|v| !v.is_finite()) {
            return Err(MathError::invalid_input("constraint row contains non-finite values"));
        }
        if lower.is_nan() || upper.is_nan() || lower == f64::INFINITY || upper == f64::NEG_INFINITY
        {
            return Err(MathError::invalid_input(format!(
                "invalid constraint bounds [{lower}, {upper}]"
            )));
        }

        self.rows.push(row);
        self.lower.push(lower);
        self.upper.push(upper);
        Ok(())
    }

    /// Adds the equality `rowᵀx = rhs`.
    pub fn add_equality(&mut self, row: DVector<f64>, rhs: f64) -> MathResult<()> {
        self.add_constraint(row, rhs, rhs)
    }

    /// Adds the inequality `rowᵀx ≥ rhs`.
    pub fn add_greater_equal(&mut self, row: DVector<f64>, rhs: f64) -> MathResult<()> {
        self.add_constraint(row, rhs, f64::INFINITY)
    }

    /// Adds the inequality `rowᵀx ≤ rhs`.
    pub fn add_less_equal(&mut self, row: DVector<f64>, rhs: f64) -> MathResult<()> {
        self.add_constraint(row, f64::NEG_INFINITY, rhs)
    }

    /// Adds `lower ≤ x_j ≤ upper` for every variable `j`.
    pub fn add_variable_bounds(&mut self, lower: f64, upper: f64) -> MathResult<()> {
        let n = self.dimension();
        for j in 0..n {
            let mut row = DVector::zeros(n);
            row[j] = 1.0;
            self.add_constraint(row, lower, upper)?;
        }
        Ok(())
    }

    /// Objective value `½ xᵀPx + qᵀx`.
    pub fn objective(&self, x: &DVector<f64>) -> f64 {
        0.5 * x.dot(&(&self.p * x)) + self.q.dot(x)
    }

    /// Largest constraint violation at `x` (0 when feasible).
    pub fn max_violation(&self, x: &DVector<f64>) -> f64 {
        self.rows
            .iter()
            .zip(self.lower.iter().zip(self.upper.iter()))
            .map(|(row, (&l, &u))| {
                let v = row.dot(x);
                (l - v).max(v - u).max(0.0)
            })
            .fold(0.0, f64::max)
    }

    /// Solves the problem.
    ///
    /// # Errors
    ///
    /// - [`MathError::Infeasible`] when a bound pair crosses or a primal
    ///   infeasibility certificate is found.
    /// - [`MathError::Unbounded`] when a dual infeasibility certificate is
    ///   found.
    /// - [`MathError::ConvergenceFailed`] when the residuals do not reach the
    ///   tolerance within `max_iterations`.
    pub fn solve(&self, settings: &QpSettings) -> MathResult<QpSolution> {
        settings.validate()?;

        for (i, (&l, &u)) in self.lower.iter().zip(self.upper.iter()).enumerate() {
            if l > u {
                return Err(MathError::infeasible(format!(
                    "constraint {i} has lower bound {l} above upper bound {u}"
                )));
            }
        }

        let scaled = ScaledProblem::new(self);
        let mut admm = Admm::new(&scaled, settings)?;

        let mut converged = false;
        let mut iterations = 0;
        let mut last_residuals = Residuals::default();

        for iteration in 1..=settings.max_iterations {
            iterations = iteration;
            let (delta_x, delta_y) = admm.step(&scaled, settings);
            let residuals = scaled.residuals(&admm.x, &admm.z, &admm.y);

            if residuals.converged(settings.tolerance) {
                converged = true;
                last_residuals = residuals;
                break;
            }

            if scaled.is_primal_infeasible(&delta_y, settings.infeasibility_tolerance) {
                debug!(iteration, "QP primal infeasibility certificate found");
                return Err(MathError::infeasible(
                    "no point satisfies every constraint",
                ));
            }
            if scaled.is_dual_infeasible(&delta_x, settings.infeasibility_tolerance) {
                debug!(iteration, "QP dual infeasibility certificate found");
                return Err(MathError::Unbounded {
                    reason: "objective decreases without limit over the feasible set".to_string(),
                });
            }

            if settings.adaptive_rho_interval > 0
                && iteration % settings.adaptive_rho_interval == 0
            {
                admm.adapt_rho(&scaled, &residuals, settings)?;
            }
            last_residuals = residuals;
        }

        let polished_point = if settings.polish {
            scaled.polish(&admm.z, &admm.y)
        } else {
            None
        };

        debug!(
            iterations,
            converged,
            primal = last_residuals.primal,
            dual = last_residuals.dual,
            rho = admm.rho,
            "ADMM finished"
        );

        // A verified polished point satisfies the KKT conditions exactly, so
        // it is accepted even when ADMM stopped at the iteration cap.
        let (x, duals, polished) = match polished_point {
            Some((x, y)) => (scaled.unscale_x(&x), scaled.unscale_y(&y), true),
            None if converged => {
                if settings.polish {
                    debug!("QP polish rejected, keeping ADMM iterate");
                }
                (scaled.unscale_x(&admm.x), scaled.unscale_y(&admm.y), false)
            }
            None => {
                let stalled = MathError::convergence_failed(
                    iterations,
                    last_residuals.primal.max(last_residuals.dual),
                );
                debug!(error = %stalled, "ADMM stalled, switching to interior point");
                let (x, y) = self.solve_interior_point(stalled)?;
                match settings.polish.then(|| scaled.polish_unscaled(&x, &y)).flatten() {
                    Some((xp, yp)) => (scaled.unscale_x(&xp), scaled.unscale_y(&yp), true),
                    None => (x, y, false),
                }
            }
        };

        let objective = self.objective(&x);

        Ok(QpSolution {
            x,
            duals,
            objective,
            iterations,
            polished,
        })
    }

    /// Solves the problem with Clarabel's interior-point method.
    ///
    /// Clarabel takes `Ax + s = b` with `s` in a product of cones: the
    /// equalities go to the zero cone and every finite side of an inequality
    /// becomes one nonnegative row. The returned multipliers follow the ADMM
    /// sign convention. `stalled` is returned when Clarabel does not finish
    /// either.
    fn solve_interior_point(&self, stalled: MathError) -> MathResult<(DVector<f64>, DVector<f64>)> {
        use clarabel::solver::*;

        let n = self.dimension();

        // (constraint, sign, rhs)
        let mut equalities = Vec::new();
        let mut inequalities = Vec::new();
        for (i, (&l, &u)) in self.lower.iter().zip(self.upper.iter()).enumerate() {
            if l.is_finite() && u.is_finite() && (u - l).abs() <= 1e-12 * l.abs().max(1.0) {
                equalities.push((i, 1.0, l));
                continue;
            }
            if u.is_finite() {
                inequalities.push((i, 1.0, u));
            }
            if l.is_finite() {
                inequalities.push((i, -1.0, -l));
            }
        }
        let stacked: Vec<(usize, f64, f64)> =
            equalities.iter().chain(inequalities.iter()).copied().collect();

        let p = csc_from_fn(n, n, |i, j| if i <= j { self.p[(i, j)] } else { 0.0 });
        let a = csc_from_fn(stacked.len(), n, |r, j| {
            let (i, sign, _) = stacked[r];
            sign * self.rows[i][j]
        });
        let q: Vec<f64> = self.q.iter().copied().collect();
        let b: Vec<f64> = stacked.iter().map(|&(_, _, rhs)| rhs).collect();

        let mut cones = Vec::new();
        if !equalities.is_empty() {
            cones.push(ZeroConeT(equalities.len()));
        }
        if !inequalities.is_empty() {
            cones.push(NonnegativeConeT(inequalities.len()));
        }

        let settings = DefaultSettingsBuilder::default()
            .max_iter(INTERIOR_POINT_MAX_ITERATIONS)
            .verbose(false)
            .build()
            .map_err(|e| MathError::invalid_input(format!("interior-point settings: {e}")))?;
        let mut solver = DefaultSolver::new(&p, &q, &a, &b, &cones, settings)
            .map_err(|e| MathError::invalid_input(format!("interior-point setup: {e:?}")))?;
        solver.solve();

        debug!(
            status = ?solver.solution.status,
            iterations = solver.solution.iterations,
            "interior point finished"
        );

        match solver.solution.status {
            SolverStatus::Solved | SolverStatus::AlmostSolved => {}
            SolverStatus::PrimalInfeasible | SolverStatus::AlmostPrimalInfeasible => {
                return Err(MathError::infeasible("no point satisfies every constraint"));
            }
            SolverStatus::DualInfeasible | SolverStatus::AlmostDualInfeasible => {
                return Err(MathError::Unbounded {
                    reason: "objective decreases without limit over the feasible set".to_string(),
                });
            }
            _ => return Err(stalled),
        }

        let x = DVector::from_column_slice(&solver.solution.x);
        let mut y = DVector::zeros(self.num_constraints());
        for (&(i, sign, _), &z) in stacked.iter().zip(solver.solution.z.iter()) {
            y[i] += sign * z;
        }
        Ok((x, y))
    }
}

/// Compressed-column copy of the dense `rows × cols` matrix given by `entry`,
/// keeping only non-zero entries.
fn csc_from_fn(rows: usize, cols: usize, entry: impl Fn(usize, usize) -> f64) -> CscMatrix<f64> {
    let mut colptr = Vec::with_capacity(cols + 1);
    let mut rowval = Vec::new();
    let mut nzval = Vec::new();

    colptr.push(0);
    for j in 0..cols {
        for i in 0..rows {
            let v = entry(i, j);
            if v != 0.0 {
                rowval.push(i);
                nzval.push(v);
            }
        }
        colptr.push(nzval.len());
    }

    CscMatrix::new(rows, cols, colptr, rowval, nzval)
}

/// Residual norms of an ADMM iterate.
#[derive(Debug, Clone, Copy, Default)]
struct Residuals {
    /// Unscaled primal residual `‖Ax − z‖∞`.
    primal: f64,
    /// Normaliser for the relative primal tolerance.
    primal_norm: f64,
    /// Unscaled dual residual `‖Px + q + Aᵀy‖∞`.
    dual: f64,
    /// Normaliser for the relative dual tolerance.
    dual_norm: f64,
    /// Relative primal residual in the scaled space (drives ρ updates).
    scaled_primal_ratio: f64,
    /// Relative dual residual in the scaled space (drives ρ updates).
    scaled_dual_ratio: f64,
}

impl Residuals {
    fn converged(&self, tolerance: f64) -> bool {
        self.primal <= tolerance + tolerance * self.primal_norm
            && self.dual <= tolerance + tolerance * self.dual_norm
    }
}

/// The equilibrated problem `P̄ = c·DPD`, `q̄ = c·Dq`, `Ā = EAD`, `l̄ = El`, `ū = Eu`.
struct ScaledProblem {
    p: DMatrix<f64>,
    q: DVector<f64>,
    a: DMatrix<f64>,
    at: DMatrix<f64>,
    lower: DVector<f64>,
    upper: DVector<f64>,
    d: DVector<f64>,
    e: DVector<f64>,
    c: f64,
}

impl ScaledProblem {
    fn new(problem: &QuadraticProgram) -> Self {
        let n = problem.dimension();
        let m = problem.num_constraints();

        let mut p = problem.p.clone();
        let mut q = problem.q.clone();
        let mut a = DMatrix::zeros(m, n);
        for (i, row) in problem.rows.iter().enumerate() {
            a.set_row(i, &row.transpose());
        }

        let mut d = DVector::from_element(n, 1.0);
        let mut e = DVector::from_element(m, 1.0);

        for _ in 0..SCALING_ITERATIONS {
            let d_step = DVector::from_fn(n, |j, _| {
                let p_norm = norm_inf(&p.column(j).into_owned());
                let a_norm = if m > 0 { norm_inf(&a.column(j).into_owned()) } else { 0.0 };
                equilibration_factor(p_norm.max(a_norm))
            });
            let e_step = DVector::from_fn(m, |i, _| {
                equilibration_factor(norm_inf(&a.row(i).transpose()))
            });

            for i in 0..n {
                for j in 0..n {
                    p[(i, j)] *= d_step[i] * d_step[j];
                }
                q[i] *= d_step[i];
                d[i] *= d_step[i];
            }
            for i in 0..m {
                for j in 0..n {
                    a[(i, j)] *= e_step[i] * d_step[j];
                }
                e[i] *= e_step[i];
            }
        }

        let mean_column_norm =
            (0..n).map(|j| norm_inf(&p.column(j).into_owned())).sum::<f64>() / n as f64;
        let cost_measure = mean_column_norm.max(norm_inf(&q));
        let c = if cost_measure < MIN_COST_SCALING {
            1.0
        } else {
            1.0 / cost_measure.min(MAX_COST_SCALING)
        };
        p *= c;
        q *= c;

        let lower = DVector::from_fn(m, |i, _| problem.lower[i] * e[i]);
        let upper = DVector::from_fn(m, |i, _| problem.upper[i] * e[i]);
        let at = a.transpose();

        Self {
            p,
            q,
            a,
            at,
            lower,
            upper,
            d,
            e,
            c,
        }
    }

    fn n(&self) -> usize {
        self.q.len()
    }

    fn m(&self) -> usize {
        self.lower.len()
    }

    fn is_equality(&self, i: usize) -> bool {
        let (l, u) = (self.lower[i], self.upper[i]);
        l.is_finite() && u.is_finite() && (u - l).abs() <= 1e-12 * l.abs().max(1.0)
    }

    fn unscale_x(&self, x: &DVector<f64>) -> DVector<f64> {
        x.component_mul(&self.d)
    }

    fn unscale_y(&self, y: &DVector<f64>) -> DVector<f64> {
        y.component_mul(&self.e) / self.c
    }

    fn residuals(&self, x: &DVector<f64>, z: &DVector<f64>, y: &DVector<f64>) -> Residuals {
        let ax = &self.a * x;
        let px = &self.p * x;
        let aty = &self.at * y;
        let r_prim = &ax - z;
        let r_dual = &px + &self.q + &aty;

        let primal = norm_inf_div(&r_prim, &self.e);
        let primal_norm = norm_inf_div(&ax, &self.e).max(norm_inf_div(z, &self.e));
        let dual = norm_inf_div(&r_dual, &self.d) / self.c;
        let dual_norm = norm_inf_div(&px, &self.d)
            .max(norm_inf_div(&aty, &self.d))
            .max(norm_inf_div(&self.q, &self.d))
            / self.c;

        let scaled_primal_ratio = norm_inf(&r_prim) / norm_inf(&ax).max(norm_inf(z)).max(TINY);
        let scaled_dual_ratio = norm_inf(&r_dual)
            / norm_inf(&px)
                .max(norm_inf(&aty))
                .max(norm_inf(&self.q))
                .max(TINY);

        Residuals {
            primal,
            primal_norm,
            dual,
            dual_norm,
            scaled_primal_ratio,
            scaled_dual_ratio,
        }
    }

    /// Farkas certificate: `Aᵀδy ≈ 0` with `uᵀδy₊ + lᵀδy₋ < 0`.
    fn is_primal_infeasible(&self, delta_y: &DVector<f64>, tolerance: f64) -> bool {
        let m = self.m();
        if m == 0 {
            return false;
        }

        // Project onto the polar cone of the recession cone of [l, u].
        let mut dy = delta_y.clone();
        for i in 0..m {
            if self.upper[i] == f64::INFINITY {
                dy[i] = dy[i].min(0.0);
            }
            if self.lower[i] == f64::NEG_INFINITY {
                dy[i] = dy[i].max(0.0);
            }
        }

        let norm = norm_inf(&dy.component_mul(&self.e));
        if norm <= TINY {
            return false;
        }

        let mut support = 0.0;
        for i in 0..m {
            if dy[i] > 0.0 {
                support += self.upper[i] * dy[i];
            } else if dy[i] < 0.0 {
                support += self.lower[i] * dy[i];
            }
        }
        if support >= -tolerance * norm {
            return false;
        }

        let at_dy = &self.at * &dy;
        norm_inf_div(&at_dy, &self.d) <= tolerance * norm
    }

    /// Recession direction `δx` with `Pδx ≈ 0`, `qᵀδx < 0` and `Aδx` in the
    /// recession cone of `[l, u]`.
    fn is_dual_infeasible(&self, delta_x: &DVector<f64>, tolerance: f64) -> bool {
        let norm = norm_inf(&delta_x.component_mul(&self.d));
        if norm <= TINY {
            return false;
        }

        if self.q.dot(delta_x) / self.c >= -tolerance * norm {
            return false;
        }

        let p_dx = &self.p * delta_x;
        if norm_inf_div(&p_dx, &self.d) / self.c > tolerance * norm {
            return false;
        }

        let a_dx = &self.a * delta_x;
        for i in 0..self.m() {
            let v = a_dx[i] / self.e[i];
            let upper_finite = self.upper[i].is_finite();
            let lower_finite = self.lower[i].is_finite();
            let ok = match (lower_finite, upper_finite) {
                (true, true) => v.abs() <= tolerance * norm,
                (true, false) => v >= -tolerance * norm,
                (false, true) => v <= tolerance * norm,
                (false, false) => true,
            };
            if !ok {
                return false;
            }
        }
        true
    }

    /// Polishes a point given in original units.
    fn polish_unscaled(
        &self,
        x: &DVector<f64>,
        y: &DVector<f64>,
    ) -> Option<(DVector<f64>, DVector<f64>)> {
        let z = &self.a * x.component_div(&self.d);
        let y_scaled = y.component_div(&self.e) * self.c;
        self.polish(&z, &y_scaled)
    }

    /// Solves the KKT system of the active set guessed from `(z, y)`.
    ///
    /// Returns `None` when the system cannot be solved or the result is not
    /// an optimum (infeasible point or wrong-signed multiplier).
    fn polish(&self, z: &DVector<f64>, y: &DVector<f64>) -> Option<(DVector<f64>, DVector<f64>)> {
        let n = self.n();
        let m = self.m();

        // (row, rhs, kind) with kind: 0 = equality, -1 = lower, 1 = upper
        let mut active: Vec<(usize, f64, i8)> = Vec::new();
        for i in 0..m {
            if self.is_equality(i) {
                active.push((i, self.lower[i], 0));
            } else if z[i] - self.lower[i] < -y[i] {
                active.push((i, self.lower[i], -1));
            } else if self.upper[i] - z[i] < y[i] {
                active.push((i, self.upper[i], 1));
            }
        }

        let k = active.len();
        let dim = n + k;
        let mut kkt = DMatrix::zeros(dim, dim);
        kkt.view_mut((0, 0), (n, n)).copy_from(&self.p);
        for (r, &(i, _, _)) in active.iter().enumerate() {
            for j in 0..n {
                kkt[(n + r, j)] = self.a[(i, j)];
                kkt[(j, n + r)] = self.a[(i, j)];
            }
        }

        let mut rhs = DVector::zeros(dim);
        for j in 0..n {
            rhs[j] = -self.q[j];
        }
        for (r, &(_, b, _)) in active.iter().enumerate() {
            rhs[n + r] = b;
        }

        let mut regularized = kkt.clone();
        for j in 0..n {
            regularized[(j, j)] += POLISH_DELTA;
        }
        for r in 0..k {
            regularized[(n + r, n + r)] -= POLISH_DELTA;
        }

        let lu = regularized.lu();
        let mut solution = lu.solve(&rhs)?;
        for _ in 0..POLISH_REFINEMENT_STEPS {
            let residual = &rhs - &kkt * &solution;
            let correction = lu.solve(&residual)?;
            solution += correction;
        }
        if solution.iter().any(|v| !v.is_finite()) {
            return None;
        }

        let x = solution.rows(0, n).into_owned();
        let mut y_polished = DVector::zeros(m);
        for (r, &(i, _, _)) in active.iter().enumerate() {
            y_polished[i] = solution[n + r];
        }

        // Primal feasibility in original units.
        let ax = &self.a * &x;
        for i in 0..m {
            let violation = (self.lower[i] - ax[i]).max(ax[i] - self.upper[i]).max(0.0) / self.e[i];
            if violation > POLISH_FEASIBILITY_TOLERANCE {
                return None;
            }
        }

        // Multiplier signs.
        let dual_tolerance = POLISH_DUAL_TOLERANCE * (1.0 + norm_inf(&y_polished));
        for &(i, _, kind) in &active {
            let wrong_sign = match kind {
                -1 => y_polished[i] > dual_tolerance,
                1 => y_polished[i] < -dual_tolerance,
                _ => false,
            };
            if wrong_sign {
                return None;
            }
        }

        Some((x, y_polished))
    }
}

/// ADMM iterate and factorization.
struct Admm {
    x: DVector<f64>,
    z: DVector<f64>,
    y: DVector<f64>,
    rho: f64,
    rho_vec: DVector<f64>,
    factor: Cholesky<f64, Dyn>,
}

impl Admm {
    fn new(scaled: &ScaledProblem, settings: &QpSettings) -> MathResult<Self> {
        let rho = settings.rho;
        let rho_vec = Self::rho_vector(scaled, rho);
        let factor = Self::factorize(scaled, &rho_vec, settings.sigma)?;

        Ok(Self {
            x: DVector::zeros(scaled.n()),
            z: DVector::zeros(scaled.m()),
            y: DVector::zeros(scaled.m()),
            rho,
            rho_vec,
            factor,
        })
    }

    fn rho_vector(scaled: &ScaledProblem, rho: f64) -> DVector<f64> {
        DVector::from_fn(scaled.m(), |i, _| {
            if scaled.lower[i] == f64::NEG_INFINITY && scaled.upper[i] == f64::INFINITY {
                RHO_MIN
            } else if scaled.is_equality(i) {
                rho * RHO_EQUALITY_FACTOR
            } else {
                rho
            }
        })
    }

    /// Factors `P + σI + Aᵀ diag(ρ) A`, positive definite for σ > 0.
    fn factorize(
        scaled: &ScaledProblem,
        rho_vec: &DVector<f64>,
        sigma: f64,
    ) -> MathResult<Cholesky<f64, Dyn>> {
        let n = scaled.n();
        let mut weighted = scaled.a.clone();
        for i in 0..scaled.m() {
            weighted.row_mut(i).scale_mut(rho_vec[i]);
        }

        let mut k = &scaled.p + DMatrix::identity(n, n) * sigma;
        k += &scaled.at * weighted;

        Cholesky::new(k).ok_or(MathError::SingularMatrix)
    }

    /// One relaxed ADMM step. Returns `(δx, δy)`.
    fn step(&mut self, scaled: &ScaledProblem, settings: &QpSettings) -> (DVector<f64>, DVector<f64>) {
        let alpha = settings.alpha;

        let rhs = &self.x * settings.sigma - &scaled.q
            + &scaled.at * (self.rho_vec.component_mul(&self.z) - &self.y);
        let x_tilde = self.factor.solve(&rhs);
        let z_tilde = &scaled.a * &x_tilde;

        let x_next = &x_tilde * alpha + &self.x * (1.0 - alpha);
        let z_relaxed = &z_tilde * alpha + &self.z * (1.0 - alpha);

        let z_next = DVector::from_fn(scaled.m(), |i, _| {
            (z_relaxed[i] + self.y[i] / self.rho_vec[i]).clamp(scaled.lower[i], scaled.upper[i])
        });
        let y_next = &self.y + (&z_relaxed - &z_next).component_mul(&self.rho_vec);

        let delta_x = &x_next - &self.x;
        let delta_y = &y_next - &self.y;

        self.x = x_next;
        self.z = z_next;
        self.y = y_next;

        (delta_x, delta_y)
    }

    fn adapt_rho(
        &mut self,
        scaled: &ScaledProblem,
        residuals: &Residuals,
        settings: &QpSettings,
    ) -> MathResult<()> {
        let ratio = residuals.scaled_primal_ratio / residuals.scaled_dual_ratio.max(TINY);
        let candidate = (self.rho * ratio.sqrt()).clamp(RHO_MIN, RHO_MAX);

        if candidate > self.rho * RHO_UPDATE_RATIO || candidate < self.rho / RHO_UPDATE_RATIO {
            self.rho = candidate;
            self.rho_vec = Self::rho_vector(scaled, candidate);
            self.factor = Self::factorize(scaled, &self.rho_vec, settings.sigma)?;
        }
        Ok(())
    }
}

fn equilibration_factor(norm: f64) -> f64 {
    let norm = if norm < MIN_SCALING {
        1.0
    } else {
        norm.min(MAX_SCALING)
    };
    1.0 / norm.sqrt()
}

fn norm_inf(v: &DVector<f64>) -> f64 {
    v.iter().fold(0.0, |acc, x| acc.max(x.abs()))
}

/// `‖v ⊘ s‖∞`, used to map scaled residuals back to original units.
fn norm_inf_div(v: &DVector<f64>, s: &DVector<f64>) -> f64 {
    v.iter()
        .zip(s.iter())
        .fold(0.0, |acc, (a, b)| acc.max((a / b).abs()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn simplex_problem(p: DMatrix<f64>) -> QuadraticProgram {
        let n = p.nrows();
        let mut qp = QuadraticProgram::new(p, DVector::zeros(n)).unwrap();
        qp.add_equality(DVector::from_element(n, 1.0), 1.0).unwrap();
        qp.add_variable_bounds(0.0, f64::INFINITY).unwrap();
        qp
    }

    #[test]
    fn test_unconstrained_quadratic() {
        // min (x-2)^2 + (y-3)^2 = ½ xᵀ(2I)x - (4, 6)ᵀx + const
        let p = DMatrix::from_diagonal(&DVector::from_vec(vec![2.0, 2.0]));
        let q = DVector::from_vec(vec![-4.0, -6.0]);
        let qp = QuadraticProgram::new(p, q).unwrap();

        let sol = qp.solve(&QpSettings::default()).unwrap();

        assert_relative_eq!(sol.x[0], 2.0, epsilon = 1e-6);
        assert_relative_eq!(sol.x[1], 3.0, epsilon = 1e-6);
    }

    #[test]
    fn test_inverse_variance_on_simplex() {
        let p = DMatrix::from_diagonal(&DVector::from_vec(vec![0.01, 0.04, 0.09]));
        let sol = simplex_problem(p).solve(&QpSettings::default()).unwrap();

        let inv = [100.0, 25.0, 1.0 / 0.09];
        let total: f64 = inv.iter().sum();
        for j in 0..3 {
            assert_relative_eq!(sol.x[j], inv[j] / total, epsilon = 1e-7);
        }
        assert!(sol.polished);
    }

    #[test]
    fn test_active_bound_is_exact_after_polish() {
        // Asset 0 wants ~73% but is capped at 20%.
        let p = DMatrix::from_diagonal(&DVector::from_vec(vec![0.01, 0.04, 0.09]));
        let mut qp = simplex_problem(p);
        let mut cap = DVector::zeros(3);
        cap[0] = 1.0;
        qp.add_less_equal(cap, 0.2).unwrap();

        let sol = qp.solve(&QpSettings::default()).unwrap();

        assert!(sol.x[0] <= 0.2 + 1e-9);
        assert_relative_eq!(sol.x[0], 0.2, epsilon = 1e-8);
        assert_relative_eq!(sol.x.sum(), 1.0, epsilon = 1e-9);
        // Remaining 80% split in proportion to 1/variance.
        assert_relative_eq!(sol.x[1] / sol.x[2], 0.09 / 0.04, epsilon = 1e-6);
    }

    #[test]
    fn test_daily_scale_covariance() {
        // Covariances in daily-return units are tiny; scaling must cope.
        let p = DMatrix::from_row_slice(
            3,
            3,
            &[1.0e-4, 2.0e-5, 0.0, 2.0e-5, 2.5e-4, 1.0e-5, 0.0, 1.0e-5, 4.0e-4],
        );
        let sol = simplex_problem(p.clone()).solve(&QpSettings::default()).unwrap();

        assert_relative_eq!(sol.x.sum(), 1.0, epsilon = 1e-9);
        assert!(sol.x.iter().all(|&w| w >= -1e-10));

        // KKT: (Pw)_i equal for every asset held.
        let grad = &p * &sol.x;
        for j in 1..3 {
            if sol.x[j] > 1e-6 {
                assert_relative_eq!(grad[j], grad[0], epsilon = 1e-10);
            }
        }
    }

    #[test]
    fn test_interior_point_takes_over_when_admm_stalls() {
        let p = DMatrix::from_diagonal(&DVector::from_vec(vec![0.01, 0.04, 0.09]));
        let stalled = QpSettings::default().with_max_iterations(2).with_polish(false);

        let sol = simplex_problem(p).solve(&stalled).unwrap();

        let inv = [100.0, 25.0, 1.0 / 0.09];
        let total: f64 = inv.iter().sum();
        for j in 0..3 {
            assert_relative_eq!(sol.x[j], inv[j] / total, epsilon = 1e-7);
        }
        assert!(!sol.polished);
    }

    #[test]
    fn test_interior_point_answer_is_polished() {
        let p = DMatrix::from_diagonal(&DVector::from_vec(vec![0.01, 0.04, 0.09]));
        let mut qp = simplex_problem(p);
        let mut cap = DVector::zeros(3);
        cap[0] = 1.0;
        qp.add_less_equal(cap, 0.2).unwrap();

        let sol = qp.solve(&QpSettings::default().with_max_iterations(2)).unwrap();

        assert!(sol.polished);
        assert!(sol.x[0] <= 0.2 + 1e-12);
        assert_relative_eq!(sol.x[0], 0.2, epsilon = 1e-10);
        assert_relative_eq!(sol.x[1] / sol.x[2], 0.09 / 0.04, epsilon = 1e-8);
        // The cap is active with a positive multiplier.
        assert!(sol.duals[4] > 0.0);
    }

    #[test]
    fn test_interior_point_reports_infeasibility() {
        let mut qp = simplex_problem(DMatrix::identity(3, 3));
        for j in 0..3 {
            let mut row = DVector::zeros(3);
            row[j] = 1.0;
            qp.add_greater_equal(row, 0.4).unwrap();
        }

        let settings = QpSettings::default().with_max_iterations(1);
        assert!(matches!(qp.solve(&settings), Err(MathError::Infeasible { .. })));
    }

    #[test]
    fn test_linear_program_picks_best_vertex() {
        // max 0.1 a + 0.3 b + 0.2 c on the simplex with b <= 0.5
        let q = DVector::from_vec(vec![-0.1, -0.3, -0.2]);
        let mut lp = QuadraticProgram::linear(q).unwrap();
        lp.add_equality(DVector::from_element(3, 1.0), 1.0).unwrap();
        lp.add_variable_bounds(0.0, f64::INFINITY).unwrap();
        lp.add_less_equal(DVector::from_vec(vec![0.0, 1.0, 0.0]), 0.5).unwrap();

        let sol = lp.solve(&QpSettings::default()).unwrap();

        assert_relative_eq!(sol.x[1], 0.5, epsilon = 1e-6);
        assert_relative_eq!(sol.x[2], 0.5, epsilon = 1e-6);
        assert_relative_eq!(sol.objective, -0.25, epsilon = 1e-6);
    }

    #[test]
    fn test_crossed_bounds_are_infeasible() {
        let p = DMatrix::identity(2, 2);
        let mut qp = QuadraticProgram::new(p, DVector::zeros(2)).unwrap();
        qp.add_constraint(DVector::from_vec(vec![1.0, 0.0]), 0.5, 0.2).unwrap();

        assert!(matches!(
            qp.solve(&QpSettings::default()),
            Err(MathError::Infeasible { .. })
        ));
    }

    #[test]
    fn test_incompatible_constraints_are_infeasible() {
        // sum = 1 but every weight >= 0.4 across 3 assets
        let p = DMatrix::identity(3, 3);
        let mut qp = simplex_problem(p);
        for j in 0..3 {
            let mut row = DVector::zeros(3);
            row[j] = 1.0;
            qp.add_greater_equal(row, 0.4).unwrap();
        }

        assert!(matches!(
            qp.solve(&QpSettings::default()),
            Err(MathError::Infeasible { .. })
        ));
    }

    #[test]
    fn test_unbounded_linear_program() {
        // min -x with x >= 0 only
        let mut lp = QuadraticProgram::linear(DVector::from_vec(vec![-1.0])).unwrap();
        lp.add_greater_equal(DVector::from_vec(vec![1.0]), 0.0).unwrap();

        assert!(matches!(
            lp.solve(&QpSettings::default()),
            Err(MathError::Unbounded { .. })
        ));
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let qp = simplex_problem(DMatrix::identity(2, 2));
        let settings = QpSettings {
            alpha: 2.5,
            ..QpSettings::default()
        };
        assert!(matches!(qp.solve(&settings), Err(MathError::InvalidInput { .. })));
    }

    #[test]
    fn test_dimension_checks() {
        let err = QuadraticProgram::new(DMatrix::identity(2, 2), DVector::zeros(3));
        assert!(matches!(err, Err(MathError::DimensionMismatch { .. })));

        let mut qp = QuadraticProgram::new(DMatrix::identity(2, 2), DVector::zeros(2)).unwrap();
        assert!(qp.add_equality(DVector::zeros(3), 1.0).is_err());
    }

    #[test]
    fn test_max_violation() {
        let qp = simplex_problem(DMatrix::identity(2, 2));
        let x = DVector::from_vec(vec![0.7, 0.5]);
        assert_relative_eq!(qp.max_violation(&x), 0.2, epsilon = 1e-12);

        let feasible = DVector::from_vec(vec![0.3, 0.7]);
        assert_relative_eq!(qp.max_violation(&feasible), 0.0);
    }
}
