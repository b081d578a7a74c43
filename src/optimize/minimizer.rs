//! Bounded limited-memory BFGS.
//!
//! Projected quasi-Newton steps inside a box, with forward-difference
//! gradients and a backtracking Armijo search along the projected path.

use nalgebra::DVector;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MinimizerOptions {
    /// Number of correction pairs kept.
    pub memory: usize,
    pub max_iterations: usize,
    pub max_evaluations: usize,
    /// Relative function reduction that counts as converged.
    pub ftol: f64,
    /// Projected gradient infinity norm that counts as converged.
    pub pgtol: f64,
    /// Finite-difference step.
    pub gradient_step: f64,
    /// Step halvings before the line search gives up.
    pub max_backtracks: usize,
}

impl Default for MinimizerOptions {
    fn default() -> Self {
        Self {
            memory: 10,
            max_iterations: 15_000,
            max_evaluations: 15_000,
            ftol: 2.220446049250313e-9,
            pgtol: 1e-5,
            gradient_step: 1e-8,
            max_backtracks: 20,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Convergence {
    ProjectedGradient,
    RelativeReduction,
}

/// Why the minimizer stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Termination {
    Converged(Convergence),
    MaxIterations,
    MaxEvaluations,
    LineSearchFailed,
}

impl Termination {
    pub fn is_converged(&self) -> bool {
        matches!(self, Termination::Converged(_))
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::Converged(Convergence::ProjectedGradient) => {
                write!(f, "converged (projected gradient below tolerance)")
            }
            Termination::Converged(Convergence::RelativeReduction) => {
                write!(f, "converged (relative reduction below tolerance)")
            }
            Termination::MaxIterations => write!(f, "iteration limit reached"),
            Termination::MaxEvaluations => write!(f, "evaluation limit reached"),
            Termination::LineSearchFailed => write!(f, "line search failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Minimum {
    pub x: Vec<f64>,
    pub fun: f64,
    pub iterations: usize,
    /// Objective values computed, gradient differences included.
    pub evaluations: usize,
    pub status: Termination,
}

struct Correction {
    s: DVector<f64>,
    y: DVector<f64>,
    rho: f64,
}

/// Minimize `objective` inside `bounds`, starting from `x0`.
///
/// `progress` is called after every accepted step with the iteration
/// number and the new objective value. Non-finite objective values are
/// treated as worse than any finite one.
pub fn minimize<F, P>(
    objective: F,
    x0: &[f64],
    bounds: &[(f64, f64)],
    options: &MinimizerOptions,
    mut progress: P,
) -> Minimum
where
    F: Fn(&[f64]) -> f64 + Sync,
    P: FnMut(usize, f64),
{
    let eval = |x: &DVector<f64>| sanitize(objective(x.as_slice()));
    let n = x0.len();

    let mut x = project(&DVector::from_column_slice(x0), bounds);
    let mut fx = eval(&x);
    let mut evaluations = 1;
    let mut iterations = 0;
    if evaluations + n > options.max_evaluations {
        return Minimum {
            x: x.as_slice().to_vec(),
            fun: fx,
            iterations,
            evaluations,
            status: Termination::MaxEvaluations,
        };
    }
    let mut gx = gradient(&objective, &x, fx, bounds, options.gradient_step);
    evaluations += n;
    let mut history: VecDeque<Correction> = VecDeque::with_capacity(options.memory);

    let status = loop {
        if projected_gradient_norm(&x, &gx, bounds) <= options.pgtol {
            break Termination::Converged(Convergence::ProjectedGradient);
        }
        if iterations >= options.max_iterations {
            break Termination::MaxIterations;
        }
        if evaluations >= options.max_evaluations {
            break Termination::MaxEvaluations;
        }

        let mut direction = restrict(&x, two_loop(&gx, &history), bounds);
        if direction.dot(&gx) >= 0.0 {
            history.clear();
            direction = restrict(&x, -&gx, bounds);
        }
        let initial_step = if history.is_empty() {
            (1.0 / direction.norm()).min(1.0)
        } else {
            1.0
        };

        let mut accepted = None;
        let mut step = initial_step;
        for _ in 0..=options.max_backtracks {
            if evaluations >= options.max_evaluations {
                break;
            }
            let trial = project(&(&x + &direction * step), bounds);
            let ft = eval(&trial);
            evaluations += 1;
            if ft <= fx + 1e-4 * gx.dot(&(&trial - &x)) {
                accepted = Some((trial, ft));
                break;
            }
            step *= 0.5;
        }

        let Some((x_next, f_next)) = accepted else {
            if evaluations >= options.max_evaluations {
                break Termination::MaxEvaluations;
            }
            if !history.is_empty() {
                // Retry from steepest descent before giving up.
                history.clear();
                continue;
            }
            break Termination::LineSearchFailed;
        };

        let reduction = (fx - f_next) / fx.abs().max(f_next.abs()).max(1.0);
        let s = &x_next - &x;
        x = x_next;
        fx = f_next;
        iterations += 1;
        progress(iterations, fx);

        if reduction <= options.ftol {
            break Termination::Converged(Convergence::RelativeReduction);
        }
        if evaluations + n > options.max_evaluations {
            break Termination::MaxEvaluations;
        }

        let g_next = gradient(&objective, &x, fx, bounds, options.gradient_step);
        evaluations += n;
        let y = &g_next - &gx;
        let sy = s.dot(&y);
        if sy > f64::EPSILON * y.dot(&y) {
            if history.len() == options.memory.max(1) {
                history.pop_front();
            }
            history.push_back(Correction { s, y, rho: 1.0 / sy });
        }
        gx = g_next;
    };

    Minimum {
        x: x.as_slice().to_vec(),
        fun: fx,
        iterations,
        evaluations,
        status,
    }
}

fn sanitize(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        f64::MAX
    }
}

fn project(x: &DVector<f64>, bounds: &[(f64, f64)]) -> DVector<f64> {
    DVector::from_iterator(
        x.len(),
        x.iter().zip(bounds).map(|(&v, &(lo, hi))| v.clamp(lo, hi)),
    )
}

/// Infinity norm of `P(x - g) - x`.
fn projected_gradient_norm(x: &DVector<f64>, g: &DVector<f64>, bounds: &[(f64, f64)]) -> f64 {
    x.iter()
        .zip(g.iter())
        .zip(bounds)
        .map(|((&xi, &gi), &(lo, hi))| ((xi - gi).clamp(lo, hi) - xi).abs())
        .fold(0.0, f64::max)
}

/// Zero the components of `direction` that push an active bound outwards.
fn restrict(x: &DVector<f64>, mut direction: DVector<f64>, bounds: &[(f64, f64)]) -> DVector<f64> {
    for ((d, &xi), &(lo, hi)) in direction.iter_mut().zip(x.iter()).zip(bounds) {
        if (xi <= lo && *d < 0.0) || (xi >= hi && *d > 0.0) {
            *d = 0.0;
        }
    }
    direction
}

/// `-H g` from the stored corrections.
fn two_loop(g: &DVector<f64>, history: &VecDeque<Correction>) -> DVector<f64> {
    let mut q = g.clone();
    let mut alphas = Vec::with_capacity(history.len());
    for c in history.iter().rev() {
        let alpha = c.rho * c.s.dot(&q);
        q.axpy(-alpha, &c.y, 1.0);
        alphas.push(alpha);
    }

    let gamma = history
        .back()
        .map(|c| c.s.dot(&c.y) / c.y.dot(&c.y))
        .filter(|v| v.is_finite() && *v > 0.0)
        .unwrap_or(1.0);
    let mut r = q * gamma;

    for (c, alpha) in history.iter().zip(alphas.into_iter().rev()) {
        let beta = c.rho * c.y.dot(&r);
        r.axpy(alpha - beta, &c.s, 1.0);
    }
    -r
}

/// Forward differences, backward where the forward probe would leave the box.
fn gradient<F>(objective: &F, x: &DVector<f64>, fx: f64, bounds: &[(f64, f64)], step: f64) -> DVector<f64>
where
    F: Fn(&[f64]) -> f64 + Sync,
{
    let base = x.as_slice();
    let components: Vec<f64> = (0..base.len())
        .into_par_iter()
        .map(|i| {
            let mut probe = base.to_vec();
            let h = if base[i] + step > bounds[i].1 { -step } else { step };
            probe[i] += h;
            (sanitize(objective(&probe)) - fx) / h
        })
        .collect();
    DVector::from_vec(components)
}
