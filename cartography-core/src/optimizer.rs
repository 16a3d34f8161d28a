use std::{fmt, str::FromStr, time::Instant};

use nalgebra::DVector;
use rand::Rng;

use crate::{column_bases::ColumnBases, error::Error, layout::Layout, stress::Stress, table::TiterTable};

/// Numerical backend used to minimize `Stress` (spec.md §4.6). The source
/// binds ALGLIB's CG and L-BFGS; this port implements both directly against
/// the analytic gradient, per spec.md's design notes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    ConjugateGradient,
    Lbfgs,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Method::ConjugateGradient => "alglib-cg",
            Method::Lbfgs => "alglib-lbfgs",
        })
    }
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "alglib-cg" => Ok(Method::ConjugateGradient),
            "alglib-lbfgs" => Ok(Method::Lbfgs),
            other => Err(Error::InvalidData(format!("unknown optimization method: {other}"))),
        }
    }
}

/// Convergence tolerance on the gradient norm (spec.md §4.6): `rough` for
/// multi-start screening, `fine` for polishing the best candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    Rough,
    Fine,
}

impl Precision {
    fn gradient_tolerance(self) -> f64 {
        match self {
            Precision::Rough => 1e-3,
            Precision::Fine => 1e-10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RelaxOptions {
    pub method: Method,
    pub precision: Precision,
    pub max_iterations: usize,
    pub deadline: Option<Instant>,
}

impl Default for RelaxOptions {
    fn default() -> Self {
        Self {
            method: Method::ConjugateGradient,
            precision: Precision::Rough,
            max_iterations: 2000,
            deadline: None,
        }
    }
}

/// Result of one `relax` call: the minimized layout, its stress, how many
/// iterations ran, and whether it was cut short by cancellation or deadline.
#[derive(Debug, Clone)]
pub struct RelaxOutcome {
    pub layout: Layout,
    pub stress: f64,
    pub iterations: usize,
    pub cancelled: bool,
}

/// Cooperative progress callback, invoked between optimizer iterations
/// (spec.md §5). Returning `false` requests cancellation; the optimizer
/// returns the best layout found so far, marked `cancelled`.
pub type Progress<'a> = dyn FnMut(usize, f64) -> bool + 'a;

fn to_vector(layout: &Layout) -> DVector<f64> {
    let (p, d) = (layout.number_of_points(), layout.number_of_dimensions());
    let mut v = DVector::zeros(p * d);
    for i in 0..p {
        for c in 0..d {
            v[i * d + c] = layout.as_matrix()[(i, c)];
        }
    }
    v
}

fn from_vector(v: &DVector<f64>, points: usize, dimensions: usize) -> Layout {
    let mut layout = Layout::zeros(points, dimensions);
    for i in 0..points {
        let row: Vec<f64> = (0..dimensions).map(|c| v[i * dimensions + c]).collect();
        layout.set_point(i, &row);
    }
    layout
}

struct Problem<'a> {
    stress: &'a Stress,
    points: usize,
    dimensions: usize,
}

impl Problem<'_> {
    fn eval(&self, x: &DVector<f64>) -> (f64, DVector<f64>) {
        let layout = from_vector(x, self.points, self.dimensions);
        let (value, grad) = self.stress.value_and_gradient(&layout);
        let mut flat = DVector::zeros(self.points * self.dimensions);
        for i in 0..self.points {
            for c in 0..self.dimensions {
                flat[i * self.dimensions + c] = grad[(i, c)];
            }
        }
        (value, flat)
    }
}

/// Backtracking line search satisfying the Armijo sufficient-decrease
/// condition, shared by both backends.
fn line_search(
    problem: &Problem,
    x: &DVector<f64>,
    value: f64,
    grad: &DVector<f64>,
    direction: &DVector<f64>,
) -> (DVector<f64>, f64, DVector<f64>) {
    const C1: f64 = 1e-4;
    const SHRINK: f64 = 0.5;
    const MAX_STEPS: usize = 40;

    let directional_derivative = grad.dot(direction);
    if directional_derivative >= 0.0 {
        // Not a descent direction (can happen after a CG restart numerical
        // hiccup); fall back to steepest descent.
        return line_search(problem, x, value, grad, &(-grad));
    }

    let mut step = 1.0;
    for _ in 0..MAX_STEPS {
        let candidate = x + step * direction;
        let (candidate_value, candidate_grad) = problem.eval(&candidate);
        if candidate_value <= value + C1 * step * directional_derivative {
            return (candidate, candidate_value, candidate_grad);
        }
        step *= SHRINK;
    }
    let candidate = x + step * direction;
    let (candidate_value, candidate_grad) = problem.eval(&candidate);
    (candidate, candidate_value, candidate_grad)
}

fn conjugate_gradient(problem: &Problem, start: DVector<f64>, options: &RelaxOptions, mut progress: Option<&mut Progress>) -> (DVector<f64>, f64, usize, bool) {
    let tol = options.precision.gradient_tolerance();
    let (mut value, mut grad) = problem.eval(&start);
    let mut x = start;
    let mut direction = -&grad;
    let mut iterations = 0usize;
    let mut cancelled = false;

    while iterations < options.max_iterations && grad.norm() > tol {
        if let Some(deadline) = options.deadline {
            if Instant::now() >= deadline {
                break;
            }
        }
        let (new_x, new_value, new_grad) = line_search(problem, &x, value, &grad, &direction);
        // Polak-Ribière beta with automatic restart to steepest descent
        // whenever it would go negative.
        let beta = (new_grad.dot(&(&new_grad - &grad)) / grad.dot(&grad)).max(0.0);
        direction = -&new_grad + beta * direction;
        x = new_x;
        value = new_value;
        grad = new_grad;
        iterations += 1;

        if let Some(cb) = progress.as_deref_mut() {
            if !cb(iterations, value) {
                cancelled = true;
                break;
            }
        }
    }
    (x, value, iterations, cancelled)
}

fn lbfgs(problem: &Problem, start: DVector<f64>, options: &RelaxOptions, mut progress: Option<&mut Progress>) -> (DVector<f64>, f64, usize, bool) {
    const MEMORY: usize = 8;
    let tol = options.precision.gradient_tolerance();

    let (mut value, mut grad) = problem.eval(&start);
    let mut x = start;
    let mut s_history: Vec<DVector<f64>> = Vec::new();
    let mut y_history: Vec<DVector<f64>> = Vec::new();
    let mut iterations = 0usize;
    let mut cancelled = false;

    while iterations < options.max_iterations && grad.norm() > tol {
        if let Some(deadline) = options.deadline {
            if Instant::now() >= deadline {
                break;
            }
        }

        // Two-loop recursion (Nocedal & Wright).
        let mut q = grad.clone();
        let m = s_history.len();
        let mut alpha = vec![0.0; m];
        let mut rho = vec![0.0; m];
        for i in (0..m).rev() {
            rho[i] = 1.0 / y_history[i].dot(&s_history[i]).max(1e-12);
            alpha[i] = rho[i] * s_history[i].dot(&q);
            q -= alpha[i] * &y_history[i];
        }
        let gamma = if m > 0 {
            s_history[m - 1].dot(&y_history[m - 1]) / y_history[m - 1].dot(&y_history[m - 1]).max(1e-12)
        } else {
            1.0
        };
        let mut r = gamma * q;
        for i in 0..m {
            let beta = rho[i] * y_history[i].dot(&r);
            r += (alpha[i] - beta) * &s_history[i];
        }
        let direction = -r;

        let (new_x, new_value, new_grad) = line_search(problem, &x, value, &grad, &direction);
        let s = &new_x - &x;
        let y = &new_grad - &grad;
        if y.dot(&s) > 1e-10 {
            s_history.push(s);
            y_history.push(y);
            if s_history.len() > MEMORY {
                s_history.remove(0);
                y_history.remove(0);
            }
        }
        x = new_x;
        value = new_value;
        grad = new_grad;
        iterations += 1;

        if let Some(cb) = progress.as_deref_mut() {
            if !cb(iterations, value) {
                cancelled = true;
                break;
            }
        }
    }
    (x, value, iterations, cancelled)
}

/// Minimizes `stress` starting from `start`, dispatching to the configured
/// backend. Pure with respect to `stress` and `start`: safe to call
/// concurrently for independent starting layouts.
pub fn relax(stress: &Stress, start: Layout, options: &RelaxOptions, progress: Option<&mut Progress>) -> RelaxOutcome {
    let points = start.number_of_points();
    let dimensions = start.number_of_dimensions();
    let problem = Problem { stress, points, dimensions };
    let x0 = to_vector(&start);

    let (x, value, iterations, cancelled) = match options.method {
        Method::ConjugateGradient => conjugate_gradient(&problem, x0, options, progress),
        Method::Lbfgs => lbfgs(&problem, x0, options, progress),
    };

    RelaxOutcome {
        layout: from_vector(&x, points, dimensions),
        stress: value,
        iterations,
        cancelled,
    }
}

/// Runs `relax` through a non-increasing dimension schedule (spec.md §4.6):
/// after each stage converges, PCA-project the layout onto the next stage's
/// dimensionality before continuing. The final stage uses `final_precision`;
/// every earlier stage uses `rough` regardless of what the caller asked for,
/// since it is about to be thrown away and re-optimized anyway.
pub fn anneal(
    stress: &Stress,
    start: Layout,
    schedule: &[usize],
    method: Method,
    final_precision: Precision,
    max_iterations: usize,
) -> RelaxOutcome {
    assert!(!schedule.is_empty(), "dimension schedule must not be empty");
    let mut layout = start;
    let mut outcome = None;
    for (idx, &dimensions) in schedule.iter().enumerate() {
        if layout.number_of_dimensions() != dimensions {
            layout = layout.pca_reduce(dimensions);
        }
        let precision = if idx + 1 == schedule.len() { final_precision } else { Precision::Rough };
        let options = RelaxOptions { method, precision, max_iterations, deadline: None };
        let result = relax(stress, layout, &options, None);
        layout = result.layout.clone();
        outcome = Some(result);
    }
    outcome.expect("schedule is non-empty")
}

/// Uniform-box randomization for multi-start attempts (spec.md §4.6): a
/// point's coordinates are drawn independently and uniformly from
/// `[-half, half]` where `half = max_table_distance * max_distance_multiplier / 2`.
pub fn randomize_layout(rng: &mut impl Rng, points: usize, dimensions: usize, max_table_distance: f64, max_distance_multiplier: f64) -> Layout {
    let half = max_table_distance * max_distance_multiplier / 2.0;
    let mut layout = Layout::zeros(points, dimensions);
    for p in 0..points {
        let row: Vec<f64> = (0..dimensions).map(|_| rng.random_range(-half..=half)).collect();
        layout.set_point(p, &row);
    }
    layout
}

/// `max_s column_basis(s) - min_{a,s} titer.logged_for_column_bases()` over
/// Regular/Less/More titers (spec.md §4.6), the span the randomization box
/// is sized against.
pub fn max_table_distance(table: &TiterTable, column_bases: &ColumnBases) -> f64 {
    let max_basis = (0..column_bases.size())
        .map(|s| column_bases.column_basis(s))
        .fold(f64::MIN, f64::max);
    let min_logged = table
        .iter_non_dont_care()
        .filter(|(_, _, t)| t.is_regular() || t.is_less_than() || t.is_more_than())
        .map(|(_, _, t)| t.logged_for_column_bases())
        .fold(f64::MAX, f64::min);
    if !max_basis.is_finite() || !min_logged.is_finite() {
        return 0.0;
    }
    max_basis - min_logged
}

#[derive(Debug, Clone)]
pub struct MultiStartOptions {
    pub attempts: usize,
    pub dimension_schedule: Vec<usize>,
    pub method: Method,
    pub max_iterations: usize,
    pub max_distance_multiplier: f64,
    pub seed: u64,
}

impl Default for MultiStartOptions {
    fn default() -> Self {
        Self {
            attempts: 100,
            dimension_schedule: vec![2],
            method: Method::ConjugateGradient,
            max_iterations: 2000,
            max_distance_multiplier: 2.0,
            seed: 0,
        }
    }
}

/// Runs `options.attempts` independent randomized-start relaxations through
/// the dimension schedule, in parallel across worker threads (spec.md §4.6,
/// §5: optimizer restarts are embarrassingly parallel). Each attempt's seed
/// is derived from `options.seed` so the whole batch is reproducible; the
/// returned vector preserves attempt order so callers get a deterministic
/// tie-break (original append order) when they sort by stress.
pub fn multi_start(stress: &Stress, number_of_points: usize, max_table_distance: f64, options: &MultiStartOptions) -> Vec<RelaxOutcome> {
    use rand::SeedableRng;
    use rayon::prelude::*;

    let first_dim = *options
        .dimension_schedule
        .first()
        .expect("dimension schedule must not be empty");

    (0..options.attempts)
        .into_par_iter()
        .map(|attempt| {
            let mut rng = rand::rngs::SmallRng::seed_from_u64(options.seed.wrapping_add(attempt as u64));
            let start = randomize_layout(&mut rng, number_of_points, first_dim, max_table_distance, options.max_distance_multiplier);
            anneal(stress, start, &options.dimension_schedule, options.method, Precision::Rough, options.max_iterations)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use crate::{column_bases::MinimumColumnBasis, table::TiterTable, table_distances::BuildOptions, titer::Titer};

    fn two_point_stress() -> Stress {
        let mut t = TiterTable::new_dense(1, 1);
        t.set_titer(0, 0, Titer::Regular(40));
        let cb = ColumnBases::compute(&t, MinimumColumnBasis::None);
        let disconnected = HashSet::new();
        let avidity: Vec<f64> = Vec::new();
        let distances = crate::table_distances::TableDistances::build(
            &t,
            &cb,
            1,
            &BuildOptions {
                disconnected: &disconnected,
                dodgy_titer_is_regular: false,
                mult_antigen_titer_until_column_adjust: false,
                avidity_adjusts: &avidity,
            },
        );
        Stress::new(distances, 2, HashSet::new(), HashSet::new())
    }

    #[test]
    fn relax_drives_distance_to_target() {
        let stress = two_point_stress();
        let layout = Layout::from_rows(vec![vec![0.0, 0.0], vec![10.0, 0.0]]);
        let options = RelaxOptions { precision: Precision::Fine, ..Default::default() };
        let outcome = relax(&stress, layout, &options, None);
        assert!(outcome.stress < 1e-6, "stress {}", outcome.stress);
        assert!(!outcome.cancelled);
    }

    #[test]
    fn lbfgs_also_converges() {
        let stress = two_point_stress();
        let layout = Layout::from_rows(vec![vec![0.0, 0.0], vec![10.0, 0.0]]);
        let options = RelaxOptions { method: Method::Lbfgs, precision: Precision::Fine, ..Default::default() };
        let outcome = relax(&stress, layout, &options, None);
        assert!(outcome.stress < 1e-6, "stress {}", outcome.stress);
    }

    #[test]
    fn progress_callback_can_cancel() {
        let stress = two_point_stress();
        let layout = Layout::from_rows(vec![vec![0.0, 0.0], vec![10.0, 0.0]]);
        let options = RelaxOptions { precision: Precision::Fine, ..Default::default() };
        let mut calls = 0;
        let mut cb = |_iter: usize, _value: f64| {
            calls += 1;
            calls < 2
        };
        let outcome = relax(&stress, layout, &options, Some(&mut cb));
        assert!(outcome.cancelled);
        assert_eq!(calls, 2);
    }

    #[test]
    fn multi_start_is_reproducible_given_seed() {
        let stress = two_point_stress();
        let options = MultiStartOptions {
            attempts: 4,
            dimension_schedule: vec![2],
            seed: 7,
            ..Default::default()
        };
        let a = multi_start(&stress, 2, 5.0, &options);
        let b = multi_start(&stress, 2, 5.0, &options);
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.stress, y.stress);
        }
    }

    #[test]
    fn method_display_matches_cli_flag_spelling() {
        assert_eq!(Method::ConjugateGradient.to_string(), "alglib-cg");
        assert_eq!(Method::Lbfgs.to_string(), "alglib-lbfgs");
        assert_eq!("alglib-cg".parse::<Method>().unwrap(), Method::ConjugateGradient);
    }
}
