use super::traits::{OptimizationCallback, Problem, Solver, SolverResult};
use crate::error::OptimizerError;

/// Derivative-free simplex search, constrained to the problem's bounds.
///
/// Every trial vertex is clamped to the bounds before the objective sees
/// it, so the objective is never queried outside them.
pub struct NelderMead {
    max_iter: u32,
    /// Convergence threshold on the simplex diameter.
    xtol: f64,
    /// Convergence threshold on the cost spread across the simplex.
    ftol: f64,
    alpha: f64, // reflection
    gamma: f64, // expansion
    rho: f64,   // contraction
    sigma: f64, // shrink
    /// Fraction of each dimension's bound range used to displace the
    /// initial vertices.
    init_step: f64,
}

impl NelderMead {
    pub fn new(max_iter: u32, xtol: f64, ftol: f64) -> Self {
        Self {
            max_iter,
            xtol,
            ftol,
            alpha: 1.0,
            gamma: 2.0,
            rho: 0.5,
            sigma: 0.5,
            init_step: 0.1,
        }
    }

    fn clamp(params: &mut [f64], bounds: &[(f64, f64)]) {
        for (p, &(lo, hi)) in params.iter_mut().zip(bounds) {
            *p = p.clamp(lo, hi);
        }
    }

    /// Initial simplex: the starting point plus one vertex per dimension,
    /// displaced by `init_step` of that dimension's bound range and
    /// reflected inward when the displacement would leave the bounds.
    /// Fully deterministic.
    fn initial_simplex(&self, x0: &[f64], bounds: &[(f64, f64)]) -> Vec<Vec<f64>> {
        let mut simplex = Vec::with_capacity(x0.len() + 1);
        simplex.push(x0.to_vec());
        for (i, &(lo, hi)) in bounds.iter().enumerate() {
            let step = self.init_step * (hi - lo);
            let mut vertex = x0.to_vec();
            vertex[i] = if x0[i] + step <= hi {
                x0[i] + step
            } else {
                x0[i] - step
            };
            simplex.push(vertex);
        }
        simplex
    }

    /// Largest coordinate excursion of any vertex from the best vertex.
    fn diameter(simplex: &[Vec<f64>]) -> f64 {
        let best = &simplex[0];
        simplex[1..]
            .iter()
            .flat_map(|v| v.iter().zip(best).map(|(a, b)| (a - b).abs()))
            .fold(0.0, f64::max)
    }
}

impl Solver for NelderMead {
    fn name(&self) -> &str {
        "NelderMead"
    }

    fn solve(
        &mut self,
        problem: &dyn Problem,
        callback: &mut dyn OptimizationCallback,
    ) -> Result<SolverResult, OptimizerError> {
        let n = problem.num_params();
        assert!(n > 0, "cannot optimize a zero-dimensional problem");
        let bounds = problem.bounds();

        let mut x0 = problem.initial_params().to_vec();
        Self::clamp(&mut x0, bounds);

        let mut simplex = self.initial_simplex(&x0, bounds);
        let mut costs = Vec::with_capacity(n + 1);
        let mut cost_evals = 0usize;
        for vertex in &mut simplex {
            Self::clamp(vertex, bounds);
            costs.push(problem.cost(vertex)?);
            cost_evals += 1;
        }

        for iter in 0..self.max_iter {
            // order vertices best-first
            let mut order: Vec<usize> = (0..=n).collect();
            order.sort_by(|&i, &j| {
                costs[i]
                    .partial_cmp(&costs[j])
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            simplex = order.iter().map(|&i| simplex[i].clone()).collect();
            costs = order.iter().map(|&i| costs[i]).collect();

            let best = costs[0];
            let worst = costs[n];

            callback.on_iteration(iter + 1, &simplex[0], best)?;
            if callback.should_stop() {
                return Ok(SolverResult {
                    success: true,
                    cost: best,
                    iterations: iter + 1,
                    message: "Stopped by callback".into(),
                    params: simplex.swap_remove(0),
                    cost_evals,
                });
            }

            let spread = if worst.is_finite() {
                worst - best
            } else {
                f64::INFINITY
            };
            if Self::diameter(&simplex) < self.xtol && spread < self.ftol {
                return Ok(SolverResult {
                    success: true,
                    cost: best,
                    iterations: iter + 1,
                    message: "Converged".into(),
                    params: simplex.swap_remove(0),
                    cost_evals,
                });
            }

            // centroid of all vertices but the worst
            let mut centroid = vec![0.0; n];
            for vertex in &simplex[..n] {
                for (c, &x) in centroid.iter_mut().zip(vertex) {
                    *c += x / n as f64;
                }
            }

            // reflection
            let mut reflected = vec![0.0; n];
            for j in 0..n {
                reflected[j] = centroid[j] + self.alpha * (centroid[j] - simplex[n][j]);
            }
            Self::clamp(&mut reflected, bounds);
            let reflected_cost = problem.cost(&reflected)?;
            cost_evals += 1;

            if reflected_cost < costs[0] {
                // best so far: try expansion
                let mut expanded = vec![0.0; n];
                for j in 0..n {
                    expanded[j] = centroid[j] + self.gamma * (reflected[j] - centroid[j]);
                }
                Self::clamp(&mut expanded, bounds);
                let expanded_cost = problem.cost(&expanded)?;
                cost_evals += 1;
                if expanded_cost < reflected_cost {
                    simplex[n] = expanded;
                    costs[n] = expanded_cost;
                } else {
                    simplex[n] = reflected;
                    costs[n] = reflected_cost;
                }
            } else if reflected_cost < costs[n - 1] {
                // better than the second-worst: accept
                simplex[n] = reflected;
                costs[n] = reflected_cost;
            } else {
                // contraction toward the worst vertex
                let mut contracted = vec![0.0; n];
                for j in 0..n {
                    contracted[j] = centroid[j] + self.rho * (simplex[n][j] - centroid[j]);
                }
                Self::clamp(&mut contracted, bounds);
                let contracted_cost = problem.cost(&contracted)?;
                cost_evals += 1;
                if contracted_cost < costs[n] {
                    simplex[n] = contracted;
                    costs[n] = contracted_cost;
                } else {
                    // contraction failed: shrink everything toward the best
                    for i in 1..=n {
                        for j in 0..n {
                            simplex[i][j] =
                                simplex[0][j] + self.sigma * (simplex[i][j] - simplex[0][j]);
                        }
                        Self::clamp(&mut simplex[i], bounds);
                        costs[i] = problem.cost(&simplex[i])?;
                        cost_evals += 1;
                    }
                }
            }
        }

        let mut best_idx = 0;
        for i in 1..=n {
            if costs[i] < costs[best_idx] {
                best_idx = i;
            }
        }
        Ok(SolverResult {
            success: false,
            cost: costs[best_idx],
            iterations: self.max_iter,
            message: "Max iterations reached".into(),
            params: simplex.swap_remove(best_idx),
            cost_evals,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::cell::Cell;

    struct QuadraticProblem {
        center: Vec<f64>,
        x0: Vec<f64>,
        bounds: Vec<(f64, f64)>,
        out_of_bounds_queries: Cell<usize>,
    }

    impl QuadraticProblem {
        fn new(center: Vec<f64>, x0: Vec<f64>, bounds: Vec<(f64, f64)>) -> Self {
            Self {
                center,
                x0,
                bounds,
                out_of_bounds_queries: Cell::new(0),
            }
        }
    }

    impl Problem for QuadraticProblem {
        fn cost(&self, params: &[f64]) -> Result<f64, OptimizerError> {
            for (&p, &(lo, hi)) in params.iter().zip(&self.bounds) {
                if p < lo || p > hi {
                    self.out_of_bounds_queries
                        .set(self.out_of_bounds_queries.get() + 1);
                }
            }
            Ok(params
                .iter()
                .zip(&self.center)
                .map(|(p, c)| (p - c) * (p - c))
                .sum())
        }

        fn num_params(&self) -> usize {
            self.x0.len()
        }

        fn initial_params(&self) -> &[f64] {
            &self.x0
        }

        fn bounds(&self) -> &[(f64, f64)] {
            &self.bounds
        }
    }

    struct Quiet;

    impl OptimizationCallback for Quiet {
        fn on_iteration(&mut self, _: u32, _: &[f64], _: f64) -> Result<(), OptimizerError> {
            Ok(())
        }
    }

    #[test]
    fn converges_to_an_interior_minimum() {
        let problem = QuadraticProblem::new(
            vec![0.3, -0.7],
            vec![0.0, 0.0],
            vec![(-2.0, 2.0), (-2.0, 2.0)],
        );
        let result = NelderMead::new(500, 1e-8, 1e-12)
            .solve(&problem, &mut Quiet)
            .unwrap();
        assert!(result.success, "{}", result.message);
        assert!((result.params[0] - 0.3).abs() < 1e-4);
        assert!((result.params[1] + 0.7).abs() < 1e-4);
        assert!(result.cost < 1e-8);
    }

    #[test]
    fn finds_a_minimum_sitting_on_a_bound() {
        // true minimum at 3.0 lies outside [-1, 1]; the solver should
        // settle on the boundary
        let problem = QuadraticProblem::new(vec![3.0], vec![0.0], vec![(-1.0, 1.0)]);
        let result = NelderMead::new(500, 1e-8, 1e-12)
            .solve(&problem, &mut Quiet)
            .unwrap();
        assert!((result.params[0] - 1.0).abs() < 1e-6);
        assert_eq!(problem.out_of_bounds_queries.get(), 0);
    }

    #[test]
    fn initial_simplex_is_deterministic_and_in_bounds() {
        let nm = NelderMead::new(10, 1e-6, 1e-6);
        let bounds = vec![(0.0, 1.0), (-1.0, 0.0)];
        // x0 at the upper bound of dim 0: its vertex must reflect inward
        let simplex = nm.initial_simplex(&[1.0, -0.5], &bounds);
        assert_eq!(simplex.len(), 3);
        assert_eq!(simplex[1][0], 1.0 - 0.1);
        assert_eq!(simplex[2][1], -0.5 + 0.1);
        assert_eq!(nm.initial_simplex(&[1.0, -0.5], &bounds), simplex);
    }

    #[test]
    fn never_queries_outside_bounds_on_randomized_problems() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for _ in 0..120 {
            let n = rng.gen_range(1..=5);
            let mut bounds = Vec::with_capacity(n);
            let mut center = Vec::with_capacity(n);
            let mut x0 = Vec::with_capacity(n);
            for _ in 0..n {
                let lo = rng.gen_range(-3.0..0.0);
                let hi = rng.gen_range(0.5..4.0);
                bounds.push((lo, hi));
                // centers may fall outside the box to force boundary work
                center.push(rng.gen_range(2.0 * lo..2.0 * hi));
                x0.push(rng.gen_range(lo..hi));
            }
            let problem = QuadraticProblem::new(center, x0, bounds);
            NelderMead::new(60, 1e-7, 1e-10)
                .solve(&problem, &mut Quiet)
                .unwrap();
            assert_eq!(problem.out_of_bounds_queries.get(), 0);
        }
    }

    #[test]
    fn infinite_costs_do_not_derail_the_search() {
        struct Cliff;
        impl Problem for Cliff {
            fn cost(&self, params: &[f64]) -> Result<f64, OptimizerError> {
                if params[0] > 0.5 {
                    Ok(f64::INFINITY)
                } else {
                    Ok((params[0] + 0.2) * (params[0] + 0.2))
                }
            }
            fn num_params(&self) -> usize {
                1
            }
            fn initial_params(&self) -> &[f64] {
                &[0.4]
            }
            fn bounds(&self) -> &[(f64, f64)] {
                &[(-1.0, 1.0)]
            }
        }
        let result = NelderMead::new(300, 1e-8, 1e-10)
            .solve(&Cliff, &mut Quiet)
            .unwrap();
        assert!((result.params[0] + 0.2).abs() < 1e-4);
    }

    #[test]
    fn iteration_cap_reports_best_vertex_without_success() {
        let problem = QuadraticProblem::new(
            vec![0.5, 0.5],
            vec![-1.5, -1.5],
            vec![(-2.0, 2.0), (-2.0, 2.0)],
        );
        let result = NelderMead::new(2, 1e-12, 1e-12)
            .solve(&problem, &mut Quiet)
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.iterations, 2);
        assert_eq!(result.message, "Max iterations reached");
    }
}
