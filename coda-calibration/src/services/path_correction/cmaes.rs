//! Bounded CMA-ES minimiser
//!
//! (mu/mu_w, lambda) CMA-ES with rank-one and rank-mu covariance updates and
//! cumulative step-size adaptation. Box constraints are handled by repairing
//! each candidate to the nearest feasible point and adding a quadratic penalty
//! on the repair distance to the candidate's fitness.

use super::start_points::ParameterBounds;
use nalgebra::{DMatrix, DVector, SymmetricEigen};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use std::collections::VecDeque;

const PENALTY_WEIGHT: f64 = 1.0;
const MIN_EIGENVALUE: f64 = 1e-20;
const MAX_CONDITION: f64 = 1e14;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CmaesOptions {
    pub population: usize,
    pub initial_sigma: f64,
    /// Function-value and step-size stopping tolerance
    pub tolerance: f64,
    pub max_evaluations: u64,
    pub seed: u64,
}

impl Default for CmaesOptions {
    fn default() -> Self {
        Self {
            population: 20,
            initial_sigma: 0.5,
            tolerance: 1e-10,
            max_evaluations: 1_000_000,
            seed: 0,
        }
    }
}

/// Best point found by a converged run
#[derive(Debug, Clone, PartialEq)]
pub struct CmaesOutcome {
    pub point: Vec<f64>,
    pub cost: f64,
    pub evaluations: u64,
    pub generations: u64,
}

/// Strategy constants derived from dimension and population size
struct Strategy {
    lambda: usize,
    weights: Vec<f64>,
    mueff: f64,
    cc: f64,
    cs: f64,
    c1: f64,
    cmu: f64,
    damps: f64,
    chi_n: f64,
    history_len: usize,
}

impl Strategy {
    fn new(n: usize, population: usize) -> Self {
        let nf = n as f64;
        let lambda = population.max(4);
        let mu = lambda / 2;

        let raw: Vec<f64> = (0..mu)
            .map(|i| (mu as f64 + 0.5).ln() - ((i + 1) as f64).ln())
            .collect();
        let sum: f64 = raw.iter().sum();
        let weights: Vec<f64> = raw.iter().map(|w| w / sum).collect();
        let mueff = 1.0 / weights.iter().map(|w| w * w).sum::<f64>();

        let cc = (4.0 + mueff / nf) / (nf + 4.0 + 2.0 * mueff / nf);
        let cs = (mueff + 2.0) / (nf + mueff + 5.0);
        let c1 = 2.0 / ((nf + 1.3).powi(2) + mueff);
        let cmu = (1.0 - c1).min(2.0 * (mueff - 2.0 + 1.0 / mueff) / ((nf + 2.0).powi(2) + mueff));
        let damps = 1.0 + 2.0 * (((mueff - 1.0) / (nf + 1.0)).sqrt() - 1.0).max(0.0) + cs;
        let chi_n = nf.sqrt() * (1.0 - 1.0 / (4.0 * nf) + 1.0 / (21.0 * nf * nf));
        let history_len = 10 + (30.0 * nf / lambda as f64).ceil() as usize;

        Self {
            lambda,
            weights,
            mueff,
            cc,
            cs,
            c1,
            cmu,
            damps,
            chi_n,
            history_len,
        }
    }
}

struct Candidate {
    x: DVector<f64>,
    fitness: f64,
}

/// CMA-ES over a fixed box
pub struct Cmaes<'a> {
    bounds: &'a ParameterBounds,
    options: CmaesOptions,
}

impl<'a> Cmaes<'a> {
    pub fn new(bounds: &'a ParameterBounds, options: CmaesOptions) -> Self {
        Self { bounds, options }
    }

    /// Minimise `f` from `start`
    ///
    /// Returns `None` when the evaluation cap is reached before convergence
    /// or when `f` produces a non-finite value. On success the best raw cost
    /// seen at any feasible point is returned, which includes `start`.
    pub fn minimize<F>(&self, f: F, start: &[f64]) -> Option<CmaesOutcome>
    where
        F: Fn(&[f64]) -> f64,
    {
        let n = self.bounds.dimension();
        let start = self.bounds.repair(start);
        let start_cost = f(&start);
        if !start_cost.is_finite() {
            return None;
        }
        let mut evaluations: u64 = 1;
        let mut best = CmaesOutcome {
            point: start.clone(),
            cost: start_cost,
            evaluations,
            generations: 0,
        };
        if n == 0 {
            return Some(best);
        }

        let strategy = Strategy::new(n, self.options.population);
        let mut rng = StdRng::seed_from_u64(self.options.seed);

        let mut mean = DVector::from_vec(start);
        let mut sigma = self.options.initial_sigma;
        let mut pc = DVector::<f64>::zeros(n);
        let mut ps = DVector::<f64>::zeros(n);
        let mut b = DMatrix::<f64>::identity(n, n);
        let mut d = DVector::<f64>::from_element(n, 1.0);
        let mut c = DMatrix::<f64>::identity(n, n);
        let mut history: VecDeque<f64> = VecDeque::with_capacity(strategy.history_len);

        let mut generation: u64 = 0;
        loop {
            if evaluations + strategy.lambda as u64 > self.options.max_evaluations {
                return None;
            }

            let mut population = Vec::with_capacity(strategy.lambda);
            for _ in 0..strategy.lambda {
                let z = DVector::<f64>::from_fn(n, |_, _| rng.sample(StandardNormal));
                let x = &mean + (&b * d.component_mul(&z)) * sigma;
                let repaired = self.bounds.repair(x.as_slice());
                let raw = f(&repaired);
                evaluations += 1;
                if !raw.is_finite() {
                    return None;
                }
                if raw < best.cost {
                    best.point = repaired.clone();
                    best.cost = raw;
                }
                let penalty: f64 = x
                    .iter()
                    .zip(&repaired)
                    .map(|(v, r)| (v - r) * (v - r))
                    .sum();
                population.push(Candidate {
                    x,
                    fitness: raw + PENALTY_WEIGHT * penalty,
                });
            }
            population.sort_by(|a, b| a.fitness.total_cmp(&b.fitness));

            let old_mean = mean.clone();
            mean = DVector::<f64>::zeros(n);
            for (w, candidate) in strategy.weights.iter().zip(&population) {
                mean += &candidate.x * *w;
            }
            let y_w = (&mean - &old_mean) / sigma;

            let inv_d = d.map(|v| 1.0 / v);
            let inv_sqrt_c_y = &b * inv_d.component_mul(&(b.transpose() * &y_w));
            ps = &ps * (1.0 - strategy.cs)
                + inv_sqrt_c_y * (strategy.cs * (2.0 - strategy.cs) * strategy.mueff).sqrt();

            let ps_norm = ps.norm();
            let decay = (1.0 - (1.0 - strategy.cs).powf(2.0 * (generation + 1) as f64)).sqrt();
            let hsig = ps_norm / decay / strategy.chi_n < 1.4 + 2.0 / (n as f64 + 1.0);
            let hsig_f = if hsig { 1.0 } else { 0.0 };

            pc = &pc * (1.0 - strategy.cc)
                + &y_w * (hsig_f * (strategy.cc * (2.0 - strategy.cc) * strategy.mueff).sqrt());

            let mut rank_mu = DMatrix::<f64>::zeros(n, n);
            for (w, candidate) in strategy.weights.iter().zip(&population) {
                let y = (&candidate.x - &old_mean) / sigma;
                rank_mu += (&y * y.transpose()) * *w;
            }
            let rank_one = &pc * pc.transpose()
                + &c * ((1.0 - hsig_f) * strategy.cc * (2.0 - strategy.cc));
            c = &c * (1.0 - strategy.c1 - strategy.cmu) + rank_one * strategy.c1 + rank_mu * strategy.cmu;

            sigma *= ((strategy.cs / strategy.damps) * (ps_norm / strategy.chi_n - 1.0)).exp();
            if !sigma.is_finite() || sigma <= 0.0 {
                return None;
            }

            c = (&c + c.transpose()) * 0.5;
            let eigen = SymmetricEigen::new(c.clone());
            if eigen.eigenvalues.iter().any(|v| !v.is_finite()) {
                return None;
            }
            d = eigen.eigenvalues.map(|v| v.max(MIN_EIGENVALUE).sqrt());
            b = eigen.eigenvectors;

            generation += 1;
            best.evaluations = evaluations;
            best.generations = generation;

            // Stopping criteria
            let gen_best = population[0].fitness;
            let gen_worst = population[population.len() - 1].fitness;
            if history.len() == strategy.history_len {
                history.pop_front();
            }
            history.push_back(gen_best);
            if history.len() == strategy.history_len {
                let hi = history.iter().copied().fold(gen_worst, f64::max);
                let lo = history.iter().copied().fold(gen_best, f64::min);
                if hi - lo < self.options.tolerance {
                    return Some(best);
                }
            }

            let tol_x = (0..n).all(|i| sigma * pc[i].abs().max(c[(i, i)].sqrt()) < self.options.tolerance);
            if tol_x {
                return Some(best);
            }

            let d_max = d.iter().copied().fold(f64::MIN, f64::max);
            let d_min = d.iter().copied().fold(f64::MAX, f64::min);
            if (d_max / d_min).powi(2) > MAX_CONDITION {
                tracing::debug!(generation, "Covariance ill-conditioned, stopping");
                return Some(best);
            }
        }
    }
}
