use log::{debug, warn};
use nalgebra::{linalg::LU, DMatrix, DVector, Dyn};
use super::level_op::{Assemble, LinearOp, MgLevelOp};




/// A solver for the coarsest multigrid depth.
///
pub trait LinearSolver<T, Op> {

    /// With homogeneous set, solve the correction equation, where the
    /// boundary data are zero.
    fn set_homogeneous(&mut self, homogeneous: bool);

    fn solve(&mut self, op: &Op, phi: &mut T, rhs: &T);
}




/// Repeated relaxation, until the max norm of the residual has dropped by
/// `tolerance` or the iteration cap is reached.
///
#[derive(Clone, Debug)]
pub struct RelaxSolver {
    pub tolerance: f64,
    pub max_iterations: usize,
    homogeneous: bool,
}

impl RelaxSolver {
    pub fn new(tolerance: f64, max_iterations: usize) -> Self {
        Self { tolerance, max_iterations, homogeneous: true }
    }
}

impl<T, Op: MgLevelOp<T>> LinearSolver<T, Op> for RelaxSolver {
    fn set_homogeneous(&mut self, homogeneous: bool) {
        self.homogeneous = homogeneous
    }

    fn solve(&mut self, op: &Op, phi: &mut T, rhs: &T) {
        let mut residual = op.create(rhs);
        op.residual(&mut residual, phi, rhs, self.homogeneous);

        let initial = op.norm(&residual, 0);
        let mut error = initial;
        let mut iter = 0;

        while error > self.tolerance * initial && iter < self.max_iterations {
            if self.homogeneous {
                op.relax(phi, rhs, 1)
            } else {
                op.relax_nf(phi, None, rhs, 1)
            }
            op.residual(&mut residual, phi, rhs, self.homogeneous);
            error = op.norm(&residual, 0);
            iter += 1;
        }
        debug!("RelaxSolver - {} iterations, residual {:.3e} -> {:.3e}", iter, initial, error);
    }
}




/// The stabilized bi-conjugate gradient method, without preconditioning.
/// The iteration restarts when the method breaks down, up to
/// `max_restarts` times.
///
#[derive(Clone, Debug)]
pub struct BiCgStabSolver {
    pub tolerance: f64,
    pub max_iterations: usize,
    pub max_restarts: usize,
    pub verbosity: i32,
    homogeneous: bool,
}

impl Default for BiCgStabSolver {
    fn default() -> Self {
        Self { tolerance: 1e-6, max_iterations: 80, max_restarts: 5, verbosity: 0, homogeneous: true }
    }
}

impl<T, Op: LinearOp<T>> LinearSolver<T, Op> for BiCgStabSolver {
    fn set_homogeneous(&mut self, homogeneous: bool) {
        self.homogeneous = homogeneous
    }

    fn solve(&mut self, op: &Op, phi: &mut T, rhs: &T) {
        let mut r = op.create(rhs);
        let mut r_tilde = op.create(rhs);
        let mut e = op.create(phi);
        let mut p = op.create(rhs);
        let mut v = op.create(rhs);
        let mut s = op.create(rhs);
        let mut t = op.create(rhs);

        op.residual(&mut r, phi, rhs, self.homogeneous);
        op.set_to_zero(&mut e);

        let initial = op.norm(&r, 0);
        let target = self.tolerance * initial;
        let mut error = initial;
        let mut iter = 0;
        let mut restarts = 0;

        'restart: while error > target && iter < self.max_iterations && restarts <= self.max_restarts {
            op.assign(&mut r_tilde, &r);
            op.set_to_zero(&mut p);
            op.set_to_zero(&mut v);

            let mut rho_old = 1.0;
            let mut alpha = 1.0;
            let mut omega = 1.0;
            let mut first = true;

            while iter < self.max_iterations {
                let rho = op.dot(&r_tilde, &r);

                if rho == 0.0 {
                    restarts += 1;
                    continue 'restart;
                }
                if first {
                    op.assign(&mut p, &r);
                    first = false;
                } else {
                    let beta = (rho / rho_old) * (alpha / omega);
                    op.incr(&mut p, &v, -omega);
                    op.scale(&mut p, beta);
                    op.incr(&mut p, &r, 1.0);
                }
                op.apply_op(&mut v, &mut p, true);

                let denominator = op.dot(&r_tilde, &v);

                if denominator == 0.0 {
                    restarts += 1;
                    continue 'restart;
                }
                alpha = rho / denominator;
                op.axby(&mut s, &r, &v, 1.0, -alpha);
                op.incr(&mut e, &p, alpha);
                iter += 1;

                error = op.norm(&s, 0);

                if error <= target {
                    break 'restart;
                }
                op.apply_op(&mut t, &mut s, true);

                let tt = op.dot(&t, &t);

                if tt == 0.0 {
                    op.assign(&mut r, &s);
                    restarts += 1;
                    continue 'restart;
                }
                omega = op.dot(&t, &s) / tt;
                op.incr(&mut e, &s, omega);
                op.axby(&mut r, &s, &t, 1.0, -omega);
                error = op.norm(&r, 0);

                if self.verbosity > 3 {
                    debug!("BiCgStabSolver - iter {}, residual {:.3e}", iter, error);
                }
                if error <= target || omega == 0.0 {
                    break 'restart;
                }
                rho_old = rho;
            }
        }
        op.incr(phi, &e, 1.0);

        if error > target && self.verbosity > 0 {
            warn!("BiCgStabSolver - not converged after {} iterations: residual {:.3e}, initial {:.3e}", iter, error, initial);
        }
    }
}




/// Dense direct solve. On first use the homogeneous operator is probed one
/// unit vector at a time to form its matrix, which is LU-factored and
/// reused by later solves. An inhomogeneous solve moves the boundary
/// contribution `L(0)` to the right-hand side. Call `reset` if the operator
/// changes.
///
pub struct DirectSolver {
    homogeneous: bool,
    factors: Option<LU<f64, Dyn, Dyn>>,
}

impl Default for DirectSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl DirectSolver {
    pub fn new() -> Self {
        Self { homogeneous: true, factors: None }
    }

    pub fn reset(&mut self) {
        self.factors = None
    }

    fn factor<T, Op: LinearOp<T> + Assemble<T>>(op: &Op, prototype: &T) -> LU<f64, Dyn, Dyn> {
        let n = op.num_unknowns(prototype);
        let mut matrix = DMatrix::zeros(n, n);
        let mut unit = op.create(prototype);
        let mut column = op.create(prototype);
        let mut values = vec![0.0; n];

        for k in 0..n {
            values[k] = 1.0;
            op.set_to_zero(&mut unit);
            op.scatter(&mut unit, &values);
            op.apply_op(&mut column, &mut unit, true);
            matrix.set_column(k, &DVector::from_vec(op.gather(&column)));
            values[k] = 0.0;
        }
        debug!("DirectSolver - factoring a {} x {} operator", n, n);
        matrix.lu()
    }
}

impl<T, Op: LinearOp<T> + Assemble<T>> LinearSolver<T, Op> for DirectSolver {
    fn set_homogeneous(&mut self, homogeneous: bool) {
        self.homogeneous = homogeneous
    }

    fn solve(&mut self, op: &Op, phi: &mut T, rhs: &T) {
        let factors = self.factors.get_or_insert_with(|| Self::factor(op, rhs));
        let mut b = DVector::from_vec(op.gather(rhs));

        if !self.homogeneous {
            let mut zero = op.create(phi);
            let mut boundary = op.create(rhs);
            op.set_to_zero(&mut zero);
            op.apply_op(&mut boundary, &mut zero, false);
            b -= DVector::from_vec(op.gather(&boundary));
        }
        match factors.solve(&b) {
            Some(x) => op.scatter(phi, x.as_slice()),
            None => panic!("DirectSolver::solve - the operator matrix is singular"),
        }
    }
}
