use log::warn;




/// Maximum number of iterations of the root finder.
pub const BRENT_MAX_ITER: usize = 100;

const EPS: f64 = 3.0e-15;




/// A geometry described by the sign of a scalar function of position. The
/// fluid occupies the region where `value < 0`; the embedded boundary is the
/// zero level set.
///
pub trait ImplicitFunction: Send + Sync {
    fn value(&self, point: [f64; 2]) -> f64;
}




/// Geometry without an embedded boundary.
///
#[derive(Clone, Copy, Debug, Default)]
pub struct AllRegular;

/// A half plane. The normal points out of the fluid.
///
#[derive(Clone, Copy, Debug)]
pub struct Plane {
    pub normal: [f64; 2],
    pub point: [f64; 2],
}

/// A disk of fluid. Use `Complement` for a circular obstacle.
///
#[derive(Clone, Copy, Debug)]
pub struct Circle {
    pub center: [f64; 2],
    pub radius: f64,
}

/// Exchanges fluid and solid.
///
pub struct Complement<F>(pub F);

/// The fluid is the union of the fluids of all members.
///
pub struct Union(pub Vec<Box<dyn ImplicitFunction>>);

/// The fluid is the intersection of the fluids of all members.
///
pub struct Intersection(pub Vec<Box<dyn ImplicitFunction>>);




// ============================================================================
impl ImplicitFunction for AllRegular {
    fn value(&self, _point: [f64; 2]) -> f64 {
        -1.0
    }
}

impl ImplicitFunction for Plane {
    fn value(&self, point: [f64; 2]) -> f64 {
        self.normal[0] * (point[0] - self.point[0]) + self.normal[1] * (point[1] - self.point[1])
    }
}

impl ImplicitFunction for Circle {
    fn value(&self, point: [f64; 2]) -> f64 {
        let dx = point[0] - self.center[0];
        let dy = point[1] - self.center[1];
        (dx * dx + dy * dy).sqrt() - self.radius
    }
}

impl<F: ImplicitFunction> ImplicitFunction for Complement<F> {
    fn value(&self, point: [f64; 2]) -> f64 {
        -self.0.value(point)
    }
}

impl ImplicitFunction for Union {
    fn value(&self, point: [f64; 2]) -> f64 {
        self.0.iter().map(|f| f.value(point)).fold(f64::INFINITY, f64::min)
    }
}

impl ImplicitFunction for Intersection {
    fn value(&self, point: [f64; 2]) -> f64 {
        self.0.iter().map(|f| f.value(point)).fold(f64::NEG_INFINITY, f64::max)
    }
}




/// Locate a root of `f` in `[a, b]` with Brent's method (inverse quadratic
/// interpolation safeguarded by bisection).
///
/// # Panics
///
/// If `f(a)` and `f(b)` have the same strict sign. The caller only invokes
/// this on cell edges across which the geometry changes sign, so a missing
/// bracket means the geometry is corrupt.
///
/// If the iteration budget is exhausted a warning is logged and the best
/// estimate is returned.
///
pub fn brent_root<F>(f: F, a: f64, b: f64, tolerance: f64) -> f64
where
    F: Fn(f64) -> f64
{
    let (mut a, mut b) = (a, b);
    let (mut fa, mut fb) = (f(a), f(b));

    if fa * fb > 0.0 {
        panic!("brent_root - root must be bracketed, but f({}) = {} and f({}) = {} have the same sign", a, fa, b, fb)
    }
    if fa == 0.0 {
        return a;
    }

    let mut c = b;
    let mut fc = fb;
    let mut d = b - a;
    let mut e = d;

    for _ in 0..BRENT_MAX_ITER {
        if fb * fc > 0.0 {
            c = a;
            fc = fa;
            d = b - a;
            e = d;
        }
        if fc.abs() < fb.abs() {
            a = b;
            b = c;
            c = a;
            fa = fb;
            fb = fc;
            fc = fa;
        }

        let tol1 = 2.0 * EPS * b.abs() + 0.5 * tolerance;
        let xm = 0.5 * (c - b);

        if xm.abs() <= tol1 || fb == 0.0 {
            return b;
        }

        if e.abs() >= tol1 && fa.abs() > fb.abs() {
            let s = fb / fa;
            let (mut p, mut q) = if a == c {
                (2.0 * xm * s, 1.0 - s)
            } else {
                let q = fa / fc;
                let r = fb / fc;
                (s * (2.0 * xm * q * (q - r) - (b - a) * (r - 1.0)), (q - 1.0) * (r - 1.0) * (s - 1.0))
            };
            if p > 0.0 {
                q = -q;
            }
            p = p.abs();

            if 2.0 * p < (3.0 * xm * q - (tol1 * q).abs()).min((e * q).abs()) {
                e = d;
                d = p / q;
            } else {
                d = xm;
                e = d;
            }
        } else {
            d = xm;
            e = d;
        }

        a = b;
        fa = fb;

        if d.abs() > tol1 {
            b += d;
        } else {
            b += tol1.copysign(xm);
        }
        fb = f(b);
    }

    warn!("brent_root - exceeded {} iterations; returning estimate {}", BRENT_MAX_ITER, b);
    b
}




// ============================================================================
#[cfg(test)]
mod test {

    use approx::assert_relative_eq;
    use super::{brent_root, Circle, Complement, ImplicitFunction, Intersection, Plane, Union};

    #[test]
    fn brent_finds_a_smooth_root() {
        let root = brent_root(|x| x * x - 2.0, 0.0, 2.0, 1e-14);
        assert_relative_eq!(root, 2.0_f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn brent_accepts_roots_at_endpoints() {
        assert_eq!(brent_root(|x| x - 1.0, 1.0, 3.0, 1e-12), 1.0);
    }

    #[test]
    #[should_panic(expected = "root must be bracketed")]
    fn brent_requires_a_bracket() {
        brent_root(|x| x * x + 1.0, -1.0, 1.0, 1e-12);
    }

    #[test]
    fn combinators_follow_the_sign_convention() {
        let disk = Circle { center: [0.5, 0.5], radius: 0.25 };
        let obstacle = Complement(disk);
        assert!(disk.value([0.5, 0.5]) < 0.0);
        assert!(obstacle.value([0.5, 0.5]) > 0.0);

        let lower = Plane { normal: [0.0, 1.0], point: [0.0, 0.5] };
        let both = Intersection(vec![Box::new(disk), Box::new(lower)]);
        let either = Union(vec![Box::new(disk), Box::new(lower)]);
        assert!(both.value([0.5, 0.6]) > 0.0);
        assert!(either.value([0.5, 0.6]) < 0.0);
        assert!(either.value([0.0, 0.1]) < 0.0);
    }
}
