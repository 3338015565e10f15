use crate::error::OptimizerError;

/// What a missing sign change across the bracket means.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BracketPolicy {
    /// Fall back to the endpoint whose residual is smallest. Best-effort,
    /// non-fatal: the tuning value is approximate but usable.
    Lenient,
    /// The caller declared the bracket must contain a root; fail with
    /// `NoRootInBracket`.
    Strict,
}

/// Iteration cap. Bisection alone reduces the bracket by 2^100 within
/// this budget, so hitting it means the tolerance was already met.
const MAX_ITERATIONS: u32 = 100;

/// Absolute floor on the convergence interval, below any physical scale
/// the design parameters use.
const XTOL: f64 = 2e-12;

/// Find a root of `f` on the bracket with Brent's method (bisection,
/// secant, and inverse quadratic interpolation).
///
/// Every call to `f` is a full simulator run, so the iteration count is
/// the cost that matters. `rtol` is relative on the abscissa. `metric`
/// names the observable for error reporting; `policy` decides what a
/// missing sign change means. A non-finite residual (a saturated
/// observable) disables interpolation for that step and falls back to
/// bisection, keeping the shrinking bracket valid.
pub fn find_root<F>(
    mut f: F,
    bracket: (f64, f64),
    rtol: f64,
    metric: &str,
    policy: BracketPolicy,
) -> Result<f64, OptimizerError>
where
    F: FnMut(f64) -> Result<f64, OptimizerError>,
{
    let (mut a, mut b) = bracket;
    let mut fa = f(a)?;
    let mut fb = f(b)?;

    if fa == 0.0 {
        return Ok(a);
    }
    if fb == 0.0 {
        return Ok(b);
    }
    if fa.signum() == fb.signum() {
        return match policy {
            BracketPolicy::Lenient => Ok(if fa.abs() <= fb.abs() { a } else { b }),
            BracketPolicy::Strict => Err(OptimizerError::NoRootInBracket {
                metric: metric.to_string(),
                lo: bracket.0,
                hi: bracket.1,
            }),
        };
    }

    let mut c = a;
    let mut fc = fa;
    let mut d = b - a;
    let mut e = d;

    for _ in 0..MAX_ITERATIONS {
        if fb.signum() == fc.signum() {
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

        let tol = 0.5 * (XTOL + rtol * b.abs());
        let xm = 0.5 * (c - b);
        if xm.abs() <= tol || fb == 0.0 {
            return Ok(b);
        }

        if e.abs() >= tol && fa.abs() > fb.abs() && fa.is_finite() && fc.is_finite() {
            // interpolated step: secant when a == c, inverse quadratic otherwise
            let s = fb / fa;
            let (mut p, mut q);
            if a == c {
                p = 2.0 * xm * s;
                q = 1.0 - s;
            } else {
                let r0 = fa / fc;
                let r1 = fb / fc;
                p = s * (2.0 * xm * r0 * (r0 - r1) - (b - a) * (r1 - 1.0));
                q = (r0 - 1.0) * (r1 - 1.0) * (s - 1.0);
            }
            if p > 0.0 {
                q = -q;
            }
            p = p.abs();
            let min1 = 3.0 * xm * q - (tol * q).abs();
            let min2 = (e * q).abs();
            if 2.0 * p < min1.min(min2) {
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
        if d.abs() > tol {
            b += d;
        } else {
            b += tol.copysign(xm);
        }
        fb = f(b)?;
        if fb == 0.0 {
            return Ok(b);
        }
    }

    Ok(b)
}
