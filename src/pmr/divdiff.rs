//! Incremental divided differences of the exponential.
//!
//! Configuration weights contain the factor `exp[u_0, .., u_q]`, the divided
//! difference of `e^x` over the path of (negated, beta-scaled) diagonal
//! energies. The classical recursive table is numerically useless here
//! because adjacent exponentials cancel. Instead the inputs are shifted by a
//! center `mu` and divided by an integer scale `s` so that every shifted
//! input lies in a small window, the divided differences of the scaled
//! problem are built from complete homogeneous symmetric polynomials (an
//! all-positive-term series when the window is small), and the identity
//! `exp[u_0..u_n] = e^mu s^-n (B^s)_{0,n}` with `B_{ij} = exp[y_i..y_j]`
//! undoes the scaling. Values are held with an extended exponent since `B^s`
//! entries overflow `f64` long before the final logarithm does.
//!
//! Pushes cost `O(n)` and pops are exact truncations, which is what the
//! Metropolis moves need: they edit a contiguous span of the energy path and
//! roll back rejected proposals by truncating and replaying the old tail.

/// Inputs further than this from the center (after scaling) force a rebuild.
const WINDOW: f64 = 3.5;
/// Series terms kept per column entry. With the window above, term `j` is
/// bounded by `3.5^j / j!`, below 1e-26 at `j = 40`.
const SERIES_TERMS: usize = 40;

/// A float with an `i64` exponent: `frac * 2^exp` with `|frac|` in `[1, 2)`,
/// or exact zero. Enough range for the matrix powers of scaled divided
/// differences, which overflow `f64` at modest operator-string lengths.
#[derive(Clone, Copy, Debug)]
pub struct WideFloat {
    frac: f64,
    exp: i64,
}

impl WideFloat {
    /// Exact zero.
    pub fn zero() -> Self {
        Self { frac: 0.0, exp: 0 }
    }

    /// Exact one.
    pub fn one() -> Self {
        Self { frac: 1.0, exp: 0 }
    }

    /// Convert from a finite `f64`.
    pub fn from_f64(x: f64) -> Self {
        if x == 0.0 {
            return Self::zero();
        }
        let (x, offset) = if x.abs() < f64::MIN_POSITIVE {
            // Subnormal. Scale into the normal range first.
            (x * 2f64.powi(600), -600i64)
        } else {
            (x, 0)
        };
        let bits = x.to_bits();
        let biased = ((bits >> 52) & 0x7ff) as i64;
        let frac = f64::from_bits((bits & !(0x7ffu64 << 52)) | (1023u64 << 52));
        Self {
            frac,
            exp: biased - 1023 + offset,
        }
    }

    /// True for exact zero.
    pub fn is_zero(&self) -> bool {
        self.frac == 0.0
    }

    fn renormalize(&mut self) {
        let w = Self::from_f64(self.frac);
        self.frac = w.frac;
        self.exp = if w.is_zero() { 0 } else { self.exp + w.exp };
        if w.is_zero() {
            self.frac = 0.0;
        }
    }

    /// `self *= rhs`.
    pub fn mul_assign(&mut self, rhs: &WideFloat) {
        if self.is_zero() || rhs.is_zero() {
            *self = Self::zero();
            return;
        }
        self.frac *= rhs.frac;
        self.exp += rhs.exp;
        self.renormalize();
    }

    /// `self *= x` for finite `x`.
    pub fn mul_f64(&mut self, x: f64) {
        if self.is_zero() {
            return;
        }
        let w = Self::from_f64(self.frac * x);
        if w.is_zero() {
            *self = Self::zero();
        } else {
            self.frac = w.frac;
            self.exp += w.exp;
        }
    }

    /// `self += rhs`. An addend more than ~1070 binary orders below the
    /// other would not change it and is dropped.
    pub fn add_assign(&mut self, rhs: &WideFloat) {
        if rhs.is_zero() {
            return;
        }
        if self.is_zero() {
            *self = *rhs;
            return;
        }
        let diff = self.exp - rhs.exp;
        if diff >= 0 {
            if diff <= 1070 {
                self.frac += rhs.frac * 2f64.powi(-diff as i32);
                self.renormalize();
            }
        } else if -diff <= 1070 {
            self.frac = self.frac * 2f64.powi(diff as i32) + rhs.frac;
            self.exp = rhs.exp;
            self.renormalize();
        } else {
            *self = *rhs;
        }
    }

    /// Natural log of the magnitude. `-inf` for zero.
    pub fn ln_abs(&self) -> f64 {
        if self.is_zero() {
            f64::NEG_INFINITY
        } else {
            self.frac.abs().ln() + self.exp as f64 * std::f64::consts::LN_2
        }
    }

    /// Sign of the value: `-1.0`, `0.0`, or `1.0`.
    pub fn signum(&self) -> f64 {
        if self.is_zero() {
            0.0
        } else {
            self.frac.signum()
        }
    }
}

/// Incrementally maintained divided differences of the exponential over a
/// stack of real inputs.
///
/// `push` appends an input, `pop`/`truncate` remove from the top exactly (no
/// rounding drift on rollback), and [`DivDiff::ln_value`] returns
/// `ln exp[u_0, .., u_n]` over the current stack. Divided differences of
/// `e^x` over real inputs are strictly positive, so the logarithm is always
/// defined.
#[derive(Clone, Debug)]
pub struct DivDiff {
    inputs: Vec<f64>,
    /// Shifted and scaled inputs `(u - center) / scale`.
    ys: Vec<f64>,
    center: f64,
    scale: i64,
    /// `rows[k][i]` holds `(B^(k+1))_{0,i}` where `B_{ij} = exp[y_i..y_j]`.
    rows: Vec<Vec<WideFloat>>,
    /// `inv_fact[l] = 1/l!`, grown on demand.
    inv_fact: Vec<WideFloat>,
}

impl Default for DivDiff {
    fn default() -> Self {
        Self::new()
    }
}

impl DivDiff {
    /// An empty stack.
    pub fn new() -> Self {
        Self {
            inputs: Vec::new(),
            ys: Vec::new(),
            center: 0.0,
            scale: 1,
            rows: vec![Vec::new()],
            inv_fact: vec![WideFloat::one()],
        }
    }

    /// Number of inputs on the stack.
    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    /// True when no inputs are on the stack.
    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    /// The inputs on the stack, bottom to top.
    pub fn inputs(&self) -> &[f64] {
        &self.inputs
    }

    /// Append an input, rebuilding the scaling first if it falls outside
    /// the window around the current center.
    pub fn push(&mut self, u: f64) {
        if self.inputs.is_empty() {
            self.center = u;
            self.scale = 1;
            self.rows = vec![Vec::new()];
        } else if ((u - self.center) / self.scale as f64).abs() > WINDOW {
            let mut lo = u;
            let mut hi = u;
            for &v in self.inputs.iter() {
                lo = lo.min(v);
                hi = hi.max(v);
            }
            // Retarget well inside the window so small drifts do not
            // trigger a rebuild on every push.
            let scale = ((hi - lo) / 3.0).ceil().max(1.0) as i64;
            self.rebuild(0.5 * (lo + hi), scale);
        }
        self.push_unchecked(u);
    }

    /// Remove the top input.
    pub fn pop(&mut self) {
        self.inputs.pop();
        self.ys.pop();
        for row in self.rows.iter_mut() {
            row.pop();
        }
    }

    /// Keep only the bottom `len` inputs.
    pub fn truncate(&mut self, len: usize) {
        self.inputs.truncate(len);
        self.ys.truncate(len);
        for row in self.rows.iter_mut() {
            row.truncate(len);
        }
    }

    /// `ln exp[u_0, .., u_n]` over the whole stack. Requires at least one
    /// input.
    pub fn ln_value(&self) -> f64 {
        let order = self.inputs.len() - 1;
        let top = &self.rows[self.rows.len() - 1][order];
        self.center - order as f64 * (self.scale as f64).ln() + top.ln_abs()
    }

    fn rebuild(&mut self, center: f64, scale: i64) {
        self.center = center;
        self.scale = scale;
        self.ys.clear();
        self.rows = vec![Vec::new(); scale as usize];
        let old = std::mem::take(&mut self.inputs);
        for &u in old.iter() {
            self.push_unchecked(u);
        }
    }

    fn push_unchecked(&mut self, u: f64) {
        let n1 = self.inputs.len();
        let y_new = (u - self.center) / self.scale as f64;
        while self.inv_fact.len() <= n1 {
            let l = self.inv_fact.len();
            let mut w = self.inv_fact[l - 1];
            w.mul_f64(1.0 / l as f64);
            self.inv_fact.push(w);
        }
        // New column c[i] = exp[y_i .. y_new], built from the top down by
        // prepending one input at a time to the complete homogeneous
        // symmetric polynomials H_j, using H'_j = H_j + y * H'_{j-1}.
        let mut column = vec![WideFloat::zero(); n1 + 1];
        let mut harr = [0.0f64; SERIES_TERMS + 1];
        let mut pw = 1.0;
        for h in harr.iter_mut() {
            *h = pw;
            pw *= y_new;
        }
        column[n1] = Self::column_entry(&harr, 0, &self.inv_fact);
        for i in (0..n1).rev() {
            let y = self.ys[i];
            for j in 1..=SERIES_TERMS {
                harr[j] += y * harr[j - 1];
            }
            column[i] = Self::column_entry(&harr, n1 - i, &self.inv_fact);
        }
        // Extend each matrix power, lowest first: row k reads the entry row
        // k-1 gained this push.
        self.rows[0].push(column[0]);
        for k in 1..self.rows.len() {
            let mut acc = WideFloat::zero();
            for (b, c) in self.rows[k - 1].iter().zip(column.iter()) {
                let mut term = *b;
                term.mul_assign(c);
                acc.add_assign(&term);
            }
            self.rows[k].push(acc);
        }
        self.ys.push(y_new);
        self.inputs.push(u);
    }

    /// `exp[y_i..y_j] = (1/l!) sum_j H_j * prod_{m=1..j} 1/(l+m)` with
    /// `l = j - i` the difference order.
    fn column_entry(harr: &[f64], l: usize, inv_fact: &[WideFloat]) -> WideFloat {
        let mut sum = 0.0;
        let mut shift = 1.0;
        for (j, h) in harr.iter().enumerate() {
            if j > 0 {
                shift /= (l + j) as f64;
            }
            sum += h * shift;
        }
        let mut w = inv_fact[l];
        w.mul_f64(sum);
        w
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Classical recursive table on raw exponentials. Only trustworthy for
    /// short, well-separated, moderate inputs.
    fn naive_ln_dd(xs: &[f64]) -> f64 {
        let mut table: Vec<f64> = xs.iter().map(|&x| x.exp()).collect();
        for order in 1..xs.len() {
            for i in 0..xs.len() - order {
                table[i] = (table[i] - table[i + 1]) / (xs[i] - xs[i + order]);
            }
        }
        table[0].ln()
    }

    fn ln_factorial(n: usize) -> f64 {
        (1..=n).map(|k| (k as f64).ln()).sum()
    }

    #[test]
    fn equal_inputs_give_exp_over_factorial() {
        let mu = -1.75;
        let mut dd = DivDiff::new();
        for n in 0..12 {
            dd.push(mu);
            let expect = mu - ln_factorial(n);
            assert!((dd.ln_value() - expect).abs() < 1e-12 * (1.0 + expect.abs()));
        }
    }

    #[test]
    fn two_point_formula() {
        let (a, b) = (0.3, -1.2);
        let mut dd = DivDiff::new();
        dd.push(a);
        dd.push(b);
        let expect = ((a.exp() - b.exp()) / (a - b)).ln();
        assert!((dd.ln_value() - expect).abs() < 1e-13);
    }

    #[test]
    fn repeated_knot() {
        let (a, b) = (0.5, -0.9);
        let mut dd = DivDiff::new();
        dd.push(a);
        dd.push(a);
        dd.push(b);
        let expect = ((a.exp() * (a - b - 1.0) + b.exp()) / ((a - b) * (a - b))).ln();
        assert!((dd.ln_value() - expect).abs() < 1e-12);
    }

    #[test]
    fn matches_naive_on_separated_inputs() {
        let xs = [0.0, 2.0, 5.0, 9.0, 14.0];
        let mut dd = DivDiff::new();
        for (n, &x) in xs.iter().enumerate() {
            dd.push(x);
            let expect = naive_ln_dd(&xs[..=n]);
            assert!(
                (dd.ln_value() - expect).abs() < 1e-9,
                "n={}: {} vs {}",
                n,
                dd.ln_value(),
                expect
            );
        }
    }

    #[test]
    fn pop_restores_exactly() {
        let mut dd = DivDiff::new();
        for &x in &[0.1, -0.4, 0.9, -1.3, 0.2] {
            dd.push(x);
        }
        let before = dd.ln_value();
        dd.push(1.1);
        dd.push(-0.7);
        dd.pop();
        dd.pop();
        assert_eq!(dd.ln_value().to_bits(), before.to_bits());
        assert_eq!(dd.len(), 5);
    }

    #[test]
    fn truncate_then_replay_matches_fresh() {
        let xs = [0.0, 0.5, -0.5, 1.0, -1.0, 0.25];
        let mut dd = DivDiff::new();
        for &x in &xs {
            dd.push(x);
        }
        dd.truncate(3);
        for &x in &xs[3..] {
            dd.push(x);
        }
        let mut fresh = DivDiff::new();
        for &x in &xs {
            fresh.push(x);
        }
        assert_eq!(dd.ln_value().to_bits(), fresh.ln_value().to_bits());
    }

    #[test]
    fn permutation_invariance() {
        let xs = [0.7, -2.1, 1.4, 0.0, -0.6, 2.8];
        let mut a = DivDiff::new();
        for &x in &xs {
            a.push(x);
        }
        let mut rev = DivDiff::new();
        for &x in xs.iter().rev() {
            rev.push(x);
        }
        assert!((a.ln_value() - rev.ln_value()).abs() < 1e-10);
    }

    #[test]
    fn wide_spread_forces_scaling() {
        // Spread 50 forces an integer scale well above 1.
        let xs = [0.0, 50.0];
        let mut dd = DivDiff::new();
        for &x in &xs {
            dd.push(x);
        }
        let expect = ((50f64.exp() - 1.0) / 50.0).ln();
        assert!((dd.ln_value() - expect).abs() < 1e-10 * expect.abs());

        let xs = [0.0, 13.0, 26.0, 41.0, 55.0];
        let mut dd = DivDiff::new();
        for &x in &xs {
            dd.push(x);
        }
        let expect = naive_ln_dd(&xs);
        assert!((dd.ln_value() - expect).abs() < 1e-8 * (1.0 + expect.abs()));
    }

    #[test]
    fn long_stack_stays_finite() {
        // The matrix-power entries overflow f64 here; the extended exponent
        // must carry them. Against the closed form for equal inputs.
        let mu = 2.0;
        let mut dd = DivDiff::new();
        for _ in 0..400 {
            dd.push(mu);
        }
        let expect = mu - ln_factorial(399);
        assert!(dd.ln_value().is_finite());
        assert!((dd.ln_value() - expect).abs() < 1e-8 * expect.abs());
    }

    #[test]
    fn widefloat_roundtrip_and_ops() {
        let w = WideFloat::from_f64(-3.5e-120);
        assert!((w.ln_abs() - (3.5e-120f64).ln()).abs() < 1e-12);
        assert!(w.signum() < 0.0);

        let mut a = WideFloat::from_f64(1.5);
        a.mul_assign(&WideFloat::from_f64(2.0));
        assert!((a.ln_abs() - 3f64.ln()).abs() < 1e-15);

        let mut b = WideFloat::from_f64(1.0);
        b.add_assign(&WideFloat::from_f64(1e-300));
        b.add_assign(&WideFloat::from_f64(-1.0));
        // The tiny addend is far below the alignment range and is dropped.
        assert!(b.is_zero() || b.ln_abs() < -600.0);
    }
}
