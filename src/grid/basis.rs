use crate::base::BasisType;

/// Implements the one-dimensional hierarchical basis functions φ_{l,i}
///
/// The level `l ≥ 1` and the odd index `1 ≤ i ≤ 2^l - 1` define a function with
/// center at `x = i h` where `h = 2^{-l}`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Basis1d {
    kind: BasisType,
}

impl Basis1d {
    /// Allocates a new instance
    pub fn new(kind: BasisType) -> Self {
        Basis1d { kind }
    }

    /// Returns the kind of basis
    pub fn kind(&self) -> BasisType {
        self.kind
    }

    /// Evaluates φ_{l,i}(x)
    pub fn eval(&self, level: u32, index: u32, x: f64) -> f64 {
        let scaled = f64::powi(2.0, level as i32) * x;
        match self.kind {
            BasisType::Linear => f64::max(1.0 - f64::abs(scaled - index as f64), 0.0),
            BasisType::ModLinear => {
                if level == 1 {
                    1.0
                } else if index == 1 {
                    f64::max(2.0 - scaled, 0.0)
                } else if index == max_index(level) {
                    f64::max(scaled - index as f64 + 1.0, 0.0)
                } else {
                    f64::max(1.0 - f64::abs(scaled - index as f64), 0.0)
                }
            }
        }
    }

    /// Returns the support [a, b] of φ_{l,i}
    pub fn support(&self, level: u32, index: u32) -> (f64, f64) {
        let h = width(level);
        let center = index as f64 * h;
        match self.kind {
            BasisType::Linear => (center - h, center + h),
            BasisType::ModLinear => {
                if level == 1 {
                    (0.0, 1.0)
                } else if index == 1 {
                    (0.0, 2.0 * h)
                } else if index == max_index(level) {
                    (1.0 - 2.0 * h, 1.0)
                } else {
                    (center - h, center + h)
                }
            }
        }
    }

    /// Returns the integral of φ_{l,i} over [0, 1]
    pub fn integral(&self, level: u32, index: u32) -> f64 {
        let h = width(level);
        match self.kind {
            BasisType::Linear => h,
            BasisType::ModLinear => {
                if level == 1 {
                    1.0
                } else if index == 1 || index == max_index(level) {
                    2.0 * h
                } else {
                    h
                }
            }
        }
    }

    /// Returns the L2 inner product ∫ φ_{l1,i1} φ_{l2,i2} dx over [0, 1]
    ///
    /// The product of two piecewise linear functions is piecewise quadratic between the merged
    /// breakpoints; hence, Simpson's rule on each piece yields the exact value.
    pub fn l2_product(&self, level1: u32, index1: u32, level2: u32, index2: u32) -> f64 {
        let (a1, b1) = self.support(level1, index1);
        let (a2, b2) = self.support(level2, index2);
        let lo = f64::max(a1, a2);
        let hi = f64::min(b1, b2);
        if hi <= lo {
            return 0.0;
        }
        let c1 = index1 as f64 * width(level1);
        let c2 = index2 as f64 * width(level2);
        let mut breaks = vec![lo, hi];
        for p in [a1, c1, b1, a2, c2, b2] {
            if p > lo && p < hi {
                breaks.push(p);
            }
        }
        breaks.sort_by(|a, b| a.total_cmp(b));
        breaks.dedup();
        let mut sum = 0.0;
        for k in 1..breaks.len() {
            let (p, q) = (breaks[k - 1], breaks[k]);
            let m = 0.5 * (p + q);
            let fp = self.eval(level1, index1, p) * self.eval(level2, index2, p);
            let fm = self.eval(level1, index1, m) * self.eval(level2, index2, m);
            let fq = self.eval(level1, index1, q) * self.eval(level2, index2, q);
            sum += (q - p) / 6.0 * (fp + 4.0 * fm + fq);
        }
        sum
    }
}

/// Returns the mesh width h = 2^{-l}
#[inline]
pub(crate) fn width(level: u32) -> f64 {
    f64::powi(0.5, level as i32)
}

/// Returns the largest index on a level, 2^l - 1
#[inline]
pub(crate) fn max_index(level: u32) -> u32 {
    (1 << level) - 1
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::Basis1d;
    use crate::base::BasisType;
    use russell_lab::approx_eq;

    #[test]
    fn eval_linear_works() {
        let basis = Basis1d::new(BasisType::Linear);
        assert_eq!(basis.eval(1, 1, 0.5), 1.0);
        assert_eq!(basis.eval(1, 1, 0.25), 0.5);
        assert_eq!(basis.eval(1, 1, 0.0), 0.0);
        assert_eq!(basis.eval(2, 3, 0.75), 1.0);
        assert_eq!(basis.eval(2, 3, 0.25), 0.0);
        assert_eq!(basis.support(2, 1), (0.0, 0.5));
        assert_eq!(basis.integral(3, 5), 0.125);
    }

    #[test]
    fn eval_mod_linear_works() {
        let basis = Basis1d::new(BasisType::ModLinear);
        assert_eq!(basis.eval(1, 1, 0.9), 1.0);
        assert_eq!(basis.eval(2, 1, 0.0), 2.0);
        assert_eq!(basis.eval(2, 1, 0.25), 1.0);
        assert_eq!(basis.eval(2, 1, 0.5), 0.0);
        assert_eq!(basis.eval(2, 3, 1.0), 2.0);
        assert_eq!(basis.eval(3, 3, 0.375), 1.0);
        assert_eq!(basis.integral(1, 1), 1.0);
        assert_eq!(basis.integral(2, 3), 0.5);
        assert_eq!(basis.integral(3, 3), 0.125);
    }

    #[test]
    fn l2_product_works() {
        let basis = Basis1d::new(BasisType::Linear);
        // ∫ φ² = 2h/3
        approx_eq(basis.l2_product(1, 1, 1, 1), 1.0 / 3.0, 1e-15);
        approx_eq(basis.l2_product(3, 5, 3, 5), 2.0 * 0.125 / 3.0, 1e-15);
        // disjoint supports
        assert_eq!(basis.l2_product(2, 1, 2, 3), 0.0);
        // ∫ φ_{1,1} φ_{2,1} = 1/8
        approx_eq(basis.l2_product(1, 1, 2, 1), 0.125, 1e-15);
        assert_eq!(basis.l2_product(1, 1, 2, 1), basis.l2_product(2, 1, 1, 1));

        let basis = Basis1d::new(BasisType::ModLinear);
        approx_eq(basis.l2_product(1, 1, 1, 1), 1.0, 1e-15);
        // ∫ (1) φ_{2,1} = 0.5
        approx_eq(basis.l2_product(1, 1, 2, 1), 0.5, 1e-15);
        // ∫_0^{1/2} (2 - 4x)² dx = 2/3
        approx_eq(basis.l2_product(2, 1, 2, 1), 2.0 / 3.0, 1e-15);
    }
}
