use sgde::prelude::*;
use sgde::SgdeError;

// Two-dimensional Gaussian density
//
// TEST GOAL
//
// This test verifies that a normalized fit integrates to one and peaks near the mean
//
// CONFIGURATION AND PARAMETERS
//
// Regular sparse grid with level 3 and linear basis (17 points)
// Cholesky decomposition with λ = 1e-4
// 1000 samples with mean (0.5, 0.5) and standard deviation (0.1, 0.1)

#[test]
fn test_gaussian_2d_fit() -> Result<(), SgdeError> {
    // samples
    let dataset = Samples::gaussian(1000, &[0.5, 0.5], &[0.1, 0.1], 42)?;

    // configuration
    let mut config = FitterConfig::new(2);
    config
        .set_level(3)?
        .set_lambda(1e-4)?
        .set_decomposition(DecompositionType::Cholesky)?;

    // fit
    let mut model = ModelFittingDensityEstimation::new(config)?;
    model.fit(&dataset)?;
    let grid = model.grid().ok_or(SgdeError::State("grid is missing"))?;
    assert_eq!(grid.size(), 17);

    // integral over the unit square
    let operator = HierarchicalOperator::new();
    let alpha = model.coefficients().as_slice();
    let integral: f64 = (0..grid.size()).map(|i| alpha[i] * operator.integral(grid, i)).sum();
    assert!(f64::abs(integral - 1.0) < 1e-6);

    // shape
    let center = model.evaluate(&[0.5, 0.5])?;
    assert!(center > model.evaluate(&[0.25, 0.5])?);
    assert!(center > model.evaluate(&[0.5, 0.75])?);
    assert!(center > model.evaluate(&[0.125, 0.875])?);
    Ok(())
}
