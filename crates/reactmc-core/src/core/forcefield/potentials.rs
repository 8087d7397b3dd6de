/// Lennard-Jones 12-6 energy from the squared distance, `4ε[(σ/r)^12 - (σ/r)^6]`.
#[inline]
pub fn lennard_jones(r_sq: f64, sigma_sq: f64, epsilon4: f64) -> f64 {
    if epsilon4 == 0.0 {
        return 0.0;
    }
    if r_sq < 1e-12 {
        return f64::INFINITY;
    }
    let x6 = (sigma_sq / r_sq).powi(3);
    epsilon4 * (x6 * x6 - x6)
}

/// Plain Coulomb energy in kT for charges in e and a Bjerrum length in Å.
///
/// Overlapping charges are forbidden regardless of sign.
#[inline]
pub fn coulomb(r: f64, qq: f64, bjerrum_length: f64) -> f64 {
    if qq == 0.0 {
        return 0.0;
    }
    if r < 1e-6 {
        return f64::INFINITY;
    }
    bjerrum_length * qq / r
}

#[inline]
pub fn hard_sphere(r_sq: f64, contact_sq: f64) -> f64 {
    if r_sq < contact_sq { f64::INFINITY } else { 0.0 }
}

#[inline]
pub fn harmonic(r: f64, k: f64, req: f64) -> f64 {
    let d = r - req;
    0.5 * k * d * d
}
