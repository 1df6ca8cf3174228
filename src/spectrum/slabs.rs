//! Line-of-sight combination of slabs.

use crate::domain::Quantity;

use super::{Spectrum, same_grid};

/// Combine slabs along a line of sight, ordered from the far side to the observer.
///
/// Transmittances multiply and absorbances add. Radiance is carried through each
/// slab as `I = I_prev * T + I_slab`, so it needs both quantities on every slab.
/// Slabs on different axes are combined on the first slab's axis, cropped to the
/// range they all cover.
pub fn serial_slabs(slabs: &[Spectrum]) -> Result<Spectrum, String> {
    let first = slabs.first().ok_or_else(|| "no slabs to combine".to_string())?;
    let aligned = align(first, slabs)?;
    let axis = aligned[0].wavespace().to_vec();
    let n = axis.len();

    let all_have = |q: Quantity| aligned.iter().all(|s| s.has(q));

    let mut out = Spectrum::new(axis, first.waveunit())?.with_name(format!(
        "serial({})",
        slabs
            .iter()
            .enumerate()
            .map(|(i, s)| s.name().map(str::to_string).unwrap_or_else(|| format!("slab{i}")))
            .collect::<Vec<_>>()
            .join(">")
    ));

    if all_have(Quantity::TransmittanceNoslit) {
        let mut t = vec![1.0; n];
        for s in &aligned {
            for (acc, v) in t.iter_mut().zip(s.get(Quantity::TransmittanceNoslit).unwrap_or_default()) {
                *acc *= v;
            }
        }

        if all_have(Quantity::RadianceNoslit) {
            let mut radiance = vec![0.0; n];
            for s in &aligned {
                let slab_t = s.get(Quantity::TransmittanceNoslit).unwrap_or_default();
                let slab_i = s.get(Quantity::RadianceNoslit).unwrap_or_default();
                for ((acc, ti), ii) in radiance.iter_mut().zip(slab_t).zip(slab_i) {
                    *acc = *acc * ti + ii;
                }
            }
            let unit = first.unit(Quantity::RadianceNoslit).unwrap_or_default().to_string();
            out = out.with_quantity(Quantity::RadianceNoslit, radiance, unit)?;
        }

        let emissivity: Vec<f64> = t.iter().map(|v| 1.0 - v).collect();
        out = out
            .with_quantity(Quantity::TransmittanceNoslit, t, "")?
            .with_quantity(Quantity::EmissivityNoslit, emissivity, "")?;
    }

    if all_have(Quantity::Absorbance) {
        let mut a = vec![0.0; n];
        for s in &aligned {
            for (acc, v) in a.iter_mut().zip(s.get(Quantity::Absorbance).unwrap_or_default()) {
                *acc += v;
            }
        }
        out = out.with_quantity(Quantity::Absorbance, a, "")?;
    }

    if out.quantities().count() == 0 {
        return Err("slabs share no combinable quantity".to_string());
    }
    Ok(out)
}

fn align(first: &Spectrum, slabs: &[Spectrum]) -> Result<Vec<Spectrum>, String> {
    if slabs.iter().all(|s| {
        s.waveunit() == first.waveunit() && same_grid(s.wavespace(), first.wavespace())
    }) {
        return Ok(slabs.to_vec());
    }

    let unit = first.waveunit();
    let mut lo = f64::NEG_INFINITY;
    let mut hi = f64::INFINITY;
    for s in slabs {
        let converted = s.to_waveunit(unit);
        let (a, b) = bounds_of(converted.wavespace());
        lo = lo.max(a);
        hi = hi.min(b);
    }
    if !(hi > lo) {
        return Err("slabs have no overlapping spectral range".to_string());
    }

    let base = first.crop(lo, hi)?;
    let axis = base.wavespace().to_vec();
    slabs
        .iter()
        .map(|s| {
            s.resample(&axis, unit, None)
                .map_err(|e| format!("aligning slabs: {e}"))
        })
        .collect()
}

fn bounds_of(axis: &[f64]) -> (f64, f64) {
    let a = axis.first().copied().unwrap_or(f64::NAN);
    let b = axis.last().copied().unwrap_or(f64::NAN);
    (a.min(b), a.max(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::WaveUnit;
    use approx::assert_relative_eq;

    fn slab(name: &str, x: &[f64], t: f64, i: f64) -> Spectrum {
        Spectrum::new(x.to_vec(), WaveUnit::Cm1)
            .unwrap()
            .with_name(name)
            .with_quantity(Quantity::TransmittanceNoslit, vec![t; x.len()], "")
            .unwrap()
            .with_quantity(Quantity::RadianceNoslit, vec![i; x.len()], "W/cm2/sr/cm-1")
            .unwrap()
            .with_quantity(Quantity::Absorbance, vec![-t.ln(); x.len()], "")
            .unwrap()
    }

    #[test]
    fn transmittance_multiplies_and_radiance_attenuates() {
        let x = [1.0, 2.0, 3.0];
        let far = slab("far", &x, 0.5, 2.0);
        let near = slab("near", &x, 0.8, 1.0);
        let los = serial_slabs(&[far, near]).unwrap();

        assert_relative_eq!(los.get(Quantity::TransmittanceNoslit).unwrap()[0], 0.4);
        // far radiance 2.0 is attenuated by near (0.8) then near adds 1.0
        assert_relative_eq!(los.get(Quantity::RadianceNoslit).unwrap()[1], 2.6);
        assert_relative_eq!(los.get(Quantity::EmissivityNoslit).unwrap()[2], 0.6);
        assert_relative_eq!(
            los.get(Quantity::Absorbance).unwrap()[0],
            -(0.4f64.ln()),
            epsilon = 1e-12
        );
        assert_eq!(los.name(), Some("serial(far>near)"));
    }

    #[test]
    fn different_axes_use_intersection() {
        let a = slab("a", &[1.0, 2.0, 3.0, 4.0], 0.5, 0.0);
        let b = slab("b", &[2.0, 3.0, 4.0, 5.0], 0.5, 0.0);
        let los = serial_slabs(&[a, b]).unwrap();
        assert_eq!(los.wavespace(), &[2.0, 3.0, 4.0]);
        assert_relative_eq!(los.get(Quantity::TransmittanceNoslit).unwrap()[0], 0.25);
    }

    #[test]
    fn disjoint_or_empty_input_fails() {
        assert!(serial_slabs(&[]).is_err());
        let a = slab("a", &[1.0, 2.0], 0.5, 0.0);
        let b = slab("b", &[3.0, 4.0], 0.5, 0.0);
        assert!(serial_slabs(&[a, b]).is_err());
    }
}
