use rand::RngCore;
use rand_distr::{Distribution as _, Normal};
use serde::{Deserialize, Serialize};

/// A seedable sampler. Every variant draws from the RNG handed to it by the
/// caller (the engine's single shared RNG) rather than owning one itself, so
/// a whole run is reproducible from one seed.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "name", content = "params", rename_all = "snake_case")]
pub enum SampledDistribution {
    Mock,
    Uniform {
        lower: f64,
        upper: f64,
    },
    Normal {
        mean: f64,
        std: f64,
    },
    TruncatedNormal {
        lower: f64,
        upper: f64,
        mean: f64,
        std: f64,
    },
    TruncatedInverseNormal {
        lower: f64,
        upper: f64,
        mean: f64,
        std: f64,
    },
    #[serde(rename = "lognormal")]
    LogNormal {
        mean: f64,
        std: f64,
        #[serde(default = "default_log_base")]
        base: f64,
    },
    #[serde(rename = "truncated_lognormal")]
    TruncatedLogNormal {
        lower: f64,
        upper: f64,
        mean: f64,
        std: f64,
        #[serde(default = "default_log_base")]
        base: f64,
    },
    Triangular {
        lower: f64,
        upper: f64,
    },
    Parabolic {
        lower: f64,
        upper: f64,
    },
}

fn default_log_base() -> f64 {
    std::f64::consts::E
}

impl SampledDistribution {
    pub fn sample(&self, rng: &mut impl RngCore) -> f64 {
        match self {
            Self::Mock => sample_uniform(0.0, 1.0, rng),
            Self::Uniform { lower, upper } => sample_uniform(*lower, *upper, rng),
            Self::Normal { mean, std } => sample_normal(*mean, *std, rng),
            Self::TruncatedNormal {
                lower,
                upper,
                mean,
                std,
            } => sample_truncated_normal(*lower, *upper, *mean, *std, rng),
            Self::TruncatedInverseNormal {
                lower,
                upper,
                mean,
                std,
            } => {
                let inverse_low = if *upper != 0.0 {
                    1.0 / upper
                } else {
                    mean - std * 10.0
                };
                let inverse_up = if *lower != 0.0 {
                    1.0 / lower
                } else {
                    mean + std * 10.0
                };
                let sample = sample_truncated_normal(inverse_low, inverse_up, *mean, *std, rng);
                1.0 / sample
            }
            Self::LogNormal { mean, std, base } => base.powf(sample_normal(*mean, *std, rng)),
            Self::TruncatedLogNormal {
                lower,
                upper,
                mean,
                std,
                base,
            } => {
                let log_low = if *lower != 0.0 {
                    lower.log(*base)
                } else {
                    mean - std * 10.0
                };
                let log_up = if *upper != 0.0 {
                    upper.log(*base)
                } else {
                    mean + std * 10.0
                };
                let sample = sample_truncated_normal(log_low, log_up, *mean, *std, rng);
                base.powf(sample)
            }
            Self::Triangular { lower, upper } => sample_triangular(*lower, *upper, rng),
            Self::Parabolic { lower, upper } => sample_parabolic(*lower, *upper, rng),
        }
    }
}

fn sample_uniform(lower: f64, upper: f64, rng: &mut impl RngCore) -> f64 {
    lower + (upper - lower) * (rng.next_u64() as f64 / u64::MAX as f64)
}

fn sample_normal(mean: f64, std: f64, rng: &mut impl RngCore) -> f64 {
    let dist = Normal::new(mean, std).expect("std must be finite and non-negative");
    dist.sample(&mut RngAdapter(rng))
}

/// Rejection-sample a normal draw until it lands in `[lower, upper]`. Mirrors
/// `scipy.stats.truncnorm` for the narrow bounded ranges this simulator
/// actually uses (LTV, duration-factor, start-factor all live in `[0, 1]`-ish
/// windows where rejection sampling converges quickly).
fn sample_truncated_normal(
    lower: f64,
    upper: f64,
    mean: f64,
    std: f64,
    rng: &mut impl RngCore,
) -> f64 {
    if std == 0.0 {
        return mean.clamp(lower, upper);
    }
    for _ in 0..10_000 {
        let candidate = sample_normal(mean, std, rng);
        if candidate >= lower && candidate <= upper {
            return candidate;
        }
    }
    mean.clamp(lower, upper)
}

/// Tent distribution peaked at `upper`. When `upper < lower` the source
/// mirrors the sample over the rescaled range and flips its sign; preserved
/// here exactly.
fn sample_triangular(lower: f64, upper: f64, rng: &mut impl RngCore) -> f64 {
    let (reverse, lo, hi) = if upper < lower {
        (true, upper, lower)
    } else {
        (false, lower, upper)
    };
    let u = sample_uniform(0.0, 1.0, rng);
    // Tent peaked at the top of [lo, hi]: CDF^-1(u) = lo + (hi - lo) * sqrt(u).
    let sample = lo + (hi - lo) * u.sqrt();
    if reverse {
        lo + hi - sample
    } else {
        sample
    }
}

/// Power-law density `propto x^2` over `[lower, upper]` (exponent 3), with
/// the same mirror-and-negate convention as [`sample_triangular`] when
/// `upper < lower`.
fn sample_parabolic(lower: f64, upper: f64, rng: &mut impl RngCore) -> f64 {
    let (reverse, lo, hi) = if upper < lower {
        (true, upper, lower)
    } else {
        (false, lower, upper)
    };
    let u = sample_uniform(0.0, 1.0, rng);
    let sample = lo + (hi - lo) * u.powf(1.0 / 3.0);
    if reverse {
        lo + hi - sample
    } else {
        sample
    }
}

/// Adapts a `&mut dyn RngCore`-ish generic to what `rand_distr` expects.
struct RngAdapter<'a, R: RngCore + ?Sized>(&'a mut R);

impl<R: RngCore + ?Sized> rand::RngCore for RngAdapter<'_, R> {
    fn next_u32(&mut self) -> u32 {
        self.0.next_u32()
    }
    fn next_u64(&mut self) -> u64 {
        self.0.next_u64()
    }
    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.0.fill_bytes(dest);
    }
    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.0.try_fill_bytes(dest)
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};
    use rstest::rstest;

    use super::*;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    #[rstest]
    #[case(SampledDistribution::Uniform { lower: 0.2, upper: 0.6 })]
    #[case(SampledDistribution::Mock)]
    #[case(SampledDistribution::Triangular { lower: 0.0, upper: 1.0 })]
    #[case(SampledDistribution::Parabolic { lower: 0.0, upper: 1.0 })]
    fn samples_land_in_unit_interval(#[case] dist: SampledDistribution) {
        let mut rng = rng();
        for _ in 0..100 {
            let x = dist.sample(&mut rng);
            assert!((0.0..=1.0).contains(&x), "{x} out of [0, 1]");
        }
    }

    #[test]
    fn triangular_mirrors_when_upper_below_lower() {
        let mut rng = rng();
        let forward = SampledDistribution::Triangular {
            lower: 0.0,
            upper: 1.0,
        };
        let mirrored = SampledDistribution::Triangular {
            lower: 1.0,
            upper: 0.0,
        };
        let a = forward.sample(&mut rng.clone());
        let b = mirrored.sample(&mut rng);
        assert!((a - (1.0 - b)).abs() < 1e-9);
    }

    #[test]
    fn triangular_peaks_at_upper_bound() {
        let mut rng = rng();
        let dist = SampledDistribution::Triangular {
            lower: 0.0,
            upper: 1.0,
        };
        let mean: f64 = (0..10_000).map(|_| dist.sample(&mut rng)).sum::<f64>() / 10_000.0;
        assert!(mean > 0.5, "mean {mean} should exceed the midpoint for a tent peaked at upper");
    }

    #[test]
    fn truncated_inverse_normal_handles_zero_bound() {
        let mut rng = rng();
        let dist = SampledDistribution::TruncatedInverseNormal {
            lower: 0.0,
            upper: 2.0,
            mean: 1.0,
            std: 0.1,
        };
        let x = dist.sample(&mut rng);
        assert!(x.is_finite());
    }
}
