//! Decibel conversion and `[0, 1]` normalization policies.

use serde::{Deserialize, Serialize};

/// Which normalization the model was trained with.
///
/// The two policies are not interchangeable: a model trained on one and fed
/// the other produces scores from the wrong input distribution, and nothing
/// detects it at run time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizationMode {
    /// Fixed affine map of decibels using the model's reference levels.
    #[default]
    ZeroOneDb,
    /// Per-window rescale by the window's own decibel range.
    MinMax,
}

impl std::fmt::Display for NormalizationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ZeroOneDb => write!(f, "0/1-dB"),
            Self::MinMax => write!(f, "min-max"),
        }
    }
}

/// Normalizer resolved once from a [`NormalizationMode`] and reference levels.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Normalizer {
    ZeroOneDb { min_level_db: f32, ref_level_db: f32 },
    MinMax,
}

impl Normalizer {
    pub(crate) fn new(mode: NormalizationMode, min_level_db: f64, ref_level_db: f64) -> Self {
        match mode {
            NormalizationMode::ZeroOneDb => Self::ZeroOneDb {
                min_level_db: min_level_db as f32,
                ref_level_db: ref_level_db as f32,
            },
            NormalizationMode::MinMax => Self::MinMax,
        }
    }

    /// Normalizes a whole decibel frame in place.
    pub(crate) fn apply(&self, db: &mut [f32]) {
        match *self {
            Self::ZeroOneDb {
                min_level_db,
                ref_level_db,
            } => {
                for v in db.iter_mut() {
                    *v = ((*v - ref_level_db - min_level_db) / -min_level_db).clamp(0.0, 1.0);
                }
            }
            Self::MinMax => {
                let (min, max) = db
                    .iter()
                    .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                        (lo.min(v), hi.max(v))
                    });
                let range = max - min;
                if !range.is_finite() || range <= f32::EPSILON {
                    db.fill(0.0);
                    return;
                }
                for v in db.iter_mut() {
                    *v = (*v - min) / range;
                }
            }
        }
    }
}

/// Converts a magnitude to decibels, flooring at `min_level_db`.
#[inline]
pub(crate) fn amp_to_db(mag: f64, min_level: f64) -> f32 {
    (20.0 * mag.max(min_level).log10()) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_one_db_mapping() {
        let n = Normalizer::new(NormalizationMode::ZeroOneDb, -100.0, 20.0);
        let mut db = vec![-80.0, -30.0, 20.0, 40.0, -200.0];
        n.apply(&mut db);
        // (db - 20 + 100) / 100
        assert!((db[0] - 0.0).abs() < 1e-6);
        assert!((db[1] - 0.5).abs() < 1e-6);
        assert!((db[2] - 1.0).abs() < 1e-6);
        assert_eq!(db[3], 1.0);
        assert_eq!(db[4], 0.0);
    }

    #[test]
    fn test_min_max_mapping() {
        let n = Normalizer::new(NormalizationMode::MinMax, -100.0, 20.0);
        let mut db = vec![-60.0, -40.0, -20.0];
        n.apply(&mut db);
        assert_eq!(db, vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn test_min_max_constant_is_zero() {
        let n = Normalizer::new(NormalizationMode::MinMax, -100.0, 20.0);
        let mut db = vec![-100.0; 32];
        n.apply(&mut db);
        assert!(db.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_amp_to_db_floor() {
        let min_level = 10f64.powf(-100.0 / 20.0);
        assert!((amp_to_db(0.0, min_level) + 100.0).abs() < 1e-4);
        assert!((amp_to_db(1.0, min_level)).abs() < 1e-6);
        assert!((amp_to_db(10.0, min_level) - 20.0).abs() < 1e-5);
    }

    #[test]
    fn test_mode_serde() {
        let m: NormalizationMode = serde_json::from_str("\"min_max\"").unwrap();
        assert_eq!(m, NormalizationMode::MinMax);
        assert_eq!(NormalizationMode::default(), NormalizationMode::ZeroOneDb);
        assert_eq!(NormalizationMode::MinMax.to_string(), "min-max");
    }
}
