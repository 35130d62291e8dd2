use kh_core::domain::AttackMode;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyspaceError {
    #[error("invalid attack: {0}")]
    InvalidAttack(String),
    #[error("keyspace too large (overflowed 2^63)")]
    KeyspaceTooLarge,
}

pub type KeyspaceResult<T> = Result<T, KeyspaceError>;

/// The inputs the calculator needs to size one attack (§4.1). Held
/// separately from `PresetJob` so this crate never needs to know about the
/// store.
#[derive(Debug, Clone)]
pub struct AttackSpec {
    pub attack_mode: AttackMode,
    /// Line counts of the wordlist(s) involved. Mode 0/6/7 use exactly one
    /// entry; mode 1 (combination) uses exactly two (left, right).
    pub wordlist_line_counts: Vec<i64>,
    /// Rule counts per rule file; concatenated rule files sum (§4.1).
    pub rule_counts: Vec<i64>,
    /// Per-position charset size for brute-force/mask attacks. `None` when
    /// the mask's real expansion is unknown ahead of time (hashcat-computed
    /// masks) — the result is then marked provisional (§4.1, §8 boundary
    /// case on mask self-correction).
    pub mask_charset_sizes: Option<Vec<i64>>,
}

/// The computed keyspace for one attack: base, multiplication factor, and
/// the resulting effective keyspace (§3 `JobExecution` fields).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Keyspace {
    pub base_keyspace: i64,
    pub multiplication_factor: i64,
    pub effective_keyspace: i64,
    /// True when the effective keyspace is an estimate to be corrected by
    /// the Progress Aggregator's cascade rule (§4.6) once an agent reports
    /// the actual hashcat-expanded count.
    pub is_provisional: bool,
}

fn checked_product(values: &[i64]) -> KeyspaceResult<i64> {
    let mut acc: i64 = 1;
    for &v in values {
        acc = acc
            .checked_mul(v)
            .ok_or(KeyspaceError::KeyspaceTooLarge)?;
    }
    Ok(acc)
}

fn checked_sum(values: &[i64]) -> KeyspaceResult<i64> {
    let mut acc: i64 = 0;
    for &v in values {
        acc = acc.checked_add(v).ok_or(KeyspaceError::KeyspaceTooLarge)?;
    }
    Ok(acc)
}

pub struct KeyspaceCalculator;

impl KeyspaceCalculator {
    /// Computes base/effective keyspace for one attack (§4.1 "Computation").
    pub fn compute(spec: &AttackSpec) -> KeyspaceResult<Keyspace> {
        match spec.attack_mode {
            AttackMode::Straight => {
                if spec.wordlist_line_counts.is_empty() {
                    return Err(KeyspaceError::InvalidAttack(
                        "straight attack requires at least one wordlist".into(),
                    ));
                }
                let base = checked_sum(&spec.wordlist_line_counts)?;
                let factor = if spec.rule_counts.is_empty() {
                    1
                } else {
                    checked_sum(&spec.rule_counts)?.max(1)
                };
                let effective = base
                    .checked_mul(factor)
                    .ok_or(KeyspaceError::KeyspaceTooLarge)?;
                Ok(Keyspace {
                    base_keyspace: base,
                    multiplication_factor: factor,
                    effective_keyspace: effective,
                    is_provisional: false,
                })
            }
            AttackMode::Combination => {
                if spec.wordlist_line_counts.len() != 2 {
                    return Err(KeyspaceError::InvalidAttack(
                        "combination attack requires exactly two wordlists".into(),
                    ));
                }
                let base = checked_product(&spec.wordlist_line_counts)?;
                Ok(Keyspace {
                    base_keyspace: base,
                    multiplication_factor: 1,
                    effective_keyspace: base,
                    is_provisional: false,
                })
            }
            AttackMode::BruteForce => match &spec.mask_charset_sizes {
                Some(sizes) if !sizes.is_empty() => {
                    let base = checked_product(sizes)?;
                    Ok(Keyspace {
                        base_keyspace: base,
                        multiplication_factor: 1,
                        effective_keyspace: base,
                        is_provisional: false,
                    })
                }
                _ => Ok(Keyspace {
                    base_keyspace: 0,
                    multiplication_factor: 1,
                    effective_keyspace: 0,
                    is_provisional: true,
                }),
            },
            AttackMode::HybridWordlistMask | AttackMode::HybridMaskWordlist => {
                if spec.wordlist_line_counts.len() != 1 {
                    return Err(KeyspaceError::InvalidAttack(
                        "hybrid attack requires exactly one wordlist".into(),
                    ));
                }
                match &spec.mask_charset_sizes {
                    Some(sizes) if !sizes.is_empty() => {
                        let mask_space = checked_product(sizes)?;
                        let base = spec.wordlist_line_counts[0]
                            .checked_mul(mask_space)
                            .ok_or(KeyspaceError::KeyspaceTooLarge)?;
                        Ok(Keyspace {
                            base_keyspace: base,
                            multiplication_factor: 1,
                            effective_keyspace: base,
                            is_provisional: false,
                        })
                    }
                    _ => Ok(Keyspace {
                        base_keyspace: 0,
                        multiplication_factor: 1,
                        effective_keyspace: 0,
                        is_provisional: true,
                    }),
                }
            }
        }
    }

    /// Whether rule-splitting should be chosen for this attack (§4.1
    /// "Rule-splitting decision"): mode 0, rules present, R > 1, and the
    /// whole base keyspace under one rule would finish faster than the
    /// chunk target at `agent_speed`.
    pub fn should_rule_split(
        attack_mode: AttackMode,
        base_keyspace: i64,
        rule_count: i64,
        chunk_duration_target_seconds: f64,
        agent_speed_hashes_per_second: f64,
    ) -> bool {
        if attack_mode != AttackMode::Straight || rule_count <= 1 || agent_speed_hashes_per_second <= 0.0
        {
            return false;
        }
        let seconds_for_base = base_keyspace as f64 / agent_speed_hashes_per_second;
        seconds_for_base < chunk_duration_target_seconds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn straight_without_rules_has_factor_one() {
        let spec = AttackSpec {
            attack_mode: AttackMode::Straight,
            wordlist_line_counts: vec![8],
            rule_counts: vec![],
            mask_charset_sizes: None,
        };
        let result = KeyspaceCalculator::compute(&spec).unwrap();
        assert_eq!(result.base_keyspace, 8);
        assert_eq!(result.multiplication_factor, 1);
        assert_eq!(result.effective_keyspace, 8);
    }

    #[test]
    fn straight_with_rules_multiplies_by_summed_rule_counts() {
        let spec = AttackSpec {
            attack_mode: AttackMode::Straight,
            wordlist_line_counts: vec![100],
            rule_counts: vec![6, 4],
            mask_charset_sizes: None,
        };
        let result = KeyspaceCalculator::compute(&spec).unwrap();
        assert_eq!(result.base_keyspace, 100);
        assert_eq!(result.multiplication_factor, 10);
        assert_eq!(result.effective_keyspace, 1000);
    }

    #[test]
    fn combination_multiplies_wordlist_lengths() {
        let spec = AttackSpec {
            attack_mode: AttackMode::Combination,
            wordlist_line_counts: vec![5, 7],
            rule_counts: vec![],
            mask_charset_sizes: None,
        };
        let result = KeyspaceCalculator::compute(&spec).unwrap();
        assert_eq!(result.base_keyspace, 35);
        assert_eq!(result.effective_keyspace, 35);
    }

    #[test]
    fn brute_force_with_unknown_mask_is_provisional() {
        let spec = AttackSpec {
            attack_mode: AttackMode::BruteForce,
            wordlist_line_counts: vec![],
            rule_counts: vec![],
            mask_charset_sizes: None,
        };
        let result = KeyspaceCalculator::compute(&spec).unwrap();
        assert!(result.is_provisional);
        assert_eq!(result.effective_keyspace, 0);
    }

    #[test]
    fn brute_force_with_known_charsets_multiplies_positions() {
        let spec = AttackSpec {
            attack_mode: AttackMode::BruteForce,
            wordlist_line_counts: vec![],
            rule_counts: vec![],
            mask_charset_sizes: Some(vec![26, 26, 10, 10]),
        };
        let result = KeyspaceCalculator::compute(&spec).unwrap();
        assert_eq!(result.base_keyspace, 26 * 26 * 10 * 10);
        assert!(!result.is_provisional);
    }

    #[test]
    fn hybrid_wordlist_mask_multiplies_wordlist_by_mask_space() {
        let spec = AttackSpec {
            attack_mode: AttackMode::HybridWordlistMask,
            wordlist_line_counts: vec![50],
            rule_counts: vec![],
            mask_charset_sizes: Some(vec![10, 10]),
        };
        let result = KeyspaceCalculator::compute(&spec).unwrap();
        assert_eq!(result.base_keyspace, 5000);
    }

    #[test]
    fn overflow_beyond_i64_max_fails() {
        let spec = AttackSpec {
            attack_mode: AttackMode::BruteForce,
            wordlist_line_counts: vec![],
            rule_counts: vec![],
            mask_charset_sizes: Some(vec![i64::MAX, 2]),
        };
        assert_eq!(
            KeyspaceCalculator::compute(&spec),
            Err(KeyspaceError::KeyspaceTooLarge)
        );
    }

    #[test]
    fn empty_wordlist_for_straight_attack_is_invalid() {
        let spec = AttackSpec {
            attack_mode: AttackMode::Straight,
            wordlist_line_counts: vec![],
            rule_counts: vec![],
            mask_charset_sizes: None,
        };
        assert!(matches!(
            KeyspaceCalculator::compute(&spec),
            Err(KeyspaceError::InvalidAttack(_))
        ));
    }

    #[test]
    fn zero_length_wordlist_job_has_zero_effective_keyspace() {
        let spec = AttackSpec {
            attack_mode: AttackMode::Straight,
            wordlist_line_counts: vec![0],
            rule_counts: vec![],
            mask_charset_sizes: None,
        };
        let result = KeyspaceCalculator::compute(&spec).unwrap();
        assert_eq!(result.effective_keyspace, 0);
    }

    // --- Rule-splitting decision (S3 scenario) ---

    #[test]
    fn s3_rule_splitting_is_chosen_when_base_traversal_is_fast() {
        // base=100, rule_count=10, agent_speed=10000 h/s, chunk_duration=10s
        // base/S = 0.01s < 10s -> rule-split chosen.
        assert!(KeyspaceCalculator::should_rule_split(
            AttackMode::Straight,
            100,
            10,
            10.0,
            10_000.0
        ));
    }

    #[test]
    fn rule_splitting_is_not_chosen_when_only_one_rule() {
        assert!(!KeyspaceCalculator::should_rule_split(
            AttackMode::Straight,
            100,
            1,
            10.0,
            10_000.0
        ));
    }

    #[test]
    fn rule_splitting_is_not_chosen_outside_straight_mode() {
        assert!(!KeyspaceCalculator::should_rule_split(
            AttackMode::Combination,
            100,
            10,
            10.0,
            10_000.0
        ));
    }

    #[test]
    fn rule_splitting_is_not_chosen_when_base_traversal_is_slow() {
        // base=1_000_000, speed=10 h/s -> 100_000s for the base, far above
        // a 10s chunk target, so keyspace-axis splitting is preferred.
        assert!(!KeyspaceCalculator::should_rule_split(
            AttackMode::Straight,
            1_000_000,
            10,
            10.0,
            10.0
        ));
    }
}
