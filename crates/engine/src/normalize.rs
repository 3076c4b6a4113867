use regex::Regex;

use rulevet_core::MIN_PATTERN_LEN;

/// Upper bound on strip passes. Every strip shortens the string, so a
/// fixpoint is reached long before this in practice.
const MAX_PASSES: usize = 5;

struct Strip {
    re: Regex,
    replacement: &'static str,
}

/// Derives a stable match pattern from a noisy raw payee string by
/// repeatedly stripping known trailing noise: transaction codes, store
/// numbers, location codes.
///
/// Pure and total: never fails, worst case returns the trimmed input
/// unchanged. Idempotent: `normalize(normalize(s)) == normalize(s)`.
pub struct Normalizer {
    strips: Vec<Strip>,
}

impl Normalizer {
    pub fn new() -> Self {
        // Order matters: earlier strips remove the most specific noise.
        let patterns: [(&str, &str); 6] = [
            // *-prefixed transaction/session code, e.g. "AMAZON MKTPL*0C2091XO3"
            (r"\*[A-Za-z0-9]{3,}$", ""),
            // isolated trailing dash left by truncation, e.g. "WALGREENS -"
            (r"\s+-$", ""),
            // dash-delimited location code, e.g. "COSTCO WHSE - 0423" / "- 0423 -"
            (r"\s+-\s+[A-Za-z0-9]{1,6}(\s+-)?$", ""),
            // store number, e.g. "TARGET #00123"
            (r"\s*#[A-Za-z0-9]{1,6}$", ""),
            // airport/branch code after a run of spaces, e.g. "UNITED    LAX"
            (r"\s{2,}[A-Za-z]{2,4}$", ""),
            // numeric store/location id not preceded by '#'. This also eats
            // embedded dates ("NETFLIX 20240115"); that is as designed.
            (r"([^#0-9])[0-9]{4,}$", "$1"),
        ];
        let strips = patterns
            .into_iter()
            .map(|(pattern, replacement)| Strip {
                re: Regex::new(pattern).expect("strip pattern is a valid regex"),
                replacement,
            })
            .collect();
        Normalizer { strips }
    }

    /// Returns the stable pattern shared by future occurrences of the same
    /// merchant. A strip is kept only if the result retains at least
    /// `MIN_PATTERN_LEN` characters; over-stripping short names is worse
    /// than keeping their noise.
    pub fn normalize(&self, raw: &str) -> String {
        let mut current = raw.trim().to_string();
        for _ in 0..MAX_PASSES {
            let mut changed = false;
            for strip in &self.strips {
                let replaced = strip.re.replace(&current, strip.replacement);
                let candidate = replaced.trim_end();
                if candidate != current && candidate.chars().count() >= MIN_PATTERN_LEN {
                    current = candidate.to_string();
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
        current
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(s: &str) -> String {
        Normalizer::new().normalize(s)
    }

    #[test]
    fn strips_star_transaction_code() {
        assert_eq!(norm("AMAZON MKTPL*0C2091XO3"), "AMAZON MKTPL");
    }

    #[test]
    fn strips_trailing_isolated_dash() {
        assert_eq!(norm("WALGREENS -"), "WALGREENS");
    }

    #[test]
    fn strips_dash_delimited_location_code() {
        assert_eq!(norm("COSTCO WHSE - 0423"), "COSTCO WHSE");
        assert_eq!(norm("COSTCO WHSE - 0423 -"), "COSTCO WHSE");
    }

    #[test]
    fn strips_store_number() {
        assert_eq!(norm("TARGET #00123"), "TARGET");
    }

    #[test]
    fn strips_branch_code_after_space_run() {
        assert_eq!(norm("UNITED AIRLINES   LAX"), "UNITED AIRLINES");
    }

    #[test]
    fn strips_trailing_digit_run() {
        assert_eq!(norm("STARBUCKS 075551"), "STARBUCKS");
    }

    #[test]
    fn strips_embedded_date_as_designed() {
        // An accidental match on a trailing date is accepted behavior.
        assert_eq!(norm("NETFLIX 20240115"), "NETFLIX");
    }

    #[test]
    fn guard_prevents_short_results() {
        // " #1" would leave the 3-char "GAS"; the strip is rejected.
        assert_eq!(norm("GAS #1"), "GAS #1");
        assert_eq!(norm("ABC1234"), "ABC1234");
    }

    #[test]
    fn multiple_noise_layers_strip_in_passes() {
        // Store number and digit id stacked on one string.
        assert_eq!(norm("CHEVRON 0301534  #942"), "CHEVRON");
    }

    #[test]
    fn trims_input_even_when_no_rule_fires() {
        assert_eq!(norm("  PLAIN MERCHANT  "), "PLAIN MERCHANT");
    }

    #[test]
    fn idempotent() {
        let n = Normalizer::new();
        for s in [
            "AMAZON MKTPL*0C2091XO3",
            "GAS #1",
            "COSTCO WHSE - 0423 -",
            "UNITED AIRLINES   LAX",
            "STARBUCKS 075551",
            "",
            "A",
        ] {
            let once = n.normalize(s);
            assert_eq!(n.normalize(&once), once, "not idempotent for {s:?}");
        }
    }

    #[test]
    fn length_guard_holds() {
        let n = Normalizer::new();
        for s in ["GAS #1", "AB #12345", "FOUR1234", "TARGET #00123"] {
            if s.chars().count() >= MIN_PATTERN_LEN {
                assert!(
                    n.normalize(s).chars().count() >= MIN_PATTERN_LEN,
                    "over-stripped {s:?}"
                );
            }
        }
    }
}
