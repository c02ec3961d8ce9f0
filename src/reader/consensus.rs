use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, info, warn};

use crate::config::ReaderConfig;
use crate::error::ExtractionFailure;
use crate::source::Sampler;
use crate::types::{Confidence, Extraction, Reading};

/// Samples a noisy source until enough readings corroborate each other.
///
/// The dashboard renders a placeholder (often `0`) before the real balance
/// arrives, so a single read is never trusted. Every sample is preceded by a
/// settle delay. Low readings need repeated identical confirmation, normal
/// readings need to agree with the previous reading. When the attempt budget
/// runs out a deterministic fallback picks a value, flagged as unconfirmed.
pub struct ConsensusReader {
    cfg: ReaderConfig,
}

/// What the reader does after looking at the newest reading.
#[derive(Debug, PartialEq, Eq)]
enum Verdict {
    Accept,
    KeepSampling,
}

impl ConsensusReader {
    pub fn new(cfg: ReaderConfig) -> Self {
        Self { cfg }
    }

    pub async fn extract<S>(&self, sampler: &S) -> Result<Extraction, ExtractionFailure>
    where
        S: Sampler + ?Sized,
    {
        let mut readings: Vec<Reading> = Vec::new();

        for attempt in 1..=self.cfg.max_attempts {
            debug!("Credit validation attempt {attempt}/{}", self.cfg.max_attempts);
            tokio::time::sleep(self.cfg.settle_delay).await;

            let raw = match sampler.sample().await {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(attempt, "sample failed: {e}");
                    continue;
                }
            };

            let Some(value) = parse_credits(&raw) else {
                debug!(attempt, raw = %raw, "no numeric value in sample");
                continue;
            };
            debug!(attempt, value, raw = %raw, "parsed credit value");

            readings.push(Reading {
                attempt,
                value,
                raw_text: raw,
            });

            if self.evaluate(attempt, &readings) == Verdict::Accept {
                info!(credits = value, attempt, "credit reading validated");
                return Ok(Extraction {
                    credits: value,
                    confidence: Confidence::Validated,
                    attempts_used: attempt,
                });
            }
        }

        fallback(&readings, self.cfg.max_attempts)
    }

    fn evaluate(&self, attempt: u32, readings: &[Reading]) -> Verdict {
        let Some(newest) = readings.last() else {
            return Verdict::KeepSampling;
        };
        let threshold = self.cfg.suspicious_threshold;

        if newest.value <= threshold {
            // A zero is what an unloaded page shows; it never earns consensus.
            if newest.value == 0 || attempt < 3 {
                return Verdict::KeepSampling;
            }

            let recent: Vec<u64> = readings[readings.len().saturating_sub(3)..]
                .iter()
                .map(|r| r.value)
                .filter(|v| *v <= threshold)
                .collect();

            if recent.len() >= 2 {
                if recent.iter().all(|v| *v == recent[0]) {
                    return Verdict::Accept;
                }
                debug!(values = ?recent, "inconsistent suspicious readings");
                return Verdict::KeepSampling;
            }
        }

        if attempt >= 2 && readings.len() >= 2 {
            let prev = readings[readings.len() - 2].value;
            if self.readings_agree(prev, newest.value) {
                return Verdict::Accept;
            }
            debug!(prev, current = newest.value, "inconsistent readings");
        }

        Verdict::KeepSampling
    }

    /// Two readings agree when they are within an absolute or relative
    /// tolerance of the larger one.
    fn readings_agree(&self, a: u64, b: u64) -> bool {
        let difference = a.abs_diff(b);
        if difference <= self.cfg.agreement_absolute {
            return true;
        }
        let larger = a.max(b) as f64;
        difference as f64 / larger * 100.0 <= self.cfg.agreement_percent
    }
}

/// Picks a value once the attempt budget is spent without consensus.
fn fallback(readings: &[Reading], attempts: u32) -> Result<Extraction, ExtractionFailure> {
    if readings.is_empty() {
        warn!("no credit value could be parsed from any sample");
        return Err(ExtractionFailure::NoNumericValue { attempts });
    }

    let unconfirmed = |credits: u64| Extraction {
        credits,
        confidence: Confidence::Unconfirmed,
        attempts_used: attempts,
    };

    if let Some(best) = readings.iter().rev().find(|r| r.value > 0) {
        warn!(
            credits = best.value,
            from_attempt = best.attempt,
            raw = %best.raw_text,
            "no consensus, using most recent non-zero reading"
        );
        return Ok(unconfirmed(best.value));
    }

    if readings.iter().all(|r| r.value == 0) {
        warn!(readings = readings.len(), "every reading was 0, suspected false reading");
        return Err(ExtractionFailure::AllZero {
            readings: readings.len(),
        });
    }

    let value = most_frequent(readings);
    warn!(credits = value, "no consensus, using most frequent reading");
    Ok(unconfirmed(value))
}

/// Most common value; ties go to the smallest value.
fn most_frequent(readings: &[Reading]) -> u64 {
    let mut counts: BTreeMap<u64, usize> = BTreeMap::new();
    for r in readings {
        *counts.entry(r.value).or_default() += 1;
    }

    let mut best: Option<(u64, usize)> = None;
    for (value, count) in counts {
        match best {
            Some((_, best_count)) if best_count >= count => {}
            _ => best = Some((value, count)),
        }
    }
    best.map(|(v, _)| v).unwrap_or(0)
}

fn credit_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        // Comma-grouped thousands first, otherwise a plain run of digits.
        Regex::new(r"\d{1,3}(?:,\d{3})+|\d+").expect("credit pattern is valid")
    })
}

/// Extracts the first number in `raw`, accepting thousands separators.
pub fn parse_credits(raw: &str) -> Option<u64> {
    let m = credit_pattern().find(raw)?;
    m.as_str().replace(',', "").parse().ok()
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::error::SampleError;

    /// Replays a fixed script of samples; `None` simulates a sampler error.
    struct ScriptedSampler {
        script: Mutex<VecDeque<Option<&'static str>>>,
        calls: AtomicU32,
    }

    impl ScriptedSampler {
        fn new(script: &[Option<&'static str>]) -> Self {
            Self {
                script: Mutex::new(script.iter().copied().collect()),
                calls: AtomicU32::new(0),
            }
        }

        fn values(values: &[&'static str]) -> Self {
            let script: Vec<_> = values.iter().map(|v| Some(*v)).collect();
            Self::new(&script)
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Sampler for ScriptedSampler {
        async fn sample(&self) -> Result<String, SampleError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.script.lock().unwrap().pop_front() {
                Some(Some(text)) => Ok(text.to_string()),
                Some(None) => Err(SampleError::Command("element not found".to_string())),
                None => Ok("Loading...".to_string()),
            }
        }
    }

    fn reader() -> ConsensusReader {
        ConsensusReader::new(ReaderConfig {
            max_attempts: 5,
            settle_delay: Duration::ZERO,
            suspicious_threshold: 10,
            ..ReaderConfig::default()
        })
    }

    #[test]
    fn parses_thousands_separators() {
        assert_eq!(parse_credits("2,500"), Some(2500));
        assert_eq!(parse_credits("Credits left: 1,234,567"), Some(1_234_567));
        assert_eq!(parse_credits("12345 credits"), Some(12345));
        assert_eq!(parse_credits("0"), Some(0));
        assert_eq!(parse_credits("Loading..."), None);
        assert_eq!(parse_credits(""), None);
    }

    #[test]
    fn agreement_uses_absolute_or_relative_tolerance() {
        let r = reader();
        assert!(r.readings_agree(1000, 1100));
        assert!(!r.readings_agree(1000, 1101));
        assert!(r.readings_agree(10_000, 10_500));
        assert!(!r.readings_agree(10_000, 10_600));
        assert!(r.readings_agree(0, 0));
    }

    #[test]
    fn most_frequent_breaks_ties_with_smallest_value() {
        let readings: Vec<Reading> = [7u64, 3, 7, 3, 9]
            .iter()
            .enumerate()
            .map(|(i, v)| Reading {
                attempt: i as u32 + 1,
                value: *v,
                raw_text: v.to_string(),
            })
            .collect();
        assert_eq!(most_frequent(&readings), 3);
    }

    #[tokio::test]
    async fn two_identical_readings_validate_within_two_samples() {
        let sampler = ScriptedSampler::values(&["4,210", "4,210", "9,999"]);
        let got = reader().extract(&sampler).await.unwrap();

        assert_eq!(got.credits, 4210);
        assert_eq!(got.confidence, Confidence::Validated);
        assert_eq!(got.attempts_used, 2);
        assert_eq!(sampler.calls(), 2);
    }

    #[tokio::test]
    async fn close_readings_validate_newest_value() {
        let sampler = ScriptedSampler::values(&["5000", "5040"]);
        let got = reader().extract(&sampler).await.unwrap();
        assert_eq!(got.credits, 5040);
        assert_eq!(got.confidence, Confidence::Validated);
    }

    #[tokio::test]
    async fn suspicious_readings_need_three_attempts_and_agreement() {
        let sampler = ScriptedSampler::values(&["7", "7", "7"]);
        let got = reader().extract(&sampler).await.unwrap();

        assert_eq!(got.credits, 7);
        assert_eq!(got.confidence, Confidence::Validated);
        assert_eq!(sampler.calls(), 3);
    }

    #[tokio::test]
    async fn suspicious_confirmation_counts_last_three_readings() {
        // 5000 is outside the suspicious band; the two 4s still confirm.
        let sampler = ScriptedSampler::values(&["5000", "4", "4"]);
        let got = reader().extract(&sampler).await.unwrap();
        assert_eq!(got.credits, 4);
        assert_eq!(got.attempts_used, 3);
    }

    #[tokio::test]
    async fn disagreeing_suspicious_readings_keep_sampling() {
        let sampler = ScriptedSampler::values(&["3", "8", "5", "5", "5"]);
        let got = reader().extract(&sampler).await.unwrap();

        // 3,8,5 disagree; 8,5,5 still disagree; 5,5,5 confirms on attempt 5.
        assert_eq!(got.credits, 5);
        assert_eq!(got.attempts_used, 5);
        assert_eq!(sampler.calls(), 5);
    }

    #[tokio::test]
    async fn all_zero_readings_fail_instead_of_returning_zero() {
        let sampler = ScriptedSampler::values(&["0", "0", "0", "0", "0"]);
        let err = reader().extract(&sampler).await.unwrap_err();

        assert_eq!(err, ExtractionFailure::AllZero { readings: 5 });
        assert!(err.is_soft());
        assert_eq!(sampler.calls(), 5);
    }

    #[tokio::test]
    async fn zero_mixed_with_garbage_is_still_all_zero() {
        let sampler = ScriptedSampler::new(&[Some("0"), Some("--"), None, Some("0"), Some("Loading")]);
        let err = reader().extract(&sampler).await.unwrap_err();
        assert_eq!(err, ExtractionFailure::AllZero { readings: 2 });
    }

    #[tokio::test]
    async fn no_consensus_falls_back_to_latest_non_zero() {
        let sampler = ScriptedSampler::values(&["150", "garbage", "1550", "0", "Loading"]);
        let got = reader().extract(&sampler).await.unwrap();

        assert_eq!(got.credits, 1550);
        assert_eq!(got.confidence, Confidence::Unconfirmed);
        assert_eq!(got.attempts_used, 5);
    }

    #[tokio::test]
    async fn nothing_parsable_is_a_hard_failure() {
        let sampler = ScriptedSampler::new(&[None, Some("Loading"), None, Some("--"), None]);
        let err = reader().extract(&sampler).await.unwrap_err();

        assert_eq!(err, ExtractionFailure::NoNumericValue { attempts: 5 });
        assert!(!err.is_soft());
    }

    #[tokio::test]
    async fn sampler_errors_consume_attempts_but_do_not_abort() {
        let sampler = ScriptedSampler::new(&[None, Some("2,000"), None, Some("2,010")]);
        let got = reader().extract(&sampler).await.unwrap();

        // Readings 2,000 and 2,010 are consecutive readings, so they agree.
        assert_eq!(got.credits, 2010);
        assert_eq!(got.attempts_used, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_settle_delay_before_every_sample() {
        let reader = ConsensusReader::new(ReaderConfig {
            max_attempts: 5,
            settle_delay: Duration::from_secs(2),
            suspicious_threshold: 10,
            ..ReaderConfig::default()
        });
        let sampler = ScriptedSampler::values(&["900", "900"]);

        let started = tokio::time::Instant::now();
        reader.extract(&sampler).await.unwrap();
        assert_eq!(started.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test]
    async fn lone_suspicious_reading_falls_back_to_tolerance_check() {
        // Only 8 is at or below the threshold among the last three readings,
        // so it is compared with 50 under the normal tolerance and accepted.
        let sampler = ScriptedSampler::values(&["500", "50", "8"]);
        let got = reader().extract(&sampler).await.unwrap();

        assert_eq!(got.credits, 8);
        assert_eq!(got.confidence, Confidence::Validated);
        assert_eq!(got.attempts_used, 3);
    }

    #[tokio::test]
    async fn suspicious_reading_before_third_attempt_is_not_accepted() {
        // 500 and 8 agree within 100 credits, but a low reading needs three attempts.
        let sampler = ScriptedSampler::values(&["500", "8", "garbage", "Loading", "--"]);
        let got = reader().extract(&sampler).await.unwrap();

        assert_eq!(got.confidence, Confidence::Unconfirmed);
        assert_eq!(got.credits, 8);
        assert_eq!(got.attempts_used, 5);
        assert_eq!(sampler.calls(), 5);
    }

    #[tokio::test]
    async fn agreement_tolerance_comes_from_config() {
        let strict = ConsensusReader::new(ReaderConfig {
            settle_delay: Duration::ZERO,
            agreement_absolute: 10,
            agreement_percent: 0.5,
            ..ReaderConfig::default()
        });
        let sampler = ScriptedSampler::values(&["5000", "5050", "5060"]);
        let got = strict.extract(&sampler).await.unwrap();

        assert_eq!(got.credits, 5060);
        assert_eq!(got.attempts_used, 3);
    }
}
