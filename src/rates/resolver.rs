//! Deterministic, total resolution of currency rates from a snapshot.

use crate::rates::snapshot::RateSnapshot;
use tracing::warn;

/// Where a resolved rate came from. `Fallback` marks a hardcoded estimate
/// served because no live data covered the pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateSource {
    Identity,
    Direct,
    Inverse,
    CrossBase,
    CrossSecondary,
    Fallback,
}

#[derive(Debug, Clone, Copy)]
pub struct RateQuote {
    pub rate: f64,
    pub source: RateSource,
}

impl RateQuote {
    /// True when the rate is a degraded hardcoded approximation rather
    /// than derived from live data.
    pub fn is_estimate(&self) -> bool {
        self.source == RateSource::Fallback
    }
}

/// Approximate EUR-quoted rates, used only when every live path fails.
/// Deliberately coarse; callers can tell via `RateSource::Fallback`.
const FALLBACK_EUR_RATES: &[(&str, f64)] = &[
    ("USD", 1.08),
    ("GBP", 0.85),
    ("CHF", 0.94),
    ("PLN", 4.30),
    ("JPY", 162.0),
    ("CAD", 1.48),
    ("AUD", 1.65),
    ("SEK", 11.4),
    ("NOK", 11.7),
    ("CZK", 25.2),
    ("INR", 90.0),
];

/// Approximate BTC price in EUR, same degraded last resort.
const FALLBACK_BTC_PRICE_EUR: f64 = 60_000.0;

/// Stateless rate resolution over a snapshot: identity, direct entry,
/// inverse entry, cross-rate via the base currency, cross-rate via the
/// secondary currency, then the static fallback table. Never returns
/// 0, NaN or a negative rate.
#[derive(Debug, Clone)]
pub struct RateResolver {
    base: String,
    secondary: String,
}

fn usable(rate: f64) -> Option<f64> {
    (rate.is_finite() && rate > 0.0).then_some(rate)
}

fn lookup(snapshot: &RateSnapshot, from: &str, to: &str) -> Option<f64> {
    snapshot
        .rate_matrix
        .get(from)
        .and_then(|targets| targets.get(to))
        .and_then(|rate| usable(*rate))
}

/// `(1 / matrix[via][from]) * matrix[via][to]`, when both legs exist.
fn cross(snapshot: &RateSnapshot, via: &str, from: &str, to: &str) -> Option<f64> {
    let from_leg = lookup(snapshot, via, from)?;
    let to_leg = lookup(snapshot, via, to)?;
    usable(to_leg / from_leg)
}

fn fallback_leg(currency: &str) -> f64 {
    if currency == "EUR" {
        return 1.0;
    }
    match FALLBACK_EUR_RATES.iter().find(|(c, _)| *c == currency) {
        Some((_, rate)) => *rate,
        None => {
            warn!(%currency, "Currency missing from fallback table, assuming parity");
            1.0
        }
    }
}

impl RateResolver {
    pub fn new(base: &str, secondary: &str) -> Self {
        RateResolver {
            base: base.to_string(),
            secondary: secondary.to_string(),
        }
    }

    pub fn resolve(&self, snapshot: &RateSnapshot, from: &str, to: &str) -> RateQuote {
        if from == to {
            return RateQuote {
                rate: 1.0,
                source: RateSource::Identity,
            };
        }
        if let Some(rate) = lookup(snapshot, from, to) {
            return RateQuote {
                rate,
                source: RateSource::Direct,
            };
        }
        if let Some(rate) = lookup(snapshot, to, from).and_then(|r| usable(1.0 / r)) {
            return RateQuote {
                rate,
                source: RateSource::Inverse,
            };
        }
        if let Some(rate) = cross(snapshot, &self.base, from, to) {
            return RateQuote {
                rate,
                source: RateSource::CrossBase,
            };
        }
        if let Some(rate) = cross(snapshot, &self.secondary, from, to) {
            return RateQuote {
                rate,
                source: RateSource::CrossSecondary,
            };
        }
        RateQuote {
            rate: fallback_leg(to) / fallback_leg(from),
            source: RateSource::Fallback,
        }
    }

    /// BTC spot in `currency`: the direct quote when cached, otherwise the
    /// base (then secondary) quote converted through `resolve`, otherwise
    /// the fallback price.
    pub fn btc_price(&self, snapshot: &RateSnapshot, currency: &str) -> RateQuote {
        if let Some(price) = snapshot.btc_price.get(currency).and_then(|p| usable(*p)) {
            return RateQuote {
                rate: price,
                source: RateSource::Direct,
            };
        }

        for (quoted_in, source) in [
            (self.base.as_str(), RateSource::CrossBase),
            (self.secondary.as_str(), RateSource::CrossSecondary),
        ] {
            if let Some(price) = snapshot.btc_price.get(quoted_in).and_then(|p| usable(*p)) {
                let fx = self.resolve(snapshot, quoted_in, currency);
                return RateQuote {
                    rate: price * fx.rate,
                    source: if fx.is_estimate() {
                        RateSource::Fallback
                    } else {
                        source
                    },
                };
            }
        }

        RateQuote {
            rate: FALLBACK_BTC_PRICE_EUR * (fallback_leg(currency) / fallback_leg("EUR")),
            source: RateSource::Fallback,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rates::snapshot::PartialRates;

    fn snapshot(rates: &[(&str, &str, f64)], btc: &[(&str, f64)]) -> RateSnapshot {
        let mut partial = PartialRates::default();
        for (from, to, rate) in rates {
            partial
                .rate_matrix
                .entry(from.to_string())
                .or_default()
                .insert(to.to_string(), *rate);
        }
        for (currency, price) in btc {
            partial.btc_price.insert(currency.to_string(), *price);
        }
        RateSnapshot::empty().merged(&partial)
    }

    fn resolver() -> RateResolver {
        RateResolver::new("EUR", "USD")
    }

    #[test]
    fn test_identity_is_always_one() {
        let empty = RateSnapshot::empty();
        for currency in ["EUR", "USD", "PLN", "XYZ"] {
            let quote = resolver().resolve(&empty, currency, currency);
            assert_eq!(quote.rate, 1.0);
            assert_eq!(quote.source, RateSource::Identity);
        }
    }

    #[test]
    fn test_direct_entry_wins() {
        let snap = snapshot(&[("EUR", "USD", 1.1)], &[]);
        let quote = resolver().resolve(&snap, "EUR", "USD");
        assert_eq!(quote.rate, 1.1);
        assert_eq!(quote.source, RateSource::Direct);
    }

    #[test]
    fn test_inverse_entry() {
        let snap = snapshot(&[("EUR", "USD", 1.1)], &[]);
        let quote = resolver().resolve(&snap, "USD", "EUR");
        assert!((quote.rate - 1.0 / 1.1).abs() < 1e-12);
        assert_eq!(quote.source, RateSource::Inverse);
    }

    #[test]
    fn test_triangulation_via_base() {
        // matrix[EUR][USD] = 1.10, matrix[EUR][PLN] = 4.50, no direct
        // USD->PLN entry: the cross rate is 4.50 / 1.10.
        let snap = snapshot(&[("EUR", "USD", 1.10), ("EUR", "PLN", 4.50)], &[]);
        let quote = resolver().resolve(&snap, "USD", "PLN");
        assert!((quote.rate - 4.50 / 1.10).abs() < 1e-12);
        assert_eq!(quote.source, RateSource::CrossBase);
    }

    #[test]
    fn test_triangulation_via_secondary() {
        let snap = snapshot(&[("USD", "GBP", 0.8), ("USD", "PLN", 4.0)], &[]);
        let quote = resolver().resolve(&snap, "GBP", "PLN");
        assert!((quote.rate - 4.0 / 0.8).abs() < 1e-12);
        assert_eq!(quote.source, RateSource::CrossSecondary);
    }

    #[test]
    fn test_fallback_when_no_live_path() {
        let quote = resolver().resolve(&RateSnapshot::empty(), "USD", "PLN");
        assert!(quote.rate > 0.0);
        assert!(quote.rate.is_finite());
        assert!(quote.is_estimate());
        assert!((quote.rate - 4.30 / 1.08).abs() < 1e-12);
    }

    #[test]
    fn test_unknown_currency_still_resolves_positive() {
        let quote = resolver().resolve(&RateSnapshot::empty(), "XYZ", "ABC");
        assert!(quote.rate > 0.0);
        assert!(quote.is_estimate());
    }

    #[test]
    fn test_reciprocal_property_on_live_paths() {
        let snap = snapshot(
            &[("EUR", "USD", 1.10), ("EUR", "PLN", 4.50), ("USD", "JPY", 150.0)],
            &[],
        );
        let r = resolver();
        for (from, to) in [("EUR", "USD"), ("USD", "PLN"), ("USD", "JPY")] {
            let forward = r.resolve(&snap, from, to);
            let backward = r.resolve(&snap, to, from);
            assert!(
                (forward.rate * backward.rate - 1.0).abs() < 1e-9,
                "{from}->{to} not reciprocal"
            );
        }
    }

    #[test]
    fn test_btc_price_direct() {
        let snap = snapshot(&[], &[("USD", 60_000.0)]);
        let quote = resolver().btc_price(&snap, "USD");
        assert_eq!(quote.rate, 60_000.0);
        assert_eq!(quote.source, RateSource::Direct);
    }

    #[test]
    fn test_btc_price_derived_from_base_quote() {
        let snap = snapshot(&[("EUR", "USD", 1.1)], &[("EUR", 50_000.0)]);
        let quote = resolver().btc_price(&snap, "USD");
        assert!((quote.rate - 55_000.0).abs() < 1e-9);
        assert_eq!(quote.source, RateSource::CrossBase);
    }

    #[test]
    fn test_btc_price_with_empty_snapshot_is_positive_estimate() {
        let empty = RateSnapshot::empty();
        for currency in ["EUR", "USD", "PLN", "XYZ"] {
            let quote = resolver().btc_price(&empty, currency);
            assert!(quote.rate > 0.0, "BTC price in {currency} must be positive");
            assert!(quote.rate.is_finite());
            assert!(quote.is_estimate());
        }
    }

    #[test]
    fn test_btc_price_derived_with_fallback_fx_is_marked_estimate() {
        // A live base BTC quote converted through a fallback FX leg is
        // still an estimate overall.
        let snap = snapshot(&[], &[("EUR", 50_000.0)]);
        let quote = resolver().btc_price(&snap, "PLN");
        assert!((quote.rate - 50_000.0 * 4.30).abs() < 1e-9);
        assert!(quote.is_estimate());
    }
}
