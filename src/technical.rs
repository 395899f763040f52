//! Price-based indicators and the oversold scan

use std::collections::HashMap;
use std::fmt;

use crate::models::PriceBar;

pub const WILLIAMS_R_PERIOD: usize = 21;
pub const EMA_PERIOD: usize = 13;
pub const RSI_PERIOD: usize = 14;
pub const DEFAULT_OVERSOLD_THRESHOLD: f64 = -80.0;

/// Williams %R per bar; `None` until `period` bars are available or when the
/// window has no range.
pub fn williams_r(bars: &[PriceBar], period: usize) -> Vec<Option<f64>> {
    if period == 0 {
        return vec![None; bars.len()];
    }

    (0..bars.len())
        .map(|i| {
            if i + 1 < period {
                return None;
            }
            let window = &bars[i + 1 - period..=i];
            let highest = window.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
            let lowest = window.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
            let range = highest - lowest;
            if range == 0.0 {
                None
            } else {
                Some((highest - bars[i].close) / range * -100.0)
            }
        })
        .collect()
}

/// Exponential moving average with `alpha = 2 / (period + 1)`, seeded with the
/// first defined value. Undefined inputs carry the previous average forward.
pub fn ema(series: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    let alpha = 2.0 / (period as f64 + 1.0);
    let mut current: Option<f64> = None;

    series
        .iter()
        .map(|value| {
            current = match (current, value) {
                (None, Some(v)) => Some(*v),
                (Some(prev), Some(v)) => Some(prev + alpha * (v - prev)),
                (prev, None) => prev,
            };
            current
        })
        .collect()
}

/// Relative strength index of the latest close, from simple averages of the
/// last `period` gains and losses. `None` with fewer than `period + 1` bars or
/// when prices did not move at all.
pub fn rsi(bars: &[PriceBar], period: usize) -> Option<f64> {
    if period == 0 || bars.len() < period + 1 {
        return None;
    }

    let window = &bars[bars.len() - period - 1..];
    let (gains, losses) = window.windows(2).fold((0.0, 0.0), |(gains, losses), pair| {
        let change = pair[1].close - pair[0].close;
        if change > 0.0 {
            (gains + change, losses)
        } else {
            (gains, losses - change)
        }
    });

    let avg_gain = gains / period as f64;
    let avg_loss = losses / period as f64;
    match (avg_gain, avg_loss) {
        (g, l) if g == 0.0 && l == 0.0 => None,
        (_, l) if l == 0.0 => Some(100.0),
        (g, l) => Some(100.0 - 100.0 / (1.0 + g / l)),
    }
}

/// How deep into oversold territory a %R reading is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intensity {
    Extreme,
    VeryStrong,
    Strong,
    Moderate,
    Neutral,
    Unknown,
}

impl Intensity {
    pub fn classify(williams_r: Option<f64>) -> Self {
        match williams_r {
            Some(v) if v.is_nan() => Intensity::Unknown,
            Some(v) if v < -95.0 => Intensity::Extreme,
            Some(v) if v < -90.0 => Intensity::VeryStrong,
            Some(v) if v < -85.0 => Intensity::Strong,
            Some(v) if v < -80.0 => Intensity::Moderate,
            Some(_) => Intensity::Neutral,
            None => Intensity::Unknown,
        }
    }

    pub fn range_label(&self) -> &'static str {
        match self {
            Intensity::Extreme => "< -95",
            Intensity::VeryStrong => "-95 to -90",
            Intensity::Strong => "-90 to -85",
            Intensity::Moderate => "-85 to -80",
            Intensity::Neutral => ">= -80",
            Intensity::Unknown => "n/a",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Intensity::Extreme => "🔴",
            Intensity::VeryStrong => "🟠",
            Intensity::Strong => "🟡",
            Intensity::Moderate => "⚡",
            Intensity::Neutral | Intensity::Unknown => "⚪",
        }
    }
}

impl fmt::Display for Intensity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Intensity::Extreme => "EXTREME",
            Intensity::VeryStrong => "VERY_STRONG",
            Intensity::Strong => "STRONG",
            Intensity::Moderate => "MODERATE",
            Intensity::Neutral => "NEUTRAL",
            Intensity::Unknown => "UNKNOWN",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OversoldSignal {
    pub ticker: String,
    pub williams_r: f64,
    pub ema: Option<f64>,
    pub intensity: Intensity,
}

/// Tickers whose latest %R is below `threshold`, most oversold first
pub fn scan_oversold(prices: &HashMap<String, Vec<PriceBar>>, threshold: f64) -> Vec<OversoldSignal> {
    let mut signals: Vec<OversoldSignal> = prices
        .iter()
        .filter_map(|(ticker, bars)| {
            let wr = williams_r(bars, WILLIAMS_R_PERIOD);
            let latest = (*wr.last()?)?;
            if latest >= threshold {
                return None;
            }
            let smoothed = ema(&wr, EMA_PERIOD).last().copied().flatten();
            Some(OversoldSignal {
                ticker: ticker.clone(),
                williams_r: latest,
                ema: smoothed,
                intensity: Intensity::classify(Some(latest)),
            })
        })
        .collect();

    signals.sort_by(|a, b| {
        a.williams_r
            .total_cmp(&b.williams_r)
            .then_with(|| a.ticker.cmp(&b.ticker))
    });
    signals
}
