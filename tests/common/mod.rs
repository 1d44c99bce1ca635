//! Shared fixtures for integration tests

#![allow(dead_code)]

use chrono::{Duration, NaiveDate};
use rusty_alpha::data::Panel;
use rusty_alpha::instrument::InstrumentId;
use rusty_alpha::types::{Observation, TradingDate};

/// `n` calendar days after 2024-01-01
pub fn date(n: usize) -> TradingDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + Duration::days(n as i64)
}

pub fn id(ticker: &str) -> InstrumentId {
    InstrumentId::new("SH", ticker)
}

/// One row per (ticker, day) with flat OHLC at the given price
///
/// A `None` price means no row on that day.
pub fn panel_from_prices(series: &[(&str, &[Option<f64>])]) -> Panel {
    let mut builder = Panel::builder();
    for (ticker, prices) in series {
        for (t, price) in prices.iter().enumerate() {
            if let Some(p) = price {
                builder.add_observation(id(ticker), date(t), Observation::flat(*p, 1_000.0));
            }
        }
    }
    builder.build().unwrap()
}

/// Dense variant of [`panel_from_prices`]
pub fn dense_panel(series: &[(&str, Vec<f64>)]) -> Panel {
    let mut builder = Panel::builder();
    for (ticker, prices) in series {
        for (t, p) in prices.iter().enumerate() {
            builder.add_observation(id(ticker), date(t), Observation::flat(*p, 1_000.0));
        }
    }
    builder.build().unwrap()
}

/// Phase-shifted sine price paths across `sectors` sectors
pub fn synthetic_panel(instruments: usize, days: usize, sectors: usize) -> Panel {
    let mut builder = Panel::builder();
    for i in 0..instruments {
        let ticker = format!("{:06}", i);
        let sector = format!("S{}", i % sectors.max(1));
        for t in 0..days {
            let phase = i as f64 * 0.61;
            let drift = 1.0 + 0.0005 * (i % 7) as f64 * t as f64;
            let price = 50.0 * drift * (1.0 + 0.1 * ((t as f64) / 9.0 + phase).sin());
            let volume = 5_000.0 + 100.0 * ((t * 3 + i) % 11) as f64;
            builder.add_observation(
                id(&ticker),
                date(t),
                Observation::flat(price, volume).with_sector(sector.clone()),
            );
        }
    }
    builder.build().unwrap()
}
