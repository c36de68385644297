//! Loading replay configs from disk.

use replaylab_core::Interval;
use replaylab_runner::{ConfigError, DataConfig, ReplayConfig, StrategyConfig};

const CONFIG: &str = r#"
[backtest]
start = "2024-01-01T00:00:00Z"
end = "2024-03-01T00:00:00Z"
step = "15m"
initial_capital = 2500.0
quote = "EUR"
fee_rate = 0.001
min_return = 0.02

[data]
source = "historical_csv"
data_root = "data/kraken"
name_pattern = "{base}{quote}_{minutes}.csv"

[strategy]
type = "ma_crossover"
pair = "ETH/EUR"
interval = "4h"
fast = 12
slow = 48
ma = "ema"
"#;

#[test]
fn loads_full_config_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("replay.toml");
    std::fs::write(&path, CONFIG).unwrap();

    let config = ReplayConfig::from_file(&path).unwrap();
    assert_eq!(config.backtest.step, Interval::minutes(15));
    assert_eq!(config.backtest.quote, "EUR");
    assert_eq!(config.backtest.min_return, 0.02);
    assert!(matches!(config.data, DataConfig::HistoricalCsv { .. }));
    match config.strategy {
        StrategyConfig::MaCrossover { fast, slow, interval, .. } => {
            assert_eq!((fast, slow), (12, 48));
            assert_eq!(interval, Interval::hours(4));
        }
        other => panic!("unexpected strategy {other:?}"),
    }
}

#[test]
fn run_id_survives_a_toml_round_trip() {
    let config = ReplayConfig::from_toml(CONFIG).unwrap();
    let reparsed = ReplayConfig::from_toml(&toml::to_string(&config).unwrap()).unwrap();
    assert_eq!(config, reparsed);
    assert_eq!(config.run_id(), reparsed.run_id());
}

#[test]
fn missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = ReplayConfig::from_file(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
}

#[test]
fn empty_window_is_rejected() {
    let err = ReplayConfig::from_toml(&CONFIG.replace("2024-03-01T00:00:00Z", "2024-01-01T00:10:00Z"))
        .unwrap_err();
    assert!(err.to_string().contains("no whole 15m step"), "{err}");
}

#[test]
fn demo_config_is_valid() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../demos/replay.toml");
    let config = ReplayConfig::from_file(&path).unwrap();
    assert_eq!(config.strategy.name(), "ma_crossover");
    assert!(matches!(config.data, DataConfig::Synthetic { seed: 7, .. }));
}
