//! Artifact export: JSON outcome, CSV equity curve and fill tape, Markdown summary.
//!
//! Persisted outcomes carry a `schema_version`; newer versions are rejected on load.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::ledger::Fill;
use crate::runner::{ReplayOutcome, SCHEMA_VERSION};

// ─── JSON ───────────────────────────────────────────────────────────

pub fn export_json(outcome: &ReplayOutcome) -> Result<String> {
    serde_json::to_string_pretty(outcome).context("failed to serialize ReplayOutcome to JSON")
}

pub fn import_json(json: &str) -> Result<ReplayOutcome> {
    let outcome: ReplayOutcome =
        serde_json::from_str(json).context("failed to deserialize ReplayOutcome from JSON")?;
    if outcome.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            outcome.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(outcome)
}

// ─── CSV ────────────────────────────────────────────────────────────

/// Columns: step_index, time, value, return (empty on the first row).
pub fn export_equity_csv(outcome: &ReplayOutcome) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["step_index", "time", "value", "return"])?;

    for (i, (t, value)) in outcome.tick_times().zip(&outcome.values).enumerate() {
        let ret = match i {
            0 => String::new(),
            _ => format!("{:.8}", outcome.returns[i - 1]),
        };
        wtr.write_record([
            &i.to_string(),
            &t.to_rfc3339(),
            &format!("{value:.6}"),
            &ret,
        ])?;
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

pub fn export_fills_csv(fills: &[Fill]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["time", "pair", "side", "price", "base_qty", "quote_qty", "fee"])?;
    for f in fills {
        wtr.write_record([
            &f.at.to_rfc3339(),
            &f.pair.to_string(),
            &format!("{:?}", f.side).to_lowercase(),
            &format!("{:.6}", f.price),
            &format!("{:.8}", f.base_qty),
            &format!("{:.6}", f.quote_qty),
            &format!("{:.8}", f.fee),
        ])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Write `outcome.json`, `equity.csv` and `fills.csv` under
/// `{output_dir}/{pair}_{run_id prefix}/` and return that directory.
pub fn save_artifacts(outcome: &ReplayOutcome, output_dir: &Path) -> Result<PathBuf> {
    let dirname = format!(
        "{}_{}",
        outcome.pair.replace('/', ""),
        &outcome.run_id[..outcome.run_id.len().min(12)]
    );
    let run_dir = output_dir.join(dirname);
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    std::fs::write(run_dir.join("outcome.json"), export_json(outcome)?)?;
    std::fs::write(run_dir.join("equity.csv"), export_equity_csv(outcome)?)?;
    std::fs::write(run_dir.join("fills.csv"), export_fills_csv(&outcome.fills)?)?;

    Ok(run_dir)
}

pub fn load_artifacts(dir: &Path) -> Result<ReplayOutcome> {
    let path = dir.join("outcome.json");
    let json = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    import_json(&json)
}

// ─── Markdown ───────────────────────────────────────────────────────

pub fn render_summary(outcome: &ReplayOutcome) -> String {
    let r = &outcome.report;
    let mut md = String::with_capacity(1024);

    md.push_str("# Replay Report\n\n");
    md.push_str(&format!("- **Strategy**: {} on {}\n", outcome.strategy, outcome.pair));
    md.push_str(&format!("- **Source**: {}\n", outcome.source));
    md.push_str(&format!(
        "- **Window**: {} .. {} every {}\n",
        outcome.start, outcome.end, outcome.step
    ));
    md.push_str(&format!("- **Run id**: `{}`\n", outcome.run_id));
    if let Some(err) = &outcome.error {
        md.push_str(&format!("- **Aborted**: {err}\n"));
    }

    md.push_str("\n| Metric | Value |\n|---|---|\n");
    let rows = [
        ("Observations", r.observations.to_string()),
        ("Start value", format!("{:.2}", r.start_value)),
        ("End value", format!("{:.2}", r.end_value)),
        ("Total return", pct(r.total_return)),
        ("Annualized return", pct(r.annualized_return)),
        ("Volatility", pct(r.volatility)),
        ("Sharpe", f3(r.sharpe)),
        ("Sortino", f3(r.sortino)),
        ("Omega", f3(r.omega)),
        ("Max drawdown", pct(r.max_drawdown)),
        ("Ulcer index", f3(r.ulcer_index)),
        ("Martin", f3(r.martin)),
        ("Fills", outcome.fills.len().to_string()),
        (
            "Cache hits / misses",
            format!("{} / {}", outcome.cache.hits, outcome.cache.misses),
        ),
    ];
    for (name, value) in rows {
        md.push_str(&format!("| {name} | {value} |\n"));
    }
    md
}

fn pct(v: f64) -> String {
    format!("{:.2}%", v * 100.0)
}

fn f3(v: f64) -> String {
    format!("{v:.3}")
}
