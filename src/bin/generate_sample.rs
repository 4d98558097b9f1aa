//! Writes a synthetic run to `sample_run/` and builds its report.
//!
//! The run has standardized features, log1p-transformed targets and a site
//! attribute table, so every stage of the pipeline is exercised.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{ArrayRef, Float64Array, StringArray};
use arrow::record_batch::RecordBatch;
use arrow::util::pretty::pretty_format_batches;

use site_report::data::writer::write_parquet;
use site_report::{
    FittedTransform, LinearPredictor, PredictionReport, ReportConfig, SplitData, SplitSet,
};

const RUN_NAME: &str = "sample_run";
const OUT_FEATURE: &str = "TW_bf";
const N_SITES: usize = 40;

const AREA_MEAN: f64 = 350.0;
const AREA_SCALE: f64 = 120.0;
const SLOPE_MEAN: f64 = 0.01;
const SLOPE_SCALE: f64 = 0.004;

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5)).rotate_left(7).wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

fn site_id(i: usize) -> String {
    format!("{:08}", 1_013_500 + i * 100)
}

fn site_attributes(rng: &mut SimpleRng) -> Result<RecordBatch> {
    let ids: Vec<String> = (0..N_SITES).map(site_id).collect();
    let lat: Vec<f64> = (0..N_SITES).map(|_| rng.gauss(40.0, 3.0)).collect();
    let long: Vec<f64> = (0..N_SITES).map(|_| rng.gauss(-95.0, 8.0)).collect();
    let elevation: Vec<f64> = (0..N_SITES).map(|_| rng.gauss(600.0, 150.0)).collect();
    let ecoregion: Vec<&str> = (0..N_SITES)
        .map(|i| ["plains", "mountains", "coastal"][i % 3])
        .collect();

    RecordBatch::try_from_iter(vec![
        ("siteID", Arc::new(StringArray::from(ids)) as ArrayRef),
        ("lat", Arc::new(Float64Array::from(lat)) as ArrayRef),
        ("long", Arc::new(Float64Array::from(long)) as ArrayRef),
        ("elevation_m", Arc::new(Float64Array::from(elevation)) as ArrayRef),
        ("ecoregion", Arc::new(StringArray::from(ecoregion)) as ArrayRef),
    ])
    .context("building site attributes")
}

/// Standardized features, log1p targets and ids for `sites`.
fn split(rng: &mut SimpleRng, sites: std::ops::Range<usize>) -> Result<SplitData> {
    let mut area = Vec::new();
    let mut slope = Vec::new();
    let mut targets = Vec::new();
    let mut ids = Vec::new();

    for i in sites {
        let a = rng.gauss(AREA_MEAN, AREA_SCALE).max(1.0);
        let s = rng.gauss(SLOPE_MEAN, SLOPE_SCALE).max(1e-4);
        // channel width in feet
        let width = 2.5 * a.sqrt() * (1.0 + rng.gauss(0.0, 0.1));

        area.push((a - AREA_MEAN) / AREA_SCALE);
        slope.push((s - SLOPE_MEAN) / SLOPE_SCALE);
        targets.push(width.max(0.0).ln_1p());
        ids.push(site_id(i));
    }

    let features = RecordBatch::try_from_iter(vec![
        ("drainage_area", Arc::new(Float64Array::from(area)) as ArrayRef),
        ("slope", Arc::new(Float64Array::from(slope)) as ArrayRef),
    ])?;
    let ids = RecordBatch::try_from_iter(vec![(
        "siteID",
        Arc::new(StringArray::from(ids)) as ArrayRef,
    )])?;
    Ok(SplitData::new(features, targets, ids))
}

fn write_transform(path: &Path, transform: &FittedTransform) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(transform)?;
    std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))
}

fn main() -> Result<()> {
    env_logger::init();

    let mut rng = SimpleRng::new(42);
    let attributes_path = Path::new(RUN_NAME).join("site_attributes.parquet");
    write_parquet(&attributes_path, &site_attributes(&mut rng)?)?;

    let splits = SplitSet {
        train: split(&mut rng, 0..24)?,
        eval: split(&mut rng, 24..32)?,
        test: split(&mut rng, 32..N_SITES)?,
    };

    let mut config = ReportConfig::new(RUN_NAME, OUT_FEATURE, "linear", &attributes_path);
    config.inverse_target = true;
    config.inverse_features = true;
    config.si_units = true;

    let layout = config.layout();
    write_transform(&layout.target_transform(), &FittedTransform::Log1p)?;
    write_transform(
        &layout.feature_transform(),
        &FittedTransform::Standard {
            mean: vec![AREA_MEAN, SLOPE_MEAN],
            scale: vec![AREA_SCALE, SLOPE_SCALE],
        },
    )?;

    // Rough fit of log1p(width) on the standardized features.
    let model = LinearPredictor {
        intercept: 3.9,
        coefficients: vec![("drainage_area".into(), 0.17), ("slope".into(), 0.0)],
    };

    let report = PredictionReport::new(config, splits, &model).run()?;
    let head = report.merged.slice(0, report.merged.num_rows().min(5));
    println!("{}", pretty_format_batches(&[head])?);
    println!(
        "Wrote {} rows to {}",
        report.merged.num_rows(),
        report.output.display()
    );
    Ok(())
}
