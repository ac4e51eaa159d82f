//! Frontend latency benchmark: MFCC extraction + classification per window.
//!
//! Windows come from `.wav` fixtures when `--fixtures` is given, otherwise
//! from a synthetic tone/noise/silence set. Reports p50/p95/avg as JSON.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Serialize;
use voxcue_core::{
    audio::{
        resample::{RateConverter, DEFAULT_CHUNK_SIZE},
        wav::read_wav_mono_f32,
    },
    inference::{ClassifierAdapter, ModelHandle},
    Command, EngineConfig, InferenceEngine, MfccExtractor, StubModel,
};

#[derive(Debug)]
struct Args {
    fixtures_dir: Option<PathBuf>,
    model: Option<PathBuf>,
    iterations: usize,
    output: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
struct CaseResult {
    name: String,
    iteration: usize,
    extract_ms: f64,
    classify_ms: f64,
    total_ms: f64,
    top_command: Option<String>,
    top_confidence: f32,
}

#[derive(Debug, Clone, Serialize)]
struct LatencySummary {
    p50_ms: f64,
    p95_ms: f64,
    avg_ms: f64,
}

#[derive(Debug, Clone, Serialize)]
struct Summary {
    source: String,
    backend: String,
    iterations: usize,
    total_runs: usize,
    extract: LatencySummary,
    classify: LatencySummary,
    total: LatencySummary,
    top_commands: BTreeMap<String, usize>,
    cases: Vec<CaseResult>,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("benchmark failed: {e}");
        std::process::exit(1);
    }
}

fn parse_args() -> Result<Args, String> {
    let mut args = Args {
        fixtures_dir: None,
        model: None,
        iterations: 20,
        output: None,
    };

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        let mut value = |name: &str| it.next().ok_or(format!("missing value for {name}"));
        match arg.as_str() {
            "--fixtures" => args.fixtures_dir = Some(PathBuf::from(value("--fixtures")?)),
            "--model" => args.model = Some(PathBuf::from(value("--model")?)),
            "--iterations" => {
                args.iterations = value("--iterations")?
                    .parse::<usize>()
                    .map_err(|_| "invalid value for --iterations".to_string())?
                    .clamp(1, 1_000);
            }
            "--output" => args.output = Some(PathBuf::from(value("--output")?)),
            "--help" | "-h" => {
                println!(
                    "Usage: cargo run -p voxcue-core --release --bin benchmark -- \\
  [--fixtures <dir>] [--model <file.onnx>] [--iterations <n>] [--output <file.json>]"
                );
                std::process::exit(0);
            }
            other => return Err(format!("unknown argument: {other}")),
        }
    }
    Ok(args)
}

fn collect_wavs(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), String> {
    let entries = std::fs::read_dir(dir).map_err(|e| e.to_string())?;
    for entry in entries {
        let path = entry.map_err(|e| e.to_string())?.path();
        if path.is_dir() {
            collect_wavs(&path, out)?;
        } else if path
            .extension()
            .and_then(|s| s.to_str())
            .is_some_and(|s| s.eq_ignore_ascii_case("wav"))
        {
            out.push(path);
        }
    }
    Ok(())
}

/// First window of the file at the pipeline rate, zero-padded if short.
fn wav_window(path: &Path, config: &EngineConfig) -> Result<Vec<f32>, String> {
    let clip = read_wav_mono_f32(path).map_err(|e| e.to_string())?;
    let mut converter = RateConverter::new(clip.sample_rate, config.sample_rate, DEFAULT_CHUNK_SIZE)
        .map_err(|e| e.to_string())?;
    let mut window = converter.process(&clip.samples);
    window.resize(config.window_len(), 0.0);
    Ok(window)
}

fn synthetic_windows(config: &EngineConfig) -> Vec<(String, Vec<f32>)> {
    let n = config.window_len();
    let rate = config.sample_rate as f32;
    let tone = (0..n)
        .map(|i| 0.3 * (2.0 * std::f32::consts::PI * 440.0 * i as f32 / rate).sin())
        .collect();
    // Deterministic LCG noise.
    let mut state = 0x1234_5678u32;
    let noise = (0..n)
        .map(|_| {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            (state >> 8) as f32 / (1u32 << 24) as f32 * 0.4 - 0.2
        })
        .collect();
    vec![
        ("synthetic/tone_440hz".into(), tone),
        ("synthetic/noise".into(), noise),
        ("synthetic/silence".into(), vec![0.0; n]),
    ]
}

fn load_model(path: Option<&Path>) -> Result<(ModelHandle, String), String> {
    match path {
        #[cfg(feature = "onnx")]
        Some(path) => {
            use voxcue_core::{OnnxModel, OnnxModelConfig};
            let mut model = OnnxModel::new(OnnxModelConfig::from_path(path));
            model.warm_up().map_err(|e| e.to_string())?;
            Ok((ModelHandle::new(model), format!("onnx:{}", path.display())))
        }
        #[cfg(not(feature = "onnx"))]
        Some(_) => Err("--model requires the 'onnx' feature".into()),
        None => {
            let mut model = StubModel::new();
            model.warm_up().map_err(|e| e.to_string())?;
            Ok((ModelHandle::new(model), "stub".into()))
        }
    }
}

fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let idx = ((sorted.len() - 1) as f64 * p.clamp(0.0, 1.0)).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn summarize(values: &[f64]) -> LatencySummary {
    LatencySummary {
        p50_ms: percentile(values, 0.50),
        p95_ms: percentile(values, 0.95),
        avg_ms: if values.is_empty() {
            0.0
        } else {
            values.iter().sum::<f64>() / values.len() as f64
        },
    }
}

fn run() -> Result<(), String> {
    let args = parse_args()?;
    let config = EngineConfig::default();

    let (windows, source) = match &args.fixtures_dir {
        Some(dir) => {
            let mut wavs = Vec::new();
            collect_wavs(dir, &mut wavs)?;
            wavs.sort();
            if wavs.is_empty() {
                return Err(format!("no .wav fixtures found in {}", dir.display()));
            }
            let windows = wavs
                .iter()
                .map(|path| {
                    let name = path.strip_prefix(dir).unwrap_or(path).display().to_string();
                    wav_window(path, &config).map(|w| (name, w))
                })
                .collect::<Result<Vec<_>, _>>()?;
            (windows, dir.display().to_string())
        }
        None => (synthetic_windows(&config), "synthetic".to_string()),
    };

    let (model, backend) = load_model(args.model.as_deref())?;
    let extractor = MfccExtractor::new(config.mfcc_config()).map_err(|e| e.to_string())?;
    let adapter = ClassifierAdapter::new(model, config.time_steps, config.coeff_count);
    adapter.check_model_shape().map_err(|e| e.to_string())?;

    println!(
        "Running voxcue benchmark: {} windows x {} iterations ({backend})",
        windows.len(),
        args.iterations
    );

    let mut cases = Vec::new();
    for (name, window) in &windows {
        for iteration in 1..=args.iterations {
            let started = Instant::now();
            let features = extractor.extract(window);
            let extracted = Instant::now();
            let probabilities = adapter
                .classify(&features)
                .map_err(|e| format!("{name}: {e}"))?;
            let done = Instant::now();

            let top = probabilities.argmax();
            cases.push(CaseResult {
                name: name.clone(),
                iteration,
                extract_ms: (extracted - started).as_secs_f64() * 1000.0,
                classify_ms: (done - extracted).as_secs_f64() * 1000.0,
                total_ms: (done - started).as_secs_f64() * 1000.0,
                top_command: top
                    .and_then(|(index, _)| Command::from_index(index))
                    .map(|c| c.to_string()),
                top_confidence: top.map_or(0.0, |(_, confidence)| confidence),
            });
        }
    }

    let column = |f: fn(&CaseResult) -> f64| cases.iter().map(f).collect::<Vec<_>>();
    let mut top_commands = BTreeMap::new();
    for case in &cases {
        let key = case.top_command.clone().unwrap_or_else(|| "none".into());
        *top_commands.entry(key).or_insert(0) += 1;
    }
    let summary = Summary {
        source,
        backend,
        iterations: args.iterations,
        total_runs: cases.len(),
        extract: summarize(&column(|c| c.extract_ms)),
        classify: summarize(&column(|c| c.classify_ms)),
        total: summarize(&column(|c| c.total_ms)),
        top_commands,
        cases,
    };

    println!(
        "Done. runs={} p50={:.2}ms p95={:.2}ms",
        summary.total_runs, summary.total.p50_ms, summary.total.p95_ms
    );

    let json = serde_json::to_string_pretty(&summary).map_err(|e| e.to_string())?;
    match args.output {
        Some(out) => {
            if let Some(parent) = out.parent() {
                std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
            }
            std::fs::write(&out, json).map_err(|e| e.to_string())?;
            println!("Wrote benchmark report: {}", out.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}
