use std::env;
use std::path::PathBuf;

use anyhow::{anyhow, bail, Result};
use estabilometro::config::AnalysisConfig;
use estabilometro::csv_loader::load_trial_from_csv;
use estabilometro::feature_extractor::{FeatureExtractor, TaskClass};
use estabilometro::normalizer::{clean_samples, normalize_trial};

struct ReplayOptions {
    dump_normalized: bool,
    dump_features: bool,
}

fn parse_args() -> Result<(PathBuf, ReplayOptions)> {
    let mut dump_normalized = false;
    let mut dump_features = false;
    let mut csv_path: Option<PathBuf> = None;

    for arg in env::args().skip(1) {
        match arg.as_str() {
            "--dump-normalized" => dump_normalized = true,
            "--dump-features" => dump_features = true,
            _ => {
                if csv_path.is_some() {
                    bail!("Uso: replay_trial [--dump-normalized] [--dump-features] <archivo.csv>");
                }
                csv_path = Some(PathBuf::from(arg));
            }
        }
    }

    let csv_path = csv_path.ok_or_else(|| anyhow!("Debes especificar un archivo CSV"))?;
    Ok((
        csv_path,
        ReplayOptions {
            dump_normalized,
            dump_features,
        },
    ))
}

fn main() -> Result<()> {
    let (csv_path, opts) = parse_args()?;
    println!("🎞️  Reproduciendo ensayo desde {:?}", csv_path);

    let config = AnalysisConfig::default();
    let trial = load_trial_from_csv(&csv_path)?;
    let clean = clean_samples(&trial, &config)?;
    println!(
        "ℹ️  {}: {} muestras, {} con contacto",
        trial.id,
        trial.samples.len(),
        clean.len()
    );

    let normalized = normalize_trial(&trial, &config)?;
    let peak = normalized.peak_index();
    let forces = normalized.forces_at(peak);
    let cop = normalized.cop_at(peak);
    let duration = normalized.time.last().copied().unwrap_or(0.0);

    println!("\n⏱️  Duración: {:.3} s", duration);
    println!(
        "🥇 Pico en t={:.3} s: F=[{:.2}, {:.2}, {:.2}] N (total {:.2} N), CoP=({:.2}, {:.2})",
        normalized.time[peak],
        forces.left,
        forces.right,
        forces.vertex,
        forces.total(),
        cop.x,
        cop.y
    );
    println!("🏷️  Clase de tarea: {:?}", TaskClass::from_label(&trial.id.task_name));

    if opts.dump_features {
        let features = FeatureExtractor::new(config.clone()).extract(&trial)?;
        println!("\n📊 Características:");
        for (name, value) in features.iter() {
            println!("  {:<24} {:>12.6}", name, value);
        }
    }

    if opts.dump_normalized {
        println!("\n🧱 Serie normalizada ({} puntos):", normalized.len());
        println!(
            "  {:>3}  {:>8}  {:>8}  {:>8}  {:>8}  {:>8}  {:>8}",
            "i", "t", "F_left", "F_right", "F_vtc", "CoP_x", "CoP_y"
        );
        for idx in 0..normalized.len() {
            println!(
                "  {:03}  {:>8.4}  {:>8.3}  {:>8.3}  {:>8.3}  {:>8.3}  {:>8.3}",
                idx,
                normalized.time[idx],
                normalized.f_left[idx],
                normalized.f_right[idx],
                normalized.f_vtc[idx],
                normalized.cop_x[idx],
                normalized.cop_y[idx]
            );
        }
    }

    Ok(())
}
