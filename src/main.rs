/*
Estabilómetro - análisis por lotes de ensayos del apoyabrazos instrumentado

Lee los CSV que escribe la interfaz de adquisición (un archivo por repetición,
nombre <sujeto>_<tarea>_rep<n>.csv) y calcula:
1. Resumen 2D por sujeto y tarea: trayectoria media del CoP y elipse de confianza al 95%
2. Superficie de fuerza en el instante de pico, con su gradiente
3. Validación cruzada dejando un sujeto fuera sobre los perfiles motores medios

Ejemplo:
     ./target/release/estabilometro --data experimental_data all --out resultados
Más detalle en los logs:
     RUST_LOG=debug ./target/release/estabilometro --data experimental_data classify
*/

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use estabilometro::classifier::default_pipeline;
use estabilometro::config::AnalysisConfig;
use estabilometro::csv_loader::{discover_trials, TrialCatalog};
use estabilometro::pipeline::{
    build_dataset, insufficient_groups, reconstruct_fields, summarize_groups, GroupOutcome,
};
use estabilometro::validation::leave_one_subject_out;

/// Análisis de ensayos de centro de presión
#[derive(Parser, Debug)]
#[command(name = "estabilometro")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directorio con los CSV de los ensayos
    #[arg(short, long, global = true, default_value = "experimental_data")]
    data: PathBuf,

    /// Directorio de salida para los artefactos JSON y el informe
    #[arg(short, long, global = true)]
    out: Option<PathBuf>,

    /// Configuración JSON (umbral, malla, semilla...)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Logs de depuración
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Trayectoria media y elipse de confianza por sujeto y tarea
    Summary,
    /// Superficie de fuerza y gradiente en el pico por sujeto y tarea
    Surface,
    /// Clasificador de tareas con validación LOSO
    Classify,
    /// Los tres análisis
    All,
}

fn write_json<T: Serialize>(dir: &Path, name: &str, value: &T) -> Result<PathBuf> {
    let path = dir.join(name);
    let file = File::create(&path).with_context(|| format!("No se pudo crear {:?}", path))?;
    serde_json::to_writer_pretty(BufWriter::new(file), value)
        .with_context(|| format!("No se pudo escribir {:?}", path))?;
    Ok(path)
}

/// Guarda los grupos válidos; un fallo de escritura se avisa y no corta el lote
fn export_groups<T: Serialize>(outcomes: &[GroupOutcome<T>], out: Option<&Path>, suffix: &str) {
    let Some(dir) = out else { return };
    for outcome in outcomes {
        if let Ok(value) = &outcome.result {
            let name = format!("{}_{}_{}.json", outcome.subject_id, outcome.task_name, suffix);
            match write_json(dir, &name, value) {
                Ok(path) => info!(path = %path.display(), "artefacto guardado"),
                Err(e) => error!(error = %e, "no se pudo guardar {}", name),
            }
        }
    }
}

fn run_summary(catalog: &TrialCatalog, config: &AnalysisConfig, out: Option<&Path>) {
    println!("📐 Resumen 2D por sujeto y tarea");
    let outcomes = summarize_groups(catalog, config);
    for outcome in &outcomes {
        if let Ok(summary) = &outcome.result {
            let e = &summary.ellipse;
            println!(
                "  {:<8} {:<14} N={}  centro=({:.2}, {:.2})  ángulo={:>7.2}°  área={:.3} cm²",
                outcome.subject_id,
                outcome.task_name,
                summary.repetitions,
                e.center.x,
                e.center.y,
                e.angle_deg,
                e.area
            );
        }
    }
    println!(
        "  {} grupos, {} omitidos por datos insuficientes\n",
        outcomes.len(),
        insufficient_groups(&outcomes)
    );
    export_groups(&outcomes, out, "summary");
}

fn run_surface(catalog: &TrialCatalog, config: &AnalysisConfig, out: Option<&Path>) {
    println!("🗻 Superficie de fuerza en el pico");
    let outcomes = reconstruct_fields(catalog, config);
    for outcome in &outcomes {
        if let Ok(field) = &outcome.result {
            let peak = field.peak_forces;
            println!(
                "  {:<8} {:<14} F=[{:.2}, {:.2}, {:.2}] N  CoP pico=({:.2}, {:.2})  máx={:.2} N",
                outcome.subject_id,
                outcome.task_name,
                peak.left,
                peak.right,
                peak.vertex,
                field.peak_cop.x,
                field.peak_cop.y,
                field.max_value()
            );
        }
    }
    println!(
        "  {} grupos, {} omitidos por datos insuficientes\n",
        outcomes.len(),
        insufficient_groups(&outcomes)
    );
    export_groups(&outcomes, out, "surface");
}

fn run_classify(catalog: &TrialCatalog, config: &AnalysisConfig, out: Option<&Path>) -> Result<()> {
    println!("🧠 Clasificador de tareas (LOSO sobre perfiles medios)");
    let dataset = build_dataset(catalog, config);
    println!(
        "  {} perfiles motores medios de {} sujetos",
        dataset.len(),
        dataset.subjects().len()
    );

    let report = match leave_one_subject_out(&dataset, || default_pipeline(&config.forest)) {
        Ok(report) => report,
        Err(e) => {
            // no invalida los resúmenes ya calculados
            eprintln!("❌ {}", e);
            return Ok(());
        }
    };

    println!("\n-------------------------------------------------------------");
    print!("{}", report);
    println!("-------------------------------------------------------------\n");

    if let Some(dir) = out {
        let txt_path = dir.join("classification_report.txt");
        let mut file =
            File::create(&txt_path).with_context(|| format!("No se pudo crear {:?}", txt_path))?;
        write!(file, "{}", report)?;
        println!("💾 Informe guardado en {}", txt_path.display());

        let json_path = write_json(dir, "classification_report.json", &report)?;
        println!("💾 Matriz de confusión guardada en {}", json_path.display());
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let config = match &cli.config {
        Some(path) => AnalysisConfig::load(path)
            .with_context(|| format!("Configuración inválida en {:?}", path))?,
        None => AnalysisConfig::default(),
    };

    println!("🎯 Estabilómetro - análisis de ensayos de CoP\n");

    let catalog = discover_trials(&cli.data)
        .with_context(|| format!("No se pudo leer el directorio de datos {:?}", cli.data))?;
    if catalog.trial_count() == 0 {
        warn!(dir = %cli.data.display(), "no se encontraron ensayos CSV");
        println!("ℹ️  No hay ensayos válidos en {:?}", cli.data);
        return Ok(());
    }
    println!(
        "📂 {} ensayos de {} sujetos ({} archivos ignorados)\n",
        catalog.trial_count(),
        catalog.groups.len(),
        catalog.skipped.len()
    );

    let out = cli.out.as_deref();
    if let Some(dir) = out {
        fs::create_dir_all(dir).with_context(|| format!("No se pudo crear {:?}", dir))?;
    }

    match cli.command {
        Command::Summary => run_summary(&catalog, &config, out),
        Command::Surface => run_surface(&catalog, &config, out),
        Command::Classify => run_classify(&catalog, &config, out)?,
        Command::All => {
            run_summary(&catalog, &config, out);
            run_surface(&catalog, &config, out);
            run_classify(&catalog, &config, out)?;
        }
    }

    println!("✅ Análisis completado");
    Ok(())
}
