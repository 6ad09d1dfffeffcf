// src/main.rs
//
// =============================================================================
// SHADERGRAPH: COMMAND-LINE DRIVER
// =============================================================================
//
// Modes:
// 1. VALIDATE: Parse an IR document and print the error list.
// 2. COMPILE:  Emit the host driver and one WGSL module per shader function.
// 3. RUN:      Execute the entry point on the reference interpreter and dump
//              the observable state (buffers and globals).

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use shadergraph::interp::JsonMap;
use shadergraph::{compile_host, compile_shaders, interpret, validate, IrDocument, ShaderOptions};
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "shadergraph",
    version,
    about = "Shader-graph toolchain: validate, compile and interpret IR documents"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate an IR document and report every finding.
    Validate {
        /// Path to the IR JSON file.
        file: PathBuf,
    },

    /// Emit host driver code and shader modules.
    Compile {
        /// Path to the IR JSON file.
        file: PathBuf,

        /// Write shader modules into this directory (one .wgsl per entry).
        #[arg(long)]
        shader_out: Option<PathBuf>,

        /// Storage-buffer binding index per resource, as id=index.
        #[arg(long, num_args = 1..)]
        binding: Vec<String>,
    },

    /// Run the entry point on the reference interpreter.
    Run {
        /// Path to the IR JSON file.
        file: PathBuf,

        /// Input bindings as id=JSON (e.g. --input speed=2.5).
        #[arg(long, num_args = 1..)]
        input: Vec<String>,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Commands::Validate { file } => cmd_validate(&file),
        Commands::Compile {
            file,
            shader_out,
            binding,
        } => cmd_compile(&file, shader_out.as_deref(), &binding),
        Commands::Run { file, input } => cmd_run(&file, &input),
    }
}

fn load_document(file: &std::path::Path) -> Result<IrDocument> {
    let raw = fs::read_to_string(file)
        .with_context(|| format!("reading {}", file.display()))?;
    let value: Value = serde_json::from_str(&raw).context("parsing JSON")?;
    IrDocument::from_json(value).context("parsing IR document")
}

fn validated(file: &std::path::Path) -> Result<IrDocument> {
    let doc = load_document(file)?;
    let result = validate(&doc);
    for finding in &result.errors {
        log::warn!("{finding}");
    }
    if !result.ok() {
        for finding in &result.errors {
            eprintln!("{finding}");
        }
        bail!("document failed validation with {} finding(s)", result.errors.len());
    }
    Ok(doc)
}

fn cmd_validate(file: &std::path::Path) -> Result<()> {
    let doc = load_document(file)?;
    let result = validate(&doc);
    for finding in &result.errors {
        println!("{finding}");
    }
    if result.ok() {
        println!("OK: '{}' is valid", doc.meta.name);
        Ok(())
    } else {
        bail!("document failed validation");
    }
}

fn cmd_compile(
    file: &std::path::Path,
    shader_out: Option<&std::path::Path>,
    bindings: &[String],
) -> Result<()> {
    let doc = validated(file)?;

    let mut options = ShaderOptions::default();
    for spec in bindings {
        let Some((id, index)) = spec.split_once('=') else {
            bail!("--binding expects id=index, got '{spec}'");
        };
        options
            .resource_bindings
            .insert(id.to_string(), index.parse().context("binding index")?);
    }

    let entry = doc
        .function(&doc.entry_point)
        .expect("validated entry point");
    println!("{}", compile_host(entry, &doc)?);

    let modules = compile_shaders(&doc, &options)?;
    for (id, text) in &modules {
        match shader_out {
            Some(dir) => {
                fs::create_dir_all(dir)?;
                let path = dir.join(format!("{id}.wgsl"));
                fs::write(&path, text)
                    .with_context(|| format!("writing {}", path.display()))?;
                log::info!("wrote {}", path.display());
            }
            None => println!("// ---- {id} ----\n{text}"),
        }
    }
    Ok(())
}

fn cmd_run(file: &std::path::Path, inputs: &[String]) -> Result<()> {
    let doc = validated(file)?;

    let mut bound = JsonMap::new();
    for spec in inputs {
        let Some((id, raw)) = spec.split_once('=') else {
            bail!("--input expects id=JSON, got '{spec}'");
        };
        let value: Value = serde_json::from_str(raw)
            .with_context(|| format!("parsing input '{id}'"))?;
        bound.insert(id.to_string(), value);
    }

    let ctx = interpret(&doc, &bound)?;
    for resource in &doc.resources {
        if let Some(data) = ctx.resources.buffer(&resource.id) {
            let rendered: Vec<Value> = data.iter().map(|v| v.to_json()).collect();
            println!("{} = {}", resource.id, Value::Array(rendered));
        }
    }
    for (name, value) in &ctx.globals {
        println!("{name} = {}", value.to_json());
    }
    Ok(())
}
