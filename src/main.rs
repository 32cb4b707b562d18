use std::{
    io,
    path::{Path, PathBuf},
    process::ExitCode,
};

use clap::{CommandFactory, Parser as ClapParser, error::ErrorKind};
use colored::Colorize;
use log::{debug, info};
use thiserror::Error;

use crate::{
    frontend::{
        SourceFile, SourceFileOrigin,
        parser::{self, ParseOutput, ParserConfig},
    },
    middle::ir::{builder::ShortCircuit, pretty_print::pretty_print_module, writer},
};

mod frontend;
mod index;
mod middle;

#[derive(Debug, ClapParser)]
#[command(version, about, long_about = None)]
pub struct Args {
    source_files: Vec<PathBuf>,

    /// Evaluate the right operand of `&&` and `||` only when needed
    #[arg(long)]
    short_circuit: bool,

    /// Print the generated module in a readable form
    #[arg(long)]
    dump_ir: bool,

    /// Print the collected textures, samplers, uniforms and techniques
    #[arg(long)]
    reflect: bool,

    /// Output file, only valid with a single source file. Defaults to the
    /// source path with an `.spv` extension.
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[arg(long)]
    no_color: bool,
}

#[derive(Debug, Error)]
enum DriverError {
    #[error("failed to read '{}': {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to write '{}': {source}", path.display())]
    Write { path: PathBuf, source: io::Error },

    #[error("compilation of '{0}' failed")]
    Compilation(String),
}

fn main() -> ExitCode {
    env_logger::init();

    let args = Args::parse();

    if args.no_color {
        colored::control::set_override(false);
    }

    if args.source_files.is_empty() {
        Args::command()
            .error(ErrorKind::MissingRequiredArgument, "Missing source files!")
            .exit();
    }

    if args.output.is_some() && args.source_files.len() > 1 {
        Args::command()
            .error(
                ErrorKind::ArgumentConflict,
                "An output file can only be given for a single source file!",
            )
            .exit();
    }

    for source_file in &args.source_files {
        if !source_file.exists() {
            Args::command()
                .error(
                    ErrorKind::InvalidValue,
                    format!("Source file '{}' does not exist!", source_file.display()),
                )
                .exit()
        }

        if !source_file.is_file() {
            Args::command()
                .error(
                    ErrorKind::InvalidValue,
                    format!("Input path '{}' is not a file!", source_file.display()),
                )
                .exit()
        }
    }

    let config = ParserConfig {
        short_circuit: match args.short_circuit {
            true => ShortCircuit::Branch,
            false => ShortCircuit::Select,
        },
    };

    let mut failed = false;

    for path in &args.source_files {
        if let Err(error) = compile(path, &args, config) {
            eprintln!("{}", error.to_string().red());
            failed = true;
        }
    }

    match failed {
        true => ExitCode::FAILURE,
        false => ExitCode::SUCCESS,
    }
}

fn compile(path: &Path, args: &Args, config: ParserConfig) -> Result<(), DriverError> {
    let contents = std::fs::read_to_string(path).map_err(|source| DriverError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let source_file = SourceFile {
        contents,
        origin: SourceFileOrigin::File(path.to_path_buf()),
    };

    let output = parser::parse(&source_file, config);

    eprint!("{}", output.diagnostics.to_colored_string());

    if args.dump_ir {
        println!("{}", pretty_print_module(&output.module));
    }

    if args.reflect {
        print_reflection(&output);
    }

    if !output.success {
        return Err(DriverError::Compilation(path.display().to_string()));
    }

    let output_path = args
        .output
        .clone()
        .unwrap_or_else(|| path.with_extension("spv"));

    let words = writer::write_module(&output.module);
    debug!("{} words for {}", words.len(), path.display());

    std::fs::write(&output_path, writer::to_bytes(&words)).map_err(|source| {
        DriverError::Write {
            path: output_path.clone(),
            source,
        }
    })?;

    info!("wrote {}", output_path.display());

    Ok(())
}

fn print_reflection(output: &ParseOutput) {
    for texture in &output.effect.textures {
        println!(
            "texture {} {}x{} levels={} format={}",
            texture.name, texture.width, texture.height, texture.levels, texture.format
        );
    }

    for sampler in &output.effect.samplers {
        println!(
            "sampler {} -> {} filter={:#x}",
            sampler.name, sampler.texture_name, sampler.filter
        );
    }

    for uniform in &output.effect.uniforms {
        println!(
            "uniform {} {} offset={} size={}",
            uniform.ty, uniform.name, uniform.offset, uniform.size
        );
    }

    for technique in &output.effect.techniques {
        println!(
            "technique {} ({} passes)",
            technique.name,
            technique.passes.len()
        );
    }
}
