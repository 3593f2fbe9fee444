use std::{
    ffi::OsString,
    fs::{self, File},
    io::BufWriter,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use assemble::{assemble_from_str, AssembleError};
use common::hexfile::HexFile;
use ucode::CONTROL_STORE;

const UCODE_OUTPUT: &str = "micro.bin";

#[derive(Parser, Debug)]
#[command(author, version, about = "Assembler and control store generator for the 3-byte instruction CPU")]
struct Opts {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Assemble a source file into a program image
    Assemble {
        #[arg(value_name = "SOURCE")]
        source: PathBuf,
        /// Defaults to SOURCE with ".bin" appended
        #[arg(value_name = "OUTPUT")]
        output: Option<PathBuf>,
        /// Write a Logisim "v2.0 raw" file instead of raw bytes
        #[arg(long)]
        hex: bool,
    },
    /// Synthesize the microcode control store
    Ucode {
        #[arg(value_name = "OUTPUT", default_value = UCODE_OUTPUT)]
        output: PathBuf,
        /// Write a Logisim "v2.0 raw" file instead of raw bytes
        #[arg(long)]
        hex: bool,
    },
}

enum Image {
    Raw(Vec<u8>),
    Hex(HexFile),
}

fn write_image(path: &Path, image: Image) -> Result<()> {
    match image {
        Image::Raw(bytes) => fs::write(path, bytes),
        Image::Hex(hex) => File::create(path).and_then(|f| hex.write(BufWriter::new(f))),
    }
    .with_context(|| format!("could not write {}", path.display()))
}

fn default_output(source: &Path) -> PathBuf {
    let mut name = OsString::from(source.as_os_str());
    name.push(".bin");
    PathBuf::from(name)
}

fn assemble(source: &Path, output: Option<PathBuf>, hex: bool) -> Result<PathBuf> {
    let input = fs::read_to_string(source).with_context(|| format!("could not read {}", source.display()))?;

    let assembly = assemble_from_str(&input)?;
    tracing::info!("{} bytes, {} labels", assembly.bytes.len(), assembly.labels.len());
    for (name, offset) in assembly.labels.iter() {
        tracing::debug!("{:02x} {}", offset, name);
    }

    let output = output.unwrap_or_else(|| default_output(source));
    let image = if hex {
        Image::Hex(HexFile::from_bytes(&assembly.bytes))
    } else {
        Image::Raw(assembly.bytes)
    };
    write_image(&output, image)?;
    Ok(output)
}

fn ucode(output: PathBuf, hex: bool) -> Result<PathBuf> {
    let image = if hex {
        Image::Hex(CONTROL_STORE.to_hex())
    } else {
        Image::Raw(CONTROL_STORE.to_bytes())
    };
    write_image(&output, image)?;
    Ok(output)
}

fn report(e: &anyhow::Error) {
    if let Some(AssembleError::Syntax(diagnostics)) = e.downcast_ref::<AssembleError>() {
        for d in diagnostics {
            println!("{}", d);
        }
    }
    println!("error: {:#}", e);
}

// Failures are reported on stdout and the process still exits normally.
fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let opts = Opts::parse();
    let result = match opts.command {
        Command::Assemble { source, output, hex } => assemble(&source, output, hex),
        Command::Ucode { output, hex } => ucode(output, hex),
    };

    match result {
        Ok(path) => println!("done, wrote {}", path.display()),
        Err(e) => report(&e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_appends_bin() {
        assert_eq!(PathBuf::from("prog.asm.bin"), default_output(Path::new("prog.asm")));
        assert_eq!(PathBuf::from("dir/prog.bin"), default_output(Path::new("dir/prog")));
    }

    #[test]
    fn cli_shape() {
        let opts = Opts::try_parse_from(["app", "assemble", "x.asm", "--hex"]).unwrap();
        assert!(matches!(
            opts.command,
            Command::Assemble { ref source, output: None, hex: true } if source == Path::new("x.asm")
        ));

        let opts = Opts::try_parse_from(["app", "ucode"]).unwrap();
        assert!(matches!(opts.command, Command::Ucode { ref output, hex: false } if output == Path::new(UCODE_OUTPUT)));

        assert!(Opts::try_parse_from(["app"]).is_err());
    }
}
