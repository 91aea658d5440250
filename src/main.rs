//! unexepack decompresses DOS executables packed in the Microsoft EXEPACK
//! format.
//!
//! ```sh
//! unexepack packed.exe
//! ```
//!
//! The decompressed executable is written to a new file named after the
//! input, with ".unpacked" appended. The input file is not modified.
//!
//! # Exit status
//!
//! Exit status is 0 if there was no error, or 1 if there was any kind of error
//! (I/O error, EXE file format error, or EXEPACK format error). On error, no
//! output file is created.
//!
//! # References
//!
//! * <http://www.shikadi.net/moddingwiki/Microsoft_EXEPACK>.

use std::env;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic;

extern crate lexopt;

extern crate unexepack;
use unexepack::exe;
use unexepack::exepack;

/// An error that may occur while unpacking an EXE file.
#[derive(Debug)]
enum Error {
    /// An I/O error.
    Io(io::Error),
    /// An EXE file format error.
    Exe(exe::FormatError),
    /// An EXEPACK format error.
    Exepack(exepack::FormatError),
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(err) => err.fmt(f),
            Error::Exe(err) => err.fmt(f),
            Error::Exepack(err) => err.fmt(f),
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<unexepack::Error> for Error {
    fn from(err: unexepack::Error) -> Self {
        match err {
            unexepack::Error::Exe(err) => Error::Exe(err),
            unexepack::Error::Exepack(err) => Error::Exepack(err),
        }
    }
}

/// An `Error` annotated with a `Path`.
#[derive(Debug)]
struct PathError {
    path: Option<PathBuf>,
    err: Error,
}

impl PathError {
    fn new<P: AsRef<Path>>(path: P, err: Error) -> Self {
        let path = path.as_ref().to_owned();
        Self { path: Some(path), err }
    }
}

impl std::error::Error for PathError {}

impl fmt::Display for PathError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PathError { path: None, err } => err.fmt(f),
            PathError { path: Some(path), err } => write!(f, "{}: {}", path.display(), err),
        }
    }
}

/// Reads a packed EXE from `input_path`, unpacks it, and writes the unpacked
/// EXE to `output_path`. The output file is only created after unpacking has
/// succeeded.
fn process<P, Q>(input_path: P, output_path: Q) -> Result<(), PathError>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    // Read and unpack the input. Any error here gets annotated with
    // input_path.
    let output = (|| -> Result<_, Error> {
        let input = fs::read(&input_path)?;
        let output = unexepack::unpack(&input)?;
        Ok(output)
    })()
        .map_err(|err| PathError::new(&input_path, err))?;

    // Save the unpacked image. Any error here gets annotated with
    // output_path.
    fs::write(&output_path, &output)
        .map_err(|err| PathError::new(&output_path, Error::Io(err)))?;

    Ok(())
}

/// Prints a usage message to `w`.
fn print_usage<W: Write + ?Sized>(w: &mut W) -> io::Result<()> {
    write!(w, "\
Usage: {} [--debug] INPUT.EXE\n\
Decompress a DOS EXE executable packed with EXEPACK.\n\
The output is written to INPUT.EXE.unpacked.\n\
\n\
Options:\n\
        --debug     show debugging output on stderr\n\
    -h, --help      show this help\n",
        env::args().next().unwrap()
    )
}

fn main() {
    use lexopt::prelude::*;

    let mut input_path: Option<PathBuf> = None;
    let mut parser = lexopt::Parser::from_env();
    loop {
        match parser.next() {
            Ok(None) => break,
            Ok(Some(Long("debug"))) => {
                unexepack::DEBUG.store(true, atomic::Ordering::Relaxed);
            }
            Ok(Some(Short('h'))) | Ok(Some(Long("help"))) => {
                print_usage(&mut io::stdout()).unwrap();
                return;
            }
            Ok(Some(Value(path))) if input_path.is_none() => {
                input_path = Some(PathBuf::from(path));
            }
            Ok(Some(arg)) => {
                eprintln!("{}", arg.unexpected());
                process::exit(1);
            }
            Err(err) => {
                eprintln!("{}", err);
                process::exit(1);
            }
        }
    }

    let input_path = match input_path {
        Some(input_path) => input_path,
        None => {
            print_usage(&mut io::stderr()).unwrap();
            eprintln!("\nNeed an INPUT.EXE argument");
            process::exit(1);
        }
    };

    let mut output_path = input_path.clone().into_os_string();
    output_path.push(".unpacked");
    let output_path = PathBuf::from(output_path);

    if let Err(err) = process(&input_path, &output_path) {
        eprintln!("{}", err);
        process::exit(1);
    }
}
