//! radare2 driver: subprocess pipe and JSON response parsing

use crate::disassembler::{
    BinaryInfo, Disassembler, DisassemblerError, FunctionEntry, Statement,
};
use fnv::FnvHashMap;
use serde::Deserialize;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use tracing::{debug, warn};

/// Pipe to a radare2 child process
///
/// The child is started with `-q0`: commands go to its stdin terminated by
/// a newline, responses come back on stdout terminated by a NUL byte. The
/// child is reaped when the pipe is closed or dropped.
pub struct R2Pipe {
    executable: PathBuf,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stdout: Option<BufReader<ChildStdout>>,
}

impl R2Pipe {
    pub fn new() -> R2Pipe {
        R2Pipe::with_executable("r2")
    }

    pub fn with_executable(executable: impl Into<PathBuf>) -> R2Pipe {
        R2Pipe {
            executable: executable.into(),
            child: None,
            stdin: None,
            stdout: None,
        }
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Launches the child on `binary`; a previously opened child is closed
    /// first.
    pub fn open(&mut self, binary: &Path) -> Result<(), DisassemblerError> {
        if self.child.is_some() {
            self.close();
        }
        let mut child = Command::new(&self.executable)
            .arg("-q0")
            .arg(binary)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|_| DisassemblerError::MissingExecutable(self.executable.clone()))?;
        let stdin = child.stdin.take().ok_or(DisassemblerError::PipeClosed)?;
        let stdout = child.stdout.take().ok_or(DisassemblerError::PipeClosed)?;
        let mut reader = BufReader::new(stdout);
        // radare2 emits one NUL once the file is loaded
        read_response(&mut reader)?;
        self.child = Some(child);
        self.stdin = Some(stdin);
        self.stdout = Some(reader);
        Ok(())
    }

    /// Sends one command and returns its full response.
    pub fn exec(&mut self, command: &str) -> Result<String, DisassemblerError> {
        debug!(command, "radare2 command");
        let stdin = self.stdin.as_mut().ok_or(DisassemblerError::PipeClosed)?;
        stdin.write_all(command.as_bytes())?;
        stdin.write_all(b"\n")?;
        stdin.flush()?;
        let stdout = self.stdout.as_mut().ok_or(DisassemblerError::PipeClosed)?;
        read_response(stdout)
    }

    /// Quits the child and reaps it.
    pub fn close(&mut self) {
        if let Some(stdin) = self.stdin.as_mut() {
            let _ = stdin.write_all(b"q\n");
            let _ = stdin.flush();
        }
        self.stdin = None;
        self.stdout = None;
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

impl Default for R2Pipe {
    fn default() -> R2Pipe {
        R2Pipe::new()
    }
}

impl Drop for R2Pipe {
    fn drop(&mut self) {
        self.close();
    }
}

fn read_response(reader: &mut BufReader<ChildStdout>) -> Result<String, DisassemblerError> {
    let mut buf = Vec::new();
    let read = reader.read_until(0, &mut buf)?;
    if read == 0 {
        return Err(DisassemblerError::PipeClosed);
    }
    if buf.last() == Some(&0) {
        buf.pop();
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[derive(Debug, Deserialize)]
struct InfoResponse {
    bin: BinResponse,
}

#[derive(Debug, Deserialize)]
struct BinResponse {
    arch: String,
    endian: String,
    canary: bool,
    stripped: bool,
    bits: u32,
}

#[derive(Debug, Deserialize)]
struct FunctionResponse {
    offset: u64,
    name: String,
}

#[derive(Debug, Deserialize)]
struct DisasmResponse {
    ops: Vec<OpResponse>,
}

#[derive(Debug, Deserialize)]
struct OpResponse {
    offset: u64,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    disasm: Option<String>,
}

/// Parses the response of the `ij` command.
pub fn parse_info(json: &str) -> Result<BinaryInfo, serde_json::Error> {
    let raw: InfoResponse = serde_json::from_str(json)?;
    Ok(BinaryInfo::new(
        raw.bin.endian == "big",
        raw.bin.canary,
        raw.bin.stripped,
        raw.bin.bits == 64,
        raw.bin.arch,
    ))
}

/// Parses the response of the `aflj` command into an offset-sorted list.
pub fn parse_functions(json: &str) -> Result<Vec<FunctionEntry>, serde_json::Error> {
    let raw: Vec<FunctionResponse> = serde_json::from_str(json)?;
    let mut functions: Vec<FunctionEntry> = raw
        .into_iter()
        .map(|f| FunctionEntry::new(f.offset, f.name))
        .collect();
    functions.sort();
    Ok(functions)
}

/// Parses the response of the `pdfj` command.
///
/// Bytes radare2 could not decode come back typed `invalid`; they are kept
/// as `nop` so offsets stay dense within the function.
pub fn parse_statements(json: &str) -> Result<Vec<Statement>, serde_json::Error> {
    let raw: DisasmResponse = serde_json::from_str(json)?;
    Ok(raw
        .ops
        .into_iter()
        .map(|op| {
            let text = if op.kind == "invalid" {
                "nop"
            } else {
                op.disasm.as_deref().unwrap_or("nop")
            };
            Statement::new(op.offset, text)
        })
        .collect())
}

fn malformed(command: &str, source: serde_json::Error) -> DisassemblerError {
    DisassemblerError::MalformedResponse {
        command: command.to_string(),
        source,
    }
}

/// [`Disassembler`] backed by radare2
pub struct R2Disassembler {
    binary: PathBuf,
    pipe: R2Pipe,
    info: BinaryInfo,
    functions: Vec<FunctionEntry>,
    bodies: FnvHashMap<String, Vec<Statement>>,
}

impl R2Disassembler {
    /// Binds the driver to `binary`, verifying it is readable. Nothing is
    /// launched until [`analyse`](Disassembler::analyse).
    pub fn new(binary: impl Into<PathBuf>) -> Result<R2Disassembler, DisassemblerError> {
        R2Disassembler::with_pipe(binary, R2Pipe::new())
    }

    /// Same as [`new`](R2Disassembler::new) with a non-default radare2
    /// executable.
    pub fn with_executable(
        binary: impl Into<PathBuf>,
        executable: impl Into<PathBuf>,
    ) -> Result<R2Disassembler, DisassemblerError> {
        R2Disassembler::with_pipe(binary, R2Pipe::with_executable(executable))
    }

    fn with_pipe(binary: impl Into<PathBuf>, pipe: R2Pipe) -> Result<R2Disassembler, DisassemblerError> {
        let binary = binary.into();
        if std::fs::File::open(&binary).is_err() {
            return Err(DisassemblerError::UnreadableInput(binary));
        }
        Ok(R2Disassembler {
            binary,
            pipe,
            info: BinaryInfo::default(),
            functions: Vec::new(),
            bodies: FnvHashMap::default(),
        })
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }
}

impl Disassembler for R2Disassembler {
    fn analyse(&mut self) -> Result<(), DisassemblerError> {
        self.pipe.open(&self.binary)?;

        let raw = self.pipe.exec("ij")?;
        self.info = parse_info(&raw).map_err(|e| malformed("ij", e))?;
        debug!(arch = self.info.arch_name(), "binary information loaded");

        // full analysis pass; required before the function list exists
        self.pipe.exec("aaa")?;
        let raw = self.pipe.exec("aflj")?;
        self.functions = parse_functions(&raw).map_err(|e| malformed("aflj", e))?;

        self.bodies.clear();
        for function in &self.functions {
            let raw = self.pipe.exec(&format!("pdfj @ {}", function.name()))?;
            match parse_statements(&raw) {
                Ok(statements) => {
                    self.bodies.insert(function.name().to_string(), statements);
                }
                Err(err) => {
                    warn!(
                        function = function.name(),
                        error = %err,
                        "skipping function with malformed disassembly"
                    );
                }
            }
        }
        self.pipe.close();
        debug!(functions = self.functions.len(), "analysis complete");
        Ok(())
    }

    fn info(&self) -> &BinaryInfo {
        &self.info
    }

    fn functions(&self) -> &[FunctionEntry] {
        &self.functions
    }

    fn function_statements(&self, name: &str) -> Option<&[Statement]> {
        self.bodies.get(name).map(Vec::as_slice)
    }
}
