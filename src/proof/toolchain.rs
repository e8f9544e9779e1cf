//! circom/snarkjs prover driven as external processes.

use async_trait::async_trait;
use std::{
    ffi::OsStr,
    path::{Path, PathBuf},
};
use tokio::process::Command;
use tracing::debug;

use super::{ProofError, ProofToolchain};

/// Runs `node generate_witness.js` and `snarkjs groth16 prove` against a
/// compiled circuit in `build_dir`.
#[derive(Debug, Clone)]
pub struct SnarkjsToolchain {
    node_bin: PathBuf,
    snarkjs_bin: PathBuf,
    build_dir: PathBuf,
    circuit: String,
}

impl SnarkjsToolchain {
    pub fn new(build_dir: impl Into<PathBuf>, circuit: impl Into<String>) -> Self {
        Self {
            node_bin: "node".into(),
            snarkjs_bin: "snarkjs".into(),
            build_dir: build_dir.into(),
            circuit: circuit.into(),
        }
    }

    pub fn with_binaries(mut self, node: impl Into<PathBuf>, snarkjs: impl Into<PathBuf>) -> Self {
        self.node_bin = node.into();
        self.snarkjs_bin = snarkjs.into();
        self
    }

    fn js_dir(&self) -> PathBuf {
        self.build_dir.join(format!("{}_js", self.circuit))
    }

    fn zkey(&self) -> PathBuf {
        self.build_dir.join(format!("{}.zkey", self.circuit))
    }
}

/// Runs `program` to completion; a non-zero exit carries its stderr.
async fn run<I, S>(program: &Path, args: I) -> Result<(), ProofError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let name = program.display().to_string();
    let output = Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| ProofError::Spawn {
            program: name.clone(),
            source,
        })?;

    if !output.status.success() {
        return Err(ProofError::Toolchain {
            program: name,
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    debug!(program = %name, "toolchain step finished");
    Ok(())
}

#[async_trait]
impl ProofToolchain for SnarkjsToolchain {
    async fn witness(&self, input: &Path, witness: &Path) -> Result<(), ProofError> {
        let js_dir = self.js_dir();
        let script = js_dir.join("generate_witness.js");
        let wasm = js_dir.join(format!("{}.wasm", self.circuit));
        run(
            &self.node_bin,
            [script.as_os_str(), wasm.as_os_str(), input.as_os_str(), witness.as_os_str()],
        )
        .await
    }

    async fn prove(&self, witness: &Path, proof: &Path, public: &Path) -> Result<(), ProofError> {
        let zkey = self.zkey();
        run(
            &self.snarkjs_bin,
            [
                OsStr::new("groth16"),
                OsStr::new("prove"),
                zkey.as_os_str(),
                witness.as_os_str(),
                proof.as_os_str(),
                public.as_os_str(),
            ],
        )
        .await
    }
}
