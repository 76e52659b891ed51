//! Optional signing of the protected package.
//!
//! Signing never fails a run: every problem is reported as a [`SignOutcome`]
//! and logged.

use crate::options::SignOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SignOutcome {
    /// Signing was not requested.
    Skipped,
    /// The signing tool could not be found or started.
    ToolUnavailable { tool: PathBuf },
    Signed { output: PathBuf },
    /// The tool ran and exited unsuccessfully.
    Failed { exit_code: Option<i32> },
}

/// Capability that turns a written package into a signed one.
pub trait Signer: std::fmt::Debug {
    fn sign(&self, apk: &Path, options: &SignOptions) -> SignOutcome;
}

/// Path of the signed copy: `app.apk` becomes `app_sign.apk`.
pub fn signed_path(apk: &Path) -> PathBuf {
    let stem = apk
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    apk.with_file_name(format!("{stem}_sign.apk"))
}

/// Runs `java -jar apksigner.jar sign`.
#[derive(Debug, Clone)]
pub struct ApkSignerTool {
    java: PathBuf,
}

impl Default for ApkSignerTool {
    fn default() -> Self {
        Self {
            java: PathBuf::from("java"),
        }
    }
}

impl ApkSignerTool {
    pub fn with_java(java: impl Into<PathBuf>) -> Self {
        Self { java: java.into() }
    }

    fn command(&self, apk: &Path, out: &Path, options: &SignOptions) -> Command {
        let mut command = Command::new(&self.java);
        command.arg("-jar").arg(&options.signer_jar).arg("sign");
        if let Some(keystore) = &options.keystore {
            command.arg("--ks").arg(keystore);
        }
        if let Some(password) = &options.keystore_password {
            command.arg("--ks-pass").arg(format!("pass:{password}"));
        }
        if let Some(password) = &options.key_password {
            command.arg("--key-pass").arg(format!("pass:{password}"));
        }
        if let Some(alias) = &options.key_alias {
            command.arg("--ks-key-alias").arg(alias);
        }
        command.arg("--out").arg(out).arg(apk);
        command
    }
}

impl Signer for ApkSignerTool {
    fn sign(&self, apk: &Path, options: &SignOptions) -> SignOutcome {
        if !options.signer_jar.is_file() {
            warn!(
                "Signer: {} not found, output left unsigned",
                options.signer_jar.display()
            );
            return SignOutcome::ToolUnavailable {
                tool: options.signer_jar.clone(),
            };
        }

        let out = signed_path(apk);
        info!("Signer: signing {} ...", apk.display());
        let output = match self.command(apk, &out, options).output() {
            Ok(output) => output,
            Err(err) => {
                warn!("Signer: could not start {}: {err}", self.java.display());
                return SignOutcome::ToolUnavailable {
                    tool: self.java.clone(),
                };
            }
        };

        for line in String::from_utf8_lossy(&output.stdout)
            .lines()
            .chain(String::from_utf8_lossy(&output.stderr).lines())
        {
            info!("Signer: {line}");
        }

        if !output.status.success() {
            error!("Signer: signing failed with {}", output.status);
            return SignOutcome::Failed {
                exit_code: output.status.code(),
            };
        }

        let mut idsig = out.clone().into_os_string();
        idsig.push(".idsig");
        let idsig = PathBuf::from(idsig);
        if idsig.exists()
            && let Err(err) = std::fs::remove_file(&idsig)
        {
            warn!("Signer: could not remove {}: {err}", idsig.display());
        }
        info!("Signer: signed to {}", out.display());
        SignOutcome::Signed { output: out }
    }
}

/// Signer that does nothing, reporting [`SignOutcome::Skipped`].
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSigner;

impl Signer for NoopSigner {
    fn sign(&self, _apk: &Path, _options: &SignOptions) -> SignOutcome {
        SignOutcome::Skipped
    }
}
