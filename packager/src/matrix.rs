use std::fmt;

/// Toolchains the library is built and tested against.
pub(crate) const TOOLCHAINS: &[&str] = &["1.85.0", "1.86.0", "1.87.0", "stable"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Arch {
    Ia32,
    X64,
}

impl Arch {
    pub(crate) const ALL: [Arch; 2] = [Arch::Ia32, Arch::X64];

    pub(crate) fn parse(name: &str) -> Option<Self> {
        match name {
            "ia32" => Some(Arch::Ia32),
            "x64" => Some(Arch::X64),
            _ => None,
        }
    }

    pub(crate) fn triple(self) -> &'static str {
        match self {
            Arch::Ia32 => "i686-unknown-linux-gnu",
            Arch::X64 => "x86_64-unknown-linux-gnu",
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Arch::Ia32 => "ia32",
            Arch::X64 => "x64",
        })
    }
}

/// One `(toolchain, architecture)` pair. `None` leaves the choice to cargo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BuildJob {
    pub(crate) toolchain: Option<String>,
    pub(crate) arch: Option<Arch>,
}

impl BuildJob {
    /// Arguments for `cargo`, with `forwarded` appended verbatim.
    pub(crate) fn cargo_args(&self, forwarded: &[String]) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(toolchain) = &self.toolchain {
            args.push(format!("+{toolchain}"));
        }
        args.extend(["build", "--release", "--lib"].map(String::from));
        if let Some(arch) = self.arch {
            args.push("--target".into());
            args.push(arch.triple().into());
        }
        args.extend(forwarded.iter().cloned());
        args
    }
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum MatrixError {
    UnknownToolchain(String),
    UnknownArch(String),
}

impl fmt::Display for MatrixError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatrixError::UnknownToolchain(name) => write!(
                f,
                "unsupported toolchain {name:?} (expected one of {}, or all)",
                TOOLCHAINS.join(", ")
            ),
            MatrixError::UnknownArch(name) => {
                write!(f, "unsupported architecture {name:?} (expected ia32, x64, or all)")
            }
        }
    }
}

impl std::error::Error for MatrixError {}

/// Expand the requested toolchain and architecture into build jobs, architecture-major.
pub(crate) fn expand(
    target: Option<&str>,
    target_arch: Option<&str>,
) -> Result<Vec<BuildJob>, MatrixError> {
    let archs: Vec<Option<Arch>> = match target_arch {
        None => vec![None],
        Some("all") => Arch::ALL.into_iter().map(Some).collect(),
        Some(name) => vec![Some(
            Arch::parse(name).ok_or_else(|| MatrixError::UnknownArch(name.to_string()))?,
        )],
    };
    let toolchains: Vec<Option<String>> = match target {
        None => vec![None],
        Some("all") => TOOLCHAINS.iter().map(|t| Some((*t).to_string())).collect(),
        Some(name) if TOOLCHAINS.contains(&name) => vec![Some(name.to_string())],
        Some(name) => return Err(MatrixError::UnknownToolchain(name.to_string())),
    };

    Ok(archs
        .into_iter()
        .flat_map(|arch| {
            toolchains.iter().map(move |toolchain| BuildJob {
                toolchain: toolchain.clone(),
                arch,
            })
        })
        .collect())
}
