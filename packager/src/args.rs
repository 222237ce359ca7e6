use clap::Parser;

#[derive(Parser, Debug, Default, PartialEq, Eq)]
#[command(
    author,
    version,
    about = "Build sql-bridge for several toolchain and architecture targets",
    after_help = "Any other options are passed through to cargo build."
)]
pub(crate) struct Args {
    /// Toolchain to build with (a supported version, or all). Defaults to the active toolchain.
    #[arg(long)]
    pub(crate) target: Option<String>,
    /// Target architecture (ia32, x64, or all). Defaults to the host.
    #[arg(long = "target-arch", alias = "target_arch")]
    pub(crate) target_arch: Option<String>,
    /// Print the build commands without running them.
    #[arg(long)]
    pub(crate) dry_run: bool,
    /// Open an in-memory database through the library after building.
    #[arg(long)]
    pub(crate) smoke: bool,
}

/// Flags that consume the following argument when given without `=`.
const VALUE_FLAGS: &[&str] = &["--target", "--target-arch", "--target_arch"];
const SWITCHES: &[&str] = &["--dry-run", "--smoke", "-h", "--help", "-V", "--version"];

/// Split raw arguments into the ones this tool parses and the ones forwarded to cargo untouched.
/// The program name stays at the front of the known list.
pub(crate) fn split_known_args<I>(raw: I) -> (Vec<String>, Vec<String>)
where
    I: IntoIterator<Item = String>,
{
    let mut raw = raw.into_iter();
    let mut known: Vec<String> = raw.next().into_iter().collect();
    let mut forwarded = Vec::new();

    while let Some(arg) = raw.next() {
        let flag = arg.split_once('=').map_or(arg.as_str(), |(name, _)| name);
        if VALUE_FLAGS.contains(&flag) {
            let takes_next = !arg.contains('=');
            known.push(arg);
            if takes_next {
                if let Some(value) = raw.next() {
                    known.push(value);
                }
            }
        } else if SWITCHES.contains(&arg.as_str()) {
            known.push(arg);
        } else {
            forwarded.push(arg);
        }
    }
    (known, forwarded)
}
