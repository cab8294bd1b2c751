use {
    std::{
        env,
        fs::File,
        io::prelude::*,
        path::Path,
    },
    git2::Repository,
    semver::Version,
};

#[derive(Debug, thiserror::Error)]
enum Error {
    #[error(transparent)] Io(#[from] std::io::Error),
    #[error(transparent)] Semver(#[from] semver::Error),
    #[error("missing environment variable {0}")]
    Env(&'static str),
}

/// The commit the crate is being built from, if it is built from a git checkout.
fn commit_hash(manifest_dir: &Path) -> Option<git2::Oid> {
    let repo = Repository::discover(manifest_dir).ok()?;
    let commit = repo.head().ok()?.peel_to_commit().ok()?;
    Some(commit.id())
}

fn main() -> Result<(), Error> {
    println!("cargo:rerun-if-changed=.git/HEAD");
    let manifest_dir = env::var_os("CARGO_MANIFEST_DIR").ok_or(Error::Env("CARGO_MANIFEST_DIR"))?;
    let out_dir = env::var_os("OUT_DIR").ok_or(Error::Env("OUT_DIR"))?;
    let version = env!("CARGO_PKG_VERSION").parse::<Version>()?;
    assert!(version.pre.is_empty());
    assert!(version.build.is_empty());
    let clap_version = match commit_hash(Path::new(&manifest_dir)) {
        Some(commit_hash) => format!("{version} ({commit_hash})"),
        None => version.to_string(),
    };
    let mut out_f = File::create(Path::new(&out_dir).join("version.rs"))?;
    writeln!(&mut out_f, "pub const CLAP_VERSION: &str = {clap_version:?};")?;
    Ok(())
}
