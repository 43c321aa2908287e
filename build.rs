//! Builds the `demos/fixture-component` test fixture into its own target
//! directory and exposes the resulting `cdylib` path to integration tests
//! via `FIXTURE_COMPONENT_PATH` (read with `option_env!` in `tests/`, since
//! a sandboxed or offline build of the fixture is a soft failure, not a
//! hard one — see `tests/activation.rs`).

use std::path::PathBuf;
use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=demos/fixture-component/src/lib.rs");
    println!("cargo:rerun-if-changed=demos/fixture-component/Cargo.toml");

    let manifest_dir = PathBuf::from(std::env::var("CARGO_MANIFEST_DIR").unwrap());
    let fixture_manifest = manifest_dir.join("demos/fixture-component/Cargo.toml");
    let fixture_target_dir = manifest_dir.join("target").join("fixture-component");

    let cargo = std::env::var("CARGO").unwrap_or_else(|_| "cargo".to_string());
    let status = Command::new(cargo)
        .arg("build")
        .arg("--manifest-path")
        .arg(&fixture_manifest)
        .arg("--target-dir")
        .arg(&fixture_target_dir)
        .status();

    match status {
        Ok(status) if status.success() => {
            let file_name = format!(
                "{}fixture_component{}",
                std::env::consts::DLL_PREFIX,
                std::env::consts::DLL_SUFFIX
            );
            let path = fixture_target_dir.join("debug").join(file_name);
            println!("cargo:rustc-env=FIXTURE_COMPONENT_PATH={}", path.display());
        }
        Ok(status) => {
            println!("cargo:warning=building the fixture-component test fixture failed with {status}; activation tests will be skipped");
        }
        Err(e) => {
            println!("cargo:warning=could not invoke cargo to build the fixture-component test fixture: {e}; activation tests will be skipped");
        }
    }
}
