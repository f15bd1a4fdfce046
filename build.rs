use vergen::{BuildBuilder, CargoBuilder, Emitter, RustcBuilder};
use vergen_git2::Git2Builder;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let build = BuildBuilder::all_build()?;
    let cargo = CargoBuilder::all_cargo()?;
    let rustc = RustcBuilder::all_rustc()?;

    // Git metadata is optional so that crates.io and tarball builds still work.
    let git2 = Git2Builder::default()
        .branch(true)
        .describe(true, true, None)
        .sha(true)
        .build();

    match git2 {
        Ok(git2) => {
            Emitter::default()
                .add_instructions(&build)?
                .add_instructions(&cargo)?
                .add_instructions(&rustc)?
                .add_instructions(&git2)?
                .emit()?;
        }
        Err(_) => {
            println!("cargo:rustc-env=VERGEN_GIT_BRANCH=unknown");
            println!("cargo:rustc-env=VERGEN_GIT_DESCRIBE=unknown");
            println!("cargo:rustc-env=VERGEN_GIT_SHA=unknown");

            Emitter::default()
                .add_instructions(&build)?
                .add_instructions(&cargo)?
                .add_instructions(&rustc)?
                .emit()?;
        }
    }

    Ok(())
}
