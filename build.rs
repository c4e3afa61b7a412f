use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    built::write_built_file()?;

    // Use the vendored protoc so builds do not depend on a system install.
    std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);
    tonic_build::compile_protos("proto/sso.proto")?;

    println!("cargo:rerun-if-changed=proto/sso.proto");

    Ok(())
}
