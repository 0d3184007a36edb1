use std::path::PathBuf;

use vergen_gitcl::{Build, Cargo, Emitter, Gitcl};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let build = Build::builder().build_timestamp(true).build();
    let cargo = Cargo::builder().build();
    let gitcl = Gitcl::builder().branch(true).sha(true).dirty(true).build();

    Emitter::default()
        .add_instructions(&build)?
        .add_instructions(&cargo)?
        .add_instructions(&gitcl)?
        .emit()?;

    let out_dir = PathBuf::from(std::env::var("OUT_DIR")?);
    let proto_file = "proto/grafeas.proto";
    println!("cargo:rerun-if-changed={proto_file}");

    // Fall back to the vendored protoc when the host has none configured.
    let mut config = prost_build::Config::new();
    if std::env::var_os("PROTOC").is_none() {
        config.protoc_executable(protoc_bin_vendored::protoc_bin_path()?);
    }

    // Messages derive serde so the JSON gateway can marshal them directly;
    // enum-typed fields are rendered by name through `gateway::json`.
    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .file_descriptor_set_path(out_dir.join("grafeas_descriptor.bin"))
        .message_attribute(
            ".grafeas.v1",
            "#[derive(serde::Serialize, serde::Deserialize)]",
        )
        .message_attribute(".grafeas.v1", "#[serde(default)]")
        .field_attribute(
            ".grafeas.v1.Note.kind",
            "#[serde(with = \"crate::gateway::json::note_kind\")]",
        )
        .field_attribute(
            ".grafeas.v1.Occurrence.kind",
            "#[serde(with = \"crate::gateway::json::note_kind\")]",
        )
        .compile_protos_with_config(config, &[proto_file], &["proto"])?;

    Ok(())
}
