fn main() -> Result<(), Box<dyn std::error::Error>> {
    tonic_build::configure()
        .build_client(true)
        .build_server(true)
        .compile(&["proto/google/storage/v1/storage.proto"], &["proto"])?;
    Ok(())
}
