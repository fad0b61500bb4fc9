/*
[INPUT]:  Upload API base URL and a local file path
[OUTPUT]: Remote location of the uploaded file
[POS]:    Examples - chunked upload demonstration
[UPDATE]: When the upload client API changes
*/

use tokio_util::sync::CancellationToken;
use uplift_adapter::*;

/// Example: compress and upload one file
///
/// Usage: cargo run --example upload_example -- <BASE_URL> <FILE>
#[tokio::main]
async fn main() {
    let mut args = std::env::args().skip(1);
    let (Some(base_url), Some(file)) = (args.next(), args.next()) else {
        eprintln!("usage: upload_example <BASE_URL> <FILE>");
        return;
    };

    let client = match UploadClient::new(&base_url) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to create client: {}", e);
            return;
        }
    };

    let bytes = match tokio::fs::read(&file).await {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Failed to read {}: {}", file, e);
            return;
        }
    };
    let payload = UploadPayload::new(file.clone(), bytes);

    let compressed = match ZlibCompressor.process(payload.bytes.clone(), &PreprocessOptions::default()) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Compression failed: {}", e);
            return;
        }
    };
    println!("{}: {} -> {} bytes", file, payload.size(), compressed.len());
    let payload = payload.with_bytes(compressed);

    let total = payload.size();
    let on_progress = move |sent: u64| println!("  {sent}/{total} bytes");

    match client.upload(&payload, &on_progress, &CancellationToken::new()).await {
        Ok(location) => println!("uploaded to {location}"),
        Err(e) => eprintln!("Upload failed: {}", e),
    }
}
