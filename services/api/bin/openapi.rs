//! Writes the OpenAPI document for the call API.
//!
//! Usage: `openapi [OUTPUT]`, defaulting to `openapi.json` in the current
//! directory.

use omnicall_api::router::ApiDoc;
use utoipa::OpenApi;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "openapi.json".to_string());
    std::fs::write(&path, ApiDoc::openapi().to_pretty_json()?)?;
    println!("Wrote OpenAPI document to {path}");
    Ok(())
}
