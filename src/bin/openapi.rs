use anyhow::Result;

// Print the OpenAPI document so CI can publish it without starting a server.
fn main() -> Result<()> {
    let spec = chiavi::api::openapi();
    println!("{}", serde_json::to_string_pretty(&spec)?);
    Ok(())
}
