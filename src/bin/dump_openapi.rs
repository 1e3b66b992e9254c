use std::fs;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(about = "Write the OpenAPI document to a file")]
struct Args {
    /// Output path
    #[arg(default_value = "openapi.json")]
    path: String,
    /// Port advertised in the `servers` entry
    #[arg(long, default_value_t = 8000)]
    port: u16,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let doc = perm_registry::docs::build_openapi(args.port)?;
    fs::write(&args.path, serde_json::to_string_pretty(&doc)?)?;
    println!("wrote {}", args.path);
    Ok(())
}
