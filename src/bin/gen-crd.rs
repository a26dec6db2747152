use kube::CustomResourceExt;
use meshsplit::crd::canary::Canary;

fn main() -> anyhow::Result<()> {
    // Pipe through a JSON-to-YAML converter to get a manifest
    println!("{}", serde_json::to_string_pretty(&Canary::crd())?);
    Ok(())
}
