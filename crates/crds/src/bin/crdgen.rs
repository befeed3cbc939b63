//! Prints the FloatingIP CRD manifest to stdout.

use crds::FloatingIP;
use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&FloatingIP::crd())?);
    Ok(())
}
