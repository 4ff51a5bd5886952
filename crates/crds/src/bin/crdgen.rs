//! Prints the PKIops CRDs as a multi-document YAML stream
//!
//! Usage: `cargo run -p crds --bin crdgen > config/crd/pki.yaml`

use crds::{ClusterIssuer, Issuer};
use kube::CustomResourceExt;

fn main() -> Result<(), serde_yaml::Error> {
    let issuer = serde_yaml::to_string(&Issuer::crd())?;
    let cluster_issuer = serde_yaml::to_string(&ClusterIssuer::crd())?;
    print!("---\n{issuer}---\n{cluster_issuer}");
    Ok(())
}
