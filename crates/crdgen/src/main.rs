use greptimedb_cluster::api::v1alpha1::{
    greptimedbcluster::GreptimeDBCluster, greptimedbstandalone::GreptimeDBStandalone,
};
use kube::CustomResourceExt as _;

fn main() -> Result<(), serde_yaml::Error> {
    print!("{}", serde_yaml::to_string(&GreptimeDBCluster::crd())?);
    println!("---");
    print!("{}", serde_yaml::to_string(&GreptimeDBStandalone::crd())?);
    Ok(())
}
