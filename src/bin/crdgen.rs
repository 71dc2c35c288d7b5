use kube::CustomResourceExt;
use peering_reflector::crd::ForeignCluster;

fn main() {
    print!("{}", serde_yaml::to_string(&ForeignCluster::crd()).unwrap());
}
