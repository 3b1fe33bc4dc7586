//! VPC network helpers: subnet allocation and network specs.

use std::collections::BTreeSet;

use nap_core::naming::{labels, vpc_network_name};

use crate::models::{Ipam, IpamConfig, Labels, NetworkCreate};

/// Second octets handed out for `172.X.0.0/16` subnets.
pub const SUBNET_OCTETS: std::ops::RangeInclusive<u8> = 20..=254;

/// Second octet of a `172.X.0.0/16` subnet.
pub fn second_octet(subnet: &str) -> Option<u8> {
    let mut parts = subnet.split('/').next()?.split('.');
    if parts.next()? != "172" {
        return None;
    }
    parts.next()?.parse().ok()
}

/// Lowest free `172.X.0.0/16` given the subnets already in use.
pub fn allocate_subnet<'a>(in_use: impl IntoIterator<Item = &'a str>) -> Option<String> {
    let taken: BTreeSet<u8> = in_use.into_iter().filter_map(second_octet).collect();
    SUBNET_OCTETS
        .into_iter()
        .find(|octet| !taken.contains(octet))
        .map(|octet| format!("172.{octet}.0.0/16"))
}

pub fn gateway_for(subnet: &str) -> Option<String> {
    second_octet(subnet).map(|octet| format!("172.{octet}.0.1"))
}

/// Engine network spec for VPC `name` on `subnet`.
pub fn vpc_network_spec(name: &str, subnet: &str) -> NetworkCreate {
    let mut net_labels = Labels::new();
    net_labels.insert(labels::MANAGED.to_string(), "true".to_string());
    net_labels.insert(labels::TYPE.to_string(), labels::TYPE_VPC.to_string());
    net_labels.insert(labels::VPC_NAME.to_string(), name.to_string());

    NetworkCreate {
        name: vpc_network_name(name),
        driver: "bridge".to_string(),
        ipam: Ipam {
            config: vec![IpamConfig {
                subnet: subnet.to_string(),
                gateway: gateway_for(subnet).unwrap_or_default(),
            }],
        },
        labels: net_labels,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_lowest_free() {
        assert_eq!(allocate_subnet([]).as_deref(), Some("172.20.0.0/16"));
        assert_eq!(
            allocate_subnet(["172.20.0.0/16", "172.22.0.0/16", "10.0.0.0/8"]).as_deref(),
            Some("172.21.0.0/16")
        );
    }

    #[test]
    fn exhaustion() {
        let all: Vec<String> = SUBNET_OCTETS.map(|o| format!("172.{o}.0.0/16")).collect();
        assert_eq!(allocate_subnet(all.iter().map(String::as_str)), None);
    }

    #[test]
    fn network_spec() {
        let spec = vpc_network_spec("primary", "172.20.0.0/16");
        assert_eq!(spec.name, vpc_network_name("primary"));
        assert_eq!(spec.driver, "bridge");
        assert_eq!(spec.ipam.config[0].gateway, "172.20.0.1");
        assert_eq!(spec.labels[labels::TYPE], labels::TYPE_VPC);
        assert_eq!(spec.labels[labels::VPC_NAME], "primary");
    }
}
